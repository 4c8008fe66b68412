//! Authorization gate
//!
//! Every mutating or read operation passes through one of these checks after
//! the principal has been resolved. Authentication and the blocked-account
//! check happen earlier, in the extractor; this module only decides what an
//! authenticated principal may do.

use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::UserRole;

/// Require the principal's role to subsume `required`.
pub fn require_role(principal: &AuthenticatedUser, required: UserRole) -> ApiResult<()> {
    if principal.role.subsumes(required) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} role required",
            required.as_str()
        )))
    }
}

/// Require `required`, with an ownership escape hatch: the owner of the
/// resource may act even without the elevated role.
pub fn require_role_or_owner(
    principal: &AuthenticatedUser,
    required: UserRole,
    owner_id: Uuid,
) -> ApiResult<()> {
    if principal.role.subsumes(required) || principal.user_id == owner_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} role or resource ownership required",
            required.as_str()
        )))
    }
}

/// Reject actions a principal aims at their own account.
///
/// Applies regardless of role: an admin may not block or delete themselves.
pub fn forbid_self_action(principal: &AuthenticatedUser, target_id: Uuid) -> ApiResult<()> {
    if principal.user_id == target_id {
        Err(ApiError::SelfAction)
    } else {
        Ok(())
    }
}
