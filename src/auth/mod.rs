//! Authentication: bearer credential verification and principal resolution
//!
//! Token issuance belongs to the external identity provider; this module only
//! verifies tokens with the shared secret and resolves the subject to a local
//! account row carrying role and blocked state.

pub mod jwt;
pub mod service;

pub use jwt::{encode_token, verify_token, Claims, JwtError};
pub use service::AuthService;
