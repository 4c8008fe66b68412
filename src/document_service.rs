//! Document metadata service
//!
//! Bytes live in the external blob store; this service records metadata rows
//! and delegates signed-URL issuance to the store's signing endpoint.

use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{CreateDocumentRequest, Document, SignedUrlResponse};

/// Client for the blob store's URL-signing endpoint
#[derive(Clone)]
pub struct StorageClient {
    http: reqwest::Client,
    signing_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct SigningResponse {
    url: String,
    expires_in_seconds: u64,
}

impl StorageClient {
    pub fn new(signing_url: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            signing_url,
            api_key,
        }
    }

    /// Request a short-lived signed URL for `storage_key`
    pub async fn sign_url(&self, storage_key: &str) -> ApiResult<SignedUrlResponse> {
        let mut request = self
            .http
            .post(&self.signing_url)
            .json(&json!({ "key": storage_key }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ApiError::ExternalService(format!(
                "Storage signing endpoint returned {}",
                response.status()
            )));
        }

        let signed: SigningResponse = response.json().await?;

        Ok(SignedUrlResponse {
            url: signed.url,
            expires_in_seconds: signed.expires_in_seconds,
        })
    }
}

/// Service for document metadata
#[derive(Clone)]
pub struct DocumentService {
    db_pool: PgPool,
    storage: StorageClient,
}

impl DocumentService {
    pub fn new(db_pool: PgPool, storage: StorageClient) -> Self {
        Self { db_pool, storage }
    }

    /// Record metadata for an uploaded document
    pub async fn create_document(
        &self,
        loan_id: Uuid,
        owner_id: Uuid,
        request: CreateDocumentRequest,
    ) -> ApiResult<Document> {
        let document = sqlx::query_as::<_, Document>(
            r#"
            INSERT INTO documents (id, loan_id, owner_id, file_name, content_type, storage_key, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(loan_id)
        .bind(owner_id)
        .bind(&request.file_name)
        .bind(&request.content_type)
        .bind(&request.storage_key)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(document)
    }

    /// List documents attached to a loan
    pub async fn list_documents(&self, loan_id: Uuid) -> ApiResult<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE loan_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(documents)
    }

    /// Get a document row by ID
    pub async fn get_document(&self, id: Uuid) -> ApiResult<Document> {
        let document = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        document.ok_or_else(|| ApiError::NotFound(format!("Document {id} not found")))
    }

    /// Issue a signed retrieval URL for a document
    pub async fn signed_url(&self, document: &Document) -> ApiResult<SignedUrlResponse> {
        self.storage.sign_url(&document.storage_key).await
    }
}
