//! Error types for landmark sync

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed landmark identity: {0:?}")]
    InvalidIdentity(String),

    #[error("Invalid language: {0:?}")]
    InvalidLanguage(String),

    #[error("Unknown comment version: {id}")]
    IdentityNotFound { id: String },

    #[error("Comment version already exists: {id}")]
    VersionExists { id: String },

    #[error("Landmark {landmark:?} appears more than once")]
    DuplicateLandmark { landmark: String },

    #[error("Landmark {landmark:?} has no entry in the local identity map")]
    UnknownLandmark { landmark: String },

    #[error("Malformed provider response for {id} ({language}): {reason}")]
    ProviderMalformed {
        id: String,
        language: String,
        reason: String,
    },

    #[error("Translation provider unavailable for {id} ({language}): {reason}")]
    ProviderUnavailable {
        id: String,
        language: String,
        reason: String,
    },

    #[error("Source file {path} is outside the project root {root}")]
    SourceOutsideRoot { path: String, root: String },

    #[error("Local identity map {path} is unreadable: {reason}")]
    MetadataCorrupt { path: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Pipeline stage the error was raised in
    pub fn stage(&self) -> &'static str {
        match self {
            SyncError::InvalidRequest(_)
            | SyncError::InvalidIdentity(_)
            | SyncError::InvalidLanguage(_) => "request",
            SyncError::DuplicateLandmark { .. } | SyncError::UnknownLandmark { .. } => "decode",
            SyncError::IdentityNotFound { .. } => "lookup",
            SyncError::ProviderMalformed { .. } | SyncError::ProviderUnavailable { .. } => "resolve",
            SyncError::VersionExists { .. } | SyncError::Database(_) => "store",
            SyncError::SourceOutsideRoot { .. }
            | SyncError::MetadataCorrupt { .. }
            | SyncError::Io(_)
            | SyncError::Json(_) => "metadata",
        }
    }

    /// Identity the failure is about, when there is one
    pub fn identity(&self) -> Option<&str> {
        match self {
            SyncError::IdentityNotFound { id }
            | SyncError::VersionExists { id }
            | SyncError::ProviderMalformed { id, .. }
            | SyncError::ProviderUnavailable { id, .. } => Some(id),
            SyncError::InvalidIdentity(raw) => Some(raw),
            _ => None,
        }
    }

    /// Target language the failure is about, when there is one
    pub fn language(&self) -> Option<&str> {
        match self {
            SyncError::ProviderMalformed { language, .. }
            | SyncError::ProviderUnavailable { language, .. } => Some(language),
            _ => None,
        }
    }

    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::InvalidRequest(_) => "invalid_request",
            SyncError::InvalidIdentity(_) => "invalid_identity",
            SyncError::InvalidLanguage(_) => "invalid_language",
            SyncError::IdentityNotFound { .. } => "identity_not_found",
            SyncError::VersionExists { .. } => "version_exists",
            SyncError::DuplicateLandmark { .. } => "duplicate_landmark",
            SyncError::UnknownLandmark { .. } => "unknown_landmark",
            SyncError::ProviderMalformed { .. } => "provider_malformed",
            SyncError::ProviderUnavailable { .. } => "provider_unavailable",
            SyncError::SourceOutsideRoot { .. } => "source_outside_root",
            SyncError::MetadataCorrupt { .. } => "metadata_corrupt",
            SyncError::Database(_) => "database_error",
            SyncError::Io(_) => "io_error",
            SyncError::Json(_) => "json_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::InvalidRequest(_)
            | SyncError::InvalidIdentity(_)
            | SyncError::InvalidLanguage(_)
            | SyncError::DuplicateLandmark { .. }
            | SyncError::UnknownLandmark { .. }
            | SyncError::SourceOutsideRoot { .. } => StatusCode::BAD_REQUEST,
            SyncError::IdentityNotFound { .. } => StatusCode::NOT_FOUND,
            SyncError::VersionExists { .. } => StatusCode::CONFLICT,
            SyncError::ProviderMalformed { .. } | SyncError::ProviderUnavailable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            SyncError::MetadataCorrupt { .. }
            | SyncError::Database(_)
            | SyncError::Io(_)
            | SyncError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured body shared by the error response and batch failure reports
    pub fn report(&self) -> ErrorReport {
        let message = match self {
            // Don't leak driver details to API callers
            SyncError::Database(_) => "Database error".to_string(),
            SyncError::Io(_) => "IO error".to_string(),
            _ => self.to_string(),
        };

        ErrorReport {
            error: self.kind().to_string(),
            message,
            stage: self.stage().to_string(),
            identity: self.identity().map(str::to_string),
            language: self.language().map(str::to_string),
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorReport {
    pub error: String,
    pub message: String,
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{} failed: {}", self.stage(), self);
        } else {
            tracing::warn!("{} rejected: {}", self.stage(), self);
        }

        (status, Json(self.report())).into_response()
    }
}
