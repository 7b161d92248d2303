//! Error types for the client crate.

use spesa_sync::SyncError;

use crate::config::ConfigError;
use crate::credentials::CredentialError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

pub type ClientResult<T> = Result<T, ClientError>;
