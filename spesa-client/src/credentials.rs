//! Durable storage of the session token.
//!
//! The token lives in one small JSON document, `{"token": "..."}`. A missing
//! file, or a document without a token, means nobody is signed in.

use serde::{Deserialize, Serialize};
use spesa_sync::{CredentialSource, InMemoryCredentials};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A credential source the session flow can write to.
pub trait TokenStore: CredentialSource {
    fn store_token(&self, token: &str) -> Result<(), CredentialError>;
    fn clear_token(&self) -> Result<(), CredentialError>;
}

impl TokenStore for InMemoryCredentials {
    fn store_token(&self, token: &str) -> Result<(), CredentialError> {
        self.set_token(token);
        Ok(())
    }

    fn clear_token(&self) -> Result<(), CredentialError> {
        self.clear();
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

fn load(path: &Path) -> Result<Option<String>, CredentialError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let persisted = serde_json::from_str::<PersistedToken>(&contents)?;
    Ok(persisted.token.filter(|token| !token.is_empty()))
}

fn save(path: &Path, token: &str) -> Result<(), CredentialError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(&PersistedToken {
        token: Some(token.to_string()),
    })?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Token persisted to a file, cached in memory after the first read.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    token: RwLock<Option<String>>,
}

impl FileCredentialStore {
    /// Open the store at `path`, reading any token already saved there.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let path = path.into();
        let token = load(&path)?;
        debug!(path = %path.display(), signed_in = token.is_some(), "opened credential store");
        Ok(Self {
            path,
            token: RwLock::new(token),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, picking up changes made by another process.
    pub fn reload(&self) -> Result<Option<String>, CredentialError> {
        let token = load(&self.path)?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token.clone();
        Ok(token)
    }

    pub fn set_token(&self, token: &str) -> Result<(), CredentialError> {
        save(&self.path, token)?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

impl CredentialSource for FileCredentialStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenStore for FileCredentialStore {
    fn store_token(&self, token: &str) -> Result<(), CredentialError> {
        self.set_token(token)
    }

    fn clear_token(&self) -> Result<(), CredentialError> {
        self.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::open(dir.path().join("token.json")).unwrap();
        assert_eq!(store.token(), None);
    }

    #[test]
    fn token_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let store = FileCredentialStore::open(&path).unwrap();
        store.set_token("abc").unwrap();
        assert_eq!(store.token().as_deref(), Some("abc"));

        let reopened = FileCredentialStore::open(&path).unwrap();
        assert_eq!(reopened.token().as_deref(), Some("abc"));
        let saved = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(json, serde_json::json!({"token": "abc"}));
    }

    #[test]
    fn clear_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = FileCredentialStore::open(&path).unwrap();
        store.set_token("abc").unwrap();
        store.clear().unwrap();
        assert_eq!(store.token(), None);
        assert!(!path.exists());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn document_without_token_is_anonymous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{}").unwrap();
        assert_eq!(FileCredentialStore::open(&path).unwrap().token(), None);
        std::fs::write(&path, "{\"token\": \"\"}").unwrap();
        assert_eq!(FileCredentialStore::open(&path).unwrap().token(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileCredentialStore::open(&path),
            Err(CredentialError::Serde(_))
        ));
    }

    #[test]
    fn reload_sees_external_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        let store = FileCredentialStore::open(&path).unwrap();
        std::fs::write(&path, "{\"token\": \"from-elsewhere\"}").unwrap();
        assert_eq!(store.token(), None);
        assert_eq!(store.reload().unwrap().as_deref(), Some("from-elsewhere"));
        assert_eq!(store.token().as_deref(), Some("from-elsewhere"));
    }
}
