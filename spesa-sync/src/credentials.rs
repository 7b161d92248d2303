//! Where the session token comes from.
//!
//! The client reads the token on every request, so a login or logout takes
//! effect on the next call without rebuilding anything.

use std::sync::{PoisonError, RwLock};

/// Source of the current session token.
pub trait CredentialSource: Send + Sync {
    /// The token to attach, or `None` when nobody is signed in.
    fn token(&self) -> Option<String>;
}

/// Never supplies a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl CredentialSource for Anonymous {
    fn token(&self) -> Option<String> {
        None
    }
}

/// Token held in memory only; lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    token: RwLock<Option<String>>,
}

impl InMemoryCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialSource for InMemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|token| !token.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_counts_as_signed_out() {
        let credentials = InMemoryCredentials::new(Some(String::new()));
        assert_eq!(credentials.token(), None);
    }

    #[test]
    fn set_and_clear() {
        let credentials = InMemoryCredentials::default();
        credentials.set_token("abc");
        assert_eq!(credentials.token().as_deref(), Some("abc"));
        credentials.clear();
        assert_eq!(credentials.token(), None);
        assert_eq!(Anonymous.token(), None);
    }
}
