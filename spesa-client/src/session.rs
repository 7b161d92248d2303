//! Sign-in state.
//!
//! Changing who is signed in changes what every cached resource means, so
//! each transition ends by invalidating (or, for a deleted account,
//! dropping) the whole cache.

use spesa_core::{AuthResponse, LoginRequest, MessageResponse, RegisterRequest};
use spesa_sync::{CredentialSource, SyncClient};
use std::sync::Arc;
use tracing::{debug, info};

use crate::api::Api;
use crate::credentials::TokenStore;
use crate::error::ClientResult;

#[derive(Clone)]
pub struct Session {
    client: SyncClient,
    api: Api,
    tokens: Arc<dyn TokenStore>,
}

impl Session {
    /// `tokens` must be the same store the client reads its token from.
    pub fn new(client: SyncClient, api: Api, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            api,
            tokens,
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.tokens.token().is_some()
    }

    pub async fn login(&self, credentials: &LoginRequest) -> ClientResult<AuthResponse> {
        let response = self.api.auth.login.mutate(credentials).await?;
        self.sign_in(&response)?;
        Ok(response)
    }

    pub async fn register(&self, details: &RegisterRequest) -> ClientResult<AuthResponse> {
        let response = self.api.auth.register.mutate(details).await?;
        self.sign_in(&response)?;
        Ok(response)
    }

    /// Forget the token. Subscribed queries refetch anonymously.
    pub fn logout(&self) -> ClientResult<()> {
        self.tokens.clear_token()?;
        let stale = self.client.invalidate_all();
        info!(invalidated = stale.len(), "signed out");
        Ok(())
    }

    /// Delete the account on the server; on success the token and every
    /// cached entry are dropped.
    pub async fn delete_account(&self) -> ClientResult<MessageResponse> {
        let response = self.api.users.delete_account.mutate(&()).await?;
        self.tokens.clear_token()?;
        self.client.store().clear();
        info!("account deleted");
        Ok(response)
    }

    fn sign_in(&self, response: &AuthResponse) -> ClientResult<()> {
        self.tokens.store_token(&response.token)?;
        let stale = self.client.invalidate_all();
        debug!(invalidated = stale.len(), "token stored");
        info!(
            user = ?response.user.as_ref().map(|user| user.id.as_str()),
            "signed in"
        );
        Ok(())
    }
}
