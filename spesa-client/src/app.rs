//! Wiring of transport, credentials, cache and endpoints.

use spesa_sync::{CacheConfig, CacheStore, CredentialSource, SyncClient, Transport};
use std::sync::Arc;
use tracing::info;

use crate::api::Api;
use crate::config::ClientConfig;
use crate::credentials::{FileCredentialStore, TokenStore};
use crate::error::ClientResult;
use crate::http::HttpTransport;
use crate::session::Session;

/// Everything a front end needs: the endpoints, the session flow and the
/// underlying sync client.
#[derive(Clone)]
pub struct Spesa {
    client: SyncClient,
    api: Api,
    session: Session,
}

impl Spesa {
    /// Build the production stack from a validated config.
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let transport = HttpTransport::from_config(config)?;
        let tokens = Arc::new(FileCredentialStore::open(&config.credential_path)?);
        info!(
            base_url = transport.base_url(),
            signed_in = tokens.token().is_some(),
            "client ready"
        );
        Ok(Self::with_parts(
            Arc::new(transport),
            tokens,
            config.cache_config(),
        ))
    }

    /// Assemble a client from explicit collaborators.
    pub fn with_parts<S>(transport: Arc<dyn Transport>, tokens: Arc<S>, cache: CacheConfig) -> Self
    where
        S: TokenStore + 'static,
    {
        let client = SyncClient::new(CacheStore::new(cache), transport, tokens.clone());
        let api = Api::new(&client);
        let session = Session::new(client.clone(), api.clone(), tokens);
        Self {
            client,
            api,
            session,
        }
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sync(&self) -> &SyncClient {
        &self.client
    }

    pub fn store(&self) -> &CacheStore {
        self.client.store()
    }
}
