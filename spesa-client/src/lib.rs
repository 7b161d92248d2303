//! Spesa Client - Concrete Collaborators for the Sync Layer
//!
//! An HTTP transport, TOML configuration, a file-backed credential store,
//! the endpoint catalogue of the Spesa API, the sign-in flow, toast
//! notifications and tracing setup.

pub mod api;
pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod notifications;
pub mod session;
pub mod telemetry;

pub use api::{Api, AuthApi, OffersApi, UsersApi};
pub use app::Spesa;
pub use config::{CacheSection, ClientConfig, ConfigError};
pub use credentials::{CredentialError, FileCredentialStore, TokenStore};
pub use error::{ClientError, ClientResult};
pub use http::{HttpTransport, AUTH_HEADER};
pub use notifications::{Notification, NotificationAction, NotificationLevel};
pub use session::Session;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
