//! Toast-style feedback derived from query and mutation outcomes.
//!
//! The sync layer never shows anything; screens turn outcomes into
//! notifications with [`Notification::from_outcome`].

use chrono::{DateTime, Utc};
use spesa_sync::{SyncError, SyncResult, NETWORK_FAILURE_MESSAGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Retry,
    Dismiss,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
            action: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Feedback for a settled operation named `label`.
    pub fn from_outcome<T>(label: &str, outcome: &SyncResult<T>) -> Self {
        match outcome {
            Ok(_) => Self::new(NotificationLevel::Success, label, "Done"),
            Err(err) => Self::from_error(label, err),
        }
    }

    pub fn from_error(label: &str, err: &SyncError) -> Self {
        if err.is_network() {
            return Self::new(
                NotificationLevel::Error,
                "Connection error",
                NETWORK_FAILURE_MESSAGE,
            )
            .with_action(NotificationAction::Retry);
        }
        if err.is_unauthorized() {
            return Self::new(NotificationLevel::Error, "Session expired", err.message())
                .with_action(NotificationAction::Dismiss);
        }
        let level = match err {
            SyncError::Validation(_) => NotificationLevel::Warning,
            _ => NotificationLevel::Error,
        };
        Self::new(level, label, err.message()).with_action(NotificationAction::Dismiss)
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spesa_core::ApiFailure;

    #[test]
    fn success_outcome() {
        let note = Notification::from_outcome("Item added", &Ok::<_, SyncError>(()));
        assert_eq!(note.level, NotificationLevel::Success);
        assert_eq!(note.title, "Item added");
        assert!(note.action.is_none());
    }

    #[test]
    fn network_failure_offers_retry() {
        let err = SyncError::Network {
            reason: "connection refused".into(),
        };
        let note = Notification::from_outcome::<()>("Item added", &Err(err));
        assert!(note.is_error());
        assert_eq!(note.message, NETWORK_FAILURE_MESSAGE);
        assert_eq!(note.action, Some(NotificationAction::Retry));
    }

    #[test]
    fn validation_failure_is_a_warning_with_server_message() {
        let err = SyncError::from_failure(ApiFailure::from_json(
            400,
            &serde_json::json!({"errors": [{"msg": "Name required"}]}),
        ));
        let note = Notification::from_error("Profile", &err);
        assert_eq!(note.level, NotificationLevel::Warning);
        assert_eq!(note.message, "Name required");
        assert_eq!(note.action, Some(NotificationAction::Dismiss));
    }

    #[test]
    fn unauthorized_reads_as_expired_session() {
        let err = SyncError::from_failure(ApiFailure::new(401, "Token is not valid"));
        let note = Notification::from_error("Shopping list", &err);
        assert_eq!(note.title, "Session expired");
        assert_eq!(note.message, "Token is not valid");
    }
}
