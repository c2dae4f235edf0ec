//! Centralized reporting for background write failures.
//!
//! Chat writes are fire-and-forget from the caller's point of view. When one fails
//! the failure is published here instead of surfacing at the call site.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::backoffice::conversations::ConversationId;

const BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOperation {
    SendMessage,
    MarkRead,
    SoftDelete,
    SaveSettings,
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOperation::SendMessage => write!(f, "send message"),
            WriteOperation::MarkRead => write!(f, "mark read"),
            WriteOperation::SoftDelete => write!(f, "soft delete"),
            WriteOperation::SaveSettings => write!(f, "save settings"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub operation: WriteOperation,
    pub user_id: String,
    pub conversation_id: Option<ConversationId>,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorReporter {
    sender: broadcast::Sender<ErrorEvent>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUFFER_SIZE);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ErrorEvent> {
        self.sender.subscribe()
    }

    pub fn report(&self, event: ErrorEvent) {
        tracing::error!(
            target: "backoffice_chat::error_events",
            "Failed to {} for {}: {}",
            event.operation,
            event.user_id,
            event.message
        );
        // Nobody listening is fine; the failure is already logged
        let _ = self.sender.send(event);
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(operation: WriteOperation) -> ErrorEvent {
        ErrorEvent {
            operation,
            user_id: "ana".to_string(),
            conversation_id: Some(ConversationId::for_pair("ana", "bruno")),
            message: "permission denied".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_report_reaches_every_subscriber() {
        let reporter = ErrorReporter::new();
        let mut first = reporter.subscribe();
        let mut second = reporter.clone().subscribe();

        reporter.report(event(WriteOperation::SendMessage));

        assert_eq!(first.recv().await.unwrap().operation, WriteOperation::SendMessage);
        assert_eq!(second.recv().await.unwrap().operation, WriteOperation::SendMessage);
    }

    #[test]
    fn test_report_without_subscribers_does_not_panic() {
        let reporter = ErrorReporter::default();
        reporter.report(event(WriteOperation::MarkRead));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(WriteOperation::SoftDelete.to_string(), "soft delete");
        assert_eq!(WriteOperation::SaveSettings.to_string(), "save settings");
    }
}
