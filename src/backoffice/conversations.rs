use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backoffice::Backoffice;
use crate::backoffice::error::{BackofficeError, Result};
use crate::backoffice::store::ChatStore;
use crate::backoffice::users::User;

const PAIR_SEPARATOR: char = '_';

/// Identifier of the one-to-one conversation between two users.
///
/// Built from the two user ids in sorted order, so `for_pair(a, b) == for_pair(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn for_pair(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        ConversationId(format!("{first}{PAIR_SEPARATOR}{second}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wraps an id read back from storage.
    pub(crate) fn from_stored(id: String) -> Self {
        ConversationId(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Summary row for a conversation between exactly two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [String; 2],
    pub last_message: Option<String>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub last_message_sender_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// The participant that isn't `user_id`.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b.as_str()),
            [a, b] if b == user_id => Some(a.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: ConversationId,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub deleted_for: Vec<String>,
}

impl Message {
    pub fn is_deleted_for(&self, user_id: &str) -> bool {
        self.deleted_for.iter().any(|id| id == user_id)
    }

    pub fn is_unread_for(&self, user_id: &str) -> bool {
        self.receiver_id == user_id && !self.read
    }
}

/// A message about to be written. The store assigns the id and the conversation upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl NewMessage {
    pub fn new(sender_id: &str, receiver_id: &str, text: &str) -> Result<Self> {
        if sender_id == receiver_id {
            return Err(BackofficeError::SelfConversation);
        }
        if text.trim().is_empty() {
            return Err(BackofficeError::EmptyMessage);
        }
        Ok(Self {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
            timestamp: Utc::now(),
        })
    }

    pub fn conversation_id(&self) -> ConversationId {
        ConversationId::for_pair(&self.sender_id, &self.receiver_id)
    }
}

/// Messages of a thread as `viewer_id` sees them: everything they haven't soft-deleted.
pub fn visible_to<'a>(messages: &'a [Message], viewer_id: &str) -> Vec<&'a Message> {
    messages
        .iter()
        .filter(|m| !m.is_deleted_for(viewer_id))
        .collect()
}

impl Backoffice {
    /// Sends a message outside of any widget, creating the conversation on first use.
    pub async fn send_message(&self, sender_id: &str, receiver_id: &str, text: &str) -> Result<Message> {
        let new_message = NewMessage::new(sender_id, receiver_id, text)?;
        self.find_user(sender_id).await?;
        self.find_user(receiver_id).await?;
        Ok(self.store.append_message(new_message).await?)
    }

    /// Marks every message `reader_id` received from `counterpart_id` as read.
    /// Returns how many messages changed.
    pub async fn mark_conversation_read(&self, reader_id: &str, counterpart_id: &str) -> Result<u64> {
        let conversation_id = ConversationId::for_pair(reader_id, counterpart_id);
        Ok(self.store.mark_read(&conversation_id, reader_id).await?)
    }

    pub async fn soft_delete_message(
        &self,
        viewer_id: &str,
        counterpart_id: &str,
        message_id: &str,
    ) -> Result<()> {
        let conversation_id = ConversationId::for_pair(viewer_id, counterpart_id);
        self.store
            .soft_delete(&conversation_id, message_id, viewer_id)
            .await?;
        Ok(())
    }

    /// The thread between `viewer_id` and `counterpart_id` with the viewer's deletions applied.
    pub async fn visible_thread(&self, viewer_id: &str, counterpart_id: &str) -> Result<Vec<Message>> {
        let conversation_id = ConversationId::for_pair(viewer_id, counterpart_id);
        let messages = self.store.thread(&conversation_id).await?;
        Ok(messages
            .into_iter()
            .filter(|m| !m.is_deleted_for(viewer_id))
            .collect())
    }

    /// The raw thread between two users, soft-deleted messages included.
    pub async fn audit_thread(&self, auditor_id: &str, a: &str, b: &str) -> Result<Vec<Message>> {
        let auditor: User = self.find_user(auditor_id).await?;
        if !auditor.role.can_audit() {
            tracing::warn!(
                target: "backoffice_chat::conversations::audit_thread",
                "User {} with role {} attempted to audit a conversation",
                auditor.id,
                auditor.role
            );
            return Err(BackofficeError::NotAuthorized);
        }
        Ok(self.store.thread(&ConversationId::for_pair(a, b)).await?)
    }
}
