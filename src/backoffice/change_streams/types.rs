//! Types carried on the change streams.

use serde::{Deserialize, Serialize};

use crate::backoffice::conversations::ConversationId;

/// What a listener can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    /// Any conversation the user takes part in, and any message within one.
    Participant(String),

    /// The messages of a single conversation.
    Conversation(ConversationId),
}

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A message was added; the conversation summary may have been created with it.
    MessageAdded,

    /// One or more messages were flagged read.
    MessagesRead,

    /// A message was hidden for one viewer.
    MessageHidden,
}

/// A notice that something changed. Carries no data: the snapshot is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub conversation_id: ConversationId,
    pub kind: ChangeKind,
}

impl ChangeNotice {
    /// Every topic that should hear about a change in the conversation between `participants`.
    pub fn topics(&self, participants: [&str; 2]) -> [Topic; 3] {
        [
            Topic::Participant(participants[0].to_string()),
            Topic::Participant(participants[1].to_string()),
            Topic::Conversation(self.conversation_id.clone()),
        ]
    }
}
