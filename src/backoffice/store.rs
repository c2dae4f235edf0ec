//! The record store seam.
//!
//! [`ChatStore`] is everything the chat needs from a document store: filtered reads,
//! the few writes the chat performs, and a change feed per [`Topic`].
//! [`SqliteChatStore`] backs it with the local SQLite database.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::backoffice::change_streams::{ChangeKind, ChangeNotice, ChangeStreamManager, Topic};
use crate::backoffice::chat_settings::ChatSettings;
use crate::backoffice::conversations::{Conversation, ConversationId, Message, NewMessage};
use crate::backoffice::database::conversations::SoftDeleteOutcome;
use crate::backoffice::database::{Database, DatabaseError};
use crate::backoffice::users::User;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn upsert_user(&self, user: &User) -> StoreResult<User>;

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>>;

    async fn list_users(&self) -> StoreResult<Vec<User>>;

    /// Conversations whose participants contain `user_id`.
    async fn conversations_for(&self, user_id: &str) -> StoreResult<Vec<Conversation>>;

    /// Messages with `receiver = user_id` and `read = false`.
    async fn unread_messages_for(&self, user_id: &str) -> StoreResult<Vec<Message>>;

    /// The raw thread in ascending timestamp order.
    async fn thread(&self, conversation_id: &ConversationId) -> StoreResult<Vec<Message>>;

    /// Adds the message and upserts the conversation summary as one write.
    async fn append_message(&self, message: NewMessage) -> StoreResult<Message>;

    /// Flags the reader's unread messages in the conversation read. Returns how many changed.
    async fn mark_read(&self, conversation_id: &ConversationId, reader_id: &str) -> StoreResult<u64>;

    /// Hides the message for `viewer_id` only.
    async fn soft_delete(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
        viewer_id: &str,
    ) -> StoreResult<()>;

    async fn chat_settings(&self, user_id: &str) -> StoreResult<ChatSettings>;

    async fn save_chat_settings(&self, settings: &ChatSettings) -> StoreResult<()>;

    /// Registers a listener on `topic`. Register before reading the snapshot you render.
    fn watch(&self, topic: &Topic) -> broadcast::Receiver<ChangeNotice>;
}

pub struct SqliteChatStore {
    database: Arc<Database>,
    streams: ChangeStreamManager,
}

impl SqliteChatStore {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database,
            streams: ChangeStreamManager::new(),
        }
    }

    fn notify(&self, conversation_id: &ConversationId, participants: [&str; 2], kind: ChangeKind) {
        let notice = ChangeNotice {
            conversation_id: conversation_id.clone(),
            kind,
        };
        for topic in notice.topics(participants) {
            self.streams.emit(&topic, notice.clone());
        }
        tracing::trace!(
            target: "backoffice_chat::store",
            "Emitted {:?} for conversation {}",
            kind,
            conversation_id
        );
    }

    /// Emits to the participants of a stored conversation, looked up by id.
    async fn notify_conversation(&self, conversation_id: &ConversationId, kind: ChangeKind) -> StoreResult<()> {
        let conversation = Conversation::find_by_id(conversation_id, &self.database)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))?;
        let [a, b] = &conversation.participants;
        self.notify(conversation_id, [a.as_str(), b.as_str()], kind);
        Ok(())
    }
}

impl std::fmt::Debug for SqliteChatStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteChatStore")
            .field("database", &self.database.path)
            .field("topics", &self.streams.topic_count())
            .finish()
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn upsert_user(&self, user: &User) -> StoreResult<User> {
        Ok(user.save(&self.database).await?)
    }

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(user_id, &self.database).await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(User::all(&self.database).await?)
    }

    async fn conversations_for(&self, user_id: &str) -> StoreResult<Vec<Conversation>> {
        Ok(Conversation::find_for_participant(user_id, &self.database).await?)
    }

    async fn unread_messages_for(&self, user_id: &str) -> StoreResult<Vec<Message>> {
        Ok(Message::find_unread_for(user_id, &self.database).await?)
    }

    async fn thread(&self, conversation_id: &ConversationId) -> StoreResult<Vec<Message>> {
        Ok(Message::find_thread(conversation_id, &self.database).await?)
    }

    async fn append_message(&self, message: NewMessage) -> StoreResult<Message> {
        let stored = Message::append(&message, &self.database).await?;
        self.notify(
            &stored.conversation_id,
            [stored.sender_id.as_str(), stored.receiver_id.as_str()],
            ChangeKind::MessageAdded,
        );
        Ok(stored)
    }

    async fn mark_read(&self, conversation_id: &ConversationId, reader_id: &str) -> StoreResult<u64> {
        let changed = Message::mark_read(conversation_id, reader_id, &self.database).await?;
        if changed > 0 {
            tracing::debug!(
                target: "backoffice_chat::store::mark_read",
                "Marked {} message(s) read for {} in {}",
                changed,
                reader_id,
                conversation_id
            );
            self.notify_conversation(conversation_id, ChangeKind::MessagesRead)
                .await?;
        }
        Ok(changed)
    }

    async fn soft_delete(
        &self,
        conversation_id: &ConversationId,
        message_id: &str,
        viewer_id: &str,
    ) -> StoreResult<()> {
        match Message::soft_delete(conversation_id, message_id, viewer_id, &self.database).await? {
            SoftDeleteOutcome::Applied => {
                self.notify_conversation(conversation_id, ChangeKind::MessageHidden)
                    .await
            }
            SoftDeleteOutcome::AlreadyHidden => Ok(()),
            SoftDeleteOutcome::NotFound => {
                Err(StoreError::NotFound(format!("message {message_id} in {conversation_id}")))
            }
            SoftDeleteOutcome::NotParticipant => Err(StoreError::PermissionDenied(format!(
                "{viewer_id} is not a participant of message {message_id}"
            ))),
        }
    }

    async fn chat_settings(&self, user_id: &str) -> StoreResult<ChatSettings> {
        Ok(ChatSettings::load(user_id, &self.database).await?)
    }

    async fn save_chat_settings(&self, settings: &ChatSettings) -> StoreResult<()> {
        Ok(settings.save(&self.database).await?)
    }

    fn watch(&self, topic: &Topic) -> broadcast::Receiver<ChangeNotice> {
        self.streams.subscribe(topic)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backoffice::database::tests::create_test_db;
    use crate::backoffice::users::Role;
    use tempfile::TempDir;

    pub(crate) async fn create_test_store() -> (Arc<SqliteChatStore>, TempDir) {
        let (db, dir) = create_test_db().await;
        let store = Arc::new(SqliteChatStore::new(Arc::new(db)));
        for (id, name, role) in [
            ("ana", "Ana", Role::Admin),
            ("bruno", "Bruno", Role::Staff),
            ("caio", "Caio", Role::Supervisor),
        ] {
            store.upsert_user(&User::new(id, name, role)).await.unwrap();
        }
        (store, dir)
    }

    #[tokio::test]
    async fn test_append_notifies_participants_and_conversation() {
        let (store, _dir) = create_test_store().await;
        let conversation_id = ConversationId::for_pair("ana", "bruno");

        let mut ana = store.watch(&Topic::Participant("ana".to_string()));
        let mut bruno = store.watch(&Topic::Participant("bruno".to_string()));
        let mut caio = store.watch(&Topic::Participant("caio".to_string()));
        let mut thread = store.watch(&Topic::Conversation(conversation_id.clone()));

        store
            .append_message(NewMessage::new("ana", "bruno", "Olá").unwrap())
            .await
            .unwrap();

        assert_eq!(ana.try_recv().unwrap().kind, ChangeKind::MessageAdded);
        assert_eq!(bruno.try_recv().unwrap().conversation_id, conversation_id);
        assert!(thread.try_recv().is_ok());
        assert!(caio.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_mark_read_only_notifies_on_change() {
        let (store, _dir) = create_test_store().await;
        let conversation_id = ConversationId::for_pair("ana", "bruno");
        store
            .append_message(NewMessage::new("ana", "bruno", "Olá").unwrap())
            .await
            .unwrap();

        let mut bruno = store.watch(&Topic::Participant("bruno".to_string()));

        assert_eq!(store.mark_read(&conversation_id, "bruno").await.unwrap(), 1);
        assert_eq!(bruno.try_recv().unwrap().kind, ChangeKind::MessagesRead);

        assert_eq!(store.mark_read(&conversation_id, "bruno").await.unwrap(), 0);
        assert!(bruno.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_soft_delete_errors_map_to_store_errors() {
        let (store, _dir) = create_test_store().await;
        let conversation_id = ConversationId::for_pair("ana", "bruno");
        let message = store
            .append_message(NewMessage::new("ana", "bruno", "Olá").unwrap())
            .await
            .unwrap();

        assert!(matches!(
            store.soft_delete(&conversation_id, &message.id, "caio").await,
            Err(StoreError::PermissionDenied(_))
        ));
        assert!(matches!(
            store.soft_delete(&conversation_id, "missing", "ana").await,
            Err(StoreError::NotFound(_))
        ));

        let mut thread = store.watch(&Topic::Conversation(conversation_id.clone()));
        store.soft_delete(&conversation_id, &message.id, "ana").await.unwrap();
        assert_eq!(thread.try_recv().unwrap().kind, ChangeKind::MessageHidden);

        // Repeating is a silent no-op
        store.soft_delete(&conversation_id, &message.id, "ana").await.unwrap();
        assert!(thread.try_recv().is_err());
    }
}
