use chrono::{DateTime, Utc};

use super::utils::{parse_json_column, parse_optional_timestamp, parse_timestamp};
use super::{Database, DatabaseError};
use crate::backoffice::conversations::{Conversation, ConversationId, Message, NewMessage};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct ConversationRow {
    id: String,
    participants: Vec<String>,
    last_message: Option<String>,
    last_message_timestamp: Option<DateTime<Utc>>,
    last_message_sender_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for ConversationRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<i64>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            participants: parse_json_column(row, "participants")?,
            last_message: row.try_get("last_message")?,
            last_message_timestamp: parse_optional_timestamp(row, "last_message_timestamp")?,
            last_message_sender_id: row.try_get("last_message_sender_id")?,
            created_at: parse_timestamp(row, "created_at")?,
        })
    }
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation> {
        let participants: [String; 2] = self.participants.try_into().map_err(|found: Vec<String>| {
            DatabaseError::Sqlx(sqlx::Error::ColumnDecode {
                index: "participants".to_string(),
                source: format!("expected 2 participants, found {}", found.len()).into(),
            })
        })?;
        Ok(Conversation {
            id: ConversationId::from_stored(self.id),
            participants,
            last_message: self.last_message,
            last_message_timestamp: self.last_message_timestamp,
            last_message_sender_id: self.last_message_sender_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    receiver_id: String,
    text: String,
    timestamp: DateTime<Utc>,
    read: bool,
    deleted_for: Vec<String>,
}

impl<'r, R> sqlx::FromRow<'r, R> for MessageRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        let read: i64 = row.try_get("read")?;
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            text: row.try_get("text")?,
            timestamp: parse_timestamp(row, "timestamp")?,
            read: read != 0,
            deleted_for: parse_json_column(row, "deleted_for")?,
        })
    }
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: ConversationId::from_stored(row.conversation_id),
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            text: row.text,
            timestamp: row.timestamp,
            read: row.read,
            deleted_for: row.deleted_for,
        }
    }
}

/// What a soft-delete request did to the stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SoftDeleteOutcome {
    Applied,
    AlreadyHidden,
    NotFound,
    NotParticipant,
}

impl Conversation {
    /// Conversations whose participant list contains `user_id`, most recently active first.
    pub(crate) async fn find_for_participant(
        user_id: &str,
        database: &Database,
    ) -> Result<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT * FROM conversations
             WHERE EXISTS (SELECT 1 FROM json_each(conversations.participants) WHERE value = ?)
             ORDER BY COALESCE(last_message_timestamp, created_at) DESC",
        )
        .bind(user_id)
        .fetch_all(&database.pool)
        .await?;

        rows.into_iter().map(ConversationRow::into_conversation).collect()
    }

    pub(crate) async fn find_by_id(
        id: &ConversationId,
        database: &Database,
    ) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as("SELECT * FROM conversations WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&database.pool)
            .await?;
        row.map(ConversationRow::into_conversation).transpose()
    }
}

impl Message {
    /// Every message of a conversation in ascending timestamp order, ties in insertion order.
    pub(crate) async fn find_thread(
        conversation_id: &ConversationId,
        database: &Database,
    ) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages
             WHERE conversation_id = ?
             ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(conversation_id.as_str())
        .fetch_all(&database.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    /// Messages addressed to `receiver_id` that are still unread.
    pub(crate) async fn find_unread_for(receiver_id: &str, database: &Database) -> Result<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT * FROM messages
             WHERE receiver_id = ? AND read = 0
             ORDER BY timestamp ASC, rowid ASC",
        )
        .bind(receiver_id)
        .fetch_all(&database.pool)
        .await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    pub(crate) async fn find_by_id(message_id: &str, database: &Database) -> Result<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&database.pool)
            .await?;
        Ok(row.map(Message::from))
    }

    /// Inserts the message and upserts the conversation summary in one transaction.
    pub(crate) async fn append(new_message: &NewMessage, database: &Database) -> Result<Message> {
        let conversation_id = new_message.conversation_id();
        let mut participants = [new_message.sender_id.clone(), new_message.receiver_id.clone()];
        participants.sort();
        let participants_json = serde_json::to_string(&participants)?;
        let timestamp_ms = new_message.timestamp.timestamp_millis();
        let message_id = uuid::Uuid::new_v4().to_string();

        let mut txn = database.pool.begin().await?;

        sqlx::query(
            "INSERT INTO conversations
                (id, participants, last_message, last_message_timestamp, last_message_sender_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                last_message = excluded.last_message,
                last_message_timestamp = excluded.last_message_timestamp,
                last_message_sender_id = excluded.last_message_sender_id",
        )
        .bind(conversation_id.as_str())
        .bind(&participants_json)
        .bind(&new_message.text)
        .bind(timestamp_ms)
        .bind(&new_message.sender_id)
        .bind(timestamp_ms)
        .execute(&mut *txn)
        .await?;

        let row: MessageRow = sqlx::query_as(
            "INSERT INTO messages (id, conversation_id, sender_id, receiver_id, text, timestamp, read, deleted_for)
             VALUES (?, ?, ?, ?, ?, ?, 0, '[]')
             RETURNING *",
        )
        .bind(&message_id)
        .bind(conversation_id.as_str())
        .bind(&new_message.sender_id)
        .bind(&new_message.receiver_id)
        .bind(&new_message.text)
        .bind(timestamp_ms)
        .fetch_one(&mut *txn)
        .await?;

        txn.commit().await?;

        Ok(row.into())
    }

    /// Flags every unread message addressed to `reader_id` in the conversation as read,
    /// in a single statement. Returns the number of messages that changed.
    pub(crate) async fn mark_read(
        conversation_id: &ConversationId,
        reader_id: &str,
        database: &Database,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET read = 1
             WHERE conversation_id = ? AND receiver_id = ? AND read = 0",
        )
        .bind(conversation_id.as_str())
        .bind(reader_id)
        .execute(&database.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Appends `viewer_id` to the message's `deleted_for` set unless already present.
    pub(crate) async fn soft_delete(
        conversation_id: &ConversationId,
        message_id: &str,
        viewer_id: &str,
        database: &Database,
    ) -> Result<SoftDeleteOutcome> {
        let Some(message) = Self::find_by_id(message_id, database).await? else {
            return Ok(SoftDeleteOutcome::NotFound);
        };
        if &message.conversation_id != conversation_id {
            return Ok(SoftDeleteOutcome::NotFound);
        }
        if message.sender_id != viewer_id && message.receiver_id != viewer_id {
            return Ok(SoftDeleteOutcome::NotParticipant);
        }

        let result = sqlx::query(
            "UPDATE messages
             SET deleted_for = json_insert(deleted_for, '$[#]', ?)
             WHERE id = ? AND conversation_id = ?
               AND NOT EXISTS (SELECT 1 FROM json_each(messages.deleted_for) WHERE value = ?)",
        )
        .bind(viewer_id)
        .bind(message_id)
        .bind(conversation_id.as_str())
        .bind(viewer_id)
        .execute(&database.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(SoftDeleteOutcome::AlreadyHidden)
        } else {
            Ok(SoftDeleteOutcome::Applied)
        }
    }
}
