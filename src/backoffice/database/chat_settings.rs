use chrono::{DateTime, Utc};

use super::utils::parse_timestamp;
use super::{Database, DatabaseError};
use crate::backoffice::chat_settings::ChatSettings;

#[derive(Debug)]
struct ChatSettingsRow {
    user_id: String,
    notifications_muted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for ChatSettingsRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        let user_id: String = row.try_get("user_id")?;
        let muted: i64 = row.try_get("notifications_muted")?;
        let created_at = parse_timestamp(row, "created_at")?;
        let updated_at = parse_timestamp(row, "updated_at")?;

        Ok(ChatSettingsRow {
            user_id,
            notifications_muted: muted != 0,
            created_at,
            updated_at,
        })
    }
}

impl From<ChatSettingsRow> for ChatSettings {
    fn from(row: ChatSettingsRow) -> Self {
        ChatSettings {
            user_id: row.user_id,
            notifications_muted: row.notifications_muted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl ChatSettings {
    /// Loads the user's settings, falling back to defaults when none were saved yet.
    pub(crate) async fn load(user_id: &str, database: &Database) -> Result<ChatSettings, DatabaseError> {
        let row = sqlx::query_as::<_, ChatSettingsRow>("SELECT * FROM chat_settings WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&database.pool)
            .await?;
        Ok(row.map(ChatSettings::from).unwrap_or_else(|| ChatSettings::new(user_id)))
    }

    pub(crate) async fn save(&self, database: &Database) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO chat_settings (user_id, notifications_muted, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                notifications_muted = excluded.notifications_muted,
                updated_at = excluded.updated_at",
        )
        .bind(&self.user_id)
        .bind(self.notifications_muted as i64)
        .bind(self.created_at.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&database.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoffice::database::tests::create_test_db;
    use crate::backoffice::users::{Role, User};

    #[tokio::test]
    async fn test_load_defaults_when_missing() {
        let (db, _dir) = create_test_db().await;
        let settings = ChatSettings::load("ana", &db).await.unwrap();
        assert_eq!(settings.user_id, "ana");
        assert!(!settings.notifications_muted);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let (db, _dir) = create_test_db().await;
        User::new("ana", "Ana", Role::Admin).save(&db).await.unwrap();

        let mut settings = ChatSettings::load("ana", &db).await.unwrap();
        settings.notifications_muted = true;
        settings.save(&db).await.unwrap();
        assert!(ChatSettings::load("ana", &db).await.unwrap().notifications_muted);

        settings.notifications_muted = false;
        settings.save(&db).await.unwrap();
        assert!(!ChatSettings::load("ana", &db).await.unwrap().notifications_muted);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_settings")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_save_requires_known_user() {
        let (db, _dir) = create_test_db().await;
        let settings = ChatSettings::new("ghost");
        assert!(settings.save(&db).await.is_err());
    }
}
