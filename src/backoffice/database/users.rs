use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::utils::{create_column_decode_error, parse_timestamp};
use super::{Database, DatabaseError};
use crate::backoffice::users::{Role, User};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct UserRow {
    id: String,
    display_name: String,
    role: Role,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for UserRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;
        let display_name: String = row.try_get("display_name")?;
        let role_str: String = row.try_get("role")?;
        let role = Role::from_str(&role_str).map_err(|e| create_column_decode_error("role", &e))?;
        let created_at = parse_timestamp(row, "created_at")?;
        let updated_at = parse_timestamp(row, "updated_at")?;

        Ok(UserRow {
            id,
            display_name,
            role,
            created_at,
            updated_at,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            display_name: row.display_name,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl User {
    pub(crate) async fn find_by_id(id: &str, database: &Database) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&database.pool)
            .await?;
        Ok(row.map(User::from))
    }

    pub(crate) async fn all(database: &Database) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>("SELECT * FROM users ORDER BY display_name, id")
            .fetch_all(&database.pool)
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Inserts the user or updates name and role, keeping the original `created_at`.
    pub(crate) async fn save(&self, database: &Database) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, display_name, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                role = excluded.role,
                updated_at = excluded.updated_at
             RETURNING *",
        )
        .bind(&self.id)
        .bind(&self.display_name)
        .bind(self.role.to_string())
        .bind(self.created_at.timestamp_millis())
        .bind(self.updated_at.timestamp_millis())
        .fetch_one(&database.pool)
        .await?;
        Ok(row.into())
    }
}
