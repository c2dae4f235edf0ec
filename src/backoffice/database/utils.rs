use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::Row;

/// Reads an INTEGER column holding milliseconds since the Unix epoch.
pub(crate) fn parse_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<DateTime<Utc>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    let timestamp_ms: i64 = row.try_get(column_name)?;
    DateTime::from_timestamp_millis(timestamp_ms)
        .ok_or_else(|| create_column_decode_error(column_name, "Invalid timestamp value"))
}

/// Like [`parse_timestamp`] for nullable columns.
pub(crate) fn parse_optional_timestamp<'r, R>(
    row: &'r R,
    column_name: &'r str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    Option<i64>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    match row.try_get::<Option<i64>, _>(column_name)? {
        Some(timestamp_ms) => DateTime::from_timestamp_millis(timestamp_ms)
            .map(Some)
            .ok_or_else(|| create_column_decode_error(column_name, "Invalid timestamp value")),
        None => Ok(None),
    }
}

/// Decodes a TEXT column holding a JSON document.
pub(crate) fn parse_json_column<'r, R, T>(row: &'r R, column_name: &'r str) -> Result<T, sqlx::Error>
where
    R: Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    T: DeserializeOwned,
{
    let raw: String = row.try_get(column_name)?;
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn create_column_decode_error(column_name: &str, message: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column_name.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.to_string(),
        )),
    }
}
