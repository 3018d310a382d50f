//! Notification repository: batch insert and per-user read side.
//!
//! # Responsibility
//! - Persist notification rows computed by the fan-out engine.
//! - Provide per-user listing and counting.
//!
//! # Invariants
//! - Rows are insert-only; no update path exists.
//! - `insert_all` takes a plain connection so callers can pass an open
//!   transaction and have the rows ride on its commit or rollback.
//! - Listing order is deterministic: `created_at DESC, id ASC`.

use crate::db::DbError;
use crate::model::notification::{Notification, NotificationType};
use crate::model::user::UserId;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const NOTIFICATION_SELECT_SQL: &str = "SELECT
    id,
    updater_id,
    user_id,
    topic_id,
    kind,
    data,
    created_at
FROM notifications";

pub type NotificationRepoResult<T> = Result<T, NotificationRepoError>;

/// Errors from notification persistence and query operations.
#[derive(Debug)]
pub enum NotificationRepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for NotificationRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted notification data: {message}")
            }
        }
    }
}

impl Error for NotificationRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for NotificationRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for NotificationRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for notification reads.
pub trait NotificationRepository {
    /// Lists all notifications for one recipient, newest first.
    fn list_for_user(&self, user_id: UserId) -> NotificationRepoResult<Vec<Notification>>;
    /// Counts all notifications for one recipient.
    fn count_for_user(&self, user_id: UserId) -> NotificationRepoResult<u64>;
}

/// SQLite-backed notification repository.
pub struct SqliteNotificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNotificationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NotificationRepository for SqliteNotificationRepository<'_> {
    fn list_for_user(&self, user_id: UserId) -> NotificationRepoResult<Vec<Notification>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTIFICATION_SELECT_SQL}
             WHERE user_id = ?1
             ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([user_id.to_string()])?;

        let mut notifications = Vec::new();
        while let Some(row) = rows.next()? {
            notifications.push(parse_notification_row(row)?);
        }
        Ok(notifications)
    }

    fn count_for_user(&self, user_id: UserId) -> NotificationRepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ?1;",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// Inserts all rows on the given connection.
///
/// Callers running a multi-step mutation pass their open transaction here so
/// a rollback discards the notifications together with everything else.
pub(crate) fn insert_all(conn: &Connection, rows: &[Notification]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO notifications (
            id,
            updater_id,
            user_id,
            topic_id,
            kind,
            data,
            created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
    )?;
    for notification in rows {
        stmt.execute(params![
            notification.id.to_string(),
            notification.updater_id.to_string(),
            notification.user_id.to_string(),
            notification.topic_id.map(|id| id.to_string()),
            notification.kind.as_tag(),
            notification.data.as_deref(),
            notification.created_at,
        ])?;
    }
    Ok(())
}

fn parse_notification_row(row: &Row<'_>) -> NotificationRepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "notifications.id")?;
    let updater_text: String = row.get("updater_id")?;
    let updater_id = parse_uuid(&updater_text, "notifications.updater_id")?;
    let user_text: String = row.get("user_id")?;
    let user_id = parse_uuid(&user_text, "notifications.user_id")?;
    let topic_id = row
        .get::<_, Option<String>>("topic_id")?
        .map(|value| parse_uuid(&value, "notifications.topic_id"))
        .transpose()?;

    let kind_text: String = row.get("kind")?;
    let kind = NotificationType::parse_tag(&kind_text).ok_or_else(|| {
        NotificationRepoError::InvalidData(format!(
            "invalid notification kind `{kind_text}` in notifications.kind"
        ))
    })?;

    Ok(Notification {
        id,
        updater_id,
        user_id,
        topic_id,
        kind,
        data: row.get("data")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> NotificationRepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        NotificationRepoError::InvalidData(format!("invalid uuid `{value}` in {column}"))
    })
}
