//! Topic repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide all SQL over `topics`, `topic_users`, and `associated_topics`.
//! - Run every multi-row mutation inside one immediate transaction that also
//!   persists the pre-computed notification rows.
//!
//! # Invariants
//! - A rollback discards field changes, roster deltas, and notifications
//!   together; no partial write survives.
//! - `updated_at` is refreshed by every successful mutation; `created_at`
//!   never changes post-insert.
//! - Listing order is deterministic: `updated_at DESC, id ASC`.

use crate::db::DbError;
use crate::model::notification::Notification;
use crate::model::topic::{RosterDelta, Topic, TopicId, TopicRole, TopicStatus, TopicUser};
use crate::model::user::{User, UserId};
use crate::repo::notification_repo;
use crate::repo::user_repo::{parse_user_row, UserRepoError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Number of topics returned per listing page.
pub const PAGE_SIZE: u32 = 10;

const TOPIC_SELECT_SQL: &str = "SELECT
    id,
    title,
    description,
    requirements,
    status,
    deadline,
    created_by,
    created_at,
    updated_at
FROM topics";

pub type TopicRepoResult<T> = Result<T, TopicRepoError>;

/// Generic repository error for topic persistence and query operations.
#[derive(Debug)]
pub enum TopicRepoError {
    Db(DbError),
    TopicNotFound(TopicId),
    AssociationNotFound {
        parent_id: TopicId,
        child_id: TopicId,
    },
    InvalidData(String),
}

impl Display for TopicRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TopicNotFound(id) => write!(f, "topic not found: {id}"),
            Self::AssociationNotFound {
                parent_id,
                child_id,
            } => write!(f, "association not found: {parent_id} -> {child_id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted topic data: {message}"),
        }
    }
}

impl Error for TopicRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::TopicNotFound(_) => None,
            Self::AssociationNotFound { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for TopicRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TopicRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<UserRepoError> for TopicRepoError {
    fn from(value: UserRepoError) -> Self {
        match value {
            UserRepoError::Db(err) => Self::Db(err),
            other => Self::InvalidData(other.to_string()),
        }
    }
}

/// Filter and paging options for topic listings.
///
/// Filters are conjunctive. `page` is 1-indexed; values below 1 are treated
/// as the first page.
#[derive(Debug, Clone, Default)]
pub struct TopicListQuery {
    /// Substring match against title OR description.
    pub text: Option<String>,
    pub status: Option<TopicStatus>,
    /// Exact-equality deadline match, epoch ms.
    pub deadline: Option<i64>,
    /// Keep only topics without an incoming association edge.
    pub only_roots: bool,
    pub page: u32,
}

/// One page of topics plus the total count over the filtered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPage {
    pub topics: Vec<Topic>,
    pub page: u32,
    pub total: u64,
}

/// Field overwrite applied by a full topic update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFieldUpdate {
    pub title: String,
    pub description: String,
    pub requirements: String,
    pub status: TopicStatus,
    pub deadline: i64,
}

/// Repository interface for topic reads and transactional mutations.
///
/// Mutation entry points accept the notification rows computed from the
/// pre-mutation snapshot and persist them in the same transaction.
pub trait TopicRepository {
    fn list_topics(&self, query: &TopicListQuery) -> TopicRepoResult<TopicPage>;
    /// Topics the user created or participates in, paginated like
    /// `list_topics`.
    fn list_topics_for_user(&self, user_id: UserId, page: u32) -> TopicRepoResult<TopicPage>;
    fn get_topic(&self, topic_id: TopicId) -> TopicRepoResult<Option<Topic>>;
    fn topic_exists(&self, topic_id: TopicId) -> TopicRepoResult<bool>;
    /// All participant rows of one topic.
    fn roster(&self, topic_id: TopicId) -> TopicRepoResult<Vec<TopicUser>>;
    fn users_by_role(&self, topic_id: TopicId, role: TopicRole) -> TopicRepoResult<Vec<User>>;
    fn create_topic(
        &self,
        topic: &Topic,
        notifications: &[Notification],
    ) -> TopicRepoResult<TopicId>;
    fn apply_update(
        &self,
        topic_id: TopicId,
        fields: &TopicFieldUpdate,
        deltas: &[RosterDelta],
        notifications: &[Notification],
        now_ms: i64,
    ) -> TopicRepoResult<()>;
    fn set_status(
        &self,
        topic_id: TopicId,
        status: TopicStatus,
        notifications: &[Notification],
        now_ms: i64,
    ) -> TopicRepoResult<()>;
    /// Persists the notifications, then removes the topic row and its
    /// roster.
    fn delete_topic(
        &self,
        topic_id: TopicId,
        notifications: &[Notification],
    ) -> TopicRepoResult<()>;
    fn replace_role_users(
        &self,
        topic_id: TopicId,
        delta: &RosterDelta,
        notifications: &[Notification],
        now_ms: i64,
    ) -> TopicRepoResult<()>;
    /// Persists stand-alone notification rows (no other writes).
    fn record_notifications(&self, notifications: &[Notification]) -> TopicRepoResult<()>;
    fn association_exists(&self, parent_id: TopicId, child_id: TopicId)
        -> TopicRepoResult<bool>;
    fn insert_association(&self, parent_id: TopicId, child_id: TopicId) -> TopicRepoResult<()>;
    fn delete_association(&self, parent_id: TopicId, child_id: TopicId) -> TopicRepoResult<()>;
    /// One-hop traversal to child topics.
    fn sub_topics(&self, topic_id: TopicId) -> TopicRepoResult<Vec<Topic>>;
    /// One-hop traversal to parent topics.
    fn parent_topics(&self, topic_id: TopicId) -> TopicRepoResult<Vec<Topic>>;
    /// Child ids only, for graph walks.
    fn sub_topic_ids(&self, topic_id: TopicId) -> TopicRepoResult<Vec<TopicId>>;
}

/// SQLite-backed topic repository.
pub struct SqliteTopicRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTopicRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TopicRepository for SqliteTopicRepository<'_> {
    fn list_topics(&self, query: &TopicListQuery) -> TopicRepoResult<TopicPage> {
        let mut where_sql = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(text) = query.text.as_deref() {
            let pattern = format!("%{}%", escape_like(text));
            where_sql.push_str(" AND (title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')");
            bind_values.push(Value::Text(pattern.clone()));
            bind_values.push(Value::Text(pattern));
        }

        if let Some(status) = query.status {
            where_sql.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_tag().to_string()));
        }

        if let Some(deadline) = query.deadline {
            where_sql.push_str(" AND deadline = ?");
            bind_values.push(Value::Integer(deadline));
        }

        if query.only_roots {
            where_sql.push_str(" AND id NOT IN (SELECT child_id FROM associated_topics)");
        }

        let total = self.count_filtered(&where_sql, &bind_values)?;

        let page = query.page.max(1);
        let mut page_sql = format!("{TOPIC_SELECT_SQL}{where_sql}");
        page_sql.push_str(" ORDER BY updated_at DESC, id ASC LIMIT ? OFFSET ?");
        bind_values.push(Value::Integer(i64::from(PAGE_SIZE)));
        bind_values.push(Value::Integer(i64::from((page - 1) * PAGE_SIZE)));

        let mut stmt = self.conn.prepare(&page_sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut topics = Vec::new();
        while let Some(row) = rows.next()? {
            topics.push(parse_topic_row(row)?);
        }

        Ok(TopicPage {
            topics,
            page,
            total,
        })
    }

    fn list_topics_for_user(&self, user_id: UserId, page: u32) -> TopicRepoResult<TopicPage> {
        let page = page.max(1);
        let user_text = user_id.to_string();

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM topics
             WHERE created_by = ?1
                OR id IN (SELECT topic_id FROM topic_users WHERE user_id = ?1);",
            [user_text.as_str()],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(&format!(
            "{TOPIC_SELECT_SQL}
             WHERE created_by = ?1
                OR id IN (SELECT topic_id FROM topic_users WHERE user_id = ?1)
             ORDER BY updated_at DESC, id ASC
             LIMIT ?2 OFFSET ?3;"
        ))?;
        let mut rows = stmt.query(params![
            user_text,
            i64::from(PAGE_SIZE),
            i64::from((page - 1) * PAGE_SIZE),
        ])?;

        let mut topics = Vec::new();
        while let Some(row) = rows.next()? {
            topics.push(parse_topic_row(row)?);
        }

        Ok(TopicPage {
            topics,
            page,
            total: total as u64,
        })
    }

    fn get_topic(&self, topic_id: TopicId) -> TopicRepoResult<Option<Topic>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TOPIC_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([topic_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_topic_row(row)?));
        }
        Ok(None)
    }

    fn topic_exists(&self, topic_id: TopicId) -> TopicRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM topics WHERE id = ?1);",
            [topic_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn roster(&self, topic_id: TopicId) -> TopicRepoResult<Vec<TopicUser>> {
        let mut stmt = self.conn.prepare(
            "SELECT topic_id, user_id, role
             FROM topic_users
             WHERE topic_id = ?1
             ORDER BY role ASC, user_id ASC;",
        )?;
        let mut rows = stmt.query([topic_id.to_string()])?;

        let mut roster = Vec::new();
        while let Some(row) = rows.next()? {
            roster.push(parse_topic_user_row(row)?);
        }
        Ok(roster)
    }

    fn users_by_role(&self, topic_id: TopicId, role: TopicRole) -> TopicRepoResult<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                u.id AS id,
                u.email AS email,
                u.first_name AS first_name,
                u.last_name AS last_name,
                u.role AS role,
                u.matriculation_number AS matriculation_number,
                u.profile_picture AS profile_picture,
                u.created_at AS created_at,
                u.updated_at AS updated_at
             FROM users u
             INNER JOIN topic_users tu ON tu.user_id = u.id
             WHERE tu.topic_id = ?1
               AND tu.role = ?2
             ORDER BY u.email ASC;",
        )?;
        let mut rows = stmt.query(params![topic_id.to_string(), role.as_tag()])?;

        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    fn create_topic(
        &self,
        topic: &Topic,
        notifications: &[Notification],
    ) -> TopicRepoResult<TopicId> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO topics (
                id,
                title,
                description,
                requirements,
                status,
                deadline,
                created_by,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                topic.id.to_string(),
                topic.title.as_str(),
                topic.description.as_str(),
                topic.requirements.as_str(),
                topic.status.as_tag(),
                topic.deadline,
                topic.created_by.to_string(),
                topic.created_at,
                topic.updated_at,
            ],
        )?;
        notification_repo::insert_all(&tx, notifications)?;
        tx.commit()?;
        Ok(topic.id)
    }

    fn apply_update(
        &self,
        topic_id: TopicId,
        fields: &TopicFieldUpdate,
        deltas: &[RosterDelta],
        notifications: &[Notification],
        now_ms: i64,
    ) -> TopicRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE topics
             SET
                title = ?1,
                description = ?2,
                requirements = ?3,
                status = ?4,
                deadline = ?5,
                updated_at = ?6
             WHERE id = ?7;",
            params![
                fields.title.as_str(),
                fields.description.as_str(),
                fields.requirements.as_str(),
                fields.status.as_tag(),
                fields.deadline,
                now_ms,
                topic_id.to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(TopicRepoError::TopicNotFound(topic_id));
        }

        apply_roster_deltas(&tx, topic_id, deltas)?;
        notification_repo::insert_all(&tx, notifications)?;
        tx.commit()?;
        Ok(())
    }

    fn set_status(
        &self,
        topic_id: TopicId,
        status: TopicStatus,
        notifications: &[Notification],
        now_ms: i64,
    ) -> TopicRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE topics SET status = ?1, updated_at = ?2 WHERE id = ?3;",
            params![status.as_tag(), now_ms, topic_id.to_string()],
        )?;
        if changed == 0 {
            return Err(TopicRepoError::TopicNotFound(topic_id));
        }

        notification_repo::insert_all(&tx, notifications)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_topic(
        &self,
        topic_id: TopicId,
        notifications: &[Notification],
    ) -> TopicRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        // Notifications first: they must reference the topic id even though
        // the row is about to go away.
        notification_repo::insert_all(&tx, notifications)?;

        tx.execute(
            "DELETE FROM topic_users WHERE topic_id = ?1;",
            [topic_id.to_string()],
        )?;
        let changed = tx.execute("DELETE FROM topics WHERE id = ?1;", [topic_id.to_string()])?;
        if changed == 0 {
            return Err(TopicRepoError::TopicNotFound(topic_id));
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_role_users(
        &self,
        topic_id: TopicId,
        delta: &RosterDelta,
        notifications: &[Notification],
        now_ms: i64,
    ) -> TopicRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE topics SET updated_at = ?1 WHERE id = ?2;",
            params![now_ms, topic_id.to_string()],
        )?;
        if changed == 0 {
            return Err(TopicRepoError::TopicNotFound(topic_id));
        }

        apply_roster_deltas(&tx, topic_id, std::slice::from_ref(delta))?;
        notification_repo::insert_all(&tx, notifications)?;
        tx.commit()?;
        Ok(())
    }

    fn record_notifications(&self, notifications: &[Notification]) -> TopicRepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        notification_repo::insert_all(&tx, notifications)?;
        tx.commit()?;
        Ok(())
    }

    fn association_exists(
        &self,
        parent_id: TopicId,
        child_id: TopicId,
    ) -> TopicRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM associated_topics
                WHERE parent_id = ?1 AND child_id = ?2
            );",
            params![parent_id.to_string(), child_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn insert_association(&self, parent_id: TopicId, child_id: TopicId) -> TopicRepoResult<()> {
        self.conn.execute(
            "INSERT INTO associated_topics (parent_id, child_id) VALUES (?1, ?2);",
            params![parent_id.to_string(), child_id.to_string()],
        )?;
        Ok(())
    }

    fn delete_association(&self, parent_id: TopicId, child_id: TopicId) -> TopicRepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM associated_topics WHERE parent_id = ?1 AND child_id = ?2;",
            params![parent_id.to_string(), child_id.to_string()],
        )?;
        if changed == 0 {
            return Err(TopicRepoError::AssociationNotFound {
                parent_id,
                child_id,
            });
        }
        Ok(())
    }

    fn sub_topics(&self, topic_id: TopicId) -> TopicRepoResult<Vec<Topic>> {
        self.topics_across_edge(
            topic_id,
            "INNER JOIN associated_topics at ON at.child_id = t.id
             WHERE at.parent_id = ?1",
        )
    }

    fn parent_topics(&self, topic_id: TopicId) -> TopicRepoResult<Vec<Topic>> {
        self.topics_across_edge(
            topic_id,
            "INNER JOIN associated_topics at ON at.parent_id = t.id
             WHERE at.child_id = ?1",
        )
    }

    fn sub_topic_ids(&self, topic_id: TopicId) -> TopicRepoResult<Vec<TopicId>> {
        let mut stmt = self.conn.prepare(
            "SELECT child_id
             FROM associated_topics
             WHERE parent_id = ?1
             ORDER BY child_id ASC;",
        )?;
        let mut rows = stmt.query([topic_id.to_string()])?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            ids.push(parse_uuid(&value, "associated_topics.child_id")?);
        }
        Ok(ids)
    }
}

impl SqliteTopicRepository<'_> {
    fn count_filtered(&self, where_sql: &str, bind_values: &[Value]) -> TopicRepoResult<u64> {
        let count_sql = format!("SELECT COUNT(*) FROM topics{where_sql}");
        let mut stmt = self.conn.prepare(&count_sql)?;
        let count: i64 =
            stmt.query_row(params_from_iter(bind_values.iter().cloned()), |row| {
                row.get(0)
            })?;
        Ok(count as u64)
    }

    fn topics_across_edge(
        &self,
        topic_id: TopicId,
        join_and_where: &str,
    ) -> TopicRepoResult<Vec<Topic>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT
                t.id AS id,
                t.title AS title,
                t.description AS description,
                t.requirements AS requirements,
                t.status AS status,
                t.deadline AS deadline,
                t.created_by AS created_by,
                t.created_at AS created_at,
                t.updated_at AS updated_at
             FROM topics t
             {join_and_where}
             ORDER BY t.updated_at DESC, t.id ASC;"
        ))?;
        let mut rows = stmt.query([topic_id.to_string()])?;

        let mut topics = Vec::new();
        while let Some(row) = rows.next()? {
            topics.push(parse_topic_row(row)?);
        }
        Ok(topics)
    }
}

fn apply_roster_deltas(
    tx: &Transaction<'_>,
    topic_id: TopicId,
    deltas: &[RosterDelta],
) -> TopicRepoResult<()> {
    for delta in deltas {
        for user_id in &delta.added {
            tx.execute(
                "INSERT INTO topic_users (topic_id, user_id, role) VALUES (?1, ?2, ?3);",
                params![
                    topic_id.to_string(),
                    user_id.to_string(),
                    delta.role.as_tag(),
                ],
            )?;
        }
        for user_id in &delta.removed {
            tx.execute(
                "DELETE FROM topic_users WHERE topic_id = ?1 AND user_id = ?2 AND role = ?3;",
                params![
                    topic_id.to_string(),
                    user_id.to_string(),
                    delta.role.as_tag(),
                ],
            )?;
        }
    }
    Ok(())
}

/// Escapes LIKE wildcards so filter text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn parse_topic_row(row: &Row<'_>) -> TopicRepoResult<Topic> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "topics.id")?;
    let created_by_text: String = row.get("created_by")?;
    let created_by = parse_uuid(&created_by_text, "topics.created_by")?;

    let status_text: String = row.get("status")?;
    let status = TopicStatus::parse_tag(&status_text).ok_or_else(|| {
        TopicRepoError::InvalidData(format!(
            "invalid topic status `{status_text}` in topics.status"
        ))
    })?;

    Ok(Topic {
        id,
        title: row.get("title")?,
        description: row.get("description")?,
        requirements: row.get("requirements")?,
        status,
        deadline: row.get("deadline")?,
        created_by,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_topic_user_row(row: &Row<'_>) -> TopicRepoResult<TopicUser> {
    let topic_text: String = row.get("topic_id")?;
    let user_text: String = row.get("user_id")?;
    let role_text: String = row.get("role")?;

    let role = TopicRole::parse_tag(&role_text).ok_or_else(|| {
        TopicRepoError::InvalidData(format!(
            "invalid topic role `{role_text}` in topic_users.role"
        ))
    })?;

    Ok(TopicUser {
        topic_id: parse_uuid(&topic_text, "topic_users.topic_id")?,
        user_id: parse_uuid(&user_text, "topic_users.user_id")?,
        role,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> TopicRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| TopicRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
