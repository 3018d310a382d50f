//! User repository and directory lookup.
//!
//! # Responsibility
//! - Persist and load user accounts referenced by topic rosters.
//! - Provide the existence check used for eager roster validation.
//! - Seed the administrator account at bootstrap.
//!
//! # Invariants
//! - `email` is unique; lookups by email match at most one row.
//! - Write paths only accept records that passed model validation.

use crate::db::DbError;
use crate::model::user::{User, UserId, UserRole, UserValidationError};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const USER_SELECT_SQL: &str = "SELECT
    id,
    email,
    first_name,
    last_name,
    role,
    matriculation_number,
    profile_picture,
    created_at,
    updated_at
FROM users";

pub type UserRepoResult<T> = Result<T, UserRepoError>;

/// Errors from user persistence and query operations.
#[derive(Debug)]
pub enum UserRepoError {
    Validation(UserValidationError),
    Db(DbError),
    InvalidData(String),
}

impl Display for UserRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
        }
    }
}

impl Error for UserRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<UserValidationError> for UserRepoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for UserRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for UserRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Existence lookup used by topic operations to validate referenced users.
pub trait UserDirectory {
    fn user_exists(&self, user_id: UserId) -> UserRepoResult<bool>;
}

/// Repository interface for user account CRUD.
pub trait UserRepository: UserDirectory {
    fn create_user(&self, user: &User) -> UserRepoResult<UserId>;
    fn get_user(&self, user_id: UserId) -> UserRepoResult<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> UserRepoResult<Option<User>>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserDirectory for SqliteUserRepository<'_> {
    fn user_exists(&self, user_id: UserId) -> UserRepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1);",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, user: &User) -> UserRepoResult<UserId> {
        self.conn.execute(
            "INSERT INTO users (
                id,
                email,
                first_name,
                last_name,
                role,
                matriculation_number,
                profile_picture,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                user.id.to_string(),
                user.email.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.role.as_tag(),
                user.matriculation_number.as_deref(),
                user.profile_picture.as_deref(),
                user.created_at,
                user.updated_at,
            ],
        )?;
        Ok(user.id)
    }

    fn get_user(&self, user_id: UserId) -> UserRepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([user_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_user_row(row)?));
        }
        Ok(None)
    }

    fn get_user_by_email(&self, email: &str) -> UserRepoResult<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{USER_SELECT_SQL} WHERE email = ?1;"))?;
        let mut rows = stmt.query([email])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_user_row(row)?));
        }
        Ok(None)
    }
}

/// Seeds the administrator account when it does not exist yet.
///
/// Idempotent: repeated calls with the same email return the existing
/// account unchanged.
pub fn ensure_admin_user(conn: &Connection, email: &str, now_ms: i64) -> UserRepoResult<User> {
    let repo = SqliteUserRepository::new(conn);
    if let Some(existing) = repo.get_user_by_email(email)? {
        return Ok(existing);
    }
    let admin = User::new(email, UserRole::Administrator, now_ms)?;
    repo.create_user(&admin)?;
    Ok(admin)
}

pub(crate) fn parse_user_row(row: &Row<'_>) -> UserRepoResult<User> {
    let id_text: String = row.get("id")?;
    let id = Uuid::parse_str(&id_text)
        .map_err(|_| UserRepoError::InvalidData(format!("invalid uuid `{id_text}` in users.id")))?;

    let role_text: String = row.get("role")?;
    let role = UserRole::parse_tag(&role_text).ok_or_else(|| {
        UserRepoError::InvalidData(format!("invalid user role `{role_text}` in users.role"))
    })?;

    Ok(User {
        id,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        role,
        matriculation_number: row.get("matriculation_number")?,
        profile_picture: row.get("profile_picture")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
