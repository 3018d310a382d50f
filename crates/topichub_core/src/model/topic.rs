//! Topic domain model.
//!
//! # Responsibility
//! - Define the canonical topic record and its workflow/role tags.
//! - Provide the constructor used by topic creation.
//!
//! # Invariants
//! - `id` is stable and never reused for another topic.
//! - `created_at` is immutable post-insert; `updated_at` moves on every
//!   successful mutation.
//! - Role membership lives in separate `TopicUser` rows, one per
//!   `(topic, user, role)` triple.

use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a topic.
pub type TopicId = Uuid;

/// Workflow state of a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicStatus {
    /// Created but work has not begun.
    NotStarted,
    /// Actively being worked on.
    InProgress,
    /// Submitted and awaiting review.
    InReview,
    /// Finished.
    Done,
}

impl TopicStatus {
    /// Stable string tag shared by store and notification payloads.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Done => "done",
        }
    }

    pub fn parse_tag(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "in_review" => Some(Self::InReview),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Role a user holds on one topic.
///
/// A user may hold several roles on the same topic through separate
/// `TopicUser` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicRole {
    Student,
    Supervisor,
    Reviewer,
}

impl TopicRole {
    /// Stable string tag shared by store and notification payloads.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Supervisor => "supervisor",
            Self::Reviewer => "reviewer",
        }
    }

    pub fn parse_tag(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Self::Student),
            "supervisor" => Some(Self::Supervisor),
            "reviewer" => Some(Self::Reviewer),
            _ => None,
        }
    }
}

/// Canonical topic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Stable global ID used for linking and auditing.
    pub id: TopicId,
    pub title: String,
    pub description: String,
    /// Free-text requirements for the work.
    pub requirements: String,
    pub status: TopicStatus,
    /// Unix epoch milliseconds. Compared by exact equality.
    pub deadline: i64,
    /// Owning user reference.
    pub created_by: UserId,
    /// Epoch ms creation timestamp. Immutable post-insert.
    pub created_at: i64,
    /// Epoch ms update timestamp. Refreshed on every mutation.
    pub updated_at: i64,
}

impl Topic {
    /// Creates a new topic record with a generated stable ID.
    ///
    /// # Invariants
    /// - `created_at == updated_at == now_ms` at creation.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        requirements: impl Into<String>,
        status: TopicStatus,
        deadline: i64,
        created_by: UserId,
        now_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            requirements: requirements.into(),
            status,
            deadline,
            created_by,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }
}

/// Participant association row.
///
/// Lifecycle: created/removed only via the roster-diff path, never edited
/// in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicUser {
    pub topic_id: TopicId,
    pub user_id: UserId,
    pub role: TopicRole,
}

/// Added/removed membership for one role, produced by the roster diff.
///
/// `added` ids have no existing `(topic, user, role)` row; `removed` ids
/// have a row that is absent from the target set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterDelta {
    pub role: TopicRole,
    pub added: Vec<UserId>,
    pub removed: Vec<UserId>,
}

impl RosterDelta {
    /// Returns whether this delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
