//! Topic use-case service.
//!
//! # Responsibility
//! - Provide the topic lifecycle entry points: CRUD, roster replacement,
//!   hierarchy management, and the notification fan-out they trigger.
//! - Validate input and referenced entities above the repository layer.
//!
//! # Invariants
//! - Every mutating operation reads the pre-mutation snapshot (fields and
//!   roster) before issuing any write; notification intents are computed
//!   from that snapshot only.
//! - Acting user id and timestamps are passed in explicitly; the service
//!   never reads ambient identity or clock state.
//! - Association edges never form self-loops or cycles.

use crate::model::notification::NotificationType;
use crate::model::topic::{RosterDelta, Topic, TopicId, TopicRole, TopicStatus, TopicUser};
use crate::model::user::{User, UserId};
use crate::repo::topic_repo::{
    TopicFieldUpdate, TopicListQuery, TopicPage, TopicRepoError, TopicRepository,
};
use crate::repo::user_repo::{UserDirectory, UserRepoError};
use crate::service::notify;
use log::info;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Input for topic creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDraft {
    pub title: String,
    pub description: String,
    pub requirements: String,
    pub status: TopicStatus,
    /// Epoch ms.
    pub deadline: i64,
}

/// Input for a full topic update.
///
/// Field values overwrite the stored record. Role targets are full
/// membership sets; `None` leaves that role's roster untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicChanges {
    pub title: String,
    pub description: String,
    pub requirements: String,
    pub status: TopicStatus,
    pub deadline: i64,
    pub students: Option<Vec<UserId>>,
    pub supervisors: Option<Vec<UserId>>,
    pub reviewers: Option<Vec<UserId>>,
}

/// Errors from topic service operations.
#[derive(Debug)]
pub enum TopicServiceError {
    /// Title is blank after trim.
    InvalidTitle,
    /// Target topic does not exist.
    TopicNotFound(TopicId),
    /// Association parent does not exist.
    ParentNotFound(TopicId),
    /// Association child does not exist.
    ChildNotFound(TopicId),
    /// The exact ordered edge already exists.
    AssociationExists {
        parent_id: TopicId,
        child_id: TopicId,
    },
    /// The exact ordered edge does not exist.
    AssociationNotFound {
        parent_id: TopicId,
        child_id: TopicId,
    },
    /// Parent and child are the same topic.
    SelfAssociation(TopicId),
    /// The edge would close a cycle in the hierarchy.
    CycleDetected {
        parent_id: TopicId,
        child_id: TopicId,
    },
    /// A roster target id is unknown to the user directory.
    UserNotFound(UserId),
    /// User directory failure.
    Directory(UserRepoError),
    /// Repository-level failure; the transaction has been rolled back.
    Repo(TopicRepoError),
}

impl Display for TopicServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "topic title must not be blank"),
            Self::TopicNotFound(id) => write!(f, "topic not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent not found: {id}"),
            Self::ChildNotFound(id) => write!(f, "child not found: {id}"),
            Self::AssociationExists {
                parent_id,
                child_id,
            } => write!(f, "association already exists: {parent_id} -> {child_id}"),
            Self::AssociationNotFound {
                parent_id,
                child_id,
            } => write!(f, "association not found: {parent_id} -> {child_id}"),
            Self::SelfAssociation(id) => write!(f, "topic cannot be associated with itself: {id}"),
            Self::CycleDetected {
                parent_id,
                child_id,
            } => write!(
                f,
                "association would create cycle: {parent_id} -> {child_id}"
            ),
            Self::UserNotFound(id) => write!(f, "user not found: {id}"),
            Self::Directory(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TopicServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Directory(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TopicRepoError> for TopicServiceError {
    fn from(value: TopicRepoError) -> Self {
        match value {
            TopicRepoError::TopicNotFound(id) => Self::TopicNotFound(id),
            TopicRepoError::AssociationNotFound {
                parent_id,
                child_id,
            } => Self::AssociationNotFound {
                parent_id,
                child_id,
            },
            other => Self::Repo(other),
        }
    }
}

impl From<UserRepoError> for TopicServiceError {
    fn from(value: UserRepoError) -> Self {
        Self::Directory(value)
    }
}

/// Topic service facade.
pub struct TopicService<R: TopicRepository, U: UserDirectory> {
    topics: R,
    users: U,
}

impl<R: TopicRepository, U: UserDirectory> TopicService<R, U> {
    /// Creates a service from repository and directory implementations.
    pub fn new(topics: R, users: U) -> Self {
        Self { topics, users }
    }

    /// Lists topics with conjunctive filters and fixed-size pages.
    pub fn list_topics(&self, query: &TopicListQuery) -> Result<TopicPage, TopicServiceError> {
        self.topics.list_topics(query).map_err(Into::into)
    }

    /// Lists topics the user created or participates in.
    pub fn list_topics_for_user(
        &self,
        user_id: UserId,
        page: u32,
    ) -> Result<TopicPage, TopicServiceError> {
        self.topics
            .list_topics_for_user(user_id, page)
            .map_err(Into::into)
    }

    /// Loads one topic. Zero matches surface as `TopicNotFound`.
    pub fn get_topic(&self, topic_id: TopicId) -> Result<Topic, TopicServiceError> {
        self.topics
            .get_topic(topic_id)?
            .ok_or(TopicServiceError::TopicNotFound(topic_id))
    }

    /// All users holding `role` on `topic_id`.
    pub fn users_by_role(
        &self,
        topic_id: TopicId,
        role: TopicRole,
    ) -> Result<Vec<User>, TopicServiceError> {
        self.topics.users_by_role(topic_id, role).map_err(Into::into)
    }

    /// Creates a topic owned by `actor` and fires `topic_created` to its
    /// associated users (none at creation time).
    pub fn create_topic(
        &self,
        actor: UserId,
        draft: &TopicDraft,
        now_ms: i64,
    ) -> Result<TopicId, TopicServiceError> {
        let title = normalize_title(&draft.title)?;
        let topic = Topic::new(
            title,
            draft.description.clone(),
            draft.requirements.clone(),
            draft.status,
            draft.deadline,
            actor,
            now_ms,
        );

        let intents = notify::broadcast_intents(&[], NotificationType::TopicCreated, None);
        let rows = notify::materialize(
            notify::dedup_intents(intents, actor),
            actor,
            Some(topic.id),
            now_ms,
        );

        let topic_id = self.topics.create_topic(&topic, &rows)?;
        info!(
            "event=topic_create module=service status=ok topic_id={topic_id} notifications={}",
            rows.len()
        );
        Ok(topic_id)
    }

    /// Applies a full update: field overwrite plus roster replacement for
    /// every provided role target, with notifications computed from the
    /// pre-mutation snapshot, all in one transaction.
    pub fn update_topic(
        &self,
        actor: UserId,
        topic_id: TopicId,
        changes: &TopicChanges,
        now_ms: i64,
    ) -> Result<(), TopicServiceError> {
        let topic = self.get_topic(topic_id)?;
        let title = normalize_title(&changes.title)?;
        for target in [&changes.students, &changes.supervisors, &changes.reviewers]
            .into_iter()
            .flatten()
        {
            self.ensure_users_exist(target)?;
        }

        let roster = self.topics.roster(topic_id)?;
        let deltas = roster_deltas(&roster, changes);
        let intents =
            notify::update_intents(&topic, &roster, &deltas, changes.status, changes.deadline);
        let rows = notify::materialize(
            notify::dedup_intents(intents, actor),
            actor,
            Some(topic_id),
            now_ms,
        );

        let fields = TopicFieldUpdate {
            title,
            description: changes.description.clone(),
            requirements: changes.requirements.clone(),
            status: changes.status,
            deadline: changes.deadline,
        };
        self.topics
            .apply_update(topic_id, &fields, &deltas, &rows, now_ms)?;
        info!(
            "event=topic_update module=service status=ok topic_id={topic_id} roster_deltas={} notifications={}",
            deltas.iter().filter(|delta| !delta.is_empty()).count(),
            rows.len()
        );
        Ok(())
    }

    /// Unconditional status overwrite plus `topic_state_changed` broadcast.
    pub fn change_status(
        &self,
        actor: UserId,
        topic_id: TopicId,
        status: TopicStatus,
        now_ms: i64,
    ) -> Result<(), TopicServiceError> {
        self.get_topic(topic_id)?;
        let roster = self.topics.roster(topic_id)?;

        let intents = notify::broadcast_intents(
            &roster,
            NotificationType::TopicStateChanged,
            Some(status.as_tag().to_string()),
        );
        let rows = notify::materialize(
            notify::dedup_intents(intents, actor),
            actor,
            Some(topic_id),
            now_ms,
        );

        self.topics.set_status(topic_id, status, &rows, now_ms)?;
        info!(
            "event=topic_status module=service status=ok topic_id={topic_id} new_status={} notifications={}",
            status.as_tag(),
            rows.len()
        );
        Ok(())
    }

    /// Notifies participants of the deletion (payload: current title), then
    /// removes the topic and its roster.
    pub fn delete_topic(
        &self,
        topic_id: TopicId,
        actor: UserId,
        now_ms: i64,
    ) -> Result<(), TopicServiceError> {
        let topic = self.get_topic(topic_id)?;
        let roster = self.topics.roster(topic_id)?;

        let intents = notify::broadcast_intents(
            &roster,
            NotificationType::TopicDeleted,
            Some(topic.title.clone()),
        );
        let rows = notify::materialize(
            notify::dedup_intents(intents, actor),
            actor,
            Some(topic_id),
            now_ms,
        );

        self.topics.delete_topic(topic_id, &rows)?;
        info!(
            "event=topic_delete module=service status=ok topic_id={topic_id} notifications={}",
            rows.len()
        );
        Ok(())
    }

    /// Replaces the full membership of `role` with `target`.
    ///
    /// Target ids are validated eagerly against the user directory. Added
    /// users receive an assignment notification, removed users a removal
    /// notification; an identical target produces zero deltas and zero
    /// notifications.
    pub fn change_users_by_role(
        &self,
        actor: UserId,
        topic_id: TopicId,
        role: TopicRole,
        target: &[UserId],
        now_ms: i64,
    ) -> Result<(), TopicServiceError> {
        self.get_topic(topic_id)?;
        self.ensure_users_exist(target)?;

        let roster = self.topics.roster(topic_id)?;
        let delta = notify::diff_role(&roster, role, target);
        let intents = notify::roster_intents(&delta);
        let rows = notify::materialize(
            notify::dedup_intents(intents, actor),
            actor,
            Some(topic_id),
            now_ms,
        );

        self.topics
            .replace_role_users(topic_id, &delta, &rows, now_ms)?;
        info!(
            "event=topic_roster module=service status=ok topic_id={topic_id} role={} added={} removed={} notifications={}",
            role.as_tag(),
            delta.added.len(),
            delta.removed.len(),
            rows.len()
        );
        Ok(())
    }

    /// Broadcasts `topic_attachment_added` with the attachment name as
    /// payload. File handling itself lives outside this core.
    pub fn notify_attachment_added(
        &self,
        actor: UserId,
        topic_id: TopicId,
        name: &str,
        now_ms: i64,
    ) -> Result<(), TopicServiceError> {
        self.get_topic(topic_id)?;
        let roster = self.topics.roster(topic_id)?;

        let intents = notify::broadcast_intents(
            &roster,
            NotificationType::TopicAttachmentAdded,
            Some(name.to_string()),
        );
        let rows = notify::materialize(
            notify::dedup_intents(intents, actor),
            actor,
            Some(topic_id),
            now_ms,
        );

        self.topics.record_notifications(&rows)?;
        info!(
            "event=topic_attachment module=service status=ok topic_id={topic_id} notifications={}",
            rows.len()
        );
        Ok(())
    }

    /// Creates a parent→child edge.
    ///
    /// Rejects unknown endpoints, the duplicate ordered edge, self-loops,
    /// and edges that would close a cycle.
    pub fn associate_topics(
        &self,
        parent_id: TopicId,
        child_id: TopicId,
    ) -> Result<(), TopicServiceError> {
        if parent_id == child_id {
            return Err(TopicServiceError::SelfAssociation(parent_id));
        }
        if !self.topics.topic_exists(child_id)? {
            return Err(TopicServiceError::ChildNotFound(child_id));
        }
        if !self.topics.topic_exists(parent_id)? {
            return Err(TopicServiceError::ParentNotFound(parent_id));
        }
        if self.topics.association_exists(parent_id, child_id)? {
            return Err(TopicServiceError::AssociationExists {
                parent_id,
                child_id,
            });
        }
        if self.reaches(child_id, parent_id)? {
            return Err(TopicServiceError::CycleDetected {
                parent_id,
                child_id,
            });
        }

        self.topics.insert_association(parent_id, child_id)?;
        info!(
            "event=topic_associate module=service status=ok parent_id={parent_id} child_id={child_id}"
        );
        Ok(())
    }

    /// Removes the exact parent→child edge.
    pub fn dissociate_topics(
        &self,
        parent_id: TopicId,
        child_id: TopicId,
    ) -> Result<(), TopicServiceError> {
        self.topics.delete_association(parent_id, child_id)?;
        info!(
            "event=topic_dissociate module=service status=ok parent_id={parent_id} child_id={child_id}"
        );
        Ok(())
    }

    /// One-hop traversal to child topics.
    pub fn sub_topics(&self, topic_id: TopicId) -> Result<Vec<Topic>, TopicServiceError> {
        self.topics.sub_topics(topic_id).map_err(Into::into)
    }

    /// One-hop traversal to parent topics.
    pub fn parent_topics(&self, topic_id: TopicId) -> Result<Vec<Topic>, TopicServiceError> {
        self.topics.parent_topics(topic_id).map_err(Into::into)
    }

    fn ensure_users_exist(&self, user_ids: &[UserId]) -> Result<(), TopicServiceError> {
        for user_id in user_ids {
            if !self.users.user_exists(*user_id)? {
                return Err(TopicServiceError::UserNotFound(*user_id));
            }
        }
        Ok(())
    }

    /// Returns whether `needle` is reachable from `from` over parent→child
    /// edges. Used to reject edges that would close a cycle.
    fn reaches(&self, from: TopicId, needle: TopicId) -> Result<bool, TopicServiceError> {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == needle {
                return Ok(true);
            }
            if !visited.insert(current) {
                continue;
            }
            stack.extend(self.topics.sub_topic_ids(current)?);
        }
        Ok(false)
    }
}

fn roster_deltas(roster: &[TopicUser], changes: &TopicChanges) -> Vec<RosterDelta> {
    [
        (TopicRole::Student, changes.students.as_deref()),
        (TopicRole::Supervisor, changes.supervisors.as_deref()),
        (TopicRole::Reviewer, changes.reviewers.as_deref()),
    ]
    .into_iter()
    .filter_map(|(role, target)| target.map(|ids| notify::diff_role(roster, role, ids)))
    .collect()
}

fn normalize_title(value: &str) -> Result<String, TopicServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TopicServiceError::InvalidTitle);
    }
    Ok(trimmed.to_string())
}
