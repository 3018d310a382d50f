//! Notification domain model.
//!
//! # Invariants
//! - Rows are insert-only; nothing in core ever updates one.
//! - `topic_id` is a weak reference: it stays recorded even after the topic
//!   is deleted, since deletion happens after notification creation.

use crate::model::topic::TopicId;
use crate::model::user::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a notification row.
pub type NotificationId = Uuid;

/// What happened to the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TopicCreated,
    TopicDeleted,
    TopicUpdated,
    TopicStateChanged,
    TopicDeadlineChanged,
    TopicAssignedTo,
    TopicRemovedFrom,
    TopicAttachmentAdded,
}

impl NotificationType {
    /// Stable string tag used in the store.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::TopicCreated => "topic_created",
            Self::TopicDeleted => "topic_deleted",
            Self::TopicUpdated => "topic_updated",
            Self::TopicStateChanged => "topic_state_changed",
            Self::TopicDeadlineChanged => "topic_deadline_changed",
            Self::TopicAssignedTo => "topic_assigned_to",
            Self::TopicRemovedFrom => "topic_removed_from",
            Self::TopicAttachmentAdded => "topic_attachment_added",
        }
    }

    pub fn parse_tag(value: &str) -> Option<Self> {
        match value {
            "topic_created" => Some(Self::TopicCreated),
            "topic_deleted" => Some(Self::TopicDeleted),
            "topic_updated" => Some(Self::TopicUpdated),
            "topic_state_changed" => Some(Self::TopicStateChanged),
            "topic_deadline_changed" => Some(Self::TopicDeadlineChanged),
            "topic_assigned_to" => Some(Self::TopicAssignedTo),
            "topic_removed_from" => Some(Self::TopicRemovedFrom),
            "topic_attachment_added" => Some(Self::TopicAttachmentAdded),
            _ => None,
        }
    }
}

/// One persisted change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    /// The actor whose operation caused this notification.
    pub updater_id: UserId,
    /// Recipient.
    pub user_id: UserId,
    /// Triggering topic, kept as a weak reference for display/lookup.
    pub topic_id: Option<TopicId>,
    pub kind: NotificationType,
    /// Optional payload: new status tag, new deadline, role tag, or
    /// attachment name depending on `kind`.
    pub data: Option<String>,
    pub created_at: i64,
}
