//! Notification diff and fan-out engine.
//!
//! # Responsibility
//! - Compute the exact set of (recipient, kind, payload) intents for one
//!   mutating topic operation, from the *pre-mutation* snapshot.
//! - Apply operation-scoped deduplication and materialize persisted rows.
//!
//! # Invariants
//! - All functions are pure: they never touch the store and never read an
//!   ambient clock or identity.
//! - The acting user is never a recipient.
//! - Each recipient gets at most one intent per operation; the first intent
//!   queued wins.

use crate::model::notification::{Notification, NotificationType};
use crate::model::topic::{RosterDelta, Topic, TopicId, TopicRole, TopicStatus, TopicUser};
use crate::model::user::UserId;
use std::collections::HashSet;
use uuid::Uuid;

/// A computed notification prior to deduplication and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIntent {
    pub recipient: UserId,
    pub kind: NotificationType,
    pub data: Option<String>,
}

/// Returns the user ids holding `role` in `roster`, in row order.
pub fn role_member_ids(roster: &[TopicUser], role: TopicRole) -> Vec<UserId> {
    roster
        .iter()
        .filter(|tu| tu.role == role)
        .map(|tu| tu.user_id)
        .collect()
}

/// Computes the membership delta for one role against a target id set.
///
/// Duplicate ids inside `target` are collapsed to their first occurrence.
/// Order is deterministic: `added` follows target order, `removed` follows
/// existing row order.
pub fn diff_role(roster: &[TopicUser], role: TopicRole, target: &[UserId]) -> RosterDelta {
    let existing = role_member_ids(roster, role);
    let existing_set: HashSet<UserId> = existing.iter().copied().collect();

    let mut seen_target = HashSet::new();
    let mut added = Vec::new();
    for user_id in target {
        if !seen_target.insert(*user_id) {
            continue;
        }
        if !existing_set.contains(user_id) {
            added.push(*user_id);
        }
    }

    let removed = existing
        .into_iter()
        .filter(|user_id| !seen_target.contains(user_id))
        .collect();

    RosterDelta {
        role,
        added,
        removed,
    }
}

/// Intents for one roster delta: assignment for added ids, removal for
/// removed ids, each carrying the role tag as payload.
///
/// A user moved from one role to another receives both a removal intent for
/// the old role and an assignment intent for the new one.
pub fn roster_intents(delta: &RosterDelta) -> Vec<NotificationIntent> {
    let role_tag = delta.role.as_tag().to_string();
    let mut intents = Vec::with_capacity(delta.added.len() + delta.removed.len());
    for user_id in &delta.added {
        intents.push(NotificationIntent {
            recipient: *user_id,
            kind: NotificationType::TopicAssignedTo,
            data: Some(role_tag.clone()),
        });
    }
    for user_id in &delta.removed {
        intents.push(NotificationIntent {
            recipient: *user_id,
            kind: NotificationType::TopicRemovedFrom,
            data: Some(role_tag.clone()),
        });
    }
    intents
}

/// One intent per roster row. Deduplication happens later, so a user with
/// several roles shows up once per row here.
pub fn broadcast_intents(
    roster: &[TopicUser],
    kind: NotificationType,
    data: Option<String>,
) -> Vec<NotificationIntent> {
    roster
        .iter()
        .map(|tu| NotificationIntent {
            recipient: tu.user_id,
            kind,
            data: data.clone(),
        })
        .collect()
}

/// Full intent set for a topic update.
///
/// Roster deltas always produce intents. The broadcast is exclusive by
/// precedence: deadline change beats status change beats the generic update
/// notification. `before` and `roster` must be the pre-mutation snapshot.
pub fn update_intents(
    before: &Topic,
    roster: &[TopicUser],
    deltas: &[RosterDelta],
    new_status: TopicStatus,
    new_deadline: i64,
) -> Vec<NotificationIntent> {
    let mut intents = Vec::new();
    for delta in deltas {
        intents.extend(roster_intents(delta));
    }

    if new_deadline != before.deadline {
        intents.extend(broadcast_intents(
            roster,
            NotificationType::TopicDeadlineChanged,
            Some(new_deadline.to_string()),
        ));
    } else if new_status != before.status {
        intents.extend(broadcast_intents(
            roster,
            NotificationType::TopicStateChanged,
            Some(new_status.as_tag().to_string()),
        ));
    } else {
        intents.extend(broadcast_intents(
            roster,
            NotificationType::TopicUpdated,
            None,
        ));
    }

    intents
}

/// Applies operation-scoped deduplication.
///
/// The seen-set is seeded with `actor`, so the acting user never receives a
/// notification for their own operation. For every other recipient the first
/// intent in queue order survives and the rest are dropped silently.
pub fn dedup_intents(intents: Vec<NotificationIntent>, actor: UserId) -> Vec<NotificationIntent> {
    let mut seen = HashSet::from([actor]);
    intents
        .into_iter()
        .filter(|intent| seen.insert(intent.recipient))
        .collect()
}

/// Materializes deduplicated intents into persistable rows.
pub fn materialize(
    intents: Vec<NotificationIntent>,
    actor: UserId,
    topic_id: Option<TopicId>,
    now_ms: i64,
) -> Vec<Notification> {
    intents
        .into_iter()
        .map(|intent| Notification {
            id: Uuid::new_v4(),
            updater_id: actor,
            user_id: intent.recipient,
            topic_id,
            kind: intent.kind,
            data: intent.data,
            created_at: now_ms,
        })
        .collect()
}
