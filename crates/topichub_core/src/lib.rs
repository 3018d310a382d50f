//! Core domain logic for TopicHub.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::notification::{Notification, NotificationId, NotificationType};
pub use model::topic::{RosterDelta, Topic, TopicId, TopicRole, TopicStatus, TopicUser};
pub use model::user::{User, UserId, UserRole, UserValidationError};
pub use repo::notification_repo::{
    NotificationRepoError, NotificationRepository, SqliteNotificationRepository,
};
pub use repo::topic_repo::{
    SqliteTopicRepository, TopicFieldUpdate, TopicListQuery, TopicPage, TopicRepoError,
    TopicRepoResult, TopicRepository, PAGE_SIZE,
};
pub use repo::user_repo::{
    ensure_admin_user, SqliteUserRepository, UserDirectory, UserRepoError, UserRepository,
};
pub use service::notify::NotificationIntent;
pub use service::topic_service::{TopicChanges, TopicDraft, TopicService, TopicServiceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
