use rusqlite::Connection;
use topichub_core::db::open_db_in_memory;
use topichub_core::{
    NotificationRepository, NotificationType, SqliteNotificationRepository, SqliteTopicRepository,
    SqliteUserRepository, TopicDraft, TopicId, TopicRole, TopicService, TopicServiceError,
    TopicStatus, User, UserId, UserRepository, UserRole,
};
use uuid::Uuid;

const NOW: i64 = 1_700_000_000_000;
const LATER: i64 = 1_700_000_600_000;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn service(conn: &Connection) -> TopicService<SqliteTopicRepository<'_>, SqliteUserRepository<'_>> {
    TopicService::new(
        SqliteTopicRepository::new(conn),
        SqliteUserRepository::new(conn),
    )
}

fn insert_user(conn: &Connection, email: &str) -> UserId {
    let user = User::new(email, UserRole::Student, NOW).unwrap();
    SqliteUserRepository::new(conn).create_user(&user).unwrap()
}

fn create_topic(conn: &Connection, creator: UserId) -> TopicId {
    let draft = TopicDraft {
        title: "Roster topic".to_string(),
        description: String::new(),
        requirements: String::new(),
        status: TopicStatus::InProgress,
        deadline: 1_760_000_000_000,
    };
    service(conn).create_topic(creator, &draft, NOW).unwrap()
}

fn member_ids(conn: &Connection, topic_id: TopicId, role: TopicRole) -> Vec<UserId> {
    let mut ids: Vec<UserId> = service(conn)
        .users_by_role(topic_id, role)
        .unwrap()
        .into_iter()
        .map(|user| user.id)
        .collect();
    ids.sort();
    ids
}

#[test]
fn replace_membership_exactly_matches_target() {
    let conn = setup();
    let service = service(&conn);
    let actor = insert_user(&conn, "actor@example.org");
    let (a, b, c) = (
        insert_user(&conn, "a@example.org"),
        insert_user(&conn, "b@example.org"),
        insert_user(&conn, "c@example.org"),
    );
    let topic_id = create_topic(&conn, actor);

    service
        .change_users_by_role(actor, topic_id, TopicRole::Student, &[a, b], NOW)
        .unwrap();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(member_ids(&conn, topic_id, TopicRole::Student), expected);

    service
        .change_users_by_role(actor, topic_id, TopicRole::Student, &[b, c], LATER)
        .unwrap();
    let mut expected = vec![b, c];
    expected.sort();
    assert_eq!(member_ids(&conn, topic_id, TopicRole::Student), expected);
}

#[test]
fn identical_target_is_idempotent_and_silent() {
    let conn = setup();
    let service = service(&conn);
    let notifications = SqliteNotificationRepository::new(&conn);
    let actor = insert_user(&conn, "actor@example.org");
    let (a, b) = (
        insert_user(&conn, "a@example.org"),
        insert_user(&conn, "b@example.org"),
    );
    let topic_id = create_topic(&conn, actor);

    service
        .change_users_by_role(actor, topic_id, TopicRole::Reviewer, &[a, b], NOW)
        .unwrap();
    let after_first_a = notifications.count_for_user(a).unwrap();
    let after_first_b = notifications.count_for_user(b).unwrap();

    service
        .change_users_by_role(actor, topic_id, TopicRole::Reviewer, &[a, b], LATER)
        .unwrap();

    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(member_ids(&conn, topic_id, TopicRole::Reviewer), expected);
    // Zero diffs, zero new notifications.
    assert_eq!(notifications.count_for_user(a).unwrap(), after_first_a);
    assert_eq!(notifications.count_for_user(b).unwrap(), after_first_b);
}

#[test]
fn user_may_hold_several_roles_via_separate_rows() {
    let conn = setup();
    let service = service(&conn);
    let actor = insert_user(&conn, "actor@example.org");
    let dual = insert_user(&conn, "dual@example.org");
    let topic_id = create_topic(&conn, actor);

    service
        .change_users_by_role(actor, topic_id, TopicRole::Student, &[dual], NOW)
        .unwrap();
    service
        .change_users_by_role(actor, topic_id, TopicRole::Reviewer, &[dual], NOW)
        .unwrap();

    assert_eq!(member_ids(&conn, topic_id, TopicRole::Student), vec![dual]);
    assert_eq!(member_ids(&conn, topic_id, TopicRole::Reviewer), vec![dual]);

    let rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM topic_users WHERE topic_id = ?1 AND user_id = ?2;",
            [topic_id.to_string(), dual.to_string()],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(rows, 2);
}

#[test]
fn unknown_target_user_is_rejected_before_any_write() {
    let conn = setup();
    let service = service(&conn);
    let actor = insert_user(&conn, "actor@example.org");
    let known = insert_user(&conn, "known@example.org");
    let topic_id = create_topic(&conn, actor);

    let unknown = Uuid::new_v4();
    let err = service
        .change_users_by_role(actor, topic_id, TopicRole::Student, &[known, unknown], NOW)
        .unwrap_err();
    assert!(matches!(err, TopicServiceError::UserNotFound(id) if id == unknown));

    assert!(member_ids(&conn, topic_id, TopicRole::Student).is_empty());
}

#[test]
fn roster_change_refreshes_updated_at() {
    let conn = setup();
    let service = service(&conn);
    let actor = insert_user(&conn, "actor@example.org");
    let student = insert_user(&conn, "student@example.org");
    let topic_id = create_topic(&conn, actor);

    service
        .change_users_by_role(actor, topic_id, TopicRole::Student, &[student], LATER)
        .unwrap();

    let topic = service.get_topic(topic_id).unwrap();
    assert_eq!(topic.created_at, NOW);
    assert_eq!(topic.updated_at, LATER);
}

#[test]
fn change_users_on_unknown_topic_is_not_found() {
    let conn = setup();
    let service = service(&conn);
    let actor = insert_user(&conn, "actor@example.org");

    let missing = Uuid::new_v4();
    let err = service
        .change_users_by_role(actor, missing, TopicRole::Student, &[], NOW)
        .unwrap_err();
    assert!(matches!(err, TopicServiceError::TopicNotFound(id) if id == missing));
}

#[test]
fn supervisor_replacement_notifies_exactly_the_diff() {
    let conn = setup();
    let service = service(&conn);
    let notifications = SqliteNotificationRepository::new(&conn);
    let actor_d = insert_user(&conn, "d@example.org");
    let (a, b, c) = (
        insert_user(&conn, "a@example.org"),
        insert_user(&conn, "b@example.org"),
        insert_user(&conn, "c@example.org"),
    );
    let topic_id = create_topic(&conn, actor_d);

    service
        .change_users_by_role(actor_d, topic_id, TopicRole::Supervisor, &[a, b], NOW)
        .unwrap();

    // {A, B} -> {B, C} by D: A removed, C assigned, B and D silent.
    service
        .change_users_by_role(actor_d, topic_id, TopicRole::Supervisor, &[b, c], LATER)
        .unwrap();

    let for_a = notifications.list_for_user(a).unwrap();
    assert_eq!(for_a[0].kind, NotificationType::TopicRemovedFrom);
    assert_eq!(for_a[0].data.as_deref(), Some("supervisor"));
    assert_eq!(for_a[0].updater_id, actor_d);
    assert_eq!(for_a[0].created_at, LATER);

    let for_c = notifications.list_for_user(c).unwrap();
    assert_eq!(for_c.len(), 1);
    assert_eq!(for_c[0].kind, NotificationType::TopicAssignedTo);
    assert_eq!(for_c[0].data.as_deref(), Some("supervisor"));

    // B only has the original assignment row, D has nothing at all.
    assert_eq!(notifications.count_for_user(b).unwrap(), 1);
    assert_eq!(notifications.count_for_user(actor_d).unwrap(), 0);

    let second_op_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM notifications WHERE created_at = ?1;",
            [LATER],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(second_op_rows, 2);
}

#[test]
fn actor_inside_target_set_is_never_notified() {
    let conn = setup();
    let service = service(&conn);
    let notifications = SqliteNotificationRepository::new(&conn);
    let actor = insert_user(&conn, "actor@example.org");
    let other = insert_user(&conn, "other@example.org");
    let topic_id = create_topic(&conn, actor);

    service
        .change_users_by_role(actor, topic_id, TopicRole::Supervisor, &[actor, other], NOW)
        .unwrap();

    assert_eq!(notifications.count_for_user(actor).unwrap(), 0);
    assert_eq!(notifications.count_for_user(other).unwrap(), 1);
}
