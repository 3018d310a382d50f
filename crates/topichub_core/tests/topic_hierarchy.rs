use rusqlite::Connection;
use topichub_core::db::open_db_in_memory;
use topichub_core::{
    SqliteTopicRepository, SqliteUserRepository, TopicDraft, TopicId, TopicService,
    TopicServiceError, TopicStatus, User, UserId, UserRepository, UserRole,
};
use uuid::Uuid;

const NOW: i64 = 1_700_000_000_000;

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
    let user = User::new(email, UserRole::Supervisor, NOW).unwrap();
    SqliteUserRepository::new(conn).create_user(&user).unwrap()
}

fn create_topic(conn: &Connection, creator: UserId, title: &str) -> TopicId {
    let draft = TopicDraft {
        title: title.to_string(),
        description: String::new(),
        requirements: String::new(),
        status: TopicStatus::NotStarted,
        deadline: 1_760_000_000_000,
    };
    service(conn).create_topic(creator, &draft, NOW).unwrap()
}

#[test]
fn associate_and_traverse_one_hop() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let root = create_topic(&conn, creator, "Root");
    let left = create_topic(&conn, creator, "Left");
    let right = create_topic(&conn, creator, "Right");

    service.associate_topics(root, left).unwrap();
    service.associate_topics(root, right).unwrap();

    let mut children: Vec<TopicId> = service
        .sub_topics(root)
        .unwrap()
        .into_iter()
        .map(|topic| topic.id)
        .collect();
    children.sort();
    let mut expected = vec![left, right];
    expected.sort();
    assert_eq!(children, expected);

    let parents: Vec<TopicId> = service
        .parent_topics(left)
        .unwrap()
        .into_iter()
        .map(|topic| topic.id)
        .collect();
    assert_eq!(parents, vec![root]);

    // One hop only: no transitive closure.
    assert!(service.sub_topics(left).unwrap().is_empty());
}

#[test]
fn associate_rejects_unknown_endpoints() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let known = create_topic(&conn, creator, "Known");
    let unknown = Uuid::new_v4();

    let err = service.associate_topics(known, unknown).unwrap_err();
    assert!(matches!(err, TopicServiceError::ChildNotFound(id) if id == unknown));

    let err = service.associate_topics(unknown, known).unwrap_err();
    assert!(matches!(err, TopicServiceError::ParentNotFound(id) if id == unknown));
}

#[test]
fn duplicate_edge_is_a_conflict_and_leaves_one_row() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let parent = create_topic(&conn, creator, "Parent");
    let child = create_topic(&conn, creator, "Child");

    service.associate_topics(parent, child).unwrap();
    let err = service.associate_topics(parent, child).unwrap_err();
    assert!(matches!(
        err,
        TopicServiceError::AssociationExists { parent_id, child_id }
            if parent_id == parent && child_id == child
    ));

    let edges: i64 = conn
        .query_row("SELECT COUNT(*) FROM associated_topics;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(edges, 1);
}

#[test]
fn self_association_is_rejected() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let topic = create_topic(&conn, creator, "Loner");

    let err = service.associate_topics(topic, topic).unwrap_err();
    assert!(matches!(err, TopicServiceError::SelfAssociation(id) if id == topic));
}

#[test]
fn reverse_edge_would_close_a_cycle() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let a = create_topic(&conn, creator, "A");
    let b = create_topic(&conn, creator, "B");

    service.associate_topics(a, b).unwrap();
    let err = service.associate_topics(b, a).unwrap_err();
    assert!(matches!(
        err,
        TopicServiceError::CycleDetected { parent_id, child_id }
            if parent_id == b && child_id == a
    ));
}

#[test]
fn longer_cycles_are_rejected_too() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let a = create_topic(&conn, creator, "A");
    let b = create_topic(&conn, creator, "B");
    let c = create_topic(&conn, creator, "C");

    service.associate_topics(a, b).unwrap();
    service.associate_topics(b, c).unwrap();

    let err = service.associate_topics(c, a).unwrap_err();
    assert!(matches!(err, TopicServiceError::CycleDetected { .. }));

    // A second parent for an existing child stays legal: this is a DAG,
    // not a tree.
    let d = create_topic(&conn, creator, "D");
    service.associate_topics(d, c).unwrap();
}

#[test]
fn dissociate_removes_the_exact_edge() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let parent = create_topic(&conn, creator, "Parent");
    let child = create_topic(&conn, creator, "Child");

    service.associate_topics(parent, child).unwrap();
    service.dissociate_topics(parent, child).unwrap();

    assert!(service.sub_topics(parent).unwrap().is_empty());

    let err = service.dissociate_topics(parent, child).unwrap_err();
    assert!(matches!(
        err,
        TopicServiceError::AssociationNotFound { parent_id, child_id }
            if parent_id == parent && child_id == child
    ));
}

#[test]
fn edges_survive_independently_of_other_edges() {
    let conn = setup();
    let service = service(&conn);
    let creator = insert_user(&conn, "creator@example.org");
    let root = create_topic(&conn, creator, "Root");
    let left = create_topic(&conn, creator, "Left");
    let right = create_topic(&conn, creator, "Right");

    service.associate_topics(root, left).unwrap();
    service.associate_topics(root, right).unwrap();
    service.dissociate_topics(root, left).unwrap();

    let children: Vec<TopicId> = service
        .sub_topics(root)
        .unwrap()
        .into_iter()
        .map(|topic| topic.id)
        .collect();
    assert_eq!(children, vec![right]);
}
