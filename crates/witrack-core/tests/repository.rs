use rusqlite::Connection;
use serde_json::{Map, Value, json};
use uuid::Uuid;
use witrack_core::Error;
use witrack_core::db::{
    IdentityRepository, IterationRepository, WorkItemRepository, WorkItemTypeRepository,
    open_in_memory, open_store,
};
use witrack_core::model::work_item::{SYSTEM_ASSIGNEE, SYSTEM_ITERATION, SYSTEM_STATE};
use witrack_core::model::{IterationState, NewIteration, WorkItemCounts};
use witrack_core::paging::{Page, PagingLinks};
use witrack_core::query::{CompareOp, Expression};
use witrack_core::system::{SYSTEM_BUG, SYSTEM_FEATURE, seed_system_types};

const CREATOR: &str = "5f0c1e7e-6a0e-4f59-9d43-2f1f8f9c7a11";

fn seeded() -> Connection {
    let conn = open_in_memory().expect("open store");
    seed_system_types(&conn).expect("seed system types");
    conn
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object literal")
}

fn bug(repo: &WorkItemRepository<'_>, title: &str, state: &str) -> witrack_core::model::WorkItem {
    repo.create(
        SYSTEM_BUG,
        &fields(json!({"system.title": title, "system.state": state})),
        CREATOR,
    )
    .expect("create bug")
}

#[test]
fn create_stamps_version_zero_and_creator() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);

    let item = bug(&repo, "Crash on save", "new");
    assert_eq!(item.version, 0);
    assert_eq!(item.type_name, SYSTEM_BUG);
    assert_eq!(item.fields["system.creator"], json!(CREATOR));

    let loaded = repo.load(&item.id).expect("load");
    assert_eq!(loaded.fields, item.fields);
    assert_eq!(loaded.version, 0);
}

#[test]
fn create_rejects_bad_input() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);

    assert!(matches!(
        repo.create("system.nothing", &Map::new(), CREATOR),
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        repo.create(SYSTEM_BUG, &fields(json!({"system.state": "new"})), CREATOR),
        Err(Error::RequiredField { ref field }) if field == "system.title"
    ));
    assert!(matches!(
        repo.create(
            SYSTEM_BUG,
            &fields(json!({"system.title": "t", "system.state": "paused"})),
            CREATOR
        ),
        Err(Error::Conversion { ref field, .. }) if field == "system.state"
    ));
    assert!(matches!(
        repo.create(SYSTEM_BUG, &Map::new(), " "),
        Err(Error::BadParameter { .. })
    ));

    let (items, total) = repo.list(&Expression::True, None, None).expect("list");
    assert!(items.is_empty());
    assert_eq!(total, 0);
}

#[test]
fn every_save_bumps_version_by_one() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    let mut item = bug(&repo, "Flaky test", "new");

    for expected in 1..=5 {
        item.fields.insert(SYSTEM_STATE.to_string(), json!("open"));
        item = repo.save(&item).expect("save");
        assert_eq!(item.version, expected);
    }
    assert_eq!(repo.load(&item.id).expect("load").version, 5);
}

#[test]
fn loose_save_ignores_caller_version_but_checked_save_does_not() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    let original = bug(&repo, "Stale", "new");

    let mut stale = original.clone();
    stale.version = 42;
    assert_eq!(repo.save(&stale).expect("loose save").version, 1);

    let err = repo.save_checked(&original).expect_err("stale write");
    assert!(matches!(
        err,
        Error::VersionConflict { ref expected, actual: 1, .. } if expected == "0"
    ));

    let fresh = repo.load(&original.id).expect("load");
    assert_eq!(repo.save_checked(&fresh).expect("checked save").version, 2);
}

#[test]
fn failed_save_leaves_row_untouched() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    let item = bug(&repo, "Keep me", "new");

    let mut broken = item.clone();
    broken.fields.remove("system.title");
    assert!(matches!(repo.save(&broken), Err(Error::RequiredField { .. })));

    let mut unknown_type = item.clone();
    unknown_type.type_name = "system.nothing".to_string();
    assert!(matches!(
        repo.save(&unknown_type),
        Err(Error::BadParameter { ref parameter, .. }) if parameter == "type"
    ));

    let reloaded = repo.load(&item.id).expect("load");
    assert_eq!(reloaded.version, 0);
    assert_eq!(reloaded.fields, item.fields);
}

#[test]
fn save_can_change_type() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    let mut item = bug(&repo, "Actually a feature", "new");

    item.type_name = SYSTEM_FEATURE.to_string();
    let saved = repo.save(&item).expect("save");
    assert_eq!(saved.type_name, SYSTEM_FEATURE);
    assert_eq!(repo.load(&item.id).expect("load").type_name, SYSTEM_FEATURE);
}

#[test]
fn missing_and_deleted_items_are_not_found() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    let item = bug(&repo, "Doomed", "new");

    for id in ["999", "abc", "-1", ""] {
        assert!(matches!(repo.load(id), Err(Error::NotFound { .. })), "{id}");
    }

    repo.delete(&item.id).expect("delete");
    assert!(matches!(repo.load(&item.id), Err(Error::NotFound { .. })));
    assert!(matches!(repo.delete(&item.id), Err(Error::NotFound { .. })));
    assert!(matches!(repo.save(&item), Err(Error::NotFound { .. })));
}

#[test]
fn update_assignee_checks_version_then_identity() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    let people = IdentityRepository::new(&conn);
    let ada = people.create("Ada", None).expect("identity");
    let item = bug(&repo, "Needs an owner", "new");

    let err = repo
        .update_assignee(&item.id, "3", Some("not-a-uuid"))
        .expect_err("stale version wins over bad uuid");
    assert!(matches!(err, Error::VersionConflict { .. }));

    assert!(matches!(
        repo.update_assignee(&item.id, "0", Some("not-a-uuid")),
        Err(Error::BadParameter { ref parameter, .. }) if parameter == "assignee"
    ));
    assert!(matches!(
        repo.update_assignee(&item.id, "0", Some(Uuid::new_v4().to_string().as_str())),
        Err(Error::NotFound { entity: "identity", .. })
    ));
    assert!(matches!(
        repo.update_assignee("404", "0", None),
        Err(Error::NotFound { .. })
    ));

    let assigned = repo
        .update_assignee(&item.id, "0", Some(ada.id.to_string().as_str()))
        .expect("assign");
    assert_eq!(assigned.version, 1);
    assert_eq!(assigned.assignee(), Some(ada.id.to_string().as_str()));

    let cleared = repo.update_assignee(&item.id, "1", None).expect("clear");
    assert_eq!(cleared.version, 2);
    assert!(!cleared.fields.contains_key(SYSTEM_ASSIGNEE));
}

#[test]
fn list_filters_pages_and_counts() {
    let conn = seeded();
    let repo = WorkItemRepository::new(&conn);
    for n in 0..13 {
        let state = if n % 3 == 0 { "closed" } else { "new" };
        bug(&repo, &format!("item {n}"), state);
    }

    let page = Page::new(2, 5);
    let (items, total) = repo
        .list(&Expression::True, Some(page.offset), Some(page.limit))
        .expect("list");
    assert_eq!(total, 13);
    assert_eq!(items.len(), 5);
    assert_eq!(items[0].title(), Some("item 2"));

    let links = PagingLinks::compute(page, items.len(), usize::try_from(total).expect("fits"));
    assert_eq!(links.first, Page::new(0, 2));
    assert_eq!(links.last, Page::new(12, 5));
    assert_eq!(links.prev, Some(Page::new(0, 2)));
    assert_eq!(links.next, Some(Page::new(7, 5)));

    let (closed, closed_total) = repo
        .list(&Expression::equals(SYSTEM_STATE, "closed"), None, None)
        .expect("filtered list");
    assert_eq!(closed_total, 5);
    assert!(closed.iter().all(|item| item.state() == Some("closed")));

    let simple = Expression::parse_simple(r#"{"system.state":"new","system.title":"item 4"}"#)
        .expect("simple query");
    let (matched, _) = repo.list(&simple, None, None).expect("simple list");
    assert_eq!(matched.len(), 1);

    let not_closed = Expression::Not(Box::new(Expression::compare(
        SYSTEM_STATE,
        CompareOp::Eq,
        "closed",
    )));
    let (_, open_total) = repo.list(&not_closed, Some(100), Some(5)).expect("past the end");
    assert_eq!(open_total, 8);
}

#[test]
fn counts_per_iteration_aggregates_live_items() {
    let conn = seeded();
    let items = WorkItemRepository::new(&conn);
    let iterations = IterationRepository::new(&conn);
    let space = Uuid::new_v4();

    let sprint = iterations
        .create(&NewIteration::new(space, "Sprint 1"))
        .expect("iteration");
    let empty = iterations
        .create(&NewIteration::new(space, "Sprint 2"))
        .expect("iteration");
    let elsewhere = iterations
        .create(&NewIteration::new(Uuid::new_v4(), "Other space"))
        .expect("iteration");

    let create_in = |iteration: Uuid, state: &str| {
        items
            .create(
                SYSTEM_BUG,
                &fields(json!({
                    "system.title": "t",
                    "system.state": state,
                    SYSTEM_ITERATION: iteration.to_string(),
                })),
                CREATOR,
            )
            .expect("create")
    };
    for _ in 0..3 {
        create_in(sprint.id, "new");
    }
    for _ in 0..2 {
        create_in(sprint.id, "closed");
    }
    create_in(elsewhere.id, "new");
    let removed = create_in(sprint.id, "closed");
    items.delete(&removed.id).expect("delete");

    let counts = items.counts_per_iteration(&space).expect("counts");
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[&sprint.id], WorkItemCounts { total: 5, closed: 2 });
    assert!(!counts.contains_key(&empty.id));
}

#[test]
fn type_inheritance_through_the_registry() {
    let conn = seeded();
    let types = WorkItemTypeRepository::new(&conn);
    let own = witrack_core::model::field_definition::decode_fields(
        r#"{
            "severity": {"required": true, "type": {"kind": "enum", "base_kind": "integer", "values": [1, 2, 3]}},
            "system.description": {"required": true, "type": {"kind": "string"}}
        }"#,
    )
    .expect("decode fields");

    let incident = types
        .create(Some(SYSTEM_BUG), "incident", own)
        .expect("create subtype");
    let bug = types.load(SYSTEM_BUG).expect("load bug");

    assert_eq!(incident.fields.len(), bug.fields.len() + 1);
    assert!(incident.fields["system.description"].required);
    assert!(!bug.fields["system.description"].required);

    let repo = WorkItemRepository::new(&conn);
    let err = repo
        .create(
            "incident",
            &fields(json!({"system.title": "t", "system.state": "new", "severity": 2})),
            CREATOR,
        )
        .expect_err("description now required");
    assert!(matches!(err, Error::RequiredField { ref field } if field == "system.description"));
}

#[test]
fn iteration_lifecycle_round_trip() {
    let conn = seeded();
    let repo = IterationRepository::new(&conn);
    let space = Uuid::new_v4();
    let a = repo.create(&NewIteration::new(space, "A")).expect("a");
    let b = repo.create(&NewIteration::new(space, "B")).expect("b");

    repo.transition(&a.id, IterationState::Start).expect("start a");
    assert!(matches!(
        repo.transition(&b.id, IterationState::Start),
        Err(Error::BadParameter { .. })
    ));
    repo.transition(&a.id, IterationState::Close).expect("close a");
    repo.transition(&b.id, IterationState::Start).expect("start b");
}

#[test]
fn concurrent_saves_never_lose_increments() {
    const THREADS: i64 = 4;
    const SAVES: i64 = 10;

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("witrack.sqlite3");
    let id = {
        let conn = open_store(&path).expect("open store");
        seed_system_types(&conn).expect("seed");
        bug(&WorkItemRepository::new(&conn), "contended", "new").id
    };

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let path = path.clone();
            let id = id.clone();
            std::thread::spawn(move || {
                let conn = open_store(&path).expect("open store");
                let repo = WorkItemRepository::new(&conn);
                for _ in 0..SAVES {
                    let item = repo.load(&id).expect("load");
                    repo.save(&item).expect("save");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    let conn = open_store(&path).expect("open store");
    let version = WorkItemRepository::new(&conn)
        .load(&id)
        .expect("load")
        .version;
    assert_eq!(version, THREADS * SAVES);
}
