use rusqlite::Connection;
use serde_json::{json, Value};
use talenttrack_core::db::open_db_in_memory;
use talenttrack_core::model::identity::Role;
use talenttrack_core::model::team::TeamId;
use talenttrack_core::model::topic::Subtopic;
use talenttrack_core::repo::session_repo::{insert_session, insert_user};
use talenttrack_core::repo::team_repo::{add_team_member, insert_team, soft_delete_team};
use talenttrack_core::repo::topic_repo::{SqliteTopicRepository, TopicRepository};
use talenttrack_core::{ExecutionMode, MutationPipeline, PipelineFailure, TopicAdminService};
use uuid::Uuid;

const OWNER_TOKEN: &str = "owner-session";

struct Fixture {
    conn: Connection,
    team_id: TeamId,
}

fn fixture() -> Fixture {
    let conn = open_db_in_memory().unwrap();

    let owner = insert_user(&conn, "Sam Owner", Role::Member).unwrap();
    insert_session(&conn, OWNER_TOKEN, owner, None).unwrap();
    let team_id = insert_team(&conn, "Core Hiring", owner).unwrap();

    Fixture { conn, team_id }
}

fn service() -> TopicAdminService {
    TopicAdminService::new(MutationPipeline::new(ExecutionMode::Development))
}

fn subtopics_of(conn: &mut Connection, topic_id: Uuid) -> Vec<Subtopic> {
    SqliteTopicRepository::new(conn)
        .list_subtopics(topic_id)
        .unwrap()
}

fn create_algorithms_topic(fixture: &mut Fixture) -> Uuid {
    let raw = json!({
        "team_id": fixture.team_id.to_string(),
        "name": "Algorithms",
        "description": "Screening track",
        "subtopics": [
            { "name": "Arrays" },
            { "name": "Linked Lists" },
        ],
    });

    let output = service()
        .create_topic(&mut fixture.conn, Some(OWNER_TOKEN), &raw)
        .unwrap();
    assert_eq!(output.subtopics.added, 2);
    output.topic_id
}

fn update_payload(team_id: TeamId, topic_id: Uuid, subtopics: Value) -> Value {
    json!({
        "team_id": team_id.to_string(),
        "topic_id": topic_id.to_string(),
        "subtopics": subtopics,
    })
}

#[test]
fn create_persists_topic_with_children() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);

    let topic = SqliteTopicRepository::new(&mut fx.conn)
        .get_topic(topic_id)
        .unwrap()
        .unwrap();
    assert_eq!(topic.name, "Algorithms");
    assert_eq!(topic.description.as_deref(), Some("Screening track"));

    let children = subtopics_of(&mut fx.conn, topic_id);
    let names: Vec<&str> = children.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Arrays", "Linked Lists"]);
}

#[test]
fn update_reconciles_children_against_the_echoed_target() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);
    let children = subtopics_of(&mut fx.conn, topic_id);
    let arrays_id = children
        .iter()
        .find(|s| s.name == "Arrays")
        .map(|s| s.uuid)
        .unwrap();

    // Keep Arrays, drop Linked Lists, add Trees.
    let raw = update_payload(
        fx.team_id,
        topic_id,
        json!([
            { "id": arrays_id.to_string(), "name": "Arrays" },
            { "name": "Trees" },
        ]),
    );
    let output = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap();

    assert_eq!(output.subtopics.deleted, 1);
    assert_eq!(output.subtopics.updated, 0);
    assert_eq!(output.subtopics.added, 1);

    let names: Vec<String> = subtopics_of(&mut fx.conn, topic_id)
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Arrays", "Trees"]);
}

#[test]
fn echoing_the_persisted_state_back_is_a_noop() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);

    let echoed: Vec<Value> = subtopics_of(&mut fx.conn, topic_id)
        .into_iter()
        .map(|s| json!({ "id": s.uuid.to_string(), "name": s.name }))
        .collect();
    let raw = update_payload(fx.team_id, topic_id, Value::Array(echoed));

    let output = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap();
    assert!(output.subtopics.is_noop());
}

#[test]
fn empty_target_deletes_every_child() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);

    let raw = update_payload(fx.team_id, topic_id, json!([]));
    let output = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap();

    assert_eq!(output.subtopics.deleted, 2);
    assert!(subtopics_of(&mut fx.conn, topic_id).is_empty());
}

#[test]
fn stale_child_reference_fails_and_leaves_state_unchanged() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);
    let before = subtopics_of(&mut fx.conn, topic_id);

    let raw = update_payload(
        fx.team_id,
        topic_id,
        json!([
            { "id": Uuid::new_v4().to_string(), "name": "Ghost" },
        ]),
    );
    let err = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    match err {
        PipelineFailure::ActionFailed { message, field } => {
            assert!(message.contains("no longer exists"), "got `{message}`");
            assert_eq!(field, None);
        }
        other => panic!("unexpected failure: {other:?}"),
    }

    assert_eq!(subtopics_of(&mut fx.conn, topic_id), before);
}

#[test]
fn duplicate_topic_name_maps_to_the_name_field() {
    let mut fx = fixture();
    create_algorithms_topic(&mut fx);

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "name": "Algorithms",
        "subtopics": [],
    });
    let err = service()
        .create_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    assert_eq!(
        err,
        PipelineFailure::ActionFailed {
            message: "value for `name` is already in use".to_string(),
            field: Some("name".to_string()),
        }
    );
}

#[test]
fn renaming_a_child_into_a_sibling_collision_maps_to_the_name_field() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);
    let children = subtopics_of(&mut fx.conn, topic_id);
    let arrays_id = children
        .iter()
        .find(|s| s.name == "Arrays")
        .map(|s| s.uuid)
        .unwrap();
    let lists_id = children
        .iter()
        .find(|s| s.name == "Linked Lists")
        .map(|s| s.uuid)
        .unwrap();

    // Both children survive, but Arrays takes its sibling's name. The
    // composite (topic_uuid, name) index rejects the apply and the failure
    // must name `name`, not the index's leading uuid column.
    let raw = update_payload(
        fx.team_id,
        topic_id,
        json!([
            { "id": arrays_id.to_string(), "name": "Linked Lists" },
            { "id": lists_id.to_string(), "name": "Linked Lists" },
        ]),
    );
    let err = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    assert_eq!(
        err,
        PipelineFailure::ActionFailed {
            message: "value for `name` is already in use".to_string(),
            field: Some("name".to_string()),
        }
    );

    // Rolled back: both original names still persisted.
    let names: Vec<String> = subtopics_of(&mut fx.conn, topic_id)
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Arrays", "Linked Lists"]);
}

#[test]
fn a_name_can_move_from_a_removed_child_to_a_new_one() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);
    let children = subtopics_of(&mut fx.conn, topic_id);
    let arrays_id = children
        .iter()
        .find(|s| s.name == "Arrays")
        .map(|s| s.uuid)
        .unwrap();

    // "Arrays" is removed and re-created as a new child in the same request;
    // deletes run before inserts, so the unique index is never tripped.
    let raw = update_payload(
        fx.team_id,
        topic_id,
        json!([
            { "name": "Arrays", "description": "rebuilt" },
        ]),
    );
    let output = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap();

    assert_eq!(output.subtopics.deleted, 2);
    assert_eq!(output.subtopics.added, 1);

    let rebuilt = subtopics_of(&mut fx.conn, topic_id);
    assert_eq!(rebuilt.len(), 1);
    assert_ne!(rebuilt[0].uuid, arrays_id);
    assert_eq!(rebuilt[0].description.as_deref(), Some("rebuilt"));
}

#[test]
fn null_subtopics_is_rejected_instead_of_deleting_all() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);

    // `null` is how an unset form value commonly serializes; it must fail
    // validation, never read as an empty target list.
    let raw = update_payload(fx.team_id, topic_id, Value::Null);
    let err = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    match err {
        PipelineFailure::ValidationFailed(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "subtopics");
            assert_eq!(errors[0].message, "must be a list");
        }
        other => panic!("unexpected failure: {other:?}"),
    }

    assert_eq!(subtopics_of(&mut fx.conn, topic_id).len(), 2);
}

#[test]
fn absent_subtopics_key_is_a_required_field_failure() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "topic_id": topic_id.to_string(),
        "name": "Renamed",
    });
    let err = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    match err {
        PipelineFailure::ValidationFailed(errors) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].field, "subtopics");
            assert_eq!(errors[0].message, "is required");
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[test]
fn delete_topic_removes_the_whole_aggregate() {
    let mut fx = fixture();
    let topic_id = create_algorithms_topic(&mut fx);

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "topic_id": topic_id.to_string(),
    });
    service()
        .delete_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap();

    assert!(SqliteTopicRepository::new(&mut fx.conn)
        .get_topic(topic_id)
        .unwrap()
        .is_none());
    assert!(subtopics_of(&mut fx.conn, topic_id).is_empty());
}

#[test]
fn update_of_unknown_topic_reports_parent_not_found() {
    let mut fx = fixture();

    let raw = update_payload(fx.team_id, Uuid::new_v4(), json!([]));
    let err = service()
        .update_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    match err {
        PipelineFailure::ActionFailed { message, .. } => {
            assert!(message.contains("not found"), "got `{message}`");
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}

#[test]
fn expired_sessions_are_rejected_as_unauthenticated() {
    let mut fx = fixture();

    let user = insert_user(&fx.conn, "Late Larry", Role::Member).unwrap();
    insert_session(&fx.conn, "expired-session", user, Some(1)).unwrap();
    add_team_member(&fx.conn, fx.team_id, user).unwrap();

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "name": "Anything",
        "subtopics": [],
    });
    let err = service()
        .create_topic(&mut fx.conn, Some("expired-session"), &raw)
        .unwrap_err();
    assert_eq!(err, PipelineFailure::Unauthenticated);
}

#[test]
fn non_members_are_forbidden_and_members_are_not() {
    let mut fx = fixture();

    let outsider = insert_user(&fx.conn, "Outside Olive", Role::Member).unwrap();
    insert_session(&fx.conn, "outsider-session", outsider, None).unwrap();

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "name": "Systems Design",
        "subtopics": [],
    });
    let err = service()
        .create_topic(&mut fx.conn, Some("outsider-session"), &raw)
        .unwrap_err();
    assert_eq!(err, PipelineFailure::Forbidden);

    add_team_member(&fx.conn, fx.team_id, outsider).unwrap();
    service()
        .create_topic(&mut fx.conn, Some("outsider-session"), &raw)
        .unwrap();
}

#[test]
fn soft_deleted_team_denies_mutations_as_team_not_found() {
    let mut fx = fixture();

    soft_delete_team(&fx.conn, fx.team_id).unwrap();

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "name": "Anything",
        "subtopics": [],
    });
    let err = service()
        .create_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();
    assert_eq!(err, PipelineFailure::TeamNotFound);
}

#[test]
fn validation_reports_indexed_subtopic_fields() {
    let mut fx = fixture();

    let raw = json!({
        "team_id": fx.team_id.to_string(),
        "name": "Algorithms",
        "subtopics": [
            { "name": "Arrays" },
            { "name": "" },
            { "id": Uuid::new_v4().to_string(), "name": "Sneaky" },
        ],
    });
    let err = service()
        .create_topic(&mut fx.conn, Some(OWNER_TOKEN), &raw)
        .unwrap_err();

    match err {
        PipelineFailure::ValidationFailed(errors) => {
            let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
            assert!(fields.contains(&"subtopics[1].name"), "got {fields:?}");
            assert!(fields.contains(&"subtopics[2].id"), "got {fields:?}");
        }
        other => panic!("unexpected failure: {other:?}"),
    }
}
