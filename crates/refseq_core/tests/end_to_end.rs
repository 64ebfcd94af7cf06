use refseq_core::{
    open_db_in_memory, sequence_name_for, AllocError, CreateItemRequest, EntityKind, EntityRef,
    HookError, NewReference, ReferenceConfig, ReferenceRecord, ReferenceRepository,
    SequenceError, SequenceStore, SqliteReferenceRepository, SqliteSequenceStore, TrackerError,
    TrackerService,
};
use rusqlite::Connection;

fn sequence_value(conn: &Connection, project_id: i64) -> Option<i64> {
    SqliteSequenceStore::new(conn)
        .current_value(&sequence_name_for(project_id))
        .unwrap()
}

#[test]
fn project_lifecycle_drives_sequence_and_references() {
    let mut conn = open_db_in_memory().unwrap();
    let mut tracker =
        TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();

    let project = tracker.create_project("Apollo").unwrap();
    let story = tracker
        .create_item(&CreateItemRequest::new(
            EntityKind::UserStory,
            project.id,
            "launch checklist",
        ))
        .unwrap();
    let issue = tracker
        .create_item(&CreateItemRequest::new(
            EntityKind::Issue,
            project.id,
            "fuel leak",
        ))
        .unwrap();
    assert_eq!(story.reference, Some(1));
    assert_eq!(issue.reference, Some(2));

    let resolved = tracker.resolve(project.id, 2).unwrap().unwrap();
    assert_eq!(resolved.entity(), issue.entity);

    tracker.delete_project(project.id).unwrap();
    assert!(tracker.get_item(story.entity).unwrap().is_none());
    assert_eq!(tracker.references(project.id).unwrap().len(), 2);
    drop(tracker);

    assert_eq!(sequence_value(&conn, project.id), None);
}

#[test]
fn fresh_project_has_an_unused_sequence() {
    let mut conn = open_db_in_memory().unwrap();
    let project_id = {
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        tracker.create_project("Gemini").unwrap().id
    };
    assert_eq!(sequence_value(&conn, project_id), Some(0));
}

#[test]
fn imports_keep_their_numbers_until_finished() {
    let mut conn = open_db_in_memory().unwrap();
    let project_id = {
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        let project = tracker.create_project("Mercury").unwrap();

        let imported = tracker
            .create_item(
                &CreateItemRequest::new(EntityKind::Task, project.id, "legacy task")
                    .imported(999),
            )
            .unwrap();
        assert_eq!(imported.reference, Some(999));
        assert!(tracker.references(project.id).unwrap().is_empty());
        project.id
    };

    // The import consumed no number.
    assert_eq!(sequence_value(&conn, project_id), Some(0));

    let mut tracker =
        TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
    assert_eq!(tracker.finish_import(project_id).unwrap(), 999);
    let next = tracker
        .create_item(&CreateItemRequest::new(
            EntityKind::Task,
            project_id,
            "new task",
        ))
        .unwrap();
    assert_eq!(next.reference, Some(1000));
    drop(tracker);

    assert_eq!(sequence_value(&conn, project_id), Some(1000));
}

#[test]
fn failed_assignment_rolls_back_the_item() {
    let mut conn = open_db_in_memory().unwrap();
    let project_id = {
        let mut tracker =
            TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
        tracker.create_project("Skylab").unwrap().id
    };
    SqliteReferenceRepository::new(&conn)
        .insert_reference(&NewReference {
            project_id,
            entity: EntityRef::new(EntityKind::Issue, 77),
            reference: 1,
        })
        .unwrap();

    let mut tracker =
        TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
    let err = tracker
        .create_item(&CreateItemRequest::new(
            EntityKind::UserStory,
            project_id,
            "collides",
        ))
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Hook(HookError::Alloc(AllocError::DuplicateReference {
            reference: 1,
            ..
        }))
    ));
    assert!(tracker.list_items(project_id).unwrap().is_empty());
    assert_eq!(tracker.references(project_id).unwrap().len(), 1);
}

#[test]
fn exhausted_sequence_fails_item_creation() {
    let mut conn = open_db_in_memory().unwrap();
    let mut tracker =
        TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
    let project = tracker.create_project("Vostok").unwrap();
    tracker
        .create_item(
            &CreateItemRequest::new(EntityKind::Task, project.id, "last import")
                .imported(i64::MAX),
        )
        .unwrap();
    assert_eq!(tracker.finish_import(project.id).unwrap(), i64::MAX);

    let err = tracker
        .create_item(&CreateItemRequest::new(
            EntityKind::Task,
            project.id,
            "one too many",
        ))
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::Hook(HookError::Alloc(AllocError::Sequence(
            SequenceError::Exhausted(_)
        )))
    ));
    assert_eq!(tracker.list_items(project.id).unwrap().len(), 1);
    drop(tracker);

    assert_eq!(sequence_value(&conn, project.id), Some(i64::MAX));
}

#[test]
fn reference_records_serialize_with_a_ref_field() {
    let mut conn = open_db_in_memory().unwrap();
    let mut tracker =
        TrackerService::with_reference_hooks(&mut conn, ReferenceConfig::default()).unwrap();
    let project = tracker.create_project("Vostok").unwrap();
    let task = tracker
        .create_item(&CreateItemRequest::new(EntityKind::Task, project.id, "orbit"))
        .unwrap();

    let records = tracker.references(project.id).unwrap();
    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json["project_id"], project.id);
    assert_eq!(json["entity_type"], "task");
    assert_eq!(json["entity_id"], task.entity.id);
    assert_eq!(json["ref"], 1);

    let parsed: ReferenceRecord = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, records[0]);
}
