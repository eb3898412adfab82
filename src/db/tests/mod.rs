use crate::db::*;
use crate::types::{Status, TaskId};
use tempfile::NamedTempFile;

fn sample_task(provider_task_id: &str) -> NewTask {
    NewTask {
        provider_task_id: provider_task_id.to_string(),
        owner_id: "owner-1".to_string(),
        kind: 0,
        title: Some("Summer Jingle".to_string()),
        status: Status::Processing.to_i32(),
        params: r#"{"prompt":"upbeat summer jingle"}"#.to_string(),
    }
}

fn sample_completion() -> TaskCompletion {
    TaskCompletion {
        source_url: "https://cdn.example.com/track0.mp3".to_string(),
        storage_path: "owner-1/music/task-a/track_0.mp3".to_string(),
        artifact_url: "/artifacts/owner-1/music/task-a/track_0.mp3?expires=1&sig=ab".to_string(),
        provider_item_id: Some("item-0".to_string()),
        duration_secs: Some(31.5),
        tags: Some("pop, upbeat".to_string()),
    }
}

async fn test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

#[tokio::test]
async fn insert_and_get_task() {
    let (db, _guard) = test_db().await;

    let id = db.insert_task(&sample_task("task-a")).await.unwrap();
    assert!(id.0 > 0);

    let task = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.provider_task_id, "task-a");
    assert_eq!(task.owner_id, "owner-1");
    assert_eq!(task.status, Status::Processing.to_i32());
    assert!(task.source_url.is_none());
    assert!(task.completed_at.is_none());

    let by_provider = db.get_task_by_provider_id("task-a").await.unwrap().unwrap();
    assert_eq!(by_provider.id, id.0);

    db.close().await;
}

#[tokio::test]
async fn provider_task_id_is_unique() {
    let (db, _guard) = test_db().await;

    db.insert_task(&sample_task("task-a")).await.unwrap();
    let err = db.insert_task(&sample_task("task-a")).await.unwrap_err();

    match err {
        crate::Error::Database(crate::error::DatabaseError::ConstraintViolation(msg)) => {
            assert!(msg.contains("task-a"));
        }
        other => panic!("expected constraint violation, got {other:?}"),
    }

    db.close().await;
}

#[tokio::test]
async fn complete_if_active_wins_exactly_once() {
    let (db, _guard) = test_db().await;
    let id = db.insert_task(&sample_task("task-a")).await.unwrap();

    let first = db.complete_task_if_active(id, &sample_completion()).await.unwrap();
    assert!(first, "first completion must win");

    let second = db.complete_task_if_active(id, &sample_completion()).await.unwrap();
    assert!(!second, "second completion must be a no-op");

    let task = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert_eq!(task.storage_path.as_deref(), Some("owner-1/music/task-a/track_0.mp3"));
    assert!(task.completed_at.is_some());

    db.close().await;
}

#[tokio::test]
async fn fail_if_active_respects_terminal_states() {
    let (db, _guard) = test_db().await;
    let id = db.insert_task(&sample_task("task-a")).await.unwrap();

    assert!(db.fail_task_if_active(id, Status::Rejected, "policy violation").await.unwrap());

    // Already rejected: neither a second failure nor a completion may land
    assert!(!db.fail_task_if_active(id, Status::Failed, "late error").await.unwrap());
    assert!(!db.complete_task_if_active(id, &sample_completion()).await.unwrap());

    let task = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Rejected.to_i32());
    assert_eq!(task.error_message.as_deref(), Some("policy violation"));
    assert!(task.source_url.is_none(), "artifact fields stay unset on rejection");

    db.close().await;
}

#[tokio::test]
async fn completion_after_failure_is_blocked() {
    let (db, _guard) = test_db().await;
    let id = db.insert_task(&sample_task("task-a")).await.unwrap();

    assert!(db.complete_task_if_active(id, &sample_completion()).await.unwrap());
    assert!(!db.fail_task_if_active(id, Status::Failed, "too late").await.unwrap());

    let task = db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert!(task.error_message.is_none());

    db.close().await;
}

#[tokio::test]
async fn mark_processing_only_from_pending() {
    let (db, _guard) = test_db().await;
    let mut new_task = sample_task("task-a");
    new_task.status = Status::Pending.to_i32();
    let id = db.insert_task(&new_task).await.unwrap();

    assert!(db.mark_task_processing(id).await.unwrap());
    assert!(!db.mark_task_processing(id).await.unwrap(), "already processing");

    db.close().await;
}

#[tokio::test]
async fn variants_insert_list_and_cascade_delete() {
    let (db, _guard) = test_db().await;
    let id = db.insert_task(&sample_task("task-a")).await.unwrap();

    for k in 2..=3 {
        db.insert_variant(&NewVariant {
            task_id: id,
            title: format!("Summer Jingle (Variant {k})"),
            params: r#"{"prompt":"upbeat summer jingle"}"#.to_string(),
            source_url: format!("https://cdn.example.com/track{}.mp3", k - 1),
            storage_path: format!("owner-1/music/task-a/track_{}.mp3", k - 1),
            artifact_url: format!("/artifacts/owner-1/music/task-a/track_{}.mp3", k - 1),
            provider_item_id: Some(format!("item-{}", k - 1)),
            duration_secs: Some(30.0),
            tags: None,
        })
        .await
        .unwrap();
    }

    let variants = db.list_variants(id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].title, "Summer Jingle (Variant 2)");
    assert_eq!(variants[0].status, Status::Completed.to_i32());
    assert_eq!(db.count_variants(id).await.unwrap(), 2);

    assert!(db.delete_task(id).await.unwrap());
    assert_eq!(db.count_variants(id).await.unwrap(), 0, "cascade removes variants");

    db.close().await;
}

#[tokio::test]
async fn notification_log_appends() {
    let (db, _guard) = test_db().await;

    db.record_notification(&NewNotification {
        provider_task_id: Some("task-a".to_string()),
        detected_type: "generation".to_string(),
        raw_payload: r#"{"task_id":"task-a"}"#.to_string(),
        processing_status: "received".to_string(),
    })
    .await
    .unwrap();

    db.record_notification(&NewNotification {
        provider_task_id: None,
        detected_type: "unknown".to_string(),
        raw_payload: "{}".to_string(),
        processing_status: "dropped".to_string(),
    })
    .await
    .unwrap();

    assert_eq!(db.count_notifications().await.unwrap(), 2);

    let for_task = db.list_notifications("task-a").await.unwrap();
    assert_eq!(for_task.len(), 1);
    assert_eq!(for_task[0].detected_type, "generation");

    db.close().await;
}

#[tokio::test]
async fn stale_active_tasks_listing() {
    let (db, _guard) = test_db().await;

    let active = db.insert_task(&sample_task("task-active")).await.unwrap();
    let done = db.insert_task(&sample_task("task-done")).await.unwrap();
    db.complete_task_if_active(done, &sample_completion()).await.unwrap();

    let future_cutoff = chrono::Utc::now().timestamp() + 60;
    let stale = db.list_stale_active_tasks(future_cutoff).await.unwrap();

    assert_eq!(stale.len(), 1);
    assert_eq!(TaskId(stale[0].id), active);

    // A cutoff in the past excludes the fresh task as well
    let past_cutoff = chrono::Utc::now().timestamp() - 3600;
    assert!(db.list_stale_active_tasks(past_cutoff).await.unwrap().is_empty());

    db.close().await;
}

#[tokio::test]
async fn list_tasks_newest_first() {
    let (db, _guard) = test_db().await;

    db.insert_task(&sample_task("task-1")).await.unwrap();
    db.insert_task(&sample_task("task-2")).await.unwrap();
    db.insert_task(&sample_task("task-3")).await.unwrap();

    let tasks = db.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].provider_task_id, "task-3");
    assert_eq!(tasks[2].provider_task_id, "task-1");

    db.close().await;
}
