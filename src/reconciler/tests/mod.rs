use crate::config::{Config, RetryConfig};
use crate::db::NewTask;
use crate::reconciler::{PollOptions, TuneVault};
use crate::types::{
    CompletionOutcome, Event, GeneratedTrack, JobKind, Status, TaskId,
};
use serde_json::json;
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Engine plus the mock servers that play the provider and the CDN
pub(crate) struct TestHarness {
    pub engine: TuneVault,
    pub provider: MockServer,
    pub cdn: MockServer,
    _tmp: TempDir,
}

pub(crate) async fn harness() -> TestHarness {
    harness_with(|_| {}).await
}

pub(crate) async fn harness_with(tweak: impl FnOnce(&mut Config)) -> TestHarness {
    let tmp = tempdir().expect("Failed to create temp dir");
    let provider = MockServer::start().await;
    let cdn = MockServer::start().await;

    let mut config = Config::default();
    config.persistence.database_path = tmp.path().join("tunevault.db");
    config.vault.root_dir = tmp.path().join("vault");
    config.provider.base_url = provider.uri();
    config.provider.api_key = Some("test-key".to_string());
    config.provider.callback_url = Some("https://app.example.com/callbacks/generation".to_string());
    // Tests drive polling explicitly; timers stay off unless enabled
    config.deferred_poll.enabled = false;
    // Millisecond backoff keeps retry-path tests fast
    config.callback_retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    tweak(&mut config);

    let engine = TuneVault::new(config).await.expect("Failed to create engine");

    TestHarness {
        engine,
        provider,
        cdn,
        _tmp: tmp,
    }
}

impl TestHarness {
    /// Register a processing task directly in the database
    pub(crate) async fn seed_task(&self, provider_task_id: &str, kind: JobKind) -> TaskId {
        self.engine
            .db
            .insert_task(&NewTask {
                provider_task_id: provider_task_id.to_string(),
                owner_id: "owner-1".to_string(),
                kind: kind.to_i32(),
                title: Some("Summer Jingle".to_string()),
                status: Status::Processing.to_i32(),
                params: r#"{"prompt":"upbeat summer jingle"}"#.to_string(),
            })
            .await
            .expect("Failed to seed task")
    }

    /// Serve media bytes at the CDN under the given path
    pub(crate) async fn serve_media(&self, media_path: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(media_path))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&self.cdn)
            .await;
    }

    pub(crate) fn media_url(&self, media_path: &str) -> String {
        format!("{}{}", self.cdn.uri(), media_path)
    }

    /// Mount one provider status answer for a music task
    pub(crate) async fn provider_status(&self, provider_task_id: &str, data: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/generate/record-info"))
            .and(query_param("taskId", provider_task_id))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "msg": "success",
                "data": data
            })))
            .mount(&self.provider)
            .await;
    }
}

fn track(url: Option<String>, title: &str) -> GeneratedTrack {
    GeneratedTrack {
        provider_item_id: Some(format!("item-{title}")),
        source_url: url,
        title: Some(title.to_string()),
        tags: Some("pop".to_string()),
        duration_secs: Some(30.0),
        image_url: None,
        model_name: None,
    }
}

// ---------------------------------------------------------------------------
// Completion handler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_stores_primary_and_fans_out_variants() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a0.mp3", b"bytes-0").await;
    h.serve_media("/t/a1.mp3", b"bytes-1").await;
    h.serve_media("/t/a2.mp3", b"bytes-2").await;

    let tracks = vec![
        track(Some(h.media_url("/t/a0.mp3")), "one"),
        track(Some(h.media_url("/t/a1.mp3")), "two"),
        track(Some(h.media_url("/t/a2.mp3")), "three"),
    ];

    let outcome = h.engine.complete_generation("task-a", &tracks).await.unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Completed {
            task_id: id,
            attempted: 3,
            succeeded: 3,
            variants_created: 2,
        }
    );

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert_eq!(task.storage_path.as_deref(), Some("owner-1/music/task-a/track_0.mp3"));
    assert_eq!(task.provider_item_id.as_deref(), Some("item-one"));
    assert!(task.error_message.is_none());

    let variants = h.engine.db.list_variants(id).await.unwrap();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].title, "Summer Jingle (Variant 2)");
    assert_eq!(variants[1].title, "Summer Jingle (Variant 3)");
    assert_eq!(variants[0].params, task.params, "variants clone parent params");
    assert_eq!(variants[0].status, Status::Completed.to_i32());

    // Bytes are durably on disk under the deterministic layout
    let stored = h.engine.vault().read("owner-1/music/task-a/track_1.mp3").await.unwrap();
    assert_eq!(stored, b"bytes-1");
}

#[tokio::test]
async fn second_completion_is_a_no_op() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a0.mp3", b"bytes-0").await;

    let tracks = vec![track(Some(h.media_url("/t/a0.mp3")), "one")];
    let first = h.engine.complete_generation("task-a", &tracks).await.unwrap();
    assert!(matches!(first, CompletionOutcome::Completed { .. }));

    let before = h.engine.db.get_task(id).await.unwrap().unwrap();

    let second = h.engine.complete_generation("task-a", &tracks).await.unwrap();
    assert_eq!(
        second,
        CompletionOutcome::AlreadyTerminal {
            status: Status::Completed
        }
    );

    let after = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(after.artifact_url, before.artifact_url, "primary reference unchanged");
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(h.engine.db.count_variants(id).await.unwrap(), 0);
}

#[tokio::test]
async fn partial_materialization_failure_still_completes() {
    // Scenario A: two descriptors, the second 404s
    let h = harness().await;
    let id = h.seed_task("task-x", JobKind::Music).await;
    h.serve_media("/t/x0.mp3", b"bytes-0").await;
    Mock::given(method("GET"))
        .and(path("/t/x1.mp3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.cdn)
        .await;

    let tracks = vec![
        track(Some(h.media_url("/t/x0.mp3")), "a"),
        track(Some(h.media_url("/t/x1.mp3")), "b"),
    ];

    let outcome = h.engine.complete_generation("task-x", &tracks).await.unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Completed {
            task_id: id,
            attempted: 2,
            succeeded: 1,
            variants_created: 0,
        }
    );

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert_eq!(task.storage_path.as_deref(), Some("owner-1/music/task-x/track_0.mp3"));
    assert_eq!(h.engine.db.count_variants(id).await.unwrap(), 0);
}

#[tokio::test]
async fn missing_source_url_counts_as_item_failure() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a1.mp3", b"bytes-1").await;

    // First descriptor has no URL at all; the second one succeeds and
    // becomes the primary
    let tracks = vec![
        track(None, "no-url"),
        track(Some(h.media_url("/t/a1.mp3")), "ok"),
    ];

    let outcome = h.engine.complete_generation("task-a", &tracks).await.unwrap();
    assert_eq!(
        outcome,
        CompletionOutcome::Completed {
            task_id: id,
            attempted: 2,
            succeeded: 1,
            variants_created: 0,
        }
    );

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    // Item index is preserved even when earlier items are skipped
    assert_eq!(task.storage_path.as_deref(), Some("owner-1/music/task-a/track_1.mp3"));
}

#[tokio::test]
async fn total_materialization_failure_fails_the_task() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    for p in ["/t/a0.mp3", "/t/a1.mp3"] {
        Mock::given(method("GET"))
            .and(path(p))
            .respond_with(ResponseTemplate::new(404))
            .mount(&h.cdn)
            .await;
    }

    let tracks = vec![
        track(Some(h.media_url("/t/a0.mp3")), "a"),
        track(Some(h.media_url("/t/a1.mp3")), "b"),
    ];

    let outcome = h.engine.complete_generation("task-a", &tracks).await.unwrap();
    assert_eq!(outcome, CompletionOutcome::Failed { task_id: id, attempted: 2 });

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Failed.to_i32());
    assert_eq!(task.error_message.as_deref(), Some("artifact retrieval failure"));
    assert!(task.storage_path.is_none(), "no artifact reference on failure");
}

#[tokio::test]
async fn empty_descriptor_list_leaves_task_processing() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;

    let outcome = h.engine.complete_generation("task-a", &[]).await.unwrap();
    assert_eq!(outcome, CompletionOutcome::StillProcessing);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Processing.to_i32());
}

#[tokio::test]
async fn orphan_notification_is_ignored() {
    let h = harness().await;
    let outcome = h
        .engine
        .complete_generation("never-submitted", &[track(None, "x")])
        .await
        .unwrap();
    assert_eq!(outcome, CompletionOutcome::NotFound);
}

#[tokio::test]
async fn concurrent_completions_have_exactly_one_winner() {
    let h = harness().await;
    let id = h.seed_task("task-race", JobKind::Music).await;
    h.serve_media("/t/r0.mp3", b"bytes-0").await;
    h.serve_media("/t/r1.mp3", b"bytes-1").await;

    let tracks = vec![
        track(Some(h.media_url("/t/r0.mp3")), "a"),
        track(Some(h.media_url("/t/r1.mp3")), "b"),
    ];

    // Both channels read "processing", both download, exactly one may
    // write the record and fan out
    let push = h.engine.clone();
    let pull = h.engine.clone();
    let (left, right) = tokio::join!(
        push.complete_generation("task-race", &tracks),
        pull.complete_generation("task-race", &tracks),
    );
    let outcomes = [left.unwrap(), right.unwrap()];

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, CompletionOutcome::Completed { .. }))
        .count();
    assert_eq!(winners, 1, "exactly one channel may complete: {outcomes:?}");

    for loser in outcomes
        .iter()
        .filter(|o| !matches!(o, CompletionOutcome::Completed { .. }))
    {
        assert!(
            matches!(
                loser,
                CompletionOutcome::LostRace
                    | CompletionOutcome::AlreadyTerminal {
                        status: Status::Completed
                    }
            ),
            "loser must be a documented no-op: {loser:?}"
        );
    }

    assert_eq!(
        h.engine.db.count_variants(id).await.unwrap(),
        1,
        "no duplicate variant rows from the losing channel"
    );
}

// ---------------------------------------------------------------------------
// Callback receiver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_callback_reconciles_task() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a0.mp3", b"bytes-0").await;
    h.serve_media("/t/a1.mp3", b"bytes-1").await;

    let mut events = h.engine.subscribe();

    let ack = h
        .engine
        .handle_callback(json!({
            "task_id": "task-a",
            "callbackType": "complete",
            "data": [
                { "id": "i0", "audioUrl": h.media_url("/t/a0.mp3"), "title": "One", "duration": 31.0 },
                { "id": "i1", "audioUrl": h.media_url("/t/a1.mp3"), "title": "Two" }
            ]
        }))
        .await;

    assert_eq!(ack.status, "received");
    assert_eq!(ack.task_id.as_deref(), Some("task-a"));
    assert!(ack.processed);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert_eq!(task.duration_secs, Some(31.0));
    assert_eq!(h.engine.db.count_variants(id).await.unwrap(), 1);

    // Audit row exists and the completion event fired
    let audited = h.engine.db.list_notifications("task-a").await.unwrap();
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].detected_type, "generation");

    let mut saw_completed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::TaskCompleted { .. }) {
            saw_completed = true;
        }
    }
    assert!(saw_completed);
}

#[tokio::test]
async fn error_callback_with_policy_text_rejects_task() {
    // Scenario C
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;

    let ack = h
        .engine
        .handle_callback(json!({
            "task_id": "task-a",
            "callbackType": "error",
            "data": [ { "errorMessage": "Content rejected: forbidden lyrics detected" } ]
        }))
        .await;
    assert!(ack.processed);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Rejected.to_i32());
    assert_eq!(
        task.error_message.as_deref(),
        Some("Content rejected: forbidden lyrics detected")
    );
}

#[tokio::test]
async fn error_callback_with_technical_text_fails_task() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;

    h.engine
        .handle_callback(json!({
            "task_id": "task-a",
            "callbackType": "error",
            "msg": "upstream timeout while rendering"
        }))
        .await;

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Failed.to_i32());
}

#[tokio::test]
async fn intermediate_callbacks_do_not_mutate() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;

    for stage in ["text", "first"] {
        let ack = h
            .engine
            .handle_callback(json!({
                "task_id": "task-a",
                "callbackType": stage,
                "data": []
            }))
            .await;
        assert!(ack.processed);
    }

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Processing.to_i32());
}

#[tokio::test]
async fn unknown_callback_shape_is_audited_and_dropped() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;

    let ack = h
        .engine
        .handle_callback(json!({ "surprise": true, "data": { "nested": [1, 2] } }))
        .await;

    assert_eq!(ack.status, "received", "unknown shapes still acknowledge success");
    assert!(!ack.processed);
    assert!(ack.task_id.is_none());

    assert_eq!(h.engine.db.count_notifications().await.unwrap(), 1);
    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Processing.to_i32());
}

#[tokio::test]
async fn callback_for_unknown_task_still_acknowledges() {
    let h = harness().await;

    let ack = h
        .engine
        .handle_callback(json!({
            "task_id": "never-seen",
            "callbackType": "complete",
            "data": []
        }))
        .await;

    assert_eq!(ack.status, "received");
    assert!(ack.processed, "orphan notifications are a handled no-op");
}

#[tokio::test]
async fn bare_fallback_callback_completes_task() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a0.mp3", b"bytes-0").await;

    let ack = h
        .engine
        .handle_callback(json!({
            "taskId": "task-a",
            "result": [ { "audio_url": h.media_url("/t/a0.mp3") } ]
        }))
        .await;
    assert!(ack.processed);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());

    let audited = h.engine.db.list_notifications("task-a").await.unwrap();
    assert_eq!(audited[0].detected_type, "generation_fallback");
}

#[tokio::test]
async fn derived_asset_callback_completes_video_task() {
    let h = harness().await;
    let id = h.seed_task("task-v", JobKind::MusicVideo).await;
    h.serve_media("/t/v.mp4", b"mp4-bytes").await;

    let ack = h
        .engine
        .handle_callback(json!({
            "code": 200,
            "msg": "success",
            "data": { "task_id": "task-v", "video_url": h.media_url("/t/v.mp4") }
        }))
        .await;
    assert!(ack.processed);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert_eq!(
        task.storage_path.as_deref(),
        Some("owner-1/music-videos/task-v/track_0.mp4")
    );
}

#[tokio::test]
async fn derived_asset_failure_goes_through_classifier() {
    let h = harness().await;
    let id = h.seed_task("task-v", JobKind::MusicVideo).await;

    h.engine
        .handle_callback(json!({
            "code": 500,
            "msg": "render pipeline crashed",
            "data": { "task_id": "task-v", "video_url": null }
        }))
        .await;

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Failed.to_i32());
    assert_eq!(task.error_message.as_deref(), Some("render pipeline crashed"));
}

// ---------------------------------------------------------------------------
// Poll reconciler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_success_with_tracks_completes_task() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a0.mp3", b"bytes-0").await;
    h.provider_status(
        "task-a",
        json!({
            "taskId": "task-a",
            "status": "SUCCESS",
            "response": { "sunoData": [
                { "id": "i0", "audioUrl": h.media_url("/t/a0.mp3"), "title": "One" }
            ]}
        }),
    )
    .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Completed);
    assert_eq!(report.provider_state, "SUCCESS");
    assert_eq!(report.track_count, 1);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());

    // The poll itself lands in the audit log
    let audited = h.engine.db.list_notifications("task-a").await.unwrap();
    assert_eq!(audited.len(), 1);
    assert_eq!(audited[0].detected_type, "poll");
}

#[tokio::test]
async fn poll_success_without_tracks_reports_processing() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.provider_status(
        "task-a",
        json!({ "taskId": "task-a", "status": "SUCCESS", "response": {} }),
    )
    .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Processing);
    assert_eq!(report.track_count, 0);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Processing.to_i32(), "no mutation");
}

#[tokio::test]
async fn poll_still_generating_reports_processing() {
    let h = harness().await;
    h.seed_task("task-a", JobKind::Music).await;
    h.provider_status("task-a", json!({ "taskId": "task-a", "status": "GENERATING" }))
        .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Processing);
    assert_eq!(report.provider_state, "GENERATING");
}

#[tokio::test]
async fn poll_unknown_state_is_left_untouched() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.provider_status("task-a", json!({ "taskId": "task-a", "status": "MIGRATING_SHARDS" }))
        .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Processing);
    assert_eq!(report.provider_state, "MIGRATING_SHARDS");

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Processing.to_i32());
}

#[tokio::test]
async fn poll_provider_failure_persists_verdict() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.provider_status(
        "task-a",
        json!({ "taskId": "task-a", "status": "FAILED", "errorMessage": "render crashed" }),
    )
    .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Failed);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Failed.to_i32());
    assert_eq!(task.error_message.as_deref(), Some("render crashed"));
}

#[tokio::test]
async fn poll_content_block_becomes_rejected() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.provider_status(
        "task-a",
        json!({ "taskId": "task-a", "status": "SENSITIVE_WORD_ERROR" }),
    )
    .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Rejected);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Rejected.to_i32());
    assert!(
        task.error_message.unwrap().contains("rejected"),
        "synthesized message routes through the classifier"
    );
}

#[tokio::test]
async fn poll_failure_without_persist_flag_only_observes() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.provider_status("task-a", json!({ "taskId": "task-a", "status": "FAILED" }))
        .await;

    let report = h
        .engine
        .poll_task(
            "task-a",
            PollOptions {
                persist_failure: false,
                kind: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(report.status, Status::Processing, "reports the stored status");

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Processing.to_i32(), "nothing persisted");
}

#[tokio::test]
async fn poll_after_callback_win_does_not_mutate() {
    // Scenario B: the callback already completed the task; a poll that
    // also sees success must not rewrite anything
    let h = harness().await;
    let id = h.seed_task("task-y", JobKind::Music).await;
    h.serve_media("/t/y0.mp3", b"bytes-0").await;

    h.engine
        .handle_callback(json!({
            "task_id": "task-y",
            "callbackType": "complete",
            "data": [ { "id": "i0", "audioUrl": h.media_url("/t/y0.mp3") } ]
        }))
        .await;

    let before = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(before.status, Status::Completed.to_i32());

    h.provider_status(
        "task-y",
        json!({
            "taskId": "task-y",
            "status": "SUCCESS",
            "response": { "sunoData": [
                { "id": "i0", "audioUrl": h.media_url("/t/y0.mp3") }
            ]}
        }),
    )
    .await;

    let report = h.engine.poll_task("task-y", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Completed, "response reflects completed state");

    let after = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(after.artifact_url, before.artifact_url);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(h.engine.db.count_variants(id).await.unwrap(), 0);
}

#[tokio::test]
async fn poll_unknown_task_is_an_error() {
    let h = harness().await;
    let err = h
        .engine
        .poll_task("missing", PollOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, crate::Error::NotFound(_)));
}

#[tokio::test]
async fn poll_failure_after_terminal_state_reports_without_rewrite() {
    let h = harness().await;
    let id = h.seed_task("task-a", JobKind::Music).await;
    h.serve_media("/t/a0.mp3", b"bytes-0").await;

    // Completed via callback first
    h.engine
        .handle_callback(json!({
            "task_id": "task-a",
            "callbackType": "complete",
            "data": [ { "audioUrl": h.media_url("/t/a0.mp3") } ]
        }))
        .await;

    // Provider later claims the task failed; the record must not move
    h.provider_status("task-a", json!({ "taskId": "task-a", "status": "FAILED" }))
        .await;

    let report = h.engine.poll_task("task-a", PollOptions::default()).await.unwrap();
    assert_eq!(report.status, Status::Completed);

    let task = h.engine.db.get_task(id).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Completed.to_i32());
    assert!(task.error_message.is_none());
}

// ---------------------------------------------------------------------------
// Submission and deferred poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_registers_processing_task() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "msg": "success",
            "data": { "taskId": "task-new" }
        })))
        .mount(&h.provider)
        .await;

    let info = h
        .engine
        .submit(crate::types::SubmitRequest {
            owner_id: "owner-1".to_string(),
            kind: JobKind::Music,
            title: Some("Summer Jingle".to_string()),
            params: json!({ "prompt": "upbeat summer jingle", "customMode": false }),
        })
        .await
        .unwrap();

    assert_eq!(info.provider_task_id, "task-new");
    assert_eq!(info.status, Status::Processing);
    assert!(info.artifact_url.is_none());

    let row = h.engine.db.get_task(info.id).await.unwrap().unwrap();
    assert_eq!(row.params, json!({ "prompt": "upbeat summer jingle", "customMode": false }).to_string());
}

#[tokio::test]
async fn submit_rejects_non_object_params() {
    let h = harness().await;
    let err = h
        .engine
        .submit(crate::types::SubmitRequest {
            owner_id: "owner-1".to_string(),
            kind: JobKind::Music,
            title: None,
            params: json!([1, 2, 3]),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, crate::Error::InvalidRequest(_)));
}

#[tokio::test]
async fn deferred_poll_reconciles_when_callback_never_arrives() {
    let h = harness_with(|config| {
        config.deferred_poll.enabled = true;
        config.deferred_poll.delay = Duration::from_millis(50);
    })
    .await;

    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "msg": "success",
            "data": { "taskId": "task-deferred" }
        })))
        .mount(&h.provider)
        .await;
    h.serve_media("/t/d0.mp3", b"bytes-0").await;
    h.provider_status(
        "task-deferred",
        json!({
            "taskId": "task-deferred",
            "status": "SUCCESS",
            "response": { "sunoData": [
                { "id": "i0", "audioUrl": h.media_url("/t/d0.mp3") }
            ]}
        }),
    )
    .await;

    let info = h
        .engine
        .submit(crate::types::SubmitRequest {
            owner_id: "owner-1".to_string(),
            kind: JobKind::Music,
            title: None,
            params: json!({ "prompt": "lo-fi" }),
        })
        .await
        .unwrap();

    // No callback ever arrives; the one-shot timer is the backstop
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let task = h.engine.db.get_task(info.id).await.unwrap().unwrap();
        if task.status == Status::Completed.to_i32() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "deferred poll never completed the task"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------------
// Recovery sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recovery_sweep_polls_stale_active_tasks() {
    let h = harness().await;
    let stale_id = h.seed_task("task-stale", JobKind::Music).await;
    let done_id = h.seed_task("task-done", JobKind::Music).await;
    h.serve_media("/t/done.mp3", b"bytes").await;
    h.engine
        .complete_generation(
            "task-done",
            &[track(Some(h.media_url("/t/done.mp3")), "done")],
        )
        .await
        .unwrap();

    h.provider_status(
        "task-stale",
        json!({ "taskId": "task-stale", "status": "FAILED", "errorMessage": "expired" }),
    )
    .await;

    let reports = h.engine.recover_stale(Duration::ZERO).await.unwrap();
    assert_eq!(reports.len(), 1, "only the active task is swept");
    assert_eq!(reports[0].provider_task_id, "task-stale");
    assert_eq!(reports[0].status, Status::Failed);

    let stale = h.engine.db.get_task(stale_id).await.unwrap().unwrap();
    assert_eq!(stale.status, Status::Failed.to_i32());
    let done = h.engine.db.get_task(done_id).await.unwrap().unwrap();
    assert_eq!(done.status, Status::Completed.to_i32());
}
