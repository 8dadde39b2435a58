//! Integration tests for admission, global FIFO scheduling, and the
//! concurrency cap.

mod common;

use axum::http::StatusCode;
use sqlx::PgPool;

use common::{
    build_test_app, deliver_webhook, get, job_snapshot, queue_status, submit_job, success_payload,
    user_with_credits, Scripted, TestApp,
};
use muse_core::types::DbId;

/// Submit one job per user and return the job ids in submission order.
async fn fill_queue(app: &TestApp, kinds: &[&str]) -> (Vec<DbId>, Vec<String>) {
    let mut job_ids = Vec::new();
    let mut tokens = Vec::new();
    for (i, kind) in kinds.iter().enumerate() {
        let (_, token) = user_with_credits(app, &format!("user{i}@example.com"), 100).await;
        let (status, body) =
            submit_job(app, &token, kind, &format!("session-{i}-0000")).await;
        assert_eq!(status, StatusCode::CREATED, "submit failed: {body}");
        job_ids.push(body["data"]["job_id"].as_i64().unwrap());
        tokens.push(token);
    }
    (job_ids, tokens)
}

// ---------------------------------------------------------------------------
// Cap and positions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn cap_admits_three_then_queues_with_global_positions(pool: PgPool) {
    let app = build_test_app(pool);

    // Five submissions across mixed kinds: the first three run, the last
    // two queue with contiguous global positions.
    let (jobs, tokens) = fill_queue(
        &app,
        &["upscale", "pose_change", "video_gen", "outfit_swap", "upscale"],
    )
    .await;

    let status = queue_status(&app, &tokens[0]).await;
    assert_eq!(status["running"], 3);
    assert_eq!(status["cap"], 3);
    assert_eq!(status["slots_available"], 0);
    assert_eq!(status["total_queued"], 2);

    for i in 0..3 {
        let snap = job_snapshot(&app, &tokens[i], jobs[i]).await;
        assert_eq!(snap["status"], "running", "J{} should be running", i + 1);
    }
    let j4 = job_snapshot(&app, &tokens[3], jobs[3]).await;
    assert_eq!(j4["status"], "queued");
    assert_eq!(j4["position"], 1);

    let j5 = job_snapshot(&app, &tokens[4], jobs[4]).await;
    assert_eq!(j5["status"], "queued");
    assert_eq!(j5["position"], 2);

    // Dispatch order so far is exactly submission order.
    assert_eq!(app.worker.dispatched(), vec![jobs[0], jobs[1], jobs[2]]);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn completion_advances_oldest_queued_across_kinds(pool: PgPool) {
    let app = build_test_app(pool);
    let (jobs, tokens) = fill_queue(
        &app,
        &["upscale", "pose_change", "video_gen", "outfit_swap", "upscale"],
    )
    .await;

    // Complete J2; the freed slot must go to J4 (oldest queued, different
    // kind -- FIFO by submission time, not per-kind fairness).
    let (status, body) = deliver_webhook(&app, jobs[1], success_payload(jobs[1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["applied"], true);

    let j2 = job_snapshot(&app, &tokens[1], jobs[1]).await;
    assert_eq!(j2["status"], "completed");
    assert!(j2["output_url"].as_str().unwrap().contains("outputs"));

    let j4 = job_snapshot(&app, &tokens[3], jobs[3]).await;
    assert_eq!(j4["status"], "running");

    // J5's position recomputes to 1.
    let j5 = job_snapshot(&app, &tokens[4], jobs[4]).await;
    assert_eq!(j5["status"], "queued");
    assert_eq!(j5["position"], 1);

    let status = queue_status(&app, &tokens[0]).await;
    assert_eq!(status["running"], 3);
    assert_eq!(status["total_queued"], 1);

    assert_eq!(
        app.worker.dispatched(),
        vec![jobs[0], jobs[1], jobs[2], jobs[3]]
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn running_never_exceeds_cap_across_many_completions(pool: PgPool) {
    let app = build_test_app(pool);
    let kinds = ["upscale"; 6];
    let (jobs, tokens) = fill_queue(&app, &kinds).await;

    // Drain the queue one completion at a time; the running count must
    // stay pinned at the cap until the queue is empty.
    for i in 0..jobs.len() {
        let status = queue_status(&app, &tokens[0]).await;
        let expected_running = (jobs.len() - i).min(3) as i64;
        assert_eq!(status["running"], expected_running);

        let (code, _) = deliver_webhook(&app, jobs[i], success_payload(jobs[i])).await;
        assert_eq!(code, StatusCode::OK);
    }

    let status = queue_status(&app, &tokens[0]).await;
    assert_eq!(status["running"], 0);
    assert_eq!(status["total_queued"], 0);
}

// ---------------------------------------------------------------------------
// Admission guards
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn second_submission_rejected_while_job_active(pool: PgPool) {
    let app = build_test_app(pool);
    let (user, token) = user_with_credits(&app, "solo@example.com", 100).await;

    let (status, _) = submit_job(&app, &token, "upscale", "session-a-0000").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = submit_job(&app, &token, "pose_change", "session-a-0000").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ACTIVE_JOB_EXISTS");
    assert_eq!(body["details"]["kind"], "upscale");
    assert_eq!(body["details"]["status"], "running");

    // No second row was created.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn insufficient_credits_rejects_without_creating_a_job(pool: PgPool) {
    let app = build_test_app(pool);
    // video_gen costs 20.
    let (user, token) = user_with_credits(&app, "broke@example.com", 5).await;

    let (status, body) = submit_job(&app, &token, "video_gen", "session-b-0000").await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["code"], "INSUFFICIENT_CREDITS");
    assert_eq!(body["details"]["required"], 20);
    assert_eq!(body["details"]["balance"], 5);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    // Balance untouched.
    let response = get(&app, "/api/v1/account", Some(&token)).await;
    let account = common::body_json(response).await;
    assert_eq!(account["data"]["credit_balance"], 5);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn admission_charges_credits_once(pool: PgPool) {
    let app = build_test_app(pool);
    let (user, token) = user_with_credits(&app, "payer@example.com", 100).await;

    let (status, body) = submit_job(&app, &token, "video_gen", "session-c-0000").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["credit_cost"], 20);

    let response = get(&app, "/api/v1/account", Some(&token)).await;
    let account = common::body_json(response).await;
    assert_eq!(account["data"]["credit_balance"], 80);

    // One ledger row, charging exactly the cost.
    let ledger = muse_db::repositories::CreditRepo::history(&app.pool, user.id, 10)
        .await
        .unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].amount, -20);
    assert_eq!(ledger[0].balance_after, 80);
}

// ---------------------------------------------------------------------------
// Dispatch failures
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn dispatch_failure_fails_the_job_and_does_not_requeue(pool: PgPool) {
    let app = build_test_app(pool);
    app.worker.script(Scripted::Transient("upstream out of memory"));

    let (_, token) = user_with_credits(&app, "unlucky@example.com", 100).await;
    let (status, body) = submit_job(&app, &token, "upscale", "session-d-0000").await;
    assert_eq!(status, StatusCode::CREATED);

    let job_id = body["data"]["job_id"].as_i64().unwrap();
    assert_eq!(body["data"]["status"], "failed");

    let snap = job_snapshot(&app, &token, job_id).await;
    assert_eq!(snap["status"], "failed");
    assert_eq!(snap["error_code"], "WORKER_DISPATCH_FAILED");

    // Nothing queued, nothing running: the job did not re-enter the queue.
    let status = queue_status(&app, &token).await;
    assert_eq!(status["running"], 0);
    assert_eq!(status["total_queued"], 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn dispatch_failure_during_advance_moves_to_next_queued(pool: PgPool) {
    let app = build_test_app(pool);
    let (jobs, tokens) = fill_queue(
        &app,
        &["upscale", "upscale", "upscale", "pose_change", "outfit_swap"],
    )
    .await;

    // The next dispatch (J4, claimed when a slot frees) fails; the advance
    // loop must immediately dispatch J5 so the slot does not leak.
    app.worker.script(Scripted::Transient("worker restarting"));

    let (code, _) = deliver_webhook(&app, jobs[0], success_payload(jobs[0])).await;
    assert_eq!(code, StatusCode::OK);

    let j4 = job_snapshot(&app, &tokens[3], jobs[3]).await;
    assert_eq!(j4["status"], "failed");
    assert_eq!(j4["error_code"], "WORKER_DISPATCH_FAILED");

    let j5 = job_snapshot(&app, &tokens[4], jobs[4]).await;
    assert_eq!(j5["status"], "running");

    let status = queue_status(&app, &tokens[0]).await;
    assert_eq!(status["running"], 3);
    assert_eq!(status["total_queued"], 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn worker_rejection_uses_the_non_retryable_code(pool: PgPool) {
    let app = build_test_app(pool);
    app.worker.script(Scripted::Rejected("unsupported image format"));

    let (_, token) = user_with_credits(&app, "rejected@example.com", 100).await;
    let (_, body) = submit_job(&app, &token, "outfit_swap", "session-e-0000").await;
    let job_id = body["data"]["job_id"].as_i64().unwrap();

    let snap = job_snapshot(&app, &token, job_id).await;
    assert_eq!(snap["status"], "failed");
    assert_eq!(snap["error_code"], "WORKER_REJECTED");
}

// ---------------------------------------------------------------------------
// Queue visibility
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn queue_breakdown_groups_by_kind(pool: PgPool) {
    let app = build_test_app(pool);
    let (_jobs, tokens) = fill_queue(
        &app,
        &["upscale", "upscale", "upscale", "pose_change", "pose_change", "video_gen"],
    )
    .await;

    let status = queue_status(&app, &tokens[0]).await;
    assert_eq!(status["total_queued"], 3);

    let by_kind = status["queued_by_kind"].as_array().unwrap();
    let find = |kind: &str| {
        by_kind
            .iter()
            .find(|e| e["kind"] == kind)
            .map(|e| e["queued"].as_i64().unwrap())
    };
    assert_eq!(find("pose_change"), Some(2));
    assert_eq!(find("video_gen"), Some(1));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn admission_check_is_side_effect_free(pool: PgPool) {
    let app = build_test_app(pool);
    let (_, token) = user_with_credits(&app, "checker@example.com", 100).await;

    let response = get(&app, "/api/v1/queue/admission", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["data"]["available"], true);
    assert_eq!(body["data"]["running"], 0);
    assert_eq!(body["data"]["slots_available"], 3);

    // Checking admission dispatched nothing and created nothing.
    assert!(app.worker.dispatched().is_empty());
}
