// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store tests against a scratch SQLite database.

use super::*;
use cellcc_core::FakeClock;

async fn test_store() -> (tempfile::TempDir, Store<FakeClock>, FakeClock) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("cellcc.db").display()
    );
    crate::init_schema(&url).await.unwrap();
    let clock = FakeClock::new(1_000_000);
    let store = Store::connect_with_clock(&url, 5, clock.clone())
        .await
        .unwrap();
    (dir, store, clock)
}

fn sync_request(volname: &str) -> CreateJob {
    CreateJob {
        src_cell: "src.example".to_string(),
        dst_cell: "dst.example".to_string(),
        volname: volname.to_string(),
        qname: "default".to_string(),
        delete: false,
    }
}

fn pickup_filter() -> JobFilter {
    JobFilter::default()
        .with_src_cell("src.example")
        .with_dst_cells(vec!["dst.example".to_string()])
        .with_qname("default")
}

#[tokio::test]
async fn schema_version_gate_rejects_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("cellcc.db").display()
    );
    crate::init_schema(&url).await.unwrap();
    // Sabotage the version row.
    let pool = sqlx::any::AnyPoolOptions::new().connect(&url).await.unwrap();
    sqlx::query("UPDATE versions SET version = 999")
        .execute(&pool)
        .await
        .unwrap();

    let err = Store::connect(&url, 2).await.unwrap_err();
    assert!(matches!(err, StoreError::SchemaVersion { .. }), "{err}");
}

#[tokio::test]
async fn create_job_starts_in_new() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    assert_eq!(job.state, JobState::New);
    assert_eq!(job.dv, 1);
    assert_eq!(job.errors, 0);
    assert_eq!(job.ctime, 1_000_000);
    assert!(job.status_fqdn.is_some());
}

#[tokio::test]
async fn delete_request_starts_in_delete_new() {
    let (_dir, store, _clock) = test_store().await;
    let mut req = sync_request("u.alice");
    req.delete = true;
    let job = store.create_job(&req).await.unwrap();
    assert_eq!(job.state, JobState::DeleteNew);
}

#[tokio::test]
async fn duplicate_destination_volume_is_rejected() {
    let (_dir, store, _clock) = test_store().await;
    store.create_job(&sync_request("u.alice")).await.unwrap();
    let err = store.create_job(&sync_request("u.alice")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateJob { .. }), "{err}");

    // Same volume to a different destination is fine.
    let mut other = sync_request("u.alice");
    other.dst_cell = "dr.example".to_string();
    store.create_job(&other).await.unwrap();
}

#[tokio::test]
async fn update_bumps_dv_by_exactly_one() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    let mut ctx = job.update_ctx();

    for expect_dv in 2..=5u64 {
        store
            .update_job(
                &mut ctx,
                &JobUpdate::default().description("tick"),
                None,
            )
            .await
            .unwrap();
        assert_eq!(ctx.dv, expect_dv);
        let row = store.find_job(job.jobid).await.unwrap();
        assert_eq!(row.dv, expect_dv);
    }
}

#[tokio::test]
async fn stale_dv_loses_the_race() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();

    // Two workers read the same row.
    let mut first = job.update_ctx();
    let mut second = job.update_ctx();

    store
        .update_job(&mut first, &JobUpdate::default().state(JobState::DumpStart), None)
        .await
        .unwrap();

    let err = store
        .update_job(&mut second, &JobUpdate::default().state(JobState::DumpStart), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::JobConflict { .. }), "{err}");
    // The loser's ctx must not have advanced.
    assert_eq!(second.dv, 1);
}

#[tokio::test]
async fn from_state_guard_refuses_moved_jobs() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    let mut ctx = job.update_ctx();

    let err = store
        .update_job(
            &mut ctx,
            &JobUpdate::default().description("claiming"),
            Some(JobState::DumpStart),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::JobConflict { .. }), "{err}");
}

#[tokio::test]
async fn find_and_advance_claims_and_stamps() {
    let (_dir, store, clock) = test_store().await;
    store.create_job(&sync_request("u.alice")).await.unwrap();
    clock.advance(10);
    store
        .create_job(&{
            let mut r = sync_request("u.bob");
            r.delete = false;
            r
        })
        .await
        .unwrap();

    let jobs = store
        .find_and_advance(
            JobState::New,
            JobState::DumpStart,
            &pickup_filter(),
            Some(120),
            "waiting for dump worker",
        )
        .await
        .unwrap();

    assert_eq!(jobs.len(), 2);
    // Oldest mtime first.
    assert_eq!(jobs[0].volname, "u.alice");
    for job in &jobs {
        assert_eq!(job.state, JobState::DumpStart);
        assert_eq!(job.timeout, Some(120));
        assert_eq!(job.description, "waiting for dump worker");
        assert_eq!(job.dv, 2);
    }
}

#[tokio::test]
async fn find_and_advance_ignores_other_queues() {
    let (_dir, store, _clock) = test_store().await;
    let mut req = sync_request("u.alice");
    req.qname = "bulk".to_string();
    store.create_job(&req).await.unwrap();

    let jobs = store
        .find_and_advance(
            JobState::New,
            JobState::DumpStart,
            &pickup_filter(),
            None,
            "claimed",
        )
        .await
        .unwrap();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn job_error_preserves_prior_state() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    let mut ctx = job.update_ctx();
    store
        .update_job(
            &mut ctx,
            &JobUpdate::default().state(JobState::DumpWork).timeout(60),
            None,
        )
        .await
        .unwrap();

    store.job_error(&mut ctx, "vos dump exited 1").await;

    let row = store.find_job(job.jobid).await.unwrap();
    assert_eq!(row.state, JobState::Error);
    assert_eq!(row.last_good_state, Some(JobState::DumpWork));
    assert_eq!(row.errors, 1);
    assert_eq!(row.timeout, None);
    assert_eq!(row.description, "vos dump exited 1");
}

#[tokio::test]
async fn job_error_with_stale_dv_is_a_noop() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();

    let mut winner = job.update_ctx();
    store
        .update_job(&mut winner, &JobUpdate::default().description("mine"), None)
        .await
        .unwrap();

    let mut stale = job.update_ctx();
    store.job_error(&mut stale, "late failure").await;

    let row = store.find_job(job.jobid).await.unwrap();
    assert_eq!(row.state, JobState::New);
    assert_eq!(row.errors, 0);
}

#[tokio::test]
async fn job_reset_returns_to_retry_state() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    let mut ctx = job.update_ctx();
    store
        .update_job(&mut ctx, &JobUpdate::default().state(JobState::XferWork), None)
        .await
        .unwrap();
    store.job_error(&mut ctx, "checksum mismatch").await;

    let target = store.job_reset(job.jobid).await.unwrap();
    assert_eq!(target, JobState::XferStart);

    let row = store.find_job(job.jobid).await.unwrap();
    assert_eq!(row.state, JobState::XferStart);
    assert_eq!(row.errors, 0);
    assert_eq!(row.last_good_state, None);
}

#[tokio::test]
async fn job_reset_requires_error_state() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    let err = store.job_reset(job.jobid).await.unwrap_err();
    assert!(matches!(err, StoreError::NotInError { .. }), "{err}");
}

#[tokio::test]
async fn archive_copies_then_deletes() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();

    store.archive_job(job.jobid).await.unwrap();

    assert!(matches!(
        store.find_job(job.jobid).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
    // Archived row retains the live id.
    let row = sqlx::query("SELECT id, volname FROM jobshist")
        .fetch_one(&store.pool)
        .await
        .unwrap();
    let id: i64 = row.try_get("id").unwrap();
    assert_eq!(id, job.jobid);

    // Archiving twice is NotFound, not a second copy.
    assert!(matches!(
        store.archive_job(job.jobid).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn kill_job_deletes_outright() {
    let (_dir, store, _clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    store.kill_job(job.jobid).await.unwrap();
    assert!(matches!(
        store.kill_job(job.jobid).await.unwrap_err(),
        StoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn describe_computes_staleness() {
    let (_dir, store, clock) = test_store().await;
    let job = store.create_job(&sync_request("u.alice")).await.unwrap();
    let mut ctx = job.update_ctx();
    store
        .update_job(&mut ctx, &JobUpdate::default().timeout(30), None)
        .await
        .unwrap();

    clock.advance(100);
    let descs = store.describe_jobs(&JobFilter::default()).await.unwrap();
    assert_eq!(descs.len(), 1);
    assert_eq!(descs[0].stale_seconds, 100);
    assert!(descs[0].expired);
}

#[test]
fn dummy_jobs_are_synthetic() {
    let dummies = describe_dummy_jobs(3, 1_000_000);
    assert_eq!(dummies.len(), 3);
    assert_eq!(dummies[0].job.volname, "dummy.vol.0");
    assert_eq!(dummies[0].age_seconds, 60);
}
