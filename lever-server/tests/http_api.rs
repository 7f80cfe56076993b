//! Route behavior over in-memory storage

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use lever_core::{
    Coordinator, EpsilonGreedy, MemoryExpiryIndex, MemoryRecordStore, Origin, RecordStore, Result,
    Selection, SelectionId, SelectionStream, Stats, SweepReport,
};
use lever_server::http::SelectArmResponse;
use lever_server::{AppState, ErrorResponse, create_router};
use serde_json::json;

/// Store whose resolves commit, then stall before returning
struct StallingStore {
    inner: MemoryRecordStore,
    stall: Duration,
}

#[async_trait]
impl RecordStore for StallingStore {
    async fn create(&self, selection: &Selection) -> Result<()> {
        self.inner.create(selection).await
    }

    async fn get(&self, id: SelectionId) -> Result<Selection> {
        self.inner.get(id).await
    }

    async fn compare_and_resolve(
        &self,
        id: SelectionId,
        expected_arm: usize,
        reward: f64,
        origin: Origin,
    ) -> Result<Selection> {
        let prior = self
            .inner
            .compare_and_resolve(id, expected_arm, reward, origin)
            .await?;
        tokio::time::sleep(self.stall).await;
        Ok(prior)
    }

    async fn scan_all(&self) -> Result<SelectionStream> {
        self.inner.scan_all().await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }
}

#[tokio::test]
async fn select_then_update_moves_stats() {
    let server = common::test_server(common::coordinator());

    let response = server.get("/select-arm").await;
    response.assert_status_ok();
    let selected: SelectArmResponse = response.json();
    assert_eq!(selected.arm, 0);
    assert_eq!(selected.feature, "red");

    let response = server
        .post("/update-arm")
        .json(&json!({ "arm_id": selected.arm_id.to_string(), "arm": 0, "reward": 1.0 }))
        .await;
    response.assert_status_ok();
    response.assert_json(&json!({ "ok": true }));

    let stats: Stats = server.get("/stats").await.json();
    assert_eq!(stats.counts, vec![1, 0, 0]);
    assert_eq!(stats.rewards, vec![1.0, 0.0, 0.0]);
    assert_eq!(stats.features, vec!["red", "green", "blue"]);
}

#[tokio::test]
async fn second_update_is_bad_request() {
    let server = common::test_server(common::coordinator());
    let selected: SelectArmResponse = server.get("/select-arm").await.json();
    let body = json!({ "arm_id": selected.arm_id.to_string(), "arm": 0, "reward": 0.5 });

    server.post("/update-arm").json(&body).await.assert_status_ok();
    let response = server.post("/update-arm").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.code, "ALREADY_RESOLVED");

    let stats: Stats = server.get("/stats").await.json();
    assert_eq!(stats.counts, vec![1, 0, 0]);
}

#[tokio::test]
async fn update_rejections_map_to_codes() {
    let server = common::test_server(common::coordinator());
    let selected: SelectArmResponse = server.get("/select-arm").await.json();
    let id = selected.arm_id.to_string();

    let cases = [
        (json!({ "arm_id": id, "arm": 1, "reward": 1.0 }), "ARM_MISMATCH"),
        (json!({ "arm_id": id, "arm": 0, "reward": 1.5 }), "OUT_OF_RANGE"),
        (json!({ "arm_id": id, "arm": 3, "reward": 1.0 }), "VALIDATION"),
        (json!({ "arm_id": id, "arm": -1, "reward": 1.0 }), "VALIDATION"),
        (json!({ "arm_id": "not-a-uuid", "arm": 0, "reward": 1.0 }), "VALIDATION"),
        (json!({ "arm": 0 }), "VALIDATION"),
        (
            json!({ "arm_id": "0191d3a4-0000-7000-8000-000000000000", "arm": 0, "reward": 1.0 }),
            "NOT_FOUND",
        ),
    ];

    for (body, code) in cases {
        let response = server.post("/update-arm").json(&body).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let error: ErrorResponse = response.json();
        assert_eq!(error.code, code, "body {body}");
    }

    let stats: Stats = server.get("/stats").await.json();
    assert_eq!(stats.counts, vec![0, 0, 0]);
}

#[tokio::test]
async fn logs_reports_done() {
    let server = common::test_server(common::coordinator());
    server.get("/select-arm").await.assert_status_ok();

    let response = server.get("/logs").await;

    response.assert_status_ok();
    response.assert_json(&json!("done"));
}

#[tokio::test]
async fn manual_sweep_resolves_pending() {
    let coordinator = common::coordinator();
    let server = common::test_server(coordinator.clone());
    server.get("/select-arm").await.assert_status_ok();
    server.get("/select-arm").await.assert_status_ok();

    let report: SweepReport = server.post("/sweep").await.json();

    assert_eq!(report.resolved, 2);
    assert!(!report.skipped);
    assert_eq!(coordinator.stats().counts, vec![2, 0, 0]);
}

#[tokio::test]
async fn health_counts_records_and_pending() {
    let server = common::test_server(common::coordinator());
    let selected: SelectArmResponse = server.get("/select-arm").await.json();
    server.get("/select-arm").await.assert_status_ok();
    server
        .post("/update-arm")
        .json(&json!({ "arm_id": selected.arm_id.to_string(), "arm": 0, "reward": 0.0 }))
        .await
        .assert_status_ok();

    let health: lever_server::http::HealthResponse = server.get("/api/health").await.json();

    assert_eq!(health.records, 2);
    assert_eq!(health.pending, 1);
}

#[tokio::test]
async fn timed_out_update_still_reaches_strategy() {
    let coordinator = Arc::new(
        Coordinator::new(
            Arc::new(EpsilonGreedy::new(3, 0.0).unwrap()),
            Arc::new(StallingStore {
                inner: MemoryRecordStore::new(),
                stall: Duration::from_millis(200),
            }),
            Arc::new(MemoryExpiryIndex::new()),
            common::FEATURES.iter().map(|f| f.to_string()).collect(),
        )
        .unwrap(),
    );
    let state = Arc::new(AppState::new(coordinator.clone(), chrono::Duration::zero()));
    let server = TestServer::new(create_router(state, Duration::from_millis(50))).unwrap();
    let selected: SelectArmResponse = server.get("/select-arm").await.json();

    let response = server
        .post("/update-arm")
        .json(&json!({ "arm_id": selected.arm_id.to_string(), "arm": 0, "reward": 1.0 }))
        .await;
    response.assert_status(StatusCode::REQUEST_TIMEOUT);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(coordinator.stats().counts, vec![1, 0, 0]);
}
