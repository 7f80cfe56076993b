//! REST API handlers

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use lever_core::{Error, Origin, SelectionId, Stats, SweepReport};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::AppState;
use crate::error::{ApiError, ErrorResponse};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Stored selections
    pub records: u64,
    /// Selections awaiting an outcome
    pub pending: u64,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let records = state.coordinator.record_store().count().await?;
    let pending = state.coordinator.index().len().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        records,
        pending,
    }))
}

/// A served arm
#[derive(Debug, Serialize, Deserialize)]
pub struct SelectArmResponse {
    pub arm: usize,
    pub arm_id: SelectionId,
    pub created_at: DateTime<Utc>,
    pub feature: String,
}

/// GET /select-arm
pub async fn select_arm(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SelectArmResponse>, ApiError> {
    let selection = state.coordinator.select().await?;

    Ok(Json(SelectArmResponse {
        arm: selection.arm,
        arm_id: selection.id,
        created_at: selection.created_at,
        feature: selection.feature,
    }))
}

/// Outcome reported by a client
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateArmRequest {
    pub arm_id: String,
    pub arm: i64,
    pub reward: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateArmResponse {
    pub ok: bool,
}

/// POST /update-arm
pub async fn update_arm(
    State(state): State<Arc<AppState>>,
    body: Result<Json<UpdateArmRequest>, JsonRejection>,
) -> Result<Json<UpdateArmResponse>, ApiError> {
    let Json(request) = body.map_err(|e| Error::Validation(e.body_text()))?;

    let id: SelectionId = request.arm_id.parse()?;
    let arm_count = state.coordinator.features().len();
    let arm = usize::try_from(request.arm)
        .ok()
        .filter(|arm| *arm < arm_count)
        .ok_or_else(|| {
            Error::Validation(format!(
                "arm {} is outside [0, {arm_count})",
                request.arm
            ))
        })?;

    // A timeout must not cut the store commit from the strategy update.
    let coordinator = state.coordinator.clone();
    let reward = request.reward;
    let resolved = tokio::spawn(async move {
        coordinator.resolve(id, arm, reward, Origin::Update).await
    })
    .await
    .map_err(Error::store)?;
    resolved?;

    Ok(Json(UpdateArmResponse { ok: true }))
}

/// GET /stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<Stats> {
    Json(state.coordinator.stats())
}

/// GET /logs - write every stored selection to the log
///
/// Any failure here is reported as 400, storage errors included.
pub async fn logs(State(state): State<Arc<AppState>>) -> Response {
    match dump_records(&state).await {
        Ok(count) => {
            info!(count, "Dumped selection log");
            Json("done").into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
                code: e.code().into(),
            }),
        )
            .into_response(),
    }
}

async fn dump_records(state: &AppState) -> lever_core::Result<usize> {
    let mut records = state.coordinator.records().await?;
    let mut count = 0;

    while let Some(record) = records.next().await {
        let record = record?;
        let line = serde_json::to_string(&record).map_err(Error::store)?;
        info!(target: "lever::records", record = %line);
        count += 1;
    }
    Ok(count)
}

/// POST /sweep - run one sweep now
pub async fn sweep(State(state): State<Arc<AppState>>) -> Result<Json<SweepReport>, ApiError> {
    let coordinator = state.coordinator.clone();
    let max_age = state.sweep_max_age;
    let report = tokio::spawn(async move { coordinator.sweep(max_age).await })
        .await
        .map_err(Error::store)??;
    Ok(Json(report))
}

/// Fallback for unsupported methods on known routes
pub async fn not_implemented() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}
