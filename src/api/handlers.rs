//! HTTP Request Handlers
//!
//! Axum route handlers that expose the tracker to workers over HTTP.
//! Handlers never surface tracker internals: workers see `OK`, `retry`,
//! `all_work_complete` or a `400`. Fatal I/O errors flip the process-wide
//! fatal flag and trigger shutdown instead of degrading silently.

use super::protocol::*;
use super::AppState;
use crate::tracker::error::TrackerError;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;
use sysinfo::System;

/// Worker-facing API: hands out a batch of rows.
///
/// Expired issuances are re-issued ahead of fresh rows. When nothing is
/// available but work is still outstanding, the response tells the worker
/// when to come back.
pub async fn handle_get_work(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<GetWorkParams>,
) -> (StatusCode, Json<GetWorkResponse>) {
    let batch_size = params.batch_size.unwrap_or(1).clamp(1, MAX_BATCH_SIZE);

    let mut tracker = state.tracker();
    match tracker.all_work_complete() {
        Ok(true) => {
            return (
                StatusCode::OK,
                Json(GetWorkResponse {
                    status: ResponseStatus::AllWorkComplete,
                    items: None,
                    retry_in: None,
                }),
            );
        }
        Ok(false) => {}
        Err(err) => {
            state.fail_fatal("input poll", tracker.last_processed_work_id(), &err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GetWorkResponse {
                    status: ResponseStatus::Error,
                    items: None,
                    retry_in: None,
                }),
            );
        }
    }

    match tracker.get_work_batch(batch_size) {
        Ok(items) if items.is_empty() => (
            StatusCode::OK,
            Json(GetWorkResponse {
                status: ResponseStatus::Retry,
                items: None,
                retry_in: Some(tracker.retry_hint()),
            }),
        ),
        Ok(items) => {
            tracing::debug!("Issued {} rows", items.len());
            (
                StatusCode::OK,
                Json(GetWorkResponse {
                    status: ResponseStatus::Ok,
                    items: Some(items),
                    retry_in: None,
                }),
            )
        }
        Err(err) => {
            state.fail_fatal("input read", tracker.last_processed_work_id(), &err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GetWorkResponse {
                    status: ResponseStatus::Error,
                    items: None,
                    retry_in: None,
                }),
            )
        }
    }
}

/// Worker-facing API: records a batch of results.
///
/// Results may arrive in any order; only the contiguous prefix is written
/// out. A result containing a newline would break the one-line-per-row
/// output contract, and a row id that was never issued is a protocol
/// error; either rejects the whole batch with `400` and leaves tracker
/// state untouched.
pub async fn handle_submit_result(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SubmitResultRequest>,
) -> (StatusCode, Json<SubmitResultResponse>) {
    if let Some(row) = req.items.iter().find(|row| row.result.contains('\n')) {
        tracing::warn!(
            "Rejecting submission batch: result for row {} contains a newline",
            row.row_id
        );
        return (
            StatusCode::BAD_REQUEST,
            Json(SubmitResultResponse {
                status: ResponseStatus::Error,
                error: Some(format!("result for row {} contains a newline", row.row_id)),
            }),
        );
    }

    let results = req
        .items
        .into_iter()
        .map(|row| (row.row_id, row.result))
        .collect();

    let mut tracker = state.tracker();
    match tracker.complete_work_batch(results) {
        Ok(outcome) => {
            if outcome.discarded > 0 {
                tracing::debug!("Discarded {} duplicate completions", outcome.discarded);
            }
            (
                StatusCode::OK,
                Json(SubmitResultResponse {
                    status: ResponseStatus::Ok,
                    error: None,
                }),
            )
        }
        Err(TrackerError::UnknownWorkId(work_id)) => {
            tracing::warn!("Rejecting submission batch: row {} was never issued", work_id);
            (
                StatusCode::BAD_REQUEST,
                Json(SubmitResultResponse {
                    status: ResponseStatus::Error,
                    error: Some(format!("row {} was never issued", work_id)),
                }),
            )
        }
        Err(err) => {
            let last = tracker.last_processed_work_id();
            state.fail_fatal("result write", last, &err);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SubmitResultResponse {
                    status: ResponseStatus::Error,
                    error: Some("fatal I/O error".to_string()),
                }),
            )
        }
    }
}

/// Observability: tracker counters plus a process CPU/memory snapshot.
pub async fn handle_status(
    Extension(state): Extension<Arc<AppState>>,
) -> (StatusCode, Json<Option<StatusResponse>>) {
    let snapshot = {
        let tracker = state.tracker();
        match tracker.status() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                state.fail_fatal("status poll", tracker.last_processed_work_id(), &err);
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(None));
            }
        }
    };

    let mut sys = System::new_all();
    sys.refresh_cpu();
    sys.refresh_memory();

    (
        StatusCode::OK,
        Json(Some(StatusResponse {
            last_processed_work_id: snapshot.last_processed_work_id,
            next_work_id: snapshot.next_work_id,
            issued: snapshot.issued,
            pending_write: snapshot.pending_write,
            heap_size: snapshot.heap_size,
            expired_reissues: snapshot.expired_reissues,
            duplicates_discarded: snapshot.duplicates_discarded,
            input_eof: snapshot.input_eof,
            uptime_seconds: state.started_at.elapsed().as_secs(),
            cpu_usage: sys.global_cpu_info().cpu_usage(),
            // sysinfo returns bytes for memory values.
            mem_used_mb: sys.used_memory() / (1024 * 1024),
            mem_total_mb: sys.total_memory() / (1024 * 1024),
        })),
    )
}
