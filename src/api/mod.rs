//! HTTP API Module
//!
//! The thin request/response surface workers talk to. Three endpoints map
//! one-to-one onto tracker operations:
//!
//! - **`GET /get_work?batch_size=k`**: hand out up to `k` rows (expired
//!   reissues first), or tell the worker to retry, or report completion.
//! - **`POST /submit_result`**: record a batch of results; out-of-order
//!   submission is fine, duplicates are discarded.
//! - **`GET /status`**: tracker counters plus process stats.
//!
//! ## Submodules
//! - **`protocol`**: Endpoint constants and the serde request/response types.
//! - **`handlers`**: Axum handlers translating HTTP calls into tracker calls.

pub mod handlers;
pub mod protocol;


use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tokio::sync::Notify;

use self::protocol::{ENDPOINT_GET_WORK, ENDPOINT_STATUS, ENDPOINT_SUBMIT_RESULT};
use crate::tracker::error::TrackerError;
use crate::tracker::tracker::DataTracker;

/// Shared per-process state injected into every handler.
///
/// The tracker sits behind one mutex; the whole consistency model rests on
/// it. Handlers hold the guard only across tracker calls, never across
/// network I/O.
pub struct AppState {
    tracker: Mutex<DataTracker>,
    /// Set when a tracker I/O error makes continuing unsafe.
    pub fatal: AtomicBool,
    /// Woken to begin a graceful shutdown (completion, signal or fatal error).
    pub shutdown: Notify,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(tracker: DataTracker) -> Arc<Self> {
        Arc::new(Self {
            tracker: Mutex::new(tracker),
            fatal: AtomicBool::new(false),
            shutdown: Notify::new(),
            started_at: Instant::now(),
        })
    }

    pub fn tracker(&self) -> MutexGuard<'_, DataTracker> {
        self.tracker.lock().expect("tracker mutex poisoned")
    }

    /// Flags the process as broken and wakes the shutdown path. Output and
    /// checkpoint write failures land here; a restart recovers from the
    /// last good checkpoint.
    pub fn fail_fatal(&self, context: &str, last_processed_work_id: i64, err: &TrackerError) {
        tracing::error!(
            "Fatal {} error at last_processed_work_id={}: {}",
            context,
            last_processed_work_id,
            err
        );
        self.fatal.store(true, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

/// Builds the dispatcher's HTTP router with the shared state attached.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(ENDPOINT_GET_WORK, get(handlers::handle_get_work))
        .route(ENDPOINT_SUBMIT_RESULT, post(handlers::handle_submit_result))
        .route(ENDPOINT_STATUS, get(handlers::handle_status))
        .layer(Extension(state))
}
