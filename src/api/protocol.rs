use serde::{Deserialize, Serialize};

use crate::tracker::types::WorkItem;

// Endpoints
pub const ENDPOINT_GET_WORK: &str = "/get_work";
pub const ENDPOINT_SUBMIT_RESULT: &str = "/submit_result";
pub const ENDPOINT_STATUS: &str = "/status";

/// Largest batch a single `get_work` call may request.
pub const MAX_BATCH_SIZE: usize = 1024;

/// Wire rendering of the dispatcher's response states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "retry")]
    Retry,
    #[serde(rename = "all_work_complete")]
    AllWorkComplete,
    #[serde(rename = "error")]
    Error,
}

// Get work (worker-facing API)
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GetWorkParams {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetWorkResponse {
    pub status: ResponseStatus,
    /// Present only when `status` is `OK`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<WorkItem>>,
    /// Seconds to wait before retrying; present only when `status` is `retry`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in: Option<u64>,
}

// Submit results (worker-facing API)
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResultRequest {
    pub items: Vec<ResultRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub row_id: u64,
    /// Opaque result line; must not contain a newline.
    pub result: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResultResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// Observability
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub last_processed_work_id: i64,
    pub next_work_id: u64,
    pub issued: usize,
    pub pending_write: usize,
    pub heap_size: usize,
    pub expired_reissues: u64,
    pub duplicates_discarded: u64,
    pub input_eof: bool,
    pub uptime_seconds: u64,
    pub cpu_usage: f32,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
}
