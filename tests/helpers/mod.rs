//! Test helpers: an in-process mock coordinator and probe/handler fakes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;

use edge_dispatch::config::EngineConfig;
use edge_dispatch::models::job::{ComputeJob, JobStatus, JobType, JOB_EXPIRY_WINDOW_MS};
use edge_dispatch::models::status::ThermalStatus;
use edge_dispatch::services::monitor::DeviceProbe;
use edge_dispatch::services::registry::{
    HandlerError, HandlerInput, HandlerOutput, JobHandler,
};

pub const TEST_DEVICE_ID: &str = "device-under-test";

/// Shared state of the mock coordinator.
#[derive(Default)]
pub struct MockQueue {
    pending: Mutex<VecDeque<ComputeJob>>,
    submissions: Mutex<Vec<ComputeJob>>,
    list_calls: AtomicUsize,
    claim_calls: AtomicUsize,
    /// Fail this many result submissions with a 500 before accepting.
    fail_submissions: AtomicUsize,
    /// Fail this many listing requests with a 500 before serving.
    fail_lists: AtomicUsize,
    /// When set, every claim is answered with 409.
    always_conflict: AtomicBool,
}

impl MockQueue {
    pub fn enqueue(&self, job: ComputeJob) {
        self.pending.lock().unwrap().push_back(job);
    }

    pub fn submissions(&self) -> Vec<ComputeJob> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn claim_calls(&self) -> usize {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn fail_next_submissions(&self, count: usize) {
        self.fail_submissions.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_lists(&self, count: usize) {
        self.fail_lists.store(count, Ordering::SeqCst);
    }

    pub fn set_always_conflict(&self, conflict: bool) {
        self.always_conflict.store(conflict, Ordering::SeqCst);
    }
}

async fn register_device() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "token": "test-session-token" }))
}

async fn list_available(
    State(queue): State<Arc<MockQueue>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    queue.list_calls.fetch_add(1, Ordering::SeqCst);

    let remaining = queue.fail_lists.load(Ordering::SeqCst);
    if remaining > 0 {
        queue.fail_lists.store(remaining - 1, Ordering::SeqCst);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let jobs: Vec<serde_json::Value> = queue
        .pending
        .lock()
        .unwrap()
        .iter()
        .map(|job| {
            serde_json::json!({
                "jobId": job.job_id,
                "type": serde_json::to_value(job.job_type).unwrap(),
                "priority": job.priority,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

async fn claim_job(
    State(queue): State<Arc<MockQueue>>,
    Path(job_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<ComputeJob>, StatusCode> {
    queue.claim_calls.fetch_add(1, Ordering::SeqCst);

    if queue.always_conflict.load(Ordering::SeqCst) {
        return Err(StatusCode::CONFLICT);
    }

    let mut pending = queue.pending.lock().unwrap();
    let position = pending.iter().position(|job| job.job_id == job_id);
    match position {
        Some(index) => {
            let mut job = pending.remove(index).unwrap();
            job.status = JobStatus::Claimed;
            job.claimed_by = body
                .get("deviceId")
                .and_then(|v| v.as_str())
                .map(String::from);
            job.claimed_at = body.get("claimedAt").and_then(|v| v.as_i64());
            Ok(Json(job))
        }
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn submit_result(
    State(queue): State<Arc<MockQueue>>,
    Path(_job_id): Path<String>,
    Json(job): Json<ComputeJob>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let remaining = queue.fail_submissions.load(Ordering::SeqCst);
    if remaining > 0 {
        queue.fail_submissions.store(remaining - 1, Ordering::SeqCst);
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    queue.submissions.lock().unwrap().push(job);
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Start the mock coordinator on an ephemeral port; returns its base URL and
/// shared state.
pub async fn start_mock_coordinator() -> (String, Arc<MockQueue>) {
    let queue = Arc::new(MockQueue::default());
    let app = Router::new()
        .route("/devices/register", post(register_device))
        .route("/jobs/available", get(list_available))
        .route("/jobs/{job_id}/claim", post(claim_job))
        .route("/jobs/{job_id}/result", post(submit_result))
        .with_state(Arc::clone(&queue));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock coordinator");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock coordinator");
    });

    (format!("http://{addr}"), queue)
}

/// Engine config tuned for fast test cycles.
pub fn test_config(api_url: &str) -> EngineConfig {
    let mut config = EngineConfig::new(api_url, TEST_DEVICE_ID);
    config.poll_interval_ms = 25;
    config.job_timeout_ms = 500;
    config.submit_backoff_ms = 50;
    config.submit_max_attempts = 3;
    config
}

/// A pending job the way the coordinator would enqueue it.
pub fn pending_job(job_id: &str, job_type: JobType) -> ComputeJob {
    let now = Utc::now().timestamp_millis();
    ComputeJob {
        job_id: job_id.to_string(),
        job_type,
        status: JobStatus::Pending,
        created_at: now,
        expires_at: now + JOB_EXPIRY_WINDOW_MS,
        claimed_at: None,
        claimed_by: None,
        completed_at: None,
        input_data: "aGVsbG8gd29ybGQ=".to_string(), // "hello world"
        input_metadata: None,
        output_data: None,
        output_metadata: None,
        error_message: None,
        priority: 0,
        max_retries: 3,
        retry_count: 0,
        min_battery_level: 30,
        min_cpu_performance: 0.5,
        requires_camera: false,
    }
}

/// Poll until `predicate` holds or the deadline passes.
pub async fn wait_for<F>(description: &str, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {description}");
}

/// Probe with fixed readings, for driving the gate from tests.
pub struct FakeProbe {
    pub battery: u8,
    pub power_save: bool,
    pub idle: bool,
}

impl FakeProbe {
    pub fn healthy() -> Self {
        Self {
            battery: 90,
            power_save: false,
            idle: false,
        }
    }
}

impl DeviceProbe for FakeProbe {
    fn battery_percent(&self) -> u8 {
        self.battery
    }
    fn power_save_mode(&self) -> bool {
        self.power_save
    }
    fn idle_mode(&self) -> bool {
        self.idle
    }
    fn cpu_usage_percent(&self) -> f32 {
        25.0
    }
    fn memory_usage_percent(&self) -> f32 {
        50.0
    }
    fn thermal_status(&self) -> ThermalStatus {
        ThermalStatus::Nominal
    }
}

/// Handler returning a fixed image-labeling result, recording invocations.
pub struct LabelHandler {
    pub invocations: AtomicUsize,
}

impl LabelHandler {
    pub fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobHandler for LabelHandler {
    async fn execute(&self, _input: HandlerInput) -> Result<HandlerOutput, HandlerError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutput::json(serde_json::json!({
            "labels": [{ "text": "cat", "confidence": 0.92 }]
        })))
    }
}

/// Handler that always fails with a fixed message.
pub struct FailingHandler {
    pub message: String,
}

#[async_trait]
impl JobHandler for FailingHandler {
    async fn execute(&self, _input: HandlerInput) -> Result<HandlerOutput, HandlerError> {
        Err(HandlerError::failed(self.message.clone()))
    }
}

/// Handler that sleeps past any reasonable test budget.
pub struct HangingHandler {
    pub sleep: Duration,
}

#[async_trait]
impl JobHandler for HangingHandler {
    async fn execute(&self, _input: HandlerInput) -> Result<HandlerOutput, HandlerError> {
        tokio::time::sleep(self.sleep).await;
        Ok(HandlerOutput::json(serde_json::json!({})))
    }
}
