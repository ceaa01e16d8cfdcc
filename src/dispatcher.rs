use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use tokio::sync::{broadcast, Notify};
use tokio::time::timeout;

use crate::config::EngineConfig;
use crate::models::job::{ComputeJob, JobMetadata, JobStatus};
use crate::models::status::StatusSnapshot;
use crate::services::gate::{self, GateConfig};
use crate::services::monitor::DeviceProbe;
use crate::services::queue::{QueueError, RemoteQueueClient};
use crate::services::registry::{HandlerInput, HandlerOutput, HandlerRegistry};
use crate::services::retry::SubmissionRetryQueue;
use crate::state::{EngineEvent, StateTracker};

/// Consecutive transport failures double the next poll delay up to this
/// multiple of the configured interval.
const MAX_BACKOFF_MULTIPLIER: u32 = 4;

/// The poll–claim–execute–submit loop.
///
/// One background task runs cycles strictly serially: job N+1 is never
/// fetched before job N's submission finishes, which is also what enforces
/// the concurrency cap. `start`/`stop`/`status`/`subscribe` are the entire
/// control surface the host environment needs; construct one, own it, pass
/// it by reference.
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    config: EngineConfig,
    queue: RemoteQueueClient,
    registry: HandlerRegistry,
    probe: Arc<dyn DeviceProbe>,
    state: StateTracker,
    retry: SubmissionRetryQueue,
    running: AtomicBool,
    /// Bumped on every start. A loop exits when the epoch moves past the one
    /// it was spawned with, so a stop/start restart while a cycle is still in
    /// flight cannot leave two loops polling.
    epoch: AtomicU64,
    wake: Notify,
    transport_failures: AtomicU32,
}

impl Dispatcher {
    pub fn new(
        config: EngineConfig,
        registry: HandlerRegistry,
        probe: Arc<dyn DeviceProbe>,
    ) -> Result<Self, QueueError> {
        let queue = RemoteQueueClient::new(&config.api_url)?;
        let state = StateTracker::new(config.completed_cache_size);
        let retry = SubmissionRetryQueue::new(
            config.submit_max_attempts,
            Duration::from_millis(config.submit_backoff_ms),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                queue,
                registry,
                probe,
                state,
                retry,
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                wake: Notify::new(),
                transport_failures: AtomicU32::new(0),
            }),
        })
    }

    /// Register the device and start the polling loop. A second call while
    /// running is a no-op. Registration failure is tolerated: the engine
    /// proceeds with untokened requests and lets the coordinator decide.
    pub async fn start(&self) {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.inner.state.set_running(true);

        let info = crate::models::device::DeviceInfo::for_host(self.inner.config.device_id.clone());
        match self.inner.queue.register_device(&info).await {
            Ok(_) => tracing::info!(device_id = %info.device_id, "device registered"),
            Err(e) => {
                tracing::warn!(error = %e, "device registration failed, continuing without token")
            }
        }

        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_loop(epoch).await;
        });
    }

    /// Request shutdown. Checked at cycle boundaries; an in-flight job runs
    /// to completion or to its timeout first.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.state.set_running(false);
        self.inner.wake.notify_waiters();
        tracing::info!("dispatcher stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusSnapshot {
        self.inner.state.snapshot(self.inner.probe.as_ref())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.state.subscribe()
    }

    pub fn claimed_jobs(&self) -> Vec<ComputeJob> {
        self.inner.state.claimed_jobs()
    }

    pub fn completed_jobs(&self) -> Vec<ComputeJob> {
        self.inner.state.completed_jobs()
    }

    pub fn device_id(&self) -> &str {
        &self.inner.config.device_id
    }
}

impl Inner {
    async fn run_loop(self: Arc<Self>, epoch: u64) {
        tracing::info!(
            device_id = %self.config.device_id,
            poll_interval_ms = self.config.poll_interval_ms,
            "dispatcher running"
        );

        // Both checks happen only at cycle boundaries: an in-flight job is
        // never preempted, and a restart that re-raised the running flag is
        // detected by the epoch having moved on.
        while self.running.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch {
            self.run_cycle().await;

            let snapshot = self.state.snapshot(self.probe.as_ref());
            self.state.publish_status(snapshot);

            tokio::select! {
                _ = tokio::time::sleep(self.next_delay()) => {}
                _ = self.wake.notified() => {}
            }
        }

        tracing::info!("dispatcher stopped");
    }

    /// One poll–claim–execute–submit pass.
    async fn run_cycle(&self) {
        self.flush_retries().await;

        let gate_config = GateConfig {
            min_battery_percent: self.config.min_battery_percent,
            max_concurrent_jobs: self.config.max_concurrent_jobs,
        };
        if let Err(skip) = gate::check(gate_config, self.state.active_jobs(), self.probe.as_ref())
        {
            tracing::trace!(?skip, "resource gate closed, skipping cycle");
            return;
        }

        let summaries = match self.queue.list_available(&self.config.device_id, 1).await {
            Ok(summaries) => {
                self.transport_failures.store(0, Ordering::SeqCst);
                summaries
            }
            Err(e) => {
                self.note_transport_failure(&e);
                return;
            }
        };

        let Some(summary) = summaries.first() else {
            tracing::trace!("no jobs available");
            return;
        };

        tracing::debug!(
            job_id = %summary.job_id,
            job_type = %summary.job_type,
            "claiming job"
        );
        let claimed_at = Utc::now().timestamp_millis();
        let job = match self
            .queue
            .claim(&summary.job_id, &self.config.device_id, claimed_at)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Another device got there first; same as an empty listing.
                tracing::debug!(job_id = %summary.job_id, "claim conflict, job already taken");
                return;
            }
            Err(e) => {
                self.note_transport_failure(&e);
                return;
            }
        };

        self.execute_claimed(job, claimed_at).await;
    }

    async fn execute_claimed(&self, mut job: ComputeJob, claimed_at: i64) {
        job.status = JobStatus::Claimed;
        job.claimed_by = Some(self.config.device_id.clone());
        job.claimed_at.get_or_insert(claimed_at);

        if job.is_expired() {
            // Claim window already passed; refuse to execute and hand the
            // record straight back.
            tracing::warn!(job_id = %job.job_id, "claimed job already expired, refusing to execute");
            job.status = JobStatus::Expired;
            job.error_message = Some("job expired before execution".to_string());
            self.submit_or_queue(job.clone()).await;
            self.state.job_finished(job, false);
            metrics::counter!("jobs_failed_total").increment(1);
            return;
        }

        self.state.job_claimed(&job);
        self.state.increment_active();

        job.status = JobStatus::Processing;
        self.state.job_updated(&job);
        tracing::info!(
            job_id = %job.job_id,
            job_type = %job.job_type,
            "executing job"
        );

        let started = tokio::time::Instant::now();
        let result = self.run_handler(&job).await;
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                job.status = JobStatus::Completed;
                job.output_data = Some(output.data);
                if !output.metadata.is_empty() {
                    job.output_metadata
                        .get_or_insert_with(JobMetadata::new)
                        .extend(output.metadata);
                }
            }
            Err(message) => {
                tracing::warn!(job_id = %job.job_id, error = %message, "job execution failed");
                job.status = JobStatus::Failed;
                job.error_message = Some(message);
            }
        }

        // Claim and completion can land in the same millisecond on fast
        // handlers; completion must still order after the claim.
        let now = Utc::now().timestamp_millis();
        job.completed_at = Some(now.max(claimed_at + 1));

        let execution_meta = job.output_metadata.get_or_insert_with(JobMetadata::new);
        execution_meta.insert(
            "durationMs".to_string(),
            serde_json::json!(elapsed.as_millis() as u64),
        );
        execution_meta.insert(
            "deviceId".to_string(),
            serde_json::json!(self.config.device_id),
        );

        let success = job.status == JobStatus::Completed;
        tracing::info!(
            job_id = %job.job_id,
            success,
            duration_ms = elapsed.as_millis() as u64,
            "job finished"
        );

        self.submit_or_queue(job.clone()).await;
        self.state.decrement_active();
        self.state.job_finished(job, success);

        if success {
            metrics::counter!("jobs_completed_total").increment(1);
        } else {
            metrics::counter!("jobs_failed_total").increment(1);
        }
    }

    /// Decode the input payload and route it through the registry under the
    /// hard execution timeout. Every failure mode collapses to a message for
    /// the record's `errorMessage`.
    async fn run_handler(&self, job: &ComputeJob) -> Result<HandlerOutput, String> {
        let data = decode_input(&job.input_data)
            .map_err(|e| format!("failed to decode input payload: {e}"))?;

        let input = HandlerInput {
            data,
            metadata: job.input_metadata.clone().unwrap_or_default(),
        };

        let budget = Duration::from_millis(self.config.job_timeout_ms);
        match timeout(budget, self.registry.dispatch(job.job_type, input)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "execution timed out after {}ms",
                self.config.job_timeout_ms
            )),
        }
    }

    /// Submit a finished record; on transport failure the record goes to the
    /// retry queue instead of being lost.
    async fn submit_or_queue(&self, job: ComputeJob) {
        match self.queue.submit_result(&job).await {
            Ok(()) => {
                tracing::debug!(job_id = %job.job_id, "result submitted");
            }
            Err(e) => {
                tracing::warn!(job_id = %job.job_id, error = %e, "result submission failed, queuing for retry");
                self.retry.push(job);
            }
        }
    }

    async fn flush_retries(&self) {
        for entry in self.retry.take_due() {
            metrics::counter!("submission_retries_total").increment(1);
            match self.queue.submit_result(&entry.job).await {
                Ok(()) => {
                    tracing::info!(
                        job_id = %entry.job.job_id,
                        attempts = entry.attempts(),
                        "queued result submitted on retry"
                    );
                }
                Err(e) => {
                    tracing::warn!(job_id = %entry.job.job_id, error = %e, "retry submission failed");
                    self.retry.requeue(entry);
                }
            }
        }
    }

    fn note_transport_failure(&self, error: &QueueError) {
        let failures = self.transport_failures.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(error = %error, consecutive = failures, "queue request failed, ending cycle early");
    }

    fn next_delay(&self) -> Duration {
        poll_delay(
            self.config.poll_interval_ms,
            self.transport_failures.load(Ordering::SeqCst),
        )
    }
}

/// Delay before the next cycle: the configured interval, doubled per
/// consecutive transport failure up to [`MAX_BACKOFF_MULTIPLIER`].
fn poll_delay(base_ms: u64, consecutive_failures: u32) -> Duration {
    let multiplier = 1u64 << consecutive_failures.min(2);
    Duration::from_millis((base_ms * multiplier).min(base_ms * MAX_BACKOFF_MULTIPLIER as u64))
}

/// Base64-decode an input payload, stripping a data-URL prefix when present.
/// An empty payload decodes to empty bytes; whether that is acceptable is the
/// handler's call.
fn decode_input(input_data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if input_data.is_empty() {
        return Ok(Vec::new());
    }
    let encoded = match input_data.split_once(',') {
        Some((_, rest)) => rest,
        None => input_data,
    };
    base64::engine::general_purpose::STANDARD.decode(encoded)
}
