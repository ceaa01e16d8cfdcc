use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use lru::LruCache;
use tokio::sync::broadcast;

use crate::models::job::ComputeJob;
use crate::models::status::{JobComplete, JobUpdate, StatusSnapshot};
use crate::services::monitor::DeviceProbe;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events the engine publishes to external observers (the UI layer).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Periodic full-status snapshot, one per poll cycle.
    Status(StatusSnapshot),
    /// A job advanced to a new lifecycle state.
    JobUpdate(JobUpdate),
    /// A job reached a terminal outcome.
    JobComplete(JobComplete),
}

/// Holds the engine's observable state: the running flag, the active-job
/// counter, the claimed and completed job sets, and completion totals.
///
/// Mutated from the dispatcher's worker task and read concurrently by the
/// presentation layer, so every field is independently synchronized. The
/// completed set is a bounded LRU cache; old entries are evicted rather than
/// accumulating for the life of the process.
pub struct StateTracker {
    started_at: Instant,
    running: AtomicBool,
    active_jobs: AtomicUsize,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
    claimed: Mutex<HashMap<String, ComputeJob>>,
    completed: Mutex<LruCache<String, ComputeJob>>,
    events: broadcast::Sender<EngineEvent>,
}

impl StateTracker {
    pub fn new(completed_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(completed_cache_size.max(1))
            .expect("cache capacity is at least 1");
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            active_jobs: AtomicUsize::new(0),
            completed_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
            claimed: Mutex::new(HashMap::new()),
            completed: Mutex::new(LruCache::new(capacity)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::SeqCst)
    }

    pub fn increment_active(&self) {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_active(&self) {
        self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    /// Record a freshly claimed job and announce its new status.
    pub fn job_claimed(&self, job: &ComputeJob) {
        self.claimed
            .lock()
            .expect("claimed lock poisoned")
            .insert(job.job_id.clone(), job.clone());
        self.publish_update(job);
    }

    /// Reflect an in-place status change on a claimed job.
    pub fn job_updated(&self, job: &ComputeJob) {
        self.claimed
            .lock()
            .expect("claimed lock poisoned")
            .insert(job.job_id.clone(), job.clone());
        self.publish_update(job);
    }

    /// Move a job from the claimed set to the bounded completed cache, bump
    /// the outcome counters, and announce the terminal state.
    pub fn job_finished(&self, job: ComputeJob, success: bool) {
        self.claimed
            .lock()
            .expect("claimed lock poisoned")
            .remove(&job.job_id);

        if success {
            self.completed_total.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failed_total.fetch_add(1, Ordering::SeqCst);
        }

        self.publish_update(&job);
        let complete = JobComplete {
            job_id: job.job_id.clone(),
            success,
        };

        self.completed
            .lock()
            .expect("completed lock poisoned")
            .put(job.job_id.clone(), job);

        let _ = self.events.send(EngineEvent::JobComplete(complete));
    }

    /// Jobs currently claimed by this device, for UI display.
    pub fn claimed_jobs(&self) -> Vec<ComputeJob> {
        self.claimed
            .lock()
            .expect("claimed lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Most recently finished jobs still retained in the cache.
    pub fn completed_jobs(&self) -> Vec<ComputeJob> {
        self.completed
            .lock()
            .expect("completed lock poisoned")
            .iter()
            .map(|(_, job)| job.clone())
            .collect()
    }

    pub fn snapshot(&self, probe: &dyn DeviceProbe) -> StatusSnapshot {
        StatusSnapshot {
            is_running: self.is_running(),
            active_jobs: self.active_jobs(),
            completed_jobs: self.completed_total.load(Ordering::SeqCst),
            failed_jobs: self.failed_total.load(Ordering::SeqCst),
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
            cpu_usage_percent: probe.cpu_usage_percent(),
            memory_usage_percent: probe.memory_usage_percent(),
            thermal_status: probe.thermal_status(),
        }
    }

    pub fn publish_status(&self, snapshot: StatusSnapshot) {
        let _ = self.events.send(EngineEvent::Status(snapshot));
    }

    fn publish_update(&self, job: &ComputeJob) {
        let _ = self.events.send(EngineEvent::JobUpdate(JobUpdate {
            job_id: job.job_id.clone(),
            job_type: job.job_type,
            job_status: job.status,
        }));
    }
}
