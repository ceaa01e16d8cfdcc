use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::models::job::ComputeJob;

/// A finished record whose submission failed and is awaiting another try.
#[derive(Debug)]
pub struct PendingSubmission {
    pub job: ComputeJob,
    attempts: u32,
    next_attempt_at: Instant,
}

impl PendingSubmission {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Holds finished job records whose result submission failed, and retries
/// them with exponential backoff up to an attempt ceiling.
///
/// This closes the fire-and-forget gap: a completed result is only dropped
/// after `max_attempts` total submission attempts, never on the first
/// transport hiccup. Entries live in memory for the engine's lifetime.
pub struct SubmissionRetryQueue {
    entries: Mutex<VecDeque<PendingSubmission>>,
    max_attempts: u32,
    base_backoff: Duration,
}

impl SubmissionRetryQueue {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_attempts,
            base_backoff,
        }
    }

    /// Queue a record after its first (inline) submission attempt failed.
    pub fn push(&self, job: ComputeJob) {
        let pending = PendingSubmission {
            job,
            attempts: 1,
            next_attempt_at: Instant::now() + self.backoff_for(1),
        };
        self.entries.lock().expect("retry lock poisoned").push_back(pending);
    }

    /// Take every entry whose backoff has elapsed. Entries not yet due stay
    /// queued.
    pub fn take_due(&self) -> Vec<PendingSubmission> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("retry lock poisoned");
        let mut due = Vec::new();
        let mut remaining = VecDeque::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if entry.next_attempt_at <= now {
                due.push(entry);
            } else {
                remaining.push_back(entry);
            }
        }
        *entries = remaining;
        due
    }

    /// Put an entry back after another failed attempt. Returns `false` when
    /// the attempt ceiling is reached and the record is dropped.
    pub fn requeue(&self, mut pending: PendingSubmission) -> bool {
        pending.attempts += 1;
        if pending.attempts >= self.max_attempts {
            tracing::warn!(
                job_id = %pending.job.job_id,
                attempts = pending.attempts,
                "dropping result submission after max attempts"
            );
            return false;
        }
        pending.next_attempt_at = Instant::now() + self.backoff_for(pending.attempts);
        self.entries.lock().expect("retry lock poisoned").push_back(pending);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("retry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn backoff_for(&self, attempts: u32) -> Duration {
        // base * 2^(attempts-1), saturating on the shift
        self.base_backoff * (1u32 << (attempts - 1).min(16))
    }
}
