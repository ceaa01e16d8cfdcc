use serde::Deserialize;

/// Engine configuration, loaded from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the remote job queue coordinator (e.g., "https://jobs.example.com/api")
    pub api_url: String,

    /// Stable identifier for this device; generated if absent
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Delay between poll cycles
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum battery percentage required to claim work
    #[serde(default = "default_min_battery_percent")]
    pub min_battery_percent: u8,

    /// Maximum jobs executing at once
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Hard wall-clock budget for one handler invocation
    #[serde(default = "default_job_timeout_ms")]
    pub job_timeout_ms: u64,

    /// How many finished jobs to retain for display before eviction
    #[serde(default = "default_completed_cache_size")]
    pub completed_cache_size: usize,

    /// Attempt ceiling for re-submitting a failed result
    #[serde(default = "default_submit_max_attempts")]
    pub submit_max_attempts: u32,

    /// Base delay before the first submission retry; doubles per attempt
    #[serde(default = "default_submit_backoff_ms")]
    pub submit_backoff_ms: u64,
}

fn default_device_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_min_battery_percent() -> u8 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    1
}

fn default_job_timeout_ms() -> u64 {
    60_000
}

fn default_completed_cache_size() -> usize {
    100
}

fn default_submit_max_attempts() -> u32 {
    5
}

fn default_submit_backoff_ms() -> u64 {
    2_000
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Defaults for everything except the endpoint and identity.
    pub fn new(api_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            device_id: device_id.into(),
            poll_interval_ms: default_poll_interval_ms(),
            min_battery_percent: default_min_battery_percent(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_ms: default_job_timeout_ms(),
            completed_cache_size: default_completed_cache_size(),
            submit_max_attempts: default_submit_max_attempts(),
            submit_backoff_ms: default_submit_backoff_ms(),
        }
    }
}
