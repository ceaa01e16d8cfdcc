use serde::{Deserialize, Serialize};
use strum::Display;

use crate::models::job::{JobStatus, JobType};

/// Coarse thermal state of the device, as reported by the platform probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ThermalStatus {
    Nominal,
    Elevated,
    Critical,
    Unknown,
}

/// Full engine status published once per poll cycle and returned by
/// `Dispatcher::status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub is_running: bool,
    pub active_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub uptime_ms: u64,
    pub cpu_usage_percent: f32,
    pub memory_usage_percent: f32,
    pub thermal_status: ThermalStatus,
}

/// Per-job status transition, published whenever the dispatcher advances a
/// job's lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: String,
    pub job_type: JobType,
    pub job_status: JobStatus,
}

/// Terminal outcome of one job attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobComplete {
    pub job_id: String,
    pub success: bool,
}
