use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Fixed claim window granted by the queue when a job is enqueued.
pub const JOB_EXPIRY_WINDOW_MS: i64 = 15 * 60 * 1000;

/// The kind of ML task a job asks for.
///
/// The set is closed on the wire; anything the coordinator sends that we do
/// not recognize maps to `Unknown` and fails immediately at dispatch rather
/// than breaking deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobType {
    ImageLabeling,
    TextRecognition,
    ObjectDetection,
    SpeechRecognition,
    #[serde(other)]
    Unknown,
}

/// Lifecycle state of a job.
///
/// On the device, status only ever advances:
/// `pending -> claimed -> processing -> {completed, failed}`. `Expired` is
/// terminal and time-based; the device marks it only when it refuses to
/// execute a claim whose window has already passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Claimed,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Expired)
    }
}

/// Free-form key/value metadata attached to job input and output.
pub type JobMetadata = HashMap<String, serde_json::Value>;

/// One unit of remote work claimed by this device.
///
/// Created off-device by the queue; the device only reads, advances, and
/// submits it. Field names match the coordinator wire format; timestamps are
/// epoch milliseconds. Optional fields are omitted when unset so the record
/// round-trips without inventing zero-length sentinels, and unknown fields
/// from newer coordinators are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeJob {
    #[serde(default)]
    pub job_id: String,

    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: JobType,

    #[serde(default = "default_job_status")]
    pub status: JobStatus,

    #[serde(default)]
    pub created_at: i64,

    #[serde(default)]
    pub expires_at: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,

    /// Opaque encoded payload (typically base64 image/audio, possibly with a
    /// data-URL prefix).
    #[serde(default)]
    pub input_data: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_metadata: Option<JobMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_metadata: Option<JobMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Scheduling hints. Priority and retry arbitration are server-side
    /// concerns; the device round-trips these fields untouched.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub max_retries: i32,

    #[serde(default)]
    pub retry_count: i32,

    // Device-eligibility constraints, enforced by the coordinator when it
    // decides which jobs a device may see.
    #[serde(default)]
    pub min_battery_level: i32,

    #[serde(default)]
    pub min_cpu_performance: f32,

    #[serde(default)]
    pub requires_camera: bool,
}

fn default_job_type() -> JobType {
    JobType::Unknown
}

fn default_job_status() -> JobStatus {
    JobStatus::Pending
}

impl ComputeJob {
    /// Whether the claim window has already passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at > 0 && Utc::now().timestamp_millis() > self.expires_at
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Abbreviated job entry returned by the available-jobs listing. The
/// coordinator may include more fields; only the id and type matter for the
/// claim decision.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: String,
    #[serde(rename = "type", default = "default_job_type")]
    pub job_type: JobType,
}
