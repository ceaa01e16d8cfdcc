use serde::{Deserialize, Serialize};

/// Device identity sent to the coordinator at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub platform: String,
    pub os_version: String,
    pub device_model: String,
    pub cpu_cores: usize,
}

impl DeviceInfo {
    /// Describe the host this process runs on, filling in what the OS
    /// exposes and leaving the rest generic.
    pub fn for_host(device_id: String) -> Self {
        Self {
            device_id,
            platform: std::env::consts::OS.to_string(),
            os_version: sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string()),
            device_model: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}
