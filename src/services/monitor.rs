use std::sync::Mutex;

use sysinfo::System;

use crate::models::status::ThermalStatus;

/// Read-only view of the device's power and load state.
///
/// The gate and the status publisher both consume this. Mobile hosts plug in
/// a platform-specific implementation; [`SystemProbe`] covers plugged-in
/// hosts where `sysinfo` can see CPU and memory but no battery API exists.
pub trait DeviceProbe: Send + Sync {
    /// Current battery charge, 0-100.
    fn battery_percent(&self) -> u8;

    /// Whether the platform has entered a vendor power-saving mode.
    fn power_save_mode(&self) -> bool;

    /// Whether the platform has deferred background work (doze/idle).
    fn idle_mode(&self) -> bool;

    fn cpu_usage_percent(&self) -> f32;

    fn memory_usage_percent(&self) -> f32;

    fn thermal_status(&self) -> ThermalStatus;
}

/// `sysinfo`-backed probe for hosts on mains power.
///
/// Battery and power-state queries report mains-powered values; CPU and
/// memory come from the OS.
pub struct SystemProbe {
    system: Mutex<System>,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceProbe for SystemProbe {
    fn battery_percent(&self) -> u8 {
        100
    }

    fn power_save_mode(&self) -> bool {
        false
    }

    fn idle_mode(&self) -> bool {
        false
    }

    fn cpu_usage_percent(&self) -> f32 {
        let mut system = self.system.lock().expect("probe mutex poisoned");
        system.refresh_cpu();
        system.global_cpu_info().cpu_usage()
    }

    fn memory_usage_percent(&self) -> f32 {
        let mut system = self.system.lock().expect("probe mutex poisoned");
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return 0.0;
        }
        (system.used_memory() as f32 / total as f32) * 100.0
    }

    fn thermal_status(&self) -> ThermalStatus {
        // No portable thermal API; platform-specific probes override this.
        ThermalStatus::Unknown
    }
}
