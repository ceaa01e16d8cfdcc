use crate::services::monitor::DeviceProbe;

/// Eligibility thresholds consulted before every claim attempt.
#[derive(Debug, Clone, Copy)]
pub struct GateConfig {
    pub min_battery_percent: u8,
    pub max_concurrent_jobs: usize,
}

/// Why the gate refused a cycle. Skips are silent; the reason only feeds
/// trace logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateSkip {
    NoHeadroom,
    LowBattery,
    PowerRestricted,
}

/// Pure predicate deciding whether the device may claim work this cycle.
///
/// All three conditions must hold: concurrency headroom, battery above the
/// floor, and the platform not restricting background work. A refusal is not
/// an error; the dispatcher simply sits this cycle out.
pub fn check(
    config: GateConfig,
    active_jobs: usize,
    probe: &dyn DeviceProbe,
) -> Result<(), GateSkip> {
    if active_jobs >= config.max_concurrent_jobs {
        return Err(GateSkip::NoHeadroom);
    }
    if probe.battery_percent() < config.min_battery_percent {
        return Err(GateSkip::LowBattery);
    }
    if probe.power_save_mode() || probe.idle_mode() {
        return Err(GateSkip::PowerRestricted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status::ThermalStatus;

    struct FakeProbe {
        battery: u8,
        power_save: bool,
        idle: bool,
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
            0.0
        }
        fn memory_usage_percent(&self) -> f32 {
            0.0
        }
        fn thermal_status(&self) -> ThermalStatus {
            ThermalStatus::Nominal
        }
    }

    const CONFIG: GateConfig = GateConfig {
        min_battery_percent: 30,
        max_concurrent_jobs: 1,
    };

    #[test]
    fn test_all_conditions_met() {
        let probe = FakeProbe { battery: 80, power_save: false, idle: false };
        assert_eq!(check(CONFIG, 0, &probe), Ok(()));
    }

    #[test]
    fn test_low_battery_blocks_even_with_headroom() {
        let probe = FakeProbe { battery: 29, power_save: false, idle: false };
        assert_eq!(check(CONFIG, 0, &probe), Err(GateSkip::LowBattery));
    }

    #[test]
    fn test_battery_at_exact_minimum_passes() {
        let probe = FakeProbe { battery: 30, power_save: false, idle: false };
        assert_eq!(check(CONFIG, 0, &probe), Ok(()));
    }

    #[test]
    fn test_no_headroom_blocks_before_battery_is_read() {
        let probe = FakeProbe { battery: 100, power_save: false, idle: false };
        assert_eq!(check(CONFIG, 1, &probe), Err(GateSkip::NoHeadroom));
    }

    #[test]
    fn test_power_save_mode_blocks() {
        let probe = FakeProbe { battery: 100, power_save: true, idle: false };
        assert_eq!(check(CONFIG, 0, &probe), Err(GateSkip::PowerRestricted));
    }

    #[test]
    fn test_idle_mode_blocks() {
        let probe = FakeProbe { battery: 100, power_save: false, idle: true };
        assert_eq!(check(CONFIG, 0, &probe), Err(GateSkip::PowerRestricted));
    }
}
