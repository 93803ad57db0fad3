//! SystemReadOnly — built-in channels the registry maintains
//! itself rather than deriving from user configuration: supply voltage,
//! board temperature, uptime, and per-output/per-input diagnostic
//! sub-channels.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemSignal {
    BatteryVoltageMv,
    BoardTempMdegC,
    UptimeMs,
    OutputCurrentMa { hw_index: u8 },
    OutputDutyPct { hw_index: u8 },
    InputRawMv { hw_index: u8 },
    FaultCount,
    ConfigVersion,
}

#[derive(Debug, Clone, Copy)]
pub struct SystemRoCfg {
    pub signal: SystemSignal,
}

impl SystemRoCfg {
    pub fn new(signal: SystemSignal) -> Self {
        Self { signal }
    }
}

/// Source of truth for built-in values, supplied by the registry/driver
/// layer each tick rather than computed from other channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSnapshot {
    pub battery_mv: i32,
    pub board_temp_mdeg_c: i32,
    pub uptime_ms: u64,
    pub fault_count: u32,
    pub config_version: u32,
}

impl SystemRoCfg {
    pub fn eval(&self, snapshot: &SystemSnapshot, hw_value: Option<i32>) -> i32 {
        match self.signal {
            SystemSignal::BatteryVoltageMv => snapshot.battery_mv,
            SystemSignal::BoardTempMdegC => snapshot.board_temp_mdeg_c,
            SystemSignal::UptimeMs => snapshot.uptime_ms.min(i32::MAX as u64) as i32,
            SystemSignal::FaultCount => snapshot.fault_count as i32,
            SystemSignal::ConfigVersion => snapshot.config_version as i32,
            SystemSignal::OutputCurrentMa { .. }
            | SystemSignal::OutputDutyPct { .. }
            | SystemSignal::InputRawMv { .. } => hw_value.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_snapshot_fields() {
        let cfg = SystemRoCfg::new(SystemSignal::BatteryVoltageMv);
        let snap = SystemSnapshot { battery_mv: 13_800, ..Default::default() };
        assert_eq!(cfg.eval(&snap, None), 13_800);
    }

    #[test]
    fn reports_hw_passthrough() {
        let cfg = SystemRoCfg::new(SystemSignal::OutputCurrentMa { hw_index: 2 });
        let snap = SystemSnapshot::default();
        assert_eq!(cfg.eval(&snap, Some(1500)), 1500);
        assert_eq!(cfg.eval(&snap, None), 0);
    }
}
