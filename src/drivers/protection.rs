//! Protection — system-wide fault aggregation over the supply
//! rail and board temperature, gating output enable at the driver layer.
//!
//! An arm/disarm-style gating discipline: a small set of sticky status
//! bits computed fresh each tick from live measurements, consumed by the
//! output drivers before they act.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemFaultFlags(pub u16);

impl SystemFaultFlags {
    pub const UNDERVOLTAGE: u16 = 0b0000_0001;
    pub const OVERVOLTAGE: u16 = 0b0000_0010;
    pub const OVERTEMP_WARNING: u16 = 0b0000_0100;
    pub const OVERTEMP_CRITICAL: u16 = 0b0000_1000;

    pub fn set(&mut self, bit: u16) {
        self.0 |= bit;
    }
    pub fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProtectionCfg {
    pub enable_auto_faults: bool,
    pub undervoltage_mv: u32,
    pub overvoltage_mv: u32,
    pub overtemp_warning_c: f32,
    pub overtemp_critical_c: f32,
}

impl Default for ProtectionCfg {
    fn default() -> Self {
        Self {
            enable_auto_faults: true,
            undervoltage_mv: 6000,
            overvoltage_mv: 22_000,
            overtemp_warning_c: 100.0,
            overtemp_critical_c: 125.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProtectionSnapshot {
    pub battery_voltage_mv: u32,
    pub board_temp_c: f32,
    pub mcu_temp_c: f32,
    pub total_current_ma: u32,
    pub fault_flags: SystemFaultFlags,
    pub system_status: Option<SystemStatus>,
}

impl ProtectionCfg {
    /// Recomputes the aggregate snapshot from this tick's measurements.
    /// `total_current_ma` is the sum of all enabled PowerOutput/HBridge
    /// channel currents, supplied by the registry.
    pub fn evaluate(&self, battery_voltage_mv: u32, board_temp_c: f32, mcu_temp_c: f32, total_current_ma: u32) -> ProtectionSnapshot {
        let mut flags = SystemFaultFlags::default();
        if self.enable_auto_faults {
            if battery_voltage_mv < self.undervoltage_mv {
                flags.set(SystemFaultFlags::UNDERVOLTAGE);
            }
            if battery_voltage_mv > self.overvoltage_mv {
                flags.set(SystemFaultFlags::OVERVOLTAGE);
            }
            if board_temp_c > self.overtemp_critical_c {
                flags.set(SystemFaultFlags::OVERTEMP_CRITICAL);
            } else if board_temp_c > self.overtemp_warning_c {
                flags.set(SystemFaultFlags::OVERTEMP_WARNING);
            }
        }

        let status = if flags.has(SystemFaultFlags::OVERTEMP_CRITICAL)
            || flags.has(SystemFaultFlags::UNDERVOLTAGE)
            || flags.has(SystemFaultFlags::OVERVOLTAGE)
        {
            SystemStatus::Critical
        } else if flags.0 != 0 {
            SystemStatus::Warning
        } else {
            SystemStatus::Normal
        };

        ProtectionSnapshot {
            battery_voltage_mv,
            board_temp_c,
            mcu_temp_c,
            total_current_ma,
            fault_flags: flags,
            system_status: Some(status),
        }
    }

    /// Output drivers consult this before acting on a commanded level;
    /// a `Critical` system status disables every output regardless of
    /// its own per-channel fault state.
    pub fn outputs_enabled(snapshot: &ProtectionSnapshot) -> bool {
        snapshot.system_status != Some(SystemStatus::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undervoltage_trips_critical_and_gates_outputs() {
        let cfg = ProtectionCfg::default();
        let snap = cfg.evaluate(5000, 25.0, 25.0, 0);
        assert!(snap.fault_flags.has(SystemFaultFlags::UNDERVOLTAGE));
        assert_eq!(snap.system_status, Some(SystemStatus::Critical));
        assert!(!ProtectionCfg::outputs_enabled(&snap));
    }

    #[test]
    fn overtemp_warning_does_not_gate_outputs() {
        let cfg = ProtectionCfg::default();
        let snap = cfg.evaluate(13_000, 110.0, 30.0, 0);
        assert!(snap.fault_flags.has(SystemFaultFlags::OVERTEMP_WARNING));
        assert_eq!(snap.system_status, Some(SystemStatus::Warning));
        assert!(ProtectionCfg::outputs_enabled(&snap));
    }

    #[test]
    fn normal_conditions_report_normal() {
        let cfg = ProtectionCfg::default();
        let snap = cfg.evaluate(13_000, 40.0, 30.0, 500);
        assert_eq!(snap.system_status, Some(SystemStatus::Normal));
        assert!(ProtectionCfg::outputs_enabled(&snap));
    }
}
