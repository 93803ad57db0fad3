//! HBridge — electrical/mechanical/thermal motor model with
//! Forward/Reverse/Coast/Brake modes, end-stop handling, stall
//! detection, and named presets.
//!
//! Shares [`super::power_output`]'s single-pole thermal integration and
//! fault-latch shape.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    Coast,
    Forward,
    Reverse,
    Brake,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Running,
    Stalled,
    Fault,
}

#[derive(Debug, Clone, Copy)]
pub struct HBridgeCfg {
    /// Source channel selecting `BridgeMode`
    /// (0=Coast, 1=Forward, 2=Reverse, 3=Brake).
    pub mode_source_id: u16,
    /// Source channel for commanded duty (0..=1000 permille).
    pub duty_source_id: u16,
    /// Optional target-position source for closed-loop positioning
    /// presets (`wiper`/`valve`/`window`/`seat`); `ID_NONE` for open-loop
    /// presets like `pump`.
    pub target_source_id: u16,

    // electrical
    pub v_bus_mv: u32,
    pub r_m_ohm_milli: u32,
    pub l_m_h_micro: u32,
    pub k_t_mnm_per_a: f32, // torque constant, N*m/A
    pub k_e_v_per_rad_s: f32,

    // mechanical
    pub j_m_kg_m2: f32,
    pub j_l_kg_m2: f32,
    pub gear_ratio: f32,
    pub b_friction: f32,   // viscous friction coeff
    pub t_coulomb: f32,    // Coulomb friction torque
    pub v_stic_rad_s: f32, // Stribeck threshold

    // end stops, in radians of output-shaft position
    pub theta_min: f32,
    pub theta_max: f32,
    pub k_es: f32, // end-stop spring constant

    // thermal (shared shape with PowerOutput)
    pub r_th_c_per_w: f32,
    pub c_th_j_per_c: f32,
    pub t_amb_c: f32,

    pub stall_ms: u32,

    // --- state ---
    pub mode: BridgeMode,
    pub duty_permille: u16,
    pub omega_rad_s: f32,
    pub theta_rad: f32,
    pub current_a: f32,
    pub temperature_c: f32,
    pub state: BridgeState,
    pub stall_since_ms: Option<u64>,
}

impl HBridgeCfg {
    pub fn new() -> Self {
        Self {
            mode_source_id: crate::channel::ID_NONE,
            duty_source_id: crate::channel::ID_NONE,
            target_source_id: crate::channel::ID_NONE,
            v_bus_mv: 12_000,
            r_m_ohm_milli: 500,
            l_m_h_micro: 500,
            k_t_mnm_per_a: 0.05,
            k_e_v_per_rad_s: 0.05,
            j_m_kg_m2: 0.00005,
            j_l_kg_m2: 0.0005,
            gear_ratio: 50.0,
            b_friction: 0.0005,
            t_coulomb: 0.01,
            v_stic_rad_s: 0.05,
            theta_min: f32::NEG_INFINITY,
            theta_max: f32::INFINITY,
            k_es: 50.0,
            r_th_c_per_w: 8.0,
            c_th_j_per_c: 3.0,
            t_amb_c: 25.0,
            stall_ms: 500,
            mode: BridgeMode::Coast,
            duty_permille: 0,
            omega_rad_s: 0.0,
            theta_rad: 0.0,
            current_a: 0.0,
            temperature_c: 25.0,
            state: BridgeState::Running,
            stall_since_ms: None,
        }
    }

    pub fn preset(name: &str) -> Self {
        let mut cfg = Self::new();
        match name {
            "wiper" => {
                cfg.gear_ratio = 80.0;
                cfg.theta_min = 0.0;
                cfg.theta_max = core::f32::consts::PI;
                cfg.stall_ms = 500;
            }
            "valve" => {
                cfg.gear_ratio = 200.0;
                cfg.theta_min = 0.0;
                cfg.theta_max = core::f32::consts::FRAC_PI_2;
                cfg.stall_ms = 1000;
            }
            "window" => {
                cfg.gear_ratio = 60.0;
                cfg.theta_min = 0.0;
                cfg.theta_max = 6.0;
                cfg.stall_ms = 300;
            }
            "seat" => {
                cfg.gear_ratio = 100.0;
                cfg.theta_min = 0.0;
                cfg.theta_max = 3.0;
                cfg.stall_ms = 500;
            }
            "pump" => {
                cfg.gear_ratio = 20.0;
                cfg.theta_min = f32::NEG_INFINITY;
                cfg.theta_max = f32::INFINITY;
                cfg.stall_ms = 2000;
            }
            _ => {}
        }
        cfg
    }

    /// Integrates one tick of `dt_s` under `mode`/`duty_permille`, with
    /// `tau_load` the external load torque referred to the output shaft
    /// (N·m) and `fault_gate` false when system-wide protection has
    /// disabled outputs.
    pub fn tick(&mut self, mode: BridgeMode, duty_permille: u16, tau_load: f32, fault_gate: bool, now_ms: u64, dt_ms: u32) {
        if self.state == BridgeState::Fault || !fault_gate {
            self.mode = BridgeMode::Coast;
            self.duty_permille = 0;
        } else {
            self.mode = mode;
            self.duty_permille = duty_permille.min(1000);
        }

        let dt_s = (dt_ms as f32 / 1000.0).max(1e-6);
        let duty = self.duty_permille as f32 / 1000.0;

        let v_cmd = match self.mode {
            BridgeMode::Forward => self.v_bus_mv as f32 / 1000.0 * duty,
            BridgeMode::Reverse => -(self.v_bus_mv as f32 / 1000.0) * duty,
            BridgeMode::Coast => 0.0,
            BridgeMode::Brake => 0.0,
        };

        let r_m = (self.r_m_ohm_milli as f32 / 1000.0).max(0.01);
        let motor_omega = self.omega_rad_s * self.gear_ratio;

        self.current_a = if self.mode == BridgeMode::Brake {
            -self.k_e_v_per_rad_s * motor_omega / r_m
        } else {
            (v_cmd - self.k_e_v_per_rad_s * motor_omega) / r_m
        };

        let tau_m = self.k_t_mnm_per_a * self.current_a * self.gear_ratio;

        let stiction_boost = if self.omega_rad_s.abs() < self.v_stic_rad_s { 1.5 } else { 1.0 };
        let tau_f = self.b_friction * self.omega_rad_s
            + self.t_coulomb * stiction_boost * self.omega_rad_s.signum();

        let tau_endstop = if self.theta_rad < self.theta_min {
            -self.k_es * (self.theta_rad - self.theta_min)
        } else if self.theta_rad > self.theta_max {
            -self.k_es * (self.theta_rad - self.theta_max)
        } else {
            0.0
        };

        let j_total = self.j_m_kg_m2 * self.gear_ratio * self.gear_ratio + self.j_l_kg_m2;
        let domega = (tau_m - tau_f - tau_load - tau_endstop) / j_total.max(1e-9) * dt_s;
        self.omega_rad_s += domega;

        self.theta_rad += self.omega_rad_s * dt_s;
        if self.theta_rad <= self.theta_min {
            self.theta_rad = self.theta_min;
            if self.omega_rad_s < 0.0 {
                self.omega_rad_s = 0.0;
            }
        } else if self.theta_rad >= self.theta_max {
            self.theta_rad = self.theta_max;
            if self.omega_rad_s > 0.0 {
                self.omega_rad_s = 0.0;
            }
        }

        let power_w = self.current_a.abs().powi(2) * r_m;
        let d_temp = (power_w - (self.temperature_c - self.t_amb_c) / self.r_th_c_per_w)
            / self.c_th_j_per_c
            * dt_s;
        self.temperature_c = (self.temperature_c + d_temp).clamp(self.t_amb_c, 150.0);

        self.check_stall(now_ms);
    }

    fn check_stall(&mut self, now_ms: u64) {
        let commanded = self.duty_permille > 100 && self.mode != BridgeMode::Coast && self.mode != BridgeMode::Brake;
        if commanded && self.omega_rad_s.abs() < 0.01 {
            let since = *self.stall_since_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= self.stall_ms as u64 {
                self.state = BridgeState::Fault;
            } else {
                self.state = BridgeState::Stalled;
            }
        } else {
            self.stall_since_ms = None;
            if self.state == BridgeState::Stalled {
                self.state = BridgeState::Running;
            }
        }
    }

    pub fn clear_fault(&mut self) {
        self.state = BridgeState::Running;
        self.stall_since_ms = None;
    }
}

impl Default for HBridgeCfg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_spins_up_positive_omega() {
        let mut m = HBridgeCfg::new();
        for t in 0..200 {
            m.tick(BridgeMode::Forward, 1000, 0.0, true, t * 10, 10);
        }
        assert!(m.omega_rad_s > 0.0);
    }

    #[test]
    fn blocked_rotor_stalls_then_faults() {
        let mut m = HBridgeCfg::new();
        m.stall_ms = 100;
        let mut t = 0u64;
        for _ in 0..20 {
            // huge opposing load pins omega near 0
            m.tick(BridgeMode::Forward, 1000, 1_000_000.0, true, t, 10);
            t += 10;
        }
        assert_eq!(m.state, BridgeState::Fault);
    }

    #[test]
    fn end_stop_clamps_position_and_zeroes_velocity() {
        let mut m = HBridgeCfg::new();
        m.theta_min = 0.0;
        m.theta_max = 1.0;
        m.theta_rad = 0.99;
        m.omega_rad_s = 5.0;
        m.tick(BridgeMode::Forward, 1000, 0.0, true, 0, 50);
        assert!(m.theta_rad <= 1.0);
    }

    #[test]
    fn fault_gate_forces_coast() {
        let mut m = HBridgeCfg::new();
        m.tick(BridgeMode::Forward, 1000, 0.0, false, 0, 10);
        assert_eq!(m.mode, BridgeMode::Coast);
        assert_eq!(m.duty_permille, 0);
    }

    #[test]
    fn preset_wiper_sets_endstops() {
        let cfg = HBridgeCfg::preset("wiper");
        assert_eq!(cfg.theta_min, 0.0);
        assert!(cfg.theta_max > 3.0);
    }
}
