//! PowerOutput — PROFET-style high-side switch driver: soft-start,
//! inrush modeling, a single-pole thermal model, and the OC/OT/SC/OL
//! fault detectors with a bounded retry policy.
//!
//! Shares [`crate::kinds::pid`]'s per-tick integrate-and-clamp pattern,
//! and a fault-latch/retry discipline (see [`super::protection`]).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Off,
    On,
    Pwm,
    Oc,
    Ot,
    Sc,
    Ol,
    RetryWait,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputFaultFlags(pub u8);

impl OutputFaultFlags {
    pub const OC: u8 = 0b0000_0001;
    pub const OT: u8 = 0b0000_0010;
    pub const SC: u8 = 0b0000_0100;
    pub const OL: u8 = 0b0000_1000;
    pub const OT_WARN: u8 = 0b0001_0000;

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit;
    }
    pub fn clear(&mut self, bit: u8) {
        self.0 &= !bit;
    }
    pub fn has(&self, bit: u8) -> bool {
        self.0 & bit != 0
    }
    pub fn any_fault(&self) -> bool {
        self.0 & (Self::OC | Self::OT | Self::SC | Self::OL) != 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PowerOutputCfg {
    /// Boolean on/off source channel.
    pub source_id: u16,
    /// Optional PWM duty source (0..=1000 permille); `ID_NONE` means the
    /// driver uses its own `commanded_duty_permille` directly.
    pub duty_source_id: u16,
    pub pwm_enabled: bool,
    pub pwm_frequency_hz: u32,
    pub soft_start_ms: u32,
    pub inrush_current_mult_milli: u32, // k scaled by 1000, default 5000 (k=5)
    pub inrush_time_ms: u32,
    pub current_limit_ma: u32,
    pub open_load_threshold_ma: u32,
    pub retry_count: u8,
    pub retry_delay_ms: u32,
    pub r_load_ohm_milli: u32, // default 12_000 (12 ohms)
    pub r_sense_ohm_milli: u32,
    pub auto_fault_enabled: bool,

    // thermal
    pub r_th_c_per_w: f32,
    pub c_th_j_per_c: f32,
    pub t_amb_c: f32,

    // --- state ---
    pub state: OutputState,
    pub commanded_on: bool,
    pub commanded_duty_permille: u16,
    pub ramp_start_ms: u64,
    pub transition_start_ms: u64,
    pub temperature_c: f32,
    pub current_ma: u32,
    pub duty_permille: u16,
    pub fault_flags: OutputFaultFlags,
    pub faulted_since_ms: u64,
    pub retries_used: u8,
    pub retry_wait_until_ms: u64,
    pub ol_since_ms: Option<u64>,
}

impl PowerOutputCfg {
    pub fn new() -> Self {
        Self {
            source_id: crate::channel::ID_NONE,
            duty_source_id: crate::channel::ID_NONE,
            pwm_enabled: false,
            pwm_frequency_hz: 1000,
            soft_start_ms: 0,
            inrush_current_mult_milli: 5000,
            inrush_time_ms: 50,
            current_limit_ma: 20_000,
            open_load_threshold_ma: 100,
            retry_count: 0,
            retry_delay_ms: 1000,
            r_load_ohm_milli: 12_000,
            r_sense_ohm_milli: 10,
            auto_fault_enabled: true,
            r_th_c_per_w: 10.0,
            c_th_j_per_c: 2.0,
            t_amb_c: 25.0,
            state: OutputState::Off,
            commanded_on: false,
            commanded_duty_permille: 0,
            ramp_start_ms: 0,
            transition_start_ms: 0,
            temperature_c: 25.0,
            current_ma: 0,
            duty_permille: 0,
            fault_flags: OutputFaultFlags::default(),
            faulted_since_ms: 0,
            retries_used: 0,
            retry_wait_until_ms: 0,
            ol_since_ms: None,
        }
    }

    /// `on`/`duty_permille` are this tick's commanded level (0..=1000);
    /// `battery_mv` is the measured supply; `dt_ms` the tick period.
    pub fn tick(&mut self, on: bool, duty_permille: u16, battery_mv: u32, now_ms: u64, dt_ms: u32) {
        match self.state {
            OutputState::Oc | OutputState::Ot | OutputState::Sc | OutputState::Ol => {
                self.handle_fault_retry(on, now_ms);
                self.integrate_thermal(0, dt_ms);
                self.current_ma = 0;
                self.duty_permille = 0;
                return;
            }
            OutputState::RetryWait => {
                if now_ms >= self.retry_wait_until_ms {
                    self.state = OutputState::Off;
                } else {
                    self.integrate_thermal(0, dt_ms);
                    self.current_ma = 0;
                    self.duty_permille = 0;
                    return;
                }
            }
            _ => {}
        }

        let was_off = !self.commanded_on;
        self.commanded_on = on;
        self.commanded_duty_permille = duty_permille.min(1000);

        if !on {
            self.state = OutputState::Off;
            self.duty_permille = 0;
            self.current_ma = 0;
            self.integrate_thermal(0, dt_ms);
            self.ol_since_ms = None;
            return;
        }

        if was_off {
            self.transition_start_ms = now_ms;
            self.ramp_start_ms = now_ms;
        }

        let target_duty = if self.pwm_enabled { self.commanded_duty_permille } else { 1000 };
        let ramped_duty = if self.soft_start_ms > 0 {
            let elapsed = now_ms.saturating_sub(self.ramp_start_ms);
            if (elapsed as u32) >= self.soft_start_ms {
                target_duty
            } else {
                ((target_duty as u64 * elapsed) / self.soft_start_ms as u64) as u16
            }
        } else {
            target_duty
        };
        self.duty_permille = ramped_duty;
        self.state = if self.pwm_enabled { OutputState::Pwm } else { OutputState::On };

        let steady_ma = (battery_mv as u64 * 1000 / self.r_load_ohm_milli.max(1) as u64)
            * ramped_duty as u64
            / 1000;

        let in_inrush = now_ms.saturating_sub(self.transition_start_ms) < self.inrush_time_ms as u64;
        let current_ma = if in_inrush {
            let elapsed = now_ms.saturating_sub(self.transition_start_ms) as u64;
            let t_remaining = self.inrush_time_ms as u64 - elapsed.min(self.inrush_time_ms as u64);
            let k_minus_1 = self.inrush_current_mult_milli as i64 - 1000;
            let mult_milli = 1000 + k_minus_1 * t_remaining as i64 / self.inrush_time_ms.max(1) as i64;
            (steady_ma as i64 * mult_milli / 1000).max(0) as u64
        } else {
            steady_ma
        };

        self.current_ma = current_ma as u32;
        self.integrate_thermal(self.current_ma, dt_ms);

        if self.auto_fault_enabled {
            self.check_faults(battery_mv, now_ms);
        }
    }

    fn integrate_thermal(&mut self, current_ma: u32, dt_ms: u32) {
        let i = current_ma as f32 / 1000.0;
        let power_w = 0.05 * i * i * (self.r_sense_ohm_milli as f32 / 1000.0);
        let dt_s = dt_ms as f32 / 1000.0;
        let d_temp = (power_w - (self.temperature_c - self.t_amb_c) / self.r_th_c_per_w)
            / self.c_th_j_per_c
            * dt_s;
        self.temperature_c = (self.temperature_c + d_temp).clamp(self.t_amb_c, 150.0);
    }

    fn check_faults(&mut self, battery_mv: u32, now_ms: u64) {
        if self.current_ma > self.current_limit_ma {
            self.trip(OutputState::Oc, OutputFaultFlags::OC, now_ms);
            return;
        }
        if self.temperature_c > 140.0 {
            self.trip(OutputState::Ot, OutputFaultFlags::OT, now_ms);
            return;
        } else if self.temperature_c > 125.0 {
            self.fault_flags.set(OutputFaultFlags::OT_WARN);
        }
        let r_equiv_milli = if self.current_ma > 0 {
            battery_mv as u64 * 1000 / self.current_ma as u64
        } else {
            u64::MAX
        };
        if r_equiv_milli < 100 || self.current_ma > 20_000 {
            self.trip(OutputState::Sc, OutputFaultFlags::SC, now_ms);
            return;
        }
        if self.current_ma < self.open_load_threshold_ma {
            let since = *self.ol_since_ms.get_or_insert(now_ms);
            if now_ms.saturating_sub(since) >= 100 {
                self.trip(OutputState::Ol, OutputFaultFlags::OL, now_ms);
                return;
            }
        } else {
            self.ol_since_ms = None;
        }
    }

    fn trip(&mut self, state: OutputState, flag: u8, now_ms: u64) {
        self.state = state;
        self.fault_flags.set(flag);
        self.faulted_since_ms = now_ms;
        self.duty_permille = 0;
        self.current_ma = 0;
    }

    fn handle_fault_retry(&mut self, on: bool, now_ms: u64) {
        if !on {
            self.state = OutputState::Off;
            self.fault_flags = OutputFaultFlags::default();
            self.retries_used = 0;
            return;
        }
        if now_ms.saturating_sub(self.faulted_since_ms) < self.retry_delay_ms as u64 {
            return;
        }
        if self.retries_used >= self.retry_count {
            // latched: stays in fault state until commanded off.
            return;
        }
        self.retries_used += 1;
        self.fault_flags = OutputFaultFlags::default();
        self.state = OutputState::RetryWait;
        self.retry_wait_until_ms = now_ms;
    }
}

impl Default for PowerOutputCfg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_start_ramps_linearly() {
        // Scenario 3: pwm_enabled, pwm_frequency=1000, soft_start_ms=500, on.
        let mut out = PowerOutputCfg::new();
        out.pwm_enabled = true;
        out.soft_start_ms = 500;
        out.auto_fault_enabled = false;
        out.tick(true, 1000, 12_000, 0, 10);
        assert_eq!(out.duty_permille, 0);
        out.tick(true, 1000, 12_000, 250, 10);
        assert!((out.duty_permille as i32 - 500).abs() <= 20, "got {}", out.duty_permille);
        out.tick(true, 1000, 12_000, 500, 10);
        assert_eq!(out.duty_permille, 1000);
    }

    #[test]
    fn overcurrent_trips_and_latches_without_retry() {
        let mut out = PowerOutputCfg::new();
        out.current_limit_ma = 100;
        out.r_load_ohm_milli = 1_000; // 1 ohm -> huge current at 12V
        out.retry_count = 0;
        out.tick(true, 1000, 12_000, 0, 10);
        assert_eq!(out.state, OutputState::Oc);
        out.tick(true, 1000, 12_000, 10, 10);
        assert_eq!(out.state, OutputState::Oc);
    }

    #[test]
    fn retry_reenables_after_delay_then_succeeds() {
        let mut out = PowerOutputCfg::new();
        out.current_limit_ma = 100;
        out.r_load_ohm_milli = 1_000;
        out.retry_count = 1;
        out.retry_delay_ms = 50;
        out.tick(true, 1000, 12_000, 0, 10);
        assert_eq!(out.state, OutputState::Oc);
        out.tick(true, 1000, 12_000, 60, 10);
        assert_eq!(out.state, OutputState::RetryWait);
    }

    #[test]
    fn open_load_detected_after_hold_time() {
        let mut out = PowerOutputCfg::new();
        out.open_load_threshold_ma = 50_000; // force OL on any normal current
        out.tick(true, 1000, 12_000, 0, 10);
        out.tick(true, 1000, 12_000, 50, 10);
        assert_eq!(out.state, OutputState::Ol);
    }

    #[test]
    fn off_clears_output_and_resets_ramp() {
        let mut out = PowerOutputCfg::new();
        out.tick(true, 1000, 12_000, 0, 10);
        out.tick(false, 1000, 12_000, 10, 10);
        assert_eq!(out.state, OutputState::Off);
        assert_eq!(out.duty_permille, 0);
    }
}
