//! AnalogInput — linear, calibrated, rotary, and switch-via-analog
//! variants over a sampled millivolt reading.

use heapless::Vec;

use super::clamp_i32;
use crate::kinds::digital_input::Pull;

pub const MAX_CAL_POINTS: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct CalPoint {
    pub mv: u16,
    pub value: i32,
}

#[derive(Debug, Clone)]
pub enum AnalogInputMode {
    Linear {
        min_mv: u16,
        max_mv: u16,
        min_value: i32,
        max_value: i32,
    },
    Calibrated {
        points: Vec<CalPoint, MAX_CAL_POINTS>,
    },
    Rotary {
        positions: u16,
        vref_mv: u16,
        debounce_ms: u32,
    },
    Switch {
        threshold_high_mv: u16,
        threshold_low_mv: u16,
        on_hold_ms: u32,
        off_hold_ms: u32,
    },
}

#[derive(Debug, Clone)]
pub struct AnalogInputCfg {
    pub pin: u8,
    pub pull: Pull,
    pub mode: AnalogInputMode,

    // --- state ---
    pub rotary_candidate: u16,
    pub rotary_candidate_since_ms: u64,
    pub rotary_last: u16,
    pub switch_state: bool,
    pub switch_pending: Option<bool>,
    pub switch_pending_since_ms: u64,
}

impl AnalogInputCfg {
    pub fn new(mode: AnalogInputMode, pin: u8) -> Self {
        Self {
            pin,
            pull: Pull::None,
            mode,
            rotary_candidate: 0,
            rotary_candidate_since_ms: 0,
            rotary_last: 0,
            switch_state: false,
            switch_pending: None,
            switch_pending_since_ms: 0,
        }
    }

    pub fn eval(&mut self, mv: u16, now_ms: u64) -> i32 {
        match &self.mode {
            AnalogInputMode::Linear {
                min_mv,
                max_mv,
                min_value,
                max_value,
            } => {
                let span_mv = (*max_mv as i64 - *min_mv as i64).max(1);
                let raw = *min_value as i64
                    + (mv as i64 - *min_mv as i64) * (*max_value as i64 - *min_value as i64)
                        / span_mv;
                clamp_i32(raw, (*min_value).min(*max_value), (*min_value).max(*max_value))
            }
            AnalogInputMode::Calibrated { points } => Self::interpolate(points, mv),
            AnalogInputMode::Rotary {
                positions,
                vref_mv,
                debounce_ms,
            } => {
                let positions = (*positions).max(1);
                let zone_mv = (*vref_mv as u32 / positions as u32).max(1);
                let raw_pos = ((mv as u32) / zone_mv).min(positions as u32 - 1) as u16;

                if raw_pos != self.rotary_candidate {
                    self.rotary_candidate = raw_pos;
                    self.rotary_candidate_since_ms = now_ms;
                }
                if raw_pos == self.rotary_last {
                    // already settled
                } else if now_ms.saturating_sub(self.rotary_candidate_since_ms)
                    >= *debounce_ms as u64
                {
                    self.rotary_last = raw_pos;
                }
                self.rotary_last as i32
            }
            AnalogInputMode::Switch {
                threshold_high_mv,
                threshold_low_mv,
                on_hold_ms,
                off_hold_ms,
            } => {
                let target = if self.switch_state {
                    mv as i32 >= *threshold_low_mv as i32
                } else {
                    mv as i32 >= *threshold_high_mv as i32
                };

                match self.switch_pending {
                    Some(pending) if pending == target && target != self.switch_state => {
                        let hold = if target { *on_hold_ms } else { *off_hold_ms };
                        if now_ms.saturating_sub(self.switch_pending_since_ms) >= hold as u64 {
                            self.switch_state = target;
                            self.switch_pending = None;
                        }
                    }
                    _ => {
                        if target != self.switch_state {
                            self.switch_pending = Some(target);
                            self.switch_pending_since_ms = now_ms;
                        } else {
                            self.switch_pending = None;
                        }
                    }
                }
                self.switch_state as i32
            }
        }
    }

    /// Piecewise-linear interpolation over calibration points sorted by
    /// voltage. Out-of-range inputs clamp to the nearest endpoint.
    fn interpolate(points: &Vec<CalPoint, MAX_CAL_POINTS>, mv: u16) -> i32 {
        if points.is_empty() {
            return 0;
        }
        if mv <= points[0].mv {
            return points[0].value;
        }
        let last = points.len() - 1;
        if mv >= points[last].mv {
            return points[last].value;
        }
        for w in points.windows(2) {
            let (a, b) = (w[0], w[1]);
            if mv >= a.mv && mv <= b.mv {
                let span = (b.mv as i64 - a.mv as i64).max(1);
                let v = a.value as i64
                    + (mv as i64 - a.mv as i64) * (b.value as i64 - a.value as i64) / span;
                return v as i32;
            }
        }
        points[last].value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_clamps_to_endpoints() {
        let mut cfg = AnalogInputCfg::new(
            AnalogInputMode::Linear {
                min_mv: 500,
                max_mv: 4500,
                min_value: 0,
                max_value: 1000,
            },
            50,
        );
        assert_eq!(cfg.eval(0, 0), 0);
        assert_eq!(cfg.eval(10_000, 0), 1000);
        assert_eq!(cfg.eval(2500, 0), 500);
    }

    #[test]
    fn calibrated_interpolates_between_points() {
        let mut points: Vec<CalPoint, MAX_CAL_POINTS> = Vec::new();
        points.push(CalPoint { mv: 0, value: 0 }).unwrap();
        points.push(CalPoint { mv: 1000, value: 100 }).unwrap();
        let mut cfg = AnalogInputCfg::new(AnalogInputMode::Calibrated { points }, 50);
        assert_eq!(cfg.eval(500, 0), 50);
        assert_eq!(cfg.eval(2000, 0), 100);
    }

    #[test]
    fn hysteresis_switch_sequence() {
        // Mirrors scenario 6 but expressed on the analog-input switch
        // variant rather than the Logic hysteresis op.
        let mut cfg = AnalogInputCfg::new(
            AnalogInputMode::Switch {
                threshold_high_mv: 3500,
                threshold_low_mv: 1500,
                on_hold_ms: 0,
                off_hold_ms: 0,
            },
            50,
        );
        let seq = [1000, 2000, 3000, 4000, 3000, 2000, 1400];
        let expect = [0, 0, 0, 1, 1, 1, 0];
        let mut t = 0u64;
        for (mv, exp) in seq.iter().zip(expect.iter()) {
            let v = cfg.eval(*mv, t);
            assert_eq!(v, *exp, "mv={mv}");
            t += 10;
        }
    }
}
