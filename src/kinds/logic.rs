//! Logic — boolean operators, comparators, edge/latch/timing
//! primitives. Output is always 0/1.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    IsTrue,
    IsFalse,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    InRange,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    EdgeRising,
    EdgeFalling,
    Hysteresis,
    Toggle,
    Pulse,
    Flash,
    SetResetLatch,
    Changed,
}

#[derive(Debug, Clone)]
pub struct LogicCfg {
    pub op: LogicOp,
    pub source_a: u16,
    pub source_b: u16,

    /// `Equal`/`NotEqual`/`Less`/... compare `source_a` against this
    /// constant when `source_b` is `ID_NONE`; `InRange` uses
    /// `(compare_value, range_high)`.
    pub compare_value: i32,
    pub range_high: i32,

    /// Hysteresis thresholds; `upper`/`lower` in the source's raw units.
    pub upper: i32,
    pub lower: i32,

    /// Pulse/flash durations in ms.
    pub pulse_ms: u32,
    pub flash_on_ms: u32,
    pub flash_off_ms: u32,

    /// Output only changes state after holding the candidate value this
    /// long.
    pub true_delay_ms: u32,
    pub false_delay_ms: u32,

    // --- state ---
    pub output: bool,
    pub candidate: bool,
    pub candidate_since_ms: u64,
    pub prev_a: i32,
    pub toggle_prev_trigger: bool,
    pub pulse_armed_at_ms: Option<u64>,
    pub flash_phase_since_ms: u64,
    pub flash_on: bool,
    pub latch_state: bool,
}

impl LogicCfg {
    pub fn new(op: LogicOp) -> Self {
        Self {
            op,
            source_a: crate::channel::ID_NONE,
            source_b: crate::channel::ID_NONE,
            compare_value: 0,
            range_high: 0,
            upper: 0,
            lower: 0,
            pulse_ms: 0,
            flash_on_ms: 0,
            flash_off_ms: 0,
            true_delay_ms: 0,
            false_delay_ms: 0,
            output: false,
            candidate: false,
            candidate_since_ms: 0,
            prev_a: 0,
            toggle_prev_trigger: false,
            pulse_armed_at_ms: None,
            flash_phase_since_ms: 0,
            flash_on: false,
            latch_state: false,
        }
    }

    /// `a`/`b` are the current-tick (or previous-tick, per scheduling order)
    /// values of `source_a`/`source_b`. `b_connected` distinguishes "b wired
    /// to a constant" (uses `compare_value`) from "b wired to a channel".
    pub fn eval(&mut self, a: i32, b: i32, b_connected: bool, now_ms: u64, dt_ms: u32) -> i32 {
        let b_eff = if b_connected { b } else { self.compare_value };

        let raw = match self.op {
            LogicOp::IsTrue => a != 0,
            LogicOp::IsFalse => a == 0,
            LogicOp::Equal => a == b_eff,
            LogicOp::NotEqual => a != b_eff,
            LogicOp::Less => a < b_eff,
            LogicOp::Greater => a > b_eff,
            LogicOp::LessEqual => a <= b_eff,
            LogicOp::GreaterEqual => a >= b_eff,
            LogicOp::InRange => a >= self.compare_value && a <= self.range_high,
            LogicOp::And => (a != 0) && (b_eff != 0),
            LogicOp::Or => (a != 0) || (b_eff != 0),
            LogicOp::Xor => (a != 0) ^ (b_eff != 0),
            LogicOp::Nand => !((a != 0) && (b_eff != 0)),
            LogicOp::Nor => !((a != 0) || (b_eff != 0)),
            LogicOp::Changed => a != self.prev_a,
            LogicOp::EdgeRising => a != 0 && self.prev_a == 0,
            LogicOp::EdgeFalling => a == 0 && self.prev_a != 0,
            LogicOp::Hysteresis => {
                if self.output {
                    a > self.lower
                } else {
                    a >= self.upper
                }
            }
            LogicOp::Toggle => {
                let trigger = a != 0;
                let fire = trigger && !self.toggle_prev_trigger;
                self.toggle_prev_trigger = trigger;
                if fire {
                    self.latch_state = !self.latch_state;
                }
                self.latch_state
            }
            LogicOp::Pulse => {
                let trigger = a != 0 && self.prev_a == 0;
                if trigger {
                    self.pulse_armed_at_ms = Some(now_ms);
                }
                match self.pulse_armed_at_ms {
                    Some(start) if now_ms.saturating_sub(start) < self.pulse_ms as u64 => true,
                    Some(_) => {
                        self.pulse_armed_at_ms = None;
                        false
                    }
                    None => false,
                }
            }
            LogicOp::Flash => {
                if a == 0 {
                    self.flash_on = false;
                    self.flash_phase_since_ms = now_ms;
                    false
                } else {
                    let phase_len = if self.flash_on { self.flash_on_ms } else { self.flash_off_ms };
                    if now_ms.saturating_sub(self.flash_phase_since_ms) >= phase_len as u64 {
                        self.flash_on = !self.flash_on;
                        self.flash_phase_since_ms = now_ms;
                    }
                    self.flash_on
                }
            }
            LogicOp::SetResetLatch => {
                // source_a = set, source_b = reset; reset dominates.
                if b_eff != 0 {
                    self.latch_state = false;
                } else if a != 0 {
                    self.latch_state = true;
                }
                self.latch_state
            }
        };

        self.prev_a = a;

        // Toggle/Pulse/Flash/SetResetLatch/Hysteresis already carry their
        // own state machine; true/false delay applies only on top of a
        // plain comparator/boolean result.
        let delayed = self.apply_delay(raw, now_ms, dt_ms);
        self.output = delayed;
        delayed as i32
    }

    fn apply_delay(&mut self, raw: bool, now_ms: u64, _dt_ms: u32) -> bool {
        if self.true_delay_ms == 0 && self.false_delay_ms == 0 {
            return raw;
        }
        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since_ms = now_ms;
        }
        if self.candidate == self.output {
            return self.output;
        }
        let delay = if self.candidate { self.true_delay_ms } else { self.false_delay_ms };
        if now_ms.saturating_sub(self.candidate_since_ms) >= delay as u64 {
            self.candidate
        } else {
            self.output
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hysteresis_sequence_matches_scenario_6() {
        let mut cfg = LogicCfg::new(LogicOp::Hysteresis);
        cfg.upper = 3500;
        cfg.lower = 1500;
        let seq = [1000, 2000, 3000, 4000, 3000, 2000, 1400];
        let expect = [0, 0, 0, 1, 1, 1, 0];
        for (mv, exp) in seq.iter().zip(expect.iter()) {
            let v = cfg.eval(*mv, 0, false, 0, 10);
            assert_eq!(v, *exp, "mv={mv}");
        }
    }

    #[test]
    fn edge_rising_fires_once() {
        let mut cfg = LogicCfg::new(LogicOp::EdgeRising);
        assert_eq!(cfg.eval(0, 0, false, 0, 10), 0);
        assert_eq!(cfg.eval(1, 0, false, 10, 10), 1);
        assert_eq!(cfg.eval(1, 0, false, 20, 10), 0);
    }

    #[test]
    fn set_reset_latch_reset_dominates() {
        let mut cfg = LogicCfg::new(LogicOp::SetResetLatch);
        assert_eq!(cfg.eval(1, 0, true, 0, 10), 1);
        assert_eq!(cfg.eval(1, 1, true, 10, 10), 0);
    }

    #[test]
    fn delay_requires_stable_hold() {
        let mut cfg = LogicCfg::new(LogicOp::IsTrue);
        cfg.true_delay_ms = 50;
        assert_eq!(cfg.eval(1, 0, false, 0, 10), 0);
        assert_eq!(cfg.eval(1, 0, false, 40, 10), 0);
        assert_eq!(cfg.eval(1, 0, false, 60, 10), 1);
    }
}
