//! Switch — multi-position selector driven by up/down pushbutton
//! inputs, with latching, momentary, and press-and-hold behaviors.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchType {
    /// Each press advances to the next position and stays there.
    Latching,
    /// Position reports the held button's target only while pressed.
    Momentary,
    /// Like `Latching`, but a press held past `hold_ms` jumps to the
    /// opposite end instead of advancing one step.
    PressHold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestorePolicy {
    /// Power-up value is the lowest position.
    First,
    /// Power-up value is the last position reached before the previous
    /// config-apply/power cycle (requires persisted state).
    Last,
    /// Power-up value is a fixed configured position.
    Default,
}

#[derive(Debug, Clone)]
pub struct SwitchCfg {
    pub switch_type: SwitchType,
    pub input_up: u16,
    pub input_down: u16,
    pub positions: u8,
    pub restore: RestorePolicy,
    pub default_position: u8,
    pub hold_ms: u32,

    // --- state ---
    pub position: u8,
    pub prev_up: bool,
    pub prev_down: bool,
    pub press_start_ms: Option<u64>,
    pub press_hold_fired: bool,
}

impl SwitchCfg {
    pub fn new(switch_type: SwitchType, positions: u8) -> Self {
        let positions = positions.max(1);
        Self {
            switch_type,
            input_up: crate::channel::ID_NONE,
            input_down: crate::channel::ID_NONE,
            positions,
            restore: RestorePolicy::First,
            default_position: 0,
            hold_ms: 800,
            position: 0,
            prev_up: false,
            prev_down: false,
            press_start_ms: None,
            press_hold_fired: false,
        }
    }

    /// Initializes `position` per `restore` at config-apply time.
    /// `last_saved` is the position persisted from the prior session, if
    /// the registry carries one forward.
    pub fn initialize(&mut self, last_saved: Option<u8>) {
        self.position = match self.restore {
            RestorePolicy::First => 0,
            RestorePolicy::Default => self.default_position.min(self.positions - 1),
            RestorePolicy::Last => last_saved.unwrap_or(0).min(self.positions - 1),
        };
    }

    pub fn eval(&mut self, up: bool, down: bool, now_ms: u64) -> i32 {
        match self.switch_type {
            SwitchType::Momentary => {
                if up {
                    self.position = self.positions - 1;
                } else if down {
                    self.position = 0;
                }
            }
            SwitchType::Latching => {
                if up && !self.prev_up {
                    self.step(1);
                }
                if down && !self.prev_down {
                    self.step(-1);
                }
            }
            SwitchType::PressHold => {
                let pressed = up || down;
                if pressed && !(self.prev_up || self.prev_down) {
                    self.press_start_ms = Some(now_ms);
                    self.press_hold_fired = false;
                }
                if !pressed {
                    if !self.press_hold_fired {
                        if self.prev_up {
                            self.step(1);
                        } else if self.prev_down {
                            self.step(-1);
                        }
                    }
                    self.press_start_ms = None;
                    self.press_hold_fired = false;
                } else if let Some(start) = self.press_start_ms {
                    if !self.press_hold_fired && now_ms.saturating_sub(start) >= self.hold_ms as u64 {
                        self.position = if up { self.positions - 1 } else { 0 };
                        self.press_hold_fired = true;
                    }
                }
            }
        }
        self.prev_up = up;
        self.prev_down = down;
        self.position as i32
    }

    fn step(&mut self, delta: i32) {
        let next = self.position as i32 + delta;
        self.position = next.clamp(0, self.positions as i32 - 1) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latching_advances_one_step_per_press() {
        let mut cfg = SwitchCfg::new(SwitchType::Latching, 3);
        assert_eq!(cfg.eval(true, false, 0), 1);
        assert_eq!(cfg.eval(true, false, 10), 1); // held, no repeat
        assert_eq!(cfg.eval(false, false, 20), 1);
        assert_eq!(cfg.eval(true, false, 30), 2);
        assert_eq!(cfg.eval(true, false, 40), 2); // clamps at top
    }

    #[test]
    fn momentary_reports_only_while_pressed() {
        let mut cfg = SwitchCfg::new(SwitchType::Momentary, 3);
        assert_eq!(cfg.eval(true, false, 0), 2);
        assert_eq!(cfg.eval(false, false, 10), 2);
    }

    #[test]
    fn press_hold_jumps_to_extreme_past_threshold() {
        let mut cfg = SwitchCfg::new(SwitchType::PressHold, 3);
        cfg.hold_ms = 500;
        assert_eq!(cfg.eval(true, false, 0), 0);
        assert_eq!(cfg.eval(true, false, 400), 0);
        assert_eq!(cfg.eval(true, false, 600), 2);
        assert_eq!(cfg.eval(false, false, 700), 2);
    }

    #[test]
    fn press_hold_short_press_steps_once() {
        let mut cfg = SwitchCfg::new(SwitchType::PressHold, 3);
        cfg.hold_ms = 500;
        cfg.eval(true, false, 0);
        assert_eq!(cfg.eval(false, false, 100), 1);
    }
}
