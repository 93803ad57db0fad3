//! Timer — count-up/down accumulators and delay/pulse shaping
//! driven by start/stop/reset input channels.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    CountUp,
    CountDown,
    DelayOn,
    DelayOff,
    Pulse,
}

#[derive(Debug, Clone)]
pub struct TimerCfg {
    pub mode: TimerMode,
    pub start_id: u16,
    pub stop_id: u16,
    pub reset_id: u16,

    /// Target in ms for `CountDown`'s initial value and `DelayOn`/
    /// `DelayOff`/`Pulse`'s hold duration.
    pub target_ms: u32,

    // --- state ---
    pub accumulated_ms: u32,
    pub running: bool,
    pub output: bool,
    pub prev_start: bool,
}

impl TimerCfg {
    pub fn new(mode: TimerMode, target_ms: u32) -> Self {
        Self {
            mode,
            start_id: crate::channel::ID_NONE,
            stop_id: crate::channel::ID_NONE,
            reset_id: crate::channel::ID_NONE,
            target_ms,
            accumulated_ms: 0,
            running: false,
            output: false,
            prev_start: false,
        }
    }

    /// `start`/`stop`/`reset` are this tick's boolean levels of the
    /// corresponding source channels (0 when unconnected).
    pub fn eval(&mut self, start: bool, stop: bool, reset: bool, dt_ms: u32) -> i32 {
        if reset {
            self.accumulated_ms = 0;
            self.running = false;
            self.output = false;
            self.prev_start = start;
            return self.report();
        }

        match self.mode {
            TimerMode::CountUp => {
                if start && !stop {
                    self.accumulated_ms = self.accumulated_ms.saturating_add(dt_ms);
                } else if stop {
                    self.accumulated_ms = 0;
                }
            }
            TimerMode::CountDown => {
                if !self.running && start {
                    self.running = true;
                    self.accumulated_ms = self.target_ms;
                }
                if stop {
                    self.running = false;
                    self.accumulated_ms = 0;
                } else if self.running {
                    self.accumulated_ms = self.accumulated_ms.saturating_sub(dt_ms);
                    if self.accumulated_ms == 0 {
                        self.running = false;
                    }
                }
            }
            TimerMode::DelayOn => {
                if start {
                    self.accumulated_ms = self.accumulated_ms.saturating_add(dt_ms);
                    if self.accumulated_ms >= self.target_ms {
                        self.output = true;
                    }
                } else {
                    self.accumulated_ms = 0;
                    self.output = false;
                }
            }
            TimerMode::DelayOff => {
                if start {
                    self.accumulated_ms = 0;
                    self.output = true;
                } else if self.output {
                    self.accumulated_ms = self.accumulated_ms.saturating_add(dt_ms);
                    if self.accumulated_ms >= self.target_ms {
                        self.output = false;
                    }
                }
            }
            TimerMode::Pulse => {
                let rising = start && !self.prev_start;
                if rising {
                    self.output = true;
                    self.accumulated_ms = 0;
                }
                if self.output {
                    self.accumulated_ms = self.accumulated_ms.saturating_add(dt_ms);
                    if self.accumulated_ms >= self.target_ms {
                        self.output = false;
                    }
                }
            }
        }

        self.prev_start = start;
        self.report()
    }

    fn report(&self) -> i32 {
        match self.mode {
            TimerMode::CountUp | TimerMode::CountDown => self.accumulated_ms as i32,
            TimerMode::DelayOn | TimerMode::DelayOff | TimerMode::Pulse => self.output as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_up_accumulates_while_running() {
        let mut cfg = TimerCfg::new(TimerMode::CountUp, 0);
        assert_eq!(cfg.eval(true, false, false, 10), 10);
        assert_eq!(cfg.eval(true, false, false, 10), 20);
        assert_eq!(cfg.eval(false, true, false, 10), 0);
    }

    #[test]
    fn count_down_reaches_zero_and_stops() {
        let mut cfg = TimerCfg::new(TimerMode::CountDown, 20);
        assert_eq!(cfg.eval(true, false, false, 10), 20);
        assert_eq!(cfg.eval(true, false, false, 10), 10);
        assert_eq!(cfg.eval(true, false, false, 10), 0);
    }

    #[test]
    fn delay_on_requires_sustained_start() {
        let mut cfg = TimerCfg::new(TimerMode::DelayOn, 30);
        assert_eq!(cfg.eval(true, false, false, 10), 0);
        assert_eq!(cfg.eval(true, false, false, 10), 0);
        assert_eq!(cfg.eval(true, false, false, 10), 1);
    }

    #[test]
    fn pulse_fires_fixed_width_on_rising_edge() {
        let mut cfg = TimerCfg::new(TimerMode::Pulse, 20);
        assert_eq!(cfg.eval(false, false, false, 10), 0);
        assert_eq!(cfg.eval(true, false, false, 10), 1);
        assert_eq!(cfg.eval(true, false, false, 10), 1);
        assert_eq!(cfg.eval(true, false, false, 10), 0);
    }

    #[test]
    fn reset_clears_accumulator() {
        let mut cfg = TimerCfg::new(TimerMode::CountUp, 0);
        cfg.eval(true, false, false, 10);
        assert_eq!(cfg.eval(false, false, true, 10), 0);
    }
}
