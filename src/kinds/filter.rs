//! Filter — smoothing over a single source: moving average, a
//! single-pole low-pass, windowed min/max, and windowed median.

use heapless::Vec;

pub const MAX_WINDOW: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    MovingAverage,
    LowPass,
    MinWindow,
    MaxWindow,
    Median,
}

#[derive(Debug, Clone)]
pub struct FilterCfg {
    pub kind: FilterKind,
    pub source_id: u16,
    pub window: usize,

    /// Low-pass time constant in ms (`alpha = dt / (tau + dt)`).
    pub tau_ms: u32,

    // --- state ---
    pub ring: Vec<i32, MAX_WINDOW>,
    pub ring_pos: usize,
    pub filled: bool,
    pub low_pass_state: i32,
    pub initialized: bool,
}

impl FilterCfg {
    pub fn new(kind: FilterKind, window: usize) -> Self {
        Self {
            kind,
            source_id: crate::channel::ID_NONE,
            window: window.clamp(1, MAX_WINDOW),
            tau_ms: 100,
            ring: Vec::new(),
            ring_pos: 0,
            filled: false,
            low_pass_state: 0,
            initialized: false,
        }
    }

    /// Disabled channels reset all internal state so re-enabling starts
    /// from a clean window rather than a stale average.
    pub fn reset(&mut self) {
        self.ring.clear();
        self.ring_pos = 0;
        self.filled = false;
        self.low_pass_state = 0;
        self.initialized = false;
    }

    pub fn eval(&mut self, input: i32, dt_ms: u32) -> i32 {
        match self.kind {
            FilterKind::LowPass => {
                if !self.initialized {
                    self.low_pass_state = input;
                    self.initialized = true;
                } else {
                    let denom = (self.tau_ms + dt_ms).max(1) as i64;
                    let alpha_num = dt_ms as i64;
                    let delta = input as i64 - self.low_pass_state as i64;
                    self.low_pass_state += ((delta * alpha_num) / denom) as i32;
                }
                self.low_pass_state
            }
            _ => {
                self.push(input);
                match self.kind {
                    FilterKind::MovingAverage => self.average(),
                    FilterKind::MinWindow => self.extreme(true),
                    FilterKind::MaxWindow => self.extreme(false),
                    FilterKind::Median => self.median(),
                    FilterKind::LowPass => unreachable!(),
                }
            }
        }
    }

    fn push(&mut self, value: i32) {
        if self.ring.len() < self.window {
            self.ring.push(value).ok();
        } else {
            self.ring[self.ring_pos] = value;
        }
        self.ring_pos = (self.ring_pos + 1) % self.window;
        if self.ring.len() >= self.window {
            self.filled = true;
        }
    }

    fn average(&self) -> i32 {
        if self.ring.is_empty() {
            return 0;
        }
        let sum: i64 = self.ring.iter().map(|v| *v as i64).sum();
        (sum / self.ring.len() as i64) as i32
    }

    fn extreme(&self, want_min: bool) -> i32 {
        if self.ring.is_empty() {
            return 0;
        }
        if want_min {
            *self.ring.iter().min().unwrap()
        } else {
            *self.ring.iter().max().unwrap()
        }
    }

    fn median(&self) -> i32 {
        if self.ring.is_empty() {
            return 0;
        }
        let mut sorted: Vec<i32, MAX_WINDOW> = self.ring.clone();
        sorted.sort_unstable();
        let n = sorted.len();
        if n % 2 == 1 {
            sorted[n / 2]
        } else {
            ((sorted[n / 2 - 1] as i64 + sorted[n / 2] as i64) / 2) as i32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_over_window() {
        let mut cfg = FilterCfg::new(FilterKind::MovingAverage, 3);
        assert_eq!(cfg.eval(10, 10), 10);
        assert_eq!(cfg.eval(20, 10), 15);
        assert_eq!(cfg.eval(30, 10), 20);
        assert_eq!(cfg.eval(30, 10), 26); // window now [20,30,30]
    }

    #[test]
    fn low_pass_converges_toward_input() {
        let mut cfg = FilterCfg::new(FilterKind::LowPass, 1);
        cfg.tau_ms = 100;
        assert_eq!(cfg.eval(1000, 10), 1000);
        let v1 = cfg.eval(0, 10);
        assert!(v1 < 1000 && v1 > 0);
    }

    #[test]
    fn median_of_odd_window() {
        let mut cfg = FilterCfg::new(FilterKind::Median, 3);
        cfg.eval(5, 10);
        cfg.eval(1, 10);
        assert_eq!(cfg.eval(9, 10), 5);
    }

    #[test]
    fn reset_clears_state() {
        let mut cfg = FilterCfg::new(FilterKind::MovingAverage, 3);
        cfg.eval(100, 10);
        cfg.reset();
        assert_eq!(cfg.eval(10, 10), 10);
    }
}
