//! Number — arithmetic over up to two sources plus a constant,
//! with a fixed lookup table for the `Lookup3` op.

use heapless::Vec;

use super::clamp_i32;

pub const MAX_LOOKUP_POINTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberOp {
    Constant,
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
    Average,
    Abs,
    Scale,
    Clamp,
    Conditional,
    Lookup3,
}

#[derive(Debug, Clone, Copy)]
pub struct LookupPoint {
    pub input: i32,
    pub output: i32,
}

#[derive(Debug, Clone)]
pub struct NumberCfg {
    pub op: NumberOp,
    pub source_a: u16,
    pub source_b: u16,
    pub cond_source: u16,
    pub constant: i32,

    /// `Scale`: `out = a * scale_mult / scale_div`. `Clamp`: `(lo, hi)`.
    pub scale_mult: i32,
    pub scale_div: i32,
    pub clamp_lo: i32,
    pub clamp_hi: i32,

    pub lookup: Vec<LookupPoint, MAX_LOOKUP_POINTS>,

    // --- state ---
    pub fault: bool,
}

impl NumberCfg {
    pub fn new(op: NumberOp) -> Self {
        Self {
            op,
            source_a: crate::channel::ID_NONE,
            source_b: crate::channel::ID_NONE,
            cond_source: crate::channel::ID_NONE,
            constant: 0,
            scale_mult: 1,
            scale_div: 1,
            clamp_lo: i32::MIN,
            clamp_hi: i32::MAX,
            lookup: Vec::new(),
            fault: false,
        }
    }

    /// `a`/`b`/`cond` are the current values of `source_a`/`source_b`/
    /// `cond_source`. Division by zero saturates to `i32::MAX`/`i32::MIN`
    /// (sign of the dividend) and raises `self.fault` (
    /// "Divide-by-zero").
    pub fn eval(&mut self, a: i32, b: i32, cond: i32) -> i32 {
        self.fault = false;
        match self.op {
            NumberOp::Constant => self.constant,
            NumberOp::Add => a.saturating_add(b),
            NumberOp::Subtract => a.saturating_sub(b),
            NumberOp::Multiply => ((a as i64).saturating_mul(b as i64))
                .clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            NumberOp::Divide => {
                if b == 0 {
                    self.fault = true;
                    if a >= 0 {
                        i32::MAX
                    } else {
                        i32::MIN
                    }
                } else {
                    a / b
                }
            }
            NumberOp::Min => a.min(b),
            NumberOp::Max => a.max(b),
            NumberOp::Average => ((a as i64 + b as i64) / 2) as i32,
            NumberOp::Abs => a.saturating_abs(),
            NumberOp::Scale => {
                let div = self.scale_div;
                if div == 0 {
                    self.fault = true;
                    if a >= 0 {
                        i32::MAX
                    } else {
                        i32::MIN
                    }
                } else {
                    ((a as i64 * self.scale_mult as i64) / div as i64) as i32
                }
            }
            NumberOp::Clamp => clamp_i32(a as i64, self.clamp_lo, self.clamp_hi),
            NumberOp::Conditional => {
                if cond != 0 {
                    a
                } else {
                    b
                }
            }
            NumberOp::Lookup3 => self.lookup3(a),
        }
    }

    /// Piecewise-linear interpolation over `self.lookup`, sorted ascending
    /// by `input`. An empty table returns 0 and raises a fault.
    fn lookup3(&mut self, x: i32) -> i32 {
        if self.lookup.is_empty() {
            self.fault = true;
            return 0;
        }
        let pts = &self.lookup;
        if x <= pts[0].input {
            return pts[0].output;
        }
        let last = pts.len() - 1;
        if x >= pts[last].input {
            return pts[last].output;
        }
        for w in pts.windows(2) {
            let (lo, hi) = (w[0], w[1]);
            if x >= lo.input && x <= hi.input {
                let span = (hi.input as i64 - lo.input as i64).max(1);
                return (lo.output as i64
                    + (x as i64 - lo.input as i64) * (hi.output as i64 - lo.output as i64) / span)
                    as i32;
            }
        }
        pts[last].output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divide_by_zero_saturates_and_faults() {
        let mut cfg = NumberCfg::new(NumberOp::Divide);
        assert_eq!(cfg.eval(10, 0, 0), i32::MAX);
        assert!(cfg.fault);
        assert_eq!(cfg.eval(-10, 0, 0), i32::MIN);
    }

    #[test]
    fn conditional_selects_by_cond() {
        let mut cfg = NumberCfg::new(NumberOp::Conditional);
        assert_eq!(cfg.eval(10, 20, 1), 10);
        assert_eq!(cfg.eval(10, 20, 0), 20);
    }

    #[test]
    fn lookup3_interpolates() {
        let mut cfg = NumberCfg::new(NumberOp::Lookup3);
        cfg.lookup.push(LookupPoint { input: 0, output: 0 }).unwrap();
        cfg.lookup.push(LookupPoint { input: 100, output: 1000 }).unwrap();
        assert_eq!(cfg.eval(50, 0, 0), 500);
        assert_eq!(cfg.eval(-10, 0, 0), 0);
        assert_eq!(cfg.eval(200, 0, 0), 1000);
    }

    #[test]
    fn empty_lookup_faults() {
        let mut cfg = NumberCfg::new(NumberOp::Lookup3);
        assert_eq!(cfg.eval(5, 0, 0), 0);
        assert!(cfg.fault);
    }
}
