//! Pid — closed-loop controller channel: process-value/setpoint
//! pair in, fixed-point control effort out, with back-calculation
//! anti-windup and derivative-on-measurement.
//!
//! Uses a midpoint (trapezoidal) integral, derivative taken on
//! measurement to avoid derivative kick, and a dynamic integrator clamp,
//! over the fixed-point `i32` values the rest of this crate uses.

#[derive(Debug, Clone)]
pub struct PidCfg {
    pub pv_id: u16,
    pub setpoint_id: u16,

    /// Gains scaled by `1 / gain_scale` (e.g. `gain_scale = 1000` lets
    /// `k_p = 1500` mean 1.5).
    pub k_p: i32,
    pub k_i: i32,
    pub k_d: i32,
    pub gain_scale: i32,

    pub out_min: i32,
    pub out_max: i32,

    // --- state ---
    pub prev_error: i32,
    pub prev_measurement: i32,
    pub integral: i64,
    pub initialized: bool,
}

impl PidCfg {
    pub fn new(k_p: i32, k_i: i32, k_d: i32, out_min: i32, out_max: i32) -> Self {
        Self {
            pv_id: crate::channel::ID_NONE,
            setpoint_id: crate::channel::ID_NONE,
            k_p,
            k_i,
            k_d,
            gain_scale: 1000,
            out_min,
            out_max,
            prev_error: 0,
            prev_measurement: 0,
            integral: 0,
            initialized: false,
        }
    }

    /// `dt_ms` must be nonzero for a meaningful derivative term; the
    /// first call after construction (or after `reset`) seeds state
    /// without differentiating to avoid a derivative kick off zero.
    pub fn eval(&mut self, setpoint: i32, measurement: i32, dt_ms: u32) -> i32 {
        let error = setpoint - measurement;
        let dt = dt_ms.max(1) as i64;
        let scale = self.gain_scale.max(1) as i64;

        if !self.initialized {
            self.prev_error = error;
            self.prev_measurement = measurement;
            self.initialized = true;
        }

        let p_term = (self.k_p as i64 * error as i64) / scale;

        // Midpoint (trapezoidal) integral: `(error + prev_e) / 2 * dt`.
        self.integral += (self.k_i as i64 * (error as i64 + self.prev_error as i64) * dt)
            / (2 * scale * 1000);

        let d_raw = (measurement as i64 - self.prev_measurement as i64) * 1000 / dt;
        let d_term = (self.k_d as i64 * d_raw) / scale;

        let unclamped = p_term + self.integral + d_term;
        let clamped = unclamped.clamp(self.out_min as i64, self.out_max as i64);

        // Back-calculation anti-windup: pull the integrator toward the
        // value that would have produced the clamped output, rather than
        // letting it keep accumulating while saturated.
        if unclamped != clamped {
            self.integral -= unclamped - clamped;
        }

        self.prev_error = error;
        self.prev_measurement = measurement;

        clamped as i32
    }

    pub fn reset(&mut self) {
        self.integral = 0;
        self.prev_error = 0;
        self.prev_measurement = 0;
        self.initialized = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only_tracks_error() {
        let mut cfg = PidCfg::new(1000, 0, 0, -1000, 1000);
        assert_eq!(cfg.eval(100, 0, 10), 100);
        assert_eq!(cfg.eval(100, 50, 10), 50);
    }

    #[test]
    fn output_clamps_to_limits() {
        let mut cfg = PidCfg::new(10_000, 0, 0, -100, 100);
        assert_eq!(cfg.eval(1000, 0, 10), 100);
    }

    #[test]
    fn integral_accumulates_toward_setpoint() {
        let mut cfg = PidCfg::new(0, 500, 0, -10_000, 10_000);
        let v1 = cfg.eval(100, 0, 100);
        let v2 = cfg.eval(100, 0, 100);
        assert!(v2 > v1, "integral should keep growing under sustained error");
    }

    #[test]
    fn anti_windup_prevents_unbounded_growth_while_saturated() {
        let mut cfg = PidCfg::new(0, 100_000, 0, -100, 100);
        for _ in 0..50 {
            cfg.eval(1000, 0, 10);
        }
        let recovered = cfg.eval(0, 0, 10);
        // Once the error vanishes, a wound-up integrator would still push
        // the output to the rail; back-calculation should let it unwind
        // close to zero within one step's proportional/derivative-free term.
        assert!(recovered.abs() < 100, "integrator should have unwound, got {recovered}");
    }
}
