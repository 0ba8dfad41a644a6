//! Smoothed audio parameters.
//!
//! An [`AudioParam`] holds a scalar that glides exponentially toward its
//! target, the same curve as `setTargetAtTime`:
//!
//! `v(t) = target + (v0 - target) * e^(-(t - t0) / tau)`
//!
//! Values are computed from the context clock rather than advanced per
//! rendered sample, so a parameter on a node that is not currently being
//! pulled still reaches its target on schedule.

#[derive(Debug, Clone)]
pub struct AudioParam {
    start_value: f64,
    target: f64,
    start_time: f64,
    time_constant: f64,
}

impl AudioParam {
    pub fn new(value: f64) -> Self {
        AudioParam {
            start_value: value,
            target: value,
            start_time: 0.0,
            time_constant: 0.0,
        }
    }

    /// Jump to `value` immediately.
    pub fn set_value(&mut self, value: f64) {
        self.start_value = value;
        self.target = value;
        self.time_constant = 0.0;
    }

    /// Start gliding from the current value toward `target` at `time`.
    pub fn set_target_at_time(&mut self, target: f64, time: f64, time_constant: f64) {
        self.start_value = self.value_at(time);
        self.start_time = time;
        self.target = target;
        self.time_constant = time_constant.max(0.0);
    }

    /// The value most recently requested.
    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn value_at(&self, time: f64) -> f64 {
        if self.time_constant <= 0.0 {
            return self.target;
        }
        if time <= self.start_time {
            return self.start_value;
        }
        let elapsed = time - self.start_time;
        self.target + (self.start_value - self.target) * (-elapsed / self.time_constant).exp()
    }

    /// Fill `out` with per-sample values starting at `time`.
    pub fn fill(&self, time: f64, sample_rate: f64, out: &mut [f32]) {
        if self.time_constant <= 0.0 || self.settled_at(time) {
            out.fill(self.target as f32);
            return;
        }
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.value_at(time + i as f64 / sample_rate) as f32;
        }
    }

    /// True once the glide is within audible-irrelevance of its target.
    fn settled_at(&self, time: f64) -> bool {
        time > self.start_time && (time - self.start_time) > self.time_constant * 12.0
    }
}
