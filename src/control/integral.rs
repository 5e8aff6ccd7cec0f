//! Bounded integral controller for the grow-light dimmer.
//!
//! Each step nudges the output by `-(measurement - setpoint) * gain`, with
//! the nudge clamped to `±max_step` and the output clamped to the limits.
//! Large sensor errors therefore ramp the lamps instead of slamming them.

/// Bounded integral controller
#[derive(Debug, Clone)]
pub struct IntegralController {
    gain: f64,
    max_step: f64,
    setpoint: f64,
    output: f64,
    output_min: f64,
    output_max: f64,
}

impl IntegralController {
    pub fn new(gain: f64, max_step: f64) -> Self {
        Self {
            gain,
            max_step,
            setpoint: 0.0,
            output: 0.0,
            output_min: 0.0,
            output_max: 100.0,
        }
    }

    /// Set output limits
    pub fn set_limits(&mut self, min: f64, max: f64) {
        self.output_min = min;
        self.output_max = max;
        self.output = self.output.clamp(min, max);
    }

    /// Update setpoint
    pub fn set_target(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn target(&self) -> f64 {
        self.setpoint
    }

    /// Advance one step given the current measurement; returns the new output.
    pub fn compute(&mut self, measurement: f64) -> f64 {
        let delta = (-(measurement - self.setpoint) * self.gain).clamp(-self.max_step, self.max_step);
        self.output = (self.output + delta).clamp(self.output_min, self.output_max);
        self.output
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    /// Force the output to a value (e.g. zero when switched off).
    pub fn force(&mut self, output: f64) {
        self.output = output.clamp(self.output_min, self.output_max);
    }
}
