//! Live-tunable numeric parameters.
//!
//! A parameter is a named value with optional slider bounds, a linear or
//! logarithmic scale, and a stepping sensitivity. Remote-control surfaces
//! mutate parameters through these methods; out-of-range writes clamp rather
//! than error so a running show never aborts on a bad knob twist. Reading a
//! parameter that was never initialized is a programming error and panics.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamError {
    #[error("parameter {0}: log scale requires positive bounds")]
    NonPositiveLogBounds(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamScale {
    Linear,
    Log,
}

#[derive(Debug, Clone)]
pub struct NumericParameter {
    pub name: String,
    // slider endpoints; min does not have to be below max, and min == max
    // means unbounded
    min: f64,
    max: f64,
    // if set, values outside the bounds are allowed rather than clamped
    soft_limits: bool,
    scale: ParamScale,
    // increment for one step, roughly 1/60th of a jog-wheel turn
    sensitivity: f64,
    value: Option<f64>,
}

impl NumericParameter {
    pub fn new(name: &str) -> NumericParameter {
        NumericParameter {
            name: name.to_owned(),
            min: 0.0,
            max: 0.0,
            soft_limits: false,
            scale: ParamScale::Linear,
            sensitivity: 0.0,
            value: None,
        }
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> NumericParameter {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_soft_limits(mut self) -> NumericParameter {
        self.soft_limits = true;
        self
    }

    pub fn with_scale(mut self, scale: ParamScale) -> NumericParameter {
        self.scale = scale;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> NumericParameter {
        self.sensitivity = sensitivity;
        self
    }

    /// Validate the configuration and set the initial value. All parameters
    /// must be initialized before the frame loop starts.
    pub fn init(mut self, value: f64) -> Result<NumericParameter, ParamError> {
        if self.scale == ParamScale::Log && self.has_bounds() && (self.min <= 0.0 || self.max <= 0.0)
        {
            return Err(ParamError::NonPositiveLogBounds(self.name));
        }
        self.set(value);
        Ok(self)
    }

    pub fn get(&self) -> f64 {
        match self.value {
            Some(v) => v,
            None => panic!("parameter {} has not been initialized", self.name),
        }
    }

    pub fn set(&mut self, value: f64) {
        self.value = Some(self.constrain(value));
    }

    /// Set from a normalized slider position, mapped through the parameter's
    /// scale. The fraction is clamped to [0, 1].
    pub fn set_slider(&mut self, frac: f64) {
        assert!(
            self.has_bounds(),
            "parameter {}: slider requires bounds",
            self.name
        );
        let frac = frac.clamp(0.0, 1.0);
        match self.scale {
            ParamScale::Linear => self.set(self.min * (1.0 - frac) + self.max * frac),
            ParamScale::Log => {
                self.set((self.min.ln() * (1.0 - frac) + self.max.ln() * frac).exp())
            }
        }
    }

    pub fn step(&mut self, incr: bool) {
        self.step_scaled(incr, 1.0);
    }

    /// One step at `sensitivity * adjust`: additive on a linear scale,
    /// multiplicative on a log scale.
    pub fn step_scaled(&mut self, incr: bool, adjust: f64) {
        assert!(
            self.sensitivity != 0.0,
            "parameter {}: sensitivity not set",
            self.name
        );
        let sens = self.sensitivity * adjust;
        match self.scale {
            ParamScale::Linear => {
                let delta = if incr { sens } else { -sens };
                self.set(self.get() + delta);
            }
            ParamScale::Log => {
                let mult = 1.0 + sens;
                let factor = if incr { mult } else { 1.0 / mult };
                self.set(self.get() * factor);
            }
        }
    }

    /// Apply a possibly-fractional number of steps in one call.
    pub fn increment(&mut self, jump: f64) {
        let incr = jump > 0.0;
        let jump = jump.abs();
        let whole = jump.floor() as u32;
        for _ in 0..whole {
            self.step(incr);
        }
        let remainder = jump - whole as f64;
        if remainder > 1e-6 {
            self.step_scaled(incr, remainder);
        }
    }

    pub fn has_bounds(&self) -> bool {
        self.min != self.max
    }

    fn constrain(&self, value: f64) -> f64 {
        if self.has_bounds() && !self.soft_limits {
            value.clamp(self.min.min(self.max), self.min.max(self.max))
        } else {
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_bounds_clamp() {
        let mut p = NumericParameter::new("x")
            .with_bounds(-1.0, 1.0)
            .init(0.0)
            .unwrap();
        p.set(5.0);
        assert_eq!(p.get(), 1.0);
        p.set(-5.0);
        assert_eq!(p.get(), -1.0);
    }

    #[test]
    fn soft_bounds_pass_through() {
        let mut p = NumericParameter::new("x")
            .with_bounds(-1.0, 1.0)
            .with_soft_limits()
            .init(0.0)
            .unwrap();
        p.set(5.0);
        assert_eq!(p.get(), 5.0);
    }

    #[test]
    fn reversed_bounds_still_clamp() {
        // min/max are slider endpoints, not an ordered range
        let mut p = NumericParameter::new("depth")
            .with_bounds(0.5, 0.01)
            .init(0.2)
            .unwrap();
        p.set(0.9);
        assert_eq!(p.get(), 0.5);
        p.set_slider(0.0);
        assert_eq!(p.get(), 0.5);
        p.set_slider(1.0);
        assert!((p.get() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn log_slider_and_stepping() {
        let mut p = NumericParameter::new("scale")
            .with_bounds(0.25, 4.0)
            .with_scale(ParamScale::Log)
            .with_sensitivity(0.5)
            .init(1.0)
            .unwrap();
        p.set_slider(0.5);
        assert!((p.get() - 1.0).abs() < 1e-9);
        p.step(true);
        assert!((p.get() - 1.5).abs() < 1e-9);
        p.step(false);
        assert!((p.get() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn log_bounds_must_be_positive() {
        let res = NumericParameter::new("bad")
            .with_bounds(0.0, 2.0)
            .with_scale(ParamScale::Log)
            .init(1.0);
        assert!(matches!(res, Err(ParamError::NonPositiveLogBounds(_))));
    }

    #[test]
    #[should_panic(expected = "has not been initialized")]
    fn uninitialized_read_is_fatal() {
        NumericParameter::new("never").get();
    }

    #[test]
    fn fractional_increment() {
        let mut p = NumericParameter::new("x")
            .with_sensitivity(1.0)
            .init(0.0)
            .unwrap();
        p.increment(2.5);
        assert!((p.get() - 2.5).abs() < 1e-9);
        p.increment(-1.25);
        assert!((p.get() - 1.25).abs() < 1e-9);
    }
}
