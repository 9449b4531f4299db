//! Settings for numerical gradient checking.

use crate::error::DiffError;

/// Default central-difference step.
pub const DEFAULT_STEP: f64 = 1e-6;

/// Default allowed absolute (and relative) disagreement.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Tuning for [`grad_check`](crate::backward::grad_check).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradCheckConfig {
    /// Step `h` of the central difference `(f(x+h) - f(x-h)) / 2h`.
    pub step: f64,
    /// Maximum allowed difference between analytical and numerical gradients.
    pub tolerance: f64,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            step: DEFAULT_STEP,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl GradCheckConfig {
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Both values must be finite and strictly positive.
    pub fn validate(&self) -> Result<(), DiffError> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(DiffError::InvalidConfig {
                reason: format!("step must be finite and > 0, got {}", self.step),
            });
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(DiffError::InvalidConfig {
                reason: format!("tolerance must be finite and > 0, got {}", self.tolerance),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GradCheckConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_step() {
        let cfg = GradCheckConfig::default().with_step(0.0);
        assert!(matches!(
            cfg.validate(),
            Err(DiffError::InvalidConfig { .. })
        ));
        assert!(GradCheckConfig::default()
            .with_step(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn validate_rejects_negative_tolerance() {
        let cfg = GradCheckConfig::default().with_tolerance(-1e-3);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn builders_override_fields() {
        let cfg = GradCheckConfig::default()
            .with_step(1e-3)
            .with_tolerance(1e-2);
        assert_eq!(cfg.step, 1e-3);
        assert_eq!(cfg.tolerance, 1e-2);
    }
}
