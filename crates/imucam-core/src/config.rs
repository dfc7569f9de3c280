use crate::Real;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Knot spacing and inertial weighting for the trajectory spline.
///
/// Supplied once per calibration run and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplineWeighting {
    /// Rotation knot spacing in seconds.
    pub dt_so3: Real,
    /// Translation knot spacing in seconds.
    pub dt_r3: Real,
    /// Gyroscope measurement variance; the residual weight is `1 / var_so3`.
    pub var_so3: Real,
    /// Accelerometer measurement variance; the residual weight is `1 / var_r3`.
    pub var_r3: Real,
    /// Nominal camera frame rate (Hz).
    pub cam_fps: Real,
}

impl Default for SplineWeighting {
    fn default() -> Self {
        Self {
            dt_so3: 0.1,
            dt_r3: 0.1,
            var_so3: 1.0e-2,
            var_r3: 1.0e-1,
            cam_fps: 30.0,
        }
    }
}

impl SplineWeighting {
    /// Residual weight of a gyroscope sample.
    pub fn gyro_weight(&self) -> Real {
        1.0 / self.var_so3
    }

    /// Residual weight of an accelerometer sample.
    pub fn accel_weight(&self) -> Real {
        1.0 / self.var_r3
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.dt_so3 > 0.0 && self.dt_r3 > 0.0,
            "knot spacing must be positive (so3 {}, r3 {})",
            self.dt_so3,
            self.dt_r3
        );
        ensure!(
            self.var_so3 > 0.0 && self.var_r3 > 0.0,
            "measurement variances must be positive (so3 {}, r3 {})",
            self.var_so3,
            self.var_r3
        );
        ensure!(
            self.cam_fps > 0.0,
            "camera frame rate must be positive, got {}",
            self.cam_fps
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_are_inverse_variances() {
        let cfg = SplineWeighting {
            var_so3: 0.25,
            var_r3: 4.0,
            ..Default::default()
        };
        assert_eq!(cfg.gyro_weight(), 4.0);
        assert_eq!(cfg.accel_weight(), 0.25);
    }

    #[test]
    fn non_positive_spacing_is_invalid() {
        let cfg = SplineWeighting {
            dt_r3: 0.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(SplineWeighting::default().validate().is_ok());
    }

    #[test]
    fn json_roundtrip() {
        let cfg = SplineWeighting::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let restored: SplineWeighting = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cfg);
    }
}
