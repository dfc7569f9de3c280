use crate::imu_camera::CalibrationStage;
use thiserror::Error;

/// Failures reported by the calibration pipeline.
///
/// Precondition failures are detected before any state is modified.
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// The spline window cannot be derived without camera timestamps.
    #[error("camera timestamp set is empty")]
    EmptyCameraTimestamps,
    /// No accelerometer sample lies close enough to a posed camera frame.
    #[error("no accelerometer sample within {tolerance_s:.4} s of a posed camera timestamp")]
    GravityUnavailable { tolerance_s: f64 },
    /// Optimization needs gravity, which was never initialized.
    #[error("gravity is not initialized")]
    GravityNotInitialized,
    /// The operation is not valid in the current stage.
    #[error("{operation} is not allowed in stage {stage:?}")]
    InvalidStage {
        operation: &'static str,
        stage: CalibrationStage,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Trajectory construction or the solver backend failed.
    #[error(transparent)]
    Solver(#[from] anyhow::Error),
}
