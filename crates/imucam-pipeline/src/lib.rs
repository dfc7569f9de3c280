//! High-level camera-IMU calibration pipeline.
//!
//! The pipeline takes a reconstruction (camera poses, target tracks and their
//! observations), raw IMU telemetry and an initial camera-to-IMU guess, fits a
//! continuous-time spline trajectory and refines the camera-to-IMU transform,
//! gravity, the rolling-shutter line delay and optionally the IMU biases.
//!
//! The entry point is [`ImuCameraCalibrator`], a small state machine:
//!
//! ```text
//! Empty -> Initialized -> GravitySet -> Optimized -> Exported
//! ```
//!
//! [`run_calibration`] chains all steps for the common case.

pub mod error;
pub mod imu_camera;

pub use error::CalibrationError;
pub use imu_camera::{
    initialize_gravity, run_calibration, CalibrationStage, CornerObservation, GravityMatch,
    ImuCameraCalibrationInput, ImuCameraCalibrationOutput, ImuCameraCalibrationReport,
    ImuCameraCalibrator, ImuCameraCalibratorOptions, ImuCameraInit, MeasurementStore,
    GRAVITY_MATCH_TOLERANCE_S,
};
