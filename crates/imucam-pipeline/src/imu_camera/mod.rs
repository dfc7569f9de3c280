//! Continuous-time camera-IMU calibration.
//!
//! # Conventions
//!
//! - Camera poses are `world_se3_camera`, spline poses `world_se3_imu`.
//! - The camera-to-IMU transform is `imu_se3_camera`, so
//!   `world_se3_camera(t) = world_se3_imu(t) * imu_se3_camera`.
//! - IMU timestamps are corrected as `t_cam = t_imu + time_offset`, samples as
//!   `corrected = raw + bias`.
//! - Gravity is expressed in the world frame; a resting accelerometer reads
//!   `R^T g`.

mod calibrator;
mod gravity;
mod run;
mod store;

pub use calibrator::{
    CalibrationStage, ImuCameraCalibrationReport, ImuCameraCalibrator,
    ImuCameraCalibratorOptions, ImuCameraInit,
};
pub use gravity::{initialize_gravity, GravityMatch, GRAVITY_MATCH_TOLERANCE_S};
pub use run::{run_calibration, ImuCameraCalibrationInput, ImuCameraCalibrationOutput};
pub use store::{CornerObservation, MeasurementStore};
