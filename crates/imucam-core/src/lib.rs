//! Core types for continuous-time camera/IMU calibration.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, `Iso3`, ...),
//! - the composite time/sensor key [`TimeCamId`] and the half-open [`TimeWindow`],
//! - a pinhole + Brown-Conrady camera model ([`CameraIntrinsics`]),
//! - the reconstruction container consumed and produced by the calibrator,
//! - raw accelerometer/gyroscope telemetry streams,
//! - spline weighting configuration,
//! - deterministic synthetic data helpers for tests.
//!
//! Frame conventions follow `a_se3_b`: a transform that maps points expressed
//! in frame `b` into frame `a`.

/// Linear algebra type aliases and helpers.
pub mod math;
/// Pinhole camera with Brown-Conrady distortion.
pub mod camera;
/// Spline weighting configuration.
pub mod config;
/// Reconstruction container (views, tracks, camera).
pub mod reconstruction;
/// Deterministic synthetic data helpers.
pub mod synthetic;
/// Accelerometer and gyroscope streams.
pub mod telemetry;
/// Time keys and windows.
pub mod time;

pub use camera::*;
pub use config::*;
pub use math::*;
pub use reconstruction::*;
pub use telemetry::*;
pub use time::*;
