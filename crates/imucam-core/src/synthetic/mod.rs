//! Deterministic synthetic data generation helpers.
//!
//! Small building blocks for synthetic calibration scenes used in tests:
//! - planar target point grids,
//! - deterministic pseudo-random noise for pixels and inertial samples.
//!
//! Trajectory-consistent inertial data is produced by the optimizer crate,
//! which owns the spline model.

pub mod noise;
pub mod target;
