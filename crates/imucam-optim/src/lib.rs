//! Continuous-time trajectory estimation built on tiny-solver.
//!
//! The crate is organised the same way as a classic calibration optimizer:
//!
//! - [`ir`] describes a problem independently of the solver (parameter blocks,
//!   residual blocks, manifolds, fixed masks and bounds),
//! - [`backend`] compiles the IR into a tiny-solver problem and runs
//!   Levenberg-Marquardt,
//! - [`math`] and [`factors`] hold the generic (autodiff friendly) spline and
//!   residual models,
//! - [`trajectory`] owns the uniform cumulative B-spline over SO(3) x R^3 and
//!   accumulates reprojection and inertial residuals against it,
//! - [`synthetic`] renders spline-consistent camera and IMU data for tests.

pub mod backend;
pub mod factors;
pub mod ir;
pub mod math;
pub mod params;
pub mod synthetic;
pub mod trajectory;

pub use crate::backend::BackendSolveOptions;
pub use crate::ir::RobustLoss;
pub use crate::trajectory::{
    knot_count, ReprojectionErrors, SolveSummary, SplineTrajectory, TrajectoryOptions,
};
