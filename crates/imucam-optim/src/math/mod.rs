//! Generic math shared by the spline factors.
//!
//! Everything here is generic over [`nalgebra::RealField`] so the same code
//! evaluates trajectories in `f64` and differentiates residuals with dual
//! numbers.

pub mod projection;
pub mod so3;
pub mod spline;
