//! Residual factor implementations with automatic differentiation support.
//!
//! All factor functions are generic over [`nalgebra::RealField`] so tiny-solver
//! can evaluate them with dual numbers. They read their parameter blocks from
//! a slice laid out as documented on each [`crate::ir::FactorKind`] variant and
//! return a residual scaled by `sqrt(w)`.
//!
//! - [`spline_reprojection`] - rolling-shutter corner reprojection
//! - [`inertial`] - gyroscope and accelerometer residuals

pub mod inertial;
pub mod spline_reprojection;
