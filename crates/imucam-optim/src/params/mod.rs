//! Parameter block packing for the trajectory problem.
//!
//! - [`pose_se3`] - SE(3) extrinsics and SO(3) rotation knots
//! - [`vec3`] - translation knots, gravity, biases and the line delay

pub mod pose_se3;
pub mod vec3;
