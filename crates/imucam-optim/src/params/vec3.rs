//! Euclidean 3-vector and scalar parameter conversions.

use anyhow::{ensure, Result};
use imucam_core::Vec3;
use nalgebra::{DVector, DVectorView};

/// Pack a 3-vector (knot position, gravity, bias) into a parameter block.
pub fn vec3_to_dvec(v: &Vec3) -> DVector<f64> {
    nalgebra::dvector![v.x, v.y, v.z]
}

/// Unpack a 3D parameter block.
pub fn dvec_to_vec3(v: DVectorView<'_, f64>) -> Result<Vec3> {
    ensure!(
        v.len() == 3,
        "expected vector of length 3, got {}",
        v.len()
    );
    Ok(Vec3::new(v[0], v[1], v[2]))
}

/// Unpack a 1D parameter block.
pub fn dvec_to_scalar(v: DVectorView<'_, f64>) -> Result<f64> {
    ensure!(v.len() == 1, "expected scalar block, got length {}", v.len());
    Ok(v[0])
}
