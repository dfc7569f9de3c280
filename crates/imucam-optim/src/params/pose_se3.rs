//! SE(3) and SO(3) parameter conversions for tiny-solver.

use anyhow::{ensure, Result};
use imucam_core::{Iso3, Quat};
use nalgebra::{DVector, DVectorView, Quaternion, UnitQuaternion, Vector3};

/// Convert an `Iso3` into a 7D SE(3) parameter vector `[qx, qy, qz, qw, tx, ty, tz]`.
pub fn iso3_to_se3_dvec(pose: &Iso3) -> DVector<f64> {
    let q = pose.rotation.into_inner();
    let t = pose.translation.vector;
    nalgebra::dvector![
        q.coords[0],
        q.coords[1],
        q.coords[2],
        q.coords[3],
        t.x,
        t.y,
        t.z
    ]
}

/// Convert a 7D SE(3) vector `[qx, qy, qz, qw, tx, ty, tz]` into an `Iso3`.
pub fn se3_dvec_to_iso3(v: DVectorView<'_, f64>) -> Result<Iso3> {
    ensure!(
        v.len() == 7,
        "expected se3 vector of length 7, got {}",
        v.len()
    );
    let quat = Quaternion::new(v[3], v[0], v[1], v[2]);
    let rot = UnitQuaternion::from_quaternion(quat);
    let trans = Vector3::new(v[4], v[5], v[6]);
    Ok(Iso3::from_parts(trans.into(), rot))
}

/// Convert a unit quaternion into a 4D SO(3) parameter vector `[qx, qy, qz, qw]`.
pub fn quat_to_so3_dvec(q: &Quat) -> DVector<f64> {
    let c = q.into_inner().coords;
    nalgebra::dvector![c[0], c[1], c[2], c[3]]
}

/// Convert a 4D SO(3) vector `[qx, qy, qz, qw]` into a unit quaternion.
pub fn so3_dvec_to_quat(v: DVectorView<'_, f64>) -> Result<Quat> {
    ensure!(
        v.len() == 4,
        "expected so3 vector of length 4, got {}",
        v.len()
    );
    Ok(UnitQuaternion::from_quaternion(Quaternion::new(
        v[3], v[0], v[1], v[2],
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;

    #[test]
    fn se3_roundtrip() {
        let pose = Iso3::from_parts(
            Translation3::new(0.1, -0.2, 0.3),
            UnitQuaternion::from_scaled_axis(Vector3::new(0.2, 0.1, -0.4)),
        );
        let v = iso3_to_se3_dvec(&pose);
        assert_eq!(v.len(), 7);
        let back = se3_dvec_to_iso3(v.as_view()).unwrap();
        assert!((back.translation.vector - pose.translation.vector).norm() < 1e-12);
        assert!(back.rotation.angle_to(&pose.rotation) < 1e-12);
    }

    #[test]
    fn so3_storage_is_xyzw() {
        let q = UnitQuaternion::from_scaled_axis(Vector3::new(0.0, 0.0, 0.5));
        let v = quat_to_so3_dvec(&q);
        assert!((v[3] - (0.25_f64).cos()).abs() < 1e-12);
        assert!((v[2] - (0.25_f64).sin()).abs() < 1e-12);
        assert!(so3_dvec_to_quat(v.as_view()).unwrap().angle_to(&q) < 1e-12);
        assert!(so3_dvec_to_quat(nalgebra::dvector![1.0, 0.0].as_view()).is_err());
    }
}
