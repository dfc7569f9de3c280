//! SO(3) exponential and logarithm maps, generic over `RealField`.
//!
//! Both maps switch to series expansions near the identity so that dual
//! numbers stay finite when a rotation increment is exactly zero.

use nalgebra::{DVectorView, Quaternion, RealField, UnitQuaternion, Vector3};

/// Squared angle below which the series expansions are used.
const SMALL_ANGLE_SQ: f64 = 1.0e-12;

/// Exponential map `so(3) -> SO(3)` for a rotation vector.
pub fn so3_exp<T: RealField>(omega: &Vector3<T>) -> UnitQuaternion<T> {
    let theta_sq = omega.norm_squared();
    let half = T::from_f64(0.5).unwrap();

    let (w, scale) = if theta_sq < T::from_f64(SMALL_ANGLE_SQ).unwrap() {
        // cos(θ/2) ≈ 1 - θ²/8, sin(θ/2)/θ ≈ 1/2 - θ²/48
        (
            T::one() - theta_sq.clone() / T::from_f64(8.0).unwrap(),
            half - theta_sq / T::from_f64(48.0).unwrap(),
        )
    } else {
        let theta = theta_sq.sqrt();
        let (s, c) = (theta.clone() * half).sin_cos();
        (c, s / theta)
    };

    let v = omega * scale;
    UnitQuaternion::new_unchecked(Quaternion::new(w, v.x.clone(), v.y.clone(), v.z.clone()))
}

/// Logarithm map `SO(3) -> so(3)`, returning a rotation vector with angle in `[0, π]`.
pub fn so3_log<T: RealField>(q: &UnitQuaternion<T>) -> Vector3<T> {
    let q = q.as_ref();
    // Use the hemisphere with w >= 0 so the angle stays in [0, π].
    let (w, v) = if q.w < T::zero() {
        (-q.w.clone(), -q.imag())
    } else {
        (q.w.clone(), q.imag())
    };

    let n_sq = v.norm_squared();
    let two = T::from_f64(2.0).unwrap();
    let scale = if n_sq < T::from_f64(SMALL_ANGLE_SQ).unwrap() {
        // 2·atan(n/w)/n ≈ 2/w · (1 - n²/(3w²))
        let w_sq = w.clone() * w.clone();
        two / w * (T::one() - n_sq / (T::from_f64(3.0).unwrap() * w_sq))
    } else {
        let n = n_sq.sqrt();
        two * n.clone().atan2(w) / n
    };
    v * scale
}

/// Read a unit quaternion from a `[qx, qy, qz, qw]` parameter block.
///
/// The quaternion is re-normalised, so slightly off-manifold iterates are
/// tolerated.
pub fn quat_from_params<T: RealField>(p: DVectorView<'_, T>) -> UnitQuaternion<T> {
    debug_assert!(p.len() == 4, "so3 block must have 4 params");
    UnitQuaternion::from_quaternion(Quaternion::new(
        p[3].clone(),
        p[0].clone(),
        p[1].clone(),
        p[2].clone(),
    ))
}

/// Read a 3-vector from a parameter block.
pub fn vec3_from_params<T: RealField>(p: DVectorView<'_, T>) -> Vector3<T> {
    debug_assert!(p.len() >= 3, "vector block must have 3 params");
    Vector3::new(p[0].clone(), p[1].clone(), p[2].clone())
}
