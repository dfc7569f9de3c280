//! Uniform cumulative cubic B-splines on SO(3) and R³.
//!
//! A spline of order 4 is evaluated on the segment starting at knot `s` from
//! the four knots `s..s+4` and the normalised time `u ∈ [0, 1)`. Knot `i` sits
//! at time `t0 + (i - 1) * dt`, so the segment index of a time `t` is
//! `floor((t - t0) / dt)`.
//!
//! Both splines use the cumulative form
//!
//! ```text
//! R(u) = R_s · Π_{j=1..3} Exp(λ_j(u) · Log(R_{s+j-1}⁻¹ R_{s+j}))
//! p(u) = p_s + Σ_{j=1..3} λ_j(u) · (p_{s+j} - p_{s+j-1})
//! ```
//!
//! with the cumulative blending functions `λ_j`.

use super::so3::{so3_exp, so3_log};
use nalgebra::{RealField, UnitQuaternion, Vector3};

/// Spline order (cubic).
pub const SPLINE_ORDER: usize = 4;

/// Segment index and normalised time of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentIndex {
    /// Index of the first of the four supporting knots.
    pub s: usize,
    /// Normalised time within the segment; may leave `[0, 1)` when `s` was clamped.
    pub u: f64,
}

/// Locate the segment for time `t_s` on a spline with `num_knots` knots.
///
/// The segment is clamped to `[0, num_knots - 4]`, in which case `u`
/// extrapolates the outermost polynomial piece.
pub fn segment_index(t_s: f64, t0_s: f64, dt_s: f64, num_knots: usize) -> SegmentIndex {
    let x = (t_s - t0_s) / dt_s;
    let max_s = num_knots.saturating_sub(SPLINE_ORDER) as f64;
    let s = x.floor().clamp(0.0, max_s);
    SegmentIndex { s: s as usize, u: x - s }
}

fn c<T: RealField>(v: f64) -> T {
    T::from_f64(v).unwrap()
}

/// Cumulative blending values `[λ1, λ2, λ3]` (`λ0` is always one).
pub fn cumulative_basis<T: RealField>(u: T) -> [T; 3] {
    let u2 = u.clone() * u.clone();
    let u3 = u2.clone() * u.clone();
    let sixth = c::<T>(1.0 / 6.0);
    [
        (c::<T>(5.0) + c::<T>(3.0) * u.clone() - c::<T>(3.0) * u2.clone() + u3.clone())
            * sixth.clone(),
        (T::one() + c::<T>(3.0) * u + c::<T>(3.0) * u2 - c::<T>(2.0) * u3.clone())
            * sixth.clone(),
        u3 * sixth,
    ]
}

/// Time derivative of the cumulative blending values.
pub fn cumulative_basis_dot<T: RealField>(u: T, inv_dt: T) -> [T; 3] {
    let u2 = u.clone() * u.clone();
    let half = c::<T>(0.5);
    [
        (T::one() - c::<T>(2.0) * u.clone() + u2.clone()) * half.clone() * inv_dt.clone(),
        (T::one() + c::<T>(2.0) * u - c::<T>(2.0) * u2.clone()) * half.clone() * inv_dt.clone(),
        u2 * half * inv_dt,
    ]
}

/// Second time derivative of the cumulative blending values.
pub fn cumulative_basis_ddot<T: RealField>(u: T, inv_dt: T) -> [T; 3] {
    let inv_dt2 = inv_dt.clone() * inv_dt;
    [
        (u.clone() - T::one()) * inv_dt2.clone(),
        (T::one() - c::<T>(2.0) * u.clone()) * inv_dt2.clone(),
        u * inv_dt2,
    ]
}

/// Rotation and body angular velocity of an SO(3) spline segment.
pub fn so3_segment<T: RealField>(
    knots: &[UnitQuaternion<T>; 4],
    u: T,
    inv_dt: T,
) -> (UnitQuaternion<T>, Vector3<T>) {
    let lambda = cumulative_basis(u.clone());
    let lambda_dot = cumulative_basis_dot(u, inv_dt);

    let mut rot = knots[0].clone();
    let mut omega = Vector3::zeros();
    for j in 1..SPLINE_ORDER {
        let d = so3_log(&(knots[j - 1].inverse() * knots[j].clone()));
        let a = so3_exp(&(d.clone() * lambda[j - 1].clone()));
        omega = a.inverse_transform_vector(&omega) + d * lambda_dot[j - 1].clone();
        rot *= a;
    }
    (rot, omega)
}

/// Rotation of an SO(3) spline segment.
pub fn so3_segment_rotation<T: RealField>(knots: &[UnitQuaternion<T>; 4], u: T) -> UnitQuaternion<T> {
    let lambda = cumulative_basis(u);
    let mut rot = knots[0].clone();
    for j in 1..SPLINE_ORDER {
        let d = so3_log(&(knots[j - 1].inverse() * knots[j].clone()));
        rot *= so3_exp(&(d * lambda[j - 1].clone()));
    }
    rot
}

/// Position, velocity and acceleration of an R³ spline segment.
pub fn r3_segment<T: RealField>(
    knots: &[Vector3<T>; 4],
    u: T,
    inv_dt: T,
) -> (Vector3<T>, Vector3<T>, Vector3<T>) {
    let lambda = cumulative_basis(u.clone());
    let lambda_dot = cumulative_basis_dot(u.clone(), inv_dt.clone());
    let lambda_ddot = cumulative_basis_ddot(u, inv_dt);

    let mut p = knots[0].clone();
    let mut v = Vector3::zeros();
    let mut a = Vector3::zeros();
    for j in 1..SPLINE_ORDER {
        let delta = knots[j].clone() - knots[j - 1].clone();
        p += delta.clone() * lambda[j - 1].clone();
        v += delta.clone() * lambda_dot[j - 1].clone();
        a += delta * lambda_ddot[j - 1].clone();
    }
    (p, v, a)
}
