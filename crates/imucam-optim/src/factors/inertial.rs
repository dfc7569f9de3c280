//! Gyroscope and accelerometer residuals against the spline trajectory.
//!
//! Measurements arrive already corrected by the externally supplied biases.
//! When biases are re-estimated, the residual subtracts the bias block from
//! the corrected sample (`true = corrected - b`). Otherwise the caller folds
//! the current bias estimate into `meas`.

use crate::ir::SegmentSample;
use crate::math::so3::{quat_from_params, vec3_from_params};
use crate::math::spline::{r3_segment, so3_segment};
use nalgebra::{DVector, RealField, SVector, UnitQuaternion, Vector3};

fn measurement<T: RealField>(meas: [f64; 3]) -> Vector3<T> {
    Vector3::new(
        T::from_f64(meas[0]).unwrap(),
        T::from_f64(meas[1]).unwrap(),
        T::from_f64(meas[2]).unwrap(),
    )
}

fn weighted<T: RealField>(r: Vector3<T>, w: f64) -> SVector<T, 3> {
    r * T::from_f64(w.sqrt()).unwrap()
}

/// Gyroscope residual `sqrt(w) * (ω_body - (ω_meas - b_g))`.
///
/// Parameter layout: `[so3 x4]` or `[so3 x4, gyro_bias]`.
pub(crate) fn gyro_residual_generic<T: RealField>(
    params: &[DVector<T>],
    meas: [f64; 3],
    so3: SegmentSample,
    w: f64,
    with_bias: bool,
) -> SVector<T, 3> {
    debug_assert_eq!(params.len(), 4 + usize::from(with_bias));

    let knots: [UnitQuaternion<T>; 4] =
        std::array::from_fn(|i| quat_from_params(params[i].as_view()));
    let (_, omega) = so3_segment(
        &knots,
        T::from_f64(so3.u).unwrap(),
        T::from_f64(so3.inv_dt).unwrap(),
    );

    let mut observed = measurement::<T>(meas);
    if with_bias {
        observed -= vec3_from_params(params[4].as_view());
    }
    weighted(omega - observed, w)
}

/// Accelerometer residual `sqrt(w) * (R^T (p̈ + g) - (a_meas - b_a))`.
///
/// `g` is the gravity parameter in the trajectory's world frame, expressed as
/// the specific force a resting sensor would measure.
///
/// Parameter layout: `[so3 x4, r3 x4, gravity]` or
/// `[so3 x4, r3 x4, gravity, accel_bias]`.
pub(crate) fn accel_residual_generic<T: RealField>(
    params: &[DVector<T>],
    meas: [f64; 3],
    so3: SegmentSample,
    r3: SegmentSample,
    w: f64,
    with_bias: bool,
) -> SVector<T, 3> {
    debug_assert_eq!(params.len(), 9 + usize::from(with_bias));

    let so3_knots: [UnitQuaternion<T>; 4] =
        std::array::from_fn(|i| quat_from_params(params[i].as_view()));
    let r3_knots: [Vector3<T>; 4] =
        std::array::from_fn(|i| vec3_from_params(params[4 + i].as_view()));

    let (rot_w_i, _) = so3_segment(
        &so3_knots,
        T::from_f64(so3.u).unwrap(),
        T::from_f64(so3.inv_dt).unwrap(),
    );
    let (_, _, accel_w) = r3_segment(
        &r3_knots,
        T::from_f64(r3.u).unwrap(),
        T::from_f64(r3.inv_dt).unwrap(),
    );
    let gravity = vec3_from_params(params[8].as_view());
    let predicted = rot_w_i.inverse_transform_vector(&(accel_w + gravity));

    let mut observed = measurement::<T>(meas);
    if with_bias {
        observed -= vec3_from_params(params[9].as_view());
    }
    weighted(predicted - observed, w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::pose_se3::quat_to_so3_dvec;
    use crate::params::vec3::vec3_to_dvec;
    use imucam_core::{Quat, Vec3};

    fn sample() -> SegmentSample {
        SegmentSample { u: 0.4, inv_dt: 10.0 }
    }

    #[test]
    fn resting_sensor_measures_rotated_gravity() {
        let rot = Quat::from_scaled_axis(Vec3::new(0.3, 0.0, 0.0));
        let gravity = Vec3::new(0.0, 0.0, 9.81);
        let mut params: Vec<DVector<f64>> = (0..4).map(|_| quat_to_so3_dvec(&rot)).collect();
        params.extend((0..4).map(|_| vec3_to_dvec(&Vec3::new(1.0, 2.0, 3.0))));
        params.push(vec3_to_dvec(&gravity));

        let meas = rot.inverse_transform_vector(&gravity);
        let r = accel_residual_generic(&params, [meas.x, meas.y, meas.z], sample(), sample(), 1.0, false);
        assert!(r.norm() < 1e-12);

        // A bias block absorbs a constant offset in the corrected sample.
        let bias = Vec3::new(0.1, -0.2, 0.05);
        params.push(vec3_to_dvec(&bias));
        let biased = meas + bias;
        let r = accel_residual_generic(
            &params,
            [biased.x, biased.y, biased.z],
            sample(),
            sample(),
            1.0,
            true,
        );
        assert!(r.norm() < 1e-12);
    }

    #[test]
    fn static_spline_has_zero_rate() {
        let rot = Quat::from_scaled_axis(Vec3::new(0.1, 0.2, 0.3));
        let params: Vec<DVector<f64>> = (0..4).map(|_| quat_to_so3_dvec(&rot)).collect();
        let r = gyro_residual_generic(&params, [0.0, 0.0, 0.5], sample(), 4.0, false);
        // sqrt(4) * (0 - 0.5)
        assert!((r - Vec3::new(0.0, 0.0, -1.0)).norm() < 1e-12);
    }
}
