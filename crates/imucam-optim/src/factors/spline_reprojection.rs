//! Rolling-shutter reprojection against the spline trajectory.

use crate::ir::SegmentSample;
use crate::math::projection::project_pinhole_dist;
use crate::math::so3::{quat_from_params, vec3_from_params};
use crate::math::spline::{r3_segment, so3_segment_rotation};
use nalgebra::{DVector, RealField, SVector, UnitQuaternion, Vector3};

/// Constant data of one corner observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsCornerData {
    /// Target point in world coordinates.
    pub pw: [f64; 3],
    /// Observed pixel.
    pub uv: [f64; 2],
    /// Image row used for the rolling-shutter time shift.
    pub row: f64,
    pub so3: SegmentSample,
    pub r3: SegmentSample,
    pub intrinsics: [f64; 4],
    pub distortion: [f64; 5],
    pub w: f64,
}

/// Rolling-shutter reprojection residual.
///
/// Parameter layout: `[so3 x4, r3 x4, imu_se3_camera, line_delay]`.
/// The IMU pose is evaluated at `u + row * line_delay / dt` on both splines,
/// the target point is mapped `world -> imu -> camera` and projected with the
/// fixed intrinsics. The residual is `sqrt(w) * (uv - projection)`.
pub(crate) fn rs_reproj_residual_generic<T: RealField>(
    params: &[DVector<T>],
    obs: &RsCornerData,
) -> SVector<T, 2> {
    debug_assert_eq!(params.len(), 10, "expected [so3 x4, r3 x4, extr, line_delay]");

    let line_delay = params[9][0].clone();
    let row = T::from_f64(obs.row).unwrap();
    let shift = row * line_delay;

    let u_so3 =
        T::from_f64(obs.so3.u).unwrap() + shift.clone() * T::from_f64(obs.so3.inv_dt).unwrap();
    let u_r3 = T::from_f64(obs.r3.u).unwrap() + shift * T::from_f64(obs.r3.inv_dt).unwrap();

    let so3_knots: [UnitQuaternion<T>; 4] =
        std::array::from_fn(|i| quat_from_params(params[i].as_view()));
    let r3_knots: [Vector3<T>; 4] =
        std::array::from_fn(|i| vec3_from_params(params[4 + i].as_view()));

    let rot_w_i = so3_segment_rotation(&so3_knots, u_so3);
    let (p_w_i, _, _) = r3_segment(&r3_knots, u_r3, T::from_f64(obs.r3.inv_dt).unwrap());

    let extr = &params[8];
    let rot_i_c = quat_from_params(extr.rows(0, 4));
    let t_i_c = vec3_from_params(extr.rows(4, 3));

    let pw = Vector3::new(
        T::from_f64(obs.pw[0]).unwrap(),
        T::from_f64(obs.pw[1]).unwrap(),
        T::from_f64(obs.pw[2]).unwrap(),
    );
    let p_i = rot_w_i.inverse_transform_vector(&(pw - p_w_i));
    let p_c = rot_i_c.inverse_transform_vector(&(p_i - t_i_c));

    let proj = project_pinhole_dist(obs.intrinsics, obs.distortion, p_c);
    let sqrt_w = T::from_f64(obs.w.sqrt()).unwrap();
    let ru = (T::from_f64(obs.uv[0]).unwrap() - proj.x.clone()) * sqrt_w.clone();
    let rv = (T::from_f64(obs.uv[1]).unwrap() - proj.y.clone()) * sqrt_w;
    SVector::<T, 2>::new(ru, rv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::pose_se3::{iso3_to_se3_dvec, quat_to_so3_dvec};
    use crate::params::vec3::vec3_to_dvec;
    use imucam_core::{CameraIntrinsics, Iso3, Pt3, Quat, Vec3};
    use nalgebra::Translation3;

    #[test]
    fn zero_for_consistent_observation() {
        let camera = CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0, 640, 480);
        // Constant pose spline: all knots equal.
        let rot = Quat::from_scaled_axis(Vec3::new(0.05, -0.02, 0.1));
        let pos = Vec3::new(0.0, 0.0, -1.0);
        let extr = Iso3::from_parts(
            Translation3::new(0.01, 0.02, 0.0),
            Quat::from_scaled_axis(Vec3::new(0.0, 0.0, 0.02)),
        );

        let pw = Pt3::new(0.05, -0.03, 0.0);
        let world_se3_camera = Iso3::from_parts(pos.into(), rot) * extr;
        let uv = camera
            .project(&world_se3_camera.inverse_transform_point(&pw))
            .unwrap();

        let mut params: Vec<DVector<f64>> = Vec::new();
        params.extend((0..4).map(|_| quat_to_so3_dvec(&rot)));
        params.extend((0..4).map(|_| vec3_to_dvec(&pos)));
        params.push(iso3_to_se3_dvec(&extr));
        params.push(nalgebra::dvector![1.0e-5]);

        let sample = SegmentSample { u: 0.3, inv_dt: 10.0 };
        let obs = RsCornerData {
            pw: [pw.x, pw.y, pw.z],
            uv: [uv.x, uv.y],
            row: uv.y,
            so3: sample,
            r3: sample,
            intrinsics: camera.k_array(),
            distortion: camera.distortion.to_array(),
            w: 1.0,
        };
        let r = rs_reproj_residual_generic(&params, &obs);
        assert!(r.norm() < 1e-6, "residual {r:?}");

        // Moving the observation by one pixel shows up in the residual.
        let shifted = RsCornerData {
            uv: [uv.x + 1.0, uv.y],
            w: 4.0,
            ..obs
        };
        let r = rs_reproj_residual_generic(&params, &shifted);
        assert!((r.x - 2.0).abs() < 1e-6);
    }
}
