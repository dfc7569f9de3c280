//! Gravity initialization from a single static-looking accelerometer sample.

use imucam_core::{ms_to_seconds, ImuSeries, Iso3, TimeCamId, Vec3};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum distance between a camera frame and the accelerometer sample used
/// for gravity initialization.
pub const GRAVITY_MATCH_TOLERANCE_S: f64 = 1.0 / 30.0;

/// Gravity estimate and the pair of timestamps it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GravityMatch {
    /// Gravity in the world frame.
    pub gravity: Vec3,
    pub camera_time_s: f64,
    /// Raw accelerometer timestamp (IMU clock).
    pub accel_time_s: f64,
}

/// Rotate the first accelerometer sample close to a posed camera frame into
/// the world frame.
///
/// Camera timestamps are visited in order; for each one with a registered
/// `world_se3_imu` pose, accelerometer samples are scanned for one whose raw
/// timestamp lies within [`GRAVITY_MATCH_TOLERANCE_S`]. The first match over
/// the whole sweep is used. Returns `None` when nothing matches.
pub fn initialize_gravity(
    camera_timestamps_s: &[f64],
    world_se3_imu: &BTreeMap<TimeCamId, Iso3>,
    accel: &ImuSeries,
    accel_bias: &Vec3,
) -> Option<GravityMatch> {
    for &t_cam in camera_timestamps_s {
        let key = TimeCamId::from_seconds(t_cam, 0);
        let Some(pose) = world_se3_imu.get(&key) else {
            debug!("no initial pose at {:.6} s, skipped for gravity", t_cam);
            continue;
        };
        for (t_ms, m) in accel.timestamp_ms.iter().zip(&accel.measurement) {
            let t_accel = ms_to_seconds(*t_ms);
            if (t_accel - t_cam).abs() < GRAVITY_MATCH_TOLERANCE_S {
                let gravity = pose.rotation * (m + accel_bias);
                info!(
                    "gravity initialized to [{:.4}, {:.4}, {:.4}] from frame {:.6} s / accel {:.6} s",
                    gravity.x, gravity.y, gravity.z, t_cam, t_accel
                );
                return Some(GravityMatch {
                    gravity,
                    camera_time_s: t_cam,
                    accel_time_s: t_accel,
                });
            }
        }
    }
    warn!("no accelerometer sample close to a posed camera frame, gravity not initialized");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Translation3, UnitQuaternion};

    fn poses_at(t: f64, pose: Iso3) -> BTreeMap<TimeCamId, Iso3> {
        BTreeMap::from([(TimeCamId::from_seconds(t, 0), pose)])
    }

    #[test]
    fn sample_within_tolerance_sets_gravity() {
        let accel = ImuSeries::new(vec![10_020.0], vec![Vec3::new(0.0, 0.0, 9.81)]).unwrap();
        let found = initialize_gravity(
            &[10.0],
            &poses_at(10.0, Iso3::identity()),
            &accel,
            &Vec3::zeros(),
        )
        .unwrap();
        assert_eq!(found.gravity, Vec3::new(0.0, 0.0, 9.81));
        assert_eq!(found.camera_time_s, 10.0);
        assert!((found.accel_time_s - 10.02).abs() < 1e-12);
    }

    #[test]
    fn sample_outside_tolerance_is_ignored() {
        let accel = ImuSeries::new(vec![10_500.0], vec![Vec3::new(0.0, 0.0, 9.81)]).unwrap();
        let found = initialize_gravity(
            &[10.0],
            &poses_at(10.0, Iso3::identity()),
            &accel,
            &Vec3::zeros(),
        );
        assert!(found.is_none());
    }

    #[test]
    fn first_match_wins_and_is_rotated() {
        let rot = UnitQuaternion::from_scaled_axis(Vec3::new(std::f64::consts::FRAC_PI_2, 0.0, 0.0));
        let mut poses = poses_at(1.0, Iso3::from_parts(Translation3::identity(), rot));
        poses.insert(TimeCamId::from_seconds(2.0, 0), Iso3::identity());
        let accel = ImuSeries::new(
            vec![1000.0, 2000.0],
            vec![Vec3::new(0.0, 9.0, 0.0), Vec3::new(0.0, 0.0, 9.81)],
        )
        .unwrap();
        let bias = Vec3::new(0.0, 0.81, 0.0);
        let found = initialize_gravity(&[1.0, 2.0], &poses, &accel, &bias).unwrap();
        assert_eq!(found.camera_time_s, 1.0);
        assert!((found.gravity - Vec3::new(0.0, 0.0, 9.81)).norm() < 1e-12);
    }

    #[test]
    fn frames_without_pose_are_skipped() {
        let accel = ImuSeries::new(vec![1000.0, 2000.0], vec![Vec3::z(); 2]).unwrap();
        let found =
            initialize_gravity(&[1.0, 2.0], &poses_at(2.0, Iso3::identity()), &accel, &Vec3::zeros())
                .unwrap();
        assert_eq!(found.camera_time_s, 2.0);
    }
}
