//! Spline-consistent synthetic camera and IMU data.
//!
//! The ground-truth motion is itself a [`SplineTrajectory`], so a calibrator
//! seeded with the true knots sees zero residuals. Camera observations honour
//! the rolling shutter model (pose at `t + row * line_delay`) and inertial
//! samples are rendered from the spline derivatives.

use crate::trajectory::{SplineTrajectory, TrajectoryOptions};
use anyhow::{ensure, Result};
use imucam_core::synthetic::noise::UniformNoise;
use imucam_core::synthetic::target::{add_target_tracks, grid_points_centered, make_view};
use imucam_core::{
    ms_to_seconds, seconds_to_ns, CameraIntrinsics, CameraTelemetry, Iso3, Pt3, Quat, Real,
    Reconstruction, SplineWeighting, TimeCamId, TimeWindow, TrackId, Vec2, Vec3,
};
use nalgebra::Translation3;

/// Parameters of a synthetic capture.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSceneConfig {
    /// First camera timestamp (s).
    pub start_s: Real,
    /// Time between the first and last camera frame (s).
    pub duration_s: Real,
    pub cam_fps: Real,
    pub imu_rate_hz: Real,
    /// Knot spacing of the ground-truth spline (both SO3 and R3).
    pub knot_spacing_s: Real,
    pub camera: CameraIntrinsics,
    pub grid_nx: usize,
    pub grid_ny: usize,
    pub grid_spacing: Real,
    pub imu_se3_camera: Iso3,
    /// World gravity, the accelerometer reading at rest is `R^T g`.
    pub gravity: Vec3,
    pub line_delay_s: Real,
    /// IMU clock lags the camera clock by this offset: `t_cam = t_imu + offset`.
    pub time_offset_s: Real,
    /// Additive corrections the calibrator applies (`corrected = raw + bias`).
    pub gyro_bias: Vec3,
    pub accel_bias: Vec3,
    pub pixel_noise: UniformNoise,
    pub gyro_noise: UniformNoise,
    pub accel_noise: UniformNoise,
}

impl Default for SyntheticSceneConfig {
    fn default() -> Self {
        Self {
            start_s: 10.0,
            duration_s: 2.0,
            cam_fps: 20.0,
            imu_rate_hz: 200.0,
            knot_spacing_s: 0.1,
            camera: CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0, 640, 480),
            grid_nx: 5,
            grid_ny: 4,
            grid_spacing: 0.08,
            imu_se3_camera: Iso3::from_parts(
                Translation3::new(0.02, -0.01, 0.005),
                Quat::from_scaled_axis(Vec3::new(0.02, -0.01, 0.03)),
            ),
            gravity: Vec3::new(0.0, 0.0, 9.81),
            line_delay_s: 0.0,
            time_offset_s: 0.0,
            gyro_bias: Vec3::zeros(),
            accel_bias: Vec3::zeros(),
            pixel_noise: UniformNoise::default(),
            gyro_noise: UniformNoise::default(),
            accel_noise: UniformNoise::default(),
        }
    }
}

/// Generated data plus the trajectory it was rendered from.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// Views carry the global-shutter camera pose at the frame timestamp.
    pub reconstruction: Reconstruction,
    /// Raw inertial samples on the IMU clock (milliseconds).
    pub telemetry: CameraTelemetry,
    /// Ascending camera timestamps; the last one equals the window end.
    pub camera_timestamps_s: Vec<Real>,
    pub weighting: SplineWeighting,
    pub truth: SplineTrajectory,
}

/// Smooth hand-held style motion in front of a target at `z = 0`.
fn reference_motion(tau: Real) -> (Quat, Vec3) {
    let rot = Quat::from_scaled_axis(Vec3::new(
        0.15 * (1.3 * tau).sin(),
        0.10 * (0.9 * tau + 0.5).sin(),
        0.20 * (0.7 * tau).sin(),
    ));
    let pos = Vec3::new(
        0.10 * (1.1 * tau).sin(),
        0.08 * (1.7 * tau + 0.3).sin(),
        -1.0 + 0.05 * (0.8 * tau).sin(),
    );
    (rot, pos)
}

/// Render a scene from `cfg`.
pub fn generate_scene(cfg: &SyntheticSceneConfig) -> Result<SyntheticScene> {
    ensure!(cfg.cam_fps > 0.0, "camera rate must be positive");
    ensure!(cfg.imu_rate_hz > 0.0, "IMU rate must be positive");
    ensure!(cfg.duration_s > 0.0, "duration must be positive");

    let num_frames = (cfg.duration_s * cfg.cam_fps).round() as usize;
    let camera_timestamps_s: Vec<Real> = (0..=num_frames)
        .map(|k| cfg.start_s + k as Real / cfg.cam_fps)
        .collect();
    let window = TimeWindow::new(camera_timestamps_s[0], camera_timestamps_s[num_frames]);

    let weighting = SplineWeighting {
        dt_so3: cfg.knot_spacing_s,
        dt_r3: cfg.knot_spacing_s,
        cam_fps: cfg.cam_fps,
        ..SplineWeighting::default()
    };
    let options = TrajectoryOptions {
        calibrate_line_delay: cfg.line_delay_s > 0.0,
        ..TrajectoryOptions::default()
    };
    let mut truth = SplineTrajectory::new(window, weighting, cfg.camera, options)?;
    let so3: Vec<Quat> = (0..truth.num_so3_knots())
        .map(|i| reference_motion((i as Real - 1.0) * cfg.knot_spacing_s).0)
        .collect();
    let r3: Vec<Vec3> = (0..truth.num_r3_knots())
        .map(|i| reference_motion((i as Real - 1.0) * cfg.knot_spacing_s).1)
        .collect();
    truth.init_from_knots(&so3, &r3, cfg.gravity, cfg.imu_se3_camera)?;
    if cfg.line_delay_s > 0.0 {
        truth.set_line_delay(cfg.line_delay_s)?;
    }

    let mut reconstruction = Reconstruction::new(cfg.camera);
    let points = grid_points_centered(cfg.grid_nx, cfg.grid_ny, cfg.grid_spacing);
    let ids = add_target_tracks(&mut reconstruction, &points);
    let tracks: Vec<(TrackId, Pt3)> = ids.into_iter().zip(points).collect();

    for (k, &t) in camera_timestamps_s.iter().enumerate() {
        let world_se3_camera = truth.pose_in_support(t)? * cfg.imu_se3_camera;
        let mut observations = Vec::with_capacity(tracks.len());
        for (idx, (id, pw)) in tracks.iter().enumerate() {
            if let Some(uv) = observe_rolling_shutter(&truth, t, pw)? {
                observations.push((*id, uv + cfg.pixel_noise.sample2(k, idx)));
            }
        }
        reconstruction.insert_view(make_view(
            format!("frame_{k:04}"),
            t,
            world_se3_camera,
            observations,
        ));
    }

    let mut telemetry = CameraTelemetry::default();
    let period_ms = 1000.0 / cfg.imu_rate_hz;
    let start_ms = (cfg.start_s - cfg.time_offset_s) * 1000.0;
    let num_imu = (cfg.duration_s * cfg.imu_rate_hz).ceil() as usize;
    for j in 0..=num_imu {
        let raw_ms = start_ms + j as Real * period_ms;
        let t = ms_to_seconds(raw_ms) + cfg.time_offset_s;
        if !window.contains_s(t) {
            continue;
        }
        let omega = truth.angular_velocity_at(t)?;
        let pose = truth.pose_at(t)?;
        let specific_force = pose
            .rotation
            .inverse_transform_vector(&(truth.acceleration_at(t)? + cfg.gravity));

        telemetry.gyroscope.push(
            raw_ms,
            omega - cfg.gyro_bias + cfg.gyro_noise.sample3(0, j),
        );
        telemetry.accelerometer.push(
            raw_ms,
            specific_force - cfg.accel_bias + cfg.accel_noise.sample3(1, j),
        );
    }

    Ok(SyntheticScene {
        reconstruction,
        telemetry,
        camera_timestamps_s,
        weighting,
        truth,
    })
}

/// Pixel of `pw` under the rolling shutter model, found by fixed-point
/// iteration on the observed row.
fn observe_rolling_shutter(truth: &SplineTrajectory, t: Real, pw: &Pt3) -> Result<Option<Vec2>> {
    let camera = truth.camera();
    let imu_se3_camera = truth.imu_se3_camera();
    let project = |t_row: Real| -> Result<Option<Vec2>> {
        let world_se3_camera = truth.pose_in_support(t_row)? * imu_se3_camera;
        Ok(camera.project(&world_se3_camera.inverse_transform_point(pw)))
    };

    let Some(mut uv) = project(t)? else {
        return Ok(None);
    };
    let line_delay = truth.line_delay();
    if line_delay > 0.0 {
        for _ in 0..8 {
            match project(t + uv.y * line_delay)? {
                Some(next) => uv = next,
                None => return Ok(None),
            }
        }
    }
    Ok(camera.contains(&uv).then_some(uv))
}

impl SyntheticScene {
    /// Feed every view and bias-corrected IMU sample into `traj`, using the
    /// configured clock offset and biases. Returns the number of accepted
    /// corner frames.
    pub fn fill_trajectory(
        &self,
        traj: &mut SplineTrajectory,
        time_offset_s: Real,
        gyro_bias: &Vec3,
        accel_bias: &Vec3,
    ) -> Result<usize> {
        let mut accepted = 0;
        for (_, view) in self.reconstruction.views() {
            let mut corners = Vec::with_capacity(view.num_features());
            let mut points = Vec::with_capacity(view.num_features());
            for (track_id, uv) in &view.features {
                if let Some(pw) = self.reconstruction.track(*track_id) {
                    corners.push(*uv);
                    points.push(*pw);
                }
            }
            let key = TimeCamId::from_seconds(view.timestamp_s, 0);
            if traj.add_rs_corners_measurement(key, &corners, &points)? {
                accepted += 1;
            }
        }
        for (t, m) in self.telemetry.gyroscope.samples_s() {
            traj.add_gyro_measurement(seconds_to_ns(t + time_offset_s), m + gyro_bias);
        }
        for (t, m) in self.telemetry.accelerometer.samples_s() {
            traj.add_accel_measurement(seconds_to_ns(t + time_offset_s), m + accel_bias);
        }
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_frame_lands_on_window_end() {
        let scene = generate_scene(&SyntheticSceneConfig::default()).unwrap();
        let window = scene.truth.window();
        assert_eq!(scene.camera_timestamps_s.len(), 41);
        assert_eq!(*scene.camera_timestamps_s.last().unwrap(), window.t_end_s);
        assert_eq!(scene.reconstruction.num_views(), 41);
        assert_eq!(scene.reconstruction.num_tracks(), 20);
        // Every target point is visible in every frame.
        for (_, view) in scene.reconstruction.views() {
            assert_eq!(view.num_features(), 20);
        }
    }

    #[test]
    fn imu_samples_stay_inside_window() {
        let cfg = SyntheticSceneConfig {
            time_offset_s: 0.013,
            ..SyntheticSceneConfig::default()
        };
        let scene = generate_scene(&cfg).unwrap();
        let window = scene.truth.window();
        assert!(!scene.telemetry.gyroscope.is_empty());
        assert_eq!(
            scene.telemetry.gyroscope.len(),
            scene.telemetry.accelerometer.len()
        );
        for (t, _) in scene.telemetry.gyroscope.samples_s() {
            assert!(window.contains_s(t + cfg.time_offset_s));
        }
    }

    #[test]
    fn accelerometer_reads_gravity_in_body_frame() {
        let scene = generate_scene(&SyntheticSceneConfig::default()).unwrap();
        let (t, m) = scene.telemetry.accelerometer.samples_s().next().unwrap();
        let pose = scene.truth.pose_at(t).unwrap();
        let accel = scene.truth.acceleration_at(t).unwrap();
        let expected = pose
            .rotation
            .inverse_transform_vector(&(accel + Vec3::new(0.0, 0.0, 9.81)));
        assert!((m - expected).norm() < 1e-12);
    }

    #[test]
    fn rolling_shutter_rows_are_self_consistent() {
        let cfg = SyntheticSceneConfig {
            line_delay_s: 2.0e-5,
            ..SyntheticSceneConfig::default()
        };
        let scene = generate_scene(&cfg).unwrap();
        let view = scene.reconstruction.views().nth(7).unwrap().1;
        let (track_id, uv) = view.features.iter().next().unwrap();
        let pw = scene.reconstruction.track(*track_id).unwrap();
        let pose = scene
            .truth
            .pose_in_support(view.timestamp_s + uv.y * cfg.line_delay_s)
            .unwrap()
            * cfg.imu_se3_camera;
        let reprojected = cfg
            .camera
            .project(&pose.inverse_transform_point(pw))
            .unwrap();
        assert!((reprojected - uv).norm() < 1e-6);
    }
}
