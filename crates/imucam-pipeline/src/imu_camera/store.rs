//! Time-indexed measurement maps for one calibration run.

use imucam_core::{
    ms_to_seconds, seconds_to_ns, ImuSeries, Iso3, Pt3, Reconstruction, TimeCamId, TimeWindow,
    TrackId, Vec2, Vec3,
};
use log::debug;
use std::collections::BTreeMap;

/// Corners of one frame with their target tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerObservation {
    pub track_ids: Vec<TrackId>,
    pub corners: Vec<Vec2>,
    /// 3D target points, resolved from `track_ids` at ingestion.
    pub points: Vec<Pt3>,
}

impl CornerObservation {
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }
}

/// Measurements accepted into the calibration window.
///
/// Frame data is keyed by [`TimeCamId`], inertial samples by their corrected
/// timestamp in nanoseconds. Window membership is decided on those rounded
/// keys, so every stored key satisfies `t0_ns <= t < t_end_ns`. All maps
/// iterate in time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementStore {
    corners: BTreeMap<TimeCamId, CornerObservation>,
    /// `world_se3_camera` of each frame, as supplied by the reconstruction.
    calib_init_poses: BTreeMap<TimeCamId, Iso3>,
    /// `world_se3_imu` derived from `calib_init_poses` and the current
    /// camera-to-IMU estimate.
    spline_init_poses: BTreeMap<TimeCamId, Iso3>,
    accel: BTreeMap<i64, Vec3>,
    gyro: BTreeMap<i64, Vec3>,
}

impl MeasurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take corners and initial poses of every in-window frame.
    ///
    /// Frames outside `window` are skipped. Frames without an estimated pose
    /// contribute corners only. Returns the number of accepted frames.
    pub fn ingest(&mut self, reconstruction: &Reconstruction, window: &TimeWindow) -> usize {
        let mut accepted = 0;
        for (view_id, view) in reconstruction.views() {
            let key = TimeCamId::from_seconds(view.timestamp_s, 0);
            if !window.contains_ns(key.t_ns) {
                debug!(
                    "view {} ({}) at {:.6} s outside window, skipped",
                    view_id, view.name, view.timestamp_s
                );
                continue;
            }

            let mut obs = CornerObservation {
                track_ids: Vec::with_capacity(view.num_features()),
                corners: Vec::with_capacity(view.num_features()),
                points: Vec::with_capacity(view.num_features()),
            };
            for (track_id, uv) in &view.features {
                if let Some(pw) = reconstruction.track(*track_id) {
                    obs.track_ids.push(*track_id);
                    obs.corners.push(*uv);
                    obs.points.push(*pw);
                }
            }
            self.corners.insert(key, obs);

            if view.estimated {
                self.calib_init_poses.insert(key, view.world_se3_camera);
            } else {
                debug!("view {} has no estimated pose", view_id);
            }
            accepted += 1;
        }
        accepted
    }

    /// Store bias- and clock-corrected accelerometer samples.
    pub fn ingest_accel(
        &mut self,
        series: &ImuSeries,
        bias: &Vec3,
        time_offset_s: f64,
        window: &TimeWindow,
    ) -> usize {
        ingest_series(&mut self.accel, series, bias, time_offset_s, window)
    }

    /// Store bias- and clock-corrected gyroscope samples.
    pub fn ingest_gyro(
        &mut self,
        series: &ImuSeries,
        bias: &Vec3,
        time_offset_s: f64,
        window: &TimeWindow,
    ) -> usize {
        ingest_series(&mut self.gyro, series, bias, time_offset_s, window)
    }

    /// Rebuild the IMU-frame initial poses from the camera poses.
    pub fn derive_imu_poses(&mut self, imu_se3_camera: &Iso3) {
        let camera_se3_imu = imu_se3_camera.inverse();
        self.spline_init_poses = self
            .calib_init_poses
            .iter()
            .map(|(key, world_se3_camera)| (*key, world_se3_camera * camera_se3_imu))
            .collect();
    }

    pub fn corners(&self) -> &BTreeMap<TimeCamId, CornerObservation> {
        &self.corners
    }

    pub fn calib_init_poses(&self) -> &BTreeMap<TimeCamId, Iso3> {
        &self.calib_init_poses
    }

    pub fn spline_init_poses(&self) -> &BTreeMap<TimeCamId, Iso3> {
        &self.spline_init_poses
    }

    pub fn accel(&self) -> &BTreeMap<i64, Vec3> {
        &self.accel
    }

    pub fn gyro(&self) -> &BTreeMap<i64, Vec3> {
        &self.gyro
    }

    pub fn num_corners(&self) -> usize {
        self.corners.values().map(CornerObservation::len).sum()
    }
}

fn ingest_series(
    target: &mut BTreeMap<i64, Vec3>,
    series: &ImuSeries,
    bias: &Vec3,
    time_offset_s: f64,
    window: &TimeWindow,
) -> usize {
    let mut accepted = 0;
    for (t_ms, m) in series.timestamp_ms.iter().zip(&series.measurement) {
        let t_ns = seconds_to_ns(ms_to_seconds(*t_ms) + time_offset_s);
        if !window.contains_ns(t_ns) {
            continue;
        }
        // Duplicate stamps: last sample wins.
        target.insert(t_ns, m + bias);
        accepted += 1;
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use imucam_core::{CameraIntrinsics, View};
    use nalgebra::{Translation3, UnitQuaternion};

    fn reconstruction() -> Reconstruction {
        let mut recon =
            Reconstruction::new(CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0, 640, 480));
        let a = recon.add_track(Pt3::new(0.0, 0.0, 0.0));
        let b = recon.add_track(Pt3::new(0.1, 0.0, 0.0));
        for (i, t) in [1.0, 1.5, 2.0].into_iter().enumerate() {
            let mut view = View::new(format!("v{i}"), t);
            view.world_se3_camera =
                Iso3::from_parts(Translation3::new(0.0, 0.0, -1.0 - t), UnitQuaternion::identity());
            view.estimated = i != 1;
            view.features.insert(a, Vec2::new(320.0, 240.0));
            view.features.insert(b, Vec2::new(370.0, 240.0));
            recon.insert_view(view);
        }
        recon
    }

    #[test]
    fn ingest_respects_half_open_window() {
        let mut store = MeasurementStore::new();
        let accepted = store.ingest(&reconstruction(), &TimeWindow::new(1.0, 2.0));
        assert_eq!(accepted, 2);
        assert!(store.corners().contains_key(&TimeCamId::from_seconds(1.0, 0)));
        assert!(!store.corners().contains_key(&TimeCamId::from_seconds(2.0, 0)));
        // The 1.5 s view has no estimated pose.
        assert_eq!(store.calib_init_poses().len(), 1);
        assert_eq!(store.num_corners(), 4);
        let obs = &store.corners()[&TimeCamId::from_seconds(1.5, 0)];
        assert_eq!(obs.points[1], Pt3::new(0.1, 0.0, 0.0));
    }

    #[test]
    fn inertial_samples_are_corrected() {
        let series = ImuSeries::new(
            vec![900.0, 1000.0, 1500.0, 1950.0],
            vec![Vec3::new(1.0, 0.0, 0.0); 4],
        )
        .unwrap();
        let mut store = MeasurementStore::new();
        let bias = Vec3::new(0.5, 0.0, -1.0);
        let n = store.ingest_gyro(&series, &bias, 0.05, &TimeWindow::new(1.0, 2.0));
        // 0.95 s is before the window, 2.0 s is its excluded end.
        assert_eq!(n, 2);
        let keys: Vec<i64> = store.gyro().keys().copied().collect();
        assert_eq!(keys, vec![1_050_000_000, 1_550_000_000]);
        assert_eq!(store.gyro()[&1_050_000_000], Vec3::new(1.5, 0.0, -1.0));
        assert!(store.accel().is_empty());
    }

    #[test]
    fn window_edges_are_decided_on_nanosecond_keys() {
        let series = ImuSeries::new(vec![1000.0, 2000.0], vec![Vec3::z(); 2]).unwrap();
        let window = TimeWindow::new(1.0, 2.0);
        let mut store = MeasurementStore::new();
        // Both samples land 0.2 ns early and round back onto the edges.
        let n = store.ingest_gyro(&series, &Vec3::zeros(), -2e-10, &window);
        assert_eq!(n, 1);
        let keys: Vec<i64> = store.gyro().keys().copied().collect();
        assert_eq!(keys, vec![1_000_000_000]);
        assert!(keys.iter().all(|t| window.contains_ns(*t)));
    }

    #[test]
    fn imu_poses_follow_extrinsics() {
        let mut store = MeasurementStore::new();
        store.ingest(&reconstruction(), &TimeWindow::new(1.0, 2.0));
        let imu_se3_camera =
            Iso3::from_parts(Translation3::new(0.1, 0.0, 0.0), UnitQuaternion::identity());
        store.derive_imu_poses(&imu_se3_camera);
        let key = TimeCamId::from_seconds(1.0, 0);
        let world_se3_imu = store.spline_init_poses()[&key];
        let back = world_se3_imu * imu_se3_camera;
        assert!((back.translation.vector - store.calib_init_poses()[&key].translation.vector).norm() < 1e-12);
        assert!((world_se3_imu.translation.vector.x + 0.1).abs() < 1e-12);
    }
}
