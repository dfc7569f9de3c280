//! Camera-IMU calibration state machine.

use super::gravity::{initialize_gravity, GravityMatch, GRAVITY_MATCH_TOLERANCE_S};
use super::store::MeasurementStore;
use crate::error::CalibrationError;
use imucam_core::{
    CameraTelemetry, Iso3, Real, Reconstruction, SplineWeighting, TimeWindow, Vec3, View,
};
use imucam_optim::{
    BackendSolveOptions, ReprojectionErrors, RobustLoss, SolveSummary, SplineTrajectory,
    TrajectoryOptions,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Stage of an [`ImuCameraCalibrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationStage {
    Empty,
    /// Spline built and measurements loaded.
    Initialized,
    GravitySet,
    Optimized,
    Exported,
}

/// Options of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuCameraCalibratorOptions {
    /// Estimate the rolling-shutter line delay; otherwise it stays exactly 0.
    pub calibrate_cam_line_delay: bool,
    /// Add IMU bias blocks to the solve.
    pub reestimate_biases: bool,
    pub reprojection_loss: RobustLoss,
    /// Solver verbosity.
    pub verbosity: usize,
}

impl Default for ImuCameraCalibratorOptions {
    fn default() -> Self {
        Self {
            calibrate_cam_line_delay: false,
            reestimate_biases: false,
            reprojection_loss: RobustLoss::None,
            verbosity: 0,
        }
    }
}

impl ImuCameraCalibratorOptions {
    fn trajectory_options(&self) -> TrajectoryOptions {
        TrajectoryOptions {
            calibrate_line_delay: self.calibrate_cam_line_delay,
            reestimate_biases: self.reestimate_biases,
            reprojection_loss: self.reprojection_loss,
        }
    }
}

/// Initial guesses and fixed corrections for the IMU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuCameraInit {
    pub imu_se3_camera: Iso3,
    /// Added to raw IMU timestamps to bring them onto the camera clock.
    pub time_offset_imu_to_cam_s: Real,
    /// Added to raw gyroscope samples.
    pub gyro_bias: Vec3,
    /// Added to raw accelerometer samples.
    pub accel_bias: Vec3,
}

impl Default for ImuCameraInit {
    fn default() -> Self {
        Self {
            imu_se3_camera: Iso3::identity(),
            time_offset_imu_to_cam_s: 0.0,
            gyro_bias: Vec3::zeros(),
            accel_bias: Vec3::zeros(),
        }
    }
}

/// Snapshot of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuCameraCalibrationReport {
    pub stage: CalibrationStage,
    pub window: TimeWindow,
    pub imu_se3_camera: Iso3,
    pub line_delay_s: Real,
    pub gravity: Option<Vec3>,
    /// Total additive gyroscope correction (`true = raw + gyro_bias`).
    pub gyro_bias: Vec3,
    /// Total additive accelerometer correction (`true = raw + accel_bias`).
    pub accel_bias: Vec3,
    pub num_so3_knots: usize,
    pub num_r3_knots: usize,
    pub num_corner_frames: usize,
    pub num_corners: usize,
    pub num_accel_samples: usize,
    pub num_gyro_samples: usize,
    pub gravity_match: Option<GravityMatch>,
    pub solve: Option<SolveSummary>,
    pub reprojection: Option<ReprojectionErrors>,
}

/// Continuous-time camera-IMU calibrator.
///
/// ```text
/// Empty -> Initialized -> GravitySet -> Optimized -> Exported
/// ```
///
/// `optimize` may be repeated from `GravitySet`, `Optimized` or `Exported`;
/// each call continues from the current knots. `clear` returns to `Empty`
/// from any stage. Failed operations leave the calibrator unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuCameraCalibrator {
    options: ImuCameraCalibratorOptions,
    stage: CalibrationStage,
    camera_timestamps_s: Vec<Real>,
    window: Option<TimeWindow>,
    init: ImuCameraInit,
    store: MeasurementStore,
    trajectory: Option<SplineTrajectory>,
    gravity_match: Option<GravityMatch>,
    last_summary: Option<SolveSummary>,
    last_errors: Option<ReprojectionErrors>,
}

struct Prepared {
    timestamps: Vec<Real>,
    window: TimeWindow,
    store: MeasurementStore,
    trajectory: SplineTrajectory,
}

impl ImuCameraCalibrator {
    pub fn new(options: ImuCameraCalibratorOptions) -> Self {
        Self {
            options,
            stage: CalibrationStage::Empty,
            camera_timestamps_s: Vec::new(),
            window: None,
            init: ImuCameraInit::default(),
            store: MeasurementStore::new(),
            trajectory: None,
            gravity_match: None,
            last_summary: None,
            last_errors: None,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Build the spline over the camera timestamps and load all measurements.
    ///
    /// Knots are initialized from the reconstruction's camera poses mapped
    /// into the IMU frame with `init.imu_se3_camera`.
    pub fn init_spline(
        &mut self,
        reconstruction: &Reconstruction,
        telemetry: &CameraTelemetry,
        camera_timestamps_s: &[Real],
        weighting: &SplineWeighting,
        init: ImuCameraInit,
    ) -> Result<(), CalibrationError> {
        self.require_stage("init_spline", &[CalibrationStage::Empty])?;
        let mut prepared = self.prepare(
            reconstruction,
            telemetry,
            camera_timestamps_s,
            weighting,
            &init,
            &init.imu_se3_camera,
        )?;
        prepared
            .trajectory
            .init_knots_from_poses(prepared.store.spline_init_poses())?;
        load_measurements(&mut prepared)?;

        self.commit(prepared, init);
        self.stage = CalibrationStage::Initialized;
        Ok(())
    }

    /// Like [`init_spline`](Self::init_spline), but seed knots, gravity and
    /// camera-to-IMU from a previously calibrated trajectory.
    ///
    /// The previous trajectory must cover the same window with the same knot
    /// spacing. Gravity counts as set afterwards.
    pub fn init_spline_from_spline(
        &mut self,
        reconstruction: &Reconstruction,
        telemetry: &CameraTelemetry,
        camera_timestamps_s: &[Real],
        weighting: &SplineWeighting,
        init: ImuCameraInit,
        previous: &SplineTrajectory,
    ) -> Result<(), CalibrationError> {
        self.require_stage("init_spline_from_spline", &[CalibrationStage::Empty])?;
        let gravity = previous
            .gravity()
            .ok_or(CalibrationError::GravityNotInitialized)?;
        let mut prepared = self.prepare(
            reconstruction,
            telemetry,
            camera_timestamps_s,
            weighting,
            &init,
            previous.imu_se3_camera(),
        )?;
        prepared
            .trajectory
            .init_from_knots(
                previous.so3_knots(),
                previous.r3_knots(),
                gravity,
                *previous.imu_se3_camera(),
            )
            .map_err(|e| CalibrationError::InvalidInput(e.to_string()))?;
        if self.options.calibrate_cam_line_delay && previous.line_delay() > 0.0 {
            prepared.trajectory.set_line_delay(previous.line_delay())?;
        }
        prepared
            .trajectory
            .set_biases(*previous.gyro_bias(), *previous.accel_bias());
        load_measurements(&mut prepared)?;

        self.commit(prepared, init);
        self.stage = CalibrationStage::GravitySet;
        Ok(())
    }

    /// Initialize gravity from the first accelerometer sample close to a
    /// posed camera frame.
    pub fn initialize_gravity(
        &mut self,
        telemetry: &CameraTelemetry,
    ) -> Result<Vec3, CalibrationError> {
        let stage = self.require_stage(
            "initialize_gravity",
            &[CalibrationStage::Initialized, CalibrationStage::GravitySet],
        )?;
        let found = initialize_gravity(
            &self.camera_timestamps_s,
            self.store.spline_init_poses(),
            &telemetry.accelerometer,
            &self.init.accel_bias,
        )
        .ok_or(CalibrationError::GravityUnavailable {
            tolerance_s: GRAVITY_MATCH_TOLERANCE_S,
        })?;
        let trajectory = self.trajectory.as_mut().ok_or(CalibrationError::InvalidStage {
            operation: "initialize_gravity",
            stage,
        })?;
        trajectory.set_gravity(found.gravity);
        self.gravity_match = Some(found);
        self.stage = CalibrationStage::GravitySet;
        Ok(found.gravity)
    }

    /// Run at most `iterations` solver iterations from the current state and
    /// return the mean reprojection errors.
    pub fn optimize(&mut self, iterations: usize) -> Result<ReprojectionErrors, CalibrationError> {
        match self.stage {
            CalibrationStage::Initialized => return Err(CalibrationError::GravityNotInitialized),
            CalibrationStage::Empty => {
                return Err(CalibrationError::InvalidStage {
                    operation: "optimize",
                    stage: self.stage,
                })
            }
            _ => {}
        }
        let stage = self.stage;
        let trajectory = self.trajectory.as_mut().ok_or(CalibrationError::InvalidStage {
            operation: "optimize",
            stage,
        })?;
        if trajectory.gravity().is_none() {
            return Err(CalibrationError::GravityNotInitialized);
        }

        let opts = BackendSolveOptions {
            max_iters: iterations,
            verbosity: self.options.verbosity,
            ..BackendSolveOptions::default()
        };
        let summary = trajectory.optimize(&opts)?;
        let errors = trajectory.mean_reprojection_errors();
        info!(
            "mean reprojection error {:.4} px, rolling shutter {:.4} px, line delay {:.3} us",
            errors.mean_reprojection,
            errors.mean_rs_reprojection,
            trajectory.line_delay() * 1e6
        );
        self.store.derive_imu_poses(trajectory.imu_se3_camera());

        self.last_summary = Some(summary);
        self.last_errors = Some(errors);
        self.stage = CalibrationStage::Optimized;
        Ok(errors)
    }

    /// Toggle bias re-estimation for subsequent `optimize` calls.
    pub fn set_reestimate_biases(&mut self, enabled: bool) {
        self.options.reestimate_biases = enabled;
        if let Some(trajectory) = self.trajectory.as_mut() {
            trajectory.set_reestimate_biases(enabled);
        }
    }

    /// Write one estimated view per camera timestamp into `output`.
    ///
    /// Views carry the camera pose `world_se3_imu(t) * imu_se3_camera`.
    /// Returns the number of views written.
    pub fn to_output_dataset(&mut self, output: &mut Reconstruction) -> Result<usize, CalibrationError> {
        let stage = self.require_stage(
            "to_output_dataset",
            &[CalibrationStage::Optimized, CalibrationStage::Exported],
        )?;
        let trajectory = self.trajectory.as_ref().ok_or(CalibrationError::InvalidStage {
            operation: "to_output_dataset",
            stage,
        })?;

        let mut views = Vec::with_capacity(self.camera_timestamps_s.len());
        for (k, &t) in self.camera_timestamps_s.iter().enumerate() {
            let world_se3_imu = match trajectory.pose_in_support(t) {
                Ok(pose) => pose,
                Err(e) => {
                    warn!("no spline pose for frame at {:.6} s: {}", t, e);
                    continue;
                }
            };
            let mut view = View::new(format!("spline_{k:05}"), t);
            view.world_se3_camera = world_se3_imu * trajectory.imu_se3_camera();
            view.estimated = true;
            views.push(view);
        }

        let count = views.len();
        for view in views {
            output.insert_view(view);
        }
        debug!("exported {} spline views", count);
        self.stage = CalibrationStage::Exported;
        Ok(count)
    }

    /// Drop all measurements and the trajectory. Options are kept.
    pub fn clear(&mut self) {
        *self = Self::new(self.options);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn stage(&self) -> CalibrationStage {
        self.stage
    }

    pub fn options(&self) -> &ImuCameraCalibratorOptions {
        &self.options
    }

    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    /// Sorted camera timestamps of the run.
    pub fn camera_timestamps_s(&self) -> &[Real] {
        &self.camera_timestamps_s
    }

    pub fn store(&self) -> &MeasurementStore {
        &self.store
    }

    pub fn trajectory(&self) -> Option<&SplineTrajectory> {
        self.trajectory.as_ref()
    }

    pub fn gravity_match(&self) -> Option<&GravityMatch> {
        self.gravity_match.as_ref()
    }

    pub fn last_summary(&self) -> Option<&SolveSummary> {
        self.last_summary.as_ref()
    }

    pub fn last_errors(&self) -> Option<&ReprojectionErrors> {
        self.last_errors.as_ref()
    }

    /// Summary of the current state; fails before the spline is built.
    pub fn report(&self) -> Result<ImuCameraCalibrationReport, CalibrationError> {
        let (Some(trajectory), Some(window)) = (self.trajectory.as_ref(), self.window) else {
            return Err(CalibrationError::InvalidStage {
                operation: "report",
                stage: self.stage,
            });
        };
        Ok(ImuCameraCalibrationReport {
            stage: self.stage,
            window,
            imu_se3_camera: *trajectory.imu_se3_camera(),
            line_delay_s: trajectory.line_delay(),
            gravity: trajectory.gravity(),
            gyro_bias: self.init.gyro_bias - trajectory.gyro_bias(),
            accel_bias: self.init.accel_bias - trajectory.accel_bias(),
            num_so3_knots: trajectory.num_so3_knots(),
            num_r3_knots: trajectory.num_r3_knots(),
            num_corner_frames: trajectory.corner_frames().len(),
            num_corners: trajectory.num_corners(),
            num_accel_samples: trajectory.accel_samples().len(),
            num_gyro_samples: trajectory.gyro_samples().len(),
            gravity_match: self.gravity_match,
            solve: self.last_summary.clone(),
            reprojection: self.last_errors,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn require_stage(
        &self,
        operation: &'static str,
        allowed: &[CalibrationStage],
    ) -> Result<CalibrationStage, CalibrationError> {
        if allowed.contains(&self.stage) {
            Ok(self.stage)
        } else {
            Err(CalibrationError::InvalidStage {
                operation,
                stage: self.stage,
            })
        }
    }

    /// Validate inputs, derive the window and build store and trajectory
    /// without touching `self`.
    fn prepare(
        &self,
        reconstruction: &Reconstruction,
        telemetry: &CameraTelemetry,
        camera_timestamps_s: &[Real],
        weighting: &SplineWeighting,
        init: &ImuCameraInit,
        imu_se3_camera: &Iso3,
    ) -> Result<Prepared, CalibrationError> {
        if camera_timestamps_s.is_empty() {
            return Err(CalibrationError::EmptyCameraTimestamps);
        }
        if camera_timestamps_s.iter().any(|t| !t.is_finite()) {
            return Err(CalibrationError::InvalidInput(
                "camera timestamps must be finite".to_string(),
            ));
        }
        reconstruction
            .validate()
            .map_err(|e| CalibrationError::InvalidInput(e.to_string()))?;
        telemetry
            .validate()
            .map_err(|e| CalibrationError::InvalidInput(e.to_string()))?;
        weighting
            .validate()
            .map_err(|e| CalibrationError::InvalidInput(e.to_string()))?;

        let mut timestamps = camera_timestamps_s.to_vec();
        timestamps.sort_by(|a, b| a.total_cmp(b));
        let window = TimeWindow::from_sorted_timestamps(&timestamps)
            .ok_or(CalibrationError::EmptyCameraTimestamps)?;

        let offset = init.time_offset_imu_to_cam_s;
        let mut store = MeasurementStore::new();
        let frames = store.ingest(reconstruction, &window);
        let accel = store.ingest_accel(&telemetry.accelerometer, &init.accel_bias, offset, &window);
        let gyro = store.ingest_gyro(&telemetry.gyroscope, &init.gyro_bias, offset, &window);
        store.derive_imu_poses(imu_se3_camera);
        info!(
            "ingested {} frames, {} accel and {} gyro samples",
            frames, accel, gyro
        );

        let mut trajectory = SplineTrajectory::new(
            window,
            *weighting,
            reconstruction.camera,
            self.options.trajectory_options(),
        )?;
        trajectory.set_imu_se3_camera(*imu_se3_camera);

        Ok(Prepared {
            timestamps,
            window,
            store,
            trajectory,
        })
    }

    fn commit(&mut self, prepared: Prepared, init: ImuCameraInit) {
        self.camera_timestamps_s = prepared.timestamps;
        self.window = Some(prepared.window);
        self.init = init;
        self.store = prepared.store;
        self.trajectory = Some(prepared.trajectory);
        self.gravity_match = None;
        self.last_summary = None;
        self.last_errors = None;
    }
}

fn load_measurements(prepared: &mut Prepared) -> Result<(), CalibrationError> {
    let trajectory = &mut prepared.trajectory;
    let mut rejected = 0usize;
    for (key, obs) in prepared.store.corners() {
        if !trajectory.add_rs_corners_measurement(*key, &obs.corners, &obs.points)? {
            rejected += 1;
        }
    }
    for (t_ns, value) in prepared.store.accel() {
        if !trajectory.add_accel_measurement(*t_ns, *value) {
            rejected += 1;
        }
    }
    for (t_ns, value) in prepared.store.gyro() {
        if !trajectory.add_gyro_measurement(*t_ns, *value) {
            rejected += 1;
        }
    }
    if rejected > 0 {
        return Err(CalibrationError::InvalidInput(format!(
            "{rejected} stored measurements fall outside the spline window"
        )));
    }
    debug!(
        "loaded {} corners, {} accel and {} gyro samples into the spline",
        trajectory.num_corners(),
        trajectory.accel_samples().len(),
        trajectory.gyro_samples().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imucam_core::ImuSeries;

    fn empty_reconstruction() -> Reconstruction {
        Reconstruction::new(imucam_core::CameraIntrinsics::pinhole(
            500.0, 500.0, 320.0, 240.0, 640, 480,
        ))
    }

    #[test]
    fn empty_timestamps_are_rejected() {
        let mut calib = ImuCameraCalibrator::new(ImuCameraCalibratorOptions::default());
        let err = calib
            .init_spline(
                &empty_reconstruction(),
                &CameraTelemetry::default(),
                &[],
                &SplineWeighting::default(),
                ImuCameraInit::default(),
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::EmptyCameraTimestamps));
        assert_eq!(calib.stage(), CalibrationStage::Empty);
        assert!(calib.trajectory().is_none());
    }

    #[test]
    fn timestamps_are_sorted_into_window() {
        let mut calib = ImuCameraCalibrator::new(ImuCameraCalibratorOptions::default());
        calib
            .init_spline(
                &empty_reconstruction(),
                &CameraTelemetry::default(),
                &[2.0, 1.0, 1.5],
                &SplineWeighting::default(),
                ImuCameraInit::default(),
            )
            .unwrap();
        let window = calib.window().unwrap();
        assert_eq!(window.t0_s, 1.0);
        assert_eq!(window.t_end_s, 2.0);
        assert_eq!(calib.camera_timestamps_s(), &[1.0, 1.5, 2.0]);
        assert_eq!(calib.stage(), CalibrationStage::Initialized);
    }

    #[test]
    fn stage_order_is_enforced() {
        let mut calib = ImuCameraCalibrator::new(ImuCameraCalibratorOptions::default());
        assert!(matches!(
            calib.optimize(5),
            Err(CalibrationError::InvalidStage { .. })
        ));
        assert!(calib.report().is_err());

        let telemetry = CameraTelemetry {
            accelerometer: ImuSeries::new(vec![1_000.0], vec![Vec3::z()]).unwrap(),
            gyroscope: ImuSeries::default(),
        };
        calib
            .init_spline(
                &empty_reconstruction(),
                &telemetry,
                &[1.0, 2.0],
                &SplineWeighting::default(),
                ImuCameraInit::default(),
            )
            .unwrap();
        assert!(matches!(
            calib.optimize(5),
            Err(CalibrationError::GravityNotInitialized)
        ));
        // No posed frames: gravity cannot be found.
        assert!(matches!(
            calib.initialize_gravity(&telemetry),
            Err(CalibrationError::GravityUnavailable { .. })
        ));
        assert_eq!(calib.stage(), CalibrationStage::Initialized);
        assert!(matches!(
            calib.init_spline(
                &empty_reconstruction(),
                &telemetry,
                &[1.0],
                &SplineWeighting::default(),
                ImuCameraInit::default(),
            ),
            Err(CalibrationError::InvalidStage { .. })
        ));
    }

    #[test]
    fn options_json_roundtrip() {
        let options = ImuCameraCalibratorOptions {
            calibrate_cam_line_delay: true,
            reestimate_biases: true,
            reprojection_loss: RobustLoss::Huber { scale: 1.5 },
            verbosity: 1,
        };
        let json = serde_json::to_string(&options).unwrap();
        let restored: ImuCameraCalibratorOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, options);

        let defaults: ImuCameraCalibratorOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, ImuCameraCalibratorOptions::default());
    }
}
