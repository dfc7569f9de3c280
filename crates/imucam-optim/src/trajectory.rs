//! Continuous-time IMU trajectory as a uniform cubic B-spline on SO(3) x R³.
//!
//! The trajectory owns its knots, the camera-to-IMU transform, the rolling
//! shutter line delay, gravity and (optionally re-estimated) IMU biases. It
//! accumulates typed measurements, turns them into a [`ProblemIR`] in one
//! batch and hands that to the solver backend.
//!
//! The spline represents `world_se3_imu(t)` over the half-open window
//! `[t0, t_end)`. Knot `i` is associated with time `t0 + (i - 1) * dt`.

use crate::backend::{self, BackendSolveOptions};
use crate::ir::{
    Bound, FactorKind, FixedMask, ManifoldKind, ParamId, ProblemIR, ResidualBlock, RobustLoss,
    SegmentSample,
};
use crate::math::spline::{r3_segment, segment_index, so3_segment, SegmentIndex, SPLINE_ORDER};
use crate::params::pose_se3::{iso3_to_se3_dvec, quat_to_so3_dvec, se3_dvec_to_iso3, so3_dvec_to_quat};
use crate::params::vec3::{dvec_to_scalar, dvec_to_vec3, vec3_to_dvec};
use anyhow::{anyhow, bail, ensure, Context, Result};
use imucam_core::{
    interpolate_iso3, ns_to_seconds, seconds_to_ns, CameraIntrinsics, Iso3, Pt3, Quat, Real,
    SplineWeighting, TimeCamId, TimeWindow, Vec2, Vec3,
};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

const EXTRINSICS: &str = "imu_se3_camera";
const LINE_DELAY: &str = "line_delay";
const GRAVITY: &str = "gravity";
const GYRO_BIAS: &str = "gyro_bias";
const ACCEL_BIAS: &str = "accel_bias";

fn so3_knot_name(idx: usize) -> String {
    format!("so3/{idx}")
}

fn r3_knot_name(idx: usize) -> String {
    format!("r3/{idx}")
}

/// Number of knots needed to cover `duration_ns` with spacing `dt_ns`.
///
/// `ceil(duration / dt) + SPLINE_ORDER`, so the support of the last segment
/// extends past the end of the window.
pub fn knot_count(duration_ns: i64, dt_ns: i64) -> usize {
    debug_assert!(dt_ns > 0);
    let duration_ns = duration_ns.max(0);
    let segments = (duration_ns + dt_ns - 1) / dt_ns;
    segments as usize + SPLINE_ORDER
}

/// Flags controlling which auxiliary quantities are refined.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TrajectoryOptions {
    /// Refine the rolling-shutter line delay. When disabled the line delay is
    /// exactly zero and held fixed.
    pub calibrate_line_delay: bool,
    /// Add gyroscope and accelerometer bias blocks to the problem.
    pub reestimate_biases: bool,
    /// Robust loss on reprojection residuals.
    pub reprojection_loss: RobustLoss,
}

/// Corners of one frame paired with their known target points.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerFrame {
    pub key: TimeCamId,
    pub corners: Vec<Vec2>,
    pub points: Vec<Pt3>,
}

/// A bias-corrected inertial sample on the camera clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialSample {
    pub t_ns: i64,
    pub value: Vec3,
}

/// Summary of one trajectory solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveSummary {
    /// Cost `0.5 * |r|^2` before the solve.
    pub initial_cost: f64,
    /// Cost `0.5 * |r|^2` after the solve.
    pub final_cost: f64,
    /// Iteration cap handed to the solver. tiny-solver does not report how
    /// many iterations it actually ran, so this is an upper bound only.
    pub iteration_limit: usize,
    pub num_reprojection_residuals: usize,
    pub num_gyro_residuals: usize,
    pub num_accel_residuals: usize,
    pub num_param_blocks: usize,
}

/// Mean corner reprojection errors in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReprojectionErrors {
    /// Pose evaluated at the frame timestamp (global shutter model).
    pub mean_reprojection: f64,
    /// Pose evaluated at `t + row * line_delay` (rolling shutter model).
    pub mean_rs_reprojection: f64,
    pub num_corners: usize,
}

#[derive(Default)]
struct IrBuilder {
    ir: ProblemIR,
    initial: HashMap<String, DVector<f64>>,
    ids: HashMap<String, ParamId>,
}

impl IrBuilder {
    fn param(
        &mut self,
        name: String,
        manifold: ManifoldKind,
        fixed: FixedMask,
        bounds: Option<Vec<Bound>>,
        init: impl FnOnce() -> DVector<f64>,
    ) -> ParamId {
        if let Some(id) = self.ids.get(&name) {
            return *id;
        }
        let value = init();
        let id = self
            .ir
            .add_param_block(name.clone(), value.len(), manifold, fixed, bounds);
        self.initial.insert(name.clone(), value);
        self.ids.insert(name, id);
        id
    }

    fn residual(&mut self, params: Vec<ParamId>, factor: FactorKind, loss: RobustLoss) {
        self.ir.add_residual_block(ResidualBlock {
            params,
            loss,
            residual_dim: factor.residual_dim(),
            factor,
        });
    }
}

/// Cubic B-spline trajectory `world_se3_imu(t)` with calibration unknowns.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineTrajectory {
    window: TimeWindow,
    dt_so3_ns: i64,
    dt_r3_ns: i64,
    weighting: SplineWeighting,
    camera: CameraIntrinsics,
    options: TrajectoryOptions,

    so3_knots: Vec<Quat>,
    r3_knots: Vec<Vec3>,
    imu_se3_camera: Iso3,
    line_delay: Real,
    gravity: Option<Vec3>,
    gyro_bias: Vec3,
    accel_bias: Vec3,

    corners: Vec<CornerFrame>,
    gyro: Vec<InertialSample>,
    accel: Vec<InertialSample>,
}

impl SplineTrajectory {
    /// Allocate knots for `window` and set the initial line delay.
    ///
    /// With line-delay calibration enabled the line delay starts at
    /// `1 / (fps * image_height)`, otherwise it is exactly zero. Knots start
    /// at identity / origin until initialized from poses or another spline.
    pub fn new(
        window: TimeWindow,
        weighting: SplineWeighting,
        camera: CameraIntrinsics,
        options: TrajectoryOptions,
    ) -> Result<Self> {
        weighting.validate()?;
        ensure!(
            window.t0_s.is_finite() && window.t_end_s.is_finite() && window.t_end_s >= window.t0_s,
            "invalid trajectory window [{}, {})",
            window.t0_s,
            window.t_end_s
        );

        let dt_so3_ns = seconds_to_ns(weighting.dt_so3);
        let dt_r3_ns = seconds_to_ns(weighting.dt_r3);
        ensure!(
            dt_so3_ns > 0 && dt_r3_ns > 0,
            "knot spacing must be at least one nanosecond"
        );
        let duration_ns = window.t_end_ns() - window.t0_ns();
        let num_so3 = knot_count(duration_ns, dt_so3_ns);
        let num_r3 = knot_count(duration_ns, dt_r3_ns);

        let line_delay = if options.calibrate_line_delay {
            ensure!(
                camera.height > 0,
                "line delay calibration needs the image height"
            );
            1.0 / weighting.cam_fps / camera.height as Real
        } else {
            0.0
        };

        info!(
            "spline window [{:.6}, {:.6}) s, knot spacing so3/r3 {}/{} s",
            window.t0_s, window.t_end_s, weighting.dt_so3, weighting.dt_r3
        );
        info!("initializing {} SO3 knots and {} R3 knots", num_so3, num_r3);
        info!("initial line delay {:.3} us", line_delay * 1e6);

        Ok(Self {
            window,
            dt_so3_ns,
            dt_r3_ns,
            weighting,
            camera,
            options,
            so3_knots: vec![Quat::identity(); num_so3],
            r3_knots: vec![Vec3::zeros(); num_r3],
            imu_se3_camera: Iso3::identity(),
            line_delay,
            gravity: None,
            gyro_bias: Vec3::zeros(),
            accel_bias: Vec3::zeros(),
            corners: Vec::new(),
            gyro: Vec::new(),
            accel: Vec::new(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Initialization
    // ─────────────────────────────────────────────────────────────────────────

    /// Initialize knots by interpolating time-ordered `world_se3_imu` samples.
    ///
    /// Each knot takes the pose interpolated at its knot time (slerp for
    /// rotation, linear for translation); knots before the first or after the
    /// last sample take the nearest sample.
    pub fn init_knots_from_poses(&mut self, poses: &BTreeMap<TimeCamId, Iso3>) -> Result<()> {
        if poses.is_empty() {
            warn!("no initial poses inside the window, knots stay at identity");
            return Ok(());
        }
        let samples: Vec<(f64, Iso3)> = poses.iter().map(|(k, p)| (k.seconds(), *p)).collect();

        let t0 = self.window.t0_s;
        let dt_so3 = self.dt_so3_s();
        let mut so3 = Vec::with_capacity(self.so3_knots.len());
        for i in 0..self.so3_knots.len() {
            let t = t0 + (i as f64 - 1.0) * dt_so3;
            let mut q = interpolate_samples(&samples, t).rotation;
            if let Some(prev) = so3.last() {
                q = same_hemisphere(prev, q);
            }
            so3.push(q);
        }

        let dt_r3 = self.dt_r3_s();
        let r3 = (0..self.r3_knots.len())
            .map(|i| {
                let t = t0 + (i as f64 - 1.0) * dt_r3;
                interpolate_samples(&samples, t).translation.vector
            })
            .collect();

        self.so3_knots = so3;
        self.r3_knots = r3;
        debug!("initialized knots from {} poses", samples.len());
        Ok(())
    }

    /// Seed knots, gravity and the camera-to-IMU transform from an existing
    /// solution. Knot counts must match this trajectory's window and spacing.
    pub fn init_from_knots(
        &mut self,
        so3_knots: &[Quat],
        r3_knots: &[Vec3],
        gravity: Vec3,
        imu_se3_camera: Iso3,
    ) -> Result<()> {
        ensure!(
            so3_knots.len() == self.so3_knots.len(),
            "SO3 knot count mismatch: expected {}, got {}",
            self.so3_knots.len(),
            so3_knots.len()
        );
        ensure!(
            r3_knots.len() == self.r3_knots.len(),
            "R3 knot count mismatch: expected {}, got {}",
            self.r3_knots.len(),
            r3_knots.len()
        );
        self.so3_knots = so3_knots.to_vec();
        self.r3_knots = r3_knots.to_vec();
        self.gravity = Some(gravity);
        self.imu_se3_camera = imu_se3_camera;
        Ok(())
    }

    pub fn set_imu_se3_camera(&mut self, imu_se3_camera: Iso3) {
        self.imu_se3_camera = imu_se3_camera;
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = Some(gravity);
    }

    /// Override the line delay. Only valid while line-delay calibration is on.
    pub fn set_line_delay(&mut self, line_delay: Real) -> Result<()> {
        ensure!(
            self.options.calibrate_line_delay,
            "line delay is fixed at zero when its calibration is disabled"
        );
        ensure!(
            line_delay >= 0.0 && line_delay.is_finite(),
            "line delay must be non-negative, got {}",
            line_delay
        );
        self.line_delay = line_delay;
        Ok(())
    }

    pub fn set_biases(&mut self, gyro_bias: Vec3, accel_bias: Vec3) {
        self.gyro_bias = gyro_bias;
        self.accel_bias = accel_bias;
    }

    /// Toggle bias re-estimation for subsequent solves.
    pub fn set_reestimate_biases(&mut self, enabled: bool) {
        self.options.reestimate_biases = enabled;
    }

    pub fn set_reprojection_loss(&mut self, loss: RobustLoss) {
        self.options.reprojection_loss = loss;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Measurements
    // ─────────────────────────────────────────────────────────────────────────

    /// Add the corners of one frame. Returns `false` when the frame lies
    /// outside the window and was dropped.
    pub fn add_rs_corners_measurement(
        &mut self,
        key: TimeCamId,
        corners: &[Vec2],
        points: &[Pt3],
    ) -> Result<bool> {
        ensure!(
            corners.len() == points.len(),
            "corner/point count mismatch at {}: {} vs {}",
            key,
            corners.len(),
            points.len()
        );
        if !self.window.contains_ns(key.t_ns) {
            return Ok(false);
        }
        self.corners.push(CornerFrame {
            key,
            corners: corners.to_vec(),
            points: points.to_vec(),
        });
        Ok(true)
    }

    /// Add a bias-corrected gyroscope sample. Returns `false` outside the window.
    pub fn add_gyro_measurement(&mut self, t_ns: i64, value: Vec3) -> bool {
        if !self.window.contains_ns(t_ns) {
            return false;
        }
        self.gyro.push(InertialSample { t_ns, value });
        true
    }

    /// Add a bias-corrected accelerometer sample. Returns `false` outside the window.
    pub fn add_accel_measurement(&mut self, t_ns: i64, value: Vec3) -> bool {
        if !self.window.contains_ns(t_ns) {
            return false;
        }
        self.accel.push(InertialSample { t_ns, value });
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Problem construction and solve
    // ─────────────────────────────────────────────────────────────────────────

    /// Build the problem IR and initial values from the accumulated measurements.
    ///
    /// Only knots referenced by at least one residual become parameter blocks.
    pub fn build_ir(&self) -> Result<(ProblemIR, HashMap<String, DVector<f64>>)> {
        let mut b = IrBuilder::default();
        let t0 = self.window.t0_s;
        let (dt_so3, dt_r3) = (self.dt_so3_s(), self.dt_r3_s());
        let intrinsics = self.camera.k_array();
        let distortion = self.camera.distortion.to_array();

        for frame in &self.corners {
            let t = frame.key.seconds();
            for (uv, pw) in frame.corners.iter().zip(&frame.points) {
                // Segments follow the current rolling-shutter time of the row.
                let t_rs = t + uv.y * self.line_delay;
                let seg_so3 = self.so3_segment(t_rs);
                let seg_r3 = self.r3_segment(t_rs);

                let mut params = self.so3_params(&mut b, seg_so3.s);
                params.extend(self.r3_params(&mut b, seg_r3.s));
                params.push(b.param(
                    EXTRINSICS.to_string(),
                    ManifoldKind::SE3,
                    FixedMask::all_free(),
                    None,
                    || iso3_to_se3_dvec(&self.imu_se3_camera),
                ));
                params.push(self.line_delay_param(&mut b));

                let factor = FactorKind::SplineReprojRs {
                    pw: [pw.x, pw.y, pw.z],
                    uv: [uv.x, uv.y],
                    row: uv.y,
                    so3: SegmentSample {
                        u: (t - t0) / dt_so3 - seg_so3.s as f64,
                        inv_dt: 1.0 / dt_so3,
                    },
                    r3: SegmentSample {
                        u: (t - t0) / dt_r3 - seg_r3.s as f64,
                        inv_dt: 1.0 / dt_r3,
                    },
                    intrinsics,
                    distortion,
                    w: 1.0,
                };
                b.residual(params, factor, self.options.reprojection_loss);
            }
        }

        // Without bias blocks the current estimates are applied as constants.
        let with_bias = self.options.reestimate_biases;

        let gyro_w = self.weighting.gyro_weight();
        for sample in &self.gyro {
            let seg = self.so3_segment(ns_to_seconds(sample.t_ns));
            let mut params = self.so3_params(&mut b, seg.s);
            let meas = if with_bias {
                params.push(self.bias_param(&mut b, GYRO_BIAS, self.gyro_bias));
                sample.value
            } else {
                sample.value - self.gyro_bias
            };
            let factor = FactorKind::SplineGyro {
                meas: [meas.x, meas.y, meas.z],
                so3: SegmentSample {
                    u: seg.u,
                    inv_dt: 1.0 / dt_so3,
                },
                w: gyro_w,
                with_bias,
            };
            b.residual(params, factor, RobustLoss::None);
        }

        if !self.accel.is_empty() {
            let gravity = self
                .gravity
                .ok_or_else(|| anyhow!("gravity is not initialized"))?;
            let accel_w = self.weighting.accel_weight();
            for sample in &self.accel {
                let t = ns_to_seconds(sample.t_ns);
                let seg_so3 = self.so3_segment(t);
                let seg_r3 = self.r3_segment(t);
                let mut params = self.so3_params(&mut b, seg_so3.s);
                params.extend(self.r3_params(&mut b, seg_r3.s));
                params.push(b.param(
                    GRAVITY.to_string(),
                    ManifoldKind::Euclidean,
                    FixedMask::all_free(),
                    None,
                    || vec3_to_dvec(&gravity),
                ));
                let meas = if with_bias {
                    params.push(self.bias_param(&mut b, ACCEL_BIAS, self.accel_bias));
                    sample.value
                } else {
                    sample.value - self.accel_bias
                };
                let factor = FactorKind::SplineAccel {
                    meas: [meas.x, meas.y, meas.z],
                    so3: SegmentSample {
                        u: seg_so3.u,
                        inv_dt: 1.0 / dt_so3,
                    },
                    r3: SegmentSample {
                        u: seg_r3.u,
                        inv_dt: 1.0 / dt_r3,
                    },
                    w: accel_w,
                    with_bias,
                };
                b.residual(params, factor, RobustLoss::None);
            }
        }

        debug!(
            "trajectory problem: {} corner frames, {} gyro, {} accel samples -> {} params, {} residuals",
            self.corners.len(),
            self.gyro.len(),
            self.accel.len(),
            b.ir.params.len(),
            b.ir.residuals.len()
        );
        Ok((b.ir, b.initial))
    }

    /// Refine the trajectory from its current state.
    ///
    /// Repeated calls continue from the current knots; nothing is reset. State
    /// is only updated once the solver returned successfully.
    pub fn optimize(&mut self, opts: &BackendSolveOptions) -> Result<SolveSummary> {
        let (ir, initial) = self.build_ir()?;
        ensure!(
            !ir.residuals.is_empty(),
            "no measurements inside the trajectory window"
        );
        let solution = backend::solve(&ir, &initial, opts)
            .context("trajectory solve failed")?;
        let params = &solution.params;

        let mut so3_knots = self.so3_knots.clone();
        for (i, q) in so3_knots.iter_mut().enumerate() {
            if let Some(v) = params.get(&so3_knot_name(i)) {
                *q = so3_dvec_to_quat(v.as_view())?;
            }
        }
        let mut r3_knots = self.r3_knots.clone();
        for (i, p) in r3_knots.iter_mut().enumerate() {
            if let Some(v) = params.get(&r3_knot_name(i)) {
                *p = dvec_to_vec3(v.as_view())?;
            }
        }
        let imu_se3_camera = match params.get(EXTRINSICS) {
            Some(v) => se3_dvec_to_iso3(v.as_view())?,
            None => self.imu_se3_camera,
        };
        let line_delay = match params.get(LINE_DELAY) {
            Some(v) if self.options.calibrate_line_delay => dvec_to_scalar(v.as_view())?.max(0.0),
            _ => self.line_delay,
        };
        let gravity = match params.get(GRAVITY) {
            Some(v) => Some(dvec_to_vec3(v.as_view())?),
            None => self.gravity,
        };
        let gyro_bias = match params.get(GYRO_BIAS) {
            Some(v) => dvec_to_vec3(v.as_view())?,
            None => self.gyro_bias,
        };
        let accel_bias = match params.get(ACCEL_BIAS) {
            Some(v) => dvec_to_vec3(v.as_view())?,
            None => self.accel_bias,
        };

        self.so3_knots = so3_knots;
        self.r3_knots = r3_knots;
        self.imu_se3_camera = imu_se3_camera;
        self.line_delay = line_delay;
        self.gravity = gravity;
        self.gyro_bias = gyro_bias;
        self.accel_bias = accel_bias;

        let summary = SolveSummary {
            initial_cost: solution.initial_cost,
            final_cost: solution.final_cost,
            iteration_limit: opts.max_iters,
            num_reprojection_residuals: ir
                .count_residuals(|f| matches!(f, FactorKind::SplineReprojRs { .. })),
            num_gyro_residuals: ir.count_residuals(|f| matches!(f, FactorKind::SplineGyro { .. })),
            num_accel_residuals: ir
                .count_residuals(|f| matches!(f, FactorKind::SplineAccel { .. })),
            num_param_blocks: ir.params.len(),
        };
        info!(
            "trajectory solve: cost {:.6e} -> {:.6e} ({} residual blocks)",
            summary.initial_cost,
            summary.final_cost,
            ir.residuals.len()
        );
        Ok(summary)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Evaluation
    // ─────────────────────────────────────────────────────────────────────────

    /// `world_se3_imu` at `t_s`, defined on `[t0, t_end)`.
    pub fn pose_at(&self, t_s: f64) -> Result<Iso3> {
        self.ensure_in_window(t_s)?;
        Ok(self.eval_pose(t_s))
    }

    /// `world_se3_imu` anywhere the knots fully support the spline.
    ///
    /// The support extends past `t_end` by at least one knot interval, which
    /// covers the last camera frame (whose timestamp equals `t_end`).
    pub fn pose_in_support(&self, t_s: f64) -> Result<Iso3> {
        let support = self.support_window();
        ensure!(
            support.contains_s(t_s),
            "time {} outside spline support [{}, {})",
            t_s,
            support.t0_s,
            support.t_end_s
        );
        Ok(self.eval_pose(t_s))
    }

    /// Body-frame angular velocity at `t_s`.
    pub fn angular_velocity_at(&self, t_s: f64) -> Result<Vec3> {
        self.ensure_in_window(t_s)?;
        let seg = self.so3_segment(t_s);
        let (_, omega) = so3_segment(&self.so3_window(seg.s), seg.u, 1.0 / self.dt_so3_s());
        Ok(omega)
    }

    /// World-frame linear acceleration at `t_s`.
    pub fn acceleration_at(&self, t_s: f64) -> Result<Vec3> {
        self.ensure_in_window(t_s)?;
        let seg = self.r3_segment(t_s);
        let (_, _, accel) = r3_segment(&self.r3_window(seg.s), seg.u, 1.0 / self.dt_r3_s());
        Ok(accel)
    }

    /// Mean reprojection errors over all accepted corners, with and without
    /// the rolling-shutter time shift.
    pub fn mean_reprojection_errors(&self) -> ReprojectionErrors {
        let mut sum_gs = 0.0;
        let mut sum_rs = 0.0;
        let mut count = 0usize;
        for frame in &self.corners {
            let t = frame.key.seconds();
            let world_se3_camera = self.eval_pose(t) * self.imu_se3_camera;
            for (uv, pw) in frame.corners.iter().zip(&frame.points) {
                let rs_world_se3_camera =
                    self.eval_pose(t + uv.y * self.line_delay) * self.imu_se3_camera;
                let gs = self
                    .camera
                    .project(&world_se3_camera.inverse_transform_point(pw));
                let rs = self
                    .camera
                    .project(&rs_world_se3_camera.inverse_transform_point(pw));
                if let (Some(gs), Some(rs)) = (gs, rs) {
                    sum_gs += (gs - uv).norm();
                    sum_rs += (rs - uv).norm();
                    count += 1;
                }
            }
        }
        if count == 0 {
            return ReprojectionErrors::default();
        }
        ReprojectionErrors {
            mean_reprojection: sum_gs / count as f64,
            mean_rs_reprojection: sum_rs / count as f64,
            num_corners: count,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Interval on which every segment has its four knots.
    pub fn support_window(&self) -> TimeWindow {
        let t0 = self.window.t0_s;
        let so3_end = t0 + (self.so3_knots.len() as f64 - 3.0) * self.dt_so3_s();
        let r3_end = t0 + (self.r3_knots.len() as f64 - 3.0) * self.dt_r3_s();
        TimeWindow::new(t0, so3_end.min(r3_end))
    }

    pub fn options(&self) -> &TrajectoryOptions {
        &self.options
    }

    pub fn camera(&self) -> &CameraIntrinsics {
        &self.camera
    }

    pub fn so3_knots(&self) -> &[Quat] {
        &self.so3_knots
    }

    pub fn r3_knots(&self) -> &[Vec3] {
        &self.r3_knots
    }

    pub fn num_so3_knots(&self) -> usize {
        self.so3_knots.len()
    }

    pub fn num_r3_knots(&self) -> usize {
        self.r3_knots.len()
    }

    pub fn imu_se3_camera(&self) -> &Iso3 {
        &self.imu_se3_camera
    }

    pub fn line_delay(&self) -> Real {
        self.line_delay
    }

    /// Gravity in the world frame, `None` until initialized.
    pub fn gravity(&self) -> Option<Vec3> {
        self.gravity
    }

    pub fn gyro_bias(&self) -> &Vec3 {
        &self.gyro_bias
    }

    pub fn accel_bias(&self) -> &Vec3 {
        &self.accel_bias
    }

    pub fn corner_frames(&self) -> &[CornerFrame] {
        &self.corners
    }

    pub fn gyro_samples(&self) -> &[InertialSample] {
        &self.gyro
    }

    pub fn accel_samples(&self) -> &[InertialSample] {
        &self.accel
    }

    pub fn num_corners(&self) -> usize {
        self.corners.iter().map(|f| f.corners.len()).sum()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn dt_so3_s(&self) -> f64 {
        ns_to_seconds(self.dt_so3_ns)
    }

    fn dt_r3_s(&self) -> f64 {
        ns_to_seconds(self.dt_r3_ns)
    }

    fn ensure_in_window(&self, t_s: f64) -> Result<()> {
        if !self.window.contains_s(t_s) {
            bail!(
                "time {} outside trajectory window [{}, {})",
                t_s,
                self.window.t0_s,
                self.window.t_end_s
            );
        }
        Ok(())
    }

    fn so3_segment(&self, t_s: f64) -> SegmentIndex {
        segment_index(t_s, self.window.t0_s, self.dt_so3_s(), self.so3_knots.len())
    }

    fn r3_segment(&self, t_s: f64) -> SegmentIndex {
        segment_index(t_s, self.window.t0_s, self.dt_r3_s(), self.r3_knots.len())
    }

    fn so3_window(&self, s: usize) -> [Quat; 4] {
        std::array::from_fn(|j| self.so3_knots[s + j])
    }

    fn r3_window(&self, s: usize) -> [Vec3; 4] {
        std::array::from_fn(|j| self.r3_knots[s + j])
    }

    fn eval_pose(&self, t_s: f64) -> Iso3 {
        let seg_so3 = self.so3_segment(t_s);
        let seg_r3 = self.r3_segment(t_s);
        let (rot, _) = so3_segment(&self.so3_window(seg_so3.s), seg_so3.u, 1.0 / self.dt_so3_s());
        let (pos, _, _) = r3_segment(&self.r3_window(seg_r3.s), seg_r3.u, 1.0 / self.dt_r3_s());
        Iso3::from_parts(pos.into(), rot)
    }

    fn so3_params(&self, b: &mut IrBuilder, s: usize) -> Vec<ParamId> {
        (s..s + SPLINE_ORDER)
            .map(|i| {
                b.param(
                    so3_knot_name(i),
                    ManifoldKind::SO3,
                    FixedMask::all_free(),
                    None,
                    || quat_to_so3_dvec(&self.so3_knots[i]),
                )
            })
            .collect()
    }

    fn r3_params(&self, b: &mut IrBuilder, s: usize) -> Vec<ParamId> {
        (s..s + SPLINE_ORDER)
            .map(|i| {
                b.param(
                    r3_knot_name(i),
                    ManifoldKind::Euclidean,
                    FixedMask::all_free(),
                    None,
                    || vec3_to_dvec(&self.r3_knots[i]),
                )
            })
            .collect()
    }

    fn line_delay_param(&self, b: &mut IrBuilder) -> ParamId {
        let (fixed, bounds) = if self.options.calibrate_line_delay {
            (
                FixedMask::all_free(),
                Some(vec![Bound {
                    idx: 0,
                    lower: 0.0,
                    upper: 1.0 / self.weighting.cam_fps,
                }]),
            )
        } else {
            (FixedMask::all_fixed(1), None)
        };
        b.param(
            LINE_DELAY.to_string(),
            ManifoldKind::Euclidean,
            fixed,
            bounds,
            || nalgebra::dvector![self.line_delay],
        )
    }

    fn bias_param(&self, b: &mut IrBuilder, name: &str, value: Vec3) -> ParamId {
        b.param(
            name.to_string(),
            ManifoldKind::Euclidean,
            FixedMask::all_free(),
            None,
            || vec3_to_dvec(&value),
        )
    }
}

fn interpolate_samples(samples: &[(f64, Iso3)], t: f64) -> Iso3 {
    let idx = samples.partition_point(|(ts, _)| *ts <= t);
    if idx == 0 {
        return samples[0].1;
    }
    if idx == samples.len() {
        return samples[samples.len() - 1].1;
    }
    let (ta, a) = samples[idx - 1];
    let (tb, b) = samples[idx];
    if tb <= ta {
        return a;
    }
    interpolate_iso3(&a, &b, (t - ta) / (tb - ta))
}

fn same_hemisphere(reference: &Quat, q: Quat) -> Quat {
    if reference.coords.dot(&q.coords) < 0.0 {
        Quat::new_unchecked(-q.into_inner())
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Translation3;

    fn camera() -> CameraIntrinsics {
        CameraIntrinsics::pinhole(500.0, 500.0, 320.0, 240.0, 640, 480)
    }

    fn trajectory(t0: f64, t_end: f64, options: TrajectoryOptions) -> SplineTrajectory {
        SplineTrajectory::new(
            TimeWindow::new(t0, t_end),
            SplineWeighting::default(),
            camera(),
            options,
        )
        .unwrap()
    }

    #[test]
    fn knot_count_covers_window() {
        assert_eq!(knot_count(0, 100), SPLINE_ORDER);
        assert_eq!(knot_count(1_000, 100), 10 + SPLINE_ORDER);
        assert_eq!(knot_count(1_001, 100), 11 + SPLINE_ORDER);
        assert!(knot_count(2_000, 100) > knot_count(1_000, 100));
        assert!(knot_count(2_000, 200) < knot_count(2_000, 100));
    }

    #[test]
    fn line_delay_starts_at_row_period_when_calibrated() {
        let traj = trajectory(
            0.0,
            1.0,
            TrajectoryOptions {
                calibrate_line_delay: true,
                ..Default::default()
            },
        );
        let expected = 1.0 / 30.0 / 480.0;
        assert!((traj.line_delay() - expected).abs() < 1e-15);

        let traj = trajectory(0.0, 1.0, TrajectoryOptions::default());
        assert_eq!(traj.line_delay(), 0.0);
        assert!(traj.clone().set_line_delay(1e-5).is_err());
    }

    #[test]
    fn pose_at_rejects_times_outside_window() {
        let traj = trajectory(1.0, 2.0, TrajectoryOptions::default());
        assert!(traj.pose_at(1.0).is_ok());
        assert!(traj.pose_at(1.999).is_ok());
        assert!(traj.pose_at(2.0).is_err());
        assert!(traj.pose_at(0.999).is_err());
        // The support still covers the last frame.
        assert!(traj.pose_in_support(2.0).is_ok());
    }

    #[test]
    fn measurements_outside_window_are_dropped() {
        let mut traj = trajectory(1.0, 2.0, TrajectoryOptions::default());
        assert!(traj.add_gyro_measurement(seconds_to_ns(1.0), Vec3::zeros()));
        assert!(!traj.add_gyro_measurement(seconds_to_ns(2.0), Vec3::zeros()));
        assert!(!traj.add_accel_measurement(seconds_to_ns(0.5), Vec3::zeros()));
        let accepted = traj
            .add_rs_corners_measurement(TimeCamId::from_seconds(2.0, 0), &[], &[])
            .unwrap();
        assert!(!accepted);
        assert_eq!(traj.gyro_samples().len(), 1);
        assert!(traj.accel_samples().is_empty());
        assert!(traj.corner_frames().is_empty());
    }

    #[test]
    fn knots_from_poses_reproduce_constant_motion() {
        let mut traj = trajectory(0.0, 1.0, TrajectoryOptions::default());
        let mut poses = BTreeMap::new();
        for k in 0..=10 {
            let t = k as f64 * 0.1;
            let pose = Iso3::from_parts(
                Translation3::new(0.5 * t, 0.0, -1.0),
                Quat::from_scaled_axis(Vec3::new(0.0, 0.0, 0.2 * t)),
            );
            poses.insert(TimeCamId::from_seconds(t, 0), pose);
        }
        traj.init_knots_from_poses(&poses).unwrap();

        // Interior of the window: linear knots reproduce linear motion.
        let pose = traj.pose_at(0.45).unwrap();
        assert!((pose.translation.vector - Vec3::new(0.225, 0.0, -1.0)).norm() < 1e-9);
        assert!((pose.rotation.angle() - 0.09).abs() < 1e-9);
        let omega = traj.angular_velocity_at(0.45).unwrap();
        assert!((omega - Vec3::new(0.0, 0.0, 0.2)).norm() < 1e-9);
        assert!(traj.acceleration_at(0.45).unwrap().norm() < 1e-9);
    }

    #[test]
    fn accel_without_gravity_cannot_build() {
        let mut traj = trajectory(0.0, 1.0, TrajectoryOptions::default());
        traj.add_accel_measurement(seconds_to_ns(0.5), Vec3::new(0.0, 0.0, 9.81));
        let err = traj.build_ir().unwrap_err();
        assert!(err.to_string().contains("gravity"));

        traj.set_gravity(Vec3::new(0.0, 0.0, 9.81));
        let (ir, initial) = traj.build_ir().unwrap();
        // 4 SO3 + 4 R3 knots and gravity.
        assert_eq!(ir.params.len(), 9);
        assert_eq!(initial.len(), 9);
        assert!(ir.param_by_name(GRAVITY).is_some());
        assert!(ir.param_by_name(ACCEL_BIAS).is_none());
    }

    #[test]
    fn bias_blocks_follow_option() {
        let mut traj = trajectory(0.0, 1.0, TrajectoryOptions::default());
        traj.add_gyro_measurement(seconds_to_ns(0.5), Vec3::zeros());
        let (ir, _) = traj.build_ir().unwrap();
        assert!(ir.param_by_name(GYRO_BIAS).is_none());

        traj.set_reestimate_biases(true);
        let (ir, _) = traj.build_ir().unwrap();
        assert!(ir.param_by_name(GYRO_BIAS).is_some());
        assert!(ir.validate().is_ok());
    }

    #[test]
    fn line_delay_is_fixed_unless_calibrated() {
        let mut traj = trajectory(0.0, 1.0, TrajectoryOptions::default());
        traj.add_rs_corners_measurement(
            TimeCamId::from_seconds(0.5, 0),
            &[Vec2::new(320.0, 240.0)],
            &[Pt3::new(0.0, 0.0, 1.0)],
        )
        .unwrap();
        let (ir, _) = traj.build_ir().unwrap();
        let id = ir.param_by_name(LINE_DELAY).unwrap();
        assert!(ir.params[id.0].fixed.is_all_fixed(1));
        assert!(ir.validate().is_ok());
    }

    #[test]
    fn init_from_knots_checks_counts() {
        let mut traj = trajectory(0.0, 1.0, TrajectoryOptions::default());
        let n_so3 = traj.num_so3_knots();
        let n_r3 = traj.num_r3_knots();
        assert!(traj
            .init_from_knots(&[], &[], Vec3::zeros(), Iso3::identity())
            .is_err());
        traj.init_from_knots(
            &vec![Quat::identity(); n_so3],
            &vec![Vec3::new(1.0, 2.0, 3.0); n_r3],
            Vec3::new(0.0, 0.0, 9.81),
            Iso3::identity(),
        )
        .unwrap();
        assert_eq!(traj.gravity(), Some(Vec3::new(0.0, 0.0, 9.81)));
        let pose = traj.pose_at(0.3).unwrap();
        assert!((pose.translation.vector - Vec3::new(1.0, 2.0, 3.0)).norm() < 1e-12);
    }
}
