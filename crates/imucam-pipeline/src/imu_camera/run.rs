//! One-call calibration driver.

use super::calibrator::{
    ImuCameraCalibrationReport, ImuCameraCalibrator, ImuCameraCalibratorOptions, ImuCameraInit,
};
use crate::error::CalibrationError;
use imucam_core::{CameraTelemetry, Real, Reconstruction, SplineWeighting};
use log::info;
use serde::{Deserialize, Serialize};

/// Everything needed for one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuCameraCalibrationInput {
    pub reconstruction: Reconstruction,
    pub telemetry: CameraTelemetry,
    /// Camera timestamps defining the spline window. Defaults to the
    /// timestamps of the reconstruction's views.
    #[serde(default)]
    pub camera_timestamps_s: Option<Vec<Real>>,
    #[serde(default)]
    pub weighting: SplineWeighting,
    #[serde(default)]
    pub init: ImuCameraInit,
}

impl ImuCameraCalibrationInput {
    pub fn camera_timestamps(&self) -> Vec<Real> {
        match &self.camera_timestamps_s {
            Some(ts) => ts.clone(),
            None => self
                .reconstruction
                .views()
                .map(|(_, view)| view.timestamp_s)
                .collect(),
        }
    }
}

/// Report plus a reconstruction holding the exported spline views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuCameraCalibrationOutput {
    pub report: ImuCameraCalibrationReport,
    pub spline_views: Reconstruction,
}

/// Run `init_spline -> initialize_gravity -> optimize -> to_output_dataset`.
///
/// With bias re-estimation enabled, a first pass runs with fixed biases and a
/// second pass adds the bias blocks.
pub fn run_calibration(
    input: &ImuCameraCalibrationInput,
    options: ImuCameraCalibratorOptions,
    iterations: usize,
) -> Result<ImuCameraCalibrationOutput, CalibrationError> {
    let timestamps = input.camera_timestamps();
    let mut calib = ImuCameraCalibrator::new(ImuCameraCalibratorOptions {
        reestimate_biases: false,
        ..options
    });
    calib.init_spline(
        &input.reconstruction,
        &input.telemetry,
        &timestamps,
        &input.weighting,
        input.init,
    )?;
    calib.initialize_gravity(&input.telemetry)?;
    let errors = calib.optimize(iterations)?;
    info!(
        "first pass: {:.4} px / {:.4} px (rolling shutter)",
        errors.mean_reprojection, errors.mean_rs_reprojection
    );
    if options.reestimate_biases {
        calib.set_reestimate_biases(true);
        calib.optimize(iterations)?;
    }

    let mut spline_views = Reconstruction::new(input.reconstruction.camera);
    calib.to_output_dataset(&mut spline_views)?;
    Ok(ImuCameraCalibrationOutput {
        report: calib.report()?,
        spline_views,
    })
}
