use std::{error::Error, fs, path::Path};

use clap::Parser;
use imucam_pipeline::{
    run_calibration, ImuCameraCalibrationInput, ImuCameraCalibrationOutput,
    ImuCameraCalibratorOptions,
};
use log::info;

/// Continuous-time camera-IMU calibration.
#[derive(Debug, Parser)]
#[command(author, version, about = "Camera-IMU spline calibration pipeline")]
struct Args {
    /// Path to JSON file containing ImuCameraCalibrationInput.
    #[arg(long)]
    input: String,

    /// Optional path to JSON ImuCameraCalibratorOptions. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Maximum solver iterations per optimization pass.
    #[arg(long, default_value_t = 50)]
    iterations: usize,

    /// Optional path for the exported spline views (JSON reconstruction).
    #[arg(long)]
    output: Option<String>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = fs::read_to_string(path)?;
    let value = serde_json::from_str(&data)?;
    Ok(value)
}

fn run_calibration_from_files(
    input_path: &str,
    config_path: Option<&str>,
    iterations: usize,
) -> Result<ImuCameraCalibrationOutput, Box<dyn Error>> {
    let input: ImuCameraCalibrationInput = load_json_file(Path::new(input_path))?;

    let options = if let Some(cfg_path) = config_path {
        load_json_file::<ImuCameraCalibratorOptions>(Path::new(cfg_path))?
    } else {
        ImuCameraCalibratorOptions::default()
    };

    info!(
        "calibrating {} views with {} accel / {} gyro samples",
        input.reconstruction.num_views(),
        input.telemetry.accelerometer.len(),
        input.telemetry.gyroscope.len()
    );
    Ok(run_calibration(&input, options, iterations)?)
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let output = run_calibration_from_files(&args.input, args.config.as_deref(), args.iterations)?;
    if let Some(path) = &args.output {
        fs::write(path, serde_json::to_string_pretty(&output.spline_views)?)?;
    }
    println!("{}", serde_json::to_string_pretty(&output.report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imucam_optim::synthetic::{generate_scene, SyntheticSceneConfig};
    use imucam_pipeline::{CalibrationStage, ImuCameraCalibrationReport, ImuCameraInit};
    use tempfile::NamedTempFile;

    fn write_json<T: serde::Serialize>(value: &T, path: &Path) {
        serde_json::to_writer_pretty(fs::File::create(path).unwrap(), value).unwrap();
    }

    fn synthetic_input() -> ImuCameraCalibrationInput {
        let cfg = SyntheticSceneConfig::default();
        let scene = generate_scene(&cfg).expect("synthetic scene");
        ImuCameraCalibrationInput {
            reconstruction: scene.reconstruction,
            telemetry: scene.telemetry,
            camera_timestamps_s: Some(scene.camera_timestamps_s),
            weighting: scene.weighting,
            init: ImuCameraInit {
                imu_se3_camera: cfg.imu_se3_camera,
                ..ImuCameraInit::default()
            },
        }
    }

    #[test]
    fn helper_smoke_test() {
        let input = synthetic_input();
        let input_file = NamedTempFile::new().unwrap();
        let config_file = NamedTempFile::new().unwrap();

        write_json(&input, input_file.path());
        write_json(&ImuCameraCalibratorOptions::default(), config_file.path());

        let output = run_calibration_from_files(
            input_file.path().to_str().unwrap(),
            Some(config_file.path().to_str().unwrap()),
            30,
        )
        .expect("cli helper should succeed");

        let json = serde_json::to_string_pretty(&output.report).unwrap();
        let report: ImuCameraCalibrationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.stage, CalibrationStage::Exported);
        let errors = report.reprojection.expect("reprojection errors");
        assert!(
            errors.mean_reprojection < 0.05,
            "reprojection error too high: {}",
            errors.mean_reprojection
        );
        assert_eq!(report.line_delay_s, 0.0);
    }

    #[test]
    fn missing_input_is_reported() {
        let err = run_calibration_from_files("/nonexistent/input.json", None, 5).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
