use crate::{ms_to_seconds, Vec3};
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// One inertial sensor stream as parallel timestamp/measurement lists.
///
/// Timestamps are in milliseconds on the sensor clock and are expected to be
/// non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSeries {
    pub timestamp_ms: Vec<f64>,
    pub measurement: Vec<Vec3>,
}

impl ImuSeries {
    pub fn new(timestamp_ms: Vec<f64>, measurement: Vec<Vec3>) -> Result<Self> {
        let series = Self {
            timestamp_ms,
            measurement,
        };
        series.validate()?;
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.measurement.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurement.is_empty()
    }

    /// Append a sample.
    pub fn push(&mut self, timestamp_ms: f64, measurement: Vec3) {
        self.timestamp_ms.push(timestamp_ms);
        self.measurement.push(measurement);
    }

    /// Iterate over `(timestamp in seconds, measurement)` pairs.
    pub fn samples_s(&self) -> impl Iterator<Item = (f64, &Vec3)> + '_ {
        self.timestamp_ms
            .iter()
            .zip(&self.measurement)
            .map(|(t_ms, m)| (ms_to_seconds(*t_ms), m))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.timestamp_ms.len() == self.measurement.len(),
            "timestamp/measurement count mismatch: {} vs {}",
            self.timestamp_ms.len(),
            self.measurement.len()
        );
        for (idx, pair) in self.timestamp_ms.windows(2).enumerate() {
            ensure!(
                pair[1] >= pair[0],
                "timestamps decrease at sample {}: {} -> {}",
                idx + 1,
                pair[0],
                pair[1]
            );
        }
        Ok(())
    }
}

/// Inertial telemetry recorded alongside the camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraTelemetry {
    pub accelerometer: ImuSeries,
    pub gyroscope: ImuSeries,
}

impl CameraTelemetry {
    pub fn validate(&self) -> Result<()> {
        self.accelerometer.validate()?;
        self.gyroscope.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_mismatch_is_rejected() {
        let series = ImuSeries {
            timestamp_ms: vec![0.0, 1.0],
            measurement: vec![Vec3::zeros()],
        };
        assert!(series.validate().is_err());
    }

    #[test]
    fn decreasing_timestamps_are_rejected() {
        let res = ImuSeries::new(vec![0.0, 2.0, 1.0], vec![Vec3::zeros(); 3]);
        assert!(res.is_err());
    }

    #[test]
    fn samples_are_reported_in_seconds() {
        let mut series = ImuSeries::default();
        series.push(1500.0, Vec3::new(0.0, 0.0, 9.81));
        series.push(1500.0, Vec3::new(0.0, 0.0, 9.80));
        assert!(series.validate().is_ok());

        let samples: Vec<_> = series.samples_s().collect();
        assert_eq!(samples.len(), 2);
        assert!((samples[0].0 - 1.5).abs() < 1e-12);
    }
}
