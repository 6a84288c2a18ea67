//! Validated capture parameters

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use timelapse_processing::QualityTier;

use crate::error::{Field, ValidationError};
use crate::job::{unschedulable, Schedule};

/// User-supplied capture configuration.
///
/// Construction validates every field; the value is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureParameters {
    device: String,
    interval_secs: u32,
    quality: QualityTier,
    output_dir: PathBuf,
}

impl CaptureParameters {
    pub fn new(
        device: impl Into<String>,
        interval_secs: u32,
        quality: QualityTier,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ValidationError> {
        let params = Self {
            device: device.into(),
            interval_secs,
            quality,
            output_dir: output_dir.into(),
        };
        params.validate()?;
        Ok(params)
    }

    /// Build from untyped text input, as entered on a form or command line.
    pub fn from_raw(device: &str, interval: &str, quality: &str, output_dir: &str) -> Result<Self, ValidationError> {
        let interval_secs = parse_interval(interval)?;

        if quality.trim().is_empty() {
            return Err(ValidationError::new(Field::Quality, "is required"));
        }
        let quality = quality
            .parse::<QualityTier>()
            .map_err(|e| ValidationError::new(Field::Quality, e.to_string()))?;

        if output_dir.is_empty() {
            return Err(ValidationError::new(Field::OutputDir, "is required"));
        }

        Self::new(device, interval_secs, quality, output_dir)
    }

    /// Check every field.
    ///
    /// Re-run before each apply: the output directory may have disappeared
    /// since construction.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.device.trim().is_empty() {
            return Err(ValidationError::new(Field::Device, "is required"));
        }

        if self.interval_secs == 0 {
            return Err(ValidationError::new(Field::Interval, "must be a positive integer, got 0"));
        }
        let schedule = Schedule::every_seconds(self.interval_secs);
        if schedule.cron_timing().is_none() {
            return Err(unschedulable(&schedule));
        }

        validate_output_dir(&self.output_dir)
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    pub fn quality(&self) -> QualityTier {
        self.quality
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn parse_interval(raw: &str) -> Result<u32, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::new(Field::Interval, "is required"));
    }

    let value: i64 = raw
        .parse()
        .map_err(|_| ValidationError::new(Field::Interval, format!("'{}' is not an integer", raw)))?;

    if value <= 0 {
        return Err(ValidationError::new(
            Field::Interval,
            format!("must be a positive integer, got {}", value),
        ));
    }

    u32::try_from(value).map_err(|_| ValidationError::new(Field::Interval, format!("{} is too large", value)))
}

fn validate_output_dir(dir: &Path) -> Result<(), ValidationError> {
    if dir.as_os_str().is_empty() {
        return Err(ValidationError::new(Field::OutputDir, "is required"));
    }
    if dir.to_str().is_none() {
        return Err(ValidationError::new(Field::OutputDir, format!("{:?} is not valid UTF-8", dir)));
    }

    let meta = fs::metadata(dir)
        .map_err(|e| ValidationError::new(Field::OutputDir, format!("{}: {}", dir.display(), e)))?;

    if !meta.is_dir() {
        return Err(ValidationError::new(
            Field::OutputDir,
            format!("{} is not a directory", dir.display()),
        ));
    }
    if meta.permissions().readonly() {
        return Err(ValidationError::new(
            Field::OutputDir,
            format!("{} is not writable", dir.display()),
        ));
    }

    Ok(())
}
