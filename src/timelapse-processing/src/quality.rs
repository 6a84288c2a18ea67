//! Capture quality tiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Capture quality, mapped to a fixed capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown quality tier '{0}' (expected low, medium or high)")]
pub struct ParseQualityError(pub String);

impl QualityTier {
    pub const ALL: [QualityTier; 3] = [QualityTier::Low, QualityTier::Medium, QualityTier::High];

    /// Capture resolution as (width, height)
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            QualityTier::Low => (640, 480),
            QualityTier::Medium => (1280, 720),
            QualityTier::High => (1920, 1080),
        }
    }

    /// Resolution argument in the capture program's `WxH` form
    pub fn resolution_arg(&self) -> String {
        let (w, h) = self.resolution();
        format!("{}x{}", w, h)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "Low",
            QualityTier::Medium => "Medium",
            QualityTier::High => "High",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = ParseQualityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            _ => Err(ParseQualityError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_mapping() {
        assert_eq!(QualityTier::Low.resolution_arg(), "640x480");
        assert_eq!(QualityTier::Medium.resolution_arg(), "1280x720");
        assert_eq!(QualityTier::High.resolution_arg(), "1920x1080");
    }

    #[test]
    fn test_parse() {
        assert_eq!("Low".parse::<QualityTier>(), Ok(QualityTier::Low));
        assert_eq!(" HIGH ".parse::<QualityTier>(), Ok(QualityTier::High));
        assert_eq!("medium".parse::<QualityTier>(), Ok(QualityTier::Medium));
        assert!("ultra".parse::<QualityTier>().is_err());
        assert!("".parse::<QualityTier>().is_err());
    }

    #[test]
    fn test_default_is_medium() {
        assert_eq!(QualityTier::default(), QualityTier::Medium);
    }
}
