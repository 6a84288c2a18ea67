//! Configuration management
//!
//! TOML configuration with profile support. Values given on the command line
//! override the selected profile, which overrides the base `[capture]` table.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use timelapse_cron::{CrontabTable, FileTable, ScheduleTable};
use timelapse_processing::QualityTier;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub table: TableConfig,

    /// Named profiles that can override capture settings
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

/// Capture job settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Video device (None = first enumerated device)
    pub device: Option<String>,

    /// Seconds between captured frames
    #[serde(default = "default_interval")]
    pub interval_secs: u32,

    /// Capture quality tier
    #[serde(default)]
    pub quality: QualityTier,

    /// Directory receiving frames and the compiled video
    pub output_dir: Option<PathBuf>,
}

/// Generated script location
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Directory holding the generated scripts (defaults to the local data dir)
    pub dir: Option<PathBuf>,
}

/// Which schedule table to manage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableBackend {
    /// The user's crontab, through the `crontab` program
    #[default]
    Crontab,
    /// A plain crontab-format file
    File,
}

/// Schedule table settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub backend: TableBackend,

    /// `crontab` executable (crontab backend)
    pub program: Option<PathBuf>,

    /// Manage this user's crontab instead of the caller's (crontab backend)
    pub user: Option<String>,

    /// Table file (file backend)
    pub path: Option<PathBuf>,
}

/// Profile for overriding capture settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub device: Option<String>,
    pub interval_secs: Option<u32>,
    pub quality: Option<QualityTier>,
    pub output_dir: Option<PathBuf>,
}

fn default_interval() -> u32 { 60 }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            interval_secs: default_interval(),
            quality: QualityTier::default(),
            output_dir: None,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("timelapse")
            .join("config.toml")
    }

    /// Load configuration.
    ///
    /// An explicit path must exist; the default path is optional and falls
    /// back to built-in defaults when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply a named profile, merging settings
    ///
    /// Fields set in the profile override the base capture settings.
    pub fn apply_profile(mut self, profile_name: &str) -> Result<Self> {
        let profile = self.profiles.get(profile_name)
            .with_context(|| format!("Profile '{}' not found", profile_name))?
            .clone();

        if let Some(device) = profile.device {
            self.capture.device = Some(device);
        }
        if let Some(interval) = profile.interval_secs {
            self.capture.interval_secs = interval;
        }
        if let Some(quality) = profile.quality {
            self.capture.quality = quality;
        }
        if let Some(dir) = profile.output_dir {
            self.capture.output_dir = Some(dir);
        }

        Ok(self)
    }

    /// Resolve script directory with fallback to default
    pub fn resolve_script_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.scripts.dir {
            dir.clone()
        } else {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("timelapse")
        }
    }

    /// Build the configured schedule table client
    pub fn schedule_table(&self) -> Result<Box<dyn ScheduleTable>> {
        match self.table.backend {
            TableBackend::Crontab => {
                let mut table = CrontabTable::new();
                if let Some(ref program) = self.table.program {
                    table = table.with_program(program);
                }
                if let Some(ref user) = self.table.user {
                    table = table.for_user(user);
                }
                Ok(Box::new(table))
            }
            TableBackend::File => {
                let Some(ref path) = self.table.path else {
                    bail!("table.path is required when table.backend = \"file\"");
                };
                Ok(Box::new(FileTable::new(path)))
            }
        }
    }
}
