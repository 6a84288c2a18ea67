//! timelapse-cron - Scheduled job lifecycle for timelapse
//!
//! Installs the capture and compilation jobs into the user's schedule
//! table (crontab). Only lines carrying [`OWNERSHIP_TAG`] are ever touched:
//! every apply removes all tagged lines and appends the fresh jobs, leaving
//! foreign entries byte-for-byte intact and in order.

mod error;
pub mod installer;
pub mod job;
pub mod params;
pub mod table;

pub use error::{Field, InstallError, TableError, ValidationError};
pub use installer::{compute_table, is_owned, ApplyStage, InstallReport, JobInstaller, TablePlan};
pub use job::{JobKind, JobSpec, Schedule, OWNERSHIP_TAG};
pub use params::CaptureParameters;
pub use table::{CrontabTable, FileTable, ScheduleTable};

pub type Result<T> = std::result::Result<T, InstallError>;
