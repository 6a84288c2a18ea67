//! timelapse-processing - Job script rendering for timelapse
//!
//! Renders the capture and compilation scripts run by the scheduled jobs.
//! Everything here is pure: no I/O, identical inputs give identical text.

pub mod quality;
pub mod script;
pub mod shell;

pub use quality::{ParseQualityError, QualityTier};
pub use script::{render_capture_script, render_timelapse_script};
pub use shell::quote;
