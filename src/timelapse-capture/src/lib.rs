//! timelapse-capture - Capture device discovery for timelapse
//!
//! Enumerates V4L2 video devices and checks that the external capture and
//! encoding programs used by the generated jobs are installed.

pub mod device;
pub mod error;
pub mod tools;

pub use device::{Device, DeviceInfo};
pub use error::CaptureError;
pub use tools::{check_program, ToolStatus};
