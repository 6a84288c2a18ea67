//! Availability checks for the external programs the jobs depend on

use std::process::{Command, Stdio};
use tracing::debug;

/// Result of probing an external program
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub program: String,
    pub available: bool,
}

/// Check whether `program` can be spawned from `PATH`.
///
/// Only spawnability is checked: `crontab` and `fswebcam` have no
/// portable version flag and exit non-zero for `--help` on some systems.
pub fn check_program(program: &str) -> ToolStatus {
    let available = Command::new(program)
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok();

    debug!("probe {}: available={}", program, available);

    ToolStatus {
        program: program.to_string(),
        available,
    }
}
