//! Schedule table access
//!
//! The table is owned by the OS scheduler and may hold entries from other
//! programs. Clients read and replace it whole, as ordered opaque lines, and
//! never reformat a line they did not produce.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::TableError;

/// Program managing per-user crontabs
pub const CRONTAB_PROGRAM: &str = "crontab";

/// Whole-document access to a schedule table
pub trait ScheduleTable {
    /// Read every line in order; an absent table reads as empty.
    fn read(&self) -> Result<Vec<String>, TableError>;

    /// Replace the whole table with `lines`.
    ///
    /// The previous table must remain installed if this fails.
    fn write(&self, lines: &[String]) -> Result<(), TableError>;
}

impl<T: ScheduleTable + ?Sized> ScheduleTable for Box<T> {
    fn read(&self) -> Result<Vec<String>, TableError> {
        (**self).read()
    }

    fn write(&self, lines: &[String]) -> Result<(), TableError> {
        (**self).write(lines)
    }
}

/// Split table text into lines.
///
/// Splits on `\n` only; carriage returns, blank lines and surrounding
/// whitespace are kept. A final newline does not start an extra line.
pub fn parse_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix('\n').unwrap_or(content);
    body.split('\n').map(str::to_string).collect()
}

/// Join lines into table text, newline-terminated as cron requires.
pub fn render_lines(lines: &[String]) -> String {
    let mut out = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// SHA-256 of the rendered table, used to detect concurrent edits.
pub fn checksum(lines: &[String]) -> String {
    hex::encode(Sha256::digest(render_lines(lines).as_bytes()))
}

/// The invoking user's crontab, managed through the `crontab` program.
#[derive(Debug, Clone)]
pub struct CrontabTable {
    program: PathBuf,
    user: Option<String>,
}

impl Default for CrontabTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CrontabTable {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from(CRONTAB_PROGRAM),
            user: None,
        }
    }

    /// Use a different `crontab` executable
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Manage another user's crontab (`crontab -u <user>`)
    pub fn for_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(ref user) = self.user {
            cmd.arg("-u").arg(user);
        }
        cmd
    }

    fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

/// `crontab -l` reports a missing table as an error with this message.
fn is_missing_table(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no crontab for")
}

impl ScheduleTable for CrontabTable {
    fn read(&self) -> Result<Vec<String>, TableError> {
        let mut cmd = self.command();
        cmd.arg("-l").stdin(Stdio::null());

        debug!("running {:?}", cmd);

        let output = cmd.output().map_err(|source| TableError::Spawn {
            program: self.program_name(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if is_missing_table(&stderr) {
                debug!("no crontab installed, treating as empty");
                return Ok(Vec::new());
            }
            return Err(TableError::Command {
                program: self.program_name(),
                status: output.status,
                stderr,
            });
        }

        let content = String::from_utf8(output.stdout)?;
        Ok(parse_lines(&content))
    }

    fn write(&self, lines: &[String]) -> Result<(), TableError> {
        let mut cmd = self.command();
        cmd.arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        debug!("running {:?}", cmd);

        let mut child = cmd.spawn().map_err(|source| TableError::Spawn {
            program: self.program_name(),
            source,
        })?;

        // crontab installs nothing unless it reads the full input and exits 0,
        // so a failed pipe write is reported through the exit status below.
        let pipe_result = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(render_lines(lines).as_bytes()),
            None => Err(std::io::Error::new(ErrorKind::BrokenPipe, "failed to open crontab stdin")),
        };

        let output = child.wait_with_output().map_err(|source| TableError::Spawn {
            program: self.program_name(),
            source,
        })?;

        if !output.status.success() {
            return Err(TableError::Command {
                program: self.program_name(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        pipe_result.map_err(|source| TableError::Spawn {
            program: self.program_name(),
            source,
        })?;

        info!("installed crontab with {} lines", lines.len());
        Ok(())
    }
}

/// A schedule table stored as a plain file, such as an `/etc/cron.d` drop-in.
#[derive(Debug, Clone)]
pub struct FileTable {
    path: PathBuf,
}

impl FileTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TableError {
        TableError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ScheduleTable for FileTable {
    fn read(&self) -> Result<Vec<String>, TableError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{:?} does not exist, treating as empty", self.path);
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.io_error(e)),
        };
        let content = String::from_utf8(bytes)?;
        Ok(parse_lines(&content))
    }

    fn write(&self, lines: &[String]) -> Result<(), TableError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        // Readers see either the old file or the new one, never a partial write.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(render_lines(lines).as_bytes())
            .map_err(|e| self.io_error(e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        let permissions = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.permissions()),
            Err(e) if e.kind() == ErrorKind::NotFound => default_table_permissions(),
            Err(e) => return Err(self.io_error(e)),
        };
        if let Some(permissions) = permissions {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| self.io_error(e))?;
        }

        tmp.persist(&self.path).map_err(|e| self.io_error(e.error))?;

        info!("wrote {} lines to {:?}", lines.len(), self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn default_table_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    // cron ignores drop-in files that are group or world writable
    Some(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_table_permissions() -> Option<fs::Permissions> {
    None
}
