//! Job definitions and their crontab rendering

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use timelapse_processing::quote;

use crate::error::{Field, ValidationError};

/// Marker appended to every table line this system writes.
///
/// Lines containing this substring are considered owned and are replaced
/// wholesale on every apply; nothing else in the table is ever modified.
pub const OWNERSHIP_TAG: &str = "#timelapse";

/// When a job fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Repeat every N seconds
    EverySeconds { secs: u32 },
    /// Fire every day at HH:MM local time
    DailyAt { hour: u8, minute: u8 },
}

impl Schedule {
    pub const MIDNIGHT: Schedule = Schedule::DailyAt { hour: 0, minute: 0 };

    pub fn every_seconds(secs: u32) -> Self {
        Schedule::EverySeconds { secs }
    }

    /// Cron timing for this schedule, or `None` if cron cannot fire it at
    /// exactly this cadence.
    pub fn cron_timing(&self) -> Option<CronTiming> {
        match *self {
            Schedule::EverySeconds { secs } => every_seconds_timing(secs),
            Schedule::DailyAt { hour, minute } if hour < 24 && minute < 60 => {
                Some(CronTiming::plain(format!("{} {} * * *", minute, hour)))
            }
            Schedule::DailyAt { .. } => None,
        }
    }
}

/// Cron fires on minute boundaries only, so an interval of `secs` is laid
/// out over the shortest cycle cron can repeat: a divisor of the hour
/// (minute field) or of the day (hour field). Within each cycle the job is
/// launched at `0, secs, 2*secs, ...` seconds.
fn every_seconds_timing(secs: u32) -> Option<CronTiming> {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if secs == 0 {
        return None;
    }
    let n = u64::from(secs);

    let period = lcm(n, MINUTE);
    if HOUR % period == 0 {
        let fields = match period / MINUTE {
            1 => "* * * * *".to_string(),
            60 => "0 * * * *".to_string(),
            m => format!("*/{} * * * *", m),
        };
        return Some(CronTiming::staggered(fields, n, period));
    }

    let period = lcm(n, HOUR);
    if DAY % period == 0 {
        let fields = match period / HOUR {
            1 => "0 * * * *".to_string(),
            24 => "0 0 * * *".to_string(),
            h => format!("0 */{} * * *", h),
        };
        return Some(CronTiming::staggered(fields, n, period));
    }

    None
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::EverySeconds { secs } => write!(f, "every {} seconds", secs),
            Schedule::DailyAt { hour, minute } => write!(f, "once daily at {:02}:{:02}", hour, minute),
        }
    }
}

/// The five cron time fields plus in-cycle launch offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronTiming {
    pub fields: String,
    /// Seconds into each firing at which to launch; empty means launch once
    pub offsets: Vec<u32>,
}

impl CronTiming {
    fn plain(fields: impl Into<String>) -> Self {
        Self {
            fields: fields.into(),
            offsets: Vec::new(),
        }
    }

    /// Launch every `step` seconds across each `period` second firing
    fn staggered(fields: String, step: u64, period: u64) -> Self {
        if step >= period {
            return Self::plain(fields);
        }
        let offsets = (0..period)
            .step_by(step as usize)
            .filter_map(|o| u32::try_from(o).ok())
            .collect();
        Self { fields, offsets }
    }

    /// Render a full table entry (without the ownership tag) for `command`,
    /// which must already be shell-quoted.
    fn entry(&self, command: &str) -> String {
        if self.offsets.is_empty() {
            return format!("{} {}", self.fields, command);
        }
        let offsets: Vec<String> = self.offsets.iter().map(|o| o.to_string()).collect();
        format!(
            "{} for s in {}; do (sleep $s; {}) & done",
            self.fields,
            offsets.join(" "),
            command
        )
    }
}

/// Which of the two managed jobs a spec describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Capture,
    Compile,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Capture => f.write_str("capture"),
            JobKind::Compile => f.write_str("compile"),
        }
    }
}

/// A scheduled job: a schedule paired with the script it runs.
///
/// Never persisted on its own; it only exists as one tagged table line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSpec {
    pub kind: JobKind,
    pub schedule: Schedule,
    pub command: PathBuf,
    #[serde(skip)]
    timing: CronTiming,
}

impl JobSpec {
    pub fn new(kind: JobKind, schedule: Schedule, command: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        let command = command.into();

        let timing = schedule.cron_timing().ok_or_else(|| unschedulable(&schedule))?;

        check_command_path(&command)?;

        Ok(Self {
            kind,
            schedule,
            command,
            timing,
        })
    }

    /// Capture job firing every `interval_secs`
    pub fn capture(interval_secs: u32, script: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        Self::new(JobKind::Capture, Schedule::every_seconds(interval_secs), script)
    }

    /// Compilation job firing daily at midnight
    pub fn compile(script: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        Self::new(JobKind::Compile, Schedule::MIDNIGHT, script)
    }

    pub fn tag(&self) -> &'static str {
        OWNERSHIP_TAG
    }

    /// Render as a single crontab line ending in the ownership tag
    pub fn to_line(&self) -> String {
        // cron turns an unescaped % into a newline
        let command = quote(&self.command.to_string_lossy()).replace('%', "\\%");
        format!("{} {}", self.timing.entry(&command), OWNERSHIP_TAG)
    }
}

pub(crate) fn unschedulable(schedule: &Schedule) -> ValidationError {
    ValidationError::new(
        Field::Interval,
        format!(
            "{} cannot be repeated exactly by cron (it must tile one hour or one day)",
            schedule
        ),
    )
}

fn check_command_path(path: &Path) -> Result<(), ValidationError> {
    let Some(s) = path.to_str() else {
        return Err(ValidationError::new(Field::ScriptDir, format!("{:?} is not valid UTF-8", path)));
    };
    if s.contains('\n') || s.contains('\r') {
        return Err(ValidationError::new(Field::ScriptDir, "path contains a line break"));
    }
    if !path.is_absolute() {
        return Err(ValidationError::new(Field::ScriptDir, format!("{} is not an absolute path", s)));
    }
    Ok(())
}
