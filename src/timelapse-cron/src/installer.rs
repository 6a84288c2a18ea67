//! Tag-scoped installation of the capture and compilation jobs

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, info_span, warn};

use timelapse_processing::script::{CAPTURE_SCRIPT_NAME, TIMELAPSE_SCRIPT_NAME};
use timelapse_processing::{render_capture_script, render_timelapse_script};

use crate::error::InstallError;
use crate::job::{JobSpec, OWNERSHIP_TAG};
use crate::params::CaptureParameters;
use crate::table::{checksum, ScheduleTable};
use crate::Result;

/// Attempts at a read-modify-write before giving up on a table that keeps
/// changing underneath us
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Progress of a single `apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Validating,
    RenderingScripts,
    ReadingTable,
    ComputingDiff,
    WritingTable,
    Done,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyStage::Validating => "validating",
            ApplyStage::RenderingScripts => "rendering scripts",
            ApplyStage::ReadingTable => "reading table",
            ApplyStage::ComputingDiff => "computing diff",
            ApplyStage::WritingTable => "writing table",
            ApplyStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Whether `line` was written by this system
pub fn is_owned(line: &str) -> bool {
    line.contains(OWNERSHIP_TAG)
}

/// A computed replacement table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablePlan {
    pub lines: Vec<String>,
    /// Foreign lines carried over unchanged
    pub preserved: usize,
    /// Previously installed tagged lines dropped
    pub replaced: usize,
}

/// Drop every owned line from `existing` and append `jobs`.
///
/// Foreign lines keep their text and relative order.
pub fn compute_table(existing: &[String], jobs: &[JobSpec]) -> TablePlan {
    let mut lines: Vec<String> = existing.iter().filter(|l| !is_owned(l)).cloned().collect();
    let preserved = lines.len();
    let replaced = existing.len() - preserved;
    lines.extend(jobs.iter().map(JobSpec::to_line));

    TablePlan {
        lines,
        preserved,
        replaced,
    }
}

/// Outcome of a successful `apply`
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub parameters: CaptureParameters,
    pub capture_script: PathBuf,
    pub timelapse_script: PathBuf,
    pub jobs: Vec<JobSpec>,
    pub preserved: usize,
    pub replaced: usize,
    pub attempts: u32,
}

/// Installs the timelapse jobs into a schedule table.
///
/// Scripts live at fixed paths under `script_dir` and are overwritten on
/// every apply. The table is re-read on every call, never cached.
pub struct JobInstaller<T: ScheduleTable> {
    script_dir: PathBuf,
    table: T,
}

impl<T: ScheduleTable> JobInstaller<T> {
    pub fn new(script_dir: impl Into<PathBuf>, table: T) -> Self {
        Self {
            script_dir: script_dir.into(),
            table,
        }
    }

    pub fn capture_script_path(&self) -> PathBuf {
        self.script_dir.join(CAPTURE_SCRIPT_NAME)
    }

    pub fn timelapse_script_path(&self) -> PathBuf {
        self.script_dir.join(TIMELAPSE_SCRIPT_NAME)
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Both job specs for `params`: capture, then compilation
    pub fn job_specs(&self, params: &CaptureParameters) -> Result<Vec<JobSpec>> {
        Ok(vec![
            JobSpec::capture(params.interval_secs(), self.capture_script_path())?,
            JobSpec::compile(self.timelapse_script_path())?,
        ])
    }

    /// Validate, render the scripts and replace the tagged table entries.
    pub fn apply(&self, params: &CaptureParameters) -> Result<InstallReport> {
        let _span = info_span!("apply", device = %params.device(), interval_secs = params.interval_secs()).entered();

        enter(ApplyStage::Validating);
        params.validate()?;
        let jobs = self.job_specs(params)?;

        enter(ApplyStage::RenderingScripts);
        let capture_script = self.capture_script_path();
        let timelapse_script = self.timelapse_script_path();
        fs::create_dir_all(&self.script_dir).map_err(|source| InstallError::ScriptWrite {
            path: self.script_dir.clone(),
            source,
        })?;
        write_script(
            &capture_script,
            &render_capture_script(params.output_dir(), params.quality(), params.device()),
        )?;
        write_script(&timelapse_script, &render_timelapse_script(params.output_dir()))?;

        let (plan, attempts) = self.replace_owned(&jobs)?;

        enter(ApplyStage::Done);
        info!(
            "installed {} jobs ({} foreign lines kept, {} old entries replaced)",
            jobs.len(),
            plan.preserved,
            plan.replaced
        );

        Ok(InstallReport {
            parameters: params.clone(),
            capture_script,
            timelapse_script,
            jobs,
            preserved: plan.preserved,
            replaced: plan.replaced,
            attempts,
        })
    }

    /// Compute the table `apply` would install, without writing anything.
    pub fn plan(&self, params: &CaptureParameters) -> Result<TablePlan> {
        let _span = info_span!("plan", device = %params.device(), interval_secs = params.interval_secs()).entered();

        params.validate()?;
        let jobs = self.job_specs(params)?;
        let current = self.read_table()?;
        Ok(compute_table(&current, &jobs))
    }

    /// Remove every tagged entry, returning how many were dropped.
    ///
    /// Generated scripts are left on disk.
    pub fn remove(&self) -> Result<usize> {
        let _span = info_span!("remove").entered();

        let (plan, _) = self.replace_owned(&[])?;
        info!("removed {} timelapse entries", plan.replaced);
        Ok(plan.replaced)
    }

    /// Tagged lines currently installed
    pub fn installed(&self) -> Result<Vec<String>> {
        Ok(self.read_table()?.into_iter().filter(|l| is_owned(l)).collect())
    }

    fn read_table(&self) -> Result<Vec<String>> {
        self.table.read().map_err(InstallError::TableRead)
    }

    /// Read-modify-write of the table, swapping owned lines for `jobs`.
    ///
    /// The table is re-read right before writing; if its checksum moved, the
    /// plan is recomputed from the fresh copy.
    fn replace_owned(&self, jobs: &[JobSpec]) -> Result<(TablePlan, u32)> {
        enter(ApplyStage::ReadingTable);
        let mut current = self.read_table()?;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            enter(ApplyStage::ComputingDiff);
            let expected = checksum(&current);
            let plan = compute_table(&current, jobs);

            enter(ApplyStage::WritingTable);
            let latest = self.read_table()?;
            if checksum(&latest) != expected {
                warn!(attempt, "schedule table changed during update, recomputing");
                current = latest;
                continue;
            }

            if plan.lines == current {
                debug!("schedule table already up to date");
            }
            self.table.write(&plan.lines).map_err(InstallError::TableWrite)?;
            return Ok((plan, attempt));
        }

        Err(InstallError::TableChanged {
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }
}

fn enter(stage: ApplyStage) {
    debug!(%stage, "entering stage");
}

/// Atomically replace `path` with an executable script.
fn write_script(path: &Path, body: &str) -> Result<()> {
    let err = |source| InstallError::ScriptWrite {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(err)?;
    tmp.write_all(body.as_bytes()).map_err(err)?;
    tmp.as_file().sync_all().map_err(err)?;
    set_executable(tmp.as_file()).map_err(err)?;
    tmp.persist(path).map_err(|e| err(e.error))?;

    debug!("wrote script {:?}", path);
    Ok(())
}

#[cfg(unix)]
fn set_executable(file: &fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_file: &fs::File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Field, TableError};
    use crate::table::FileTable;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;
    use timelapse_processing::QualityTier;

    /// In-memory table that can simulate a concurrent editor and failures.
    #[derive(Default)]
    struct MemoryTable {
        lines: RefCell<Vec<String>>,
        /// Line appended on every read, simulating another editor
        intruder: Option<String>,
        /// Line appended once, on the given read (1-based)
        edit_on_read: Option<(u32, String)>,
        reads: Cell<u32>,
        writes: Cell<u32>,
        fail_read: bool,
        fail_write: bool,
    }

    impl MemoryTable {
        fn with(lines: &[&str]) -> Self {
            Self {
                lines: RefCell::new(lines.iter().map(|s| s.to_string()).collect()),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> Vec<String> {
            self.lines.borrow().clone()
        }

        fn failure() -> TableError {
            TableError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            }
        }
    }

    impl ScheduleTable for MemoryTable {
        fn read(&self) -> std::result::Result<Vec<String>, TableError> {
            if self.fail_read {
                return Err(Self::failure());
            }
            self.reads.set(self.reads.get() + 1);
            if let Some(ref line) = self.intruder {
                self.lines.borrow_mut().push(format!("{} {}", line, self.reads.get()));
            }
            if let Some((at, ref line)) = self.edit_on_read {
                if at == self.reads.get() {
                    self.lines.borrow_mut().push(line.clone());
                }
            }
            Ok(self.snapshot())
        }

        fn write(&self, lines: &[String]) -> std::result::Result<(), TableError> {
            if self.fail_write {
                return Err(Self::failure());
            }
            self.writes.set(self.writes.get() + 1);
            *self.lines.borrow_mut() = lines.to_vec();
            Ok(())
        }
    }

    struct Fixture {
        _root: TempDir,
        scripts: PathBuf,
        shots: PathBuf,
    }

    fn fixture() -> Fixture {
        let root = TempDir::new().unwrap();
        let scripts = root.path().join("scripts");
        let shots = root.path().join("shots");
        fs::create_dir(&shots).unwrap();
        Fixture {
            _root: root,
            scripts,
            shots,
        }
    }

    fn params(f: &Fixture, quality: QualityTier) -> CaptureParameters {
        CaptureParameters::new("/dev/video0", 30, quality, &f.shots).unwrap()
    }

    fn owned(lines: &[String]) -> Vec<String> {
        lines.iter().filter(|l| is_owned(l)).cloned().collect()
    }

    #[test]
    fn test_scenario_empty_table() {
        let f = fixture();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::default());

        let report = installer.apply(&params(&f, QualityTier::Medium)).unwrap();

        let table = installer.table().snapshot();
        let capture = installer.capture_script_path();
        let compile = installer.timelapse_script_path();
        assert_eq!(
            table,
            vec![
                format!(
                    "* * * * * for s in 0 30; do (sleep $s; '{}') & done #timelapse",
                    capture.display()
                ),
                format!("0 0 * * * '{}' #timelapse", compile.display()),
            ]
        );
        assert_eq!(report.jobs.len(), 2);
        assert_eq!(report.jobs[0].schedule.to_string(), "every 30 seconds");
        assert_eq!(report.jobs[1].schedule.to_string(), "once daily at 00:00");
        assert_eq!(report.attempts, 1);

        let body = fs::read_to_string(&capture).unwrap();
        assert!(body.contains("--resolution 1280x720"));
        assert!(body.contains("/dev/video0"));
        assert!(body.contains(&format!("DIR='{}'", f.shots.display())));
        let body = fs::read_to_string(&compile).unwrap();
        assert!(body.contains("timelapse.mp4"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for path in [&capture, &compile] {
                let mode = fs::metadata(path).unwrap().permissions().mode();
                assert_eq!(mode & 0o777, 0o755, "{:?}", path);
            }
        }
    }

    #[test]
    fn test_reapply_high_keeps_foreign_lines() {
        let f = fixture();
        let foreign = ["MAILTO=ops@example.com", "", "  15 3 * * * /usr/bin/backup --all  "];
        let installer = JobInstaller::new(&f.scripts, MemoryTable::with(&foreign));

        installer.apply(&params(&f, QualityTier::Medium)).unwrap();
        let report = installer.apply(&params(&f, QualityTier::High)).unwrap();

        let table = installer.table().snapshot();
        assert_eq!(&table[..3], &foreign.map(String::from)[..]);
        assert_eq!(owned(&table).len(), 2);
        assert_eq!(report.preserved, 3);
        assert_eq!(report.replaced, 2);

        let body = fs::read_to_string(installer.capture_script_path()).unwrap();
        assert!(body.contains("--resolution 1920x1080"));
        assert!(!body.contains("1280x720"));
    }

    #[test]
    fn test_apply_is_idempotent() {
        let f = fixture();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::with(&["0 * * * * /bin/true"]));
        let p = params(&f, QualityTier::Low);

        installer.apply(&p).unwrap();
        let first = installer.table().snapshot();
        let first_script = fs::read(installer.capture_script_path()).unwrap();

        installer.apply(&p).unwrap();
        assert_eq!(installer.table().snapshot(), first);
        assert_eq!(fs::read(installer.capture_script_path()).unwrap(), first_script);
    }

    #[test]
    fn test_replaces_all_stale_tagged_lines() {
        let f = fixture();
        let installer = JobInstaller::new(
            &f.scripts,
            MemoryTable::with(&[
                "*/5 * * * * /home/u/capture_image.sh #timelapse",
                "@reboot /usr/bin/foo",
                "0 0 * * * /home/u/create_timelapse.sh #timelapse",
                "*/1 * * * * /old/capture_image.sh #timelapse",
            ]),
        );

        let report = installer.apply(&params(&f, QualityTier::Medium)).unwrap();
        let table = installer.table().snapshot();

        assert_eq!(report.replaced, 3);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0], "@reboot /usr/bin/foo");
        assert_eq!(owned(&table).len(), 2);
        assert!(!table.iter().any(|l| l.contains("/old/")));
    }

    #[test]
    fn test_compute_table_tag_isolation() {
        let existing: Vec<String> = ["b", "a", "#timelapse junk", "c"].iter().map(|s| s.to_string()).collect();
        let jobs = vec![JobSpec::compile("/x/create_timelapse.sh").unwrap()];

        let plan = compute_table(&existing, &jobs);
        assert_eq!(plan.lines[..3], ["b", "a", "c"]);
        assert_eq!(plan.lines.len(), 4);
        assert_eq!(plan.preserved, 3);
        assert_eq!(plan.replaced, 1);
    }

    #[test]
    fn test_validation_error_has_no_side_effects() {
        let f = fixture();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::with(&["keep"]));
        let p = params(&f, QualityTier::Low);
        fs::remove_dir(&f.shots).unwrap();

        let err = installer.apply(&p).unwrap_err();
        assert!(matches!(err, InstallError::Validation(ref v) if v.field == Field::OutputDir));
        assert_eq!(err.stage(), ApplyStage::Validating);
        assert!(!f.scripts.exists());
        assert_eq!(installer.table().reads.get(), 0);
        assert_eq!(installer.table().snapshot(), vec!["keep".to_string()]);
    }

    #[test]
    fn test_script_write_failure_skips_table() {
        let f = fixture();
        // A file where the script directory should be
        fs::write(&f.scripts, b"").unwrap();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::default());

        let err = installer.apply(&params(&f, QualityTier::Low)).unwrap_err();
        assert!(matches!(err, InstallError::ScriptWrite { .. }));
        assert_eq!(err.stage(), ApplyStage::RenderingScripts);
        assert_eq!(installer.table().reads.get(), 0);
    }

    #[test]
    fn test_table_read_failure() {
        let f = fixture();
        let table = MemoryTable {
            fail_read: true,
            ..Default::default()
        };
        let installer = JobInstaller::new(&f.scripts, table);

        let err = installer.apply(&params(&f, QualityTier::Low)).unwrap_err();
        assert!(matches!(err, InstallError::TableRead(_)));
        assert_eq!(err.stage(), ApplyStage::ReadingTable);
    }

    #[test]
    fn test_table_write_failure_leaves_table() {
        let f = fixture();
        let table = MemoryTable {
            lines: RefCell::new(vec!["keep".to_string()]),
            fail_write: true,
            ..Default::default()
        };
        let installer = JobInstaller::new(&f.scripts, table);

        let err = installer.apply(&params(&f, QualityTier::Low)).unwrap_err();
        assert!(matches!(err, InstallError::TableWrite(_)));
        assert_eq!(err.stage(), ApplyStage::WritingTable);
        assert_eq!(installer.table().snapshot(), vec!["keep".to_string()]);
    }

    #[test]
    fn test_concurrent_editor_exhausts_attempts() {
        let f = fixture();
        let table = MemoryTable {
            intruder: Some("# edited by someone else".to_string()),
            ..Default::default()
        };
        let installer = JobInstaller::new(&f.scripts, table);

        let err = installer.apply(&params(&f, QualityTier::Low)).unwrap_err();
        assert!(matches!(err, InstallError::TableChanged { attempts: MAX_WRITE_ATTEMPTS }));
        assert_eq!(installer.table().writes.get(), 0);
        assert_eq!(installer.table().reads.get(), MAX_WRITE_ATTEMPTS + 1);
    }

    #[test]
    fn test_concurrent_edit_is_merged() {
        let f = fixture();
        let edit = "30 2 * * * /usr/local/bin/sync-photos".to_string();
        // Read 1 is the initial read, read 2 the check right before writing
        let table = MemoryTable {
            lines: RefCell::new(vec!["MAILTO=\"\"".to_string(), "#timelapse stale".to_string()]),
            edit_on_read: Some((2, edit.clone())),
            ..Default::default()
        };
        let installer = JobInstaller::new(&f.scripts, table);

        let report = installer.apply(&params(&f, QualityTier::Low)).unwrap();
        assert_eq!(report.attempts, 2);
        assert_eq!(report.preserved, 2);
        assert_eq!(report.replaced, 1);

        let table = installer.table().snapshot();
        assert_eq!(table.len(), 4);
        assert_eq!(table[0], "MAILTO=\"\"");
        assert_eq!(table[1], edit);
        assert_eq!(owned(&table).len(), 2);
        assert_eq!(&table[2..], &owned(&table)[..]);
        assert_eq!(owned(&table), report.jobs.iter().map(JobSpec::to_line).collect::<Vec<_>>());
        assert_eq!(installer.table().reads.get(), 3);
        assert_eq!(installer.table().writes.get(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let f = fixture();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::with(&["a"]));

        let report = installer.apply(&params(&f, QualityTier::High)).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["parameters"]["device"], "/dev/video0");
        assert_eq!(json["parameters"]["interval_secs"], 30);
        assert_eq!(json["parameters"]["quality"], "high");
        assert_eq!(json["jobs"][0]["kind"], "capture");
        assert_eq!(json["jobs"][1]["schedule"]["kind"], "daily_at");
        assert_eq!(json["preserved"], 1);
        assert_eq!(json["attempts"], 1);

        let plan = installer.plan(&params(&f, QualityTier::High)).unwrap();
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["lines"][0], "a");
        assert_eq!(json["replaced"], 2);
    }

    #[test]
    fn test_remove_keeps_foreign_lines() {
        let f = fixture();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::with(&["a", "b"]));
        installer.apply(&params(&f, QualityTier::Low)).unwrap();
        assert_eq!(installer.installed().unwrap().len(), 2);

        assert_eq!(installer.remove().unwrap(), 2);
        assert_eq!(installer.table().snapshot(), vec!["a".to_string(), "b".to_string()]);
        assert!(installer.installed().unwrap().is_empty());
        assert!(installer.capture_script_path().exists());

        assert_eq!(installer.remove().unwrap(), 0);
    }

    #[test]
    fn test_plan_writes_nothing() {
        let f = fixture();
        let installer = JobInstaller::new(&f.scripts, MemoryTable::with(&["a"]));

        let plan = installer.plan(&params(&f, QualityTier::Low)).unwrap();
        assert_eq!(plan.lines.len(), 3);
        assert_eq!(installer.table().writes.get(), 0);
        assert!(!f.scripts.exists());
    }

    #[test]
    fn test_apply_with_file_table() {
        let f = fixture();
        let path = f.shots.join("crontab");
        fs::write(&path, "SHELL=/bin/sh\n0 4 * * * /usr/sbin/logrotate\n").unwrap();
        let installer = JobInstaller::new(&f.scripts, FileTable::new(&path));

        installer.apply(&params(&f, QualityTier::Medium)).unwrap();
        installer.apply(&params(&f, QualityTier::Medium)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("SHELL=/bin/sh\n0 4 * * * /usr/sbin/logrotate\n"));
        assert_eq!(content.matches(OWNERSHIP_TAG).count(), 2);
        assert!(content.ends_with("#timelapse\n"));
    }
}
