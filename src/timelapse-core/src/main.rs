//! timelapse - Periodic webcam capture scheduled through cron
//!
//! Installs two jobs in the user's crontab: one capturing a frame every N
//! seconds, one compiling the day's frames into a video at midnight.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use timelapse_capture::{check_program, Device};
use timelapse_core::colored_logger::{init_component_logger, Component};
use timelapse_core::config::Config;
use timelapse_cron::table::CRONTAB_PROGRAM;
use timelapse_cron::{CaptureParameters, JobInstaller, ScheduleTable};
use timelapse_processing::script::{CAPTURE_PROGRAM, ENCODER_PROGRAM};
use timelapse_processing::{render_capture_script, render_timelapse_script};

#[derive(Parser)]
#[command(name = "timelapse")]
#[command(about = "Schedule periodic webcam captures and daily timelapse videos")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Install (or replace) the capture and compilation jobs
    Apply {
        #[command(flatten)]
        capture: CaptureArgs,

        /// Show the resulting schedule table without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Print the plan or install report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove the installed jobs, leaving other entries untouched
    Remove,

    /// Show the installed jobs
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List video devices
    Devices,

    /// Check dependencies (fswebcam, ffmpeg, crontab)
    Check,

    /// Print the scripts that apply would install
    Render {
        #[command(flatten)]
        capture: CaptureArgs,
    },
}

#[derive(Args)]
struct CaptureArgs {
    /// Video device (defaults to the first detected device)
    #[arg(short, long)]
    device: Option<String>,

    /// Seconds between pictures
    #[arg(short, long)]
    interval: Option<String>,

    /// Picture quality: low, medium or high
    #[arg(short, long)]
    quality: Option<String>,

    /// Directory to save images in
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Named profile from the config file
    #[arg(short, long)]
    profile: Option<String>,

    /// Accept a device that is not among the detected devices
    #[arg(long)]
    skip_device_check: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let component = match cli.command {
        Commands::Apply { .. } => Component::Apply,
        Commands::Remove => Component::Remove,
        Commands::Status { .. } => Component::Status,
        Commands::Devices => Component::Devices,
        Commands::Check => Component::Check,
        Commands::Render { .. } => Component::Render,
    };
    init_component_logger(component, cli.verbose)?;

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Apply { capture, dry_run, json } => {
            cmd_apply(config, capture, dry_run, json)?;
        }
        Commands::Remove => {
            cmd_remove(&config)?;
        }
        Commands::Status { json } => {
            cmd_status(&config, json)?;
        }
        Commands::Devices => {
            cmd_devices()?;
        }
        Commands::Check => {
            cmd_check(&config)?;
        }
        Commands::Render { capture } => {
            cmd_render(config, capture)?;
        }
    }

    Ok(())
}

fn installer(config: &Config) -> Result<JobInstaller<Box<dyn ScheduleTable>>> {
    Ok(JobInstaller::new(config.resolve_script_dir(), config.schedule_table()?))
}

/// Merge command line, profile and config file into validated parameters
fn resolve_params(config: Config, args: CaptureArgs) -> Result<CaptureParameters> {
    let config = match args.profile {
        Some(ref profile) => config.apply_profile(profile)?,
        None => config,
    };
    let capture = config.capture;

    let device = match args.device.or(capture.device) {
        Some(device) => device,
        None => {
            let device = Device::get_default().context("no device given and none detected")?;
            info!("using detected device {}", device.id());
            device.id()
        }
    };

    if !args.skip_device_check {
        Device::find(&device)
            .with_context(|| format!("{} is not a detected video device (use --skip-device-check to force)", device))?;
    }

    let interval = args.interval.unwrap_or_else(|| capture.interval_secs.to_string());
    let quality = args.quality.unwrap_or_else(|| capture.quality.to_string());

    let Some(output_dir) = args.output_dir.or(capture.output_dir) else {
        bail!("no output directory given (use --output-dir or capture.output_dir in the config)");
    };
    let output_dir = absolute_dir(&output_dir);

    let params = CaptureParameters::from_raw(&device, &interval, &quality, &output_dir.to_string_lossy())?;
    Ok(params)
}

/// Generated scripts run from cron's working directory, so pin relative
/// paths down now. Paths that cannot be resolved are passed through for
/// validation to report.
fn absolute_dir(dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        return dir.to_path_buf();
    }
    std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

fn cmd_apply(config: Config, args: CaptureArgs, dry_run: bool, json: bool) -> Result<()> {
    let installer = installer(&config)?;
    let params = resolve_params(config, args)?;

    info!(
        "device: {}, interval: {}s, quality: {}, output: {:?}",
        params.device(),
        params.interval_secs(),
        params.quality(),
        params.output_dir()
    );

    if dry_run {
        let plan = installer.plan(&params)?;
        if json {
            let out = serde_json::json!({
                "parameters": params,
                "plan": plan,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }
        println!("# {} existing entries kept, {} replaced", plan.preserved, plan.replaced);
        for line in &plan.lines {
            println!("{}", line);
        }
        return Ok(());
    }

    let report = installer.apply(&params).context("failed to apply settings")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("settings applied");
    for job in &report.jobs {
        println!("  {:8} {} -> {}", job.kind.to_string(), job.schedule, job.command.display());
    }
    if report.replaced > 0 {
        println!("  replaced {} previous entries", report.replaced);
    }

    Ok(())
}

fn cmd_remove(config: &Config) -> Result<()> {
    let removed = installer(config)?.remove().context("failed to remove jobs")?;

    if removed == 0 {
        println!("no timelapse jobs installed");
    } else {
        println!("removed {} timelapse entries", removed);
    }

    Ok(())
}

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let installer = installer(config)?;
    let lines = installer.installed()?;

    if json {
        let status = serde_json::json!({
            "installed": !lines.is_empty(),
            "entries": lines,
            "capture_script": installer.capture_script_path(),
            "timelapse_script": installer.timelapse_script_path(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    if lines.is_empty() {
        println!("status: not installed");
        return Ok(());
    }

    println!("status: installed ({} entries)", lines.len());
    for line in &lines {
        println!("  {}", line);
    }
    for path in [installer.capture_script_path(), installer.timelapse_script_path()] {
        if !path.exists() {
            warn!("script missing: {:?}", path);
        }
    }

    Ok(())
}

fn cmd_devices() -> Result<()> {
    let devices = Device::enumerate_all()?;

    if devices.is_empty() {
        println!("no cameras detected");
        return Ok(());
    }

    println!("found {} device(s):\n", devices.len());

    for d in &devices {
        println!(
            "  {} {}",
            d.path.display(),
            d.label.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    println!("checking dependencies...\n");

    let table_program = config
        .table
        .program
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| CRONTAB_PROGRAM.to_string());

    let mut missing = Vec::new();
    for program in [CAPTURE_PROGRAM, ENCODER_PROGRAM, table_program.as_str()] {
        let status = check_program(program);
        println!(
            "  {:10} {}",
            format!("{}:", status.program),
            if status.available { "OK" } else { "NOT FOUND" }
        );
        if !status.available {
            missing.push(status.program);
        }
    }

    let devices = Device::enumerate_all().map(|d| d.len()).unwrap_or(0);
    println!("  {:10} {} found", "cameras:", devices);

    println!();

    if missing.is_empty() && devices > 0 {
        println!("all checks passed!");
    } else {
        if !missing.is_empty() {
            println!("WARNING: missing programs: {}", missing.join(", "));
        }
        if devices == 0 {
            println!("WARNING: no cameras detected.");
        }
    }

    Ok(())
}

fn cmd_render(config: Config, args: CaptureArgs) -> Result<()> {
    let params = resolve_params(config, args)?;

    println!("# capture script");
    print!(
        "{}",
        render_capture_script(params.output_dir(), params.quality(), params.device())
    );
    println!();
    println!("# compilation script");
    print!("{}", render_timelapse_script(params.output_dir()));

    Ok(())
}
