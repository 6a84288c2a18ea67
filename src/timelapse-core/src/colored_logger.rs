//! Colored logging infrastructure for component identification
//!
//! Provides a custom tracing formatter that prefixes every line with the
//! command being run (apply, remove, status, ...) followed by the open span
//! scope, so installer stages read as `apply{device=/dev/video0}: ...`.

use owo_colors::{OwoColorize, Style};
use std::fmt;
use std::io;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{
    format::{Writer, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Component identifier for prefixing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Apply,
    Remove,
    Status,
    Devices,
    Check,
    Render,
}

impl Component {
    /// Get the string representation for logging prefix
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Apply => "APPLY",
            Component::Remove => "REMOVE",
            Component::Status => "STATUS",
            Component::Devices => "DEVICES",
            Component::Check => "CHECK",
            Component::Render => "RENDER",
        }
    }

    /// Get the color style for this component
    pub fn color_style(&self) -> Style {
        match self {
            Component::Apply => Style::new().green().bold(),
            Component::Remove => Style::new().red().bold(),
            Component::Status => Style::new().cyan().bold(),
            Component::Devices => Style::new().yellow().bold(),
            Component::Check => Style::new().magenta().bold(),
            Component::Render => Style::new().blue().bold(),
        }
    }
}

/// Custom formatter with component prefixes and colors
pub struct ColoredFormatter {
    pub component: Component,
    /// Also print the emitting module (verbose mode)
    pub show_target: bool,
}

/// Last path segment of a tracing target (`timelapse_cron::installer` -> `installer`)
fn short_target(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

impl<S, N> FormatEvent<S, N> for ColoredFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        // Timestamp (HH:MM:SS format)
        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%H:%M:%S").dimmed())?;

        // Component prefix with color
        let prefix = format!("[{:8}]", self.component.as_str());
        write!(writer, "{} ", prefix.style(self.component.color_style()))?;

        // Log level with appropriate color
        let level = metadata.level();
        match *level {
            Level::ERROR => write!(writer, "{} ", "ERROR".red().bold())?,
            Level::WARN => write!(writer, "{} ", "WARN ".yellow().bold())?,
            Level::INFO => write!(writer, "{} ", "INFO ".green().bold())?,
            Level::DEBUG => write!(writer, "{} ", "DEBUG".blue().bold())?,
            Level::TRACE => write!(writer, "{} ", "TRACE".dimmed().bold())?,
        }

        if self.show_target {
            write!(writer, "{} ", format!("{}:", short_target(metadata.target())).dimmed())?;
        }

        // Span scope, outermost first
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name().bold())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        // Message content
        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Initialize colored logging for a specific component
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` directives are honored on top of the base level.
pub fn init_component_logger(component: Component, verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(ColoredFormatter {
            component,
            show_target: verbose,
        })
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(level.into()))
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
