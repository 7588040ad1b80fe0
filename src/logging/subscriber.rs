//! Tracing subscriber wiring for `loadout`.
//!
//! Every event is classified once into a [`LineKind`], which then renders
//! either the coloured console line or the plain, timestamped log-file line.
//! Console verbosity follows `--verbose` unless `LOADOUT_LOG` holds an
//! [`EnvFilter`] directive such as `loadout=debug`.
use std::fs;
use std::io::Write as _;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use super::utils::{format_utc_datetime, format_utc_time, log_file_path, strip_ansi};

/// Target of stage headers emitted by the logger.
const STAGE_TARGET: &str = "loadout::stage";
/// Target of lines forwarded from child processes.
const OUTPUT_TARGET: &str = "loadout::output";
/// Environment variable overriding the console filter.
const FILTER_ENV: &str = "LOADOUT_LOG";

/// Presentation class of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Stage,
    Info,
    Output,
    Debug,
    Warn,
    Error,
}

impl LineKind {
    fn of(level: Level, target: &str) -> Self {
        match (level, target) {
            (Level::ERROR, _) => Self::Error,
            (Level::WARN, _) => Self::Warn,
            (Level::INFO, STAGE_TARGET) => Self::Stage,
            (Level::INFO, _) => Self::Info,
            (_, OUTPUT_TARGET) => Self::Output,
            _ => Self::Debug,
        }
    }

    fn console(self, msg: &str) -> String {
        match self {
            Self::Stage => format!("\x1b[1;34m==>\x1b[0m \x1b[1m{msg}\x1b[0m"),
            Self::Info => format!("  {msg}"),
            Self::Output => format!("    \x1b[2m{msg}\x1b[0m"),
            Self::Debug => format!("  \x1b[2m{msg}\x1b[0m"),
            Self::Warn => format!("\x1b[33mWARN\x1b[0m  {msg}"),
            Self::Error => format!("\x1b[31mERROR\x1b[0m {msg}"),
        }
    }

    fn file(self, ts: &str, msg: &str) -> String {
        let msg = strip_ansi(msg);
        match self {
            Self::Stage => format!("[{ts}] ==> {msg}"),
            Self::Info => format!("[{ts}]     {msg}"),
            Self::Output => format!("[{ts}]     | {msg}"),
            Self::Debug => format!("[{ts}]     [debug] {msg}"),
            Self::Warn => format!("[{ts}]     [warn] {msg}"),
            Self::Error => format!("[{ts}]     [error] {msg}"),
        }
    }
}

/// Classify `event` and pull out its `message` field.
fn classify(event: &tracing::Event<'_>) -> (LineKind, String) {
    #[derive(Default)]
    struct Message(String);

    impl tracing::field::Visit for Message {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }

        fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
            if field.name() == "message" {
                self.0 = value.to_string();
            }
        }
    }

    let metadata = event.metadata();
    let mut message = Message::default();
    event.record(&mut message);
    (LineKind::of(*metadata.level(), metadata.target()), message.0)
}

/// Layer appending every event to the per-command log file.
///
/// Receives `DEBUG` and above whatever the console verbosity is.
#[derive(Debug)]
pub(super) struct FileLayer {
    file: Mutex<fs::File>,
}

impl FileLayer {
    /// Truncate the log file for `command`, write the run header and open it
    /// for appending. `None` when the cache directory is unusable.
    pub(super) fn new(command: &str) -> Option<Self> {
        let path = log_file_path(command)?;
        let version =
            option_env!("LOADOUT_VERSION").unwrap_or(concat!("dev-", env!("CARGO_PKG_VERSION")));
        fs::write(
            &path,
            format!("# loadout {version} {command} started {}\n", format_utc_datetime()),
        )
        .ok()?;
        let file = fs::OpenOptions::new().append(true).open(&path).ok()?;
        Some(Self {
            file: Mutex::new(file),
        })
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for FileLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let (kind, msg) = classify(event);
        let line = kind.file(&format_utc_time(), &msg);
        if let Ok(mut f) = self.file.lock() {
            writeln!(f, "{line}").ok();
        }
    }
}

/// Console event format.
struct ConsoleFormat;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for ConsoleFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let (kind, msg) = classify(event);
        writeln!(writer, "{}", kind.console(&msg))
    }
}

/// Console filter: `LOADOUT_LOG` when it parses, else `debug` or `info`.
fn console_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    })
}

/// Install the global subscriber: console output (warnings and errors on
/// stderr, the rest on stdout) plus the log file under the cache directory.
///
/// Call once, before anything logs.
pub fn init_subscriber(verbose: bool, command: &str) {
    use tracing_subscriber::fmt::writer::MakeWriterExt as _;
    use tracing_subscriber::{
        Layer as _, filter::LevelFilter, fmt, layer::SubscriberExt as _,
        util::SubscriberInitExt as _,
    };

    let writer = std::io::stderr
        .with_max_level(Level::WARN)
        .and(std::io::stdout.with_min_level(Level::INFO));

    let console = fmt::layer()
        .event_format(ConsoleFormat)
        .with_writer(writer)
        .with_filter(console_filter(verbose));

    let file = FileLayer::new(command).map(|l| l.with_filter(LevelFilter::DEBUG));

    tracing_subscriber::registry().with(console).with(file).init();
}
