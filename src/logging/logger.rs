//! Structured logger and run summary rendering.
use std::path::PathBuf;

use super::types::Log;
use super::utils::log_file_path;
use crate::engine::summary::{ResultNode, Summary};

/// Structured logger writing through `tracing`.
///
/// All messages are always written to a persistent log file at
/// `$XDG_CACHE_HOME/loadout/<command>.log` (default `~/.cache/loadout/<command>.log`)
/// with timestamps and ANSI codes stripped, regardless of the verbose flag.
#[derive(Debug)]
pub struct Logger {
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Create a new logger.
    ///
    /// Stores the log file path for display in the run summary. The log file
    /// itself is created by [`init_subscriber`](super::subscriber::init_subscriber).
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            log_file: log_file_path(command),
        }
    }

    /// Return the log file path, if available.
    #[must_use]
    pub const fn log_path(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Print the installed and upgraded forests as indented trees.
    pub fn print_summary(&self, summary: &Summary) {
        self.stage("Summary");

        if summary.is_empty() {
            self.info("everything is up to date");
        } else {
            for (title, forest) in [
                ("Installed", &summary.installed),
                ("Upgraded", &summary.upgraded),
            ] {
                if forest.is_empty() {
                    continue;
                }
                self.info(&format!("\x1b[1m{title}\x1b[0m"));
                for line in render_forest(forest) {
                    self.info(&line);
                }
            }
        }

        if let Some(path) = &self.log_file {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    fn stage(&self, msg: &str) {
        tracing::info!(target: "loadout::stage", "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }
}

/// Render `forest` as tree lines using box-drawing connectors.
#[must_use]
pub fn render_forest(forest: &[ResultNode]) -> Vec<String> {
    let mut lines = Vec::new();
    render_level(forest, "", &mut lines);
    lines
}

fn render_level(nodes: &[ResultNode], prefix: &str, lines: &mut Vec<String>) {
    let count = nodes.len();
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        let label = if node.children.is_empty() {
            format!("{} ({})", node.name, node.kind)
        } else {
            node.name.clone()
        };
        lines.push(format!("{prefix}{connector}{label}"));
        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_level(&node.children, &child_prefix, lines);
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::step::StepType;
    use crate::engine::summary::Outcome;
    use crate::logging::isolated_logger;
    use std::fs;

    fn read_log(log: &Logger) -> String {
        fs::read_to_string(log.log_path().expect("log path")).unwrap()
    }

    #[test]
    fn log_file_is_created() {
        let (log, _tmp, _guard) = isolated_logger();
        let path = log.log_path().expect("log path should exist");
        assert!(path.exists(), "log file should be created by the file layer");
    }

    #[test]
    fn debug_always_written_to_file() {
        let (log, _tmp, _guard) = isolated_logger();
        let marker = format!("debug-marker-{}", std::process::id());
        log.debug(&marker);
        let contents = read_log(&log);
        assert!(contents.contains("[debug]"));
        assert!(contents.contains(&marker));
    }

    #[test]
    fn levels_are_tagged_in_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.warn("careful");
        log.error("broken");
        log.stage("Installing");
        let contents = read_log(&log);
        assert!(contents.contains("[warn] careful"));
        assert!(contents.contains("[error] broken"));
        assert!(contents.contains("==> Installing"));
    }

    #[test]
    fn command_output_is_marked_in_file() {
        let (log, _tmp, _guard) = isolated_logger();
        tracing::debug!(target: "loadout::output", "child says hi");
        assert!(read_log(&log).contains("| child says hi"));
    }

    #[test]
    fn ansi_codes_stripped_from_file() {
        let (log, _tmp, _guard) = isolated_logger();
        log.info("\x1b[32mgreen\x1b[0m");
        let contents = read_log(&log);
        assert!(contents.contains("green"));
        assert!(!contents.contains("\x1b["));
    }

    #[test]
    fn logger_usable_as_trait_object() {
        let (log, _tmp, _guard) = isolated_logger();
        let log_ref: &dyn Log = &log;
        log_ref.info("via-trait");
        assert!(read_log(&log).contains("via-trait"));
    }

    #[test]
    fn render_forest_draws_tree() {
        let forest = vec![
            ResultNode::container(
                "cli",
                StepType::Group,
                vec![
                    ResultNode::leaf("rg", StepType::Brew, Outcome::Installed),
                    ResultNode::leaf("fd", StepType::Cargo, Outcome::Installed),
                ],
            ),
            ResultNode::leaf("dotfiles", StepType::Git, Outcome::Installed),
        ];
        assert_eq!(
            render_forest(&forest),
            vec![
                "├── cli",
                "│   ├── rg (brew)",
                "│   └── fd (cargo)",
                "└── dotfiles (git)",
            ]
        );
    }

    #[test]
    fn print_summary_writes_both_sections() {
        let (log, _tmp, _guard) = isolated_logger();
        let summary = Summary {
            installed: vec![ResultNode::leaf("jq", StepType::Apt, Outcome::Installed)],
            upgraded: vec![ResultNode::leaf("node", StepType::Brew, Outcome::Upgraded)],
        };
        log.print_summary(&summary);
        let contents = read_log(&log);
        assert!(contents.contains("Installed"));
        assert!(contents.contains("└── jq (apt)"));
        assert!(contents.contains("Upgraded"));
        assert!(contents.contains("└── node (brew)"));
    }

    #[test]
    fn print_summary_reports_nothing_to_do() {
        let (log, _tmp, _guard) = isolated_logger();
        log.print_summary(&Summary::default());
        assert!(read_log(&log).contains("up to date"));
    }
}
