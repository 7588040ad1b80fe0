//! Command: check the configuration without touching the host.
use anyhow::{Result, bail};

use super::CommandSetup;
use crate::cli::GlobalOpts;
use crate::engine;
use crate::error::ValidationError;
use crate::logging::{Log as _, Logger};

/// Run the validate command.
///
/// Every declared step is checked, including those that do not apply to
/// this host. Steps of remote manifests are only checked when fetched during
/// `install`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or any problem is
/// found.
pub fn run(global: &GlobalOpts, log: &Logger) -> Result<()> {
    let setup = CommandSetup::init(global, log)?;

    log.stage("Validating");
    let errors = engine::validate_all(&setup.config);
    for error in &errors {
        log.error(&error.to_string());
    }
    if !errors.is_empty() {
        bail!("{}", summary_line(&errors));
    }

    log.info(&format!("{} is valid", setup.config_path.display()));
    Ok(())
}

fn summary_line(errors: &[ValidationError]) -> String {
    let steps = errors
        .iter()
        .map(|e| e.step.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    format!("{} validation error(s) in {steps} step(s)", errors.len())
}
