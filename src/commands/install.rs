//! Command: install missing steps and update outdated ones.
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::CommandSetup;
use crate::cli::{GlobalOpts, InstallOpts};
use crate::engine::{self, Context};
use crate::error::ConfigError;
use crate::exec::{Executor, SystemExecutor};
use crate::installers::github_release::UreqReleaseClient;
use crate::logging::{self, Log, Logger};
use crate::machine::{HostMachineId, MachineIdentity as _};
use crate::manifest::GitManifestFetcher;
use crate::platform::Platform;

/// Run the install command.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or is invalid, or
/// if any step fails.
pub fn run(global: &GlobalOpts, opts: &InstallOpts, log: &Arc<Logger>) -> Result<()> {
    log.info(&format!("loadout {}", super::version::version()));
    let setup = CommandSetup::init(global, log)?;

    let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
    let machine_id = detect_machine_id(setup.platform, executor.as_ref(), &**log);
    let cache_dir = logging::cache_dir().unwrap_or_else(|| PathBuf::from(".loadout-cache"));

    let mut ctx = Context::new(
        setup.platform,
        executor,
        Arc::new(GitManifestFetcher),
        Arc::new(UreqReleaseClient::new()),
        Arc::clone(log) as Arc<dyn Log>,
        cache_dir,
    )
    .with_machine_id(machine_id)
    .with_filters(opts.filter.clone())
    .with_config(&setup.config);
    if let Some(check) = opts.check_updates() {
        ctx = ctx.with_check_updates(check);
    }
    if !ctx.filters.is_empty() {
        log.info(&format!("filter: {}", ctx.filters.join(",")));
    }

    log.stage("Installing");
    let summary = match engine::resolve_and_run(&setup.config, &ctx) {
        Ok(summary) => summary,
        Err(e) => {
            report_validation_errors(&e, &**log);
            return Err(e);
        }
    };

    log.print_summary(&summary);
    Ok(())
}

/// Machine id of this host; `None` (with a warning) when it cannot be read.
pub(crate) fn detect_machine_id(
    platform: Platform,
    executor: &dyn Executor,
    log: &dyn Log,
) -> Option<String> {
    match HostMachineId::new(platform, executor).machine_id() {
        Ok(id) => {
            log.debug(&format!("machine id: {id}"));
            Some(id)
        }
        Err(e) => {
            log.warn(&format!("cannot determine machine id: {e:#}"));
            None
        }
    }
}

/// Log every entry of a validation failure.
pub(crate) fn report_validation_errors(e: &anyhow::Error, log: &dyn Log) {
    if let Some(ConfigError::Invalid(errors)) = e.downcast_ref::<ConfigError>() {
        for error in errors {
            log.error(&error.to_string());
        }
    }
}
