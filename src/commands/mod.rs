//! Subcommand implementations.
//!
//! Each command receives the parsed options and the [`Logger`]; the shared
//! setup (locating and loading the configuration) lives in [`CommandSetup`].
pub mod completions;
pub mod install;
pub mod machine_id;
pub mod validate;
pub mod version;

use std::path::PathBuf;

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::config::{self, AppConfig};
use crate::logging::{Log as _, Logger};
use crate::platform::Platform;

/// Shared state produced by the common command setup sequence.
#[derive(Debug)]
pub struct CommandSetup {
    /// Detected platform.
    pub platform: Platform,
    /// Path of the loaded configuration file.
    pub config_path: PathBuf,
    /// The loaded configuration.
    pub config: AppConfig,
}

impl CommandSetup {
    /// Detect the platform, then locate and load the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no configuration file is found or it fails to
    /// parse.
    pub fn init(global: &GlobalOpts, log: &Logger) -> Result<Self> {
        let platform = Platform::detect();
        log.debug(&format!("platform: {} ({})", platform.os, platform.arch));

        log.stage("Loading configuration");
        let located = config::locate(global.config.as_deref())?;
        let config_path = dunce::canonicalize(&located).unwrap_or(located);
        let config = AppConfig::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?;
        log.info(&format!(
            "{}: {} step(s)",
            config_path.display(),
            config.install.len()
        ));

        Ok(Self {
            platform,
            config_path,
            config,
        })
    }
}

/// Whether the configuration (if one can be found and parsed) sets
/// `debug = true`. Read before logging starts; any problem means `false` and
/// is reported later by [`CommandSetup::init`].
#[must_use]
pub fn config_requests_debug(global: &GlobalOpts) -> bool {
    config::locate(global.config.as_deref())
        .and_then(|path| AppConfig::load(&path))
        .is_ok_and(|config| config.debug)
}
