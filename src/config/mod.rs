//! Configuration model and loading.
//!
//! A configuration file is a TOML (or JSON) document with top-level settings
//! and an ordered `install` list of [`step::StepDeclaration`]s:
//!
//! ```toml
//! check_updates = true
//!
//! [machine_aliases]
//! laptop = "3f2a9c0d1e6b4a57"
//!
//! [defaults.type.apt]
//! env = { DEBIAN_FRONTEND = "noninteractive" }
//!
//! [[install]]
//! name = "ripgrep"
//! type = "brew"
//! bin_name = "rg"
//! ```
pub mod defaults;
pub mod loader;
pub mod step;
pub mod validation;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::exec::Env;
use crate::platform::Os;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "LOADOUT_CONFIG";

/// File names probed in the working directory, in order.
const LOCAL_CANDIDATES: &[&str] = &["loadout.toml", "loadout.json"];

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Show debug output on the console.
    #[serde(default)]
    pub debug: bool,
    /// Whether installed steps are checked for updates (default `true`).
    pub check_updates: Option<bool>,
    /// Environment applied to every step.
    #[serde(default)]
    pub env: Env,
    /// Environment applied to every step on the given platform.
    #[serde(default)]
    pub platform_env: BTreeMap<Os, Env>,
    /// Friendly machine names mapped to machine ids.
    #[serde(default)]
    pub machine_aliases: BTreeMap<String, String>,
    /// Per-type override templates.
    #[serde(default)]
    pub defaults: defaults::TypeDefaults,
    /// Default name filters, used when none are given on the command line.
    #[serde(default)]
    pub filter: Vec<String>,
    /// Ordered top-level steps.
    #[serde(default)]
    pub install: Vec<step::StepDeclaration>,
}

impl AppConfig {
    /// Load the configuration at `path` (TOML, or JSON for `.json`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        loader::load_file(path)
    }

    /// Whether update checks are enabled, `true` unless disabled.
    #[must_use]
    pub fn check_updates(&self) -> bool {
        self.check_updates.unwrap_or(true)
    }

    /// Global environment for `os`: `env` overlaid with `platform_env[os]`.
    #[must_use]
    pub fn env_for(&self, os: Os) -> Env {
        let mut env = self.env.clone();
        if let Some(extra) = self.platform_env.get(&os) {
            env.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        env
    }
}

/// Locate the configuration file.
///
/// Order: `explicit` (from `--config`), `$LOADOUT_CONFIG`, `./loadout.toml`,
/// `./loadout.json`, then `$XDG_CONFIG_HOME/loadout/loadout.toml`
/// (`~/.config/loadout/loadout.toml`).
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] listing every searched location when no
/// file exists.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let candidates = candidate_paths(
        explicit,
        std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        &cwd,
        user_config_dir(),
    );

    // An explicitly requested file is never silently replaced by another.
    if let Some(first) = candidates.first()
        && (explicit.is_some() || std::env::var_os(CONFIG_ENV_VAR).is_some())
    {
        return if first.is_file() {
            Ok(first.clone())
        } else {
            Err(ConfigError::NotFound(first.display().to_string()))
        };
    }

    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            ConfigError::NotFound(
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })
}

fn candidate_paths(
    explicit: Option<&Path>,
    from_env: Option<PathBuf>,
    cwd: &Path,
    user_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(p) = explicit {
        out.push(p.to_path_buf());
    } else if let Some(p) = from_env {
        out.push(p);
    }
    out.extend(LOCAL_CANDIDATES.iter().map(|name| cwd.join(name)));
    if let Some(dir) = user_dir {
        out.push(dir.join("loadout").join("loadout.toml"));
    }
    out
}

fn user_config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(|home| PathBuf::from(home).join(".config"))
        })
}
