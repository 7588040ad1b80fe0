//! Resolution and execution of a configuration.
//!
//! [`resolve_and_run`] is the entry point: it validates every declared step,
//! then walks the step list in declaration order through the
//! [`workflow`], returning a [`Summary`] of what changed.
pub mod filter;
pub mod summary;
pub mod workflow;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::config::defaults::{ResolvedStep, TypeDefaults};
use crate::config::step::StepDeclaration;
use crate::config::validation::validate_config;
use crate::error::{ConfigError, ExecError, ValidationError};
use crate::exec::{Env, ExecResult, Executor};
use crate::installers::{self, github_release::ReleaseClient};
use crate::logging::Log;
use crate::manifest::ManifestFetcher;
use crate::platform::Platform;

pub use summary::{Outcome, ResultNode, Summary};

/// Everything a step needs from its surroundings while it runs.
///
/// A `Context` is never mutated once a run starts; composites derive a new
/// one for their children with [`Context::for_children`].
pub struct Context {
    /// Detected platform information.
    pub platform: Platform,
    /// This host's machine id, if it could be determined.
    pub machine_id: Option<String>,
    /// Friendly machine names mapped to machine ids.
    pub machine_aliases: Arc<BTreeMap<String, String>>,
    /// Name filter terms (top level only).
    pub filters: Vec<String>,
    /// Command executor.
    pub executor: Arc<dyn Executor>,
    /// Loader for `manifest` steps.
    pub fetcher: Arc<dyn ManifestFetcher>,
    /// Client for `github-release` steps.
    pub releases: Arc<dyn ReleaseClient>,
    /// Logger.
    pub log: Arc<dyn Log>,
    /// Whether installed steps are checked for updates.
    pub check_updates: bool,
    /// Directory for release tag markers and manifest checkouts.
    pub cache_dir: PathBuf,
    /// Environment inherited from the configuration and enclosing composites.
    pub env: Env,
    /// Per-type override templates in effect.
    pub defaults: Arc<TypeDefaults>,
    /// Current manifest nesting depth.
    pub depth: usize,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("platform", &self.platform)
            .field("machine_id", &self.machine_id)
            .field("machine_aliases", &self.machine_aliases)
            .field("filters", &self.filters)
            .field("executor", &"<dyn Executor>")
            .field("fetcher", &"<dyn ManifestFetcher>")
            .field("releases", &"<dyn ReleaseClient>")
            .field("log", &"<dyn Log>")
            .field("check_updates", &self.check_updates)
            .field("cache_dir", &self.cache_dir)
            .field("env", &self.env)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context with no filters, no machine id, empty environment and
    /// defaults, and update checks enabled.
    #[must_use]
    pub fn new(
        platform: Platform,
        executor: Arc<dyn Executor>,
        fetcher: Arc<dyn ManifestFetcher>,
        releases: Arc<dyn ReleaseClient>,
        log: Arc<dyn Log>,
        cache_dir: PathBuf,
    ) -> Self {
        Self {
            platform,
            machine_id: None,
            machine_aliases: Arc::new(BTreeMap::new()),
            filters: Vec::new(),
            executor,
            fetcher,
            releases,
            log,
            check_updates: true,
            cache_dir,
            env: Env::new(),
            defaults: Arc::new(TypeDefaults::default()),
            depth: 0,
        }
    }

    /// Apply the settings of `config`: aliases, update checks, global
    /// environment and defaults. Filters come from `config.filter` only when
    /// none were set explicitly.
    #[must_use]
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.machine_aliases = Arc::new(config.machine_aliases.clone());
        self.check_updates = config.check_updates();
        self.env = config.env_for(self.platform.os);
        self.defaults = Arc::new(config.defaults.clone());
        if self.filters.is_empty() {
            self.filters.clone_from(&config.filter);
        }
        self
    }

    /// Set the machine id.
    #[must_use]
    pub fn with_machine_id(mut self, id: Option<String>) -> Self {
        self.machine_id = id;
        self
    }

    /// Set the name filter terms.
    #[must_use]
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    /// Enable or disable update checks.
    #[must_use]
    pub const fn with_check_updates(mut self, check: bool) -> Self {
        self.check_updates = check;
        self
    }

    /// Derive the context for the children of a composite.
    ///
    /// Name filters never apply below the top level. `env` replaces the
    /// inherited environment, `defaults` (when given) the inherited defaults,
    /// and `nested_manifest` bumps the manifest depth.
    #[must_use]
    pub fn for_children(
        &self,
        env: Env,
        defaults: Option<Arc<TypeDefaults>>,
        nested_manifest: bool,
    ) -> Self {
        Self {
            platform: self.platform,
            machine_id: self.machine_id.clone(),
            machine_aliases: Arc::clone(&self.machine_aliases),
            filters: Vec::new(),
            executor: Arc::clone(&self.executor),
            fetcher: Arc::clone(&self.fetcher),
            releases: Arc::clone(&self.releases),
            log: Arc::clone(&self.log),
            check_updates: self.check_updates,
            cache_dir: self.cache_dir.clone(),
            env,
            defaults: defaults.unwrap_or_else(|| Arc::clone(&self.defaults)),
            depth: self.depth + usize::from(nested_manifest),
        }
    }

    /// Environment for commands of `step`: inherited environment overlaid
    /// with the step's `env` and its `platform_env` entry.
    #[must_use]
    pub fn step_env(&self, step: &ResolvedStep) -> Env {
        let mut env = self.env.clone();
        env.extend(step.env_for(self.platform.os));
        env
    }

    /// Shell override of `step` for this platform.
    #[must_use]
    pub fn shell_for<'s>(&self, step: &'s ResolvedStep) -> Option<&'s str> {
        step.shell.get(&self.platform.os).map(String::as_str)
    }

    /// Run a command for `step`, failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    pub fn run(&self, step: &ResolvedStep, program: &str, args: &[&str]) -> Result<()> {
        self.log.debug(&format!("{}: {program} {}", step.name, args.join(" ")));
        self.executor.run(&self.step_env(step), program, args)
    }

    /// Run a command for `step` and capture its output.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    pub fn capture(&self, step: &ResolvedStep, program: &str, args: &[&str]) -> Result<ExecResult> {
        self.executor.capture(&self.step_env(step), program, args)
    }

    /// Run a probe command; any failure (including a spawn error) is `false`.
    #[must_use]
    pub fn probe(&self, step: &ResolvedStep, program: &str, args: &[&str]) -> bool {
        match self.executor.succeeds(&self.step_env(step), program, args) {
            Ok(ok) => ok,
            Err(e) => {
                self.log
                    .debug(&format!("{}: probe '{program}' failed: {e}", step.name));
                false
            }
        }
    }

    /// Captured stdout of a probe command, `None` on any failure.
    #[must_use]
    pub fn probe_output(&self, step: &ResolvedStep, program: &str, args: &[&str]) -> Option<String> {
        match self.capture(step, program, args) {
            Ok(out) if out.success => Some(out.stdout),
            Ok(_) => None,
            Err(e) => {
                self.log
                    .debug(&format!("{}: probe '{program}' failed: {e}", step.name));
                None
            }
        }
    }

    /// Run `script` with the step's environment and shell, failing on
    /// non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be run or exits non-zero.
    pub fn run_script(&self, step: &ResolvedStep, script: &str) -> Result<()> {
        self.executor
            .run_script(&self.step_env(step), script, self.shell_for(step))
    }

    /// Run `script` and report whether it exited zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written or spawned.
    pub fn script_succeeds(&self, step: &ResolvedStep, script: &str) -> Result<bool> {
        self.executor
            .script_succeeds(&self.step_env(step), script, self.shell_for(step))
    }

    /// Run a program that needs elevated rights, through `sudo` when it is
    /// available.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned or exits non-zero.
    pub fn run_privileged(&self, step: &ResolvedStep, program: &str, args: &[&str]) -> Result<()> {
        if self.executor.which("sudo") {
            let mut full = vec![program];
            full.extend_from_slice(args);
            self.run(step, "sudo", &full)
        } else {
            self.run(step, program, args)
        }
    }
}

/// Validate `steps` (recursing into groups) under `defaults`.
///
/// Every step is resolved and validated whether or not it applies to this
/// host, so a configuration is checked the same way everywhere.
#[must_use]
pub fn validate_steps(steps: &[StepDeclaration], defaults: &TypeDefaults) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for decl in steps {
        match installers::create(decl, defaults) {
            Ok(unit) => {
                errors.extend(unit.validate());
                let step = unit.step();
                if step.kind == crate::config::step::StepType::Group {
                    errors.extend(validate_steps(&step.steps, defaults));
                }
            }
            Err(ConfigError::UnsupportedType { step, tag }) => errors.push(ValidationError::new(
                step,
                "type",
                format!("unsupported type '{tag}'"),
            )),
            Err(other) => errors.push(ValidationError::new(&decl.name, "type", other.to_string())),
        }
    }
    errors
}

/// Validate the whole configuration: file-level checks plus every declared
/// step.
#[must_use]
pub fn validate_all(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = validate_config(config);
    errors.extend(validate_steps(&config.install, &config.defaults));
    errors
}

/// Validate `config`, then run every step in declaration order.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] (wrapped) when validation finds any
/// problem, before anything runs; otherwise the first step failure.
pub fn resolve_and_run(config: &AppConfig, ctx: &Context) -> Result<Summary> {
    let errors = validate_all(config);
    if !errors.is_empty() {
        return Err(ConfigError::Invalid(errors).into());
    }

    let mut results = Vec::with_capacity(config.install.len());
    for decl in &config.install {
        results.push(workflow::run_step(decl, ctx, true)?);
    }
    Ok(Summary::from_results(&results))
}

/// Map a raw exec error to a short human-readable reason.
pub(crate) fn describe_error(e: &anyhow::Error) -> String {
    match e.downcast_ref::<ExecError>() {
        Some(exec) => exec.to_string(),
        None => format!("{e:#}"),
    }
}
