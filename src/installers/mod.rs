//! Installer variants and the registry that dispatches step types to them.
//!
//! Every step type maps to exactly one [`Installer`] implementation through
//! [`create`]. The engine only talks to the trait: it never inspects which
//! concrete variant it is driving.
pub mod docker;
pub mod git;
pub mod github_release;
pub mod group;
pub mod package;
pub mod rsync;
pub mod shell;

use anyhow::Result;

use crate::config::defaults::{ResolvedStep, TypeDefaults, resolve};
use crate::config::step::{StepDeclaration, StepType};
use crate::engine::Context;
use crate::error::{ConfigError, ValidationError};
use crate::exec::Env;

use self::package::PackageManager;

/// Child steps of a composite, with the scope they run in.
#[derive(Debug, Clone, Default)]
pub struct Children {
    /// Child declarations in execution order.
    pub steps: Vec<StepDeclaration>,
    /// Defaults replacing the inherited ones, if any.
    pub defaults: Option<TypeDefaults>,
    /// Environment the children inherit.
    pub env: Env,
    /// Whether the steps came from a fetched manifest (and so were not part
    /// of the up-front validation).
    pub fetched: bool,
}

/// A resolved step bound to its installation backend.
pub trait Installer: std::fmt::Debug {
    /// The resolved step this unit acts on.
    fn step(&self) -> &ResolvedStep;

    /// Structural checks; never touches the host.
    fn validate(&self) -> Vec<ValidationError>;

    /// Variant-specific installed probe. Composites have nothing of their
    /// own to install and always report installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe itself cannot be carried out.
    fn probe_installed(&self, _ctx: &Context) -> Result<bool> {
        Ok(true)
    }

    /// Variant-specific update probe. Variants without one never update.
    ///
    /// # Errors
    ///
    /// Returns an error if the probe itself cannot be carried out.
    fn probe_needs_update(&self, _ctx: &Context) -> Result<bool> {
        Ok(false)
    }

    /// Install the step. A no-op for composites, whose work is their
    /// children.
    ///
    /// # Errors
    ///
    /// Returns an error if installation fails.
    fn install(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }

    /// Update the step. Falls back to [`install`](Self::install).
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn update(&self, ctx: &Context) -> Result<()> {
        self.install(ctx)
    }

    /// Child steps of a composite. Leaves have none.
    ///
    /// # Errors
    ///
    /// Returns an error if the children cannot be loaded.
    fn children(&self, ctx: &Context) -> Result<Children> {
        Ok(Children {
            env: ctx.step_env(self.step()),
            ..Children::default()
        })
    }

    /// Whether the step is installed: the `check_installed` script when one
    /// is declared, else the variant probe.
    ///
    /// # Errors
    ///
    /// Propagates errors from the variant probe.
    fn check_is_installed(&self, ctx: &Context) -> Result<bool> {
        match custom_check(ctx, self.step(), self.step().check_installed.as_deref()) {
            Some(result) => Ok(result),
            None => self.probe_installed(ctx),
        }
    }

    /// Whether the installed step needs an update: the `check_has_update`
    /// script when one is declared, else the variant probe.
    ///
    /// # Errors
    ///
    /// Propagates errors from the variant probe.
    fn check_needs_update(&self, ctx: &Context) -> Result<bool> {
        match custom_check(ctx, self.step(), self.step().check_has_update.as_deref()) {
            Some(result) => Ok(result),
            None => self.probe_needs_update(ctx),
        }
    }
}

/// Run a declared check script. `None` when no (non-blank) script is set.
///
/// A script that cannot even be started counts as a failed check.
fn custom_check(ctx: &Context, step: &ResolvedStep, script: Option<&str>) -> Option<bool> {
    let script = script.filter(|s| !s.trim().is_empty())?;
    Some(match ctx.script_succeeds(step, script) {
        Ok(ok) => ok,
        Err(e) => {
            ctx.log
                .debug(&format!("{}: check '{script}' could not run: {e}", step.name));
            false
        }
    })
}

/// Resolve `decl` against `defaults` and bind it to its variant.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedType`] for an unknown type tag.
pub fn create(
    decl: &StepDeclaration,
    defaults: &TypeDefaults,
) -> Result<Box<dyn Installer>, ConfigError> {
    let kind = decl.step_type()?;
    let step = resolve(decl, kind, defaults);
    Ok(match kind {
        StepType::Brew => package::boxed(step, PackageManager::Brew),
        StepType::Apt => package::boxed(step, PackageManager::Apt),
        StepType::Apk => package::boxed(step, PackageManager::Apk),
        StepType::Pacman => package::boxed(step, PackageManager::Pacman),
        StepType::Yay => package::boxed(step, PackageManager::Yay),
        StepType::Npm => package::boxed(step, PackageManager::Npm),
        StepType::Pnpm => package::boxed(step, PackageManager::Pnpm),
        StepType::Yarn => package::boxed(step, PackageManager::Yarn),
        StepType::Pipx => package::boxed(step, PackageManager::Pipx),
        StepType::Cargo => package::boxed(step, PackageManager::Cargo),
        StepType::Git => Box::new(git::GitInstaller::new(step)),
        StepType::GithubRelease => Box::new(github_release::GithubReleaseInstaller::new(step)),
        StepType::Rsync => Box::new(rsync::RsyncInstaller::new(step)),
        StepType::Shell => Box::new(shell::ShellInstaller::new(step)),
        StepType::Docker => Box::new(docker::DockerInstaller::new(step)),
        StepType::Group => Box::new(group::GroupInstaller::new(step)),
        StepType::Manifest => Box::new(group::ManifestInstaller::new(step)),
    })
}
