//! Package-manager backed steps.
//!
//! One [`PackageInstaller`] drives every supported manager; the manager only
//! decides which commands are run. The package name defaults to the step
//! name and can be overridden with `opts.package`.
use anyhow::Result;

use super::Installer;
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::ValidationError;

/// Supported package managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Homebrew (formulae and casks).
    Brew,
    /// Debian/Ubuntu apt.
    Apt,
    /// Alpine apk.
    Apk,
    /// Arch Linux pacman.
    Pacman,
    /// AUR helper yay.
    Yay,
    /// npm global packages.
    Npm,
    /// pnpm global packages.
    Pnpm,
    /// yarn global packages.
    Yarn,
    /// pipx applications.
    Pipx,
    /// `cargo install` binaries.
    Cargo,
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Brew => "brew",
            Self::Apt => "apt",
            Self::Apk => "apk",
            Self::Pacman => "pacman",
            Self::Yay => "yay",
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
            Self::Pipx => "pipx",
            Self::Cargo => "cargo",
        })
    }
}

/// A package installed through a system or language package manager.
#[derive(Debug)]
pub struct PackageInstaller {
    step: ResolvedStep,
    manager: PackageManager,
}

/// Box a package installer for the registry.
pub(super) fn boxed(step: ResolvedStep, manager: PackageManager) -> Box<dyn Installer> {
    Box::new(PackageInstaller::new(step, manager))
}

impl PackageInstaller {
    /// Create a package installer.
    #[must_use]
    pub const fn new(step: ResolvedStep, manager: PackageManager) -> Self {
        Self { step, manager }
    }

    /// Package name passed to the manager.
    #[must_use]
    pub fn package(&self) -> &str {
        self.step.opt_str("package").unwrap_or(&self.step.name)
    }

    fn is_cask(&self) -> bool {
        self.step.opt_bool("cask")
    }

    /// Whether any line printed by `program args` starts with `prefix`.
    fn lists_package(&self, ctx: &Context, program: &str, args: &[&str], prefix: &str) -> bool {
        // Some managers exit non-zero when they find something to report, so
        // only stdout is looked at.
        match ctx.capture(&self.step, program, args) {
            Ok(out) => out.stdout.lines().any(|l| l.trim_start().starts_with(prefix)),
            Err(e) => {
                ctx.log
                    .debug(&format!("{}: probe '{program}' failed: {e}", self.step.name));
                false
            }
        }
    }

    fn brew_args<'a>(&'a self, verb: &'a str) -> Vec<&'a str> {
        let mut args = vec![verb];
        if self.is_cask() {
            args.push("--cask");
        }
        args.push(self.package());
        args
    }

    fn cargo_args(&self, force: bool) -> Vec<&str> {
        let mut args = vec!["install"];
        if force {
            args.push("--force");
        }
        if self.step.opt_bool("locked") {
            args.push("--locked");
        }
        args.push(self.package());
        args
    }
}

impl Installer for PackageInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        let v = StepValidator::new(&self.step).optional_str("package");
        match self.manager {
            PackageManager::Brew => v.optional_str("tap").optional_bool("cask"),
            PackageManager::Cargo => v.optional_bool("locked"),
            _ => v,
        }
        .finish()
    }

    fn probe_installed(&self, ctx: &Context) -> Result<bool> {
        let pkg = self.package();
        Ok(match self.manager {
            PackageManager::Brew => {
                if self.step.bin_name.is_some() {
                    ctx.executor.which(self.step.bin())
                } else {
                    let mut args = self.brew_args("list");
                    args.insert(1, "--versions");
                    ctx.probe(&self.step, "brew", &args)
                }
            }
            PackageManager::Apt => ctx.probe(&self.step, "dpkg", &["-s", pkg]),
            PackageManager::Apk => ctx.probe(&self.step, "apk", &["info", "-e", pkg]),
            PackageManager::Pacman => ctx.probe(&self.step, "pacman", &["-Q", pkg]),
            PackageManager::Yay => ctx.probe(&self.step, "yay", &["-Q", pkg]),
            PackageManager::Npm
            | PackageManager::Pnpm
            | PackageManager::Yarn
            | PackageManager::Pipx
            | PackageManager::Cargo => ctx.executor.which(self.step.bin()),
        })
    }

    fn probe_needs_update(&self, ctx: &Context) -> Result<bool> {
        let pkg = self.package();
        let step = &self.step;
        Ok(match self.manager {
            PackageManager::Brew => {
                let mut args = self.brew_args("outdated");
                args.insert(1, "--quiet");
                ctx.probe_output(step, "brew", &args)
                    .is_some_and(|out| !out.trim().is_empty())
            }
            PackageManager::Apt => self.lists_package(
                ctx,
                "apt",
                &["list", "--upgradable"],
                &format!("{pkg}/"),
            ),
            PackageManager::Apk => {
                self.lists_package(ctx, "apk", &["version", "-l", "<"], &format!("{pkg}-"))
            }
            PackageManager::Pacman => {
                self.lists_package(ctx, "pacman", &["-Qu"], &format!("{pkg} "))
            }
            PackageManager::Yay => self.lists_package(ctx, "yay", &["-Qu"], &format!("{pkg} ")),
            PackageManager::Npm => {
                self.lists_package(ctx, "npm", &["outdated", "-g", pkg], pkg)
            }
            PackageManager::Pnpm => {
                self.lists_package(ctx, "pnpm", &["outdated", "-g", pkg], pkg)
            }
            PackageManager::Yarn | PackageManager::Pipx | PackageManager::Cargo => false,
        })
    }

    fn install(&self, ctx: &Context) -> Result<()> {
        let pkg = self.package();
        let step = &self.step;
        match self.manager {
            PackageManager::Brew => {
                if let Some(tap) = step.opt_str("tap") {
                    ctx.run(step, "brew", &["tap", tap])?;
                }
                ctx.run(step, "brew", &self.brew_args("install"))
            }
            PackageManager::Apt => ctx.run_privileged(step, "apt-get", &["install", "-y", pkg]),
            PackageManager::Apk => ctx.run_privileged(step, "apk", &["add", pkg]),
            PackageManager::Pacman => {
                ctx.run_privileged(step, "pacman", &["-S", "--needed", "--noconfirm", pkg])
            }
            PackageManager::Yay => ctx.run(step, "yay", &["-S", "--needed", "--noconfirm", pkg]),
            PackageManager::Npm => ctx.run(step, "npm", &["install", "-g", pkg]),
            PackageManager::Pnpm => ctx.run(step, "pnpm", &["add", "-g", pkg]),
            PackageManager::Yarn => ctx.run(step, "yarn", &["global", "add", pkg]),
            PackageManager::Pipx => ctx.run(step, "pipx", &["install", pkg]),
            PackageManager::Cargo => ctx.run(step, "cargo", &self.cargo_args(false)),
        }
    }

    fn update(&self, ctx: &Context) -> Result<()> {
        let pkg = self.package();
        let step = &self.step;
        match self.manager {
            PackageManager::Brew => ctx.run(step, "brew", &self.brew_args("upgrade")),
            PackageManager::Apt => {
                ctx.run_privileged(step, "apt-get", &["install", "-y", "--only-upgrade", pkg])
            }
            PackageManager::Apk => ctx.run_privileged(step, "apk", &["upgrade", pkg]),
            PackageManager::Pacman => ctx.run_privileged(step, "pacman", &["-S", "--noconfirm", pkg]),
            PackageManager::Yay => ctx.run(step, "yay", &["-S", "--noconfirm", pkg]),
            PackageManager::Npm => ctx.run(step, "npm", &["update", "-g", pkg]),
            PackageManager::Pnpm => ctx.run(step, "pnpm", &["update", "-g", pkg]),
            PackageManager::Yarn => ctx.run(step, "yarn", &["global", "upgrade", pkg]),
            PackageManager::Pipx => ctx.run(step, "pipx", &["upgrade", pkg]),
            PackageManager::Cargo => ctx.run(step, "cargo", &self.cargo_args(true)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::step::StepType;
    use crate::installers::test_helpers::{MockExecutor, context, resolved};
    use serde_json::json;

    fn installer(kind: StepType, manager: PackageManager, opts: serde_json::Value) -> PackageInstaller {
        PackageInstaller::new(resolved("ripgrep", kind, opts), manager)
    }

    #[test]
    fn package_name_defaults_to_step_name() {
        let p = installer(StepType::Apt, PackageManager::Apt, json!({}));
        assert_eq!(p.package(), "ripgrep");
        let p = installer(StepType::Apt, PackageManager::Apt, json!({ "package": "rg" }));
        assert_eq!(p.package(), "rg");
    }

    #[test]
    fn validation_checks_manager_options() {
        let p = installer(
            StepType::Brew,
            PackageManager::Brew,
            json!({ "tap": "", "cask": "yes", "package": "x" }),
        );
        let fields: Vec<String> = p.validate().into_iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["opts.tap", "opts.cask"]);

        let p = installer(StepType::Cargo, PackageManager::Cargo, json!({ "locked": 1 }));
        assert_eq!(p.validate()[0].field, "opts.locked");
    }

    #[test]
    fn apt_probe_uses_dpkg() {
        let p = installer(StepType::Apt, PackageManager::Apt, json!({}));
        let exec = MockExecutor::ok("Status: install ok installed");
        let calls = exec.call_log();
        assert!(p.probe_installed(&context(exec)).unwrap());
        assert_eq!(calls.lock().unwrap()[0], "dpkg -s ripgrep");
    }

    #[test]
    fn apt_install_goes_through_sudo_when_available() {
        let p = installer(StepType::Apt, PackageManager::Apt, json!({}));
        let exec = MockExecutor::ok("").with_which(true);
        let calls = exec.call_log();
        p.install(&context(exec)).unwrap();
        assert_eq!(calls.lock().unwrap()[0], "sudo apt-get install -y ripgrep");
    }

    #[test]
    fn apt_update_probe_reads_upgradable_list() {
        let p = installer(StepType::Apt, PackageManager::Apt, json!({}));
        let listing = "Listing...\nripgrep/jammy 14.1.0 amd64 [upgradable from: 13.0.0]\n";
        assert!(p.probe_needs_update(&context(MockExecutor::ok(listing))).unwrap());
        let other = "Listing...\nripgrep-all/jammy 1.0 amd64 [upgradable from: 0.9]\n";
        assert!(!p.probe_needs_update(&context(MockExecutor::ok(other))).unwrap());
    }

    #[test]
    fn pacman_update_probe_matches_exact_name() {
        let p = installer(StepType::Pacman, PackageManager::Pacman, json!({}));
        let exec = MockExecutor::ok("ripgrep 13.0.0-1 -> 14.1.0-1\n");
        assert!(p.probe_needs_update(&context(exec)).unwrap());
    }

    #[test]
    fn npm_outdated_counts_even_with_non_zero_exit() {
        let p = installer(StepType::Npm, PackageManager::Npm, json!({ "package": "typescript" }));
        let exec = MockExecutor::with_responses(vec![(
            false,
            "Package     Current  Wanted  Latest\ntypescript    5.3.0   5.4.0   5.4.0\n".to_string(),
        )]);
        assert!(p.probe_needs_update(&context(exec)).unwrap());
    }

    #[test]
    fn language_managers_probe_path() {
        let p = installer(StepType::Cargo, PackageManager::Cargo, json!({}));
        let exec = MockExecutor::with_responses(vec![]).with_which(true);
        assert!(p.probe_installed(&context(exec)).unwrap());
        assert!(!p.probe_needs_update(&context(MockExecutor::with_responses(vec![]))).unwrap());
    }

    #[test]
    fn brew_cask_with_tap() {
        let p = installer(
            StepType::Brew,
            PackageManager::Brew,
            json!({ "tap": "homebrew/cask-fonts", "cask": true, "package": "font-fira-code" }),
        );
        let exec = MockExecutor::with_responses(vec![(true, String::new()), (true, String::new())]);
        let calls = exec.call_log();
        p.install(&context(exec)).unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "brew tap homebrew/cask-fonts",
                "brew install --cask font-fira-code"
            ]
        );
    }

    #[test]
    fn brew_outdated_is_quiet() {
        let p = installer(StepType::Brew, PackageManager::Brew, json!({}));
        let exec = MockExecutor::ok("ripgrep\n");
        let calls = exec.call_log();
        assert!(p.probe_needs_update(&context(exec)).unwrap());
        assert_eq!(calls.lock().unwrap()[0], "brew outdated --quiet ripgrep");
    }

    #[test]
    fn cargo_update_forces_reinstall() {
        let p = installer(StepType::Cargo, PackageManager::Cargo, json!({ "locked": true }));
        let exec = MockExecutor::ok("");
        let calls = exec.call_log();
        p.update(&context(exec)).unwrap();
        assert_eq!(calls.lock().unwrap()[0], "cargo install --force --locked ripgrep");
    }

    #[test]
    fn failing_install_is_error() {
        let p = installer(StepType::Pipx, PackageManager::Pipx, json!({}));
        assert!(p.install(&context(MockExecutor::fail())).is_err());
    }
}
