//! Step declarations as authored in the configuration file.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::exec::Env;
use crate::platform::Os;

/// Variant-specific option bag (`opts = { ... }`).
pub type Options = BTreeMap<String, Value>;

/// The closed set of installation backends a step can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StepType {
    /// Homebrew formula or cask.
    Brew,
    /// Debian/Ubuntu `apt`.
    Apt,
    /// Alpine `apk`.
    Apk,
    /// Arch Linux `pacman`.
    Pacman,
    /// Arch User Repository via `yay`.
    Yay,
    /// Global `npm` package.
    Npm,
    /// Global `pnpm` package.
    Pnpm,
    /// Global `yarn` package.
    Yarn,
    /// Python application via `pipx`.
    Pipx,
    /// Rust binary via `cargo install`.
    Cargo,
    /// Git repository clone.
    Git,
    /// Asset downloaded from the latest GitHub release.
    GithubRelease,
    /// Directory synchronisation via `rsync`.
    Rsync,
    /// Arbitrary shell command.
    Shell,
    /// Long-running Docker container.
    Docker,
    /// Inline list of child steps.
    Group,
    /// Child steps loaded from another configuration source.
    Manifest,
}

impl StepType {
    /// Every supported type, in registry order.
    pub const ALL: &'static [Self] = &[
        Self::Brew,
        Self::Apt,
        Self::Apk,
        Self::Pacman,
        Self::Yay,
        Self::Npm,
        Self::Pnpm,
        Self::Yarn,
        Self::Pipx,
        Self::Cargo,
        Self::Git,
        Self::GithubRelease,
        Self::Rsync,
        Self::Shell,
        Self::Docker,
        Self::Group,
        Self::Manifest,
    ];

    /// The tag used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
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
            Self::Git => "git",
            Self::GithubRelease => "github-release",
            Self::Rsync => "rsync",
            Self::Shell => "shell",
            Self::Docker => "docker",
            Self::Group => "group",
            Self::Manifest => "manifest",
        }
    }

    /// Whether steps of this type contain child steps.
    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::Group | Self::Manifest)
    }

    /// Package managers that only exist on Linux.
    #[must_use]
    pub const fn is_linux_only(self) -> bool {
        matches!(self, Self::Apt | Self::Apk | Self::Pacman | Self::Yay)
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Include/exclude lists for platform or machine applicability.
///
/// `only` takes precedence over `except` when both are declared.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, bound(deserialize = "T: Deserialize<'de>"))]
pub struct Restriction<T> {
    /// The step applies only to these entries.
    #[serde(default)]
    pub only: Option<Vec<T>>,
    /// The step applies to everything except these entries.
    #[serde(default)]
    pub except: Option<Vec<T>>,
}

impl<T> Default for Restriction<T> {
    fn default() -> Self {
        Self {
            only: None,
            except: None,
        }
    }
}

impl<T> Restriction<T> {
    /// A restriction limited to `items`.
    #[must_use]
    pub const fn only(items: Vec<T>) -> Self {
        Self {
            only: Some(items),
            except: None,
        }
    }

    /// A restriction excluding `items`.
    #[must_use]
    pub const fn except(items: Vec<T>) -> Self {
        Self {
            only: None,
            except: Some(items),
        }
    }

    /// Whether neither list is declared.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        self.only.is_none() && self.except.is_none()
    }
}

/// Enable predicate: a literal flag or a command whose exit status decides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Enabled {
    /// Literal `true` / `false`.
    Flag(bool),
    /// Shell command; the step is enabled when it exits zero.
    Command(String),
}

/// Per-category flags hiding a step from the final summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipSummary {
    /// Hide from the "installed" report.
    #[serde(default)]
    pub install: bool,
    /// Hide from the "upgraded" report.
    #[serde(default)]
    pub update: bool,
}

/// A node in the configuration tree as authored by the user.
///
/// Every optional field is an [`Option`] so that an explicitly empty value can
/// be told apart from an absent one during defaults resolution.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDeclaration {
    /// Step name; also the default package / binary name.
    pub name: String,
    /// Raw type tag, checked against [`StepType`] at validation time.
    #[serde(rename = "type")]
    pub kind: String,
    /// Enable predicate; a disabled step is skipped.
    pub enabled: Option<Enabled>,
    /// Space-separated labels usable in `tag:` filters.
    pub tags: Option<String>,
    /// Extra environment for every command of this step.
    pub env: Option<Env>,
    /// Extra environment applied only on the given platform.
    pub platform_env: Option<BTreeMap<Os, Env>>,
    /// Platform applicability.
    pub platforms: Option<Restriction<Os>>,
    /// Machine applicability, by machine id or alias.
    pub machines: Option<Restriction<String>>,
    /// Children of `group` steps.
    pub steps: Option<Vec<StepDeclaration>>,
    /// Variant-specific options.
    pub opts: Option<Options>,
    /// Binary looked up on `PATH` by the default installed probes.
    pub bin_name: Option<String>,
    /// Script run before installing.
    pub pre_install: Option<String>,
    /// Script run after installing.
    pub post_install: Option<String>,
    /// Script run before updating.
    pub pre_update: Option<String>,
    /// Script run after updating.
    pub post_update: Option<String>,
    /// Custom "is installed" check; exit zero means installed.
    pub check_installed: Option<String>,
    /// Custom "has update" check; exit zero means an update is available.
    pub check_has_update: Option<String>,
    /// Shell program used for this step's scripts, per platform.
    pub shell: Option<BTreeMap<Os, String>>,
    /// Summary visibility flags.
    pub skip_summary: Option<SkipSummary>,
}

impl StepDeclaration {
    /// Create a bare declaration with only a name and type tag.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Parse the declared type tag.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedType`] if the tag is not one of
    /// [`StepType::ALL`].
    pub fn step_type(&self) -> Result<StepType, ConfigError> {
        self.kind
            .parse()
            .map_err(|tag| ConfigError::UnsupportedType {
                step: self.name.clone(),
                tag,
            })
    }
}
