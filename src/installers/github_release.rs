//! Binaries and archives downloaded from the latest GitHub release.
//!
//! The tag that was last installed is remembered in a marker file under the
//! cache directory (`releases/<step>.tag`); a step needs an update whenever
//! the latest published tag differs from it.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use serde_json::Value;

use super::Installer;
use crate::config::defaults::ResolvedStep;
use crate::config::validation::StepValidator;
use crate::engine::Context;
use crate::error::ValidationError;
use crate::exec::expand_home;
use crate::platform::Platform;

/// Accepted values of `opts.extract`.
const EXTRACT_MODES: &[&str] = &["none", "tar", "zip"];

/// Timeout applied to every release API call and download.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Access to GitHub releases.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseClient: Send + Sync {
    /// Tag name of the latest release of `repo` (`owner/name`).
    ///
    /// # Errors
    ///
    /// Returns an error if the API cannot be reached or the response has no
    /// tag.
    fn latest_tag(&self, repo: &str) -> Result<String>;

    /// Download `url` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the file cannot be written.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// [`ReleaseClient`] talking to `api.github.com` with `ureq`.
///
/// Sends `GITHUB_TOKEN` as a bearer token when it is set.
#[derive(Debug)]
pub struct UreqReleaseClient {
    agent: ureq::Agent,
    token: Option<String>,
}

impl Default for UreqReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqReleaseClient {
    /// Create a client with the default timeout.
    #[must_use]
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(HTTP_TIMEOUT))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    fn get(&self, url: &str) -> ureq::RequestBuilder<ureq::typestate::WithoutBody> {
        let req = self
            .agent
            .get(url)
            .header("User-Agent", concat!("loadout/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }
}

impl ReleaseClient for UreqReleaseClient {
    fn latest_tag(&self, repo: &str) -> Result<String> {
        let url = format!("https://api.github.com/repos/{repo}/releases/latest");
        let mut response = self
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .call()
            .with_context(|| format!("querying latest release of {repo}"))?;
        let body = response
            .body_mut()
            .read_to_string()
            .with_context(|| format!("reading release metadata of {repo}"))?;
        parse_tag_name(&body).with_context(|| format!("no tag_name in latest release of {repo}"))
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self
            .get(url)
            .call()
            .with_context(|| format!("downloading {url}"))?;
        let mut file =
            fs::File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
        io::copy(&mut response.body_mut().as_reader(), &mut file)
            .with_context(|| format!("writing {}", dest.display()))?;
        Ok(())
    }
}

/// Extract `tag_name` from a releases API response.
#[must_use]
pub fn parse_tag_name(json: &str) -> Option<String> {
    serde_json::from_str::<Value>(json)
        .ok()?
        .get("tag_name")?
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Substitute `{tag}`, `{version}`, `{os}` and `{arch}` in `template`.
///
/// `{version}` is the tag without a leading `v`.
#[must_use]
pub fn render_filename(template: &str, tag: &str, platform: Platform) -> String {
    let version = tag.strip_prefix('v').unwrap_or(tag);
    template
        .replace("{tag}", tag)
        .replace("{version}", version)
        .replace("{os}", &platform.os.to_string())
        .replace("{arch}", platform.arch)
}

/// How a downloaded asset becomes files in the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extract {
    None,
    Tar,
    Zip,
}

/// Installs a release asset of `opts.repository` into `opts.destination`.
#[derive(Debug)]
pub struct GithubReleaseInstaller {
    step: ResolvedStep,
}

impl GithubReleaseInstaller {
    /// Create a release installer.
    #[must_use]
    pub const fn new(step: ResolvedStep) -> Self {
        Self { step }
    }

    fn repository(&self) -> Result<&str> {
        self.step
            .opt_str("repository")
            .context("opts.repository is not set")
    }

    fn destination(&self) -> Result<PathBuf> {
        self.step
            .opt_str("destination")
            .map(expand_home)
            .context("opts.destination is not set")
    }

    fn extract(&self) -> Extract {
        match self.step.opt_str("extract") {
            Some("tar") => Extract::Tar,
            Some("zip") => Extract::Zip,
            _ => Extract::None,
        }
    }

    /// Filename template for this platform: the string itself, or the entry
    /// for the current OS of a per-OS table.
    fn filename_template(&self, platform: Platform) -> Result<&str> {
        match self.step.opts.get("download_filename") {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(Value::Object(table)) => table
                .get(&platform.os.to_string())
                .and_then(Value::as_str)
                .with_context(|| format!("no download_filename for {}", platform.os)),
            _ => bail!("opts.download_filename is not set"),
        }
    }

    fn marker_path(&self, cache_dir: &Path) -> PathBuf {
        let safe: String = self
            .step
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        cache_dir.join("releases").join(format!("{safe}.tag"))
    }

    fn cached_tag(&self, cache_dir: &Path) -> Option<String> {
        fs::read_to_string(self.marker_path(cache_dir))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn place(&self, ctx: &Context, asset: &Path, dest: &Path) -> Result<()> {
        let asset_str = asset.to_string_lossy();
        let dest_str = dest.to_string_lossy();
        match self.extract() {
            Extract::None => {
                let target = dest.join(self.step.bin());
                fs::copy(asset, &target)
                    .with_context(|| format!("copying to {}", target.display()))?;
                make_executable(&target)?;
                Ok(())
            }
            Extract::Tar => ctx.run(&self.step, "tar", &["-xzf", &asset_str, "-C", &dest_str]),
            Extract::Zip => ctx.run(&self.step, "unzip", &["-o", &asset_str, "-d", &dest_str]),
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("setting permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

impl Installer for GithubReleaseInstaller {
    fn step(&self) -> &ResolvedStep {
        &self.step
    }

    fn validate(&self) -> Vec<ValidationError> {
        StepValidator::new(&self.step)
            .require_str("repository")
            .require_str("destination")
            .optional_one_of("extract", EXTRACT_MODES)
            .check(|step, errors| {
                let field = "opts.download_filename";
                match step.opts.get("download_filename") {
                    None => errors.push(ValidationError::new(&step.name, field, "is required")),
                    Some(Value::String(s)) if s.trim().is_empty() => {
                        errors.push(ValidationError::new(&step.name, field, "must not be empty"));
                    }
                    Some(Value::String(_)) => {}
                    Some(Value::Object(table)) => {
                        for (os, v) in table {
                            if os.parse::<crate::platform::Os>().is_err() {
                                errors.push(ValidationError::new(
                                    &step.name,
                                    format!("{field}.{os}"),
                                    "unknown platform",
                                ));
                            } else if !v.as_str().is_some_and(|s| !s.trim().is_empty()) {
                                errors.push(ValidationError::new(
                                    &step.name,
                                    format!("{field}.{os}"),
                                    "must be a non-empty string",
                                ));
                            }
                        }
                    }
                    Some(_) => errors.push(ValidationError::new(
                        &step.name,
                        field,
                        "must be a string or a per-platform table",
                    )),
                }
            })
            .check(|step, errors| {
                if let Some(repo) = step.opt_str("repository")
                    && !repo.trim().is_empty()
                    && repo.split('/').filter(|p| !p.is_empty()).count() != 2
                {
                    errors.push(ValidationError::new(
                        &step.name,
                        "opts.repository",
                        "must be of the form owner/name",
                    ));
                }
            })
            .finish()
    }

    fn probe_installed(&self, _ctx: &Context) -> Result<bool> {
        Ok(self.destination()?.join(self.step.bin()).exists())
    }

    fn probe_needs_update(&self, ctx: &Context) -> Result<bool> {
        let Some(cached) = self.cached_tag(&ctx.cache_dir) else {
            return Ok(true);
        };
        let latest = ctx.releases.latest_tag(self.repository()?)?;
        Ok(latest != cached)
    }

    fn install(&self, ctx: &Context) -> Result<()> {
        let repo = self.repository()?;
        let dest = self.destination()?;
        let tag = ctx.releases.latest_tag(repo)?;
        let filename = render_filename(self.filename_template(ctx.platform)?, &tag, ctx.platform);
        let url = format!("https://github.com/{repo}/releases/download/{tag}/{filename}");

        let downloads = ctx.cache_dir.join("releases");
        fs::create_dir_all(&downloads)
            .with_context(|| format!("creating {}", downloads.display()))?;
        fs::create_dir_all(&dest).with_context(|| format!("creating {}", dest.display()))?;

        let asset = downloads.join(&filename);
        ctx.log.debug(&format!("{}: downloading {url}", self.step.name));
        ctx.releases.download(&url, &asset)?;
        let placed = self.place(ctx, &asset, &dest);
        fs::remove_file(&asset).ok(); // best effort
        placed?;

        let marker = self.marker_path(&ctx.cache_dir);
        fs::write(&marker, format!("{tag}\n"))
            .with_context(|| format!("writing {}", marker.display()))
    }
}
