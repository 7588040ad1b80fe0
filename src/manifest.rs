//! Fetching child configurations for `manifest` steps.
//!
//! A manifest source is either a local path (file or directory) or a git URL.
//! Git sources are cloned afresh into the cache directory on every run and
//! the configuration file is read from the checkout.
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::Repository;

use crate::config::AppConfig;
use crate::exec::expand_home;

/// Maximum nesting of manifests within manifests.
pub const MAX_MANIFEST_DEPTH: usize = 8;

/// File read from a manifest source when no `path` is given.
pub const DEFAULT_MANIFEST_FILE: &str = "loadout.toml";

/// Where a manifest step's child configuration lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    /// Local path or git URL.
    pub source: String,
    /// Branch, tag or commit to check out (git sources only).
    pub reference: Option<String>,
    /// Configuration file inside the source directory.
    pub path: Option<String>,
}

impl ManifestSource {
    /// Whether the source is a git URL rather than a local path.
    #[must_use]
    pub fn is_git(&self) -> bool {
        is_git_url(&self.source)
    }

    fn file_name(&self) -> &str {
        self.path.as_deref().unwrap_or(DEFAULT_MANIFEST_FILE)
    }
}

/// Whether `s` looks like a git URL.
#[must_use]
pub fn is_git_url(s: &str) -> bool {
    ["https://", "http://", "ssh://", "git://", "file://", "git@"]
        .iter()
        .any(|p| s.starts_with(p))
}

/// Loads the child configuration of a manifest step.
#[cfg_attr(test, mockall::automock)]
pub trait ManifestFetcher: Send + Sync {
    /// Fetch and parse the configuration described by `source`, using
    /// `cache_dir` for any checkout.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be fetched or parsed.
    fn fetch(&self, source: &ManifestSource, cache_dir: &Path) -> Result<AppConfig>;
}

/// [`ManifestFetcher`] reading local files and cloning git repositories with
/// `git2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitManifestFetcher;

impl ManifestFetcher for GitManifestFetcher {
    fn fetch(&self, source: &ManifestSource, cache_dir: &Path) -> Result<AppConfig> {
        let file = if source.is_git() {
            let checkout = checkout_dir(cache_dir, &source.source);
            clone_fresh(&source.source, source.reference.as_deref(), &checkout)?;
            checkout.join(source.file_name())
        } else {
            let local = expand_home(&source.source);
            if local.is_dir() {
                local.join(source.file_name())
            } else {
                local
            }
        };

        if !file.is_file() {
            bail!("manifest file not found: {}", file.display());
        }
        Ok(AppConfig::load(&file)?)
    }
}

/// Directory under `cache_dir` used for the checkout of `url`.
fn checkout_dir(cache_dir: &Path, url: &str) -> PathBuf {
    let slug: String = url
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .chars()
        .rev()
        .take_while(|c| !matches!(c, '/' | ':'))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let hash = crate::machine::protect(url);
    cache_dir
        .join("manifests")
        .join(format!("{slug}-{}", hash.get(..8).unwrap_or(&hash)))
}

fn clone_fresh(url: &str, reference: Option<&str>, dest: &Path) -> Result<()> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .with_context(|| format!("removing stale checkout {}", dest.display()))?;
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let repo = RepoBuilder::new()
        .clone(url, dest)
        .map_err(|e| anyhow::anyhow!("cloning {url}: {}", e.message()))?;

    if let Some(reference) = reference {
        checkout_ref(&repo, reference)
            .with_context(|| format!("checking out '{reference}' in {url}"))?;
    }
    Ok(())
}

fn checkout_ref(repo: &Repository, reference: &str) -> Result<()> {
    let object = repo
        .revparse_single(reference)
        .or_else(|_| repo.revparse_single(&format!("origin/{reference}")))
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;
    let commit = object
        .peel_to_commit()
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;

    repo.set_head_detached(commit.id())
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))
        .map_err(|e| anyhow::anyhow!("{}", e.message()))?;
    Ok(())
}
