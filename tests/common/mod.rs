// Shared helpers for integration tests.
//
// Provides a temporary directory holding a `loadout.toml` plus a fluent
// builder, so each integration test can describe its configuration inline and
// run it against the real executor without touching the user's files.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use loadout_cli::config::AppConfig;
use loadout_cli::engine::Context;
use loadout_cli::exec::{Executor, SystemExecutor};
use loadout_cli::installers::github_release::UreqReleaseClient;
use loadout_cli::logging::{Log, Logger};
use loadout_cli::manifest::GitManifestFetcher;
use loadout_cli::platform::{Os, Platform};

/// An isolated workspace backed by a [`tempfile::TempDir`].
///
/// The directory is automatically deleted when dropped.
pub struct IntegrationTestContext {
    /// Temporary directory containing `loadout.toml` and any extra files.
    pub root: tempfile::TempDir,
}

impl IntegrationTestContext {
    /// Path to the workspace root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Path of the main configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.root.path().join("loadout.toml")
    }

    /// Path of a file inside the workspace.
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Load the main configuration file.
    pub fn load_config(&self) -> AppConfig {
        AppConfig::load(&self.config_path()).expect("load loadout.toml")
    }

    /// Engine context for the host platform using the real executor.
    pub fn engine_context(&self, config: &AppConfig, command: &str) -> Context {
        self.engine_context_for(Platform::detect(), config, command)
    }

    /// Engine context for an explicit platform using the real executor.
    pub fn engine_context_for(
        &self,
        platform: Platform,
        config: &AppConfig,
        command: &str,
    ) -> Context {
        let executor: Arc<dyn Executor> = Arc::new(SystemExecutor);
        let log: Arc<Logger> = Arc::new(Logger::new(command));
        Context::new(
            platform,
            executor,
            Arc::new(GitManifestFetcher),
            Arc::new(UreqReleaseClient::new()),
            log as Arc<dyn Log>,
            self.root.path().join("cache"),
        )
        .with_config(config)
    }

    /// Read a workspace file, returning an empty string when it is missing.
    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name)).unwrap_or_default()
    }
}

/// Fluent builder for [`IntegrationTestContext`].
///
/// `{root}` in any written content is replaced by the workspace path.
pub struct TestContextBuilder {
    root: tempfile::TempDir,
    config: String,
}

impl TestContextBuilder {
    /// Start with an empty configuration.
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
            config: String::new(),
        }
    }

    /// Append TOML to `loadout.toml`.
    pub fn with_config(mut self, toml: &str) -> Self {
        self.config.push_str(toml);
        self.config.push('\n');
        self
    }

    /// Write an additional file into the workspace.
    pub fn with_file(self, name: &str, content: &str) -> Self {
        let path = self.root.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(&path, self.substitute(content)).expect("write file");
        self
    }

    /// Write `loadout.toml` and return the context.
    pub fn build(self) -> IntegrationTestContext {
        std::fs::write(
            self.root.path().join("loadout.toml"),
            self.substitute(&self.config),
        )
        .expect("write loadout.toml");
        IntegrationTestContext { root: self.root }
    }

    fn substitute(&self, content: &str) -> String {
        content.replace("{root}", &self.root.path().display().to_string())
    }
}

impl Default for TestContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Linux platform regardless of the host.
pub fn linux() -> Platform {
    Platform::new(Os::Linux)
}
