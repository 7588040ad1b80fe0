//! Stable per-host machine identifier.
//!
//! The raw platform identifier is never exposed; it is hashed together with
//! an application key so that the value written into configuration files
//! cannot be correlated with other tools.
use anyhow::{Context as _, Result, bail};
use sha2::{Digest, Sha256};

use crate::exec::{Env, Executor};
use crate::platform::{Os, Platform};

/// Application key mixed into the machine id hash.
const APP_KEY: &str = "loadout";

/// Number of hex characters kept from the hash.
const ID_LEN: usize = 16;

/// Linux locations of the machine id, tried in order.
const LINUX_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Source of the current host's machine identifier.
pub trait MachineIdentity: std::fmt::Debug {
    /// Return the machine identifier for this host.
    ///
    /// # Errors
    ///
    /// Returns an error if no platform identifier can be read.
    fn machine_id(&self) -> Result<String>;
}

/// Reads the platform identifier of the running host.
#[derive(Debug)]
pub struct HostMachineId<'a> {
    platform: Platform,
    executor: &'a dyn Executor,
}

impl<'a> HostMachineId<'a> {
    /// Create a provider for `platform`, using `executor` for the macOS and
    /// Windows queries.
    #[must_use]
    pub const fn new(platform: Platform, executor: &'a dyn Executor) -> Self {
        Self { platform, executor }
    }

    fn raw_id(&self) -> Result<String> {
        match self.platform.os {
            Os::Linux => LINUX_ID_PATHS
                .iter()
                .find_map(|p| std::fs::read_to_string(p).ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .context("no machine-id file found"),
            Os::MacOs => {
                let out = self.executor.capture(
                    &Env::new(),
                    "ioreg",
                    &["-rd1", "-c", "IOPlatformExpertDevice"],
                )?;
                parse_ioreg_uuid(&out.stdout).context("IOPlatformUUID not found in ioreg output")
            }
            Os::Windows => {
                let out = self.executor.capture(
                    &Env::new(),
                    "reg",
                    &[
                        "query",
                        r"HKLM\SOFTWARE\Microsoft\Cryptography",
                        "/v",
                        "MachineGuid",
                    ],
                )?;
                parse_reg_guid(&out.stdout).context("MachineGuid not found in registry output")
            }
        }
    }
}

impl MachineIdentity for HostMachineId<'_> {
    fn machine_id(&self) -> Result<String> {
        let raw = self.raw_id()?;
        if raw.is_empty() {
            bail!("platform machine identifier is empty");
        }
        Ok(protect(&raw))
    }
}

/// Hash a raw platform identifier into the value exposed to users.
#[must_use]
pub fn protect(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(APP_KEY.as_bytes());
    hasher.update(raw.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(ID_LEN)
        .collect()
}

fn parse_ioreg_uuid(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.contains("IOPlatformUUID"))
        .and_then(|l| l.split('=').nth(1))
        .map(|v| v.trim().trim_matches('"').to_string())
}

fn parse_reg_guid(output: &str) -> Option<String> {
    output
        .lines()
        .find(|l| l.contains("MachineGuid"))
        .and_then(|l| l.split_whitespace().last())
        .map(str::to_string)
}
