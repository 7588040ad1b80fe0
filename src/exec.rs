//! Command runner used by every installer variant.
//!
//! [`Executor`] is the seam between the engine and the host: production code
//! uses [`SystemExecutor`], unit tests use the `MockExecutor` from
//! `installers::test_helpers`.
use std::collections::BTreeMap;
use std::io::{BufRead as _, BufReader, Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use crate::error::ExecError;

/// Environment variables passed to a spawned command, on top of the
/// inherited process environment.
pub type Env = BTreeMap<String, String>;

/// Result of a captured command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over process execution.
///
/// Every method takes the extra environment for the command so that step
/// level `env` / `platform_env` reach the spawned process.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command with its output streamed to the log. Fails on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits non-zero.
    fn run(&self, env: &Env, program: &str, args: &[&str]) -> Result<()>;

    /// Run a command and capture its output. Never fails on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be spawned.
    fn capture(&self, env: &Env, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command and report whether it exited successfully.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be spawned.
    fn succeeds(&self, env: &Env, program: &str, args: &[&str]) -> Result<bool>;

    /// Write `script` to a temporary script file and execute it with the
    /// platform shell (or `shell` when given). Fails on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written, spawned, or exits non-zero.
    fn run_script(&self, env: &Env, script: &str, shell: Option<&str>) -> Result<()>;

    /// Like [`run_script`](Self::run_script) but reports the exit status
    /// instead of failing.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written or spawned.
    fn script_succeeds(&self, env: &Env, script: &str, shell: Option<&str>) -> Result<bool>;

    /// Check whether a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, env: &Env, program: &str, args: &[&str]) -> Result<()> {
        let mut cmd = Command::new(program);
        cmd.args(args).envs(env);
        let status = stream_output(cmd, program)?;
        check_status(status, program)
    }

    fn capture(&self, env: &Env, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .envs(env)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(ExecResult::from(output))
    }

    fn succeeds(&self, env: &Env, program: &str, args: &[&str]) -> Result<bool> {
        Ok(self.capture(env, program, args)?.success)
    }

    fn run_script(&self, env: &Env, script: &str, shell: Option<&str>) -> Result<()> {
        let file = ScriptFile::write(script, shell)?;
        let (program, args) = file.invocation(shell);
        let mut cmd = Command::new(&program);
        cmd.args(&args).envs(env);
        let status = stream_output(cmd, &program)?;
        check_status(status, &program)
    }

    fn script_succeeds(&self, env: &Env, script: &str, shell: Option<&str>) -> Result<bool> {
        let file = ScriptFile::write(script, shell)?;
        let (program, args) = file.invocation(shell);
        let output = Command::new(&program)
            .args(&args)
            .envs(env)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.clone(),
                source,
            })?;
        Ok(output.status.success())
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Spawn `cmd` with piped output and forward every line to the log while
/// waiting for the process to exit.
///
/// Both pipes are drained on helper threads so a chatty child cannot block
/// on a full pipe buffer; the threads are joined before returning.
fn stream_output(mut cmd: Command, label: &str) -> Result<ExitStatus> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
        program: label.to_string(),
        source,
    })?;

    let drains: Vec<JoinHandle<()>> = [
        child.stdout.take().map(drain_lines),
        child.stderr.take().map(drain_lines),
    ]
    .into_iter()
    .flatten()
    .collect();

    let status = child
        .wait()
        .with_context(|| format!("waiting for {label}"))?;
    for handle in drains {
        handle.join().ok();
    }
    Ok(status)
}

fn drain_lines<R: Read + Send + 'static>(reader: R) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(reader).lines().map_while(Result::ok) {
            tracing::debug!(target: "loadout::output", "{line}");
        }
    })
}

fn check_status(status: ExitStatus, program: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    Err(ExecError::Failed {
        program: program.to_string(),
        exit_code: status.code().unwrap_or(-1),
        stderr: String::new(),
    }
    .into())
}

/// Interpreter family a generated script is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    Posix,
    Cmd,
    PowerShell,
}

impl ScriptKind {
    /// Pick the family from the shell override, falling back to the
    /// platform shell.
    fn for_shell(shell: Option<&str>) -> Self {
        let Some(shell) = shell else {
            return if cfg!(windows) { Self::Cmd } else { Self::Posix };
        };
        let program = shell.rsplit(['/', '\\']).next().unwrap_or(shell);
        let stem = program
            .strip_suffix(".exe")
            .unwrap_or(program)
            .to_ascii_lowercase();
        match stem.as_str() {
            "cmd" => Self::Cmd,
            "pwsh" | "powershell" => Self::PowerShell,
            _ => Self::Posix,
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::Posix => ".sh",
            Self::Cmd => ".bat",
            Self::PowerShell => ".ps1",
        }
    }

    fn body(self, script: &str) -> String {
        match self {
            Self::Posix => format!("set -e\n{script}\n"),
            Self::Cmd => format!("@echo off\r\n{script}\r\n"),
            Self::PowerShell => format!("$ErrorActionPreference = 'Stop'\r\n{script}\r\n"),
        }
    }
}

/// A generated script on disk, removed when dropped.
///
/// The file gets a random name and is created exclusively, so a
/// pre-existing path (or symlink) in the temp directory is never reused.
#[derive(Debug)]
struct ScriptFile {
    path: tempfile::TempPath,
    kind: ScriptKind,
}

impl ScriptFile {
    fn write(script: &str, shell: Option<&str>) -> Result<Self> {
        let kind = ScriptKind::for_shell(shell);
        let mut file = tempfile::Builder::new()
            .prefix("loadout-")
            .suffix(kind.suffix())
            .tempfile()
            .context("creating script file")?;
        file.write_all(kind.body(script).as_bytes())
            .with_context(|| format!("writing script file {}", file.path().display()))?;
        // Close the handle so the interpreter can open the file on Windows.
        Ok(Self {
            path: file.into_temp_path(),
            kind,
        })
    }

    fn invocation(&self, shell: Option<&str>) -> (String, Vec<String>) {
        let path = self.path.display().to_string();
        let program = shell.map_or_else(
            || if cfg!(windows) { "cmd" } else { "sh" }.to_string(),
            str::to_string,
        );
        let args = match self.kind {
            ScriptKind::Posix => vec![path],
            ScriptKind::Cmd => vec!["/C".to_string(), path],
            ScriptKind::PowerShell => vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-File".to_string(),
                path,
            ],
        };
        (program, args)
    }

    #[cfg(test)]
    fn path(&self) -> &Path {
        &self.path
    }
}

/// Expand a leading `~` to the user's home directory.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
    match (path.strip_prefix('~'), home) {
        (Some(rest), Ok(home)) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            Path::new(&home).join(rest.trim_start_matches(['/', '\\']))
        }
        _ => PathBuf::from(path),
    }
}
