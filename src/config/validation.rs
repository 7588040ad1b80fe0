//! Structural validation shared by every step variant.
//!
//! Nothing here touches the filesystem or network: validation only looks at
//! the resolved declaration so that every problem in a configuration can be
//! reported in one pass before anything runs.
use serde_json::Value;

use super::defaults::ResolvedStep;
use super::AppConfig;
use crate::error::ValidationError;

/// Collects [`ValidationError`]s for one step.
#[derive(Debug)]
pub struct StepValidator<'a> {
    step: &'a ResolvedStep,
    errors: Vec<ValidationError>,
}

impl<'a> StepValidator<'a> {
    /// Start validating `step`, running the checks common to every variant.
    #[must_use]
    pub fn new(step: &'a ResolvedStep) -> Self {
        let mut v = Self {
            step,
            errors: Vec::new(),
        };
        v.common();
        v
    }

    /// Record an error against `field`.
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .push(ValidationError::new(&self.step.name, field, message));
    }

    /// Require `opts.<key>` to be a non-empty string.
    #[must_use]
    pub fn require_str(mut self, key: &str) -> Self {
        match self.step.opts.get(key) {
            None => self.push(&format!("opts.{key}"), "is required"),
            Some(value) => self.check_str(key, value),
        }
        self
    }

    /// When `opts.<key>` is present it must be a non-empty string.
    #[must_use]
    pub fn optional_str(mut self, key: &str) -> Self {
        if let Some(value) = self.step.opts.get(key) {
            self.check_str(key, value);
        }
        self
    }

    /// When `opts.<key>` is present it must be a boolean.
    #[must_use]
    pub fn optional_bool(mut self, key: &str) -> Self {
        if let Some(value) = self.step.opts.get(key)
            && !value.is_boolean()
        {
            self.push(&format!("opts.{key}"), "must be a boolean");
        }
        self
    }

    /// When `opts.<key>` is present it must be a list of non-empty strings.
    #[must_use]
    pub fn optional_str_list(mut self, key: &str) -> Self {
        if let Some(value) = self.step.opts.get(key) {
            let ok = value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|i| i.as_str().is_some_and(|s| !s.trim().is_empty()))
            });
            if !ok {
                self.push(&format!("opts.{key}"), "must be a list of non-empty strings");
            }
        }
        self
    }

    /// When `opts.<key>` is present it must be one of `allowed`.
    #[must_use]
    pub fn optional_one_of(mut self, key: &str, allowed: &[&str]) -> Self {
        if let Some(value) = self.step.opts.get(key) {
            match value.as_str() {
                Some(s) if allowed.contains(&s) => {}
                _ => self.push(
                    &format!("opts.{key}"),
                    format!("must be one of: {}", allowed.join(", ")),
                ),
            }
        }
        self
    }

    /// Apply an arbitrary check.
    #[must_use]
    pub fn check(mut self, f: impl FnOnce(&ResolvedStep, &mut Vec<ValidationError>)) -> Self {
        f(self.step, &mut self.errors);
        self
    }

    /// Finish and return the collected errors.
    #[must_use]
    pub fn finish(self) -> Vec<ValidationError> {
        self.errors
    }

    fn check_str(&mut self, key: &str, value: &Value) {
        match value.as_str() {
            Some(s) if !s.trim().is_empty() => {}
            Some(_) => self.push(&format!("opts.{key}"), "must not be empty"),
            None => self.push(&format!("opts.{key}"), "must be a string"),
        }
    }

    fn common(&mut self) {
        let step = self.step;
        if step.name.trim().is_empty() {
            self.push("name", "must not be empty");
        }
        if !step.kind.is_composite() && !step.steps.is_empty() {
            self.push("steps", format!("not supported by '{}' steps", step.kind));
        }
        if let Some(bin) = &step.bin_name
            && bin.trim().is_empty()
        {
            self.push("bin_name", "must not be empty");
        }
        if let Some(super::step::Enabled::Command(cmd)) = &step.enabled
            && cmd.trim().is_empty()
        {
            self.push("enabled", "command must not be empty");
        }
        for (os, shell) in &step.shell {
            if shell.trim().is_empty() {
                self.push(&format!("shell.{os}"), "must not be empty");
            }
        }
    }
}

/// Checks on the configuration file as a whole (independent of any step).
#[must_use]
pub fn validate_config(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for tag in config.defaults.unknown_tags() {
        errors.push(ValidationError::new(
            "<defaults>",
            format!("type.{tag}"),
            "unknown step type",
        ));
    }

    for (alias, id) in &config.machine_aliases {
        if id.trim().is_empty() {
            errors.push(ValidationError::new(
                "<machine_aliases>",
                alias,
                "machine id must not be empty",
            ));
        }
    }

    for term in &config.filter {
        let bare = term.trim_start_matches('!');
        if bare.is_empty() || bare == "tag:" {
            errors.push(ValidationError::new(
                "<filter>",
                term,
                "filter term must not be empty",
            ));
        }
    }

    errors
}
