//! Command: print version information.

/// Version string, overridable at build time through `LOADOUT_VERSION`.
#[must_use]
pub fn version() -> &'static str {
    option_env!("LOADOUT_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the loadout version (and build target, when known) to stdout.
#[allow(clippy::print_stdout)]
pub fn run() {
    match option_env!("LOADOUT_TARGET") {
        Some(target) => println!("loadout {} ({target})", version()),
        None => println!("loadout {}", version()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().trim().is_empty());
    }
}
