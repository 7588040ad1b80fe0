//! Build script: embeds version and target information.

use std::process::Command;

fn main() {
    // LOADOUT_VERSION from the release pipeline wins over `git describe`.
    let version = std::env::var("LOADOUT_VERSION").ok().or_else(|| {
        Command::new("git")
            .args(["describe", "--tags", "--always", "--dirty"])
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
    });
    if let Some(version) = version {
        println!("cargo:rustc-env=LOADOUT_VERSION={version}");
    }
    if let Ok(target) = std::env::var("TARGET") {
        println!("cargo:rustc-env=LOADOUT_TARGET={target}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
    println!("cargo:rerun-if-env-changed=LOADOUT_VERSION");
}
