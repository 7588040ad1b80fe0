//! Command: print this host's machine id.
use anyhow::Result;

use crate::exec::SystemExecutor;
use crate::machine::{HostMachineId, MachineIdentity as _};
use crate::platform::Platform;

/// Print the machine id used by `machines` restrictions and aliases.
///
/// # Errors
///
/// Returns an error if the platform identifier cannot be read.
#[allow(clippy::print_stdout)]
pub fn run() -> Result<()> {
    let id = HostMachineId::new(Platform::detect(), &SystemExecutor).machine_id()?;
    println!("{id}");
    Ok(())
}
