//! `loadout` command-line entry point.
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use loadout_cli::cli::{Cli, Command};
use loadout_cli::commands;
use loadout_cli::logging::{self, Log as _, Logger};

const fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Install(_) => "install",
        Command::Validate => "validate",
        Command::MachineId => "machine-id",
        Command::Completions(_) => "completions",
        Command::Version => "version",
    }
}

fn main() -> ExitCode {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    let name = command_name(&args.command);
    let verbose = args.verbose
        || (matches!(args.command, Command::Install(_) | Command::Validate)
            && commands::config_requests_debug(&args.global));
    logging::init_subscriber(verbose, name);
    let log = Arc::new(Logger::new(name));

    let interrupted = Arc::clone(&log);
    if let Err(e) = ctrlc::set_handler(move || {
        interrupted.warn("interrupted");
        std::process::exit(130);
    }) {
        log.debug(&format!("cannot install interrupt handler: {e}"));
    }

    let result = match &args.command {
        Command::Install(opts) => commands::install::run(&args.global, opts, &log),
        Command::Validate => commands::validate::run(&args.global, &log),
        Command::MachineId => commands::machine_id::run(),
        Command::Completions(opts) => {
            commands::completions::run(opts);
            Ok(())
        }
        Command::Version => {
            commands::version::run();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log.error(&format!("{e:#}"));
            if let Some(path) = log.log_path() {
                log.info(&format!("log: {}", path.display()));
            }
            ExitCode::FAILURE
        }
    }
}
