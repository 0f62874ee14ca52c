//! wikimirror entry point.
//!
//! Sets up tracing, loads the configuration and hands over to the mirror. All
//! logging goes to stderr; stdout is left to the supervised tools.

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use wikimirror_config::Config;
use wikimirror_mirror::error::{Error, ErrorKind};

#[derive(Parser)]
#[command(name = "wikimirror", version, about = "Keeps a local Wikipedia snapshot mirror initialised and in sync")]
struct Cli {
    /// TOML configuration file, layered over the per-user default.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Invocation as a JSON object, e.g.
    /// `{"run-mode":"init","storage-file":{"data-directory":"/srv/wiki"}}`.
    #[arg(value_name = "JSON")]
    invocation: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = Config::load(cli.config.as_deref(), cli.invocation.as_deref())
        .map_err(|e| e.raise(ErrorKind::Configuration))
        .and_then(|config| wikimirror_mirror::run(&config));
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => fail(err),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn fail(err: Error) -> ExitCode {
    let Some((signal, announce)) = err.termination() else {
        eprintln!("Error: {err:?}");
        return ExitCode::FAILURE;
    };
    if announce {
        eprintln!("wikimirror: terminated by signal {signal}");
    }
    tracing::debug!(signal, "Re-raising termination signal");
    // Dies with the signal's default disposition; only returns if that failed.
    if let Err(e) = signal_hook::low_level::emulate_default_handler(signal) {
        tracing::error!(error = %e, signal, "Unable to re-raise termination signal");
    }
    std::process::exit(128 + signal)
}
