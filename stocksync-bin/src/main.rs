//! `stocksync` compares an inventory spreadsheet with the products listed on
//! a commerce platform and streams every store whose stock or price differs.
//!
//! The binary is a wrapper around stocksync-lib. It reads its settings from
//! the command line, the environment and an optional `stocksync.toml`.
//!
//! Serve the upload and analysis endpoints:
//! ```sh
//! YOUZAN_ACCESS_TOKEN=... stocksync serve --listen 0.0.0.0:8080
//! ```
//!
//! Compare a spreadsheet once and print the frames to the terminal:
//! ```sh
//! stocksync check inventory.xlsx --rate 3
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::io::{self, ErrorKind};
use std::path::PathBuf;

use anyhow::{bail, Error, Result};
use clap::Parser;
use log::error;

mod commands;
mod logging;
mod options;
mod verbosity;

use crate::logging::init_logging;
use crate::options::{Command, Config, StocksyncOptions, STOCKSYNC_CONFIG_FILE};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is also used for any `Result::Err` bubbled up to
    // `main()` using the `?` operator.
    UnexpectedFailure = 1,
    StreamTimeout = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    // See: https://doc.rust-lang.org/stable/std/process/fn.exit.html
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file, command-line- and environment variables
fn load_config() -> Result<StocksyncOptions> {
    let mut opts = StocksyncOptions::parse();

    init_logging(&opts.config.verbose);

    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, a `stocksync.toml` in the current
        // directory is used if it exists. An invalid default file is still an
        // error.
        let default_config = PathBuf::from(STOCKSYNC_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    Ok(opts)
}

/// Set up runtime and call the selected command
fn run_main() -> Result<i32> {
    use std::process::exit;

    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            error!("Error while loading config: {e}");
            exit(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;

    match runtime.block_on(run(&opts)) {
        Err(e) if Some(ErrorKind::BrokenPipe) == underlying_io_error_kind(&e) => {
            exit(ExitCode::Success as i32);
        }
        res => res,
    }
}

/// Check if the given error can be traced back to an `io::ErrorKind`
/// This is helpful for troubleshooting the root cause of an error.
/// Code is taken from the anyhow documentation.
fn underlying_io_error_kind(error: &Error) -> Option<io::ErrorKind> {
    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            return Some(io_error.kind());
        }
    }
    None
}

async fn run(opts: &StocksyncOptions) -> Result<i32> {
    let exit_code = match &opts.command {
        Command::Serve => commands::serve(&opts.config).await?,
        Command::Check { file } => commands::check(&opts.config, file).await?,
    };
    Ok(exit_code as i32)
}
