//! `-v`/`-q` flags controlling how much the crate's own modules log.
//!
//! The default is `info`, so progress lines are visible without flags.
//! Each `-v` raises the level by one step (`debug`, then `trace`), each `-q`
//! lowers it (`warn`, then `error`).
use std::fmt;

use log::{Level, LevelFilter};
use serde::Deserialize;

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Verbosity {
    /// More output per occurrence
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    verbose: u8,

    /// Less output per occurrence
    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: u8,
}

impl Verbosity {
    /// The effective log level
    pub(crate) fn log_level(&self) -> Level {
        let steps = i16::from(self.verbose) - i16::from(self.quiet);
        match steps {
            i16::MIN..=-2 => Level::Error,
            -1 => Level::Warn,
            0 => Level::Info,
            1 => Level::Debug,
            _ => Level::Trace,
        }
    }

    pub(crate) fn log_level_filter(&self) -> LevelFilter {
        self.log_level().to_level_filter()
    }

    fn from_level(level: Level) -> Self {
        let (verbose, quiet) = match level {
            Level::Error => (0, 2),
            Level::Warn => (0, 1),
            Level::Info => (0, 0),
            Level::Debug => (1, 0),
            Level::Trace => (2, 0),
        };
        Self { verbose, quiet }
    }
}

// In a config file the verbosity is a level name such as "debug" or "Warning"
impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let level = match s.to_lowercase().as_str() {
            "error" => Level::Error,
            "warn" | "warning" => Level::Warn,
            "info" => Level::Info,
            "debug" => Level::Debug,
            "trace" => Level::Trace,
            level => {
                return Err(serde::de::Error::custom(format!(
                    "invalid log level `{level}`"
                )))
            }
        };
        Ok(Self::from_level(level))
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.log_level())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        verbose: Verbosity,
    }

    #[test]
    fn verify_app() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_is_info() {
        assert_eq!(Verbosity::default().log_level(), Level::Info);
    }

    #[test]
    fn test_flags_shift_the_level() {
        let cli = Cli::parse_from(["stocksync", "-vv"]);
        assert_eq!(cli.verbose.log_level(), Level::Trace);
        let cli = Cli::parse_from(["stocksync", "-q"]);
        assert_eq!(cli.verbose.log_level(), Level::Warn);
        let cli = Cli::parse_from(["stocksync", "-qqqq"]);
        assert_eq!(cli.verbose.log_level_filter(), LevelFilter::Error);
    }

    #[test]
    fn test_level_names_from_config() {
        #[derive(Deserialize)]
        struct File {
            verbose: Verbosity,
        }
        let file: File = toml::from_str("verbose = \"Warning\"").unwrap();
        assert_eq!(file.verbose.log_level(), Level::Warn);
        assert!(toml::from_str::<File>("verbose = \"loud\"").is_err());
    }
}
