use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::{fs, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use const_format::{concatcp, formatcp};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use stocksync_lib::stream::{StreamConfig, DEFAULT_CEILING_SECS, DEFAULT_KEEP_ALIVE_SECS};
use stocksync_lib::sync::SyncSession;
use stocksync_lib::youzan::{YouzanClient, YouzanConfig, DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE};
use stocksync_lib::{DispatcherConfig, DEFAULT_RATE, DEFAULT_TIMEOUT_SECS};

use crate::verbosity::Verbosity;

pub(crate) const STOCKSYNC_CONFIG_FILE: &str = "stocksync.toml";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LISTEN: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT);

// clap needs `&str` defaults while serde uses the typed functions below
const LISTEN_STR: &str = formatcp!("127.0.0.1:{}", DEFAULT_PORT);
const RATE_STR: &str = concatcp!(DEFAULT_RATE);
const TIMEOUT_STR: &str = concatcp!(DEFAULT_TIMEOUT_SECS);
const PAGE_SIZE_STR: &str = concatcp!(DEFAULT_PAGE_SIZE);
const KEEP_ALIVE_STR: &str = concatcp!(DEFAULT_KEEP_ALIVE_SECS, "s");
const CEILING_STR: &str = concatcp!(DEFAULT_CEILING_SECS, "s");

// Show the default config file in the help text while still being able to
// tell whether the user passed one explicitly.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    STOCKSYNC_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

default_function! {
    listen: SocketAddr = DEFAULT_LISTEN;
    rate: u32 = DEFAULT_RATE;
    timeout: u64 = DEFAULT_TIMEOUT_SECS;
    keep_alive: Duration = Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS);
    ceiling: Duration = Duration::from_secs(DEFAULT_CEILING_SECS);
    base_url: String = DEFAULT_BASE_URL.to_string();
    page_size: usize = DEFAULT_PAGE_SIZE;
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// stocksync compares an inventory spreadsheet with the products of a
/// commerce platform and streams the stores whose stock or price differ.
///
/// Product detail requests are paced to a fixed number per second.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct StocksyncOptions {
    /// Configuration file to use
    #[arg(short, long = "config", global = true)]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Serve `POST /upload` and the streaming `GET /analysis` endpoint
    Serve,

    /// Compare a spreadsheet once and print every frame to stdout
    Check {
        /// Inventory spreadsheet (.xlsx) with a single sheet
        file: PathBuf,
    },
}

/// The main configuration for stocksync
#[derive(Parser, Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Address the HTTP server listens on
    #[arg(long, global = true, default_value = &LISTEN_STR)]
    #[serde(default = "listen")]
    pub(crate) listen: SocketAddr,

    /// Product detail requests started per second
    #[arg(short, long, global = true, default_value = &RATE_STR)]
    #[serde(default = "rate")]
    pub(crate) rate: u32,

    /// Maximum number of detail requests running at the same time.
    /// Unbounded unless set.
    #[arg(long, global = true, verbatim_doc_comment)]
    #[serde(default)]
    pub(crate) max_in_flight: Option<usize>,

    /// Request timeout in seconds
    #[arg(short, long, global = true, default_value = &TIMEOUT_STR)]
    #[serde(default = "timeout")]
    pub(crate) timeout: u64,

    /// Idle time after which a `ping` frame is sent
    #[arg(
        long,
        global = true,
        value_parser = humantime::parse_duration,
        default_value = &KEEP_ALIVE_STR
    )]
    #[serde(default = "keep_alive")]
    #[serde(with = "humantime_serde")]
    pub(crate) keep_alive: Duration,

    /// Time after which a running stream ends with a `timeout` frame
    #[arg(
        long,
        global = true,
        value_parser = humantime::parse_duration,
        default_value = &CEILING_STR
    )]
    #[serde(default = "ceiling")]
    #[serde(with = "humantime_serde")]
    pub(crate) ceiling: Duration,

    /// Base address of the commerce platform API
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    #[serde(default = "base_url")]
    pub(crate) base_url: String,

    /// Records per page when listing products and stores
    #[arg(long, global = true, default_value = &PAGE_SIZE_STR)]
    #[serde(default = "page_size")]
    pub(crate) page_size: usize,

    /// Access token of the commerce platform
    #[arg(long, global = true, env = "YOUZAN_ACCESS_TOKEN", hide_env_values = true)]
    #[serde(default)]
    pub(crate) access_token: Option<SecretString>,
}

impl Config {
    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // Outside of fold_in! because `SecretString` doesn't implement Eq.
        if self.access_token.is_none() && toml.access_token.is_some() {
            self.access_token = toml.access_token;
        }

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            self, toml;

            Config {
                ..access_token,

                verbose: verbosity(),
                listen: listen(),
                rate: rate(),
                max_in_flight: None,
                timeout: timeout(),
                keep_alive: keep_alive(),
                ceiling: ceiling(),
                base_url: base_url(),
                page_size: page_size(),
            }
        }
    }

    pub(crate) fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::from_options(Some(self.rate), self.max_in_flight)
    }

    pub(crate) const fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            keep_alive: self.keep_alive,
            ceiling: self.ceiling,
        }
    }

    pub(crate) fn youzan_config(&self) -> Result<YouzanConfig> {
        let base_url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid base URL `{}`", self.base_url))?;
        Ok(YouzanConfig {
            base_url,
            access_token: self.access_token.clone(),
            page_size: self.page_size,
            timeout: Duration::from_secs(self.timeout),
        })
    }

    /// Build a sync session, rejecting invalid settings before any request
    pub(crate) fn session(&self) -> Result<SyncSession> {
        let dispatcher = self.dispatcher_config();
        dispatcher
            .validate()
            .context("Invalid dispatcher settings")?;
        let client = YouzanClient::new(self.youzan_config()?)
            .context("Cannot create commerce platform client")?;
        Ok(SyncSession::new(client, dispatcher, self.stream_config()))
    }
}
