use std::io::Write;

use env_logger::{Builder, Env};
use log::LevelFilter;

use crate::verbosity::Verbosity;

/// Initialize logging for the crate's own modules at the given verbosity.
///
/// Foreign crates log at `warn` and above. `RUST_LOG` replaces both
/// defaults when it is set.
pub(crate) fn init_logging(verbose: &Verbosity) {
    let env = Env::default().filter_or("RUST_LOG", "warn");

    let mut builder = Builder::from_env(env);

    if std::env::var("RUST_LOG").is_err() {
        let level_filter = verbose.log_level_filter();
        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("stocksync", level_filter)
            .filter_module("stocksync_lib", level_filter);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}",
            buf.timestamp_seconds(),
            record.level(),
            record.args()
        )
    });

    builder.init();
}
