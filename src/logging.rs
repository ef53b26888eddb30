//! Logging setup on top of the `log` facade and `env_logger`.
//!
//! The level is determined by (in priority order):
//!
//! 1. `RUST_LOG` environment variable (if set)
//! 2. The countable `--verbose` flag: 0=info, 1=debug, 2+=trace

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize the logging subsystem from the CLI verbosity count.
///
/// Must be called once, before any logging macro fires.
pub fn init_logging(verbose: u8) {
    let mut builder = Builder::new();

    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose));
    }

    // Progress output owns stderr's last line, so keep log lines compact.
    builder.format(|buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
    });

    builder.init();
}

fn determine_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
