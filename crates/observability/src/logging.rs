use eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;

use crate::LogArgs;

/// Build the filter for `args`.
///
/// Precedence:
/// 1. `--quiet` shows errors only
/// 2. otherwise `RUST_LOG` if set, else a level derived from `-v` flags
/// 3. `--log.filter` directives are layered on top; unparsable ones are skipped
pub fn log_filter(args: &LogArgs) -> EnvFilter {
    if args.quiet {
        return EnvFilter::new("error");
    }

    let base_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

    if let Some(custom) = &args.filter {
        for directive in custom.split(',') {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let filter = log_filter(args);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if args.json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|err| eyre!("failed to install tracing subscriber: {err}"))?;

    tracing::debug!(json = args.json, verbosity = args.verbosity, "logging initialised");
    Ok(())
}
