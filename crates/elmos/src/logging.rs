use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const LOG_ENV: &str = "ELMOS_LOG";

/// Install the global subscriber. `ELMOS_LOG` (an `EnvFilter` directive)
/// wins over `verbose`.
pub fn init(verbose: bool, json: bool) {
    let default = if verbose { "elmos=debug" } else { "elmos=info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = res {
        eprintln!("logging already initialised: {e}");
    }
}
