//! Logging bootstrap.

use tracing_subscriber::EnvFilter;

/// Initialises the global tracing subscriber. `-v` raises the default level
/// to debug, `-vv` to trace; `RUST_LOG` overrides either.
pub fn init_logging(verbose: u8) {
	let default_filter = match verbose {
		0 => "info",
		1 => "debug",
		_ => "trace",
	};
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(true)
		.init();
}
