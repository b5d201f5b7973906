//! Opt-in log output for test scripts.

use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber for the `eyes` log targets.
///
/// `RUST_LOG` wins when set; otherwise `verbosity` picks the level
/// (0 = warn, 1 = info, 2 = debug, 3+ = trace). Calling this more than once
/// keeps the first subscriber.
pub fn init_logging(verbosity: u8) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).try_init();
}

fn default_directive(verbosity: u8) -> &'static str {
	match verbosity {
		0 => "eyes=warn",
		1 => "eyes=info",
		2 => "eyes=debug",
		_ => "eyes=trace",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verbosity_maps_to_levels() {
		assert_eq!(default_directive(0), "eyes=warn");
		assert_eq!(default_directive(2), "eyes=debug");
		assert_eq!(default_directive(9), "eyes=trace");
	}

	#[test]
	fn init_twice_is_harmless() {
		init_logging(1);
		init_logging(3);
	}
}
