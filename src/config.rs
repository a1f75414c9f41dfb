use crate::headers::CacheOffline;
use core::time::Duration;
use serde::Deserialize;

/// Default prefix for segments whose start marker carries no name (`auto0`, `auto1`, …).
pub const DEFAULT_AUTO_PREFIX: &str = "auto";

/// Default time the client waits for the native transport before reporting [`Status::Unknown`](crate::Status::Unknown).
pub const DEFAULT_REPORT_TIMEOUT_MS: u64 = 5000;

/// Engine settings shared by the server and client halves.
///
/// Deserializable so hosts can embed it in their own configuration files.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
	pub auto_prefix: String,
	pub cache_offline: CacheOffline,
	pub report_timeout_ms: u64,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			auto_prefix: DEFAULT_AUTO_PREFIX.to_owned(),
			cache_offline: CacheOffline::True,
			report_timeout_ms: DEFAULT_REPORT_TIMEOUT_MS,
		}
	}
}

impl Config {
	#[must_use]
	pub fn report_timeout(&self) -> Duration {
		Duration::from_millis(self.report_timeout_ms)
	}
}
