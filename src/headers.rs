//! Protocol header names and request-side parsing.

use core::fmt::{self, Display, Formatter};
use http::{header::HeaderName, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::{trace, warn};

/// Request: `true` when the client can handle non-full-document responses.
pub const ACCEPT_DIFF: HeaderName = HeaderName::from_static("accept-diff");
/// Request: the client's last template fingerprint. Response: the current one.
pub const TEMPLATE_TAG: HeaderName = HeaderName::from_static("template-tag");
/// Response: `true` when the client's cached template is stale.
pub const TEMPLATE_CHANGE: HeaderName = HeaderName::from_static("template-change");
/// Response: advisory for the native cache layer.
pub const CACHE_OFFLINE: HeaderName = HeaderName::from_static("cache-offline");

/// Values of the `Cache-Offline` advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOffline {
	/// Store the response, don't refresh the page.
	Store,
	/// Store the response and refresh the page.
	True,
	/// Don't store, refresh the page.
	False,
	/// The diff server is degraded; fall back to plain HTTP.
	Http,
}

impl CacheOffline {
	#[must_use]
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Store => "store",
			Self::True => "true",
			Self::False => "false",
			Self::Http => "http",
		}
	}

	/// Case-insensitive. Unrecognized values yield [`None`].
	#[must_use]
	pub fn parse(value: &str) -> Option<Self> {
		let value = value.trim();
		[Self::Store, Self::True, Self::False, Self::Http].iter().copied().find(|candidate| candidate.as_str().eq_ignore_ascii_case(value))
	}

	/// Whether the native layer should persist the response.
	#[must_use]
	pub fn needs_save(self) -> bool {
		matches!(self, Self::Store | Self::True)
	}

	/// Whether the native layer should reload the page it already showed from cache.
	#[must_use]
	pub fn needs_refresh(self) -> bool {
		matches!(self, Self::True | Self::False)
	}

	#[must_use]
	pub fn header_value(self) -> HeaderValue {
		HeaderValue::from_static(self.as_str())
	}
}

impl Display for CacheOffline {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The client's conditional request headers.
///
/// Absent, empty and non-UTF-8 values are all treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
	pub accept_diff: bool,
	pub if_none_match: Option<String>,
	pub template_tag: Option<String>,
}

impl ConditionalHeaders {
	#[must_use]
	pub fn from_headers(headers: &HeaderMap) -> Self {
		let conditional = Self {
			accept_diff: text(headers, &ACCEPT_DIFF).map_or(false, |value| value.eq_ignore_ascii_case("true")),
			if_none_match: text(headers, &http::header::IF_NONE_MATCH).map(str::to_owned),
			template_tag: text(headers, &TEMPLATE_TAG).map(str::to_owned),
		};
		trace!(?conditional, "Parsed conditional headers.");
		conditional
	}
}

fn text<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
	let value = headers.get(name)?;
	match value.to_str() {
		Ok(text) => Some(text.trim()).filter(|text| !text.is_empty()),
		Err(_) => {
			warn!("Ignoring non-visible-ASCII `{}` request header.", name);
			None
		}
	}
}
