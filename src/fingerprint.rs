//! Content fingerprints used as change-detection tokens.
//!
//! A [`Fingerprint`] is the lowercase hex digest of the exact UTF-8 bytes of a document or template.
//! No normalization (whitespace, line endings, Unicode) is applied, so the value a client echoes back
//! compares equal exactly when the bytes are unchanged.

use core::fmt::{self, Display, Formatter};
use serde::Serialize;
use sha1::Digest;

pub use sha1::Sha1;
pub use sha2::Sha256;

/// Lowercase hex digest of some content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);
impl Fingerprint {
	/// Hashes `content` with the protocol's default digest ([`Sha1`], as carried in `html-sha1`).
	#[must_use]
	pub fn of(content: &str) -> Self {
		Self::with::<Sha1>(content)
	}

	/// Hashes `content` with an arbitrary digest.
	///
	/// Server and client must agree on `D`.
	#[must_use]
	pub fn with<D: Digest>(content: &str) -> Self {
		Self(hex::encode(D::digest(content.as_bytes())))
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	#[must_use]
	pub fn into_string(self) -> String {
		self.0
	}

	/// Compares against a client-declared fingerprint.
	///
	/// Tolerates surrounding whitespace, one pair of double quotes and a weak-validator `W/` prefix,
	/// and compares hex digits case-insensitively. An empty declaration never matches.
	#[must_use]
	pub fn matches_declared(&self, declared: &str) -> bool {
		let declared = declared.trim();
		let declared = declared.strip_prefix("W/").unwrap_or(declared);
		let declared = declared.strip_prefix('"').and_then(|d| d.strip_suffix('"')).unwrap_or(declared);
		!declared.is_empty() && declared.eq_ignore_ascii_case(&self.0)
	}
}

impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl AsRef<str> for Fingerprint {
	fn as_ref(&self) -> &str {
		&self.0
	}
}

impl From<Fingerprint> for String {
	fn from(fingerprint: Fingerprint) -> Self {
		fingerprint.0
	}
}
