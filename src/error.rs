use thiserror::Error;

/// Failures of the fallible helpers around the protocol engine.
///
/// The engine itself ([`split`](crate::split::split), [`select`](crate::select::select) and
/// [`reconcile`](crate::reconcile::reconcile)) never fails; these only surface from the edges.
#[derive(Debug, Error)]
pub enum Error {
	#[error("malformed transport payload: {0}")]
	Payload(#[from] serde_json::Error),

	#[error("transport payload field `result` is missing for code 200")]
	MissingResult,

	#[error("rebuilt document fingerprint {actual} does not match expected {expected}")]
	FingerprintMismatch { expected: String, actual: String },

	#[error("header value is not representable: {0}")]
	HeaderValue(#[from] http::header::InvalidHeaderValue),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
