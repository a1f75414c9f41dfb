//! Client-side reconciliation of the native transport's result with a timeout.
//!
//! The native layer reports one of `200`, `1000`, `2000` or `304` as JSON:
//!
//! ```json
//! { "code": 304, "srcCode": 200, "result": "{\"{x}\": \"…\"}" }
//! ```
//!
//! `srcCode` only matters for `304` and names the outcome the cache hit short-circuited.
//! `result` is the stringified placeholder → HTML map and only matters for `200`.
//!
//! Exactly one of "the transport answered" and "the timer fired" drives the outcome per page load.
//! [`Rendezvous`] is the callback form of that latch, [`await_reconciled`] the future form.

use crate::{split::SegmentSource, status::Status, Error, Result};
use core::{cell::Cell, future::Future};
use futures::{
	channel::oneshot,
	future::{self, Either},
	pin_mut,
};
use hashbrown::HashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

/// Final outcome of one page load as seen by the page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
	/// Drives the DOM update.
	pub status: Status,
	/// Goes to page metrics. Differs from `status` when a `304` short-circuited another outcome.
	pub report: Status,
	/// Placeholder → HTML. Only non-empty for [`Status::DataChanged`].
	pub segments: HashMap<String, String>,
}

impl Reconciled {
	/// What a timeout or an unusable payload resolves to.
	#[must_use]
	pub fn unknown() -> Self {
		Self::default()
	}

	/// Drops segments the page already shows, so a data update only patches what changed.
	///
	/// A segment missing from `cached` counts as cached with an empty value.
	pub fn retain_changed(&mut self, cached: &(impl SegmentSource + ?Sized)) {
		let before = self.segments.len();
		self.segments.retain(|placeholder, html| cached.segment(placeholder).unwrap_or("") != html.as_str());
		debug!(before, changed = self.segments.len(), "Filtered unchanged segments.");
	}
}

/// A number or a numeric string, as sent by different native layers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Code {
	Number(i64),
	Text(String),
}

impl Code {
	fn value(&self) -> Option<i64> {
		match self {
			Self::Number(number) => Some(*number),
			Self::Text(text) => text.trim().parse().ok(),
		}
	}
}

#[derive(Debug, Deserialize)]
struct TransportPayload {
	code: Code,
	#[serde(rename = "srcCode", default)]
	src_code: Option<Code>,
	#[serde(default)]
	result: Option<Value>,
}

/// Maps transport codes and segments to the effective and reported status.
///
/// Unrecognized primary codes yield [`Status::Unknown`] for both.
#[must_use]
pub fn reconcile(code: i64, src_code: Option<i64>, segments: HashMap<String, String>) -> Reconciled {
	let status = match Status::from_transport_code(code) {
		Some(status) => status,
		None => {
			warn!(code, "Unrecognized transport code.");
			return Reconciled::unknown();
		}
	};

	let report = match status {
		Status::FullyCached => src_code.and_then(Status::from_transport_code).unwrap_or(status),
		_ => status,
	};

	Reconciled {
		status,
		report,
		segments: if status == Status::DataChanged { segments } else { HashMap::new() },
	}
}

/// Parses a raw transport payload.
///
/// # Errors
///
/// [`Error::Payload`] for malformed JSON, [`Error::MissingResult`] for a `200` without usable segments.
pub fn parse_payload(payload: &str) -> Result<Reconciled> {
	let TransportPayload { code, src_code, result } = serde_json::from_str(payload)?;
	let code = code.value().unwrap_or(-1);
	let src_code = src_code.as_ref().and_then(Code::value);

	let segments: HashMap<String, String> = if code == 200 {
		match result {
			Some(Value::String(stringified)) => serde_json::from_str(&stringified)?,
			Some(object @ Value::Object(_)) => serde_json::from_value(object)?,
			_ => return Err(Error::MissingResult),
		}
	} else {
		HashMap::new()
	};

	Ok(reconcile(code, src_code, segments))
}

/// Like [`parse_payload`], but resolves every failure to [`Reconciled::unknown`].
#[must_use]
#[instrument(skip(payload), fields(payload.len = payload.len()))]
pub fn reconcile_payload(payload: &str) -> Reconciled {
	match parse_payload(payload) {
		Ok(reconciled) => {
			debug!(status = %reconciled.status, report = %reconciled.report, segments = reconciled.segments.len(), "Reconciled.");
			reconciled
		}
		Err(error) => {
			warn!(%error, "Unusable transport payload; treating as timeout.");
			if cfg!(feature = "dangerous-logging") {
				trace!(payload, "Unusable payload.");
			}
			Reconciled::unknown()
		}
	}
}

/// One-shot latch between the transport callback and the timer.
///
/// Whichever of [`deliver`](Self::deliver) and [`expire`](Self::expire) comes first invokes the report callback.
/// Every later call is a no-op. Both must run on the same thread, as the page's event loop does.
pub struct Rendezvous<F: FnOnce(Reconciled)> {
	report: Cell<Option<F>>,
}

impl<F: FnOnce(Reconciled)> Rendezvous<F> {
	pub fn new(report: F) -> Self {
		Self { report: Cell::new(Some(report)) }
	}

	/// Handles the transport's payload. Returns whether this call fired the report.
	pub fn deliver(&self, payload: &str) -> bool {
		match self.report.take() {
			Some(report) => {
				report(reconcile_payload(payload));
				true
			}
			None => {
				trace!("Ignoring transport signal after the outcome was settled.");
				false
			}
		}
	}

	/// Handles the timer. Returns whether this call fired the report.
	pub fn expire(&self) -> bool {
		match self.report.take() {
			Some(report) => {
				debug!("Transport timed out.");
				report(Reconciled::unknown());
				true
			}
			None => {
				trace!("Ignoring timeout after the outcome was settled.");
				false
			}
		}
	}

	#[must_use]
	pub fn is_settled(&self) -> bool {
		// `Cell<Option<F>>` can't be inspected without taking, so swap out and back in.
		let report = self.report.take();
		let settled = report.is_none();
		self.report.set(report);
		settled
	}
}

impl<F: FnOnce(Reconciled)> core::fmt::Debug for Rendezvous<F> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Rendezvous").field("settled", &self.is_settled()).finish()
	}
}

/// Creates the per-call channel the transport answers on.
#[must_use]
pub fn signal_channel() -> (oneshot::Sender<String>, oneshot::Receiver<String>) {
	oneshot::channel()
}

/// Waits for the transport's payload or `timer`, whichever completes first.
///
/// A dropped sender resolves immediately to [`Reconciled::unknown`], since no payload can arrive anymore.
pub async fn await_reconciled<T: Future<Output = ()>>(signal: oneshot::Receiver<String>, timer: T) -> Reconciled {
	pin_mut!(timer);
	match future::select(signal, timer).await {
		Either::Left((Ok(payload), _)) => reconcile_payload(&payload),
		Either::Left((Err(oneshot::Canceled), _)) => {
			warn!("Transport dropped its channel without answering.");
			Reconciled::unknown()
		}
		Either::Right(((), _)) => {
			debug!("Transport timed out.");
			Reconciled::unknown()
		}
	}
}
