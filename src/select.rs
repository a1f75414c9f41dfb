//! Picks the response shape for one request from the client's conditional headers and the current [`Split`].
//!
//! | Client state                                | Outcome                               |
//! |---------------------------------------------|---------------------------------------|
//! | no `accept-diff: true`                      | full document, no protocol headers    |
//! | `if-none-match` equals document fingerprint | [`ProtocolOutcome::FullyCached`], 304 |
//! | document has no segments                    | full document, `template-change: true`|
//! | no `template-tag`                           | [`ProtocolOutcome::FirstLoad`]        |
//! | `template-tag` equals template fingerprint  | [`ProtocolOutcome::DataChanged`]      |
//! | otherwise                                   | [`ProtocolOutcome::TemplateChanged`]  |
//!
//! Every combination of absent or garbled headers lands on one of these rows.

use crate::{
	config::Config,
	fingerprint::Fingerprint,
	headers::{CacheOffline, ConditionalHeaders, CACHE_OFFLINE, TEMPLATE_CHANGE, TEMPLATE_TAG},
	split::{SegmentData, Split, Splitter},
	status::Status,
};
use http::{
	header::{HeaderName, CACHE_CONTROL, CONTENT_LENGTH, ETAG},
	HeaderMap, HeaderValue, Response, StatusCode,
};
use serde::Serialize;
use tracing::{debug, error, instrument};

/// Body of a data-only update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataChangedBody {
	/// Placeholder → segment HTML, `{title}` included.
	pub data: SegmentData,
	/// Reserved, always empty.
	pub diff: String,
	#[serde(rename = "html-sha1")]
	pub html_sha1: Fingerprint,
	#[serde(rename = "template-tag")]
	pub template_tag: Fingerprint,
}

/// What to send for one request. Fully determines status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOutcome {
	/// 304 with an empty body.
	FullyCached,
	/// The unmodified document. Also used when the client didn't opt in.
	FirstLoad(String),
	/// The unmodified document; the client's template is stale.
	TemplateChanged(String),
	/// Only the segments travel. `json` is the serialized `payload`.
	DataChanged { payload: DataChangedBody, json: String },
}

impl ProtocolOutcome {
	#[must_use]
	pub fn body(&self) -> &str {
		match self {
			Self::FullyCached => "",
			Self::FirstLoad(document) | Self::TemplateChanged(document) => document,
			Self::DataChanged { json, .. } => json,
		}
	}

	#[must_use]
	pub fn into_body(self) -> String {
		match self {
			Self::FullyCached => String::new(),
			Self::FirstLoad(document) | Self::TemplateChanged(document) => document,
			Self::DataChanged { json, .. } => json,
		}
	}
}

/// A chosen outcome together with the status code and headers to emit.
#[derive(Debug, Clone)]
pub struct Selection {
	pub outcome: ProtocolOutcome,
	pub status_code: StatusCode,
	pub headers: HeaderMap,
	/// Diagnostic classification: [`Status::Unknown`] if the protocol wasn't in use or the document had no segments.
	pub status: Status,
}

impl Selection {
	/// Writes status, headers (plus `Content-Length`) and body.
	#[must_use]
	pub fn into_response(self) -> Response<String> {
		let Self { outcome, status_code, mut headers, .. } = self;
		let body = outcome.into_body();
		headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

		let mut response = Response::new(body);
		*response.status_mut() = status_code;
		*response.headers_mut() = headers;
		response
	}
}

/// Chooses the outcome for `document`, which `split` was computed from.
#[instrument(skip(document, split, config), fields(document_fingerprint = %split.document_fingerprint))]
pub fn select(request: &ConditionalHeaders, document: String, split: &Split, config: &Config) -> Selection {
	if !request.accept_diff {
		return opt_out(document);
	}

	let mut headers = HeaderMap::new();
	headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
	insert_fingerprint(&mut headers, ETAG, &split.document_fingerprint);

	if request.if_none_match.as_deref().map_or(false, |declared| split.document_fingerprint.matches_declared(declared)) {
		headers.insert(CACHE_OFFLINE, CacheOffline::Store.header_value());
		debug!("Document unchanged.");
		return Selection {
			outcome: ProtocolOutcome::FullyCached,
			status_code: StatusCode::NOT_MODIFIED,
			headers,
			status: Status::FullyCached,
		};
	}

	headers.insert(CACHE_OFFLINE, config.cache_offline.header_value());
	insert_fingerprint(&mut headers, TEMPLATE_TAG, &split.template_fingerprint);

	let client_template = request.template_tag.as_deref();
	if !split.has_segments() {
		debug!("No segments; sending the full document.");
		return full_document(document, headers, client_template.is_none(), Status::Unknown);
	}

	match client_template {
		None => {
			debug!("Client has no template.");
			full_document(document, headers, true, Status::FirstLoad)
		}
		Some(declared) if split.template_fingerprint.matches_declared(declared) => data_changed(document, headers, split),
		Some(_) => {
			debug!("Template changed.");
			full_document(document, headers, false, Status::TemplateChanged)
		}
	}
}

/// Parses the request headers, splits `document` if the client opted in and selects the response.
///
/// This is the whole server side for hosts built on the [`http`] crate's types.
#[must_use]
pub fn respond(document: String, request_headers: &HeaderMap, config: &Config) -> Response<String> {
	let request = ConditionalHeaders::from_headers(request_headers);
	let selection = if request.accept_diff {
		let split = Splitter::new(config).split(&document);
		select(&request, document, &split, config)
	} else {
		opt_out(document)
	};
	selection.into_response()
}

fn opt_out(document: String) -> Selection {
	debug!("Client did not opt in.");
	Selection {
		outcome: ProtocolOutcome::FirstLoad(document),
		status_code: StatusCode::OK,
		headers: HeaderMap::new(),
		status: Status::Unknown,
	}
}

fn full_document(document: String, mut headers: HeaderMap, first_load: bool, status: Status) -> Selection {
	headers.insert(TEMPLATE_CHANGE, HeaderValue::from_static("true"));
	Selection {
		outcome: if first_load {
			ProtocolOutcome::FirstLoad(document)
		} else {
			ProtocolOutcome::TemplateChanged(document)
		},
		status_code: StatusCode::OK,
		headers,
		status,
	}
}

fn data_changed(document: String, mut headers: HeaderMap, split: &Split) -> Selection {
	let payload = DataChangedBody {
		data: split.data(),
		diff: String::new(),
		html_sha1: split.document_fingerprint.clone(),
		template_tag: split.template_fingerprint.clone(),
	};
	match serde_json::to_string(&payload) {
		Ok(json) => {
			debug!(segments = payload.data.len(), json.len = json.len(), "Data changed.");
			headers.insert(TEMPLATE_CHANGE, HeaderValue::from_static("false"));
			Selection {
				outcome: ProtocolOutcome::DataChanged { payload, json },
				status_code: StatusCode::OK,
				headers,
				status: Status::DataChanged,
			}
		}
		Err(error) => {
			error!(%error, "Failed to serialize data update; sending the full document.");
			full_document(document, headers, false, Status::TemplateChanged)
		}
	}
}

fn insert_fingerprint(headers: &mut HeaderMap, name: HeaderName, fingerprint: &Fingerprint) {
	match fingerprint_value(fingerprint) {
		Ok(value) => {
			headers.insert(name, value);
		}
		Err(error) => error!(%error, %name, "Skipping header."),
	}
}

fn fingerprint_value(fingerprint: &Fingerprint) -> crate::Result<HeaderValue> {
	Ok(HeaderValue::from_str(fingerprint.as_str())?)
}
