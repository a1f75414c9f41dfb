//! Splits a rendered document into a template skeleton and named data segments.
//!
//! Segments are delimited by comment markers:
//!
//! ```html
//! <!--sonicdiff-name-->…<!--sonicdiff-name-end-->
//! <!--sonicdiff-->…<!--sonicdiff-end-->
//! ```
//!
//! Markers match ASCII case-insensitively. Names consist of ASCII alphanumerics and `_`.
//! Unnamed segments are numbered in document order with [`Config::auto_prefix`].
//! A start marker only closes with an end marker of the same name.
//! Segments don't nest: everything up to the closing end marker, other markers included, is the segment's body.
//! Unterminated start markers and orphaned end markers stay in the template as ordinary text.
//!
//! The first single-line `<title…</title>` element is extracted before markers are scanned and becomes the
//! `{title}` placeholder.

use crate::{config::Config, fingerprint::Fingerprint};
use core::{hash::BuildHasher, marker::PhantomData};
use hashbrown::{HashMap, HashSet};
use serde::ser::{Serialize, SerializeMap, Serializer};
use sha1::{Digest, Sha1};
use tracing::{debug, instrument, trace, warn};

/// Reserved name of the title segment.
pub const TITLE_KEY: &str = "title";
/// Placeholder of the title segment.
pub const TITLE_PLACEHOLDER: &str = "{title}";

const MARKER: &str = "<!--sonicdiff";
const COMMENT_CLOSE: &str = "-->";
const END_SUFFIX: &str = "-end-->";
const TITLE_OPEN: &str = "<title";
const TITLE_CLOSE: &str = "</title>";

/// Wraps a segment name into its placeholder form, `{name}`.
#[must_use]
pub fn placeholder(name: &str) -> String {
	format!("{{{}}}", name)
}

/// Inverse of [`placeholder`].
#[must_use]
pub fn placeholder_name(placeholder: &str) -> Option<&str> {
	placeholder.strip_prefix('{')?.strip_suffix('}').filter(|name| !name.is_empty())
}

/// One extracted marker-delimited span. `value` includes both markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
	pub name: String,
	pub value: String,
}

impl Segment {
	#[must_use]
	pub fn placeholder(&self) -> String {
		placeholder(&self.name)
	}
}

/// Result of [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
	pub template: String,
	/// The literal title element, if the document had one.
	pub title: Option<String>,
	/// In document order. Names may repeat if the document repeats them.
	pub segments: Vec<Segment>,
	/// Of the unmodified document.
	pub document_fingerprint: Fingerprint,
	pub template_fingerprint: Fingerprint,
}

impl Split {
	/// The title element, or `""` if the document had none.
	#[must_use]
	pub fn title_value(&self) -> &str {
		self.title.as_deref().unwrap_or("")
	}

	/// Whether any marker-delimited segment was found. The title doesn't count.
	#[must_use]
	pub fn has_segments(&self) -> bool {
		!self.segments.is_empty()
	}

	/// The placeholder → value mapping sent to clients.
	///
	/// `{title}` always comes first and is present even when the document has no title (with an empty value).
	/// If a name repeats, the last value wins at the position of the first.
	#[must_use]
	pub fn data(&self) -> SegmentData {
		let mut data = SegmentData::with_capacity(self.segments.len() + 1);
		data.insert(TITLE_PLACEHOLDER.to_owned(), self.title_value().to_owned());
		for segment in &self.segments {
			data.insert(segment.placeholder(), segment.value.clone());
		}
		data
	}
}

/// Ordered placeholder → value map. Serializes as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentData(Vec<(String, String)>);

impl SegmentData {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_capacity(capacity: usize) -> Self {
		Self(Vec::with_capacity(capacity))
	}

	/// Replaces the value in place if `placeholder` is already present.
	pub fn insert(&mut self, placeholder: String, value: String) {
		match self.0.iter_mut().find(|(existing, _)| *existing == placeholder) {
			Some((_, existing)) => *existing = value,
			None => self.0.push((placeholder, value)),
		}
	}

	#[must_use]
	pub fn get(&self, placeholder: &str) -> Option<&str> {
		self.0.iter().find(|(existing, _)| existing == placeholder).map(|(_, value)| value.as_str())
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(placeholder, value)| (placeholder.as_str(), value.as_str()))
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	#[must_use]
	pub fn into_map(self) -> HashMap<String, String> {
		self.0.into_iter().collect()
	}

	/// The entries whose value differs from what the client has cached, in this map's order.
	///
	/// A key missing from `cached` counts as cached with an empty value.
	/// Without a cache, everything is new.
	#[must_use]
	pub fn changed_since(&self, cached: Option<&(impl SegmentSource + ?Sized)>) -> Self {
		let cached = match cached {
			Some(cached) => cached,
			None => return self.clone(),
		};
		let changed = Self(
			self.0
				.iter()
				.filter(|(placeholder, value)| cached.segment(placeholder).unwrap_or("") != value.as_str())
				.cloned()
				.collect(),
		);
		debug!(total = self.len(), changed = changed.len(), "Compared segment data with cache.");
		trace!(changed = ?changed.0.iter().map(|(placeholder, value)| (placeholder.as_str(), value.len())).collect::<Vec<_>>(), "Changed segments.");
		changed
	}
}

impl From<HashMap<String, String>> for SegmentData {
	/// Order follows the map's iteration order.
	fn from(map: HashMap<String, String>) -> Self {
		Self(map.into_iter().collect())
	}
}

impl Serialize for SegmentData {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.0.len()))?;
		for (placeholder, value) in &self.0 {
			map.serialize_entry(placeholder, value)?;
		}
		map.end()
	}
}

/// Splitter with a configurable unnamed-segment prefix and digest.
pub struct Splitter<D = Sha1> {
	auto_prefix: String,
	_digest: PhantomData<fn() -> D>,
}

impl<D> Clone for Splitter<D> {
	fn clone(&self) -> Self {
		Self {
			auto_prefix: self.auto_prefix.clone(),
			_digest: PhantomData,
		}
	}
}

impl<D> core::fmt::Debug for Splitter<D> {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Splitter").field("auto_prefix", &self.auto_prefix).finish_non_exhaustive()
	}
}

impl Default for Splitter {
	fn default() -> Self {
		Self::new(&Config::default())
	}
}

impl Splitter {
	#[must_use]
	pub fn new(config: &Config) -> Self {
		Self::with_digest(config)
	}
}

impl<D: Digest> Splitter<D> {
	#[must_use]
	pub fn with_digest(config: &Config) -> Self {
		Self {
			auto_prefix: config.auto_prefix.clone(),
			_digest: PhantomData,
		}
	}

	#[instrument(skip(self, document), fields(document.len = document.len()))]
	pub fn split(&self, document: &str) -> Split {
		let (title, titled) = extract_title(document);
		let (template, segments) = extract_segments(&titled, &self.auto_prefix);

		let split = Split {
			document_fingerprint: Fingerprint::with::<D>(document),
			template_fingerprint: Fingerprint::with::<D>(&template),
			template,
			title,
			segments,
		};

		debug!(
			segments = split.segments.len(),
			title = split.title.is_some(),
			document_fingerprint = %split.document_fingerprint,
			template_fingerprint = %split.template_fingerprint,
			"Split document."
		);
		if cfg!(feature = "dangerous-logging") {
			trace!(title = ?split.title, segments = ?split.segments, "Split contents.");
		} else {
			trace!(names = ?split.segments.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(), "Split segment names.");
		}

		split
	}
}

/// Splits `document` with the default configuration and digest.
#[must_use]
pub fn split(document: &str) -> Split {
	Splitter::default().split(document)
}

/// Returns the title element (if any) and the document with it replaced by [`TITLE_PLACEHOLDER`].
fn extract_title(document: &str) -> (Option<String>, String) {
	let mut from = 0;
	while let Some(open) = find_ignore_ascii_case(document, TITLE_OPEN, from) {
		// The element has to close on the same line.
		let line_end = document[open..].find(|c| c == '\n' || c == '\r').map_or(document.len(), |i| open + i);
		match find_ignore_ascii_case(&document[..line_end], TITLE_CLOSE, open + TITLE_OPEN.len()) {
			Some(close) => {
				let end = close + TITLE_CLOSE.len();
				let mut titled = String::with_capacity(document.len() - (end - open) + TITLE_PLACEHOLDER.len());
				titled.push_str(&document[..open]);
				titled.push_str(TITLE_PLACEHOLDER);
				titled.push_str(&document[end..]);
				return (Some(document[open..end].to_owned()), titled);
			}
			// Nothing later on this line can close either.
			None => from = line_end,
		}
	}
	(None, document.to_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
	Start,
	End,
}

#[derive(Debug)]
struct Marker<'a> {
	kind: MarkerKind,
	/// Empty for unnamed markers.
	name: &'a str,
	start: usize,
	end: usize,
}

/// Tokenizes all markers in one pass.
fn scan_markers(text: &str) -> Vec<Marker<'_>> {
	let mut markers = Vec::new();
	let mut from = 0;
	while let Some(start) = find_ignore_ascii_case(text, MARKER, from) {
		from = start + MARKER.len();
		if let Some((kind, name, end)) = parse_marker(text, from) {
			markers.push(Marker { kind, name, start, end });
			from = end;
		}
	}
	markers
}

/// Parses what follows `<!--sonicdiff`. Returns the kind, the name and the end offset of the marker.
fn parse_marker(text: &str, after_prefix: usize) -> Option<(MarkerKind, &str, usize)> {
	let rest = &text[after_prefix..];
	if starts_with_ignore_ascii_case(rest, END_SUFFIX) {
		return Some((MarkerKind::End, "", after_prefix + END_SUFFIX.len()));
	}
	if starts_with_ignore_ascii_case(rest, COMMENT_CLOSE) {
		return Some((MarkerKind::Start, "", after_prefix + COMMENT_CLOSE.len()));
	}

	let name_start = after_prefix + usize::from(rest.starts_with('-'));
	let name_len = text[name_start..].bytes().take_while(|b| b.is_ascii_alphanumeric() || *b == b'_').count();
	let name = &text[name_start..name_start + name_len];
	let rest = &text[name_start + name_len..];
	if starts_with_ignore_ascii_case(rest, END_SUFFIX) {
		Some((MarkerKind::End, name, name_start + name_len + END_SUFFIX.len()))
	} else if starts_with_ignore_ascii_case(rest, COMMENT_CLOSE) && !name.eq_ignore_ascii_case("end") {
		// `<!--sonicdiff-end-->` is an unnamed end marker and was handled above, so `end` is never a start name.
		Some((MarkerKind::Start, name, name_start + name_len + COMMENT_CLOSE.len()))
	} else {
		None
	}
}

/// Replaces each closed marker pair with its placeholder.
fn extract_segments(text: &str, auto_prefix: &str) -> (String, Vec<Segment>) {
	let markers = scan_markers(text);

	// End marker indices per lowercased name, ascending.
	let mut ends: HashMap<String, Vec<usize>> = HashMap::new();
	for (i, marker) in markers.iter().enumerate() {
		if marker.kind == MarkerKind::End {
			ends.entry(marker.name.to_ascii_lowercase()).or_default().push(i);
		}
	}

	let mut template = String::with_capacity(text.len());
	let mut segments = Vec::new();
	let mut copied = 0;
	let mut auto_index = 0_usize;

	for (i, marker) in markers.iter().enumerate() {
		if marker.start < copied {
			continue;
		}
		match marker.kind {
			MarkerKind::End => {
				warn!(name = marker.name, offset = marker.start, "Ignoring end marker without open segment.");
				continue;
			}
			MarkerKind::Start => {}
		}

		let close = ends.get(&marker.name.to_ascii_lowercase()).and_then(|candidates| {
			let next = candidates.partition_point(|&end| end <= i);
			candidates.get(next).copied()
		});
		let close = match close {
			Some(close) => &markers[close],
			None => {
				warn!(name = marker.name, offset = marker.start, "Ignoring unterminated start marker.");
				continue;
			}
		};

		let name = if marker.name.is_empty() {
			let name = format!("{}{}", auto_prefix, auto_index);
			auto_index += 1;
			name
		} else {
			marker.name.to_owned()
		};

		template.push_str(&text[copied..marker.start]);
		template.push_str(&placeholder(&name));
		segments.push(Segment {
			name,
			value: text[marker.start..close.end].to_owned(),
		});
		copied = close.end;
	}
	template.push_str(&text[copied..]);

	(template, segments)
}

/// Looks up placeholder values while rebuilding a document from its template.
pub trait SegmentSource {
	fn segment(&self, placeholder: &str) -> Option<&str>;
}

impl<S: BuildHasher> SegmentSource for HashMap<String, String, S> {
	fn segment(&self, placeholder: &str) -> Option<&str> {
		self.get(placeholder).map(String::as_str)
	}
}

impl SegmentSource for SegmentData {
	fn segment(&self, placeholder: &str) -> Option<&str> {
		self.get(placeholder)
	}
}

/// Reassembles a document from a template and its segment data.
///
/// Each segment placeholder is substituted once, left to right. The title is substituted last since it may sit inside a segment.
/// An empty title value leaves any literal `{title}` text alone.
///
/// Placeholder-shaped text is not escaped. If the page itself contains `{x}` as literal text before segment `x`,
/// that text receives the segment and the real placeholder stays behind, so such pages don't round-trip.
#[must_use]
pub fn rebuild(template: &str, data: &(impl SegmentSource + ?Sized)) -> String {
	let mut html = String::with_capacity(template.len());
	let mut used = HashSet::new();
	let mut copied = 0;
	let mut from = 0;
	while let Some(offset) = template[from..].find('{') {
		let open = from + offset;
		let name_len = template[open + 1..].bytes().take_while(|b| b.is_ascii_alphanumeric() || *b == b'_').count();
		let close = open + 1 + name_len;
		from = open + 1;
		if name_len == 0 || template.as_bytes().get(close) != Some(&b'}') {
			continue;
		}

		let key = &template[open..=close];
		if key == TITLE_PLACEHOLDER || used.contains(key) {
			continue;
		}
		if let Some(value) = data.segment(key) {
			html.push_str(&template[copied..open]);
			html.push_str(value);
			used.insert(key);
			copied = close + 1;
			from = copied;
		}
	}
	html.push_str(&template[copied..]);

	match data.segment(TITLE_PLACEHOLDER).filter(|title| !title.is_empty()) {
		Some(title) => html.replacen(TITLE_PLACEHOLDER, title, 1),
		None => html,
	}
}

/// Like [`rebuild`], but checks the result against the document fingerprint the server sent along (`html-sha1`).
///
/// An empty `expected` skips the check.
///
/// # Errors
///
/// [`Error::FingerprintMismatch`](crate::Error::FingerprintMismatch) if the rebuilt document hashes differently.
pub fn rebuild_verified(template: &str, data: &(impl SegmentSource + ?Sized), expected: &str) -> crate::Result<String> {
	let html = rebuild(template, data);
	if expected.trim().is_empty() {
		return Ok(html);
	}

	let actual = Fingerprint::of(&html);
	if actual.matches_declared(expected) {
		Ok(html)
	} else {
		warn!(%actual, expected, "Rebuilt document fingerprint mismatch.");
		Err(crate::Error::FingerprintMismatch {
			expected: expected.to_owned(),
			actual: actual.into_string(),
		})
	}
}

fn starts_with_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
	haystack.len() >= needle.len() && haystack.as_bytes()[..needle.len()].eq_ignore_ascii_case(needle.as_bytes())
}

/// `needle` must be ASCII, so any match lies on a char boundary.
fn find_ignore_ascii_case(haystack: &str, needle: &str, from: usize) -> Option<usize> {
	let haystack = haystack.as_bytes();
	let needle = needle.as_bytes();
	if haystack.len() < needle.len() {
		return None;
	}
	(from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
