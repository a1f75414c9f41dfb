//! Applies a data update to the page.
//!
//! Segment `{name}` replaces the inner HTML of the element with ID `nameContent`, verbatim.
//! No sanitization happens: the HTML must come from a trusted server.

use crate::split::placeholder_name;
use core::hash::BuildHasher;
use hashbrown::HashMap;
use tracing::{instrument, trace, warn};

/// Suffix appended to a segment name to form the ID of the element it updates.
pub const CONTENT_SUFFIX: &str = "Content";

/// Somewhere segment HTML can be written to by element ID.
pub trait PatchTarget {
	/// Returns `false` if no element with `id` exists.
	fn replace_inner_html(&mut self, id: &str, html: &str) -> bool;
}

/// ID → inner HTML, for rendering without a DOM.
impl<S: BuildHasher> PatchTarget for HashMap<String, String, S> {
	fn replace_inner_html(&mut self, id: &str, html: &str) -> bool {
		match self.get_mut(id) {
			Some(inner_html) => {
				html.clone_into(inner_html);
				true
			}
			None => false,
		}
	}
}

/// The element ID a placeholder key updates, or [`None`] if the key isn't of the form `{name}`.
#[must_use]
pub fn target_id(placeholder: &str) -> Option<String> {
	placeholder_name(placeholder).map(|name| format!("{}{}", name, CONTENT_SUFFIX))
}

/// Counts of what [`apply_segments`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchReport {
	pub applied: usize,
	/// Keys whose target element doesn't exist.
	pub missing: usize,
	/// Keys not of the form `{name}`.
	pub skipped: usize,
}

/// Writes each segment into its target element.
#[instrument(skip(target, segments), fields(segments = segments.len()))]
pub fn apply_segments<T, S>(target: &mut T, segments: &HashMap<String, String, S>) -> PatchReport
where
	T: PatchTarget + ?Sized,
	S: BuildHasher,
{
	let mut report = PatchReport::default();
	for (key, html) in segments {
		let id = match target_id(key) {
			Some(id) => id,
			None => {
				trace!(key = key.as_str(), "Skipping non-placeholder key.");
				report.skipped += 1;
				continue;
			}
		};

		if target.replace_inner_html(&id, html) {
			trace!(id = id.as_str(), html.len = html.len(), "Patched.");
			report.applied += 1;
		} else {
			warn!(id = id.as_str(), "No element to patch.");
			report.missing += 1;
		}
	}
	report
}
