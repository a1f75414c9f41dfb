#![cfg(not(target_arch = "wasm32"))]

use proptest::prelude::*;
use sonic_diff::{
	fingerprint::{Fingerprint, Sha256},
	rebuild,
	split::{rebuild_verified, SegmentData, Splitter},
	split, Config, Error, Segment,
};

mod common;
use common::init_logging;

const EXAMPLE: &str = "<html><title>A</title><body><!--sonicdiff-x-->1<!--sonicdiff-x-end--></body></html>";

#[test]
fn example_document() {
	init_logging();
	let split = split(EXAMPLE);

	assert_eq!(split.template, "<html>{title}<body>{x}</body></html>");
	assert_eq!(split.title.as_deref(), Some("<title>A</title>"));
	assert_eq!(
		split.segments,
		vec![Segment {
			name: "x".to_owned(),
			value: "<!--sonicdiff-x-->1<!--sonicdiff-x-end-->".to_owned(),
		}]
	);
	assert_eq!(split.document_fingerprint, Fingerprint::of(EXAMPLE));
	assert_eq!(split.template_fingerprint, Fingerprint::of("<html>{title}<body>{x}</body></html>"));

	let data: Vec<_> = split.data().iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
	assert_eq!(
		data,
		vec![
			("{title}".to_owned(), "<title>A</title>".to_owned()),
			("{x}".to_owned(), "<!--sonicdiff-x-->1<!--sonicdiff-x-end-->".to_owned()),
		]
	);
}

#[test]
fn unnamed_segments_are_numbered() {
	init_logging();
	let split = split("<!--sonicdiff-->a<!--sonicdiff-end--><!--sonicdiff-n-->b<!--sonicdiff-n-end--><!--sonicdiff-->c<!--sonicdiff-end-->");
	assert_eq!(split.template, "{auto0}{n}{auto1}");
	let names: Vec<_> = split.segments.iter().map(|s| s.name.as_str()).collect();
	assert_eq!(names, ["auto0", "n", "auto1"]);
}

#[test]
fn configured_prefix() {
	let config = Config {
		auto_prefix: "slot".to_owned(),
		..Config::default()
	};
	let split = Splitter::new(&config).split("<!--sonicdiff-->a<!--sonicdiff-end-->");
	assert_eq!(split.template, "{slot0}");
}

#[test]
fn markers_are_case_insensitive() {
	let split = split("<!--SonicDiff-Head-->h<!--SONICDIFF-head-END-->");
	assert_eq!(split.template, "{Head}");
	assert_eq!(split.segments[0].value, "<!--SonicDiff-Head-->h<!--SONICDIFF-head-END-->");
}

#[test]
fn missing_title() {
	let split = split("<body><!--sonicdiff-x-->1<!--sonicdiff-x-end--></body>");
	assert_eq!(split.title, None);
	assert_eq!(split.title_value(), "");
	assert_eq!(split.template, "<body>{x}</body>");
	assert_eq!(split.data().get("{title}"), Some(""));
}

#[test]
fn only_the_first_title_is_extracted() {
	let split = split("<TITLE>a</TITLE><title>b</title>");
	assert_eq!(split.title.as_deref(), Some("<TITLE>a</TITLE>"));
	assert_eq!(split.template, "{title}<title>b</title>");
}

#[test]
fn malformed_markers_stay_in_the_template() {
	init_logging();
	for document in &[
		"<p><!--sonicdiff-x-->never closed</p>",
		"<p>orphan<!--sonicdiff-x-end--></p>",
		"<p><!--sonicdiff-x-->wrong close<!--sonicdiff-y-end--></p>",
		"<p><!--sonicdiff-x-y-->not a marker<!--sonicdiff-x-y-end--></p>",
	] {
		let split = split(document);
		assert!(!split.has_segments(), "{}", document);
		assert_eq!(split.template, *document);
		assert_eq!(split.template_fingerprint, split.document_fingerprint);
	}
}

#[test]
fn unterminated_start_does_not_swallow_later_segments() {
	let split = split("<!--sonicdiff-a-->x<!--sonicdiff-b-->y<!--sonicdiff-b-end-->");
	assert_eq!(split.template, "<!--sonicdiff-a-->x{b}");
}

#[test]
fn segments_do_not_nest() {
	let document = "<!--sonicdiff-outer--><!--sonicdiff-inner-->i<!--sonicdiff-inner-end--><!--sonicdiff-outer-end-->";
	let split = split(document);
	assert_eq!(split.template, "{outer}");
	assert_eq!(split.segments.len(), 1);
	assert_eq!(split.segments[0].value, document);
}

#[test]
fn title_inside_a_segment_round_trips() {
	let document = "<head><!--sonicdiff-h--><title>T</title><!--sonicdiff-h-end--></head>";
	let split = split(document);
	assert_eq!(split.template, "<head>{h}</head>");
	assert_eq!(split.segments[0].value, "<!--sonicdiff-h-->{title}<!--sonicdiff-h-end-->");
	assert_eq!(rebuild(&split.template, &split.data()), document);
}

#[test]
fn alternative_digest() {
	let split = Splitter::<Sha256>::with_digest(&Config::default()).split(EXAMPLE);
	assert_eq!(split.document_fingerprint, Fingerprint::with::<Sha256>(EXAMPLE));
	assert_eq!(split.document_fingerprint.as_str().len(), 64);
}

#[test]
fn verified_rebuild() {
	let split = split(EXAMPLE);
	let data = split.data().into_map();
	assert_eq!(rebuild_verified(&split.template, &data, split.document_fingerprint.as_str()).unwrap(), EXAMPLE);
	assert_eq!(rebuild_verified(&split.template, &data, "").unwrap(), EXAMPLE);
	match rebuild_verified(&split.template, &data, "0000") {
		Err(Error::FingerprintMismatch { expected, actual }) => {
			assert_eq!(expected, "0000");
			assert_eq!(actual, split.document_fingerprint.as_str());
		}
		other => panic!("Expected a fingerprint mismatch but got {:?}", other),
	}
}

/// Text without braces or `<`, so it can neither form markers nor placeholders.
fn plain() -> impl Strategy<Value = String> {
	"[a-zA-Z0-9 .,\n-]{0,12}"
}

/// A document of plain text, distinctly named segments and at most one title.
fn document() -> impl Strategy<Value = String> {
	(prop::collection::vec((plain(), plain(), any::<bool>()), 0..6), prop::option::of(plain()), plain()).prop_map(|(parts, title, tail)| {
		let mut document = String::new();
		if let Some(title) = title {
			document.push_str(&format!("<title>{}</title>", title.replace('\n', " ")));
		}
		for (i, (before, body, named)) in parts.into_iter().enumerate() {
			document.push_str(&before);
			if named {
				document.push_str(&format!("<!--sonicdiff-s{0}-->{1}<!--sonicdiff-s{0}-end-->", i, body));
			} else {
				document.push_str(&format!("<!--sonicdiff-->{}<!--sonicdiff-end-->", body));
			}
		}
		document.push_str(&tail);
		document
	})
}

proptest! {
	#[test]
	fn rebuild_restores_the_document(document in document()) {
		let split = split(&document);
		let rebuilt = rebuild(&split.template, &split.data());
		prop_assert_eq!(Fingerprint::of(&rebuilt), split.document_fingerprint);
		prop_assert_eq!(rebuilt, document);
	}

	#[test]
	fn fingerprints_are_stable(document in document()) {
		let a = split(&document);
		let b = split(&document);
		prop_assert_eq!(a.document_fingerprint, b.document_fingerprint);
		prop_assert_eq!(a.template_fingerprint, b.template_fingerprint);
	}

	#[test]
	fn segment_only_changes_keep_the_template(before in plain(), old in plain(), new in plain(), after in plain()) {
		prop_assume!(old != new);
		let page = |body: &str| format!("<title>t</title>{}<!--sonicdiff-x-->{}<!--sonicdiff-x-end-->{}", before, body, after);
		let a = split(&page(&old));
		let b = split(&page(&new));
		prop_assert_eq!(a.template_fingerprint, b.template_fingerprint);
		prop_assert_ne!(a.document_fingerprint, b.document_fingerprint);
	}
}

#[test]
fn unclosed_titles_scan_in_linear_time() {
	let document = "<title".repeat(50_000);
	let started = std::time::Instant::now();
	let split = split(&document);
	assert_eq!(split.title, None);
	assert_eq!(split.template, document);
	assert!(started.elapsed() < std::time::Duration::from_secs(5), "took {:?}", started.elapsed());
}

#[test]
fn empty_segments_are_extracted() {
	let split = split("<p><!--sonicdiff-x--><!--sonicdiff-x-end--></p>");
	assert_eq!(split.template, "<p>{x}</p>");
	assert_eq!(split.segments[0].value, "<!--sonicdiff-x--><!--sonicdiff-x-end-->");
}

#[test]
fn changed_segment_data() {
	let cached = split("<title>A</title><!--sonicdiff-a-->1<!--sonicdiff-a-end--><!--sonicdiff-b-->1<!--sonicdiff-b-end-->").data();
	let current = split("<title>A</title><!--sonicdiff-a-->1<!--sonicdiff-a-end--><!--sonicdiff-b-->2<!--sonicdiff-b-end--><!--sonicdiff-c-->3<!--sonicdiff-c-end-->").data();

	assert!(cached.changed_since(Some(&cached)).is_empty());

	let changed: Vec<_> = current.changed_since(Some(&cached)).iter().map(|(k, _)| k.to_owned()).collect();
	assert_eq!(changed, ["{b}", "{c}"]);

	let as_map = cached.clone().into_map();
	assert_eq!(current.changed_since(Some(&as_map)).len(), 2);

	assert_eq!(current.changed_since(None::<&SegmentData>), current);
}
