#![doc(html_root_url = "https://docs.rs/sonic-diff/0.0.1")]
#![warn(clippy::pedantic)]

//! Template/data diffing for cached HTML pages.
//!
//! The server [splits](split::split) each rendered document into a template skeleton and named data segments,
//! fingerprints both, and [selects](select::select) the smallest correct response for the client's cached state.
//! The client [reconciles](reconcile) the native transport's answer into one status and [patches](patch)
//! changed segments into the page.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod config;
mod error;
pub mod fingerprint;
pub mod headers;
pub mod patch;
pub mod reconcile;
pub mod select;
pub mod split;
mod status;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use config::Config;
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use headers::{CacheOffline, ConditionalHeaders};
pub use reconcile::{reconcile_payload, Reconciled, Rendezvous};
pub use select::{respond, select, ProtocolOutcome, Selection};
pub use split::{rebuild, split, Segment, Split};
pub use status::Status;
