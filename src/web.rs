//! Browser glue: DOM patching through [`web_sys`] and the native transport handshake.
//!
//! Instead of a globally named callback, each [`Bridge`] owns its own JavaScript function, which the page hands to the
//! native layer together with its diff request. Several page instances can therefore wait concurrently.

use crate::{
	config::Config,
	patch::{apply_segments, PatchTarget},
	reconcile::{Reconciled, Rendezvous},
	status::Status,
};
use core::convert::TryInto;
use js_sys::Function;
use std::rc::Rc;
use tracing::{debug, error, instrument, trace_span};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};

/// [`PatchTarget`] over a live document.
#[derive(Debug, Clone)]
pub struct DocumentTarget {
	document: web_sys::Document,
}

impl DocumentTarget {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self { document }
	}

	/// The current window's document, if there is one.
	#[must_use]
	pub fn current() -> Option<Self> {
		web_sys::window()?.document().map(Self::new)
	}
}

impl PatchTarget for DocumentTarget {
	fn replace_inner_html(&mut self, id: &str, html: &str) -> bool {
		match self.document.get_element_by_id(id) {
			Some(element) => {
				element.set_inner_html(html);
				true
			}
			None => false,
		}
	}
}

/// A pending diff request: the transport callback and the timeout, latched so only the first one reports.
///
/// Dropping the bridge cancels the timeout. The native layer calling [`Bridge::callback`] afterwards throws into
/// JavaScript, so keep the bridge alive until the report fired.
#[allow(clippy::type_complexity)]
pub struct Bridge {
	callback: Closure<dyn Fn(String)>,
	_timeout: Closure<dyn Fn()>,
	window: web_sys::Window,
	timeout_handle: i32,
}

impl Bridge {
	/// Registers the callback and starts the timer. `request` receives the callback to pass on to the native layer.
	///
	/// On [`Status::DataChanged`], segments are patched into `target` before `report` runs.
	///
	/// # Errors
	///
	/// Iff there is no window or scheduling the timeout fails.
	#[instrument(skip(config, target, request, report))]
	pub fn start<T, R, F>(config: &Config, target: T, request: R, report: F) -> Result<Self, JsValue>
	where
		T: PatchTarget + 'static,
		R: FnOnce(&Function) -> Result<(), JsValue>,
		F: FnOnce(Reconciled) + 'static,
	{
		let window = web_sys::window().ok_or_else(|| JsValue::from_str("sonic-diff: No window found."))?;

		let mut target = target;
		let rendezvous = Rc::new(Rendezvous::new(move |reconciled: Reconciled| {
			let span = trace_span!("report", status = %reconciled.status, report = %reconciled.report);
			let _enter = span.enter();
			if reconciled.status == Status::DataChanged {
				let patched = apply_segments(&mut target, &reconciled.segments);
				debug!(?patched, "Applied data update.");
			}
			report(reconciled);
		}));

		let callback = {
			let rendezvous = Rc::clone(&rendezvous);
			Closure::wrap(Box::new(move |payload: String| {
				rendezvous.deliver(&payload);
			}) as Box<dyn Fn(String)>)
		};
		let timeout = Closure::wrap(Box::new(move || {
			rendezvous.expire();
		}) as Box<dyn Fn()>);

		let timeout_ms: i32 = config.report_timeout_ms.try_into().unwrap_or(i32::MAX);
		let timeout_handle = window.set_timeout_with_callback_and_timeout_and_arguments_0(timeout.as_ref().unchecked_ref::<Function>(), timeout_ms)?;

		let bridge = Self {
			callback,
			_timeout: timeout,
			window,
			timeout_handle,
		};
		if let Err(error) = request(bridge.callback()) {
			error!(?error, "Diff request failed; waiting for the timeout.");
		}
		Ok(bridge)
	}

	/// The function the native layer calls with its JSON payload.
	#[must_use]
	pub fn callback(&self) -> &Function {
		self.callback.as_ref().unchecked_ref()
	}
}

impl Drop for Bridge {
	fn drop(&mut self) {
		self.window.clear_timeout_with_handle(self.timeout_handle);
	}
}

impl core::fmt::Debug for Bridge {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("Bridge").field("timeout_handle", &self.timeout_handle).finish_non_exhaustive()
	}
}
