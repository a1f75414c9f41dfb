use core::fmt::{self, Display, Formatter};

/// The four protocol outcomes as seen by the page, plus `Unknown` for "no usable signal".
///
/// Discriminants are the values reported to page metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
	Unknown = 0,
	FirstLoad = 1,
	TemplateChanged = 2,
	DataChanged = 3,
	FullyCached = 4,
}

impl Status {
	/// Maps a native transport result code.
	///
	/// `200` is a data update, `1000` a first load, `2000` a template change and `304` a cache hit.
	#[must_use]
	pub fn from_transport_code(code: i64) -> Option<Self> {
		match code {
			200 => Some(Self::DataChanged),
			304 => Some(Self::FullyCached),
			1000 => Some(Self::FirstLoad),
			2000 => Some(Self::TemplateChanged),
			_ => None,
		}
	}

	#[must_use]
	pub fn code(self) -> u8 {
		self as u8
	}
}

impl Default for Status {
	fn default() -> Self {
		Self::Unknown
	}
}

impl From<Status> for u8 {
	fn from(status: Status) -> Self {
		status.code()
	}
}

impl Display for Status {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Unknown => "unknown",
			Self::FirstLoad => "first-load",
			Self::TemplateChanged => "template-changed",
			Self::DataChanged => "data-changed",
			Self::FullyCached => "fully-cached",
		};
		write!(f, "{} ({})", name, self.code())
	}
}
