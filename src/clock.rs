//! Monotonic deadline helpers shared by the cache and the refresher.

// self
use crate::_prelude::*;

/// Pair of monotonic and wall-clock readings taken together.
///
/// Deadlines are tracked as [`Instant`]s so the tokio clock drives them; this anchor projects
/// them onto UTC for status reporting.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ClockAnchor {
	instant: Instant,
	wallclock: DateTime<Utc>,
}
impl ClockAnchor {
	pub(crate) fn now() -> Self {
		Self { instant: Instant::now(), wallclock: Utc::now() }
	}

	pub(crate) fn instant(&self) -> Instant {
		self.instant
	}

	/// Convert a monotonic instant into UTC relative to this anchor.
	pub(crate) fn to_datetime(&self, instant: Instant) -> Option<DateTime<Utc>> {
		if let Some(delta) = instant.checked_duration_since(self.instant) {
			let chrono = TimeDelta::from_std(delta).ok()?;

			self.wallclock.checked_add_signed(chrono)
		} else if let Some(delta) = self.instant.checked_duration_since(instant) {
			let chrono = TimeDelta::from_std(delta).ok()?;

			self.wallclock.checked_sub_signed(chrono)
		} else {
			None
		}
	}
}

/// Longest span any deadline is scheduled ahead; remote lifetimes beyond it are clamped.
pub(crate) const MAX_DEADLINE_HORIZON: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `from + after`, clamped to [`MAX_DEADLINE_HORIZON`] so untrusted lifetimes never overflow.
pub(crate) fn deadline(from: Instant, after: Duration) -> Instant {
	from.checked_add(after.min(MAX_DEADLINE_HORIZON)).unwrap_or(from)
}

/// Instant at which a credential valid for `lifetime` from `issued_at` should be renewed.
///
/// A lead time at least as long as the lifetime renews immediately.
pub(crate) fn renew_at(issued_at: Instant, lifetime: Duration, early: Duration) -> Instant {
	deadline(issued_at, lifetime.saturating_sub(early))
}
