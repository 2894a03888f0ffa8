//! Refresher state: the live token plus the absolute deadlines derived from it.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	clock::{self, ClockAnchor},
	metrics::RenewalGrant,
	security::Secret,
	token::Token,
};

/// Public lifecycle phase of a token refresher.
///
/// A refresher only exists once its initial login succeeded, so there is no observable
/// uninitialized phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RefresherPhase {
	/// The background loop is keeping the token valid.
	Live,
	/// The background loop has exited; the last token is still served.
	Stopped,
}

/// Renewal instants the background loop waits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Deadlines {
	/// When to perform a fresh client-credentials login.
	pub(crate) access: Instant,
	/// When to exchange the refresh token; `None` when the token has no refresh schedule.
	pub(crate) refresh: Option<Instant>,
}

/// The single owned token and its issuance-relative deadlines.
///
/// Relative expiries are converted into absolute instants as soon as a token arrives.
#[derive(Debug)]
pub(crate) struct RefresherState {
	token: Arc<Token>,
	issued_at: Instant,
	access_expires_at: Instant,
	refresh_expires_at: Option<Instant>,
	deadlines: Deadlines,
	phase: RefresherPhase,
	consecutive_failures: u32,
	last_error: Option<String>,
}
impl RefresherState {
	/// State for a token received at `now`.
	///
	/// Deadlines renew `early` ahead of each expiry but never sooner than `min_interval` after
	/// issuance, so a provider handing out near-expired tokens cannot make the loop spin.
	pub(crate) fn issued(token: Token, now: Instant, early: Duration, min_interval: Duration) -> Self {
		let access_lifetime = token.access_lifetime();
		let refresh_lifetime = token.refresh_lifetime();
		let floor = clock::deadline(now, min_interval);

		Self {
			token: Arc::new(token),
			issued_at: now,
			access_expires_at: clock::deadline(now, access_lifetime),
			refresh_expires_at: refresh_lifetime.map(|lifetime| clock::deadline(now, lifetime)),
			deadlines: Deadlines {
				access: clock::renew_at(now, access_lifetime, early).max(floor),
				refresh: refresh_lifetime
					.map(|lifetime| clock::renew_at(now, lifetime, early).max(floor)),
			},
			phase: RefresherPhase::Live,
			consecutive_failures: 0,
			last_error: None,
		}
	}

	pub(crate) fn token(&self) -> Arc<Token> {
		self.token.clone()
	}

	pub(crate) fn access_token(&self) -> String {
		self.token.access_token.expose().to_owned()
	}

	pub(crate) fn refresh_token(&self) -> Secret {
		self.token.refresh_token.clone()
	}

	pub(crate) fn deadlines(&self) -> Deadlines {
		self.deadlines
	}

	/// Replace the token wholesale and recompute both deadlines from it.
	pub(crate) fn renewed(
		&mut self,
		token: Token,
		now: Instant,
		early: Duration,
		min_interval: Duration,
	) {
		let phase = self.phase;

		*self = Self::issued(token, now, early, min_interval);
		self.phase = phase;
	}

	/// Re-arm only the failed action's deadline to fire after `retry_delay`.
	pub(crate) fn renewal_failed(
		&mut self,
		grant: RenewalGrant,
		now: Instant,
		retry_delay: Duration,
		error: &Error,
	) {
		match grant {
			RenewalGrant::ClientCredentials => self.deadlines.access = clock::deadline(now, retry_delay),
			RenewalGrant::RefreshToken =>
				self.deadlines.refresh = Some(clock::deadline(now, retry_delay)),
		}

		self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		self.last_error = Some(error.to_string());
	}

	pub(crate) fn stop(&mut self) {
		self.phase = RefresherPhase::Stopped;
	}

	pub(crate) fn status(&self, realm: &str, anchor: &ClockAnchor) -> RefresherStatus {
		let next_renewal = match self.deadlines.refresh {
			Some(refresh) if self.phase == RefresherPhase::Live => Some(refresh.min(self.deadlines.access)),
			None if self.phase == RefresherPhase::Live => Some(self.deadlines.access),
			_ => None,
		};

		RefresherStatus {
			realm: realm.to_owned(),
			phase: self.phase,
			issued_at: anchor.to_datetime(self.issued_at),
			access_expires_at: anchor.to_datetime(self.access_expires_at),
			refresh_expires_at: self.refresh_expires_at.and_then(|at| anchor.to_datetime(at)),
			next_renewal_at: next_renewal.and_then(|at| anchor.to_datetime(at)),
			access_token_expired: anchor.instant() >= self.access_expires_at,
			consecutive_failures: self.consecutive_failures,
			last_error: self.last_error.clone(),
		}
	}
}

/// Point-in-time view of a token refresher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefresherStatus {
	/// Realm the token belongs to.
	pub realm: String,
	/// Lifecycle phase of the background loop.
	pub phase: RefresherPhase,
	/// When the current token was received.
	pub issued_at: Option<DateTime<Utc>>,
	/// When the current access token expires.
	pub access_expires_at: Option<DateTime<Utc>>,
	/// When the current refresh token expires, if it has a limit.
	pub refresh_expires_at: Option<DateTime<Utc>>,
	/// When the loop will next renew; `None` once stopped.
	pub next_renewal_at: Option<DateTime<Utc>>,
	/// Whether the served access token is already past its expiry.
	pub access_token_expired: bool,
	/// Renewal failures since the last success.
	pub consecutive_failures: u32,
	/// Message of the most recent renewal failure since the last success.
	pub last_error: Option<String>,
}
impl RefresherStatus {
	/// Whether callers are being served a token that nothing will renew or that has expired.
	pub fn is_stale(&self) -> bool {
		self.phase == RefresherPhase::Stopped || self.access_token_expired
	}
}
