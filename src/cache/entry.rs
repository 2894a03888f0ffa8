//! Cache entry definitions and generation-scoped eviction bookkeeping.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, clock, keys::KeySet};

/// A realm's key set as stored in the cache.
///
/// Every insertion receives a fresh `generation`; the eviction timer armed for the insertion
/// only removes an entry carrying the same generation.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	keys: Arc<KeySet>,
	generation: u64,
	inserted_at: Instant,
	expires_at: Instant,
	eviction: CancellationToken,
}
impl CacheEntry {
	/// Create an entry inserted at `now` that lives for `ttl`.
	pub fn new(
		keys: Arc<KeySet>,
		generation: u64,
		now: Instant,
		ttl: Duration,
		eviction: CancellationToken,
	) -> Self {
		Self { keys, generation, inserted_at: now, expires_at: clock::deadline(now, ttl), eviction }
	}

	/// Shared key set held by the entry.
	pub fn keys(&self) -> &Arc<KeySet> {
		&self.keys
	}

	/// Insertion number guarding this entry's eviction timer.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Monotonic insertion instant.
	pub fn inserted_at(&self) -> Instant {
		self.inserted_at
	}

	/// Monotonic instant after which the entry must no longer be served.
	pub fn expires_at(&self) -> Instant {
		self.expires_at
	}

	/// Whether the entry may still be served at `now`.
	pub fn is_fresh(&self, now: Instant) -> bool {
		now < self.expires_at
	}

	/// Token that stops this entry's eviction timer.
	pub fn eviction(&self) -> &CancellationToken {
		&self.eviction
	}

	/// Stop the eviction timer; used when the entry is replaced or purged early.
	pub fn disarm(&self) {
		self.eviction.cancel();
	}
}
