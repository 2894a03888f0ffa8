//! Cache manager handling signing-key retrieval and TTL eviction.

// std
use std::{
	collections::HashMap,
	sync::{
		Mutex as StdMutex, PoisonError,
		atomic::{AtomicU64, Ordering},
	},
};
// crates.io
use tokio::{
	sync::{Mutex, RwLock},
	time,
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	cache::entry::CacheEntry,
	clock::ClockAnchor,
	keys::KeySet,
	metrics::{self, CacheMetrics},
	service::IdentityService,
};

type FlightMap = HashMap<String, Arc<Mutex<()>>>;

/// Default lifetime of a cached key set.
pub const DEFAULT_CERTS_INVALIDATE_TIME: Duration = Duration::from_secs(10 * 60);

/// Per-realm signing-key cache.
///
/// Lookups within the TTL are answered from memory. Misses are single-flight per realm: one
/// fetch runs while concurrent callers for the same realm wait and then share its result.
/// Every stored key set is evicted exactly once by a timer armed at insertion, regardless of
/// how often it is read.
///
/// Clones share the same map. Call [`CertCache::shutdown`] to cancel pending eviction timers.
#[derive(Clone, Debug)]
pub struct CertCache {
	service: Arc<dyn IdentityService>,
	ttl: Duration,
	entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
	flights: Arc<StdMutex<FlightMap>>,
	generations: Arc<AtomicU64>,
	shutdown: CancellationToken,
	metrics: Arc<CacheMetrics>,
}
impl CertCache {
	/// Build a cache over the given identity service with the given TTL.
	pub fn new(service: Arc<dyn IdentityService>, ttl: Duration) -> Self {
		Self {
			service,
			ttl,
			entries: Arc::new(RwLock::new(HashMap::new())),
			flights: Arc::new(StdMutex::new(HashMap::new())),
			generations: Arc::new(AtomicU64::new(0)),
			shutdown: CancellationToken::new(),
			metrics: CacheMetrics::new(),
		}
	}

	/// Lifetime applied to every stored key set.
	pub fn ttl(&self) -> Duration {
		self.ttl
	}

	/// Access the cache's metrics accumulator.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.metrics.clone()
	}

	/// Resolve the signing keys of a realm, fetching upstream on a miss.
	///
	/// A failed fetch stores nothing, so the next call fetches again.
	#[tracing::instrument(skip(self))]
	pub async fn get_signing_keys(&self, realm: &str) -> Result<Arc<KeySet>> {
		validate_realm(realm)?;

		if self.shutdown.is_cancelled() {
			return Err(Error::Shutdown("signing-key cache"));
		}
		if let Some(keys) = self.lookup(realm).await {
			tracing::debug!("cache hit");

			self.observe_hit(realm);

			return Ok(keys);
		}

		let flight = self.flight(realm);
		let _guard = flight.gate.lock().await;

		// Another caller may have stored the keys while this one waited for the flight.
		if let Some(keys) = self.lookup(realm).await {
			tracing::debug!("served by concurrent fetch");

			self.observe_hit(realm);

			return Ok(keys);
		}

		tracing::debug!("cache miss; fetching signing keys");

		let started = Instant::now();
		let keys = match self.service.fetch_signing_keys(realm).await {
			Ok(keys) => Arc::new(keys),
			Err(err) => {
				tracing::warn!(error = %err, "signing key fetch failed");

				self.observe_fetch_error(realm);

				return Err(Error::Fetch { realm: realm.to_owned(), source: Box::new(err) });
			},
		};

		self.observe_miss(realm, started.elapsed());
		self.store(realm, keys.clone()).await;

		Ok(keys)
	}

	/// Drop a realm's entry before its TTL elapses, cancelling its eviction timer.
	///
	/// Returns whether an entry was present.
	#[tracing::instrument(skip(self))]
	pub async fn invalidate(&self, realm: &str) -> bool {
		let removed = { self.entries.write().await.remove(realm) };

		match removed {
			Some(entry) => {
				entry.disarm();
				tracing::debug!(generation = entry.generation(), "invalidated signing keys");

				true
			},
			None => false,
		}
	}

	/// Whether an unexpired entry exists for the realm.
	pub async fn contains(&self, realm: &str) -> bool {
		self.lookup(realm).await.is_some()
	}

	/// Realms with an unexpired entry.
	pub async fn realms(&self) -> Vec<String> {
		let now = Instant::now();
		let entries = self.entries.read().await;
		let mut realms: Vec<String> = entries
			.iter()
			.filter(|(_, entry)| entry.is_fresh(now))
			.map(|(realm, _)| realm.clone())
			.collect();

		realms.sort_unstable();

		realms
	}

	/// Describe a realm's cached entry, if one is live.
	pub async fn status(&self, realm: &str) -> Option<CachedRealmStatus> {
		let anchor = ClockAnchor::now();
		let entries = self.entries.read().await;
		let entry = entries.get(realm).filter(|entry| entry.is_fresh(anchor.instant()))?;

		Some(CachedRealmStatus {
			realm: realm.to_owned(),
			key_count: entry.keys().len(),
			generation: entry.generation(),
			fetched_at: entry.keys().fetched_at,
			expires_at: anchor.to_datetime(entry.expires_at()),
		})
	}

	/// Whether [`CertCache::shutdown`] has been called.
	pub fn is_shut_down(&self) -> bool {
		self.shutdown.is_cancelled()
	}

	/// Cancel every pending eviction timer and clear the cache.
	///
	/// Later lookups fail with [`Error::Shutdown`].
	pub async fn shutdown(&self) {
		self.shutdown.cancel();

		let dropped = {
			let mut entries = self.entries.write().await;
			let dropped = entries.len();

			entries.clear();

			dropped
		};

		self.flights.lock().unwrap_or_else(PoisonError::into_inner).clear();

		tracing::debug!(dropped, "signing-key cache shut down");
	}

	async fn lookup(&self, realm: &str) -> Option<Arc<KeySet>> {
		let now = Instant::now();
		let entries = self.entries.read().await;

		entries.get(realm).filter(|entry| entry.is_fresh(now)).map(|entry| entry.keys().clone())
	}

	fn flight(&self, realm: &str) -> Flight {
		let gate = self
			.flights
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.entry(realm.to_owned())
			.or_default()
			.clone();

		Flight { realm: realm.to_owned(), gate, flights: self.flights.clone() }
	}

	async fn store(&self, realm: &str, keys: Arc<KeySet>) {
		let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
		let entry =
			CacheEntry::new(keys, generation, Instant::now(), self.ttl, self.shutdown.child_token());
		let eviction = entry.eviction().clone();
		let expires_at = entry.expires_at();

		{
			let mut entries = self.entries.write().await;

			// Checked under the lock so a concurrent shutdown either sees this entry or prevents it.
			if self.shutdown.is_cancelled() {
				return;
			}
			if let Some(previous) = entries.insert(realm.to_owned(), entry) {
				previous.disarm();
			}
		}

		self.arm_eviction(realm.to_owned(), generation, expires_at, eviction);
	}

	fn arm_eviction(
		&self,
		realm: String,
		generation: u64,
		expires_at: Instant,
		eviction: CancellationToken,
	) {
		let entries = self.entries.clone();
		let counters = self.metrics.clone();

		tokio::spawn(async move {
			tokio::select! {
				_ = eviction.cancelled() => {},
				_ = time::sleep_until(expires_at) => {
					let evicted = {
						let mut entries = entries.write().await;
						let current = entries
							.get(&realm)
							.is_some_and(|entry| entry.generation() == generation);

						current && entries.remove(&realm).is_some()
					};

					if evicted {
						tracing::debug!(realm = %realm, generation, "evicted signing keys");

						metrics::record_cache_eviction(&realm);
						counters.record_eviction();
					}
				},
			}
		});
	}

	fn observe_hit(&self, realm: &str) {
		metrics::record_cache_hit(realm);

		self.metrics.record_hit();
	}

	fn observe_miss(&self, realm: &str, duration: Duration) {
		metrics::record_cache_miss(realm, duration);

		self.metrics.record_miss(duration);
	}

	fn observe_fetch_error(&self, realm: &str) {
		metrics::record_cache_fetch_error(realm);

		self.metrics.record_fetch_error();
	}
}

/// Membership in a realm's single-flight group.
///
/// Dropping the last membership removes the group, so realms that are no longer being fetched
/// leave nothing behind.
#[derive(Debug)]
struct Flight {
	realm: String,
	gate: Arc<Mutex<()>>,
	flights: Arc<StdMutex<FlightMap>>,
}
impl Drop for Flight {
	fn drop(&mut self) {
		let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
		// The map and this membership are the only holders.
		let last = flights
			.get(&self.realm)
			.is_some_and(|gate| Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) == 2);

		if last {
			flights.remove(&self.realm);
		}
	}
}

/// Status of one live cache entry.
#[derive(Clone, Debug)]
pub struct CachedRealmStatus {
	/// Realm the entry belongs to.
	pub realm: String,
	/// Number of keys in the cached set.
	pub key_count: usize,
	/// Insertion number of the entry.
	pub generation: u64,
	/// Wall-clock time the keys were fetched.
	pub fetched_at: DateTime<Utc>,
	/// Wall-clock time the entry will be evicted.
	pub expires_at: Option<DateTime<Utc>>,
}

fn validate_realm(realm: &str) -> Result<()> {
	if realm.is_empty() {
		return Err(Error::Validation { field: "realm", reason: "Must not be empty.".into() });
	}

	Ok(())
}
