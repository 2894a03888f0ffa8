//! Metrics helpers and per-instance telemetry bookkeeping.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 3]>;

const METRIC_CACHE_HITS: &str = "realm_credentials_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "realm_credentials_cache_misses_total";
const METRIC_CACHE_EVICTIONS: &str = "realm_credentials_cache_evictions_total";
const METRIC_CACHE_FETCH_ERRORS: &str = "realm_credentials_cache_fetch_errors_total";
const METRIC_CACHE_FETCH_DURATION: &str = "realm_credentials_cache_fetch_duration_seconds";
const METRIC_TOKEN_RENEWALS: &str = "realm_credentials_token_renewals_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Grant used to renew the refresher's token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenewalGrant {
	/// Fresh `client_credentials` login.
	ClientCredentials,
	/// `refresh_token` exchange.
	RefreshToken,
}
impl RenewalGrant {
	/// Label value used for this grant.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::ClientCredentials => "client_credentials",
			Self::RefreshToken => "refresh_token",
		}
	}
}

/// Thread-safe counters for one signing-key cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	hits: AtomicU64,
	misses: AtomicU64,
	fetch_errors: AtomicU64,
	evictions: AtomicU64,
	last_fetch_micros: AtomicU64,
}
impl CacheMetrics {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a lookup answered from the cache.
	pub fn record_hit(&self) {
		self.hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a lookup that went upstream, with its fetch latency.
	pub fn record_miss(&self, duration: Duration) {
		self.misses.fetch_add(1, Ordering::Relaxed);
		self.last_fetch_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failed upstream fetch.
	pub fn record_fetch_error(&self) {
		self.fetch_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a TTL eviction.
	pub fn record_eviction(&self) {
		self.evictions.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
			fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
			evictions: self.evictions.load(Ordering::Relaxed),
			last_fetch_micros: match self.last_fetch_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of [`CacheMetrics`].
#[derive(Clone, Debug)]
pub struct CacheMetricsSnapshot {
	/// Lookups served from the cache.
	pub hits: u64,
	/// Lookups that fetched successfully from upstream.
	pub misses: u64,
	/// Upstream fetches that failed.
	pub fetch_errors: u64,
	/// Entries removed by their TTL timer.
	pub evictions: u64,
	/// Microsecond latency of the most recent successful fetch.
	pub last_fetch_micros: Option<u64>,
}
impl CacheMetricsSnapshot {
	/// Ratio of hits over all successful lookups.
	pub fn hit_rate(&self) -> f64 {
		let total = self.hits + self.misses;

		if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
	}
}

/// Thread-safe counters for one token refresher.
#[derive(Debug, Default)]
pub struct RefresherMetrics {
	logins: AtomicU64,
	refreshes: AtomicU64,
	failures: AtomicU64,
	permanent_failures: AtomicU64,
}
impl RefresherMetrics {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a successful renewal.
	pub fn record_success(&self, grant: RenewalGrant) {
		match grant {
			RenewalGrant::ClientCredentials => self.logins.fetch_add(1, Ordering::Relaxed),
			RenewalGrant::RefreshToken => self.refreshes.fetch_add(1, Ordering::Relaxed),
		};
	}

	/// Record a failed renewal.
	pub fn record_failure(&self, permanent: bool) {
		self.failures.fetch_add(1, Ordering::Relaxed);

		if permanent {
			self.permanent_failures.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Take a point-in-time snapshot.
	pub fn snapshot(&self) -> RefresherMetricsSnapshot {
		RefresherMetricsSnapshot {
			logins: self.logins.load(Ordering::Relaxed),
			refreshes: self.refreshes.load(Ordering::Relaxed),
			failures: self.failures.load(Ordering::Relaxed),
			permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of [`RefresherMetrics`].
#[derive(Clone, Debug)]
pub struct RefresherMetricsSnapshot {
	/// Successful background `client_credentials` logins (the initial login excluded).
	pub logins: u64,
	/// Successful `refresh_token` exchanges.
	pub refreshes: u64,
	/// Failed renewals of either kind.
	pub failures: u64,
	/// Failed renewals classified as non-retriable.
	pub permanent_failures: u64,
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a lookup answered from the cache.
pub fn record_cache_hit(realm: &str) {
	metrics::counter!(METRIC_CACHE_HITS, realm_labels(realm).iter()).increment(1);
}

/// Record a lookup that fetched from upstream, along with the fetch latency.
pub fn record_cache_miss(realm: &str, duration: Duration) {
	let labels = realm_labels(realm);

	metrics::counter!(METRIC_CACHE_MISSES, labels.iter()).increment(1);
	metrics::histogram!(METRIC_CACHE_FETCH_DURATION, labels.iter()).record(duration.as_secs_f64());
}

/// Record a failed upstream fetch.
pub fn record_cache_fetch_error(realm: &str) {
	metrics::counter!(METRIC_CACHE_FETCH_ERRORS, realm_labels(realm).iter()).increment(1);
}

/// Record a TTL eviction.
pub fn record_cache_eviction(realm: &str) {
	metrics::counter!(METRIC_CACHE_EVICTIONS, realm_labels(realm).iter()).increment(1);
}

/// Record the outcome of a background token renewal.
pub fn record_token_renewal(realm: &str, grant: RenewalGrant, success: bool) {
	let mut labels = realm_labels(realm);

	labels.push(Label::new("grant", grant.as_str()));
	labels.push(Label::new("status", if success { "success" } else { "error" }));

	metrics::counter!(METRIC_TOKEN_RENEWALS, labels.iter()).increment(1);
}

fn realm_labels(realm: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("realm", realm.to_owned()));

	labels
}
