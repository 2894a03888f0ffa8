//! Background token refresher that keeps one client-credentials token valid.

pub mod state;

// crates.io
use serde::{Deserialize, Serialize};
use tokio::{
	sync::{Mutex, RwLock},
	task::JoinHandle,
	time,
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	clock::ClockAnchor,
	http::{client::HttpIdentityService, endpoint::ServiceConfig},
	metrics::{self, RefresherMetrics, RenewalGrant},
	refresher::state::{RefresherState, RefresherStatus},
	security::Secret,
	service::IdentityService,
	token::{ClientCredentials, Token},
};

/// Default lead time before expiry at which renewals fire.
pub const DEFAULT_EARLY_REFRESH: Duration = Duration::from_secs(5);
/// Default delay before retrying a failed renewal.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Settings for a [`TokenRefresher`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefreshConfig {
	/// Base URL of the identity service.
	pub domain: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; empty for public clients.
	#[serde(default)]
	pub client_secret: Secret,
	/// Realm to log in to.
	pub realm: String,
	/// Renew this long before each expiry.
	#[serde(default = "default_early_refresh")]
	pub early_refresh: Duration,
	/// Wait this long before retrying a failed renewal.
	///
	/// Also the shortest gap after a successful renewal, for tokens that expire within
	/// `early_refresh`.
	#[serde(default = "default_retry_delay")]
	pub retry_delay: Duration,
	/// Whether `domain` must use HTTPS.
	#[serde(default = "default_true")]
	pub require_https: bool,
}
impl RefreshConfig {
	/// Settings with default timing for the given client and realm.
	pub fn new(
		domain: impl Into<String>,
		client_id: impl Into<String>,
		client_secret: impl Into<Secret>,
		realm: impl Into<String>,
	) -> Self {
		Self {
			domain: domain.into(),
			client_id: client_id.into(),
			client_secret: client_secret.into(),
			realm: realm.into(),
			early_refresh: DEFAULT_EARLY_REFRESH,
			retry_delay: DEFAULT_RETRY_DELAY,
			require_https: true,
		}
	}

	/// Override the renewal lead time.
	pub fn with_early_refresh(mut self, early_refresh: Duration) -> Self {
		self.early_refresh = early_refresh;

		self
	}

	/// Override the retry delay.
	pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
		self.retry_delay = retry_delay;

		self
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Client credentials presented on every grant.
	pub fn credentials(&self) -> ClientCredentials {
		ClientCredentials::new(self.client_id.clone(), self.client_secret.clone())
	}

	/// Connection settings derived from `domain`.
	pub fn service_config(&self) -> Result<ServiceConfig> {
		if self.domain.trim().is_empty() {
			return Err(Error::Validation { field: "domain", reason: "Must not be empty.".into() });
		}

		Ok(ServiceConfig::new(&self.domain)?.with_require_https(self.require_https))
	}

	/// Validate the settings against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.client_id.trim().is_empty() {
			return Err(Error::Validation {
				field: "client_id",
				reason: "Must not be empty.".into(),
			});
		}
		if self.realm.trim().is_empty() {
			return Err(Error::Validation { field: "realm", reason: "Must not be empty.".into() });
		}
		if self.retry_delay.is_zero() {
			return Err(Error::Validation {
				field: "retry_delay",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}

/// Keeps a client-credentials token valid in the background.
///
/// The initial login happens during construction; afterwards a single task renews the token
/// ahead of each expiry, using a fresh login for the access deadline and a refresh-token
/// exchange for the refresh deadline. Readers always observe a complete token.
///
/// The loop stops when the caller's cancellation token fires, on [`TokenRefresher::stop`], or
/// when the refresher is dropped. The last token keeps being served after it stops.
#[derive(Debug)]
pub struct TokenRefresher {
	shared: Arc<Shared>,
	cancel: CancellationToken,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl TokenRefresher {
	/// Log in over HTTP and start renewing.
	pub async fn start(config: RefreshConfig, cancel: &CancellationToken) -> Result<Self> {
		config.validate()?;

		let service = HttpIdentityService::new(config.service_config()?)?;

		Self::with_service(config, Arc::new(service), cancel).await
	}

	/// Log in through the supplied identity service and start renewing.
	///
	/// Fails without spawning anything when the initial login fails.
	#[tracing::instrument(
		skip_all,
		fields(realm = %config.realm, client_id = %config.client_id)
	)]
	pub async fn with_service(
		config: RefreshConfig,
		service: Arc<dyn IdentityService>,
		cancel: &CancellationToken,
	) -> Result<Self> {
		config.validate()?;

		let credentials = config.credentials();
		let token = service.client_credentials_login(&credentials, &config.realm).await?;

		tracing::info!(
			expires_in = token.expires_in,
			refresh_expires_in = token.refresh_expires_in,
			"initial login complete; token refresher live"
		);

		let state = RefresherState::issued(token, Instant::now(), config.early_refresh, config.retry_delay);
		let shared = Arc::new(Shared {
			config,
			credentials,
			service,
			state: RwLock::new(state),
			metrics: RefresherMetrics::new(),
		});
		let cancel = cancel.child_token();
		let task = tokio::spawn(shared.clone().run(cancel.clone()));

		Ok(Self { shared, cancel, task: Mutex::new(Some(task)) })
	}

	/// Current access token value.
	pub async fn access_token(&self) -> String {
		self.shared.state.read().await.access_token()
	}

	/// Current token, observed as one consistent value.
	pub async fn token(&self) -> Arc<Token> {
		self.shared.state.read().await.token()
	}

	/// Point-in-time view of the refresher.
	pub async fn status(&self) -> RefresherStatus {
		let anchor = ClockAnchor::now();

		self.shared.state.read().await.status(&self.shared.config.realm, &anchor)
	}

	/// Settings in use.
	pub fn config(&self) -> &RefreshConfig {
		&self.shared.config
	}

	/// Access the refresher's metrics accumulator.
	pub fn metrics(&self) -> Arc<RefresherMetrics> {
		self.shared.metrics.clone()
	}

	/// Signal the background loop to exit without waiting for it.
	pub fn stop(&self) {
		self.cancel.cancel();
	}

	/// Stop the background loop and wait for it to exit.
	///
	/// An in-flight renewal is allowed to finish first.
	pub async fn shutdown(&self) {
		self.stop();

		let task = self.task.lock().await.take();

		if let Some(task) = task
			&& let Err(err) = task.await
		{
			tracing::warn!(realm = %self.shared.config.realm, error = %err, "token refresher task failed");
		}
	}
}
impl Drop for TokenRefresher {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

#[derive(Debug)]
struct Shared {
	config: RefreshConfig,
	credentials: ClientCredentials,
	service: Arc<dyn IdentityService>,
	state: RwLock<RefresherState>,
	metrics: Arc<RefresherMetrics>,
}
impl Shared {
	async fn run(self: Arc<Self>, cancel: CancellationToken) {
		loop {
			let deadlines = self.state.read().await.deadlines();
			let refresh_at = deadlines.refresh.unwrap_or(deadlines.access);
			let grant = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				_ = time::sleep_until(deadlines.access) => RenewalGrant::ClientCredentials,
				_ = time::sleep_until(refresh_at), if deadlines.refresh.is_some() => {
					RenewalGrant::RefreshToken
				},
			};

			self.renew(grant).await;
		}

		self.state.write().await.stop();

		tracing::info!(realm = %self.config.realm, "token refresher stopped");
	}

	#[tracing::instrument(skip_all, fields(realm = %self.config.realm, grant = grant.as_str()))]
	async fn renew(&self, grant: RenewalGrant) {
		let realm = self.config.realm.as_str();
		let result = match grant {
			RenewalGrant::ClientCredentials =>
				self.service.client_credentials_login(&self.credentials, realm).await,
			RenewalGrant::RefreshToken => {
				let refresh_token = self.state.read().await.refresh_token();

				self.service.refresh_token(refresh_token.expose(), &self.credentials, realm).await
			},
		};
		let now = Instant::now();

		match result {
			Ok(token) => {
				tracing::debug!(
					expires_in = token.expires_in,
					refresh_expires_in = token.refresh_expires_in,
					"token renewed"
				);

				self.state.write().await.renewed(
					token,
					now,
					self.config.early_refresh,
					self.config.retry_delay,
				);
				self.metrics.record_success(grant);
				metrics::record_token_renewal(realm, grant, true);
			},
			Err(err) => {
				let permanent = err.is_permanent();

				if permanent {
					tracing::error!(
						error = %err,
						retry_in = ?self.config.retry_delay,
						"token renewal rejected by the identity service"
					);
				} else {
					tracing::warn!(
						error = %err,
						retry_in = ?self.config.retry_delay,
						"token renewal failed"
					);
				}

				self.state.write().await.renewal_failed(grant, now, self.config.retry_delay, &err);
				self.metrics.record_failure(permanent);
				metrics::record_token_renewal(realm, grant, false);
			},
		}
	}
}

fn default_early_refresh() -> Duration {
	DEFAULT_EARLY_REFRESH
}

fn default_retry_delay() -> Duration {
	DEFAULT_RETRY_DELAY
}

fn default_true() -> bool {
	true
}
