//! Top-level client combining the identity service transport with the signing-key cache.

// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	cache::manager::{CertCache, DEFAULT_CERTS_INVALIDATE_TIME},
	http::{client::HttpIdentityService, endpoint::ServiceConfig},
	keys::KeySet,
	refresher::{RefreshConfig, TokenRefresher},
	service::IdentityService,
	token::{ClientCredentials, PasswordCredentials, Token},
};

/// Builder for an HTTP-backed [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
	base_url: String,
	require_https: bool,
	auth_realms_path: Option<String>,
	token_endpoint_path: Option<String>,
	certs_endpoint_path: Option<String>,
	request_timeout: Option<Duration>,
	max_response_bytes: Option<u64>,
	certs_invalidate_time: Duration,
}
impl ClientBuilder {
	/// Create a builder for the identity service at `base_url`.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			require_https: true,
			auth_realms_path: None,
			token_endpoint_path: None,
			certs_endpoint_path: None,
			request_timeout: None,
			max_response_bytes: None,
			certs_invalidate_time: DEFAULT_CERTS_INVALIDATE_TIME,
		}
	}

	/// Enforce HTTPS for the base URL (enabled by default).
	pub fn require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Override the path between the base URL and the realm name.
	pub fn auth_realms_path(mut self, path: impl Into<String>) -> Self {
		self.auth_realms_path = Some(path.into());

		self
	}

	/// Override the token endpoint path below the realm.
	pub fn token_endpoint_path(mut self, path: impl Into<String>) -> Self {
		self.token_endpoint_path = Some(path.into());

		self
	}

	/// Override the certs endpoint path below the realm.
	pub fn certs_endpoint_path(mut self, path: impl Into<String>) -> Self {
		self.certs_endpoint_path = Some(path.into());

		self
	}

	/// Override the per-request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);

		self
	}

	/// Override the response size guard.
	pub fn max_response_bytes(mut self, limit: u64) -> Self {
		self.max_response_bytes = Some(limit);

		self
	}

	/// Override how long fetched signing keys stay cached.
	pub fn certs_invalidate_time(mut self, ttl: Duration) -> Self {
		self.certs_invalidate_time = ttl;

		self
	}

	/// Validate the configuration and construct a [`Client`].
	pub fn build(self) -> Result<Client> {
		if self.certs_invalidate_time.is_zero() {
			return Err(Error::Validation {
				field: "certs_invalidate_time",
				reason: "Must be greater than zero.".into(),
			});
		}

		let mut config = ServiceConfig::new(&self.base_url)?.with_require_https(self.require_https);

		if let Some(path) = self.auth_realms_path {
			config.auth_realms_path = path;
		}
		if let Some(path) = self.token_endpoint_path {
			config.token_endpoint_path = path;
		}
		if let Some(path) = self.certs_endpoint_path {
			config.certs_endpoint_path = path;
		}
		if let Some(timeout) = self.request_timeout {
			config.request_timeout = timeout;
		}
		if let Some(limit) = self.max_response_bytes {
			config.max_response_bytes = limit;
		}

		let service = HttpIdentityService::new(config)?;

		Ok(Client::with_service(Arc::new(service), self.certs_invalidate_time))
	}
}

/// Identity service client with a per-realm signing-key cache.
///
/// Clones share the transport and the cache.
#[derive(Clone, Debug)]
pub struct Client {
	service: Arc<dyn IdentityService>,
	certs: CertCache,
}
impl Client {
	/// Create a [`ClientBuilder`] for the identity service at `base_url`.
	pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
		ClientBuilder::new(base_url)
	}

	/// HTTP-backed client with default settings.
	pub fn new(base_url: impl Into<String>) -> Result<Self> {
		Self::builder(base_url).build()
	}

	/// Client over any identity service implementation.
	pub fn with_service(service: Arc<dyn IdentityService>, certs_invalidate_time: Duration) -> Self {
		let certs = CertCache::new(service.clone(), certs_invalidate_time);

		Self { service, certs }
	}

	/// Signing keys of a realm, served from the cache while fresh.
	pub async fn get_signing_keys(&self, realm: &str) -> Result<Arc<KeySet>> {
		self.certs.get_signing_keys(realm).await
	}

	/// Log in as the client itself.
	pub async fn login_client(&self, credentials: &ClientCredentials, realm: &str) -> Result<Token> {
		self.service.client_credentials_login(credentials, realm).await
	}

	/// Log in with resource-owner credentials.
	pub async fn login(&self, credentials: &PasswordCredentials, realm: &str) -> Result<Token> {
		self.service.password_login(credentials, realm).await
	}

	/// Exchange a refresh token for a new token.
	pub async fn refresh_token(
		&self,
		refresh_token: &str,
		credentials: &ClientCredentials,
		realm: &str,
	) -> Result<Token> {
		self.service.refresh_token(refresh_token, credentials, realm).await
	}

	/// Start a [`TokenRefresher`] over this client's transport.
	///
	/// `config.domain` and `config.require_https` are ignored; the client's own connection
	/// settings apply.
	pub async fn token_refresher(
		&self,
		config: RefreshConfig,
		cancel: &CancellationToken,
	) -> Result<TokenRefresher> {
		TokenRefresher::with_service(config, self.service.clone(), cancel).await
	}

	/// The signing-key cache.
	pub fn certs(&self) -> &CertCache {
		&self.certs
	}

	/// The identity service transport.
	pub fn service(&self) -> &Arc<dyn IdentityService> {
		&self.service
	}

	/// Cancel pending cache eviction timers and clear the cache.
	pub async fn shutdown(&self) {
		self.certs.shutdown().await;
	}
}
