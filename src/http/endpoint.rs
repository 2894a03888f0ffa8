//! Identity service connection settings and endpoint URL construction.

// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{_prelude::*, security};

/// Default realm path prefix below the base URL.
pub const DEFAULT_AUTH_REALMS_PATH: &str = "auth/realms";
/// Default token endpoint path below a realm.
pub const DEFAULT_TOKEN_ENDPOINT_PATH: &str = "protocol/openid-connect/token";
/// Default certs (public keys) endpoint path below a realm.
pub const DEFAULT_CERTS_ENDPOINT_PATH: &str = "protocol/openid-connect/certs";
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default size guard (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_048_576;

/// How to reach the remote identity service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceConfig {
	/// Scheme, host, and optional path prefix of the identity service.
	pub base_url: Url,
	/// Path between the base URL and the realm name.
	#[serde(default = "default_auth_realms_path")]
	pub auth_realms_path: String,
	/// Token endpoint path below the realm.
	#[serde(default = "default_token_endpoint_path")]
	pub token_endpoint_path: String,
	/// Certs endpoint path below the realm.
	#[serde(default = "default_certs_endpoint_path")]
	pub certs_endpoint_path: String,
	/// Whether the base URL must use HTTPS.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Timeout applied to each HTTP request.
	#[serde(default = "default_request_timeout")]
	pub request_timeout: Duration,
	/// Maximum accepted response body size in bytes.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
}
impl ServiceConfig {
	/// Settings for the identity service at `base_url` with default paths.
	pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
		let base_url = Url::parse(base_url.as_ref())?;

		Ok(Self {
			base_url,
			auth_realms_path: DEFAULT_AUTH_REALMS_PATH.into(),
			token_endpoint_path: DEFAULT_TOKEN_ENDPOINT_PATH.into(),
			certs_endpoint_path: DEFAULT_CERTS_ENDPOINT_PATH.into(),
			require_https: true,
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
		})
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Validate the settings against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.require_https {
			security::enforce_https(&self.base_url)?;
		}
		if self.base_url.host_str().is_none() {
			return Err(Error::Validation {
				field: "base_url",
				reason: "Must include a host component.".into(),
			});
		}
		if self.token_endpoint_path.trim_matches('/').is_empty() {
			return Err(Error::Validation {
				field: "token_endpoint_path",
				reason: "Must not be empty.".into(),
			});
		}
		if self.certs_endpoint_path.trim_matches('/').is_empty() {
			return Err(Error::Validation {
				field: "certs_endpoint_path",
				reason: "Must not be empty.".into(),
			});
		}
		if self.request_timeout < Duration::from_millis(100) {
			return Err(Error::Validation {
				field: "request_timeout",
				reason: "Must be at least 100 ms.".into(),
			});
		}
		if self.max_response_bytes == 0 {
			return Err(Error::Validation {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}

	/// Certs endpoint of a realm.
	pub fn certs_url(&self, realm: &str) -> Result<Url> {
		self.realm_url(realm, &self.certs_endpoint_path)
	}

	/// Token endpoint of a realm.
	pub fn token_url(&self, realm: &str) -> Result<Url> {
		self.realm_url(realm, &self.token_endpoint_path)
	}

	fn realm_url(&self, realm: &str, endpoint_path: &str) -> Result<Url> {
		let mut url = self.base_url.clone();

		{
			let mut segments = url.path_segments_mut().map_err(|_| Error::Validation {
				field: "base_url",
				reason: "Must be a hierarchical URL.".into(),
			})?;

			segments.pop_if_empty();
			segments.extend(path_segments(&self.auth_realms_path));
			segments.push(realm);
			segments.extend(path_segments(endpoint_path));
		}

		Ok(url)
	}
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
	path.split('/').filter(|segment| !segment.is_empty())
}

fn default_true() -> bool {
	true
}

fn default_auth_realms_path() -> String {
	DEFAULT_AUTH_REALMS_PATH.into()
}

fn default_token_endpoint_path() -> String {
	DEFAULT_TOKEN_ENDPOINT_PATH.into()
}

fn default_certs_endpoint_path() -> String {
	DEFAULT_CERTS_ENDPOINT_PATH.into()
}

fn default_request_timeout() -> Duration {
	DEFAULT_REQUEST_TIMEOUT
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}
