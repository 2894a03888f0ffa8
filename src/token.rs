//! Bearer token and login credential types.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, security::Secret};

/// Token endpoint response of an OAuth/OpenID Connect login, refresh, or client-credentials grant.
///
/// Both expiries are relative to the moment the token was issued.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Bearer credential attached to authenticated calls.
	pub access_token: Secret,
	/// Lifetime of the access token in seconds.
	#[serde(default)]
	pub expires_in: u64,
	/// Lifetime of the refresh token in seconds; `0` when the provider sets no limit.
	#[serde(default)]
	pub refresh_expires_in: u64,
	/// Refresh credential; empty when the grant issues none.
	#[serde(default)]
	pub refresh_token: Secret,
	/// Token type, normally `Bearer`.
	#[serde(default)]
	pub token_type: String,
	/// OpenID Connect ID token, when the `openid` scope was requested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<Secret>,
	/// Provider not-before policy timestamp.
	#[serde(default, rename = "not-before-policy")]
	pub not_before_policy: i64,
	/// Provider session identifier.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub session_state: Option<String>,
	/// Space-separated granted scopes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scope: Option<String>,
}
impl Token {
	/// Access token lifetime as a duration.
	pub fn access_lifetime(&self) -> Duration {
		Duration::from_secs(self.expires_in)
	}

	/// Refresh token lifetime, or `None` when the token cannot be refreshed on a schedule.
	///
	/// A missing refresh token or a zero `refresh_expires_in` both yield `None`.
	pub fn refresh_lifetime(&self) -> Option<Duration> {
		if self.refresh_token.is_empty() || self.refresh_expires_in == 0 {
			None
		} else {
			Some(Duration::from_secs(self.refresh_expires_in))
		}
	}
}

/// Confidential or public client credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret; empty for public clients.
	#[serde(default)]
	pub client_secret: Secret,
}
impl ClientCredentials {
	/// Build credentials for a confidential client.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret>) -> Self {
		Self { client_id: client_id.into(), client_secret: client_secret.into() }
	}

	/// Build credentials for a public client that has no secret.
	pub fn public(client_id: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: Secret::default() }
	}

	/// Whether both halves are present, so the client can authenticate with HTTP Basic.
	pub fn is_confidential(&self) -> bool {
		!self.client_id.is_empty() && !self.client_secret.is_empty()
	}
}

/// Resource-owner credentials for a password grant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordCredentials {
	/// Client performing the login.
	pub client: ClientCredentials,
	/// End-user name.
	pub username: String,
	/// End-user password.
	pub password: Secret,
}
impl PasswordCredentials {
	/// Build password-grant credentials.
	pub fn new(
		client: ClientCredentials,
		username: impl Into<String>,
		password: impl Into<Secret>,
	) -> Self {
		Self { client, username: username.into(), password: password.into() }
	}
}
