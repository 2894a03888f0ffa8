//! HTTP client integration for the identity service's certs and token endpoints.

// crates.io
use http::header::ACCEPT;
use reqwest::{Client, Response, redirect::Policy};
use url::Url;
// self
use crate::{
	_prelude::*,
	http::endpoint::ServiceConfig,
	keys::KeySet,
	security::Secret,
	service::{IdentityService, ServiceFuture},
	token::{ClientCredentials, PasswordCredentials, Token},
};

/// [`IdentityService`] backed by an OpenID Connect provider over HTTP.
#[derive(Clone, Debug)]
pub struct HttpIdentityService {
	client: Client,
	config: Arc<ServiceConfig>,
}
impl HttpIdentityService {
	/// Build a service with the default reqwest client.
	pub fn new(config: ServiceConfig) -> Result<Self> {
		config.validate()?;

		let client = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(format!("realm-credentials/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(Duration::from_secs(5))
			.timeout(config.request_timeout)
			.build()?;

		Ok(Self::with_client(config, client))
	}

	/// Build a service using the supplied HTTP client.
	pub fn with_client(config: ServiceConfig, client: Client) -> Self {
		Self { client, config: Arc::new(config) }
	}

	/// Connection settings in use.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	#[tracing::instrument(skip(self))]
	async fn get_certs(&self, realm: &str) -> Result<KeySet> {
		let url = self.config.certs_url(realm)?;
		let start = Instant::now();
		let response = self.client.get(url.clone()).header(ACCEPT, "application/json").send().await?;
		let body = self.read_body(&url, response).await?;
		let keys = KeySet::from_json(realm, &body)?;

		tracing::debug!(keys = keys.len(), elapsed = ?start.elapsed(), "certs fetch complete");

		Ok(keys)
	}

	#[tracing::instrument(
		skip(self, credentials, grant),
		fields(grant = grant.name(), client_id = %credentials.client_id)
	)]
	async fn post_token(
		&self,
		realm: &str,
		credentials: &ClientCredentials,
		grant: Grant<'_>,
	) -> Result<Token> {
		let url = self.config.token_url(realm)?;
		let mut form = vec![("grant_type", grant.name()), ("client_id", credentials.client_id.as_str())];

		grant.extend_form(&mut form);

		let mut request =
			self.client.post(url.clone()).header(ACCEPT, "application/json").form(&form);

		// Public clients have no secret and must not send Basic credentials.
		if credentials.is_confidential() {
			request = request
				.basic_auth(&credentials.client_id, Some(credentials.client_secret.expose()));
		}

		let start = Instant::now();
		let response = request.send().await?;
		let body = self.read_body(&url, response).await?;
		let token: Token = serde_json::from_slice(&body)?;

		tracing::debug!(
			expires_in = token.expires_in,
			refresh_expires_in = token.refresh_expires_in,
			elapsed = ?start.elapsed(),
			"token request complete"
		);

		Ok(token)
	}

	async fn read_body(&self, url: &Url, response: Response) -> Result<Vec<u8>> {
		let status = response.status();
		let limit = self.config.max_response_bytes;

		if !status.is_success() {
			// Error bodies are truncated to the guard rather than rejected.
			let body = read_capped(response, limit)
				.await
				.ok()
				.map(|(bytes, _)| String::from_utf8_lossy(&bytes).into_owned());

			return Err(Error::HttpStatus { status, url: url.clone(), body });
		}
		if response.content_length().is_some_and(|length| length > limit) {
			return Err(oversized(limit));
		}

		let (bytes, truncated) = read_capped(response, limit).await?;

		if truncated {
			return Err(oversized(limit));
		}

		Ok(bytes)
	}
}
impl IdentityService for HttpIdentityService {
	fn fetch_signing_keys<'a>(&'a self, realm: &'a str) -> ServiceFuture<'a, KeySet> {
		Box::pin(self.get_certs(realm))
	}

	fn password_login<'a>(
		&'a self,
		credentials: &'a PasswordCredentials,
		realm: &'a str,
	) -> ServiceFuture<'a, Token> {
		Box::pin(self.post_token(
			realm,
			&credentials.client,
			Grant::Password { username: &credentials.username, password: &credentials.password },
		))
	}

	fn client_credentials_login<'a>(
		&'a self,
		credentials: &'a ClientCredentials,
		realm: &'a str,
	) -> ServiceFuture<'a, Token> {
		Box::pin(self.post_token(realm, credentials, Grant::ClientCredentials))
	}

	fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
		credentials: &'a ClientCredentials,
		realm: &'a str,
	) -> ServiceFuture<'a, Token> {
		Box::pin(self.post_token(realm, credentials, Grant::RefreshToken(refresh_token)))
	}
}

#[derive(Clone, Copy, Debug)]
enum Grant<'a> {
	ClientCredentials,
	Password { username: &'a str, password: &'a Secret },
	RefreshToken(&'a str),
}
impl<'a> Grant<'a> {
	fn name(&self) -> &'static str {
		match self {
			Self::ClientCredentials => "client_credentials",
			Self::Password { .. } => "password",
			Self::RefreshToken(_) => "refresh_token",
		}
	}

	fn extend_form(&self, form: &mut Vec<(&'static str, &'a str)>) {
		match *self {
			Self::ClientCredentials => {},
			Self::Password { username, password } => {
				form.push(("username", username));
				form.push(("password", password.expose()));
			},
			Self::RefreshToken(refresh_token) => form.push(("refresh_token", refresh_token)),
		}
	}
}

/// Read at most `limit` bytes of the body, reporting whether more were available.
async fn read_capped(mut response: Response, limit: u64) -> Result<(Vec<u8>, bool)> {
	let limit = usize::try_from(limit).unwrap_or(usize::MAX);
	let mut body = Vec::new();

	while let Some(chunk) = response.chunk().await? {
		let room = limit - body.len();

		if chunk.len() > room {
			body.extend_from_slice(&chunk[..room]);

			return Ok((body, true));
		}

		body.extend_from_slice(&chunk);
	}

	Ok((body, false))
}

fn oversized(limit: u64) -> Error {
	Error::Validation {
		field: "max_response_bytes",
		reason: format!("Response exceeds the configured guard of {limit} bytes."),
	}
}
