//! Scripted in-memory identity service shared by the integration tests.

// std
use std::{
	collections::VecDeque,
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use http::StatusCode;
use realm_credentials::{
	ClientCredentials, Error, IdentityService, KeySet, PasswordCredentials, Result, Secret,
	ServiceFuture, SigningKey, Token,
};
use tokio::time::{self, Instant};

/// Scripted result of one token request.
#[derive(Clone, Copy, Debug)]
pub enum Outcome {
	Issue,
	Unavailable,
	Rejected,
}

/// One token request observed by the service.
#[derive(Clone, Debug)]
pub struct Call {
	pub grant: &'static str,
	pub at: Instant,
	pub refresh_token: Option<String>,
}

#[derive(Debug)]
pub struct ScriptedService {
	expires_in: u64,
	refresh_expires_in: u64,
	cert_delay: Duration,
	cert_failures: AtomicUsize,
	cert_fetches: AtomicUsize,
	issued: AtomicUsize,
	script: Mutex<VecDeque<Outcome>>,
	calls: Mutex<Vec<Call>>,
}
impl ScriptedService {
	pub fn new(expires_in: u64, refresh_expires_in: u64) -> Self {
		Self {
			expires_in,
			refresh_expires_in,
			cert_delay: Duration::ZERO,
			cert_failures: AtomicUsize::new(0),
			cert_fetches: AtomicUsize::new(0),
			issued: AtomicUsize::new(0),
			script: Mutex::new(VecDeque::new()),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn with_cert_delay(mut self, delay: Duration) -> Self {
		self.cert_delay = delay;

		self
	}

	/// Queue token outcomes; once drained every request is issued a token.
	pub fn with_script(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
		self.script.lock().expect("script lock").extend(outcomes);

		self
	}

	pub fn fail_next_cert_fetches(&self, count: usize) {
		self.cert_failures.store(count, Ordering::SeqCst);
	}

	pub fn cert_fetches(&self) -> usize {
		self.cert_fetches.load(Ordering::SeqCst)
	}

	pub fn calls(&self) -> Vec<Call> {
		self.calls.lock().expect("calls lock").clone()
	}

	fn respond(&self, grant: &'static str, refresh_token: Option<&str>) -> Result<Token> {
		self.calls.lock().expect("calls lock").push(Call {
			grant,
			at: Instant::now(),
			refresh_token: refresh_token.map(str::to_owned),
		});

		let outcome = self.script.lock().expect("script lock").pop_front().unwrap_or(Outcome::Issue);

		match outcome {
			Outcome::Issue => {
				let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

				Ok(Token {
					access_token: Secret::new(format!("access-{n}")),
					expires_in: self.expires_in,
					refresh_expires_in: self.refresh_expires_in,
					refresh_token: Secret::new(format!("refresh-{n}")),
					token_type: "Bearer".into(),
					..Default::default()
				})
			},
			Outcome::Unavailable => Err(upstream(StatusCode::SERVICE_UNAVAILABLE, None)),
			Outcome::Rejected => Err(upstream(
				StatusCode::UNAUTHORIZED,
				Some(r#"{"error":"invalid_client","error_description":"Invalid client credentials"}"#),
			)),
		}
	}
}
impl IdentityService for ScriptedService {
	fn fetch_signing_keys<'a>(&'a self, realm: &'a str) -> ServiceFuture<'a, KeySet> {
		Box::pin(async move {
			self.cert_fetches.fetch_add(1, Ordering::SeqCst);

			if !self.cert_delay.is_zero() {
				time::sleep(self.cert_delay).await;
			}

			let failing = self
				.cert_failures
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
				.is_ok();

			if failing {
				return Err(upstream(StatusCode::BAD_GATEWAY, None));
			}

			Ok(KeySet::new(realm, vec![signing_key(&format!("{realm}-key"))]))
		})
	}

	fn password_login<'a>(
		&'a self,
		_credentials: &'a PasswordCredentials,
		_realm: &'a str,
	) -> ServiceFuture<'a, Token> {
		Box::pin(async move { self.respond("password", None) })
	}

	fn client_credentials_login<'a>(
		&'a self,
		_credentials: &'a ClientCredentials,
		_realm: &'a str,
	) -> ServiceFuture<'a, Token> {
		Box::pin(async move { self.respond("client_credentials", None) })
	}

	fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
		_credentials: &'a ClientCredentials,
		_realm: &'a str,
	) -> ServiceFuture<'a, Token> {
		Box::pin(async move { self.respond("refresh_token", Some(refresh_token)) })
	}
}

pub fn signing_key(key_id: &str) -> SigningKey {
	SigningKey {
		key_id: key_id.into(),
		key_type: "RSA".into(),
		algorithm: "RS256".into(),
		usage: "sig".into(),
		modulus: "AQAB".into(),
		exponent: "AQAB".into(),
	}
}

fn upstream(status: StatusCode, body: Option<&str>) -> Error {
	Error::HttpStatus {
		status,
		url: url::Url::parse("https://sso.example.com/auth/realms/demo").expect("static url"),
		body: body.map(str::to_owned),
	}
}
