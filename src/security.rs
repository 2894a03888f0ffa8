//! Security utilities covering HTTPS enforcement and secret redaction.
//!
//! # Threat Model
//! Client secrets, passwords, and bearer tokens travel through configuration structs, token
//! responses, and tracing spans. These helpers keep them out of `Debug` output and logs, and
//! refuse to send them to an identity service over plain HTTP unless explicitly allowed.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

/// Credential material whose `Debug` output is redacted.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);
impl Secret {
	/// Wrap a credential value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Borrow the raw credential value.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Whether the credential is empty.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		if self.0.is_empty() { f.write_str("Secret(<empty>)") } else { f.write_str("Secret(****)") }
	}
}
impl From<String> for Secret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for Secret {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Identity service URL {url} must use HTTPS.")))
	}
}
