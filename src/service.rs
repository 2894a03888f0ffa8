//! Contract for the remote identity service consumed by the cache and the refresher.

// std
use std::{fmt::Debug, future::Future, pin::Pin};
// self
use crate::{
	_prelude::*,
	keys::KeySet,
	token::{ClientCredentials, PasswordCredentials, Token},
};

/// Boxed future returned by [`IdentityService`] operations.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remote identity service operations used by this crate.
///
/// [`HttpIdentityService`](crate::http::client::HttpIdentityService) talks to a real provider;
/// tests substitute in-memory fakes.
pub trait IdentityService: Debug + Send + Sync {
	/// Fetch the public signing keys of a realm.
	fn fetch_signing_keys<'a>(&'a self, realm: &'a str) -> ServiceFuture<'a, KeySet>;

	/// Log in with resource-owner credentials (`grant_type=password`).
	fn password_login<'a>(
		&'a self,
		credentials: &'a PasswordCredentials,
		realm: &'a str,
	) -> ServiceFuture<'a, Token>;

	/// Log in as the client itself (`grant_type=client_credentials`).
	fn client_credentials_login<'a>(
		&'a self,
		credentials: &'a ClientCredentials,
		realm: &'a str,
	) -> ServiceFuture<'a, Token>;

	/// Exchange a refresh token for a new token (`grant_type=refresh_token`).
	fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a str,
		credentials: &'a ClientCredentials,
		realm: &'a str,
	) -> ServiceFuture<'a, Token>;
}
