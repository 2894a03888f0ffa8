//! Credential lifecycle for OpenID Connect realms: a TTL cache of per-realm signing keys and a
//! background refresher that keeps a client-credentials token valid.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod http;
pub mod metrics;
pub mod refresher;
pub mod security;

mod client;
mod clock;
mod error;
mod keys;
mod service;
mod token;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::manager::{CachedRealmStatus, CertCache, DEFAULT_CERTS_INVALIDATE_TIME},
	client::{Client, ClientBuilder},
	error::{Error, Result},
	http::{client::HttpIdentityService, endpoint::ServiceConfig},
	keys::{KeySet, SigningKey},
	refresher::{
		RefreshConfig, TokenRefresher,
		state::{RefresherPhase, RefresherStatus},
	},
	security::Secret,
	service::{IdentityService, ServiceFuture},
	token::{ClientCredentials, PasswordCredentials, Token},
};
