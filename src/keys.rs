//! Realm signing-key set published by the identity provider.

// crates.io
use jsonwebtoken::DecodingKey;
use serde::{Deserialize, Serialize};
// self
use crate::_prelude::*;

/// One public key from a realm's certs document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
	/// Key identifier matched against a token header's `kid`.
	#[serde(rename = "kid")]
	pub key_id: String,
	/// Key family, e.g. `RSA` or `EC`.
	#[serde(rename = "kty")]
	pub key_type: String,
	/// Signature algorithm, e.g. `RS256`.
	#[serde(rename = "alg", default)]
	pub algorithm: String,
	/// Intended use, `sig` or `enc`.
	#[serde(rename = "use", default)]
	pub usage: String,
	/// Base64url RSA modulus.
	#[serde(rename = "n", default)]
	pub modulus: String,
	/// Base64url RSA public exponent.
	#[serde(rename = "e", default)]
	pub exponent: String,
}
impl SigningKey {
	/// Convert the RSA components into a decoding key.
	pub fn decoding_key(&self) -> Result<DecodingKey> {
		if self.key_type != "RSA" {
			return Err(Error::Validation {
				field: "kty",
				reason: format!("Unsupported key type '{}'; only RSA keys are supported.", self.key_type),
			});
		}
		if self.modulus.is_empty() || self.exponent.is_empty() {
			return Err(Error::Validation {
				field: "n",
				reason: format!("Key '{}' is missing its modulus or exponent.", self.key_id),
			});
		}

		Ok(DecodingKey::from_rsa_components(&self.modulus, &self.exponent)?)
	}
}

/// Signing keys of one realm captured at one point in time.
///
/// A key set is immutable once fetched; the cache shares it behind an [`Arc`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
	/// Realm the keys belong to.
	pub realm: String,
	/// Keys in the order the provider published them.
	pub keys: Vec<SigningKey>,
	/// Wall-clock time the keys were fetched.
	pub fetched_at: DateTime<Utc>,
}
impl KeySet {
	/// Build a key set stamped with the current time.
	pub fn new(realm: impl Into<String>, keys: Vec<SigningKey>) -> Self {
		Self { realm: realm.into(), keys, fetched_at: Utc::now() }
	}

	/// Decode a certs document (`{"keys": [...]}`) for the given realm.
	pub fn from_json(realm: impl Into<String>, bytes: &[u8]) -> Result<Self> {
		let document: CertsDocument = serde_json::from_slice(bytes)?;

		Ok(Self::new(realm, document.keys))
	}

	/// Find the key with the given key ID.
	pub fn find(&self, key_id: &str) -> Option<&SigningKey> {
		self.keys.iter().find(|key| key.key_id == key_id)
	}

	/// Number of keys in the set.
	pub fn len(&self) -> usize {
		self.keys.len()
	}

	/// Whether the provider published no keys.
	pub fn is_empty(&self) -> bool {
		self.keys.is_empty()
	}
}

#[derive(Debug, Deserialize)]
struct CertsDocument {
	#[serde(default)]
	keys: Vec<SigningKey>,
}
