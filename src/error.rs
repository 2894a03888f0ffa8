//! Crate-wide error types and `Result` alias.

// crates.io
use http::StatusCode;
use serde::Deserialize;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the credential lifecycle crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Failed to fetch signing keys for realm '{realm}': {source}")]
	Fetch { realm: String, source: Box<Error> },
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: StatusCode, url: url::Url, body: Option<String> },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Security violation: {0}")]
	Security(String),
	#[error("The {0} has been shut down.")]
	Shutdown(&'static str),
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether retrying the same request can never succeed.
	///
	/// Credential rejections (`400`/`401`/`403`, or an OAuth `invalid_grant`,
	/// `invalid_client`, or `unauthorized_client` code) are permanent; transport failures and
	/// `5xx` replies are not. Wrapped errors are classified by their source.
	pub fn is_permanent(&self) -> bool {
		match self {
			Self::Fetch { source, .. } => source.is_permanent(),
			Self::HttpStatus { status, .. } => {
				if let Some(code) = self.remote_error_code()
					&& matches!(
						code.as_str(),
						"invalid_grant" | "invalid_client" | "unauthorized_client"
					) {
					return true;
				}

				matches!(
					*status,
					StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
				)
			},
			Self::Security(_) | Self::Validation { .. } => true,
			_ => false,
		}
	}

	/// OAuth or identity-provider error code carried in an upstream error body, if any.
	///
	/// Understands both the OAuth `error` field and the provider's `errorMessage` field.
	pub fn remote_error_code(&self) -> Option<String> {
		match self {
			Self::Fetch { source, .. } => source.remote_error_code(),
			Self::HttpStatus { body: Some(body), .. } => {
				let parsed: RemoteErrorBody = serde_json::from_str(body).ok()?;

				parsed.error.or(parsed.error_message)
			},
			_ => None,
		}
	}
}

#[derive(Debug, Deserialize)]
struct RemoteErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default, rename = "errorMessage")]
	error_message: Option<String>,
}
