//! Crate-level error types shared across the transformer, registry client, and commands.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Metadata document is malformed or lacks the expected structure.
	#[error(transparent)]
	Parse(#[from] crate::metadata::ParseError),
	/// An identity provider entity could not be given a connection name.
	#[error(transparent)]
	Naming(#[from] crate::metadata::NamingError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Registry answered with a non-2xx status.
	#[error("Registry responded with status {status}: {body}")]
	Remote {
		/// HTTP status code.
		status: u16,
		/// Raw response body.
		body: String,
	},
	/// Registry answered with JSON that does not match the expected shape.
	#[error("Remote endpoint returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response, when one was received.
		status: Option<u16>,
	},
	/// A batch item task ended without producing a result.
	#[error("Batch task ended abnormally: {reason}.")]
	Task {
		/// Runtime-supplied reason string.
		reason: String,
	},
	/// Token endpoint rejected the client credentials or answered unexpectedly.
	#[error("Token request failed: {reason}.")]
	Auth {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns the HTTP status carried by registry failures, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Remote { status, .. } => Some(*status),
			Self::Decode { status, .. } => *status,
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Tenant domain does not form a valid API URL.
	#[error("Domain `{domain}` does not form a valid URL.")]
	InvalidDomain {
		/// Offending domain value.
		domain: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Registry base URL cannot carry path segments.
	#[error("Registry base URL `{url}` cannot be extended with a path.")]
	InvalidBaseUrl {
		/// Offending base URL.
		url: String,
	},
	/// No tenant domain was configured.
	#[error("No domain configured. Run `login` first or pass --domain.")]
	MissingDomain,
	/// No access token was configured.
	#[error("No access token configured. Run `login` first or pass --token.")]
	MissingAccessToken,
	/// Client credentials are required but absent.
	#[error("No client credentials configured. Run `login` first.")]
	MissingClientCredentials,
	/// Rate limit values are out of range.
	#[error("Invalid rate limit: {reason}.")]
	InvalidRateLimit {
		/// Description of the rejected value.
		reason: String,
	},
	/// Home directory could not be determined for the config file.
	#[error("Unable to determine the home directory for the config file.")]
	NoHomeDir,
	/// Config file could not be read, written, or removed.
	#[error("Config file {path} is not accessible: {message}.")]
	Io {
		/// Config file path.
		path: String,
		/// Human-readable error payload.
		message: String,
	},
	/// Config file contents could not be (de)serialized.
	#[error("Config file {path} is malformed: {message}.")]
	Serialization {
		/// Config file path.
		path: String,
		/// Human-readable error payload.
		message: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the registry.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the registry.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
impl From<ReqwestError> for Error {
	fn from(e: ReqwestError) -> Self {
		TransportError::from(e).into()
	}
}
