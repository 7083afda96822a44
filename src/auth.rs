//! Management API credentials and the client-credentials token exchange.
//!
//! `login` and `refresh` trade a client id/secret pair for a management API access token by
//! running the OAuth 2.0 client-credentials grant against `https://{domain}/oauth/token` with the
//! API base URL as `audience`. Credentials travel in the request body.

pub mod secret;

pub use secret::Secret;

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, HttpClientError, RequestTokenError, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError},
};
// self
use crate::{
	_prelude::*,
	config::{self, StoredConfig},
	error::{ConfigError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Client credentials for the tenant's management API.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
	/// Tenant domain.
	pub domain: String,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: Secret,
}
impl ClientCredentials {
	/// Builds credentials from the persisted config, falling back to the environment.
	pub fn from_stored(stored: Option<&StoredConfig>, env: &config::Env) -> Result<Self> {
		let domain = stored
			.and_then(|s| s.domain.clone())
			.or_else(|| env.get(config::ENV_DOMAIN).map(str::to_owned))
			.ok_or(ConfigError::MissingDomain)?;
		let client_id = stored
			.and_then(|s| s.client_id.clone())
			.or_else(|| env.get(config::ENV_CLIENT_ID).map(str::to_owned))
			.ok_or(ConfigError::MissingClientCredentials)?;
		let client_secret = stored
			.and_then(|s| s.client_secret.clone())
			.or_else(|| env.get(config::ENV_CLIENT_SECRET).map(Secret::new))
			.ok_or(ConfigError::MissingClientCredentials)?;

		Ok(Self { domain, client_id, client_secret })
	}
}

/// Access token issued by the token endpoint.
#[derive(Clone, Debug)]
pub struct IssuedToken {
	/// Bearer token for the management API.
	pub access_token: Secret,
	/// Expiry instant, when the endpoint reported `expires_in`.
	pub expires_at: Option<OffsetDateTime>,
}
impl IssuedToken {
	/// Config update persisting the credentials together with this token.
	pub fn into_stored(self, credentials: &ClientCredentials) -> StoredConfig {
		StoredConfig {
			domain: Some(credentials.domain.clone()),
			client_id: Some(credentials.client_id.clone()),
			client_secret: Some(credentials.client_secret.clone()),
			access_token: Some(self.access_token),
			access_token_expires_at: self.expires_at,
			..StoredConfig::default()
		}
	}
}

/// Runs the client-credentials grant and returns the issued management API token.
pub async fn request_management_token(
	http: &ReqwestHttpClient,
	credentials: &ClientCredentials,
) -> Result<IssuedToken> {
	const KIND: OpKind = OpKind::Token;

	let span = OpSpan::new(KIND, "request_management_token");

	obs::record_op_outcome(KIND, OpOutcome::Attempt);

	let result = span
		.instrument(async move {
			let token_url = TokenUrl::from_url(config::token_url(&credentials.domain)?);
			let audience = config::api_base_url(&credentials.domain)?;
			let client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
				.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
				.set_token_uri(token_url)
				.set_auth_type(AuthType::RequestBody);
			let slot = ResponseMetadataSlot::default();
			let handle = http.instrumented(slot.clone());
			let response = client
				.exchange_client_credentials()
				.add_extra_param("audience", audience.to_string())
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(slot.take(), err))?;
			let expires_at = response.expires_in().and_then(expiry_from_now);

			tracing::info!(domain = %credentials.domain, "management API token issued");

			Ok(IssuedToken {
				access_token: Secret::new(response.access_token().secret().to_owned()),
				expires_at,
			})
		})
		.await;

	obs::record_op_outcome(KIND, OpOutcome::of(&result));

	result
}

fn expiry_from_now(expires_in: StdDuration) -> Option<OffsetDateTime> {
	let seconds = i64::try_from(expires_in.as_secs()).ok().filter(|s| *s > 0)?;

	OffsetDateTime::now_utc().checked_add(time::Duration::seconds(seconds))
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, status),
		RequestTokenError::Request(error) => match error {
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => Error::Auth { reason: message },
			_ => Error::Auth { reason: "HTTP client error while calling the token endpoint".into() },
		},
		RequestTokenError::Parse(source, _body) => Error::Decode { source, status },
		RequestTokenError::Other(message) => Error::Auth { reason: message },
	}
}

fn map_server_response_error(response: BasicErrorResponse, status: Option<u16>) -> Error {
	let code = response.error().as_ref().to_owned();
	let reason = match (response.error_description(), status) {
		(Some(description), Some(status)) => format!("{code} ({status}): {description}"),
		(Some(description), None) => format!("{code}: {description}"),
		(None, Some(status)) => format!("{code} ({status})"),
		(None, None) => code,
	};

	Error::Auth { reason }
}
