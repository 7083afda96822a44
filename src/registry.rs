//! REST client for the remote connection registry.
//!
//! Each operation issues exactly one bearer-authenticated request and takes one permit from the
//! shared [`RateGate`] for the lifetime of that request. Non-2xx answers surface as
//! [`Error::Remote`]; 2xx answers whose JSON does not match the expected shape surface as
//! [`Error::Decode`] with the path of the offending field.

pub mod model;

pub use model::*;

// crates.io
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::Secret,
	config::Settings,
	error::ConfigError,
	gate::RateGate,
	http::ReqwestHttpClient,
	metadata::ConnectionDescriptor,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Gated client for the `connections` endpoints of the management API.
#[derive(Clone, Debug)]
pub struct RegistryClient {
	http: ReqwestHttpClient,
	base: Url,
	token: Secret,
	gate: Arc<RateGate>,
}
impl RegistryClient {
	/// Builds a client for the resolved tenant settings.
	pub fn new(http: ReqwestHttpClient, settings: &Settings, gate: Arc<RateGate>) -> Result<Self> {
		let base = settings.api_base_url()?;

		Ok(Self::with_base_url(http, base, settings.access_token.expose(), gate))
	}

	/// Builds a client against an explicit API base URL such as `https://tenant/api/v2/`.
	pub fn with_base_url(
		http: ReqwestHttpClient,
		base: Url,
		token: impl Into<String>,
		gate: Arc<RateGate>,
	) -> Self {
		Self { http, base, token: Secret::new(token), gate }
	}

	/// Gate shared by every call this client makes.
	pub fn gate(&self) -> &Arc<RateGate> {
		&self.gate
	}

	/// Lists connections matching `filter`.
	pub async fn list(&self, filter: &ListFilter) -> Result<Vec<ConnectionSummary>> {
		let url = self.endpoint(&["connections"])?;
		let request = self.http.get(url).query(&filter.query());
		let (status, body) = self.execute(OpKind::List, "list", request).await?;

		decode(status, &body)
	}

	/// Creates a SAML connection from `descriptor`.
	///
	/// `sp_entity_id` is the service provider's entity ID, passed through verbatim.
	pub async fn create(
		&self,
		descriptor: &ConnectionDescriptor,
		sp_entity_id: Option<&str>,
		enabled_clients: &[String],
	) -> Result<Connection> {
		let url = self.endpoint(&["connections"])?;
		let body = NewConnection::saml(descriptor, sp_entity_id, enabled_clients);
		let request = self.http.post(url).json(&body);
		let (status, body) = self.execute(OpKind::Create, "create", request).await?;

		decode(status, &body)
	}

	/// Deletes the connection with `connection_id`.
	pub async fn delete(&self, connection_id: &str) -> Result<()> {
		let url = self.endpoint(&["connections", connection_id])?;
		let request = self.http.delete(url);

		self.execute(OpKind::Delete, "delete", request).await?;

		Ok(())
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.base.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::InvalidBaseUrl { url: self.base.to_string() })?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}

	async fn execute(
		&self,
		kind: OpKind,
		stage: &'static str,
		request: RequestBuilder,
	) -> Result<(u16, Vec<u8>)> {
		let span = OpSpan::new(kind, stage);

		obs::record_op_outcome(kind, OpOutcome::Attempt);

		let result = span
			.instrument(self.gate.schedule(|| async move {
				let response = request.bearer_auth(self.token.expose()).send().await?;
				let status = response.status();
				let body = response.bytes().await?.to_vec();

				if !status.is_success() {
					return Err(Error::Remote {
						status: status.as_u16(),
						body: String::from_utf8_lossy(&body).into_owned(),
					});
				}

				tracing::debug!(status = status.as_u16(), "registry call succeeded");

				Ok::<_, Error>((status.as_u16(), body))
			}))
			.await;

		obs::record_op_outcome(kind, OpOutcome::of(&result));

		result
	}
}

fn decode<T>(status: u16, body: &[u8]) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| Error::Decode { source, status: Some(status) })
}
