//! Command entry points shared by the binary and integration tests.
//!
//! Each command resolves what it needs from a [`Context`] and reports a tagged [`Outcome`]:
//! `Completed` with its value, `Cancelled` when the user supplied nothing to act on, or `Failed`
//! with the structural error that stopped it. Per-item batch failures never turn into `Failed`;
//! they travel inside the returned [`BatchReport`].

// std
use std::{path::PathBuf, sync::OnceLock};
// self
use crate::{
	_prelude::*,
	auth::{self, ClientCredentials, Secret},
	bulk::{BatchReport, BulkRunner},
	config::{self, ConfigFile, Env, Overrides, RateLimits, Settings, StoredConfig},
	error::ConfigError,
	gate::RateGate,
	http::ReqwestHttpClient,
	metadata::{self, Transformation},
	registry::RegistryClient,
};

/// Result of running one command.
#[derive(Debug)]
pub enum Outcome<T> {
	/// The command ran to completion.
	Completed(T),
	/// The user supplied nothing to act on.
	Cancelled,
	/// A structural failure stopped the command.
	Failed(Error),
}
impl<T> Outcome<T> {
	/// Maps the completed value.
	pub fn map<U, F>(self, f: F) -> Outcome<U>
	where
		F: FnOnce(T) -> U,
	{
		match self {
			Self::Completed(value) => Outcome::Completed(f(value)),
			Self::Cancelled => Outcome::Cancelled,
			Self::Failed(e) => Outcome::Failed(e),
		}
	}

	/// Whether the command failed.
	pub fn is_failed(&self) -> bool {
		matches!(self, Self::Failed(_))
	}
}
impl<T> From<Result<T>> for Outcome<T> {
	fn from(result: Result<T>) -> Self {
		match result {
			Ok(value) => Self::Completed(value),
			Err(e) => Self::Failed(e),
		}
	}
}

/// Process-level state handed to every command.
///
/// Owns the single [`RateGate`] of the process; every registry client built from the same
/// context shares it.
#[derive(Debug)]
pub struct Context {
	/// Explicit command-line values.
	pub overrides: Overrides,
	/// Environment snapshot.
	pub env: Env,
	/// Persisted configuration.
	pub config: ConfigFile,
	/// HTTP stack for registry and token calls.
	pub http: ReqwestHttpClient,
	gate: OnceLock<Arc<RateGate>>,
}
impl Context {
	/// Creates a context.
	pub fn new(overrides: Overrides, env: Env, config: ConfigFile, http: ReqwestHttpClient) -> Self {
		Self { overrides, env, config, http, gate: OnceLock::new() }
	}

	/// Resolves registry settings, failing when the domain or token is missing.
	pub fn settings(&self) -> Result<Settings> {
		let stored = self.config.load();

		Ok(Settings::resolve(&self.overrides, stored.as_ref(), &self.env)?)
	}

	/// Returns the process gate, building it with `limits` on first use.
	pub fn gate(&self, limits: RateLimits) -> Arc<RateGate> {
		self.gate.get_or_init(|| Arc::new(RateGate::new(limits))).clone()
	}

	/// Builds a bulk runner over a registry client sharing the process gate.
	pub fn runner(&self) -> Result<BulkRunner> {
		let settings = self.settings()?;
		let gate = self.gate(settings.rate_limits);

		tracing::debug!(limits = ?gate.limits(), domain = %settings.domain, "registry client ready");

		Ok(BulkRunner::new(RegistryClient::new(self.http.clone(), &settings, gate)?))
	}
}

/// Input of [`login`].
#[derive(Clone, Debug, Default)]
pub struct LoginRequest {
	/// Client identifier; falls back to the environment.
	pub client_id: Option<String>,
	/// Client secret; `None` cancels the login.
	pub client_secret: Option<Secret>,
}

/// Input of [`create`].
#[derive(Clone, Debug, Default)]
pub struct CreateRequest {
	/// Federation metadata file.
	pub metadata: PathBuf,
	/// Service provider entity ID set on every created connection.
	pub sp_entity_id: Option<String>,
	/// Process only the first `limit` identity providers.
	pub limit: Option<usize>,
	/// Clients enabled on every created connection.
	pub enabled_clients: Vec<String>,
}

/// Displayable configuration with secrets hidden.
#[derive(Clone, Debug)]
pub struct ConfigView {
	/// Config file location.
	pub path: PathBuf,
	/// `(key, value)` pairs without secrets.
	pub entries: Vec<(&'static str, String)>,
}

/// Obtains a management API token with the client-credentials grant and persists it.
pub async fn login(ctx: &Context, request: LoginRequest) -> Outcome<()> {
	let LoginRequest { client_id, client_secret } = request;
	let Some(client_secret) = client_secret else {
		return Outcome::Cancelled;
	};

	async {
		let stored = ctx.config.load();
		let domain = ctx
			.overrides
			.domain
			.clone()
			.or_else(|| stored.as_ref().and_then(|s| s.domain.clone()))
			.or_else(|| ctx.env.get(config::ENV_DOMAIN).map(str::to_owned))
			.ok_or(ConfigError::MissingDomain)?;
		let client_id = client_id
			.or_else(|| ctx.env.get(config::ENV_CLIENT_ID).map(str::to_owned))
			.ok_or(ConfigError::MissingClientCredentials)?;
		let credentials = ClientCredentials { domain, client_id, client_secret };

		issue_and_store(ctx, &credentials).await
	}
	.await
	.into()
}

/// Re-runs the client-credentials grant with the persisted credentials.
pub async fn refresh(ctx: &Context) -> Outcome<()> {
	async {
		let stored = ctx.config.load();
		let credentials = ClientCredentials::from_stored(stored.as_ref(), &ctx.env)?;

		issue_and_store(ctx, &credentials).await
	}
	.await
	.into()
}

/// Removes the persisted configuration. Cancelled when none exists.
pub fn logout(ctx: &Context) -> Outcome<()> {
	if ctx.config.load().is_none() {
		return Outcome::Cancelled;
	}

	ctx.config.delete().map_err(Error::from).into()
}

/// Shows the persisted configuration. Cancelled when none exists.
pub fn show_config(ctx: &Context) -> Outcome<ConfigView> {
	match ctx.config.load() {
		Some(stored) => Outcome::Completed(ConfigView {
			path: ctx.config.path().to_path_buf(),
			entries: stored.redacted_entries(),
		}),
		None => Outcome::Cancelled,
	}
}

/// Persists rate-limit tuning. Cancelled when neither value is given.
pub fn set_rate_limit(
	ctx: &Context,
	max_concurrent: Option<usize>,
	min_interval_ms: Option<u64>,
) -> Outcome<RateLimits> {
	if max_concurrent.is_none() && min_interval_ms.is_none() {
		return Outcome::Cancelled;
	}

	let result = (|| -> Result<RateLimits> {
		let stored = ctx.config.load();
		let overrides = Overrides { max_concurrent, min_interval_ms, ..Overrides::default() };
		let limits = config::resolve_rate_limits(&overrides, stored.as_ref(), &ctx.env)?;

		ctx.config.save(StoredConfig {
			api_rate_max_concurrent: Some(limits.max_concurrent()),
			api_rate_min_time: Some(limits.min_interval_ms()),
			..StoredConfig::default()
		})?;

		tracing::info!(?limits, "rate limit configured");

		Ok(limits)
	})();

	result.into()
}

/// Counts the SAML connections in the registry.
pub async fn count(ctx: &Context) -> Outcome<usize> {
	async { ctx.runner()?.count().await }.await.into()
}

/// Deletes every SAML connection in the registry.
pub async fn delete_all(ctx: &Context) -> Outcome<BatchReport> {
	async { ctx.runner()?.delete_all().await }.await.into()
}

/// Creates connections for the identity providers of a metadata file.
///
/// The metadata is fully transformed before any registry call, so malformed metadata never
/// leaves a partial batch behind. Identity providers that cannot be named are reported as
/// failed items next to the registry failures.
pub async fn create(ctx: &Context, request: CreateRequest) -> Outcome<BatchReport> {
	async {
		let Transformation { descriptors, unnamed } =
			metadata::transform_file(&request.metadata, request.limit)?;
		let runner = ctx.runner()?;

		tracing::info!("processing the first {} entities", descriptors.len());

		for descriptor in &descriptors {
			tracing::info!("  {}", descriptor.idp_entity_id);
		}

		let mut report = runner
			.create_all(descriptors, request.sp_entity_id.as_deref(), &request.enabled_clients)
			.await;

		report.record_rejected(unnamed);

		Ok::<_, Error>(report)
	}
	.await
	.into()
}

async fn issue_and_store(ctx: &Context, credentials: &ClientCredentials) -> Result<()> {
	let token = auth::request_management_token(&ctx.http, credentials).await?;

	ctx.config.save(token.into_stored(credentials))?;

	Ok(())
}
