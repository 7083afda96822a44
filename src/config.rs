//! Run configuration: tenant domain, access token, and rate-limit tuning.
//!
//! Every value is resolved with the same precedence: explicit argument, then the persisted
//! config file, then the process environment, then the built-in default. Credentials have no
//! default; resolution fails with [`ConfigError`] when they are absent everywhere.

pub mod file;

pub use file::{ConfigFile, StoredConfig};

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

/// Default concurrency ceiling, matching a free-tier management API quota.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;
/// Default minimum spacing between request starts, in milliseconds.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1_000;

/// Environment variable holding the tenant domain.
pub const ENV_DOMAIN: &str = "AUTH0_DOMAIN";
/// Environment variable holding the management API access token.
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
/// Environment variable holding the client identifier used by `login`/`refresh`.
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
/// Environment variable holding the client secret used by `login`/`refresh`.
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
/// Environment variable overriding the concurrency ceiling.
pub const ENV_MAX_CONCURRENT: &str = "API_RATE_MAX_CONCURRENT";
/// Environment variable overriding the request spacing in milliseconds.
pub const ENV_MIN_INTERVAL: &str = "API_RATE_MIN_TIME";

/// Validated rate-limit tuning for the shared [`RateGate`](crate::gate::RateGate).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimits {
	max_concurrent: usize,
	min_interval_ms: u64,
}
impl RateLimits {
	/// Validates and builds a limit pair. `max_concurrent` must be at least one.
	pub fn new(max_concurrent: usize, min_interval_ms: u64) -> Result<Self, ConfigError> {
		if max_concurrent == 0 {
			return Err(ConfigError::InvalidRateLimit {
				reason: "max concurrent requests must be at least 1".into(),
			});
		}

		Ok(Self { max_concurrent, min_interval_ms })
	}

	/// Maximum number of operations in flight at once.
	pub fn max_concurrent(self) -> usize {
		self.max_concurrent
	}

	/// Minimum spacing between operation starts, in milliseconds.
	pub fn min_interval_ms(self) -> u64 {
		self.min_interval_ms
	}

	/// Minimum spacing between operation starts.
	pub fn min_interval(self) -> StdDuration {
		StdDuration::from_millis(self.min_interval_ms)
	}
}
impl Default for RateLimits {
	fn default() -> Self {
		Self { max_concurrent: DEFAULT_MAX_CONCURRENT, min_interval_ms: DEFAULT_MIN_INTERVAL_MS }
	}
}

/// Values supplied explicitly on the command line. They win over every other source.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
	/// Tenant domain.
	pub domain: Option<String>,
	/// Management API access token.
	pub access_token: Option<Secret>,
	/// Concurrency ceiling.
	pub max_concurrent: Option<usize>,
	/// Request spacing in milliseconds.
	pub min_interval_ms: Option<u64>,
}

/// Snapshot of the environment variables the crate understands.
#[derive(Clone, Debug, Default)]
pub struct Env(HashMap<String, String>);
impl Env {
	/// Captures the current process environment.
	pub fn from_process() -> Self {
		Self(std::env::vars().collect())
	}

	/// Builds a snapshot from explicit pairs.
	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	/// Returns a non-empty value for `key`.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
	}

	fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr,
	{
		self.get(key)
			.map(|raw| {
				raw.parse().map_err(|_| ConfigError::InvalidRateLimit {
					reason: format!("{key}={raw} is not a non-negative integer"),
				})
			})
			.transpose()
	}
}

/// Fully resolved settings for commands that talk to the registry.
#[derive(Clone, Debug)]
pub struct Settings {
	/// Tenant domain, e.g. `tenant.eu.auth0.com`.
	pub domain: String,
	/// Bearer token for the management API.
	pub access_token: Secret,
	/// Shared gate tuning.
	pub rate_limits: RateLimits,
}
impl Settings {
	/// Resolves settings from every source, failing when credentials are missing.
	pub fn resolve(
		overrides: &Overrides,
		stored: Option<&StoredConfig>,
		env: &Env,
	) -> Result<Self, ConfigError> {
		let domain = overrides
			.domain
			.clone()
			.or_else(|| stored.and_then(|s| s.domain.clone()))
			.or_else(|| env.get(ENV_DOMAIN).map(str::to_owned))
			.ok_or(ConfigError::MissingDomain)?;
		let access_token = overrides
			.access_token
			.clone()
			.or_else(|| stored.and_then(|s| s.access_token.clone()))
			.or_else(|| env.get(ENV_ACCESS_TOKEN).map(Secret::new))
			.ok_or(ConfigError::MissingAccessToken)?;
		let rate_limits = resolve_rate_limits(overrides, stored, env)?;

		Ok(Self { domain, access_token, rate_limits })
	}

	/// Base URL of the management API for the configured domain.
	pub fn api_base_url(&self) -> Result<Url, ConfigError> {
		api_base_url(&self.domain)
	}
}

/// Resolves rate limits alone; they always have a usable default.
pub fn resolve_rate_limits(
	overrides: &Overrides,
	stored: Option<&StoredConfig>,
	env: &Env,
) -> Result<RateLimits, ConfigError> {
	let max_concurrent = match overrides
		.max_concurrent
		.or_else(|| stored.and_then(|s| s.api_rate_max_concurrent))
	{
		Some(value) => value,
		None => env.parse(ENV_MAX_CONCURRENT)?.unwrap_or(DEFAULT_MAX_CONCURRENT),
	};
	let min_interval_ms =
		match overrides.min_interval_ms.or_else(|| stored.and_then(|s| s.api_rate_min_time)) {
			Some(value) => value,
			None => env.parse(ENV_MIN_INTERVAL)?.unwrap_or(DEFAULT_MIN_INTERVAL_MS),
		};

	RateLimits::new(max_concurrent, min_interval_ms)
}

/// Management API base URL (`https://{domain}/api/v2/`).
///
/// A domain that already carries an `http://` or `https://` scheme is used as-is, which lets
/// tests point the client at a local mock server.
pub fn api_base_url(domain: &str) -> Result<Url, ConfigError> {
	tenant_url(domain, "api/v2/")
}

/// OAuth token endpoint for the tenant (`https://{domain}/oauth/token`).
pub fn token_url(domain: &str) -> Result<Url, ConfigError> {
	tenant_url(domain, "oauth/token")
}

fn tenant_url(domain: &str, path: &str) -> Result<Url, ConfigError> {
	let domain = domain.trim().trim_end_matches('/');
	let root = if domain.starts_with("http://") || domain.starts_with("https://") {
		format!("{domain}/")
	} else {
		format!("https://{domain}/")
	};

	Url::parse(&root)
		.and_then(|base| base.join(path))
		.map_err(|source| ConfigError::InvalidDomain { domain: domain.to_owned(), source })
}
