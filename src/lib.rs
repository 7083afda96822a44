//! Provision SAML connections from federation metadata into a rate-limited identity
//! management API.
//!
//! The crate turns a SAML 2.0 `EntitiesDescriptor` document into connection descriptors
//! ([`metadata::transform`]) and applies bulk create/list/delete operations against the remote
//! connection registry ([`bulk::BulkRunner`]), with every outbound call paced by one shared
//! [`gate::RateGate`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod bulk;
pub mod command;
pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod metadata;
pub mod obs;
pub mod registry;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::RateLimits,
		gate::RateGate,
		http::ReqwestHttpClient,
		registry::RegistryClient,
	};

	/// Rate limits that never delay tests: wide concurrency and no spacing.
	pub fn unthrottled_limits() -> RateLimits {
		RateLimits::new(16, 0).expect("Unthrottled test limits should be valid.")
	}

	/// Builds a registry client pointed at a mock server base URL (for example
	/// `server.url("/api/v2/")`), sharing the returned gate.
	pub fn test_registry_client(
		base_url: &str,
		limits: RateLimits,
	) -> (RegistryClient, Arc<RateGate>) {
		let base = Url::parse(base_url).expect("Mock registry base URL should parse.");
		let gate = Arc::new(RateGate::new(limits));
		let client = RegistryClient::with_base_url(
			ReqwestHttpClient::default(),
			base,
			"test-access-token",
			gate.clone(),
		);

		(client, gate)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(feature = "cli")] use {clap as _, tracing_subscriber as _};
#[cfg(test)] use {color_eyre as _, httpmock as _};
