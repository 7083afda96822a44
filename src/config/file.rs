//! JSON config file persisted in the user's home directory.

// std
use std::{
	fs::{self, File},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, auth::Secret, error::ConfigError};

/// File name used under the home directory.
pub const CONFIG_FILE_NAME: &str = ".saml-provision.json";

/// Values persisted between runs. Every field is optional so partial saves merge cleanly.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfig {
	/// Tenant domain.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,
	/// Client identifier for the client-credentials grant.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Client secret for the client-credentials grant.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_secret: Option<Secret>,
	/// Management API access token.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub access_token: Option<Secret>,
	/// Expiry of the access token, when the token endpoint reported one.
	#[serde(with = "time::serde::timestamp::option", skip_serializing_if = "Option::is_none")]
	pub access_token_expires_at: Option<OffsetDateTime>,
	/// Persisted concurrency ceiling.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_rate_max_concurrent: Option<usize>,
	/// Persisted request spacing in milliseconds.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_rate_min_time: Option<u64>,
}
impl StoredConfig {
	/// Overwrites every field that `update` sets, keeping the rest.
	pub fn merge(&mut self, update: StoredConfig) {
		fn take<T>(slot: &mut Option<T>, value: Option<T>) {
			if value.is_some() {
				*slot = value;
			}
		}

		take(&mut self.domain, update.domain);
		take(&mut self.client_id, update.client_id);
		take(&mut self.client_secret, update.client_secret);
		take(&mut self.access_token, update.access_token);
		take(&mut self.access_token_expires_at, update.access_token_expires_at);
		take(&mut self.api_rate_max_concurrent, update.api_rate_max_concurrent);
		take(&mut self.api_rate_min_time, update.api_rate_min_time);
	}

	/// Lists `(key, value)` pairs for display with secrets hidden.
	pub fn redacted_entries(&self) -> Vec<(&'static str, String)> {
		let mut entries = Vec::new();

		if let Some(domain) = &self.domain {
			entries.push(("domain", domain.clone()));
		}
		if let Some(client_id) = &self.client_id {
			entries.push(("client_id", client_id.clone()));
		}
		if let Some(expires_at) = self.access_token_expires_at {
			entries.push(("access_token_expires_at", expires_at.to_string()));
		}
		if let Some(max) = self.api_rate_max_concurrent {
			entries.push(("api_rate_max_concurrent", max.to_string()));
		}
		if let Some(min) = self.api_rate_min_time {
			entries.push(("api_rate_min_time", min.to_string()));
		}

		entries
	}
}

/// Config file handle caching the last loaded snapshot.
#[derive(Clone, Debug)]
pub struct ConfigFile {
	path: PathBuf,
	inner: Arc<RwLock<Option<StoredConfig>>>,
}
impl ConfigFile {
	/// Opens the config file in the user's home directory.
	pub fn open_default() -> Result<Self, ConfigError> {
		let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;

		Self::open(home.join(CONFIG_FILE_NAME))
	}

	/// Opens (without creating) the config file at `path`, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
		let path = path.into();
		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the config file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns the loaded configuration, or `None` when no file exists.
	pub fn load(&self) -> Option<StoredConfig> {
		self.inner.read().clone()
	}

	/// Merges `update` into the stored configuration and persists the result.
	pub fn save(&self, update: StoredConfig) -> Result<StoredConfig, ConfigError> {
		let mut guard = self.inner.write();
		let mut merged = guard.clone().unwrap_or_default();

		merged.merge(update);
		self.persist(&merged)?;
		*guard = Some(merged.clone());

		Ok(merged)
	}

	/// Removes the config file.
	pub fn delete(&self) -> Result<(), ConfigError> {
		let mut guard = self.inner.write();

		fs::remove_file(&self.path).map_err(|e| self.io_error(e))?;
		*guard = None;

		Ok(())
	}

	fn load_snapshot(path: &Path) -> Result<Option<StoredConfig>, ConfigError> {
		let bytes = match fs::read(path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(ConfigError::Io {
					path: path.display().to_string(),
					message: e.to_string(),
				});
			},
		};

		if bytes.is_empty() {
			return Ok(Some(StoredConfig::default()));
		}

		serde_json::from_slice(&bytes).map(Some).map_err(|e| ConfigError::Serialization {
			path: path.display().to_string(),
			message: e.to_string(),
		})
	}

	fn persist(&self, contents: &StoredConfig) -> Result<(), ConfigError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
		}

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| ConfigError::Serialization {
				path: self.path.display().to_string(),
				message: e.to_string(),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| self.io_error(e))?;

			file.write_all(&serialized).map_err(|e| self.io_error(e))?;
			file.sync_all().map_err(|e| self.io_error(e))?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| self.io_error(e))
	}

	fn io_error(&self, e: std::io::Error) -> ConfigError {
		ConfigError::Io { path: self.path.display().to_string(), message: e.to_string() }
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// self
	use super::*;

	fn temp_path(tag: &str) -> PathBuf {
		let unique = format!(
			"saml_provision_config_{tag}_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	#[test]
	fn missing_file_loads_as_none() {
		let file = ConfigFile::open(temp_path("missing")).expect("Opening should not create.");

		assert!(file.load().is_none());
		assert!(!file.path().exists());
	}

	#[test]
	fn save_merges_and_reload_round_trips() {
		let path = temp_path("merge");
		let file = ConfigFile::open(&path).expect("Failed to open config file.");

		file.save(StoredConfig {
			domain: Some("tenant.example.com".into()),
			client_id: Some("client-1".into()),
			access_token: Some(Secret::new("first-token")),
			..StoredConfig::default()
		})
		.expect("Initial save should succeed.");
		file.save(StoredConfig {
			access_token: Some(Secret::new("second-token")),
			api_rate_max_concurrent: Some(3),
			..StoredConfig::default()
		})
		.expect("Merging save should succeed.");

		let reopened = ConfigFile::open(&path).expect("Failed to reopen config file.");
		let stored = reopened.load().expect("Config should exist after save.");

		assert_eq!(stored.domain.as_deref(), Some("tenant.example.com"));
		assert_eq!(stored.client_id.as_deref(), Some("client-1"));
		assert_eq!(stored.access_token.as_ref().map(Secret::expose), Some("second-token"));
		assert_eq!(stored.api_rate_max_concurrent, Some(3));

		reopened.delete().expect("Deleting the config file should succeed.");

		assert!(reopened.load().is_none());
		assert!(!path.exists());
	}

	#[test]
	fn redacted_entries_hide_secrets() {
		let stored = StoredConfig {
			domain: Some("tenant.example.com".into()),
			client_secret: Some(Secret::new("very-secret")),
			access_token: Some(Secret::new("token-value")),
			..StoredConfig::default()
		};
		let rendered = format!("{:?}", stored.redacted_entries());

		assert!(rendered.contains("tenant.example.com"));
		assert!(!rendered.contains("very-secret"));
		assert!(!rendered.contains("token-value"));
		assert!(!format!("{stored:?}").contains("token-value"));
	}
}
