//! Configuration for the registry search engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the search engine: index shape, admission control,
/// and the background updater's cadence and data source.
#[derive(Debug, Clone)]
pub struct SearchConfig {
	/// Size of an n-gram window, in codepoints.
	pub ngram_size: usize,
	/// Maximum number of queries allowed to hold an index reference at once.
	pub max_concurrent_queries: usize,
	/// Maximum accepted length of a raw query, in bytes.
	pub max_query_bytes: usize,
	/// Deadline applied to a single query end to end.
	pub query_deadline: Duration,
	/// Canonical path of the on-disk registry file.
	pub data_file_path: PathBuf,
	/// Period between updates when the previous update succeeded.
	pub update_period: Duration,
	/// Period between retries when the previous update failed.
	pub update_min_period: Duration,
	/// Jitter applied to the update period, in `[0.0, 1.0]`.
	pub update_period_jitter: f32,
}

impl Default for SearchConfig {
	fn default() -> Self {
		Self {
			ngram_size: 3,
			max_concurrent_queries: 64,
			max_query_bytes: 256,
			query_deadline: Duration::from_secs(5),
			data_file_path: PathBuf::from("doctor_registry.txt"),
			update_period: Duration::from_secs(24 * 3600),
			update_min_period: Duration::from_secs(15 * 60),
			update_period_jitter: 0.1,
		}
	}
}

/// On-disk overlay for [`SearchConfig`]. Every field is optional; unset
/// fields fall back to [`SearchConfig::default`].
#[derive(Debug, Default, Deserialize)]
pub struct SearchConfigFile {
	/// See [`SearchConfig::ngram_size`].
	pub ngram_size: Option<usize>,
	/// See [`SearchConfig::max_concurrent_queries`].
	pub max_concurrent_queries: Option<usize>,
	/// See [`SearchConfig::max_query_bytes`].
	pub max_query_bytes: Option<usize>,
	/// See [`SearchConfig::query_deadline`].
	pub query_deadline_secs: Option<u64>,
	/// See [`SearchConfig::data_file_path`].
	pub data_file_path: Option<PathBuf>,
	/// See [`SearchConfig::update_period`].
	pub update_period_secs: Option<u64>,
	/// See [`SearchConfig::update_min_period`].
	pub update_min_period_secs: Option<u64>,
	/// See [`SearchConfig::update_period_jitter`].
	pub update_period_jitter: Option<f32>,
}

impl SearchConfig {
	/// Loads configuration from a TOML file, overlaying [`SearchConfig::default`].
	pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let file: SearchConfigFile = toml::from_str(&text)?;
		Ok(file.overlay(Self::default()))
	}
}

impl SearchConfigFile {
	fn overlay(self, mut base: SearchConfig) -> SearchConfig {
		if let Some(v) = self.ngram_size {
			base.ngram_size = v;
		}
		if let Some(v) = self.max_concurrent_queries {
			base.max_concurrent_queries = v;
		}
		if let Some(v) = self.max_query_bytes {
			base.max_query_bytes = v;
		}
		if let Some(v) = self.query_deadline_secs {
			base.query_deadline = Duration::from_secs(v);
		}
		if let Some(v) = self.data_file_path {
			base.data_file_path = v;
		}
		if let Some(v) = self.update_period_secs {
			base.update_period = Duration::from_secs(v);
		}
		if let Some(v) = self.update_min_period_secs {
			base.update_min_period = Duration::from_secs(v);
		}
		if let Some(v) = self.update_period_jitter {
			base.update_period_jitter = v;
		}
		base
	}
}

/// Errors parsing a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// The configuration file could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// The path that failed to read.
		path: PathBuf,
		/// The underlying I/O failure.
		error: std::io::Error,
	},

	/// The configuration file was not valid TOML.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
}
