//! Runtime configuration.
//!
//! ```toml
//! max_dispatch_depth = 20
//! write_mode = "diff"
//! wildcard_handlers = true
//! refresh_on_push = true
//! inbox_capacity = 64
//! rpc_timeout_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a [`FormConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The file could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path that failed to read.
		path: PathBuf,
		/// Underlying error.
		error: std::io::Error,
	},
	/// The TOML did not parse or had unknown keys.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),
	/// A value is out of range.
	#[error("invalid `{key}`: {reason}")]
	Invalid {
		/// Offending key.
		key: &'static str,
		/// Why it was rejected.
		reason: &'static str,
	},
}

/// What a save of a persisted document transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
	/// Only locally modified fields and tables.
	#[default]
	Diff,
	/// Every field and table.
	Full,
}

/// Tunables of a [`crate::FormRuntime`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormConfig {
	/// Re-entrant dispatch depth before `DispatchCycleDetected`.
	pub max_dispatch_depth: usize,
	/// Save payload shape for persisted documents.
	pub write_mode: WriteMode,
	/// Whether handlers registered for type `"*"` run for every type.
	pub wildcard_handlers: bool,
	/// Whether a clean form reloads itself on a newer `doc_update`.
	pub refresh_on_push: bool,
	/// Bound of the realtime push inbox.
	pub inbox_capacity: usize,
	/// Deadline for each gateway call, in milliseconds.
	pub rpc_timeout_ms: Option<u64>,
}

impl Default for FormConfig {
	fn default() -> Self {
		Self {
			max_dispatch_depth: 20,
			write_mode: WriteMode::Diff,
			wildcard_handlers: true,
			refresh_on_push: true,
			inbox_capacity: 64,
			rpc_timeout_ms: None,
		}
	}
}

impl FormConfig {
	/// Parses and validates a TOML document. Missing keys take defaults.
	pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads and parses a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml(&content)
	}

	/// Rejects values the runtime cannot operate with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_dispatch_depth == 0 {
			return Err(ConfigError::Invalid {
				key: "max_dispatch_depth",
				reason: "must be at least 1",
			});
		}
		if self.inbox_capacity == 0 {
			return Err(ConfigError::Invalid {
				key: "inbox_capacity",
				reason: "must be at least 1",
			});
		}
		if self.rpc_timeout_ms == Some(0) {
			return Err(ConfigError::Invalid {
				key: "rpc_timeout_ms",
				reason: "must be positive when set",
			});
		}
		Ok(())
	}

	/// Gateway call deadline, if any.
	pub fn rpc_timeout(&self) -> Option<Duration> {
		self.rpc_timeout_ms.map(Duration::from_millis)
	}
}
