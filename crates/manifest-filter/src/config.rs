//! Extra configuration file: ignored resource types and the field filter.
//!
//! ```yaml
//! ignoreResources:
//!   - secrets
//!   - deployments.apps
//! fieldFilter:
//!   metadata:
//!     labels:
//!       pod-template-hash:
//! ```
//!
//! `fieldFilter` may also be given as a string holding an embedded YAML
//! document, which is parsed before use.

use std::{
	fs,
	path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::{filter::FieldFilter, node::ManifestNode};

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read extra config file {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse extra config file {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_yaml_with_quirks::Error,
	},
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraConfig {
	// `ignoreResources:` with no value is null, read as an empty list.
	#[serde(default)]
	ignore_resources: Option<Vec<String>>,
	#[serde(default)]
	field_filter: ManifestNode,
}

#[derive(Debug, Clone, Default)]
pub struct ExtraConfig {
	/// Resource type names, resolved later into an
	/// [`IgnoreSet`](crate::ignore::IgnoreSet).
	pub ignore_resources: Vec<String>,
	pub field_filter: FieldFilter,
}

impl ExtraConfig {
	pub fn from_yaml(content: &str) -> Result<Self, serde_yaml_with_quirks::Error> {
		// An empty file is a valid, empty config.
		if content.trim().is_empty() {
			return Ok(Self::default());
		}
		let raw: Option<RawExtraConfig> = serde_yaml_with_quirks::from_str(content)?;
		let Some(raw) = raw else {
			return Ok(Self::default());
		};
		Ok(Self {
			ignore_resources: raw.ignore_resources.unwrap_or_default(),
			field_filter: FieldFilter::new(Some(raw.field_filter)),
		})
	}

	/// Load and parse the file, including an embedded `fieldFilter` document.
	///
	/// An embedded document that does not parse only disables the filter:
	/// the error is logged and `ignoreResources` is kept.
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let mut config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		config.field_filter = match reparse_embedded(config.field_filter) {
			Ok(filter) => filter,
			Err(e) => {
				error!(
					path = %path.display(),
					error = %e,
					"failed to parse embedded fieldFilter document, filtering disabled"
				);
				FieldFilter::none()
			}
		};
		Ok(config)
	}

	/// Load the file if one is given. A file that cannot be read or parsed is
	/// logged and yields the empty config, so the run continues without
	/// filtering.
	pub fn load_or_default(path: Option<&Path>) -> Self {
		let Some(path) = path else {
			info!("no extra config given");
			return Self::default();
		};
		match Self::load(path) {
			Ok(config) => {
				info!(
					path = %path.display(),
					ignore_resources = config.ignore_resources.len(),
					field_filter = config.field_filter.is_configured(),
					"loaded extra config"
				);
				config
			}
			Err(e) => {
				error!(error = %e, "failed to load extra config, continuing without it");
				Self::default()
			}
		}
	}
}

fn reparse_embedded(filter: FieldFilter) -> Result<FieldFilter, serde_yaml_with_quirks::Error> {
	match filter.spec().and_then(ManifestNode::as_str) {
		Some(embedded) if embedded.trim().is_empty() => Ok(FieldFilter::none()),
		Some(embedded) => {
			let node: ManifestNode = serde_yaml_with_quirks::from_str(embedded)?;
			Ok(FieldFilter::new(Some(node)))
		}
		None => Ok(filter),
	}
}
