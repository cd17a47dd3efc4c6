//! Writing normalized resources into the output roots.

use std::{
	fs, io,
	path::{Path, PathBuf},
};

use manifest_filter::{ManifestNode, ResourceIdentity, ResourcePair};
use thiserror::Error;
use tracing::{instrument, trace};

use crate::yaml::to_yaml;

#[derive(Debug, Error)]
pub enum MaterializeError {
	#[error("serializing {resource}")]
	Serialize {
		resource: String,
		#[source]
		source: serde_saphyr::ser_error::Error,
	},

	#[error("writing {path}")]
	Write {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

/// Serialize `node` and write it to `root/<file name of identity>`,
/// truncating any existing file.
#[instrument(skip(node), fields(resource = %identity))]
pub fn write_resource(
	root: &Path,
	identity: &ResourceIdentity,
	node: &ManifestNode,
) -> Result<PathBuf, MaterializeError> {
	let yaml = to_yaml(node).map_err(|source| MaterializeError::Serialize {
		resource: identity.to_string(),
		source,
	})?;
	let path = root.join(identity.file_name());
	fs::write(&path, yaml).map_err(|source| MaterializeError::Write {
		path: path.clone(),
		source,
	})?;
	trace!(path = %path.display(), "wrote resource");
	Ok(path)
}

/// Write both sides of a pair under the same file name.
pub fn write_pair(live_root: &Path, replaced_root: &Path, pair: &ResourcePair) -> Result<(), MaterializeError> {
	write_resource(live_root, &pair.identity, &pair.baseline)?;
	write_resource(replaced_root, &pair.identity, &pair.candidate)?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use manifest_filter::NormalizeContext;
	use serde_json::json;

	use super::*;

	fn configmap(data: &str) -> ManifestNode {
		json!({
			"apiVersion": "v1",
			"kind": "ConfigMap",
			"metadata": {"name": "cfg", "namespace": "default"},
			"data": {"key": data},
		})
		.into()
	}

	#[test]
	fn test_write_pair_same_name() {
		let live = tempfile::tempdir().unwrap();
		let replaced = tempfile::tempdir().unwrap();

		let pair = NormalizeContext::default()
			.pair(configmap("old"), configmap("new"))
			.unwrap()
			.unwrap();
		write_pair(live.path(), replaced.path(), &pair).unwrap();

		let live_file = live.path().join(".v1.ConfigMap.default.cfg");
		let replaced_file = replaced.path().join(".v1.ConfigMap.default.cfg");
		assert!(fs::read_to_string(live_file).unwrap().contains("key: old"));
		assert!(fs::read_to_string(replaced_file).unwrap().contains("key: new"));
	}

	#[test]
	fn test_truncates_existing_file() {
		let root = tempfile::tempdir().unwrap();
		let identity = ResourceIdentity::from_node(&configmap("x")).unwrap();
		fs::write(root.path().join(identity.file_name()), "x".repeat(4096)).unwrap();

		let path = write_resource(root.path(), &identity, &configmap("short")).unwrap();
		let written = fs::read_to_string(path).unwrap();
		assert!(written.len() < 4096);
		assert!(written.starts_with("apiVersion: v1\n"));
	}

	#[test]
	fn test_missing_root() {
		let identity = ResourceIdentity::from_node(&configmap("x")).unwrap();
		let err = write_resource(Path::new("/nonexistent/root"), &identity, &configmap("x")).unwrap_err();
		assert!(matches!(err, MaterializeError::Write { .. }), "{err:?}");
	}
}
