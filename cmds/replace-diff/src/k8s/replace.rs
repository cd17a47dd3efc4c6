//! Server-side dry-run replace.
//!
//! Sends each manifest as a full `PUT` with `dryRun=All`, so the response is
//! the object the server would store after admission, defaulting and
//! mutation, without persisting it.

use kube::api::{DynamicObject, PostParams};
use manifest_filter::{IdentityError, ManifestNode, ResourceIdentity};
use thiserror::Error;
use tracing::instrument;

use super::{
	store::{object_to_node, FetchError, ObjectStore},
	ResourceScope,
};

/// Namespace applied to namespaced manifests without `metadata.namespace`.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Error)]
pub enum ReplaceError {
	#[error(transparent)]
	Identity(#[from] IdentityError),

	#[error(transparent)]
	Mapping(#[from] FetchError),

	#[error("converting {resource} to an API object")]
	ManifestConversion {
		resource: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("dry-run replace of {resource}")]
	DryRun {
		resource: String,
		#[source]
		source: Box<kube::Error>,
	},
}

#[derive(Clone)]
pub struct DryRunReplacer {
	store: ObjectStore,
	default_namespace: String,
}

impl DryRunReplacer {
	pub fn new(store: ObjectStore) -> Self {
		Self {
			store,
			default_namespace: DEFAULT_NAMESPACE.to_string(),
		}
	}

	pub fn store(&self) -> &ObjectStore {
		&self.store
	}

	/// Fill in the namespace of a namespaced manifest that has none, and
	/// derive its identity.
	pub fn prepare(&self, mut manifest: ManifestNode) -> Result<(ResourceIdentity, ManifestNode), ReplaceError> {
		let mut identity = ResourceIdentity::from_node(&manifest)?;
		let scope = self.store.discovered(&identity)?.scope;
		if scope == ResourceScope::Namespaced && identity.namespace.is_empty() {
			if let Some(metadata) = manifest.get_mut("metadata").and_then(ManifestNode::as_mapping_mut) {
				metadata.insert("namespace".to_string(), self.default_namespace.as_str().into());
			}
			identity.namespace.clone_from(&self.default_namespace);
		}
		Ok((identity, manifest))
	}

	/// Dry-run replace `manifest` over the stored `live` object and return
	/// the server's answer.
	///
	/// A manifest without `metadata.resourceVersion` takes the live one, so
	/// the replace overwrites whatever is stored.
	#[instrument(skip_all, fields(resource = %identity))]
	pub async fn replace(
		&self,
		identity: &ResourceIdentity,
		mut manifest: ManifestNode,
		live: &ManifestNode,
	) -> Result<ManifestNode, ReplaceError> {
		copy_resource_version(&mut manifest, live);

		let object: DynamicObject = serde_json::from_value(manifest.into()).map_err(|source| {
			ReplaceError::ManifestConversion {
				resource: identity.to_string(),
				source,
			}
		})?;

		let api = self.store.dynamic_api(identity)?;
		let params = PostParams {
			dry_run: true,
			..Default::default()
		};
		let replaced = api
			.replace(&identity.name, &params, &object)
			.await
			.map_err(|e| ReplaceError::DryRun {
				resource: identity.to_string(),
				source: Box::new(e),
			})?;

		object_to_node(&replaced).map_err(|source| ReplaceError::ManifestConversion {
			resource: identity.to_string(),
			source,
		})
	}
}

/// Copy `metadata.resourceVersion` from `live` unless the manifest pins one.
fn copy_resource_version(manifest: &mut ManifestNode, live: &ManifestNode) {
	let pinned = manifest
		.get_path(&["metadata", "resourceVersion"])
		.and_then(ManifestNode::as_str)
		.is_some_and(|rv| !rv.is_empty());
	if pinned {
		return;
	}
	let Some(live_version) = live.get_path(&["metadata", "resourceVersion"]).cloned() else {
		return;
	};
	if let Some(metadata) = manifest.get_mut("metadata").and_then(ManifestNode::as_mapping_mut) {
		metadata.insert("resourceVersion".to_string(), live_version);
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_copy_resource_version() {
		let live = ManifestNode::from(json!({"metadata": {"name": "a", "resourceVersion": "42"}}));

		let mut manifest = ManifestNode::from(json!({"metadata": {"name": "a"}}));
		copy_resource_version(&mut manifest, &live);
		assert_eq!(
			manifest.get_path(&["metadata", "resourceVersion"]).and_then(ManifestNode::as_str),
			Some("42")
		);

		let mut pinned = ManifestNode::from(json!({"metadata": {"name": "a", "resourceVersion": "7"}}));
		copy_resource_version(&mut pinned, &live);
		assert_eq!(
			pinned.get_path(&["metadata", "resourceVersion"]).and_then(ManifestNode::as_str),
			Some("7")
		);

		let mut empty = ManifestNode::from(json!({"metadata": {"name": "a", "resourceVersion": ""}}));
		copy_resource_version(&mut empty, &live);
		assert_eq!(
			empty.get_path(&["metadata", "resourceVersion"]).and_then(ManifestNode::as_str),
			Some("42")
		);
	}

	#[test]
	fn test_copy_resource_version_without_live_version() {
		let mut manifest = ManifestNode::from(json!({"metadata": {"name": "a"}}));
		copy_resource_version(&mut manifest, &ManifestNode::from(json!({"metadata": {}})));
		assert_eq!(manifest, ManifestNode::from(json!({"metadata": {"name": "a"}})));
	}
}
