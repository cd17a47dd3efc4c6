//! Reading stored objects from the cluster.

use std::sync::Arc;

use kube::{
	api::{Api, DynamicObject},
	Client,
};
use manifest_filter::{ManifestNode, ResourceIdentity};
use thiserror::Error;
use tracing::instrument;

use super::{
	discovery::{ApiResourceCache, DiscoveredResource},
	ResourceScope,
};

#[derive(Debug, Error)]
pub enum FetchError {
	#[error("unknown resource type {api_version}/{kind}")]
	UnknownResourceType { api_version: String, kind: String },

	#[error("{resource} not found in cluster")]
	NotFound { resource: String },

	#[error("fetching {resource} from cluster")]
	Api {
		resource: String,
		#[source]
		source: Box<kube::Error>,
	},

	#[error("converting {resource} to a manifest tree")]
	Conversion {
		resource: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Dynamic access to any discovered resource type.
#[derive(Clone)]
pub struct ObjectStore {
	client: Client,
	api_cache: Arc<ApiResourceCache>,
}

impl ObjectStore {
	pub fn new(client: Client, api_cache: Arc<ApiResourceCache>) -> Self {
		Self { client, api_cache }
	}

	pub fn discovered(&self, identity: &ResourceIdentity) -> Result<&DiscoveredResource, FetchError> {
		self.api_cache
			.lookup_identity(identity)
			.ok_or_else(|| FetchError::UnknownResourceType {
				api_version: identity.api_version(),
				kind: identity.kind.clone(),
			})
	}

	/// Create a dynamic API for the resource's type, scoped to its namespace
	/// when the type is namespaced.
	pub fn dynamic_api(&self, identity: &ResourceIdentity) -> Result<Api<DynamicObject>, FetchError> {
		let discovered = self.discovered(identity)?;
		let ar = &discovered.api_resource;
		Ok(match discovered.scope {
			ResourceScope::Namespaced => Api::namespaced_with(self.client.clone(), &identity.namespace, ar),
			ResourceScope::ClusterWide => Api::all_with(self.client.clone(), ar),
		})
	}

	/// Fetch the stored object for `identity`.
	#[instrument(skip_all, fields(resource = %identity))]
	pub async fn get(&self, identity: &ResourceIdentity) -> Result<ManifestNode, FetchError> {
		let api = self.dynamic_api(identity)?;
		let object = api
			.get_opt(&identity.name)
			.await
			.map_err(|e| FetchError::Api {
				resource: identity.to_string(),
				source: Box::new(e),
			})?
			.ok_or_else(|| FetchError::NotFound {
				resource: identity.to_string(),
			})?;
		object_to_node(&object).map_err(|source| FetchError::Conversion {
			resource: identity.to_string(),
			source,
		})
	}
}

/// Convert an API object into a manifest tree.
pub fn object_to_node(object: &DynamicObject) -> Result<ManifestNode, serde_json::Error> {
	serde_json::to_value(object).map(ManifestNode::from)
}
