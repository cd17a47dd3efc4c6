//! Kubernetes API resource discovery and caching.
//!
//! The cache maps every served group/version/kind to its REST resource and
//! scope. It backs the REST mapping for GET and PUT requests and the
//! resolution of `ignoreResources` names.
//!
//! A name served by several groups resolves the way kubectl's priority REST
//! mapper does: the core group first, then groups in the order the server
//! lists them.

use std::collections::{BTreeSet, HashMap};

use kube::{
	core::GroupVersionKind,
	discovery::{ApiResource, Scope},
	Client, Discovery,
};
use manifest_filter::{GroupKind, KindResolver, ResolveError, ResourceIdentity};
use thiserror::Error;
use tracing::instrument;

use super::ResourceScope;

/// Errors that can occur during API resource discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
	#[error("full API discovery failed")]
	FullDiscovery(#[source] kube::Error),
}

/// Discovered API resource with its scope.
#[derive(Debug, Clone)]
pub struct DiscoveredResource {
	/// The kube ApiResource for making API calls.
	pub api_resource: ApiResource,
	/// Whether this resource is namespaced or cluster-wide.
	pub scope: ResourceScope,
}

/// Cached API resource discovery results.
#[derive(Debug, Clone, Default)]
pub struct ApiResourceCache {
	resources: HashMap<GroupVersionKind, DiscoveredResource>,
	/// Non-core groups in server preference order.
	group_priority: Vec<String>,
}

impl ApiResourceCache {
	/// Build the cache by querying the cluster's discovery API.
	///
	/// Uses the Aggregated Discovery API (K8s 1.26+) which requires only 2 API
	/// calls, and falls back to full discovery on older clusters.
	#[instrument(skip_all)]
	pub async fn build(client: &Client) -> Result<Self, DiscoveryError> {
		let mut cache = match Discovery::new(client.clone()).run_aggregated().await {
			Ok(discovery) => {
				tracing::debug!("using aggregated discovery");
				Self::from_discovery(&discovery)
			}
			Err(e) => {
				tracing::debug!(error = %e, "aggregated discovery not available, using full discovery");
				let discovery = Discovery::new(client.clone())
					.run()
					.await
					.map_err(DiscoveryError::FullDiscovery)?;
				Self::from_discovery(&discovery)
			}
		};

		// kube's Discovery does not keep the server's group order.
		match client.list_api_groups().await {
			Ok(list) => cache.set_group_priority(list.groups.into_iter().map(|g| g.name)),
			Err(e) => tracing::debug!(error = %e, "no API group order, falling back to alphabetical"),
		}
		Ok(cache)
	}

	fn from_discovery(discovery: &Discovery) -> Self {
		let mut cache = Self::default();
		for group in discovery.groups() {
			// All versions, not just the preferred one, so manifests pinned to
			// an older version still map.
			for ver in group.versions() {
				for (ar, caps) in group.versioned_resources(ver) {
					let scope = match caps.scope {
						Scope::Namespaced => ResourceScope::Namespaced,
						Scope::Cluster => ResourceScope::ClusterWide,
					};
					cache.insert(ar, scope);
				}
			}
		}
		tracing::debug!(resources = cache.resources.len(), "discovered API resources");
		cache
	}

	/// Set the order in which groups win when a resource name is served by
	/// several of them. Unlisted groups come last, alphabetically.
	pub fn set_group_priority(&mut self, groups: impl IntoIterator<Item = String>) {
		self.group_priority = groups.into_iter().collect();
	}

	fn group_rank(&self, group: &str) -> usize {
		if group.is_empty() {
			return 0;
		}
		self.group_priority
			.iter()
			.position(|g| g == group)
			.map_or(usize::MAX, |i| i + 1)
	}

	pub fn insert(&mut self, api_resource: ApiResource, scope: ResourceScope) {
		let gvk = GroupVersionKind::gvk(&api_resource.group, &api_resource.version, &api_resource.kind);
		self.resources.insert(gvk, DiscoveredResource { api_resource, scope });
	}

	/// Look up a resource by its GroupVersionKind.
	pub fn lookup(&self, gvk: &GroupVersionKind) -> Option<&DiscoveredResource> {
		self.resources.get(gvk)
	}

	pub fn lookup_identity(&self, identity: &ResourceIdentity) -> Option<&DiscoveredResource> {
		self.lookup(&GroupVersionKind::gvk(&identity.group, &identity.version, &identity.kind))
	}

	pub fn len(&self) -> usize {
		self.resources.len()
	}

	pub fn is_empty(&self) -> bool {
		self.resources.is_empty()
	}
}

impl KindResolver for ApiResourceCache {
	/// Accepts `deployments`, `deployment`, `Deployment` and
	/// `deployments.apps`. A name served by several groups resolves to the
	/// highest priority one.
	fn resolve(&self, resource: &str) -> Result<GroupKind, ResolveError> {
		let wanted = resource.to_lowercase();
		let names_resource = |ar: &ApiResource, name: &str| {
			ar.plural == name || ar.kind.to_lowercase() == name
		};

		let mut matches: BTreeSet<GroupKind> = BTreeSet::new();
		for discovered in self.resources.values() {
			let ar = &discovered.api_resource;
			let hit = names_resource(ar, &wanted)
				|| wanted
					.split_once('.')
					.is_some_and(|(name, group)| group == ar.group && names_resource(ar, name));
			if hit {
				matches.insert(GroupKind::new(&ar.group, &ar.kind));
			}
		}

		if matches.len() > 1 {
			tracing::debug!(
				resource,
				candidates = ?matches.iter().map(ToString::to_string).collect::<Vec<_>>(),
				"resource name served by several groups, using the preferred one"
			);
		}
		matches
			.into_iter()
			.min_by(|a, b| {
				self.group_rank(&a.group)
					.cmp(&self.group_rank(&b.group))
					.then_with(|| a.cmp(b))
			})
			.ok_or_else(|| ResolveError::Unknown(resource.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;

	use super::*;

	fn cache() -> ApiResourceCache {
		let mut cache = ApiResourceCache::default();
		for (group, version, kind, plural, scope) in [
			("", "v1", "ConfigMap", "configmaps", ResourceScope::Namespaced),
			("", "v1", "Namespace", "namespaces", ResourceScope::ClusterWide),
			("", "v1", "Event", "events", ResourceScope::Namespaced),
			("events.k8s.io", "v1", "Event", "events", ResourceScope::Namespaced),
			("apps", "v1", "Deployment", "deployments", ResourceScope::Namespaced),
			("extensions", "v1beta1", "Ingress", "ingresses", ResourceScope::Namespaced),
			("networking.k8s.io", "v1", "Ingress", "ingresses", ResourceScope::Namespaced),
		] {
			let gvk = GroupVersionKind::gvk(group, version, kind);
			cache.insert(ApiResource::from_gvk_with_plural(&gvk, plural), scope);
		}
		cache
	}

	#[rstest]
	#[case::plural("deployments", GroupKind::new("apps", "Deployment"))]
	#[case::singular("deployment", GroupKind::new("apps", "Deployment"))]
	#[case::kind("Deployment", GroupKind::new("apps", "Deployment"))]
	#[case::plural_group("deployments.apps", GroupKind::new("apps", "Deployment"))]
	#[case::dotted_group("ingresses.networking.k8s.io", GroupKind::new("networking.k8s.io", "Ingress"))]
	#[case::core_wins("events", GroupKind::new("", "Event"))]
	#[case::explicit_group("events.events.k8s.io", GroupKind::new("events.k8s.io", "Event"))]
	#[case::cluster_scoped("namespaces", GroupKind::new("", "Namespace"))]
	fn test_resolve(#[case] name: &str, #[case] expected: GroupKind) {
		assert_eq!(cache().resolve(name), Ok(expected));
	}

	#[test]
	fn test_resolve_unknown() {
		assert_eq!(
			cache().resolve("widgets"),
			Err(ResolveError::Unknown("widgets".into()))
		);
		assert_matches!(cache().resolve("deployments.extensions"), Err(ResolveError::Unknown(_)));
	}

	#[test]
	fn test_resolve_follows_group_priority() {
		let mut cache = cache();
		assert_eq!(cache.resolve("ingresses"), Ok(GroupKind::new("extensions", "Ingress")));

		cache.set_group_priority(["apps", "networking.k8s.io", "extensions"].map(String::from));
		assert_eq!(cache.resolve("ingresses"), Ok(GroupKind::new("networking.k8s.io", "Ingress")));
		assert_eq!(cache.resolve("Ingress"), Ok(GroupKind::new("networking.k8s.io", "Ingress")));
		// The core group stays first whatever the listed order.
		cache.set_group_priority(["events.k8s.io"].map(String::from));
		assert_eq!(cache.resolve("events"), Ok(GroupKind::new("", "Event")));
	}

	#[test]
	fn test_lookup_identity() {
		let cache = cache();
		let identity = ResourceIdentity {
			group: "extensions".into(),
			version: "v1beta1".into(),
			kind: "Ingress".into(),
			namespace: "default".into(),
			name: "web".into(),
		};
		let found = cache.lookup_identity(&identity).unwrap();
		assert_eq!(found.api_resource.plural, "ingresses");
		assert_eq!(found.scope, ResourceScope::Namespaced);

		let missing = ResourceIdentity {
			version: "v2".into(),
			..identity
		};
		assert!(cache.lookup_identity(&missing).is_none());
	}
}
