//! Mock Kubernetes API discovery types.

use std::collections::BTreeMap;

/// Discovery mode for the mock server.
#[derive(Debug, Clone, Copy, Default)]
pub enum DiscoveryMode {
	/// Support aggregated discovery (APIGroupDiscoveryList).
	#[default]
	Aggregated,
	/// Return 406 for aggregated discovery, forcing fallback to legacy endpoints.
	Legacy,
}

/// Pre-configured discovery responses.
///
/// `extensions/v1beta1` and `networking.k8s.io/v1` both serve `ingresses`,
/// and `v1` and `events.k8s.io/v1` both serve `events`, so name resolution
/// can be tested against real-world overlaps.
#[derive(Debug, Clone)]
pub struct MockDiscovery {
	pub core_resources: Vec<MockApiResource>,
	/// Keyed by group version (`apps/v1`).
	pub group_resources: BTreeMap<String, Vec<MockApiResource>>,
}

impl Default for MockDiscovery {
	fn default() -> Self {
		Self {
			core_resources: vec![
				MockApiResource::namespaced("configmaps", "ConfigMap"),
				MockApiResource::namespaced("secrets", "Secret"),
				MockApiResource::namespaced("services", "Service"),
				MockApiResource::namespaced("serviceaccounts", "ServiceAccount"),
				MockApiResource::namespaced("events", "Event"),
				MockApiResource::cluster_scoped("namespaces", "Namespace"),
			],
			group_resources: BTreeMap::from([
				(
					"apps/v1".to_string(),
					vec![
						MockApiResource::namespaced("deployments", "Deployment"),
						MockApiResource::namespaced("statefulsets", "StatefulSet"),
					],
				),
				(
					"events.k8s.io/v1".to_string(),
					vec![MockApiResource::namespaced("events", "Event")],
				),
				(
					"extensions/v1beta1".to_string(),
					vec![MockApiResource::namespaced("ingresses", "Ingress")],
				),
				(
					"networking.k8s.io/v1".to_string(),
					vec![MockApiResource::namespaced("ingresses", "Ingress")],
				),
				(
					"rbac.authorization.k8s.io/v1".to_string(),
					vec![MockApiResource::cluster_scoped("clusterroles", "ClusterRole")],
				),
			]),
		}
	}
}

impl MockDiscovery {
	/// Find the resource serving `kind` in `api_version`.
	pub fn find(&self, api_version: &str, kind: &str) -> Option<&MockApiResource> {
		if api_version.contains('/') {
			self.group_resources.get(api_version)?.iter().find(|r| r.kind == kind)
		} else if api_version == "v1" {
			self.core_resources.iter().find(|r| r.kind == kind)
		} else {
			None
		}
	}
}

/// A mock API resource definition.
#[derive(Debug, Clone)]
pub struct MockApiResource {
	pub name: String,
	pub singular_name: String,
	pub kind: String,
	pub namespaced: bool,
	pub verbs: Vec<String>,
}

impl MockApiResource {
	fn new(name: &str, kind: &str, namespaced: bool) -> Self {
		Self {
			name: name.to_string(),
			singular_name: kind.to_lowercase(),
			kind: kind.to_string(),
			namespaced,
			verbs: ["create", "delete", "get", "list", "patch", "update", "watch"]
				.map(String::from)
				.to_vec(),
		}
	}

	pub fn namespaced(name: &str, kind: &str) -> Self {
		Self::new(name, kind, true)
	}

	pub fn cluster_scoped(name: &str, kind: &str) -> Self {
		Self::new(name, kind, false)
	}

	pub fn scope(&self) -> &'static str {
		if self.namespaced {
			"Namespaced"
		} else {
			"Cluster"
		}
	}
}
