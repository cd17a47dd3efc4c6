//! Kubernetes API access: connection, discovery, the object store the
//! baseline is read from and the dry-run replace producing the candidate.

pub mod client;
pub mod discovery;
pub mod replace;
pub mod store;

/// Kubernetes API resource scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
	/// Resource is namespaced (e.g., Deployment, ConfigMap).
	Namespaced,

	/// Resource is cluster-wide (e.g., Namespace, ClusterRole).
	ClusterWide,
}
