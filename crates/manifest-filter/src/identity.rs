//! Resource identity derived from `apiVersion`, `kind` and `metadata`.

use std::fmt;

use thiserror::Error;

use crate::node::ManifestNode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
	#[error("manifest missing apiVersion")]
	MissingApiVersion,

	#[error("manifest missing kind")]
	MissingKind,

	#[error("manifest missing metadata.name")]
	MissingName,
}

/// API group and kind, the unit resources are ignored by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
	pub group: String,
	pub kind: String,
}

impl GroupKind {
	pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
		Self {
			group: group.into(),
			kind: kind.into(),
		}
	}
}

impl fmt::Display for GroupKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.group.is_empty() {
			write!(f, "{}", self.kind)
		} else {
			write!(f, "{}.{}", self.kind, self.group)
		}
	}
}

/// Identifies one resource instance.
///
/// Cluster-scoped resources have an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
	pub group: String,
	pub version: String,
	pub kind: String,
	pub namespace: String,
	pub name: String,
}

/// Split an `apiVersion` into group and version; the core group is empty.
pub fn split_api_version(api_version: &str) -> (&str, &str) {
	api_version.split_once('/').unwrap_or(("", api_version))
}

impl ResourceIdentity {
	pub fn from_node(node: &ManifestNode) -> Result<Self, IdentityError> {
		let api_version = node
			.get("apiVersion")
			.and_then(ManifestNode::as_str)
			.ok_or(IdentityError::MissingApiVersion)?;
		let kind = node
			.get("kind")
			.and_then(ManifestNode::as_str)
			.ok_or(IdentityError::MissingKind)?;
		let name = node
			.get_path(&["metadata", "name"])
			.and_then(ManifestNode::as_str)
			.ok_or(IdentityError::MissingName)?;
		let namespace = node
			.get_path(&["metadata", "namespace"])
			.and_then(ManifestNode::as_str)
			.unwrap_or_default();

		let (group, version) = split_api_version(api_version);
		Ok(Self {
			group: group.to_string(),
			version: version.to_string(),
			kind: kind.to_string(),
			namespace: namespace.to_string(),
			name: name.to_string(),
		})
	}

	pub fn group_kind(&self) -> GroupKind {
		GroupKind::new(&self.group, &self.kind)
	}

	pub fn api_version(&self) -> String {
		if self.group.is_empty() {
			self.version.clone()
		} else {
			format!("{}/{}", self.group, self.version)
		}
	}

	/// Output file name: `group.version.kind.namespace.name`.
	///
	/// The group is always present, so core resources start with a dot
	/// (`.v1.ConfigMap.default.cfg`) and cluster-scoped ones have two
	/// consecutive dots before the name.
	pub fn file_name(&self) -> String {
		format!(
			"{}.{}.{}.{}.{}",
			self.group, self.version, self.kind, self.namespace, self.name
		)
	}
}

impl fmt::Display for ResourceIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.namespace.is_empty() {
			write!(f, "{}/{}", self.kind, self.name)
		} else {
			write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
		}
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	#[rstest]
	#[case::core("v1", "ConfigMap", Some("default"), "cfg", ".v1.ConfigMap.default.cfg")]
	#[case::grouped("apps/v1", "Deployment", Some("kube-system"), "coredns", "apps.v1.Deployment.kube-system.coredns")]
	#[case::cluster_scoped("v1", "Namespace", None, "production", ".v1.Namespace..production")]
	#[case::dotted_group(
		"cloud.grafana.net/v1alpha1",
		"AccessPolicy",
		Some("tokens"),
		"p",
		"cloud.grafana.net.v1alpha1.AccessPolicy.tokens.p"
	)]
	fn test_file_name(
		#[case] api_version: &str,
		#[case] kind: &str,
		#[case] namespace: Option<&str>,
		#[case] name: &str,
		#[case] expected: &str,
	) {
		let mut manifest = json!({
			"apiVersion": api_version,
			"kind": kind,
			"metadata": {"name": name},
		});
		if let Some(ns) = namespace {
			manifest["metadata"]["namespace"] = json!(ns);
		}

		let identity = ResourceIdentity::from_node(&manifest.into()).unwrap();
		assert_eq!(identity.file_name(), expected);
		assert_eq!(identity.api_version(), api_version);
	}

	#[test]
	fn test_group_split() {
		let identity = ResourceIdentity::from_node(
			&json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {"name": "a", "namespace": "ns"}}).into(),
		)
		.unwrap();

		assert_eq!(identity.group_kind(), GroupKind::new("apps", "Deployment"));
		assert_eq!(identity.version, "v1");
		assert_eq!(identity.to_string(), "Deployment/ns/a");
	}

	#[test]
	fn test_missing_fields() {
		assert_matches!(
			ResourceIdentity::from_node(&json!({"kind": "X", "metadata": {"name": "a"}}).into()),
			Err(IdentityError::MissingApiVersion)
		);
		assert_matches!(
			ResourceIdentity::from_node(&json!({"apiVersion": "v1", "metadata": {"name": "a"}}).into()),
			Err(IdentityError::MissingKind)
		);
		assert_matches!(
			ResourceIdentity::from_node(&json!({"apiVersion": "v1", "kind": "X"}).into()),
			Err(IdentityError::MissingName)
		);
	}

	#[test]
	fn test_same_identity_for_baseline_and_candidate() {
		let baseline = json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "s", "namespace": "a", "uid": "1"}});
		let candidate = json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"namespace": "a", "name": "s"}, "data": {}});
		assert_eq!(
			ResourceIdentity::from_node(&baseline.into()).unwrap(),
			ResourceIdentity::from_node(&candidate.into()).unwrap()
		);
	}
}
