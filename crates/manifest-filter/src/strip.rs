//! Removal of fields that always differ between a stored object and a
//! dry-run replace of the same manifest.

use crate::node::ManifestNode;

/// Metadata fields maintained by the API server.
const SERVER_METADATA_FIELDS: &[&str] = &["managedFields", "generation"];

/// Annotations written by controllers and by `kubectl apply`.
const NOISY_ANNOTATIONS: &[&str] = &[
	"deployment.kubernetes.io/revision",
	"kubectl.kubernetes.io/last-applied-configuration",
];

/// Strip server-generated noise from a resource in place.
///
/// Removes `metadata.managedFields`, `metadata.generation` and the
/// revision and last-applied annotations. `metadata.annotations` goes away
/// once nothing is left in it. ServiceAccounts also lose `secrets`, which
/// the token controller fills in. Idempotent.
pub fn strip_noisy_fields(node: &mut ManifestNode) {
	for field in SERVER_METADATA_FIELDS {
		node.remove_path(&["metadata", *field]);
	}
	for annotation in NOISY_ANNOTATIONS {
		node.remove_path(&["metadata", "annotations", *annotation]);
	}

	let annotations_left = node
		.get_path(&["metadata", "annotations"])
		.is_some_and(|annotations| !(annotations.is_null() || annotations.is_empty_container()));
	if !annotations_left {
		node.remove_path(&["metadata", "annotations"]);
	}

	if node.get("kind").and_then(ManifestNode::as_str) == Some("ServiceAccount") {
		node.remove_path(&["secrets"]);
	}
}
