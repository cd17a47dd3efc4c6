//! Per-resource normalization pipeline shared by the baseline and the
//! candidate side.

use crate::{
	filter::FieldFilter,
	identity::{IdentityError, ResourceIdentity},
	ignore::IgnoreSet,
	node::ManifestNode,
	strip::strip_noisy_fields,
};

/// Read-only settings built once per run and shared by every resource.
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
	pub ignore: IgnoreSet,
	pub filter: FieldFilter,
}

impl NormalizeContext {
	pub fn new(ignore: IgnoreSet, filter: FieldFilter) -> Self {
		Self { ignore, filter }
	}

	pub fn is_ignored(&self, identity: &ResourceIdentity) -> bool {
		self.ignore.contains(identity)
	}

	/// Strip server noise, then apply the user filter.
	pub fn normalize(&self, mut node: ManifestNode) -> ManifestNode {
		strip_noisy_fields(&mut node);
		self.filter.apply(node)
	}

	/// Pair a baseline with a candidate, or `None` when the resource type is
	/// ignored. The identity is taken from the candidate.
	pub fn pair(
		&self,
		baseline: ManifestNode,
		candidate: ManifestNode,
	) -> Result<Option<ResourcePair>, IdentityError> {
		let identity = ResourceIdentity::from_node(&candidate)?;
		if self.is_ignored(&identity) {
			return Ok(None);
		}
		Ok(Some(ResourcePair {
			identity,
			baseline: self.normalize(baseline),
			candidate: self.normalize(candidate),
		}))
	}
}

/// Normalized baseline and candidate trees of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePair {
	pub identity: ResourceIdentity,
	pub baseline: ManifestNode,
	pub candidate: ManifestNode,
}

impl ResourcePair {
	pub fn file_name(&self) -> String {
		self.identity.file_name()
	}

	pub fn is_unchanged(&self) -> bool {
		self.baseline == self.candidate
	}
}
