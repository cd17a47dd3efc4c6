//! Resolution of user supplied resource type names into the set of
//! group/kinds excluded from comparison.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, error};

use crate::identity::{GroupKind, ResourceIdentity};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
	#[error("the server doesn't have a resource type {0:?}")]
	Unknown(String),
}

/// Maps a resource type name (`deployments`, `deployment`, `Deployment`,
/// `deployments.apps`) to the group/kind it denotes.
pub trait KindResolver {
	fn resolve(&self, resource: &str) -> Result<GroupKind, ResolveError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
	kinds: HashSet<GroupKind>,
}

impl IgnoreSet {
	/// Resolve every name, logging and dropping those that fail.
	pub fn resolve<I, S>(names: I, resolver: &dyn KindResolver) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let mut kinds = HashSet::new();
		for name in names {
			let name = name.as_ref();
			match resolver.resolve(name) {
				Ok(gk) => {
					debug!(resource = name, group_kind = %gk, "ignoring resource type");
					kinds.insert(gk);
				}
				Err(e) => error!(resource = name, error = %e, "failed to resolve ignored resource type"),
			}
		}
		Self { kinds }
	}

	pub fn len(&self) -> usize {
		self.kinds.len()
	}

	pub fn is_empty(&self) -> bool {
		self.kinds.is_empty()
	}

	pub fn contains_kind(&self, gk: &GroupKind) -> bool {
		self.kinds.contains(gk)
	}

	pub fn contains(&self, identity: &ResourceIdentity) -> bool {
		self.contains_kind(&identity.group_kind())
	}
}

impl FromIterator<GroupKind> for IgnoreSet {
	fn from_iter<T: IntoIterator<Item = GroupKind>>(iter: T) -> Self {
		Self {
			kinds: iter.into_iter().collect(),
		}
	}
}
