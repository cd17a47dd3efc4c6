//! Normalization of Kubernetes manifests before they are compared.
//!
//! A resource goes through [`strip_noisy_fields`], which removes
//! server-maintained metadata, and then through a user [`FieldFilter`].
//! Baseline and candidate trees are normalized independently with the same
//! [`NormalizeContext`] and written under the same
//! [`ResourceIdentity::file_name`].

pub mod config;
pub mod filter;
pub mod identity;
pub mod ignore;
pub mod node;
pub mod normalize;
pub mod strip;

pub use config::{ConfigError, ExtraConfig};
pub use filter::{filter_node, match_template, FieldFilter, TemplateMatch};
pub use identity::{split_api_version, GroupKind, IdentityError, ResourceIdentity};
pub use ignore::{IgnoreSet, KindResolver, ResolveError};
pub use node::{ManifestNode, Mapping, Scalar};
pub use normalize::{NormalizeContext, ResourcePair};
pub use strip::strip_noisy_fields;
