//! Dynamically typed manifest tree.
//!
//! Both Kubernetes objects and filter specifications are represented as
//! [`ManifestNode`] trees: a mapping, a sequence or a scalar. The type can be
//! read from any self-describing serde format (JSON from the API server, YAML
//! from manifests and configuration files) and written back out.

use std::fmt;

use indexmap::IndexMap;
use serde::{
	de::{self, MapAccess, SeqAccess, Visitor},
	Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Number;

/// Mapping with unique keys, preserving insertion order.
///
/// Equality ignores key order.
pub type Mapping = IndexMap<String, ManifestNode>;

/// Leaf value of a manifest tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
	Null,
	Bool(bool),
	Number(Number),
	String(String),
}

/// A node of a manifest tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ManifestNode {
	Scalar(Scalar),
	Mapping(Mapping),
	Sequence(Vec<ManifestNode>),
}

impl Default for ManifestNode {
	fn default() -> Self {
		Self::null()
	}
}

impl ManifestNode {
	pub fn null() -> Self {
		Self::Scalar(Scalar::Null)
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Scalar(Scalar::Null))
	}

	/// True for a mapping without keys or a sequence without elements.
	///
	/// Scalars, `null` included, are never empty.
	pub fn is_empty_container(&self) -> bool {
		match self {
			Self::Mapping(map) => map.is_empty(),
			Self::Sequence(seq) => seq.is_empty(),
			Self::Scalar(_) => false,
		}
	}

	pub fn as_mapping(&self) -> Option<&Mapping> {
		match self {
			Self::Mapping(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
		match self {
			Self::Mapping(map) => Some(map),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Scalar(Scalar::String(s)) => Some(s),
			_ => None,
		}
	}

	/// Look up a key of a mapping node.
	pub fn get(&self, key: &str) -> Option<&ManifestNode> {
		self.as_mapping()?.get(key)
	}

	pub fn get_mut(&mut self, key: &str) -> Option<&mut ManifestNode> {
		self.as_mapping_mut()?.get_mut(key)
	}

	/// Follow a path of mapping keys.
	pub fn get_path(&self, path: &[&str]) -> Option<&ManifestNode> {
		path.iter().try_fold(self, |node, key| node.get(key))
	}

	pub fn get_path_mut(&mut self, path: &[&str]) -> Option<&mut ManifestNode> {
		path.iter()
			.try_fold(self, |node, key| node.as_mapping_mut()?.get_mut(*key))
	}

	/// Remove the value at `path`, keeping the order of the remaining keys.
	///
	/// Returns `None` when any intermediate node is missing or not a mapping.
	pub fn remove_path(&mut self, path: &[&str]) -> Option<ManifestNode> {
		let (last, parent) = path.split_last()?;
		self.get_path_mut(parent)?
			.as_mapping_mut()?
			.shift_remove(*last)
	}

	/// Recursively sort mapping keys in byte order.
	pub fn sort_keys(self) -> Self {
		match self {
			Self::Mapping(map) => {
				let mut entries: Vec<_> = map
					.into_iter()
					.map(|(k, v)| (k, v.sort_keys()))
					.collect();
				entries.sort_by(|(a, _), (b, _)| a.cmp(b));
				Self::Mapping(entries.into_iter().collect())
			}
			Self::Sequence(seq) => Self::Sequence(seq.into_iter().map(Self::sort_keys).collect()),
			scalar @ Self::Scalar(_) => scalar,
		}
	}
}

impl From<Scalar> for ManifestNode {
	fn from(value: Scalar) -> Self {
		Self::Scalar(value)
	}
}

impl From<Mapping> for ManifestNode {
	fn from(value: Mapping) -> Self {
		Self::Mapping(value)
	}
}

impl From<Vec<ManifestNode>> for ManifestNode {
	fn from(value: Vec<ManifestNode>) -> Self {
		Self::Sequence(value)
	}
}

impl From<&str> for ManifestNode {
	fn from(value: &str) -> Self {
		Self::Scalar(Scalar::String(value.to_string()))
	}
}

impl From<String> for ManifestNode {
	fn from(value: String) -> Self {
		Self::Scalar(Scalar::String(value))
	}
}

impl From<bool> for ManifestNode {
	fn from(value: bool) -> Self {
		Self::Scalar(Scalar::Bool(value))
	}
}

impl From<i64> for ManifestNode {
	fn from(value: i64) -> Self {
		Self::Scalar(Scalar::Number(value.into()))
	}
}

impl From<serde_json::Value> for ManifestNode {
	fn from(value: serde_json::Value) -> Self {
		use serde_json::Value;
		match value {
			Value::Null => Self::null(),
			Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
			Value::Number(n) => Self::Scalar(Scalar::Number(n)),
			Value::String(s) => Self::Scalar(Scalar::String(s)),
			Value::Array(arr) => Self::Sequence(arr.into_iter().map(Self::from).collect()),
			Value::Object(obj) => {
				Self::Mapping(obj.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
			}
		}
	}
}

impl From<ManifestNode> for serde_json::Value {
	fn from(node: ManifestNode) -> Self {
		use serde_json::Value;
		match node {
			ManifestNode::Scalar(Scalar::Null) => Value::Null,
			ManifestNode::Scalar(Scalar::Bool(b)) => Value::Bool(b),
			ManifestNode::Scalar(Scalar::Number(n)) => Value::Number(n),
			ManifestNode::Scalar(Scalar::String(s)) => Value::String(s),
			ManifestNode::Sequence(seq) => Value::Array(seq.into_iter().map(Value::from).collect()),
			ManifestNode::Mapping(map) => {
				Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
			}
		}
	}
}

impl fmt::Display for Scalar {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Scalar::Null => write!(f, "null"),
			Scalar::Bool(b) => write!(f, "{b}"),
			Scalar::Number(n) => write!(f, "{n}"),
			Scalar::String(s) => write!(f, "{s}"),
		}
	}
}

impl Serialize for Scalar {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Scalar::Null => serializer.serialize_unit(),
			Scalar::Bool(b) => serializer.serialize_bool(*b),
			Scalar::Number(n) => n.serialize(serializer),
			Scalar::String(s) => serializer.serialize_str(s),
		}
	}
}

impl Serialize for ManifestNode {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			ManifestNode::Scalar(scalar) => scalar.serialize(serializer),
			ManifestNode::Mapping(map) => map.serialize(serializer),
			ManifestNode::Sequence(seq) => seq.serialize(serializer),
		}
	}
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
	type Value = ManifestNode;

	fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str("a manifest value")
	}

	fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
		Ok(v.into())
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
		Ok(v.into())
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
		Ok(ManifestNode::Scalar(Scalar::Number(v.into())))
	}

	fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
		Number::from_f64(v)
			.map(|n| ManifestNode::Scalar(Scalar::Number(n)))
			.ok_or_else(|| E::custom(format!("unsupported non-finite number {v}")))
	}

	fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
		Ok(v.into())
	}

	fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
		Ok(v.into())
	}

	fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
		Ok(ManifestNode::null())
	}

	fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
		Ok(ManifestNode::null())
	}

	fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
		ManifestNode::deserialize(deserializer)
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
		let mut seq = Vec::with_capacity(access.size_hint().unwrap_or(0));
		while let Some(item) = access.next_element()? {
			seq.push(item);
		}
		Ok(ManifestNode::Sequence(seq))
	}

	fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
		let mut map = Mapping::with_capacity(access.size_hint().unwrap_or(0));
		while let Some((MapKey(key), value)) = access.next_entry()? {
			map.insert(key, value);
		}
		Ok(ManifestNode::Mapping(map))
	}
}

impl<'de> Deserialize<'de> for ManifestNode {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(NodeVisitor)
	}
}

/// Mapping key; YAML allows non-string keys, which are stringified.
struct MapKey(String);

impl<'de> Deserialize<'de> for MapKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct KeyVisitor;

		impl Visitor<'_> for KeyVisitor {
			type Value = MapKey;

			fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str("a scalar mapping key")
			}

			fn visit_bool<E: de::Error>(self, v: bool) -> Result<MapKey, E> {
				Ok(MapKey(v.to_string()))
			}

			fn visit_i64<E: de::Error>(self, v: i64) -> Result<MapKey, E> {
				Ok(MapKey(v.to_string()))
			}

			fn visit_u64<E: de::Error>(self, v: u64) -> Result<MapKey, E> {
				Ok(MapKey(v.to_string()))
			}

			fn visit_f64<E: de::Error>(self, v: f64) -> Result<MapKey, E> {
				Ok(MapKey(v.to_string()))
			}

			fn visit_str<E: de::Error>(self, v: &str) -> Result<MapKey, E> {
				Ok(MapKey(v.to_string()))
			}

			fn visit_string<E: de::Error>(self, v: String) -> Result<MapKey, E> {
				Ok(MapKey(v))
			}

			fn visit_unit<E: de::Error>(self) -> Result<MapKey, E> {
				Ok(MapKey("null".to_string()))
			}
		}

		deserializer.deserialize_any(KeyVisitor)
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use serde_json::json;

	use super::*;

	#[test]
	fn test_json_conversion_keeps_shape() {
		let value = json!({
			"b": [1, -2, 1.5, "x", null, true],
			"a": {"nested": {}},
		});
		let node = ManifestNode::from(value.clone());

		let keys: Vec<_> = node.as_mapping().unwrap().keys().cloned().collect();
		assert_eq!(keys, vec!["b", "a"]);
		assert_eq!(serde_json::Value::from(node), value);
	}

	#[test]
	fn test_empty_container_predicate() {
		assert!(ManifestNode::Mapping(Mapping::new()).is_empty_container());
		assert!(ManifestNode::Sequence(Vec::new()).is_empty_container());
		assert!(!ManifestNode::null().is_empty_container());
		assert!(!ManifestNode::from("").is_empty_container());
		assert!(!ManifestNode::from(json!({"a": 1})).is_empty_container());
	}

	#[test]
	fn test_equality_ignores_key_order() {
		let a = ManifestNode::from(json!({"x": 1, "y": 2}));
		let b: ManifestNode = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn test_deserialize_yaml_with_non_string_keys() {
		let node: ManifestNode = serde_yaml_with_quirks::from_str(indoc! {"
			ports:
			  80: http
			  true: yes-key
			empty:
		"})
		.unwrap();

		assert_eq!(
			node.get_path(&["ports", "80"]).and_then(ManifestNode::as_str),
			Some("http")
		);
		assert!(node.get_path(&["ports", "true"]).is_some());
		assert!(node.get("empty").unwrap().is_null());
	}

	#[test]
	fn test_remove_path_keeps_order() {
		let mut node = ManifestNode::from(json!({
			"metadata": {"a": 1, "b": 2, "c": 3}
		}));

		assert_eq!(node.remove_path(&["metadata", "b"]), Some(ManifestNode::from(2_i64)));
		assert_eq!(node.remove_path(&["metadata", "missing"]), None);
		assert_eq!(node.remove_path(&["spec", "x"]), None);

		let keys: Vec<_> = node
			.get("metadata")
			.and_then(ManifestNode::as_mapping)
			.unwrap()
			.keys()
			.cloned()
			.collect();
		assert_eq!(keys, vec!["a", "c"]);
	}

	#[test]
	fn test_sort_keys_recurses() {
		let node = ManifestNode::from(json!({
			"z": [{"b": 1, "a": 2}],
			"a": {"d": 1, "c": 2},
		}))
		.sort_keys();

		let rendered = serde_json::to_string(&node).unwrap();
		assert_eq!(rendered, r#"{"a":{"c":2,"d":1},"z":[{"a":2,"b":1}]}"#);
	}
}
