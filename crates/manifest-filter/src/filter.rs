//! Mask-driven field filter.
//!
//! A filter specification is a manifest tree laid over the resource tree:
//!
//! - on a mapping, a key whose mask is `null` or an empty container is
//!   deleted, a key with a non-empty mask is filtered recursively, and a key
//!   absent from the mask is kept unless its value is an empty container;
//! - on a sequence, the mask is a list of templates. A single-key scalar
//!   mapping template (`{name: sidecar}`) or a scalar template drops the
//!   matching elements, any other mapping template is applied as a nested
//!   mask to every element.
//!
//! Whenever the shapes of resource and mask disagree, the resource subtree is
//! returned untouched. Filtering never fails.

use crate::node::{ManifestNode, Scalar};

/// Outcome of testing one sequence element against one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateMatch {
	/// The element matches and is removed from the sequence.
	Drop,
	/// The template is a nested mask, filter the element with it.
	Recurse,
	/// The template does not apply to the element.
	Keep,
}

/// User-declared field filter, possibly absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldFilter {
	spec: Option<ManifestNode>,
}

impl FieldFilter {
	/// A filter that leaves every tree unchanged.
	pub fn none() -> Self {
		Self::default()
	}

	/// Wrap a filter specification. A `null` specification means no filter.
	pub fn new(spec: Option<ManifestNode>) -> Self {
		Self {
			spec: spec.filter(|spec| !spec.is_null()),
		}
	}

	pub fn spec(&self) -> Option<&ManifestNode> {
		self.spec.as_ref()
	}

	pub fn is_configured(&self) -> bool {
		self.spec.is_some()
	}

	/// Reduce `node` according to this filter.
	pub fn apply(&self, node: ManifestNode) -> ManifestNode {
		match &self.spec {
			Some(spec) => filter_node(node, spec),
			None => node,
		}
	}
}

/// Filter `source` with the mask `filter`.
pub fn filter_node(source: ManifestNode, filter: &ManifestNode) -> ManifestNode {
	match (source, filter) {
		(ManifestNode::Mapping(fields), ManifestNode::Mapping(mask)) => ManifestNode::Mapping(
			fields
				.into_iter()
				.filter_map(|(key, value)| {
					let value = match mask.get(&key) {
						None => value,
						Some(rule) if is_deletion(rule) => return None,
						Some(rule) => filter_node(value, rule),
					};
					(!value.is_empty_container()).then_some((key, value))
				})
				.collect(),
		),
		(ManifestNode::Sequence(elements), ManifestNode::Sequence(templates)) => {
			ManifestNode::Sequence(
				elements
					.into_iter()
					.filter_map(|element| filter_element(element, templates))
					.collect(),
			)
		}
		// Scalars, and shapes the mask does not describe, pass through.
		(source, _) => source,
	}
}

/// Run one sequence element through every template in order.
///
/// Returns `None` if a template matched. Recursing templates are applied
/// cumulatively: later templates see the already filtered element.
fn filter_element(mut element: ManifestNode, templates: &[ManifestNode]) -> Option<ManifestNode> {
	for template in templates {
		match match_template(&element, template) {
			TemplateMatch::Drop => return None,
			TemplateMatch::Recurse => element = filter_node(element, template),
			TemplateMatch::Keep => {}
		}
	}
	Some(element)
}

/// Test a sequence element against a template.
///
/// A mapping template only acts as a predicate when it has exactly one key
/// with a scalar value; the element matches when it has a scalar field of
/// that name equal to the value. Templates with zero or several keys, or
/// with a nested value, are masks. Predicates over several keys are not
/// evaluated as a conjunction.
pub fn match_template(element: &ManifestNode, template: &ManifestNode) -> TemplateMatch {
	match template {
		ManifestNode::Mapping(predicate) => {
			let mut entries = predicate.iter();
			let (Some((key, expected)), None) = (entries.next(), entries.next()) else {
				return TemplateMatch::Recurse;
			};
			let ManifestNode::Scalar(expected) = expected else {
				return TemplateMatch::Recurse;
			};
			match element {
				ManifestNode::Mapping(fields) if has_scalar_field(fields, key, expected) => {
					TemplateMatch::Drop
				}
				_ => TemplateMatch::Keep,
			}
		}
		ManifestNode::Sequence(_) => TemplateMatch::Keep,
		ManifestNode::Scalar(expected) => match element {
			ManifestNode::Scalar(actual) if actual == expected => TemplateMatch::Drop,
			_ => TemplateMatch::Keep,
		},
	}
}

fn has_scalar_field(fields: &crate::node::Mapping, key: &str, expected: &Scalar) -> bool {
	matches!(fields.get(key), Some(ManifestNode::Scalar(actual)) if actual == expected)
}

/// A mask value that deletes the field it is attached to.
fn is_deletion(rule: &ManifestNode) -> bool {
	rule.is_null() || rule.is_empty_container()
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;
	use serde_json::json;

	use super::*;

	fn node(value: serde_json::Value) -> ManifestNode {
		ManifestNode::from(value)
	}

	fn yaml(source: &str) -> ManifestNode {
		serde_yaml_with_quirks::from_str(source).unwrap()
	}

	#[test]
	fn test_absent_filter_is_identity() {
		let source = node(json!({"a": {}, "b": [], "c": null, "d": [1, {"e": 2}]}));
		assert_eq!(FieldFilter::none().apply(source.clone()), source);
		assert_eq!(FieldFilter::new(Some(ManifestNode::null())).apply(source.clone()), source);
		assert!(!FieldFilter::new(Some(ManifestNode::null())).is_configured());
	}

	#[rstest]
	#[case::null_deletes(json!({"a": null}), json!({"b": 2}))]
	#[case::empty_mapping_deletes(json!({"a": {}}), json!({"b": 2}))]
	#[case::empty_sequence_deletes(json!({"a": []}), json!({"b": 2}))]
	#[case::unknown_key_is_noop(json!({"z": null}), json!({"a": 1, "b": 2}))]
	#[case::scalar_rule_keeps_scalar(json!({"a": "whatever"}), json!({"a": 1, "b": 2}))]
	fn test_mapping_rules(#[case] filter: serde_json::Value, #[case] expected: serde_json::Value) {
		let result = filter_node(node(json!({"a": 1, "b": 2})), &node(filter));
		assert_eq!(result, node(expected));
	}

	#[test]
	fn test_recursion_prunes_emptied_mapping() {
		let result = filter_node(node(json!({"a": {"x": 1}})), &node(json!({"a": {"x": null}})));
		assert_eq!(result, node(json!({})));
	}

	#[test]
	fn test_unfiltered_empty_containers_are_dropped_but_null_is_kept() {
		let result = filter_node(
			node(json!({"a": {}, "b": [], "c": null, "d": 0, "e": ""})),
			&node(json!({"unrelated": null})),
		);
		assert_eq!(result, node(json!({"c": null, "d": 0, "e": ""})));
	}

	#[test]
	fn test_mapping_keeps_source_order() {
		let result = filter_node(
			node(json!({"c": 1, "a": 2, "b": 3, "d": 4})),
			&node(json!({"a": null})),
		);
		let keys: Vec<_> = result.as_mapping().unwrap().keys().cloned().collect();
		assert_eq!(keys, vec!["c", "b", "d"]);
	}

	#[rstest]
	#[case::match_drops(json!([{"name": "x"}]), json!([{"name": "y"}]))]
	#[case::no_match_passthrough(json!([{"name": "z"}]), json!([{"name": "x"}, {"name": "y"}]))]
	#[case::first_match_wins(
		json!([{"name": "x"}, {"name": "y"}]),
		json!([])
	)]
	#[case::raw_sequence_template_never_matches(
		json!([["name", "x"]]),
		json!([{"name": "x"}, {"name": "y"}])
	)]
	fn test_sequence_templates(#[case] filter: serde_json::Value, #[case] expected: serde_json::Value) {
		let source = node(json!([{"name": "x"}, {"name": "y"}]));
		assert_eq!(filter_node(source, &node(filter)), node(expected));
	}

	#[test]
	fn test_scalar_templates_match_by_value() {
		let source = node(json!(["a", 1, true, null, "b"]));
		let filter = node(json!(["a", 1, null]));
		assert_eq!(filter_node(source, &filter), node(json!([true, "b"])));
	}

	#[test]
	fn test_scalar_match_skips_nested_fields() {
		// `name` is compared only when it holds a scalar
		let source = node(json!([{"name": {"value": "x"}}, {"name": "x", "port": 80}]));
		let filter = node(json!([{"name": "x"}]));
		assert_eq!(
			filter_node(source, &filter),
			node(json!([{"name": {"value": "x"}}]))
		);
	}

	#[test]
	fn test_number_and_string_do_not_match() {
		let source = node(json!([{"port": 80}, {"port": "80"}]));
		let filter = node(json!([{"port": "80"}]));
		assert_eq!(filter_node(source, &filter), node(json!([{"port": 80}])));
	}

	#[test]
	fn test_single_key_null_template_is_a_predicate() {
		let source = node(json!([{"image": null, "name": "a"}, {"image": "x", "name": "b"}]));
		let filter = node(json!([{"image": null}]));
		assert_eq!(
			filter_node(source, &filter),
			node(json!([{"image": "x", "name": "b"}]))
		);
	}

	#[test]
	fn test_nested_template_recurses_into_every_element() {
		let source = yaml(indoc! {"
			- name: app
			  image: app:1
			  env:
			  - name: A
			    value: '1'
			  - name: B
			    value: '2'
			- name: sidecar
			  image: proxy:2
		"});
		// A lone `image:` would be a predicate matching `image: null`, the
		// second key turns the first template into a mask.
		let filter = yaml(indoc! {"
			- image:
			  command:
			- env:
			  - name: B
		"});

		let expected = yaml(indoc! {"
			- name: app
			  env:
			  - name: A
			    value: '1'
			- name: sidecar
		"});
		assert_eq!(filter_node(source, &filter), expected);
	}

	#[test]
	fn test_recursion_then_match_sees_filtered_element() {
		// The first template strips `name`, so the second can no longer match it.
		let source = node(json!([{"name": "x", "keep": 1}]));
		let filter = node(json!([{"name": null, "other": null}, {"name": "x"}]));
		assert_eq!(filter_node(source, &filter), node(json!([{"keep": 1}])));
	}

	#[test]
	fn test_multi_key_template_is_a_mask_not_a_conjunction() {
		let source = node(json!([
			{"name": "x", "kind": "a", "extra": 1},
			{"name": "y", "kind": "b"},
		]));
		let filter = node(json!([{"name": "x", "kind": "a"}]));

		// Scalar mask values keep scalar fields untouched; nothing is dropped.
		assert_eq!(filter_node(source.clone(), &filter), source);
	}

	#[test]
	fn test_emptied_sequence_prunes_parent_key() {
		let source = node(json!({"items": [{"name": "x"}], "other": 1}));
		let filter = node(json!({"items": [{"name": "x"}]}));
		assert_eq!(filter_node(source, &filter), node(json!({"other": 1})));
	}

	#[test]
	fn test_element_emptied_by_mask_is_kept() {
		let source = node(json!([{"a": 1}]));
		let filter = node(json!([{"a": null, "b": null}]));
		assert_eq!(filter_node(source, &filter), node(json!([{}])));
	}

	#[rstest]
	#[case::mapping_vs_sequence(json!({"a": 1}), json!([{"a": null}]))]
	#[case::mapping_vs_scalar(json!({"a": 1}), json!("a"))]
	#[case::sequence_vs_mapping(json!([1, 2]), json!({"a": null}))]
	#[case::sequence_vs_scalar(json!([1, 2]), json!(1))]
	#[case::scalar_vs_mapping(json!("a"), json!({"a": null}))]
	#[case::scalar_vs_sequence(json!(null), json!(["a"]))]
	fn test_shape_mismatch_fails_open(
		#[case] source: serde_json::Value,
		#[case] filter: serde_json::Value,
	) {
		let source = node(source);
		assert_eq!(filter_node(source.clone(), &node(filter)), source);
	}

	#[rstest]
	#[case::single_scalar_hit(json!({"name": "x"}), json!({"name": "x"}), TemplateMatch::Drop)]
	#[case::single_scalar_miss(json!({"name": "x"}), json!({"name": "y"}), TemplateMatch::Keep)]
	#[case::element_not_mapping(json!("x"), json!({"name": "x"}), TemplateMatch::Keep)]
	#[case::nested_mapping_value(json!({"name": "x"}), json!({"name": {"a": 1}}), TemplateMatch::Recurse)]
	#[case::nested_sequence_value(json!({"name": "x"}), json!({"name": [1]}), TemplateMatch::Recurse)]
	#[case::two_keys(json!({"a": 1, "b": 2}), json!({"a": 1, "b": 2}), TemplateMatch::Recurse)]
	#[case::zero_keys(json!({"a": 1}), json!({}), TemplateMatch::Recurse)]
	#[case::sequence_template(json!([1]), json!([1]), TemplateMatch::Keep)]
	#[case::scalar_equal(json!(3), json!(3), TemplateMatch::Drop)]
	#[case::scalar_different_type(json!(3), json!("3"), TemplateMatch::Keep)]
	fn test_match_template(
		#[case] element: serde_json::Value,
		#[case] template: serde_json::Value,
		#[case] expected: TemplateMatch,
	) {
		assert_eq!(match_template(&node(element), &node(template)), expected);
	}
}
