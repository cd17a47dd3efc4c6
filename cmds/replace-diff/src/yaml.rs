//! YAML rendering of normalized resources.

use manifest_filter::ManifestNode;
use tracing::instrument;

/// Serialize a resource with its keys sorted, so that the same object always
/// renders to the same bytes regardless of the order the server returned.
#[instrument(skip_all)]
pub fn to_yaml(node: &ManifestNode) -> Result<String, serde_saphyr::ser_error::Error> {
	let sorted = node.clone().sort_keys();

	let options = serde_saphyr::SerializerOptions {
		indent_step: 2,
		indent_array: Some(0),
		prefer_block_scalars: true,
		empty_map_as_braces: true,
		empty_array_as_brackets: true,
		line_width: None,
		quote_ambiguous_keys: true,
		quote_numeric_strings: true,
		..Default::default()
	};

	let mut output = String::new();
	serde_saphyr::to_fmt_writer_with_options(&mut output, &sorted, options)?;
	if !output.ends_with('\n') {
		output.push('\n');
	}
	Ok(output)
}
