//! Reading the manifests to diff from a file, a directory or stdin.

use std::{
	fmt, fs,
	io::Read,
	path::{Path, PathBuf},
};

use manifest_filter::ManifestNode;
use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// File extensions picked up when the source is a directory.
const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Error)]
pub enum SourceError {
	#[error("reading {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("listing directory {path}")]
	Walk {
		path: PathBuf,
		#[source]
		source: walkdir::Error,
	},

	#[error("reading manifests from stdin")]
	Stdin(#[source] std::io::Error),

	#[error("parsing manifests from {origin}")]
	Parse {
		origin: String,
		#[source]
		source: serde_saphyr::Error,
	},
}

/// Where manifests come from, as given to `--filename`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
	Stdin,
	Path(PathBuf),
}

impl ManifestSource {
	pub fn from_arg(arg: &str) -> Self {
		if arg == "-" {
			Self::Stdin
		} else {
			Self::Path(PathBuf::from(arg))
		}
	}
}

impl fmt::Display for ManifestSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Stdin => write!(f, "<stdin>"),
			Self::Path(path) => write!(f, "{}", path.display()),
		}
	}
}

/// Read every manifest of the source, with `List` objects flattened.
#[instrument(skip(stdin), fields(source = %source))]
pub fn read_manifests(
	source: &ManifestSource,
	stdin: impl Read,
) -> Result<Vec<ManifestNode>, SourceError> {
	let mut manifests = Vec::new();
	match source {
		ManifestSource::Stdin => {
			let mut content = String::new();
			let mut stdin = stdin;
			stdin.read_to_string(&mut content).map_err(SourceError::Stdin)?;
			parse_documents(&content, &source.to_string(), &mut manifests)?;
		}
		ManifestSource::Path(path) if path.is_dir() => {
			for file in manifest_files(path)? {
				read_file(&file, &mut manifests)?;
			}
		}
		ManifestSource::Path(path) => read_file(path, &mut manifests)?,
	}
	debug!(count = manifests.len(), "read manifests");
	Ok(manifests)
}

/// Manifest files directly inside `dir`, sorted by name.
fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
	let mut files = Vec::new();
	for entry in WalkDir::new(dir)
		.min_depth(1)
		.max_depth(1)
		.sort_by_file_name()
	{
		let entry = entry.map_err(|source| SourceError::Walk {
			path: dir.to_path_buf(),
			source,
		})?;
		let is_manifest = entry
			.path()
			.extension()
			.and_then(|ext| ext.to_str())
			.is_some_and(|ext| MANIFEST_EXTENSIONS.contains(&ext));
		if entry.file_type().is_file() && is_manifest {
			files.push(entry.into_path());
		}
	}
	Ok(files)
}

fn read_file(path: &Path, out: &mut Vec<ManifestNode>) -> Result<(), SourceError> {
	let content = fs::read_to_string(path).map_err(|source| SourceError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	parse_documents(&content, &path.display().to_string(), out)
}

/// Parse a multi-document YAML (or JSON) stream.
fn parse_documents(
	content: &str,
	origin: &str,
	out: &mut Vec<ManifestNode>,
) -> Result<(), SourceError> {
	let options = serde_saphyr::Options {
		legacy_octal_numbers: true,
		budget: None,
		..Default::default()
	};
	let documents: Vec<ManifestNode> = serde_saphyr::from_multiple_with_options(content, options)
		.map_err(|source| SourceError::Parse {
			origin: origin.to_string(),
			source,
		})?;
	for document in documents {
		flatten_into(document, out);
	}
	Ok(())
}

/// Skip null documents and unpack `List` kinds (`v1/List`, `ConfigMapList`, ...).
fn flatten_into(document: ManifestNode, out: &mut Vec<ManifestNode>) {
	if document.is_null() {
		return;
	}
	let is_list = document
		.get("kind")
		.and_then(ManifestNode::as_str)
		.is_some_and(|kind| kind.ends_with("List"));
	if is_list {
		if let Some(ManifestNode::Sequence(_)) = document.get("items") {
			if let ManifestNode::Mapping(mut map) = document {
				if let Some(ManifestNode::Sequence(items)) = map.shift_remove("items") {
					for item in items {
						flatten_into(item, out);
					}
				}
			}
			return;
		}
	}
	out.push(document);
}

#[cfg(test)]
mod tests {
	use std::io;

	use indoc::indoc;

	use super::*;

	fn names(manifests: &[ManifestNode]) -> Vec<&str> {
		manifests
			.iter()
			.map(|m| m.get_path(&["metadata", "name"]).and_then(ManifestNode::as_str).unwrap())
			.collect()
	}

	#[test]
	fn test_multi_document_with_empty_documents() {
		let manifests = read_manifests(
			&ManifestSource::Stdin,
			io::Cursor::new(indoc! {"
				---
				apiVersion: v1
				kind: ConfigMap
				metadata:
				  name: a
				---
				---
				apiVersion: v1
				kind: Secret
				metadata:
				  name: b
			"}),
		)
		.unwrap();
		assert_eq!(names(&manifests), ["a", "b"]);
	}

	#[test]
	fn test_list_is_flattened() {
		let manifests = read_manifests(
			&ManifestSource::Stdin,
			io::Cursor::new(indoc! {"
				apiVersion: v1
				kind: List
				items:
				  - apiVersion: v1
				    kind: ConfigMap
				    metadata:
				      name: a
				  - apiVersion: v1
				    kind: ConfigMapList
				    items:
				      - apiVersion: v1
				        kind: ConfigMap
				        metadata:
				          name: b
			"}),
		)
		.unwrap();
		assert_eq!(names(&manifests), ["a", "b"]);
	}

	#[test]
	fn test_directory_is_sorted_and_filtered() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(
			dir.path().join("b.yaml"),
			"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: second\n",
		)
		.unwrap();
		fs::write(
			dir.path().join("a.json"),
			r#"{"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "first"}}"#,
		)
		.unwrap();
		fs::write(dir.path().join("notes.txt"), "not a manifest").unwrap();
		fs::create_dir(dir.path().join("nested.yaml")).unwrap();

		let source = ManifestSource::Path(dir.path().to_path_buf());
		let manifests = read_manifests(&source, io::empty()).unwrap();
		assert_eq!(names(&manifests), ["first", "second"]);
	}

	#[test]
	fn test_missing_file() {
		let source = ManifestSource::from_arg("/nonexistent/manifest.yaml");
		let err = read_manifests(&source, io::empty()).unwrap_err();
		assert!(matches!(err, SourceError::Read { .. }), "{err:?}");
	}

	#[test]
	fn test_from_arg() {
		assert_eq!(ManifestSource::from_arg("-"), ManifestSource::Stdin);
		assert_eq!(
			ManifestSource::from_arg("deploy/"),
			ManifestSource::Path(PathBuf::from("deploy/"))
		);
	}
}
