//! Output directory holding the two trees handed to the diff step.

use std::{
	fs, io,
	path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error};

/// Prefix of the directory receiving the stored objects.
pub const LIVE_PREFIX: &str = "LIVE-";
/// Prefix of the directory receiving the dry-run replace results.
pub const REPLACED_PREFIX: &str = "REPLACED-";

#[derive(Debug, Error)]
pub enum WorkspaceError {
	#[error("removing stale output directory {path}")]
	Clear {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("creating output directory {path}")]
	Create {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

/// `<base>/LIVE-xxxx` and `<base>/REPLACED-xxxx`.
#[derive(Debug)]
pub struct OutputWorkspace {
	base: PathBuf,
	live: PathBuf,
	replaced: PathBuf,
}

impl OutputWorkspace {
	/// Recreate `base` from scratch and create both roots inside it.
	pub fn create(base: &Path) -> Result<Self, WorkspaceError> {
		match fs::remove_dir_all(base) {
			Ok(()) => debug!(path = %base.display(), "removed stale output directory"),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {}
			Err(source) => {
				return Err(WorkspaceError::Clear {
					path: base.to_path_buf(),
					source,
				})
			}
		}
		fs::create_dir_all(base).map_err(|source| WorkspaceError::Create {
			path: base.to_path_buf(),
			source,
		})?;

		let live = make_root(base, LIVE_PREFIX)?;
		let replaced = make_root(base, REPLACED_PREFIX)?;
		debug!(live = %live.display(), replaced = %replaced.display(), "created output roots");

		Ok(Self {
			base: base.to_path_buf(),
			live,
			replaced,
		})
	}

	pub fn base(&self) -> &Path {
		&self.base
	}

	/// Root for baseline (stored) objects.
	pub fn live(&self) -> &Path {
		&self.live
	}

	/// Root for candidate (dry-run replaced) objects.
	pub fn replaced(&self) -> &Path {
		&self.replaced
	}

	/// Remove the whole output directory. Failure is only logged.
	pub fn cleanup(self) {
		if let Err(e) = fs::remove_dir_all(&self.base) {
			error!(path = %self.base.display(), error = %e, "failed to remove output directory");
		}
	}
}

fn make_root(base: &Path, prefix: &str) -> Result<PathBuf, WorkspaceError> {
	tempfile::Builder::new()
		.prefix(prefix)
		.tempdir_in(base)
		.map(tempfile::TempDir::keep)
		.map_err(|source| WorkspaceError::Create {
			path: base.join(prefix),
			source,
		})
}
