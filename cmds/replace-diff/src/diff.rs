//! Comparing the two output roots.
//!
//! By default an external `diff -u -N` does the work. The builtin renderer
//! produces the same unified format in process, for systems without a
//! `diff` binary, and can colorize it.

use std::{
	collections::BTreeSet,
	fs, io,
	io::Write,
	path::{Path, PathBuf},
	process::{Command, ExitStatus},
};

use similar::TextDiff;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::output::{diff_line_style, ColorMode};

/// Default external diff program.
pub const DEFAULT_DIFF_PROGRAM: &str = "diff";

#[derive(Debug, Error)]
pub enum DiffError {
	#[error("running `{program}`")]
	Spawn {
		program: String,
		#[source]
		source: io::Error,
	},

	#[error("`{program}` exited with {status}: {stderr}")]
	Failed {
		program: String,
		status: ExitStatus,
		stderr: String,
	},

	#[error("reading {path}")]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	#[error("writing diff output")]
	Write(#[source] io::Error),
}

/// How the roots are compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffTool {
	External { program: String },
	Builtin { color: ColorMode },
}

impl Default for DiffTool {
	fn default() -> Self {
		Self::External {
			program: DEFAULT_DIFF_PROGRAM.to_string(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOutcome {
	pub has_differences: bool,
}

impl DiffTool {
	/// Compare `live` against `replaced` and write the report to `out`.
	#[instrument(skip(self, out), fields(live = %live.display(), replaced = %replaced.display()))]
	pub fn run(&self, live: &Path, replaced: &Path, out: &mut dyn Write) -> Result<DiffOutcome, DiffError> {
		match self {
			Self::External { program } => run_external(program, live, replaced, out),
			Self::Builtin { color } => run_builtin(live, replaced, color.should_colorize(), out),
		}
	}
}

/// `program -u -N live replaced`. Exit status 1 means "differences found";
/// any failure only counts when the program wrote to stderr.
fn run_external(program: &str, live: &Path, replaced: &Path, out: &mut dyn Write) -> Result<DiffOutcome, DiffError> {
	let output = Command::new(program)
		.arg("-u")
		.arg("-N")
		.arg(live)
		.arg(replaced)
		.output()
		.map_err(|source| DiffError::Spawn {
			program: program.to_string(),
			source,
		})?;

	if !output.status.success() && !output.stderr.is_empty() {
		return Err(DiffError::Failed {
			program: program.to_string(),
			status: output.status,
			stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
		});
	}
	debug!(status = %output.status, "external diff finished");

	out.write_all(&output.stdout).map_err(DiffError::Write)?;
	Ok(DiffOutcome {
		has_differences: output.status.code() == Some(1) || !output.stdout.is_empty(),
	})
}

fn run_builtin(live: &Path, replaced: &Path, colorize: bool, out: &mut dyn Write) -> Result<DiffOutcome, DiffError> {
	let mut names = file_names(live)?;
	names.extend(file_names(replaced)?);

	let mut has_differences = false;
	for name in names {
		let live_path = live.join(&name);
		let replaced_path = replaced.join(&name);
		let before = read_or_empty(&live_path)?;
		let after = read_or_empty(&replaced_path)?;
		if before == after {
			continue;
		}
		has_differences = true;

		let rendered = TextDiff::from_lines(&before, &after)
			.unified_diff()
			.context_radius(3)
			.header(&live_path.display().to_string(), &replaced_path.display().to_string())
			.to_string();
		write_rendered(&rendered, colorize, out).map_err(DiffError::Write)?;
	}
	Ok(DiffOutcome { has_differences })
}

fn write_rendered(rendered: &str, colorize: bool, out: &mut dyn Write) -> io::Result<()> {
	if !colorize {
		return out.write_all(rendered.as_bytes());
	}
	for line in rendered.lines() {
		match diff_line_style(line) {
			Some(style) => writeln!(out, "{}", style.paint(line))?,
			None => writeln!(out, "{line}")?,
		}
	}
	Ok(())
}

fn file_names(root: &Path) -> Result<BTreeSet<String>, DiffError> {
	let read_err = |source| DiffError::Read {
		path: root.to_path_buf(),
		source,
	};
	let mut names = BTreeSet::new();
	for entry in fs::read_dir(root).map_err(read_err)? {
		let entry = entry.map_err(read_err)?;
		names.insert(entry.file_name().to_string_lossy().into_owned());
	}
	Ok(names)
}

/// Missing files read as empty, like `diff -N`.
fn read_or_empty(path: &Path) -> Result<String, DiffError> {
	match fs::read_to_string(path) {
		Ok(content) => Ok(content),
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
		Err(source) => Err(DiffError::Read {
			path: path.to_path_buf(),
			source,
		}),
	}
}
