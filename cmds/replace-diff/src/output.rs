//! Terminal output helpers.

use std::io::{self, ErrorKind, IsTerminal, Write};

use clap::ValueEnum;
use nu_ansi_term::{Color, Style};

/// When to colorize the builtin diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
	/// Colorize when stdout is a terminal.
	#[default]
	Auto,
	Always,
	Never,
}

impl ColorMode {
	pub fn should_colorize(self) -> bool {
		match self {
			ColorMode::Auto => io::stdout().is_terminal(),
			ColorMode::Always => true,
			ColorMode::Never => false,
		}
	}
}

/// Style for one line of unified diff output.
pub fn diff_line_style(line: &str) -> Option<Style> {
	if line.starts_with("+++") || line.starts_with("---") {
		Some(Style::new().bold())
	} else if line.starts_with("@@") {
		Some(Style::new().fg(Color::Cyan))
	} else if line.starts_with('+') {
		Some(Style::new().fg(Color::Green))
	} else if line.starts_with('-') {
		Some(Style::new().fg(Color::Red))
	} else {
		None
	}
}

/// A writer that turns broken pipe errors into successful writes, so that
/// `replace-diff ... | head` exits cleanly.
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[test]
	fn test_color_mode_explicit() {
		assert!(ColorMode::Always.should_colorize());
		assert!(!ColorMode::Never.should_colorize());
	}

	#[rstest]
	#[case("+  replicas: 2", Some(Style::new().fg(Color::Green)))]
	#[case("-  replicas: 1", Some(Style::new().fg(Color::Red)))]
	#[case("@@ -1,3 +1,3 @@", Some(Style::new().fg(Color::Cyan)))]
	#[case("--- .tmp/LIVE-x/a", Some(Style::new().bold()))]
	#[case("   unchanged", None)]
	fn test_diff_line_style(#[case] line: &str, #[case] expected: Option<Style>) {
		assert_eq!(diff_line_style(line), expected);
	}

	struct ClosedPipe;

	impl Write for ClosedPipe {
		fn write(&mut self, _: &[u8]) -> io::Result<usize> {
			Err(io::Error::from(ErrorKind::BrokenPipe))
		}

		fn flush(&mut self) -> io::Result<()> {
			Err(io::Error::from(ErrorKind::BrokenPipe))
		}
	}

	#[test]
	fn test_broken_pipe_swallowed() {
		let mut out = BrokenPipeGuard::new(ClosedPipe);
		assert_eq!(out.write(b"abc").unwrap(), 3);
		out.flush().unwrap();
	}
}
