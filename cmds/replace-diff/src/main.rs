use anyhow::Result;
use clap::Parser;
use replace_diff::{
	commands::{self, diff::DiffArgs},
	output::BrokenPipeGuard,
	telemetry,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "replace-diff")]
#[command(
	about = "Show what `kubectl replace` would change, after removing server noise and user-filtered fields"
)]
#[command(version)]
struct Cli {
	#[command(flatten)]
	diff: DiffArgs,

	/// Log level (trace, debug, info, warn, error). Overrides RUST_LOG
	#[arg(long)]
	log_level: Option<Level>,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	telemetry::init(cli.log_level);

	let stdout = BrokenPipeGuard::new(std::io::stdout());
	let outcome = commands::diff::run(cli.diff, stdout).await?;
	tracing::debug!(has_differences = outcome.has_differences, "done");
	Ok(())
}
