//! Diff command: dry-run replace every manifest, write stored and replaced
//! objects into two trees and compare them.

use std::{
	collections::HashSet,
	io::{self, Write},
	path::{Path, PathBuf},
	sync::Arc,
};

use anyhow::{Context, Result};
use clap::Args;
use manifest_filter::{ExtraConfig, IgnoreSet, ManifestNode, NormalizeContext, ResourceIdentity};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::{
	diff::{DiffOutcome, DiffTool, DEFAULT_DIFF_PROGRAM},
	k8s::{
		client::ClusterConnection,
		discovery::ApiResourceCache,
		replace::{DryRunReplacer, ReplaceError},
		store::{FetchError, ObjectStore},
	},
	materialize::{write_pair, MaterializeError},
	output::ColorMode,
	source::{read_manifests, ManifestSource},
	workspace::OutputWorkspace,
};

/// Maximum concurrent API operations.
const MAX_CONCURRENT_OPS: usize = 8;

#[derive(Args, Debug, Clone)]
pub struct DiffArgs {
	/// Filename, directory, or `-` for stdin, containing the manifests to diff
	#[arg(short = 'f', long)]
	pub filename: String,

	/// Path to the extra config file (ignored resources and field filter)
	#[arg(short = 'e', long)]
	pub extra_config: Option<PathBuf>,

	/// Path to the kubeconfig file. Defaults to $KUBECONFIG or ~/.kube/config
	#[arg(short = 'k', long)]
	pub kubeconfig: Option<PathBuf>,

	/// Kubeconfig context to use instead of the current one
	#[arg(long)]
	pub context: Option<String>,

	/// Directory receiving the LIVE- and REPLACED- trees. Removed and recreated on every run
	#[arg(long, default_value = ".tmp")]
	pub output_dir: PathBuf,

	/// Keep the output directory after the diff instead of removing it
	#[arg(long)]
	pub keep_output: bool,

	/// External program invoked as `<program> -u -N <live> <replaced>`
	#[arg(long, default_value = DEFAULT_DIFF_PROGRAM, conflicts_with = "builtin_diff")]
	pub diff_program: String,

	/// Render the diff in process instead of running an external program
	#[arg(long)]
	pub builtin_diff: bool,

	/// Controls color of the builtin diff
	#[arg(long, value_enum, default_value_t = ColorMode::Auto)]
	pub color: ColorMode,
}

impl DiffArgs {
	pub fn diff_tool(&self) -> DiffTool {
		if self.builtin_diff {
			DiffTool::Builtin { color: self.color }
		} else {
			DiffTool::External {
				program: self.diff_program.clone(),
			}
		}
	}
}

/// Counts of what happened to the manifests of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
	pub written: usize,
	pub ignored: usize,
	pub skipped: usize,
	pub failed: usize,
}

/// Run the diff command.
pub async fn run<W: Write>(args: DiffArgs, writer: W) -> Result<DiffOutcome> {
	let source = ManifestSource::from_arg(&args.filename);
	let manifests = read_manifests(&source, io::stdin().lock())
		.with_context(|| format!("reading manifests from {source}"))?;

	let connection = ClusterConnection::connect(args.kubeconfig.as_deref(), args.context.as_deref())
		.await
		.context("connecting to cluster")?;

	diff_with_connection(&args, &connection, manifests, writer).await
}

/// Everything after connecting: also the entry point for tests, which bring
/// their own connection.
#[instrument(skip_all, fields(manifests = manifests.len(), context = connection.context()))]
pub async fn diff_with_connection<W: Write>(
	args: &DiffArgs,
	connection: &ClusterConnection,
	manifests: Vec<ManifestNode>,
	mut writer: W,
) -> Result<DiffOutcome> {
	let workspace = OutputWorkspace::create(&args.output_dir).context("preparing output directory")?;

	let result = async {
		let config = ExtraConfig::load_or_default(args.extra_config.as_deref());

		let api_cache = ApiResourceCache::build(connection.client())
			.await
			.context("discovering API resources")?;
		let ignore = IgnoreSet::resolve(&config.ignore_resources, &api_cache);
		let ctx = Arc::new(NormalizeContext::new(ignore, config.field_filter));

		let store = ObjectStore::new(connection.client().clone(), Arc::new(api_cache));
		let replacer = DryRunReplacer::new(store);

		let summary = process_manifests(&replacer, &ctx, manifests, workspace.live(), workspace.replaced()).await?;
		info!(
			written = summary.written,
			ignored = summary.ignored,
			skipped = summary.skipped,
			failed = summary.failed,
			"resources processed"
		);

		let outcome = args
			.diff_tool()
			.run(workspace.live(), workspace.replaced(), &mut writer)
			.context("comparing output directories")?;
		writer.flush().context("flushing diff output")?;
		Ok::<_, anyhow::Error>(outcome)
	}
	.await;

	if args.keep_output {
		info!(path = %workspace.base().display(), "keeping output directory");
	} else {
		workspace.cleanup();
	}
	result
}

/// Errors of one resource; logged, never fatal.
#[derive(Debug, thiserror::Error)]
enum ResourceError {
	#[error(transparent)]
	Fetch(#[from] FetchError),
	#[error(transparent)]
	Replace(#[from] ReplaceError),
	#[error(transparent)]
	Identity(#[from] manifest_filter::IdentityError),
	#[error(transparent)]
	Materialize(#[from] MaterializeError),
}

enum ResourceOutcome {
	Written,
	Ignored,
}

/// Dry-run replace and materialize every manifest with bounded parallelism.
///
/// Manifests resolving to an identity seen before are skipped, so that every
/// output file has a single writer.
pub async fn process_manifests(
	replacer: &DryRunReplacer,
	ctx: &Arc<NormalizeContext>,
	manifests: Vec<ManifestNode>,
	live_root: &Path,
	replaced_root: &Path,
) -> Result<RunSummary> {
	let mut summary = RunSummary::default();
	let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_OPS));
	let mut join_set = JoinSet::new();
	let mut seen = HashSet::new();

	for manifest in manifests {
		let (identity, manifest) = match replacer.prepare(manifest) {
			Ok(prepared) => prepared,
			Err(e) => {
				error!(error = %DisplayChain(&e), "skipping manifest");
				summary.failed += 1;
				continue;
			}
		};
		if ctx.is_ignored(&identity) {
			debug!(resource = %identity, "resource type is ignored");
			summary.ignored += 1;
			continue;
		}
		if !seen.insert(identity.clone()) {
			warn!(resource = %identity, "duplicate manifest, only the first one is diffed");
			summary.skipped += 1;
			continue;
		}

		let replacer = replacer.clone();
		let ctx = Arc::clone(ctx);
		let semaphore = Arc::clone(&semaphore);
		let live_root = live_root.to_path_buf();
		let replaced_root = replaced_root.to_path_buf();
		join_set.spawn(async move {
			let _permit = semaphore.acquire_owned().await.context("concurrency semaphore closed")?;
			let outcome = process_one(&replacer, &ctx, &identity, manifest, &live_root, &replaced_root).await;
			Ok::<_, anyhow::Error>((identity, outcome))
		});
	}

	while let Some(joined) = join_set.join_next().await {
		let (identity, outcome) = joined.context("resource task panicked")??;
		match outcome {
			Ok(ResourceOutcome::Written) => summary.written += 1,
			Ok(ResourceOutcome::Ignored) => summary.ignored += 1,
			Err(e) => {
				error!(resource = %identity, error = %DisplayChain(&e), "failed to diff resource");
				summary.failed += 1;
			}
		}
	}
	Ok(summary)
}

async fn process_one(
	replacer: &DryRunReplacer,
	ctx: &NormalizeContext,
	identity: &ResourceIdentity,
	manifest: ManifestNode,
	live_root: &Path,
	replaced_root: &Path,
) -> Result<ResourceOutcome, ResourceError> {
	let live = replacer.store().get(identity).await?;
	let candidate = replacer.replace(identity, manifest, &live).await?;
	let Some(pair) = ctx.pair(live, candidate)? else {
		return Ok(ResourceOutcome::Ignored);
	};
	write_pair(live_root, replaced_root, &pair)?;
	Ok(ResourceOutcome::Written)
}

/// Renders an error with its source chain on one line.
struct DisplayChain<'a>(&'a dyn std::error::Error);

impl std::fmt::Display for DisplayChain<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)?;
		let mut source = self.0.source();
		while let Some(e) = source {
			write!(f, ": {e}")?;
			source = e.source();
		}
		Ok(())
	}
}
