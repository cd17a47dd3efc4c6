//! Kubernetes cluster connection management.

use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use kube::{
	config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
	Client, Config,
};
use thiserror::Error;
use tracing::instrument;

/// Default timeout for Kubernetes API requests.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, Error)]
pub enum ConnectionError {
	#[error("no context named `{0}` was found. Please check your kubeconfig")]
	ContextNotFound(String),

	#[error("cannot expand `~` in {0}: home directory is unknown")]
	NoHomeDir(PathBuf),

	#[error(transparent)]
	Kubeconfig(#[from] KubeconfigError),

	#[error(transparent)]
	Kube(#[from] kube::Error),
}

/// A connection to a Kubernetes cluster.
#[derive(Clone)]
pub struct ClusterConnection {
	client: Client,
	/// Context the connection was built from, `current-context` if none was requested.
	context: String,
}

impl std::fmt::Debug for ClusterConnection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ClusterConnection")
			.field("context", &self.context)
			.finish_non_exhaustive()
	}
}

impl ClusterConnection {
	/// Connect using a kubeconfig file.
	///
	/// Without an explicit path the standard lookup applies (`$KUBECONFIG`,
	/// then `~/.kube/config`).
	#[instrument(skip_all, fields(kubeconfig = ?path, context = ?context))]
	pub async fn connect(path: Option<&Path>, context: Option<&str>) -> Result<Self, ConnectionError> {
		let kubeconfig = match path {
			Some(path) => Kubeconfig::read_from(expand_home(path)?)?,
			None => Kubeconfig::read()?,
		};
		Self::from_kubeconfig(kubeconfig, context).await
	}

	/// Connect using an already loaded kubeconfig.
	#[instrument(skip_all, fields(context = ?context))]
	pub async fn from_kubeconfig(
		kubeconfig: Kubeconfig,
		context: Option<&str>,
	) -> Result<Self, ConnectionError> {
		if let Some(name) = context {
			if !kubeconfig.contexts.iter().any(|c| c.name == name) {
				return Err(ConnectionError::ContextNotFound(name.to_string()));
			}
		}
		let context_name = context
			.map(str::to_string)
			.or_else(|| kubeconfig.current_context.clone())
			.unwrap_or_default();

		let mut config = Config::from_custom_kubeconfig(
			kubeconfig,
			&KubeConfigOptions {
				context: context.map(str::to_string),
				..Default::default()
			},
		)
		.await?;
		config.read_timeout = Some(DEFAULT_API_TIMEOUT);

		tracing::debug!(context = %context_name, cluster = %config.cluster_url, "connecting to cluster");
		let client = Client::try_from(config)?;

		Ok(Self {
			client,
			context: context_name,
		})
	}

	/// Get a reference to the underlying kube client.
	pub fn client(&self) -> &Client {
		&self.client
	}

	pub fn context(&self) -> &str {
		&self.context
	}
}

/// Replace a leading `~` with the home directory.
fn expand_home(path: &Path) -> Result<PathBuf, ConnectionError> {
	let Ok(rest) = path.strip_prefix("~") else {
		return Ok(path.to_path_buf());
	};
	let home = dirs::home_dir().ok_or_else(|| ConnectionError::NoHomeDir(path.to_path_buf()))?;
	Ok(home.join(rest))
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[tokio::test]
	async fn test_connect_context_not_found() {
		let result = ClusterConnection::from_kubeconfig(Kubeconfig::default(), Some("nonexistent")).await;
		assert_matches!(
			result,
			Err(ConnectionError::ContextNotFound(context)) if context == "nonexistent"
		);
	}

	#[test]
	fn test_expand_home() {
		let Some(home) = dirs::home_dir() else {
			return;
		};
		assert_eq!(
			expand_home(Path::new("~/.kube/config")).unwrap(),
			home.join(".kube/config")
		);
		assert_eq!(
			expand_home(Path::new("/etc/kubeconfig")).unwrap(),
			PathBuf::from("/etc/kubeconfig")
		);
		assert_eq!(
			expand_home(Path::new("configs/~/kubeconfig")).unwrap(),
			PathBuf::from("configs/~/kubeconfig")
		);
	}
}
