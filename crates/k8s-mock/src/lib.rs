//! Mock Kubernetes API server for testing.
//!
//! Serves discovery, `GET` of single objects and `PUT` (replace) with
//! `dryRun` support over real HTTP, so clients connect through a kubeconfig.

pub mod discovery;
mod helpers;
pub mod http;

pub use discovery::{DiscoveryMode, MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, RecordedRequest, RunningHttpMockK8sServer};
