//! HTTP-based mock Kubernetes server using wiremock.
//!
//! Clients connect through a regular kubeconfig, so the code under test runs
//! its real discovery, `GET` and dry-run `PUT` requests.

use std::{
	collections::HashMap,
	sync::{Arc, PoisonError, RwLock},
};

use bon::Builder;
use kube::config::{
	AuthInfo, Cluster, Context, Kubeconfig, NamedAuthInfo, NamedCluster, NamedContext,
};
use serde_json::{json, Value};
use tracing::{debug, trace};
use wiremock::{
	matchers::{header_regex, method, path, path_regex},
	Mock, MockServer, Request, ResponseTemplate,
};

use super::{
	discovery::{DiscoveryMode, MockApiResource, MockDiscovery},
	helpers::{replace_object, seed_server_fields, StatusError},
};

/// Stored objects keyed by (collection path, name).
type SharedResources = Arc<RwLock<HashMap<(String, String), Value>>>;

const AGGREGATED_DISCOVERY_CONTENT_TYPE: &str =
	"application/json;g=apidiscovery.k8s.io;v=v2;as=APIGroupDiscoveryList";

/// A mock Kubernetes server exposed over HTTP.
#[derive(Builder)]
pub struct HttpMockK8sServer {
	#[builder(default)]
	discovery_mode: DiscoveryMode,
	#[builder(default)]
	discovery: MockDiscovery,
	/// Objects stored on the server. Collection paths are derived from
	/// apiVersion/kind via the discovery data; objects of unknown kinds are
	/// skipped.
	#[builder(default)]
	resources: Vec<Value>,
}

/// A request the mock server received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub query: Option<String>,
}

impl RecordedRequest {
	pub fn is_dry_run(&self) -> bool {
		self.query
			.as_deref()
			.is_some_and(|q| q.split('&').any(|pair| pair == "dryRun=All"))
	}
}

/// A running HTTP mock server instance.
pub struct RunningHttpMockK8sServer {
	server: MockServer,
	resources: SharedResources,
}

impl HttpMockK8sServer {
	/// Start the mock server with all configured resources.
	pub async fn start(self) -> RunningHttpMockK8sServer {
		let server = MockServer::start().await;
		debug!(uri = %server.uri(), "started mock k8s server");

		let mut resources = HashMap::new();
		for manifest in self.resources {
			if let Some(key) = storage_key(&manifest, &self.discovery) {
				trace!(collection = %key.0, name = %key.1, "registered resource");
				resources.insert(key, seed_server_fields(manifest));
			}
		}
		resources
			.entry(("/api/v1/namespaces".to_string(), "default".to_string()))
			.or_insert_with(|| {
				seed_server_fields(json!({
					"apiVersion": "v1",
					"kind": "Namespace",
					"metadata": {"name": "default"},
				}))
			});

		let resources = Arc::new(RwLock::new(resources));
		mount_discovery(&server, &self.discovery, self.discovery_mode).await;
		mount_objects(&server, &resources).await;

		RunningHttpMockK8sServer { server, resources }
	}
}

/// Collection path and name an object is stored under.
fn storage_key(manifest: &Value, discovery: &MockDiscovery) -> Option<(String, String)> {
	let api_version = manifest.get("apiVersion")?.as_str()?;
	let kind = manifest.get("kind")?.as_str()?;
	let name = manifest.pointer("/metadata/name")?.as_str()?;
	let resource = discovery.find(api_version, kind)?;

	let prefix = if api_version.contains('/') {
		format!("/apis/{api_version}")
	} else {
		format!("/api/{api_version}")
	};
	let collection = if resource.namespaced {
		let namespace = manifest
			.pointer("/metadata/namespace")
			.and_then(Value::as_str)
			.unwrap_or("default");
		format!("{prefix}/namespaces/{namespace}/{}", resource.name)
	} else {
		format!("{prefix}/{}", resource.name)
	};
	Some((collection, name.to_string()))
}

impl RunningHttpMockK8sServer {
	/// Get the server's URI (e.g., "http://127.0.0.1:12345").
	pub fn uri(&self) -> String {
		self.server.uri()
	}

	/// Create a Kubeconfig pointing to this mock server.
	pub fn kubeconfig(&self) -> Kubeconfig {
		self.kubeconfig_with_context("mock-context")
	}

	/// Create a Kubeconfig pointing to this mock server with a custom context name.
	pub fn kubeconfig_with_context(&self, context_name: &str) -> Kubeconfig {
		let cluster_name = "mock-cluster";
		let user_name = "mock-user";

		Kubeconfig {
			clusters: vec![NamedCluster {
				name: cluster_name.to_string(),
				cluster: Some(Cluster {
					server: Some(self.uri()),
					insecure_skip_tls_verify: Some(true),
					..Default::default()
				}),
			}],
			contexts: vec![NamedContext {
				name: context_name.to_string(),
				context: Some(Context {
					cluster: cluster_name.to_string(),
					user: Some(user_name.to_string()),
					namespace: Some("default".to_string()),
					..Default::default()
				}),
			}],
			auth_infos: vec![NamedAuthInfo {
				name: user_name.to_string(),
				auth_info: Some(AuthInfo::default()),
			}],
			current_context: Some(context_name.to_string()),
			..Default::default()
		}
	}

	/// The stored object at `collection`/`name`, as the server currently holds it.
	pub fn stored(&self, collection: &str, name: &str) -> Option<Value> {
		self.resources
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(&(collection.to_string(), name.to_string()))
			.cloned()
	}

	/// All requests that were not discovery lookups, in arrival order.
	pub async fn object_requests(&self) -> Vec<RecordedRequest> {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.into_iter()
			.filter(|req| is_object_path(req.url.path()))
			.map(|req| RecordedRequest {
				method: req.method.as_str().to_string(),
				path: req.url.path().to_string(),
				query: req.url.query().map(str::to_string),
			})
			.collect()
	}

	/// Requests that would have modified stored state.
	pub async fn writes(&self) -> Vec<RecordedRequest> {
		self.object_requests()
			.await
			.into_iter()
			.filter(|req| req.method != "GET")
			.collect()
	}
}

fn aggregated_resource(resource: &MockApiResource, group: &str, version: &str) -> Value {
	json!({
		"resource": resource.name,
		"singularResource": resource.singular_name,
		"responseKind": {
			"group": group,
			"version": version,
			"kind": resource.kind,
		},
		"scope": resource.scope(),
		"verbs": resource.verbs,
	})
}

fn legacy_resource(resource: &MockApiResource) -> Value {
	json!({
		"name": resource.name,
		"singularName": resource.singular_name,
		"namespaced": resource.namespaced,
		"kind": resource.kind,
		"verbs": resource.verbs,
	})
}

fn aggregated_list(items: Vec<Value>) -> Vec<u8> {
	json!({
		"kind": "APIGroupDiscoveryList",
		"apiVersion": "apidiscovery.k8s.io/v2",
		"items": items,
	})
	.to_string()
	.into_bytes()
}

async fn mount_discovery(server: &MockServer, discovery: &MockDiscovery, mode: DiscoveryMode) {
	match mode {
		DiscoveryMode::Aggregated => {
			let core = aggregated_list(vec![json!({
				"metadata": {"name": ""},
				"versions": [{
					"version": "v1",
					"resources": discovery
						.core_resources
						.iter()
						.map(|r| aggregated_resource(r, "", "v1"))
						.collect::<Vec<_>>(),
					"freshness": "Current",
				}],
			})]);

			// One entry per group, versions listed in preference order.
			let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
			for (gv, resources) in &discovery.group_resources {
				let (group, version) = gv.split_once('/').unwrap_or(("", gv));
				let entry = json!({
					"version": version,
					"resources": resources
						.iter()
						.map(|r| aggregated_resource(r, group, version))
						.collect::<Vec<_>>(),
					"freshness": "Current",
				});
				match groups.iter_mut().find(|(name, _)| name == group) {
					Some((_, versions)) => versions.push(entry),
					None => groups.push((group.to_string(), vec![entry])),
				}
			}
			let apis = aggregated_list(
				groups
					.into_iter()
					.map(|(name, versions)| json!({"metadata": {"name": name}, "versions": versions}))
					.collect(),
			);

			for (endpoint, body) in [("/api", core), ("/apis", apis)] {
				Mock::given(method("GET"))
					.and(path(endpoint))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(
						ResponseTemplate::new(200)
							.set_body_raw(body, AGGREGATED_DISCOVERY_CONTENT_TYPE),
					)
					.mount(server)
					.await;
			}
		}
		DiscoveryMode::Legacy => {
			for endpoint in ["/api", "/apis"] {
				Mock::given(method("GET"))
					.and(path(endpoint))
					.and(header_regex("accept", "apidiscovery"))
					.respond_with(ResponseTemplate::new(406))
					.mount(server)
					.await;
			}
		}
	}

	Mock::given(method("GET"))
		.and(path("/api"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIVersions",
			"versions": ["v1"],
			"serverAddressByClientCIDRs": [],
		})))
		.mount(server)
		.await;

	let groups: Vec<_> = discovery
		.group_resources
		.keys()
		.map(|gv| {
			let (group, version) = gv.split_once('/').unwrap_or(("", gv));
			json!({
				"name": group,
				"versions": [{"groupVersion": gv, "version": version}],
				"preferredVersion": {"groupVersion": gv, "version": version},
			})
		})
		.collect();
	Mock::given(method("GET"))
		.and(path("/apis"))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({
			"kind": "APIGroupList",
			"apiVersion": "v1",
			"groups": groups,
		})))
		.mount(server)
		.await;

	let resource_lists = std::iter::once((
		"/api/v1".to_string(),
		"v1".to_string(),
		&discovery.core_resources,
	))
	.chain(
		discovery
			.group_resources
			.iter()
			.map(|(gv, rs)| (format!("/apis/{gv}"), gv.clone(), rs)),
	);
	for (endpoint, group_version, resources) in resource_lists {
		Mock::given(method("GET"))
			.and(path(endpoint))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"kind": "APIResourceList",
				"apiVersion": "v1",
				"groupVersion": group_version,
				"resources": resources.iter().map(legacy_resource).collect::<Vec<_>>(),
			})))
			.mount(server)
			.await;
	}
}

async fn mount_objects(server: &MockServer, resources: &SharedResources) {
	let get_resources = Arc::clone(resources);
	Mock::given(method("GET"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let (collection, name) = split_object_path(req.url.path());
			let resources = get_resources.read().unwrap_or_else(PoisonError::into_inner);
			match resources.get(&(collection, name.clone())) {
				Some(object) => ResponseTemplate::new(200).set_body_json(object),
				None => StatusError::not_found(&name).into_response(),
			}
		})
		.mount(server)
		.await;

	let put_resources = Arc::clone(resources);
	Mock::given(method("PUT"))
		.and(path_regex(r"^/api(s)?/.*"))
		.respond_with(move |req: &Request| {
			let dry_run = req.url.query_pairs().any(|(k, v)| k == "dryRun" && v == "All");
			let key = split_object_path(req.url.path());
			let Ok(incoming) = serde_json::from_slice::<Value>(&req.body) else {
				return StatusError::new(400, "BadRequest", "request body is not JSON")
					.into_response();
			};

			let mut resources = put_resources.write().unwrap_or_else(PoisonError::into_inner);
			let Some(existing) = resources.get(&key) else {
				return StatusError::not_found(&key.1).into_response();
			};
			match replace_object(existing, incoming, dry_run) {
				Ok(replaced) => {
					trace!(collection = %key.0, name = %key.1, dry_run, "replaced");
					if !dry_run {
						resources.insert(key, replaced.clone());
					}
					ResponseTemplate::new(200).set_body_json(replaced)
				}
				Err(err) => err.into_response(),
			}
		})
		.mount(server)
		.await;
}

/// Split an object path into its collection path and object name.
///
/// `/apis/apps/v1/namespaces/default/deployments/web` splits into
/// `/apis/apps/v1/namespaces/default/deployments` and `web`.
fn split_object_path(path: &str) -> (String, String) {
	let path = path.trim_end_matches('/');
	match path.rsplit_once('/') {
		Some((collection, name)) => (collection.to_string(), name.to_string()),
		None => (path.to_string(), String::new()),
	}
}

fn is_object_path(path: &str) -> bool {
	let Some(rest) = path
		.strip_prefix("/api/")
		.or_else(|| path.strip_prefix("/apis/"))
	else {
		return false;
	};
	// Discovery paths stop at the group version.
	let version_segments = if path.starts_with("/apis/") { 2 } else { 1 };
	rest.trim_end_matches('/').split('/').count() > version_segments
}
