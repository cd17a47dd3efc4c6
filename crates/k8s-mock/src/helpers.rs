//! Server-side behaviour of the mock API: stored metadata and replace
//! semantics.

use serde_json::{json, Value};
use wiremock::ResponseTemplate;

/// Field manager recorded for writes made through the mock.
const FIELD_MANAGER: &str = "k8s-mock";

/// Fill in the metadata a real API server maintains for a stored object.
pub fn seed_server_fields(mut object: Value) -> Value {
	let name = object
		.pointer("/metadata/name")
		.and_then(Value::as_str)
		.unwrap_or_default()
		.to_string();
	let api_version = object.get("apiVersion").cloned().unwrap_or(Value::Null);
	if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
		metadata.entry("uid").or_insert_with(|| json!(format!("uid-{name}")));
		metadata.entry("resourceVersion").or_insert_with(|| json!("1"));
		metadata.entry("generation").or_insert_with(|| json!(1));
		metadata
			.entry("creationTimestamp")
			.or_insert_with(|| json!("2024-01-01T00:00:00Z"));
		metadata
			.entry("managedFields")
			.or_insert_with(|| managed_fields(&api_version));
	}
	object
}

fn managed_fields(api_version: &Value) -> Value {
	json!([{
		"manager": FIELD_MANAGER,
		"operation": "Update",
		"apiVersion": api_version,
		"time": "2024-01-01T00:00:00Z",
		"fieldsType": "FieldsV1",
		"fieldsV1": {"f:metadata": {}},
	}])
}

/// An API error rendered as a `Status` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusError {
	pub code: u16,
	pub reason: &'static str,
	pub message: String,
}

impl StatusError {
	pub fn new(code: u16, reason: &'static str, message: impl Into<String>) -> Self {
		Self {
			code,
			reason,
			message: message.into(),
		}
	}

	pub fn not_found(what: &str) -> Self {
		Self::new(404, "NotFound", format!("{what} not found"))
	}

	pub fn into_response(self) -> ResponseTemplate {
		ResponseTemplate::new(self.code).set_body_json(json!({
			"kind": "Status",
			"apiVersion": "v1",
			"metadata": {},
			"status": "Failure",
			"message": self.message,
			"reason": self.reason,
			"code": self.code,
		}))
	}
}

/// Compute the object a replace of `existing` with `incoming` stores.
///
/// Fails with `409 Conflict` when `incoming` pins a stale resourceVersion. A
/// dry run never reaches storage, so it keeps the current resourceVersion.
pub fn replace_object(existing: &Value, mut incoming: Value, dry_run: bool) -> Result<Value, StatusError> {
	let current_version = existing
		.pointer("/metadata/resourceVersion")
		.and_then(Value::as_str)
		.unwrap_or("0");
	match incoming.pointer("/metadata/resourceVersion").and_then(Value::as_str) {
		Some(requested) if !requested.is_empty() && requested != current_version => {
			return Err(StatusError::new(
				409,
				"Conflict",
				format!(
					"the object has been modified; resourceVersion {requested} does not match {current_version}"
				),
			));
		}
		_ => {}
	}

	let next_version = if dry_run {
		current_version.to_string()
	} else {
		(current_version.parse::<u64>().unwrap_or(0) + 1).to_string()
	};
	let generation = existing
		.pointer("/metadata/generation")
		.and_then(Value::as_i64)
		.unwrap_or(1);
	let spec_changed = existing.get("spec") != incoming.get("spec");
	let api_version = incoming.get("apiVersion").cloned().unwrap_or(Value::Null);

	// Status belongs to the status subresource and survives a replace.
	if let (Some(status), Some(object)) = (existing.get("status"), incoming.as_object_mut()) {
		object.insert("status".to_string(), status.clone());
	}

	let Some(metadata) = incoming.get_mut("metadata").and_then(Value::as_object_mut) else {
		return Err(StatusError::new(400, "BadRequest", "metadata is required"));
	};
	for preserved in ["uid", "creationTimestamp", "namespace"] {
		if let Some(value) = existing.pointer(&format!("/metadata/{preserved}")) {
			metadata.insert(preserved.to_string(), value.clone());
		}
	}
	metadata.insert("resourceVersion".to_string(), json!(next_version));
	metadata.insert(
		"generation".to_string(),
		json!(if spec_changed { generation + 1 } else { generation }),
	);
	metadata.insert("managedFields".to_string(), managed_fields(&api_version));
	Ok(incoming)
}
