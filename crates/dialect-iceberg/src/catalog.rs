// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! REST catalog client. Namespaces travel as arrays of path
//! components; multi-level namespaces join with the `%1F` unit
//! separator in URL paths.

use anchor_core::ConnectionConfig;
use anchor_type::{Error, Result};
use serde::Deserialize;
use tracing::debug;

pub struct RestCatalog {
	http: reqwest::Client,
	base: String,
	token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListNamespacesResponse {
	#[serde(default)]
	pub namespaces: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct TableIdent {
	#[serde(default)]
	pub namespace: Vec<String>,
	pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTablesResponse {
	#[serde(default)]
	pub identifiers: Vec<TableIdent>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDef {
	pub name: String,
	#[serde(default)]
	pub required: bool,
	#[serde(rename = "type")]
	pub field_type: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SchemaDef {
	#[serde(rename = "schema-id", default)]
	pub schema_id: i64,
	#[serde(default)]
	pub fields: Vec<FieldDef>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotDef {
	#[serde(rename = "snapshot-id")]
	pub snapshot_id: i64,
	#[serde(rename = "timestamp-ms", default)]
	pub timestamp_ms: i64,
	#[serde(default)]
	pub summary: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct TableMetadata {
	#[serde(default)]
	pub location: String,
	#[serde(rename = "current-schema-id", default)]
	pub current_schema_id: i64,
	#[serde(default)]
	pub schemas: Vec<SchemaDef>,
	#[serde(default)]
	pub snapshots: Vec<SnapshotDef>,
	#[serde(rename = "current-snapshot-id", default)]
	pub current_snapshot_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LoadTableResult {
	pub metadata: TableMetadata,
}

impl TableMetadata {
	pub fn current_schema(&self) -> Option<&SchemaDef> {
		self.schemas
			.iter()
			.find(|s| s.schema_id == self.current_schema_id)
			.or_else(|| self.schemas.last())
	}

	pub fn current_snapshot(&self) -> Option<&SnapshotDef> {
		self.current_snapshot_id
			.and_then(|id| self.snapshots.iter().find(|s| s.snapshot_id == id))
			.or_else(|| self.snapshots.last())
	}
}

pub fn namespace_path(parts: &[String]) -> String {
	parts.join("%1F")
}

impl RestCatalog {
	pub fn new(config: &ConnectionConfig, token: &str) -> Self {
		let scheme = if config.ssl.enabled { "https" } else { "http" };
		Self {
			http: reqwest::Client::new(),
			base: format!("{scheme}://{}:{}", config.host, config.port),
			token: (!token.is_empty()).then(|| token.to_string()),
		}
	}

	async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
		let url = format!("{}{path}", self.base);
		let mut request = self.http.get(&url);
		if let Some(token) = &self.token {
			request = request.bearer_auth(token);
		}
		let wrap = |err: reqwest::Error| {
			let base = if err.is_connect() || err.is_timeout() {
				Error::connection(format!("iceberg catalog unreachable: {err}"))
			} else {
				Error::internal(format!("iceberg catalog request failed: {err}"))
			};
			base.with_engine("iceberg").with_context("url", url.clone())
		};
		let response = request.send().await.map_err(wrap)?;
		if response.status() == reqwest::StatusCode::NOT_FOUND {
			return Err(Error::not_found(format!("catalog path '{path}' not found"))
				.with_engine("iceberg"));
		}
		let response = response.error_for_status().map_err(wrap)?;
		debug!(path, "catalog request succeeded");
		response.json::<T>().await.map_err(wrap)
	}

	pub async fn list_namespaces(&self) -> Result<Vec<Vec<String>>> {
		let response: ListNamespacesResponse = self.get_json("/v1/namespaces").await?;
		Ok(response.namespaces)
	}

	pub async fn list_tables(&self, namespace: &[String]) -> Result<Vec<TableIdent>> {
		let path = format!("/v1/namespaces/{}/tables", namespace_path(namespace));
		let response: ListTablesResponse = self.get_json(&path).await?;
		Ok(response.identifiers)
	}

	pub async fn load_table(
		&self,
		namespace: &[String],
		table: &str,
	) -> Result<TableMetadata> {
		let path =
			format!("/v1/namespaces/{}/tables/{table}", namespace_path(namespace));
		let response: LoadTableResult = self.get_json(&path).await?;
		Ok(response.metadata)
	}

	pub async fn config(&self) -> Result<serde_json::Value> {
		self.get_json("/v1/config").await
	}
}

/// Iceberg primitive type → unified type name. Complex types carry
/// their JSON shape as text.
pub fn unified_type(field_type: &serde_json::Value) -> &'static str {
	match field_type.as_str() {
		Some("boolean") => "bool",
		Some("int") | Some("long") => "int",
		Some("float") | Some("double") => "float",
		Some("string") | Some("uuid") => "text",
		Some("date") => "date",
		Some("time") => "time",
		Some("timestamp") | Some("timestamptz") => "timestamp",
		Some("binary") | Some("fixed") => "bytes",
		Some(t) if t.starts_with("decimal") => "decimal",
		Some(_) => "unknown",
		None => "json",
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_namespace_path_joins_components() {
		assert_eq!(namespace_path(&["a".to_string(), "b".to_string()]), "a%1Fb");
		assert_eq!(namespace_path(&["warehouse".to_string()]), "warehouse");
	}

	#[test]
	fn test_unified_type_mapping() {
		assert_eq!(unified_type(&serde_json::json!("long")), "int");
		assert_eq!(unified_type(&serde_json::json!("decimal(10, 2)")), "decimal");
		assert_eq!(
			unified_type(&serde_json::json!({"type": "struct", "fields": []})),
			"json"
		);
	}

	#[test]
	fn test_table_metadata_current_schema() {
		let metadata: TableMetadata = serde_json::from_value(serde_json::json!({
			"location": "s3://lake/t",
			"current-schema-id": 2,
			"schemas": [
				{"schema-id": 1, "fields": []},
				{"schema-id": 2, "fields": [{"name": "id", "required": true, "type": "long"}]}
			],
			"snapshots": [{"snapshot-id": 99, "timestamp-ms": 1000, "summary": {}}],
			"current-snapshot-id": 99
		}))
		.unwrap();
		assert_eq!(metadata.current_schema().unwrap().schema_id, 2);
		assert_eq!(metadata.current_snapshot().unwrap().snapshot_id, 99);
	}
}
