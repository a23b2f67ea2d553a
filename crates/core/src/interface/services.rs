// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Narrow interfaces of the external collaborators: the encryption
//! service, the unified-model analysis RPC, the transformation RPC,
//! the schema repository and the resource-registry store.

use anchor_type::{Result, Row, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
	config::EngineKind,
	model::UnifiedModel,
	resource::{ResourceContainer, ResourceItem},
};

/// Decrypts stored credentials; scoped by tenant.
#[async_trait]
pub trait SecretService: Send + Sync {
	async fn decrypt(&self, tenant_id: &str, encrypted: &str) -> Result<String>;
}

/// One semantic difference between two models.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaChange {
	pub change_type: String,
	pub object: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column: Option<String>,
	pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaComparison {
	pub has_changes: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub changes: Vec<SchemaChange>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnEnrichment {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub classification: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableEnrichment {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
	pub columns: std::collections::BTreeMap<String, ColumnEnrichment>,
}

/// Enriched analysis returned by the unified-model service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaEnrichment {
	#[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
	pub tables: std::collections::BTreeMap<String, TableEnrichment>,
}

/// The remote unified-model analysis RPC; exactly the two operations
/// this service consumes.
#[async_trait]
pub trait AnalysisService: Send + Sync {
	async fn compare_unified_models(
		&self,
		previous: &UnifiedModel,
		current: &UnifiedModel,
	) -> Result<SchemaComparison>;

	async fn analyze_schema_enriched(
		&self,
		engine: EngineKind,
		model: &UnifiedModel,
	) -> Result<SchemaEnrichment>;
}

/// Remote transformation RPC for transformation names the built-ins
/// do not know.
#[async_trait]
pub trait TransformService: Send + Sync {
	async fn transform(&self, name: &str, value: &Value, parameters: &Row) -> Result<Value>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepoInfo {
	pub repo_id: String,
	pub name: String,
	pub default_branch_id: String,
}

/// The unit of versioned schema history per database.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaCommit {
	pub commit_id: String,
	pub branch_id: String,
	pub schema_type: String,
	pub schema_json: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub enrichment: Option<SchemaEnrichment>,
	pub created: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewSchemaCommit {
	pub schema_type: String,
	pub schema_json: String,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub enrichment: Option<SchemaEnrichment>,
}

/// External repository service holding per-database schema history.
/// Promoting a commit to head is atomic on the remote side.
#[async_trait]
pub trait SchemaRepo: Send + Sync {
	async fn find_repo_for_database(&self, database_id: &str) -> Result<Option<RepoInfo>>;

	async fn find_repo_by_name(&self, name: &str) -> Result<Option<RepoInfo>>;

	/// Fails with `already_exists` when the name is taken.
	async fn create_repo(&self, name: &str, database_id: &str) -> Result<RepoInfo>;

	async fn latest_commit(&self, repo_id: &str, branch_id: &str) -> Result<Option<SchemaCommit>>;

	/// Append a commit and atomically promote it to head.
	async fn commit_head(
		&self,
		repo_id: &str,
		branch_id: &str,
		commit: NewSchemaCommit,
	) -> Result<SchemaCommit>;
}

/// A database row as the registry store sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRow {
	pub database_id: String,
	pub workspace_id: String,
	pub name: String,
	pub enabled: bool,
	/// `connected`, `disconnected`, `error`, …
	pub status: String,
}

/// A mapping row; its rule JSON references resource URIs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingRow {
	pub mapping_id: String,
	pub rule: serde_json::Value,
	pub validated: bool,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub validation_errors: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub validation_warnings: Vec<String>,
}

impl MappingRow {
	/// Every resource URI the rule targets, wherever it appears in the
	/// rule JSON.
	pub fn target_uris(&self) -> Vec<String> {
		let mut uris = Vec::new();
		collect_uris(&self.rule, &mut uris);
		uris
	}
}

fn collect_uris(value: &serde_json::Value, out: &mut Vec<String>) {
	match value {
		serde_json::Value::String(s) => {
			if s.contains("://") {
				out.push(s.clone());
			}
		}
		serde_json::Value::Array(values) => {
			for v in values {
				collect_uris(v, out);
			}
		}
		serde_json::Value::Object(map) => {
			for v in map.values() {
				collect_uris(v, out);
			}
		}
		_ => {}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
	Webhook,
	Mcp,
	Stream,
}

impl IntegrationKind {
	pub fn scheme(&self) -> &'static str {
		match self {
			IntegrationKind::Webhook => "webhook",
			IntegrationKind::Mcp => "mcp",
			IntegrationKind::Stream => "stream",
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRow {
	pub integration_id: String,
	pub kind: IntegrationKind,
	pub enabled: bool,
	pub status: String,
}

/// Narrow repository over the relational store backing the resource
/// registry. Deleting a container cascades to its items on the store
/// side.
#[async_trait]
pub trait RegistryStore: Send + Sync {
	async fn list_databases(&self) -> Result<Vec<DatabaseRow>>;

	/// Cache the latest serialized model on the database record.
	async fn set_database_schema_cache(&self, database_id: &str, schema_json: &str) -> Result<()>;

	/// Record a per-database health note (analysis failures and the
	/// like); empty clears it.
	async fn set_database_health(&self, database_id: &str, note: &str) -> Result<()>;

	async fn list_containers(&self, database_id: &str) -> Result<Vec<ResourceContainer>>;

	async fn list_items_for_database(&self, database_id: &str) -> Result<Vec<ResourceItem>>;

	async fn insert_container(&self, row: ResourceContainer) -> Result<()>;

	async fn update_container(&self, row: &ResourceContainer) -> Result<()>;

	async fn delete_container(&self, container_id: &str) -> Result<()>;

	async fn insert_item(&self, row: ResourceItem) -> Result<()>;

	async fn update_item(&self, row: &ResourceItem) -> Result<()>;

	async fn delete_item(&self, item_id: &str) -> Result<()>;

	async fn set_container_online(&self, container_id: &str, online: bool) -> Result<()>;

	async fn set_items_online_for_container(&self, container_id: &str, online: bool)
	-> Result<()>;

	async fn list_integration_containers(&self) -> Result<Vec<ResourceContainer>>;

	async fn list_mappings(&self) -> Result<Vec<MappingRow>>;

	/// Flip `validated` to false and clear validation messages.
	async fn invalidate_mapping(&self, mapping_id: &str) -> Result<()>;

	async fn list_integrations(&self) -> Result<Vec<IntegrationRow>>;
}

/// Persists replication positions between runs.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
	async fn save(&self, replication_id: &str, position: &str) -> Result<()>;

	async fn load(&self, replication_id: &str) -> Result<Option<String>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_mapping_target_uris_nested() {
		let mapping = MappingRow {
			mapping_id: "m1".into(),
			rule: serde_json::json!({
				"source": "redb://data/database/db-1/table/users/column/id",
				"targets": [{"uri": "redb://data/database/db-2/table/users"}],
				"weight": 3,
			}),
			validated: true,
			validation_errors: vec![],
			validation_warnings: vec![],
		};
		let uris = mapping.target_uris();
		assert_eq!(uris.len(), 2);
		assert!(uris.iter().any(|u| u.contains("db-2")));
	}
}
