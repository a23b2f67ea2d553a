// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Mock external collaborators with captured calls, injectable
//! failures and in-memory state.

use std::{
	collections::BTreeMap,
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use anchor_core::{
	EngineKind,
	interface::services::{
		AnalysisService, CheckpointStore, DatabaseRow, IntegrationRow, MappingRow,
		NewSchemaCommit, RegistryStore, RepoInfo, SchemaChange, SchemaCommit,
		SchemaComparison, SchemaEnrichment, SchemaRepo, SecretService, TransformService,
	},
	model::UnifiedModel,
	resource::{ResourceContainer, ResourceItem},
};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

/// Decrypts `enc:<plain>` credentials; anything else echoes back.
#[derive(Clone, Default)]
pub struct MockSecretService {
	pub fail: Arc<AtomicBool>,
}

#[async_trait]
impl SecretService for MockSecretService {
	async fn decrypt(&self, tenant_id: &str, encrypted: &str) -> Result<String> {
		if self.fail.load(Ordering::Relaxed) {
			return Err(Error::internal("injected decryption failure"));
		}
		if tenant_id.is_empty() {
			return Err(Error::configuration("tenant scope required"));
		}
		Ok(encrypted.strip_prefix("enc:").unwrap_or(encrypted).to_string())
	}
}

/// Structural comparison plus a configurable enrichment payload.
#[derive(Clone, Default)]
pub struct MockAnalysisService {
	pub enrichment: Arc<Mutex<SchemaEnrichment>>,
	pub fail_compare: Arc<AtomicBool>,
	pub fail_enrich: Arc<AtomicBool>,
	pub compare_calls: Arc<AtomicUsize>,
	pub enrich_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AnalysisService for MockAnalysisService {
	async fn compare_unified_models(
		&self,
		previous: &UnifiedModel,
		current: &UnifiedModel,
	) -> Result<SchemaComparison> {
		self.compare_calls.fetch_add(1, Ordering::Relaxed);
		if self.fail_compare.load(Ordering::Relaxed) {
			return Err(Error::transient("injected comparison failure"));
		}
		let mut changes = Vec::new();
		for (name, table) in &current.tables {
			match previous.tables.get(name) {
				None => changes.push(SchemaChange {
					change_type: "table_added".to_string(),
					object: name.clone(),
					column: None,
					description: format!("table '{name}' added"),
				}),
				Some(old) => {
					for column in table.columns.keys() {
						if !old.columns.contains_key(column) {
							changes.push(SchemaChange {
								change_type: "column_added".to_string(),
								object: name.clone(),
								column: Some(column.clone()),
								description: format!(
									"column '{name}.{column}' added"
								),
							});
						}
					}
					for column in old.columns.keys() {
						if !table.columns.contains_key(column) {
							changes.push(SchemaChange {
								change_type: "column_removed".to_string(),
								object: name.clone(),
								column: Some(column.clone()),
								description: format!(
									"column '{name}.{column}' removed"
								),
							});
						}
					}
				}
			}
		}
		for name in previous.tables.keys() {
			if !current.tables.contains_key(name) {
				changes.push(SchemaChange {
					change_type: "table_removed".to_string(),
					object: name.clone(),
					column: None,
					description: format!("table '{name}' removed"),
				});
			}
		}
		Ok(SchemaComparison {
			has_changes: !changes.is_empty() || previous != current,
			changes,
			warnings: Vec::new(),
		})
	}

	async fn analyze_schema_enriched(
		&self,
		_engine: EngineKind,
		_model: &UnifiedModel,
	) -> Result<SchemaEnrichment> {
		self.enrich_calls.fetch_add(1, Ordering::Relaxed);
		if self.fail_enrich.load(Ordering::Relaxed) {
			return Err(Error::transient("injected enrichment failure"));
		}
		Ok(self.enrichment.lock().clone())
	}
}

/// Uppercases text values; records calls; can be switched to fail.
#[derive(Clone, Default)]
pub struct MockTransformService {
	pub calls: Arc<Mutex<Vec<String>>>,
	pub fail: Arc<AtomicBool>,
}

#[async_trait]
impl TransformService for MockTransformService {
	async fn transform(&self, name: &str, value: &Value, _parameters: &Row) -> Result<Value> {
		self.calls.lock().push(name.to_string());
		if self.fail.load(Ordering::Relaxed) {
			return Err(Error::transient("injected transform failure"));
		}
		match value {
			Value::Text(text) => Ok(Value::Text(format!("{name}({text})"))),
			other => Ok(other.clone()),
		}
	}
}

#[derive(Default)]
struct RepoState {
	repos: Vec<RepoInfo>,
	by_database: BTreeMap<String, String>,
	commits: BTreeMap<String, Vec<SchemaCommit>>,
}

#[derive(Clone, Default)]
pub struct MockSchemaRepo {
	state: Arc<Mutex<RepoState>>,
}

impl MockSchemaRepo {
	pub fn commits_for(&self, repo_id: &str) -> Vec<SchemaCommit> {
		self.state.lock().commits.get(repo_id).cloned().unwrap_or_default()
	}

	pub fn repo_names(&self) -> Vec<String> {
		self.state.lock().repos.iter().map(|r| r.name.clone()).collect()
	}

	pub fn total_commits(&self) -> usize {
		self.state.lock().commits.values().map(Vec::len).sum()
	}
}

#[async_trait]
impl SchemaRepo for MockSchemaRepo {
	async fn find_repo_for_database(&self, database_id: &str) -> Result<Option<RepoInfo>> {
		let state = self.state.lock();
		Ok(state.by_database.get(database_id).and_then(|repo_id| {
			state.repos.iter().find(|r| r.repo_id == *repo_id).cloned()
		}))
	}

	async fn find_repo_by_name(&self, name: &str) -> Result<Option<RepoInfo>> {
		Ok(self.state.lock().repos.iter().find(|r| r.name == name).cloned())
	}

	async fn create_repo(&self, name: &str, database_id: &str) -> Result<RepoInfo> {
		let mut state = self.state.lock();
		if state.repos.iter().any(|r| r.name == name) {
			return Err(Error::already_exists(format!("repository '{name}' exists")));
		}
		let info = RepoInfo {
			repo_id: Uuid::new_v4().to_string(),
			name: name.to_string(),
			default_branch_id: "main".to_string(),
		};
		state.repos.push(info.clone());
		state.by_database.insert(database_id.to_string(), info.repo_id.clone());
		Ok(info)
	}

	async fn latest_commit(&self, repo_id: &str, branch_id: &str) -> Result<Option<SchemaCommit>> {
		Ok(self
			.state
			.lock()
			.commits
			.get(repo_id)
			.and_then(|commits| {
				commits.iter().rev().find(|c| c.branch_id == branch_id).cloned()
			}))
	}

	async fn commit_head(
		&self,
		repo_id: &str,
		branch_id: &str,
		commit: NewSchemaCommit,
	) -> Result<SchemaCommit> {
		let record = SchemaCommit {
			commit_id: Uuid::new_v4().to_string(),
			branch_id: branch_id.to_string(),
			schema_type: commit.schema_type,
			schema_json: commit.schema_json,
			message: commit.message,
			enrichment: commit.enrichment,
			created: Utc::now(),
		};
		self.state.lock().commits.entry(repo_id.to_string()).or_default().push(record.clone());
		Ok(record)
	}
}

#[derive(Default)]
struct StoreState {
	databases: Vec<DatabaseRow>,
	health: BTreeMap<String, String>,
	schema_cache: BTreeMap<String, String>,
	containers: Vec<ResourceContainer>,
	items: Vec<ResourceItem>,
	mappings: Vec<MappingRow>,
	integrations: Vec<IntegrationRow>,
}

/// In-memory registry store with operation counters.
#[derive(Clone, Default)]
pub struct MockRegistryStore {
	state: Arc<Mutex<StoreState>>,
	pub container_writes: Arc<AtomicUsize>,
	pub item_writes: Arc<AtomicUsize>,
}

impl MockRegistryStore {
	pub fn add_database(&self, row: DatabaseRow) {
		self.state.lock().databases.push(row);
	}

	pub fn add_mapping(&self, row: MappingRow) {
		self.state.lock().mappings.push(row);
	}

	pub fn add_integration(&self, row: IntegrationRow) {
		self.state.lock().integrations.push(row);
	}

	pub fn add_container(&self, row: ResourceContainer) {
		self.state.lock().containers.push(row);
	}

	pub fn add_item(&self, row: ResourceItem) {
		self.state.lock().items.push(row);
	}

	pub fn set_database_status(&self, database_id: &str, enabled: bool, status: &str) {
		let mut state = self.state.lock();
		if let Some(db) = state.databases.iter_mut().find(|d| d.database_id == database_id) {
			db.enabled = enabled;
			db.status = status.to_string();
		}
	}

	pub fn containers(&self) -> Vec<ResourceContainer> {
		self.state.lock().containers.clone()
	}

	pub fn items(&self) -> Vec<ResourceItem> {
		self.state.lock().items.clone()
	}

	pub fn mappings(&self) -> Vec<MappingRow> {
		self.state.lock().mappings.clone()
	}

	pub fn health_of(&self, database_id: &str) -> Option<String> {
		self.state.lock().health.get(database_id).cloned()
	}

	pub fn schema_cache_of(&self, database_id: &str) -> Option<String> {
		self.state.lock().schema_cache.get(database_id).cloned()
	}
}

#[async_trait]
impl RegistryStore for MockRegistryStore {
	async fn list_databases(&self) -> Result<Vec<DatabaseRow>> {
		Ok(self.state.lock().databases.clone())
	}

	async fn set_database_schema_cache(&self, database_id: &str, schema_json: &str) -> Result<()> {
		self.state.lock().schema_cache.insert(database_id.to_string(), schema_json.to_string());
		Ok(())
	}

	async fn set_database_health(&self, database_id: &str, note: &str) -> Result<()> {
		let mut state = self.state.lock();
		if note.is_empty() {
			state.health.remove(database_id);
		} else {
			state.health.insert(database_id.to_string(), note.to_string());
		}
		Ok(())
	}

	async fn list_containers(&self, database_id: &str) -> Result<Vec<ResourceContainer>> {
		Ok(self
			.state
			.lock()
			.containers
			.iter()
			.filter(|c| c.database_id.as_deref() == Some(database_id))
			.cloned()
			.collect())
	}

	async fn list_items_for_database(&self, database_id: &str) -> Result<Vec<ResourceItem>> {
		let state = self.state.lock();
		let container_ids: Vec<&str> = state
			.containers
			.iter()
			.filter(|c| c.database_id.as_deref() == Some(database_id))
			.map(|c| c.container_id.as_str())
			.collect();
		Ok(state
			.items
			.iter()
			.filter(|i| container_ids.contains(&i.container_id.as_str()))
			.cloned()
			.collect())
	}

	async fn insert_container(&self, row: ResourceContainer) -> Result<()> {
		self.container_writes.fetch_add(1, Ordering::Relaxed);
		self.state.lock().containers.push(row);
		Ok(())
	}

	async fn update_container(&self, row: &ResourceContainer) -> Result<()> {
		self.container_writes.fetch_add(1, Ordering::Relaxed);
		let mut state = self.state.lock();
		if let Some(existing) =
			state.containers.iter_mut().find(|c| c.container_id == row.container_id)
		{
			*existing = row.clone();
		}
		Ok(())
	}

	async fn delete_container(&self, container_id: &str) -> Result<()> {
		let mut state = self.state.lock();
		state.containers.retain(|c| c.container_id != container_id);
		// Containers own items: cascade.
		state.items.retain(|i| i.container_id != container_id);
		Ok(())
	}

	async fn insert_item(&self, row: ResourceItem) -> Result<()> {
		self.item_writes.fetch_add(1, Ordering::Relaxed);
		self.state.lock().items.push(row);
		Ok(())
	}

	async fn update_item(&self, row: &ResourceItem) -> Result<()> {
		self.item_writes.fetch_add(1, Ordering::Relaxed);
		let mut state = self.state.lock();
		if let Some(existing) = state.items.iter_mut().find(|i| i.item_id == row.item_id) {
			*existing = row.clone();
		}
		Ok(())
	}

	async fn delete_item(&self, item_id: &str) -> Result<()> {
		self.state.lock().items.retain(|i| i.item_id != item_id);
		Ok(())
	}

	async fn set_container_online(&self, container_id: &str, online: bool) -> Result<()> {
		self.container_writes.fetch_add(1, Ordering::Relaxed);
		let mut state = self.state.lock();
		if let Some(container) =
			state.containers.iter_mut().find(|c| c.container_id == container_id)
		{
			container.online = online;
		}
		Ok(())
	}

	async fn set_items_online_for_container(
		&self,
		container_id: &str,
		online: bool,
	) -> Result<()> {
		let mut state = self.state.lock();
		for item in state.items.iter_mut().filter(|i| i.container_id == container_id) {
			item.online = online;
		}
		Ok(())
	}

	async fn list_integration_containers(&self) -> Result<Vec<ResourceContainer>> {
		Ok(self
			.state
			.lock()
			.containers
			.iter()
			.filter(|c| c.database_id.is_none())
			.cloned()
			.collect())
	}

	async fn list_mappings(&self) -> Result<Vec<MappingRow>> {
		Ok(self.state.lock().mappings.clone())
	}

	async fn invalidate_mapping(&self, mapping_id: &str) -> Result<()> {
		let mut state = self.state.lock();
		if let Some(mapping) = state.mappings.iter_mut().find(|m| m.mapping_id == mapping_id) {
			mapping.validated = false;
			mapping.validation_errors.clear();
			mapping.validation_warnings.clear();
		}
		Ok(())
	}

	async fn list_integrations(&self) -> Result<Vec<IntegrationRow>> {
		Ok(self.state.lock().integrations.clone())
	}
}

/// Checkpoints in memory with a save counter.
#[derive(Clone, Default)]
pub struct MockCheckpointStore {
	positions: Arc<Mutex<BTreeMap<String, String>>>,
	pub saves: Arc<AtomicUsize>,
}

impl MockCheckpointStore {
	pub fn position_of(&self, key: &str) -> Option<String> {
		self.positions.lock().get(key).cloned()
	}

	pub fn set_position(&self, key: &str, position: &str) {
		self.positions.lock().insert(key.to_string(), position.to_string());
	}
}

#[async_trait]
impl CheckpointStore for MockCheckpointStore {
	async fn save(&self, replication_id: &str, position: &str) -> Result<()> {
		self.saves.fetch_add(1, Ordering::Relaxed);
		self.positions.lock().insert(replication_id.to_string(), position.to_string());
		Ok(())
	}

	async fn load(&self, replication_id: &str) -> Result<Option<String>> {
		Ok(self.positions.lock().get(replication_id).cloned())
	}
}
