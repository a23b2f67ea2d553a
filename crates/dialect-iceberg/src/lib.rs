// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Iceberg REST catalog adapter.
//!
//! The catalog yields namespaces, tables and snapshots for the
//! unified model. There are no data-format readers here: mutating
//! data operations and replication report `unsupported_operation`.

pub use catalog::{RestCatalog, namespace_path, unified_type};

mod catalog;

use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use anchor_core::{
	CdcEvent, CdcMechanism, ConnectionConfig, EngineKind,
	interface::{
		AdapterConnection, AdapterFactory, ChangeBatch, DataOperator, MetadataOperator,
		PollChannel, ReplicationConfig, ReplicationOperator, ReplicationSource, SchemaOperator,
		decrypt_password, services::SecretService,
	},
	model::{Column, ExternalTable, Namespace, Snapshot, Table, UnifiedModel},
};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;

pub struct IcebergSchema {
	catalog: Arc<RestCatalog>,
}

fn table_key(namespace: &[String], name: &str) -> String {
	if namespace.is_empty() {
		name.to_string()
	} else {
		format!("{}.{name}", namespace.join("."))
	}
}

impl IcebergSchema {
	fn table_from_metadata(
		&self,
		namespace: &[String],
		name: &str,
		metadata: &catalog::TableMetadata,
	) -> Table {
		let mut table = Table::new(name);
		if !namespace.is_empty() {
			table.schema = Some(namespace.join("."));
		}
		if let Some(schema) = metadata.current_schema() {
			for field in &schema.fields {
				let rendered_type = field
					.field_type
					.as_str()
					.map(str::to_string)
					.unwrap_or_else(|| field.field_type.to_string());
				table.columns.insert(
					field.name.clone(),
					Column {
						unified_data_type: unified_type(&field.field_type).to_string(),
						data_type: rendered_type,
						nullable: !field.required,
						..Default::default()
					},
				);
			}
		}
		table.options.insert("location".to_string(), Value::text(metadata.location.clone()));
		table
	}
}

#[async_trait]
impl SchemaOperator for IcebergSchema {
	async fn discover_schema(&self) -> Result<UnifiedModel> {
		let mut model = UnifiedModel::default();
		for namespace in self.catalog.list_namespaces().await? {
			let key = namespace.join(".");
			model.namespaces.insert(
				key.clone(),
				Namespace {
					name: key.clone(),
					properties: Row::new(),
				},
			);
			for ident in self.catalog.list_tables(&namespace).await? {
				let metadata =
					self.catalog.load_table(&ident.namespace, &ident.name).await?;
				let key = table_key(&ident.namespace, &ident.name);
				let table =
					self.table_from_metadata(&ident.namespace, &ident.name, &metadata);
				model.external_tables.insert(
					key.clone(),
					ExternalTable {
						name: ident.name.clone(),
						location: Some(metadata.location.clone()),
						format: Some("iceberg".to_string()),
					},
				);
				for snapshot in &metadata.snapshots {
					model.snapshots.insert(
						format!("{key}@{}", snapshot.snapshot_id),
						Snapshot {
							id: snapshot.snapshot_id.to_string(),
							table: Some(key.clone()),
							timestamp_ms: Some(snapshot.timestamp_ms),
						},
					);
				}
				model.insert_table(table);
			}
		}
		Ok(model)
	}

	async fn create_structure(&self, _model: &UnifiedModel) -> Result<()> {
		Err(Error::unsupported("create_structure").with_engine("iceberg"))
	}

	async fn list_tables(&self) -> Result<Vec<String>> {
		let mut out = Vec::new();
		for namespace in self.catalog.list_namespaces().await? {
			for ident in self.catalog.list_tables(&namespace).await? {
				out.push(table_key(&ident.namespace, &ident.name));
			}
		}
		out.sort();
		Ok(out)
	}

	async fn get_table_schema(&self, name: &str) -> Result<Table> {
		let (namespace, bare) = match name.rsplit_once('.') {
			Some((ns, bare)) => {
				(ns.split('.').map(str::to_string).collect::<Vec<_>>(), bare)
			}
			None => (Vec::new(), name),
		};
		match self.catalog.load_table(&namespace, bare).await {
			Ok(metadata) => Ok(self.table_from_metadata(&namespace, bare, &metadata)),
			Err(err) if err.kind() == anchor_type::ErrorKind::NotFound => {
				Err(Error::table_not_found(name).with_engine("iceberg"))
			}
			Err(err) => Err(err),
		}
	}
}

pub struct IcebergData {
	catalog: Arc<RestCatalog>,
}

impl IcebergData {
	fn read_only(operation: &str) -> Error {
		Error::unsupported(operation).with_engine("iceberg")
	}
}

#[async_trait]
impl DataOperator for IcebergData {
	async fn fetch(&self, _table: &str, _limit: i64) -> Result<Vec<Row>> {
		// Reading data files needs a Parquet/ORC reader, which this
		// service does not carry.
		Err(Self::read_only("fetch"))
	}

	async fn fetch_with_columns(
		&self,
		_table: &str,
		_columns: &[String],
		_limit: i64,
	) -> Result<Vec<Row>> {
		Err(Self::read_only("fetch_with_columns"))
	}

	async fn insert(&self, _table: &str, rows: &[Row]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		Err(Self::read_only("insert"))
	}

	async fn update(&self, _table: &str, _rows: &[Row], _where_columns: &[String]) -> Result<u64> {
		Err(Self::read_only("update"))
	}

	async fn upsert(&self, _table: &str, _rows: &[Row], _unique_columns: &[String]) -> Result<u64> {
		Err(Self::read_only("upsert"))
	}

	async fn delete(&self, _table: &str, _conditions: &Row) -> Result<u64> {
		Err(Self::read_only("delete"))
	}

	async fn execute_query(&self, _sql: &str, _args: &[Value]) -> Result<Vec<Row>> {
		Err(Self::read_only("execute_query"))
	}

	async fn execute_count_query(&self, _sql: &str) -> Result<i64> {
		Err(Self::read_only("execute_count_query"))
	}

	async fn get_row_count(&self, table: &str, where_clause: Option<&str>) -> Result<(i64, bool)> {
		if where_clause.is_some_and(|w| !w.trim().is_empty()) {
			return Err(Self::read_only("get_row_count"));
		}
		let (namespace, bare) = match table.rsplit_once('.') {
			Some((ns, bare)) => {
				(ns.split('.').map(str::to_string).collect::<Vec<_>>(), bare)
			}
			None => (Vec::new(), table),
		};
		let metadata = self.catalog.load_table(&namespace, bare).await?;
		// Snapshot summaries carry approximate record counts.
		let count = metadata
			.current_snapshot()
			.and_then(|s| s.summary.get("total-records"))
			.and_then(|v| v.as_str().and_then(|s| s.parse().ok()).or(v.as_i64()))
			.ok_or_else(|| Self::read_only("get_row_count"))?;
		Ok((count, false))
	}

	async fn wipe(&self) -> Result<()> {
		Err(Self::read_only("wipe"))
	}
}

pub struct IcebergMetadata {
	catalog: Arc<RestCatalog>,
	database_name: String,
}

#[async_trait]
impl MetadataOperator for IcebergMetadata {
	async fn collect_database_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("database_name".to_string(), Value::text(self.database_name.clone()));
		if let Ok(tables) = self.catalog.list_namespaces().await {
			let mut count = 0i64;
			for namespace in &tables {
				if let Ok(idents) = self.catalog.list_tables(namespace).await {
					count += idents.len() as i64;
				}
			}
			map.insert("tables_count".to_string(), Value::Int(count));
		}
		Ok(map)
	}

	async fn collect_instance_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		if let Ok(config) = self.catalog.config().await {
			map.insert("catalog_config".to_string(), Value::from_json(config));
		}
		Ok(map)
	}

	async fn get_version(&self) -> Result<String> {
		Err(Error::unsupported("get_version").with_engine("iceberg"))
	}

	async fn get_unique_identifier(&self) -> Result<String> {
		Ok(self.database_name.clone())
	}

	async fn get_database_size(&self) -> Result<i64> {
		Err(Error::unsupported("get_database_size").with_engine("iceberg"))
	}

	async fn get_table_count(&self) -> Result<i64> {
		let mut count = 0i64;
		for namespace in self.catalog.list_namespaces().await? {
			count += self.catalog.list_tables(&namespace).await?.len() as i64;
		}
		Ok(count)
	}

	async fn execute_command(&self, _command: &str) -> Result<Vec<Row>> {
		Err(Error::unsupported("execute_command").with_engine("iceberg"))
	}
}

pub struct IcebergReplication;

#[async_trait]
impl ReplicationOperator for IcebergReplication {
	fn is_supported(&self) -> bool {
		false
	}

	fn supported_mechanisms(&self) -> Vec<CdcMechanism> {
		vec![CdcMechanism::None]
	}

	async fn check_prerequisites(&self) -> Result<()> {
		Err(Error::unsupported("replication").with_engine("iceberg"))
	}

	async fn connect(&self, _config: ReplicationConfig) -> Result<Arc<dyn ReplicationSource>> {
		Err(Error::unsupported("replication").with_engine("iceberg"))
	}

	async fn fetch_changes(
		&self,
		_channel: &PollChannel,
		_position: Option<&str>,
		_limit: u32,
	) -> Result<ChangeBatch> {
		Err(Error::unsupported("fetch_changes").with_engine("iceberg"))
	}

	fn parse_event(&self, _raw: &Row) -> Result<CdcEvent> {
		Err(Error::unsupported("parse_event").with_engine("iceberg"))
	}

	async fn apply_event(&self, _event: &CdcEvent) -> Result<u64> {
		Err(Error::unsupported("apply_event").with_engine("iceberg"))
	}
}

pub struct IcebergConnection {
	database_id: String,
	catalog: Arc<RestCatalog>,
	connected: AtomicBool,
	schema_op: IcebergSchema,
	data_op: IcebergData,
	metadata_op: IcebergMetadata,
	replication_op: IcebergReplication,
	last_schema: parking_lot::Mutex<Option<UnifiedModel>>,
}

#[async_trait]
impl AdapterConnection for IcebergConnection {
	fn engine(&self) -> EngineKind {
		EngineKind::Iceberg
	}

	fn database_id(&self) -> &str {
		&self.database_id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire)
	}

	async fn ping(&self) -> Result<()> {
		if !self.connected.load(Ordering::Acquire) {
			return Err(Error::connection("connection is closed").with_engine("iceberg"));
		}
		self.catalog.list_namespaces().await.map(|_| ())
	}

	async fn close(&self) -> Result<()> {
		self.connected.store(false, Ordering::Release);
		Ok(())
	}

	fn schema(&self) -> &dyn SchemaOperator {
		&self.schema_op
	}

	fn data(&self) -> &dyn DataOperator {
		&self.data_op
	}

	fn metadata(&self) -> &dyn MetadataOperator {
		&self.metadata_op
	}

	fn replication(&self) -> &dyn ReplicationOperator {
		&self.replication_op
	}

	fn last_schema(&self) -> Option<UnifiedModel> {
		self.last_schema.lock().clone()
	}

	fn set_last_schema(&self, model: UnifiedModel) {
		*self.last_schema.lock() = Some(model);
	}
}

pub struct IcebergFactory;

#[async_trait]
impl AdapterFactory for IcebergFactory {
	fn engine(&self) -> EngineKind {
		EngineKind::Iceberg
	}

	async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		let token = decrypt_password(config, secrets).await?;
		let catalog = Arc::new(RestCatalog::new(config, &token));

		// The catalog has no session; reachability is the handshake.
		catalog.list_namespaces().await.map_err(|err| {
			Error::connection(format!("iceberg catalog handshake failed: {err}"))
				.with_engine("iceberg")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string())
		})?;

		Ok(Arc::new(IcebergConnection {
			database_id: config.database_id.clone(),
			schema_op: IcebergSchema {
				catalog: Arc::clone(&catalog),
			},
			data_op: IcebergData {
				catalog: Arc::clone(&catalog),
			},
			metadata_op: IcebergMetadata {
				catalog: Arc::clone(&catalog),
				database_name: config.database_name.clone(),
			},
			replication_op: IcebergReplication,
			catalog,
			connected: AtomicBool::new(true),
			last_schema: parking_lot::Mutex::new(None),
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_table_key() {
		assert_eq!(table_key(&["lake".to_string(), "raw".to_string()], "events"), "lake.raw.events");
		assert_eq!(table_key(&[], "events"), "events");
	}

	#[tokio::test]
	async fn test_replication_reports_unsupported() {
		let replication = IcebergReplication;
		assert!(!replication.is_supported());
		let err = replication.check_prerequisites().await.unwrap_err();
		assert!(err.is_unsupported());
	}
}
