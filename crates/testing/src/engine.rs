// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! In-memory engine implementing the full adapter contract.
//!
//! The engine keeps tables as plain row vectors. When a change log is
//! installed for a table, every mutation appends the row image the
//! way the AFTER triggers of a real trigger-based engine would; a
//! separate log stream serves the log-based mechanism. Which
//! mechanism the mock speaks follows the capability table of the
//! engine kind it impersonates.

use std::sync::{
	Arc,
	atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anchor_cdc::{
	PollingSource,
	trigger::{
		CHANGE_ID, CHANGE_OPERATION, CHANGE_TIMESTAMP, change_id_from_position,
		parse_change_log_row, position_from_change_id,
	},
};
use anchor_core::{
	CdcEvent, CdcMechanism, CdcOperation, EngineKind,
	interface::{
		AdapterConnection, ChangeBatch, DataOperator, MetadataOperator, PollChannel,
		ReplicationConfig, ReplicationOperator, ReplicationSource, SchemaOperator,
		StreamParams, StreamResult,
	},
	model::{Table, UnifiedModel},
};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Default)]
struct MockTable {
	schema: Table,
	rows: Vec<Row>,
}

#[derive(Default)]
struct ChangeLog {
	next_id: u64,
	rows: Vec<Row>,
}

#[derive(Default)]
struct LogStream {
	next_lsn: u64,
	records: Vec<(u64, Row)>,
}

pub struct MockEngine {
	kind: EngineKind,
	database_id: String,
	tables: Mutex<BTreeMap<String, MockTable>>,
	change_logs: Mutex<BTreeMap<String, ChangeLog>>,
	log_stream: Mutex<LogStream>,
	schema_override: Mutex<Option<UnifiedModel>>,
	fail_fetch: AtomicBool,
	fail_discovery: AtomicBool,
	setup_calls: AtomicUsize,
	applied_events: AtomicUsize,
}

impl MockEngine {
	pub fn new(kind: EngineKind, database_id: impl Into<String>) -> Arc<Self> {
		Arc::new(Self {
			kind,
			database_id: database_id.into(),
			tables: Mutex::new(BTreeMap::new()),
			change_logs: Mutex::new(BTreeMap::new()),
			log_stream: Mutex::new(LogStream::default()),
			schema_override: Mutex::new(None),
			fail_fetch: AtomicBool::new(false),
			fail_discovery: AtomicBool::new(false),
			setup_calls: AtomicUsize::new(0),
			applied_events: AtomicUsize::new(0),
		})
	}

	pub fn define_table(&self, name: impl Into<String>, schema: Table) {
		self.tables.lock().insert(
			name.into(),
			MockTable {
				schema,
				rows: Vec::new(),
			},
		);
	}

	pub fn rows_of(&self, table: &str) -> Vec<Row> {
		self.tables.lock().get(table).map(|t| t.rows.clone()).unwrap_or_default()
	}

	pub fn change_log_len(&self, table: &str) -> usize {
		self.change_logs.lock().get(table).map(|l| l.rows.len()).unwrap_or(0)
	}

	pub fn has_change_log(&self, table: &str) -> bool {
		self.change_logs.lock().contains_key(table)
	}

	pub fn setup_calls(&self) -> usize {
		self.setup_calls.load(Ordering::Relaxed)
	}

	pub fn applied_events(&self) -> usize {
		self.applied_events.load(Ordering::Relaxed)
	}

	/// Replace what `discover_schema` reports.
	pub fn set_schema_override(&self, model: UnifiedModel) {
		*self.schema_override.lock() = Some(model);
	}

	pub fn set_fail_fetch(&self, fail: bool) {
		self.fail_fetch.store(fail, Ordering::Relaxed);
	}

	pub fn set_fail_discovery(&self, fail: bool) {
		self.fail_discovery.store(fail, Ordering::Relaxed);
	}

	/// Append one record to the log-based stream; returns its
	/// position token.
	pub fn push_log_event(
		&self,
		operation: CdcOperation,
		table: &str,
		data: Option<Row>,
		old_data: Option<Row>,
	) -> String {
		let mut stream = self.log_stream.lock();
		stream.next_lsn += 1;
		let lsn = stream.next_lsn;
		let mut record = Row::new();
		record.insert("__operation".to_string(), Value::text(operation.to_string()));
		record.insert("__table".to_string(), Value::text(table));
		record.insert("__lsn".to_string(), Value::Int(lsn as i64));
		if let Some(data) = data {
			record.insert("__data".to_string(), Value::Object(data.into_iter().collect()));
		}
		if let Some(old) = old_data {
			record.insert("__old".to_string(), Value::Object(old.into_iter().collect()));
		}
		stream.records.push((lsn, record));
		format!("{lsn:016x}")
	}

	fn matches(row: &Row, conditions: &Row) -> bool {
		conditions.iter().all(|(column, expected)| match row.get(column) {
			Some(actual) if expected.is_undefined() => actual.is_undefined(),
			Some(actual) => actual == expected,
			None => expected.is_undefined(),
		})
	}

	fn log_change(&self, table: &str, operation: &str, image: &Row) {
		let mut logs = self.change_logs.lock();
		let Some(log) = logs.get_mut(table) else {
			return;
		};
		log.next_id += 1;
		let mut entry: Row = image.clone();
		entry.insert(CHANGE_OPERATION.to_string(), Value::text(operation));
		entry.insert(CHANGE_TIMESTAMP.to_string(), Value::Timestamp(Utc::now()));
		entry.insert(CHANGE_ID.to_string(), Value::Int(log.next_id as i64));
		log.rows.push(entry);
	}

	fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
		{
			let mut tables = self.tables.lock();
			let entry = tables.entry(table.to_string()).or_default();
			entry.rows.push(row.clone());
		}
		self.log_change(table, "INSERT", row);
		Ok(())
	}

	fn update_rows(&self, table: &str, assignments: &Row, conditions: &Row) -> Result<u64> {
		let mut changed = Vec::new();
		{
			let mut tables = self.tables.lock();
			let Some(entry) = tables.get_mut(table) else {
				return Err(Error::table_not_found(table));
			};
			for row in entry.rows.iter_mut() {
				if Self::matches(row, conditions) {
					for (column, value) in assignments {
						row.insert(column.clone(), value.clone());
					}
					changed.push(row.clone());
				}
			}
		}
		for row in &changed {
			self.log_change(table, "UPDATE", row);
		}
		Ok(changed.len() as u64)
	}

	fn delete_rows(&self, table: &str, conditions: &Row) -> Result<u64> {
		let mut removed = Vec::new();
		{
			let mut tables = self.tables.lock();
			let Some(entry) = tables.get_mut(table) else {
				return Err(Error::table_not_found(table));
			};
			entry.rows.retain(|row| {
				if Self::matches(row, conditions) {
					removed.push(row.clone());
					false
				} else {
					true
				}
			});
		}
		for row in &removed {
			self.log_change(table, "DELETE", row);
		}
		Ok(removed.len() as u64)
	}
}

pub struct MockConnection {
	engine: Arc<MockEngine>,
	connected: AtomicBool,
	schema_op: MockSchemaOp,
	data_op: MockDataOp,
	metadata_op: MockMetadataOp,
	replication_op: MockReplicationOp,
	last_schema: Mutex<Option<UnifiedModel>>,
}

impl MockConnection {
	pub fn new(engine: Arc<MockEngine>) -> Arc<Self> {
		Arc::new(Self {
			schema_op: MockSchemaOp {
				engine: Arc::clone(&engine),
			},
			data_op: MockDataOp {
				engine: Arc::clone(&engine),
			},
			metadata_op: MockMetadataOp {
				engine: Arc::clone(&engine),
			},
			replication_op: MockReplicationOp {
				engine: Arc::clone(&engine),
			},
			engine,
			connected: AtomicBool::new(true),
			last_schema: Mutex::new(None),
		})
	}

	pub fn engine_handle(&self) -> Arc<MockEngine> {
		Arc::clone(&self.engine)
	}
}

#[async_trait]
impl AdapterConnection for MockConnection {
	fn engine(&self) -> EngineKind {
		self.engine.kind
	}

	fn database_id(&self) -> &str {
		&self.engine.database_id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire)
	}

	async fn ping(&self) -> Result<()> {
		if self.connected.load(Ordering::Acquire) {
			Ok(())
		} else {
			Err(Error::connection("connection is closed"))
		}
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

struct MockSchemaOp {
	engine: Arc<MockEngine>,
}

#[async_trait]
impl SchemaOperator for MockSchemaOp {
	async fn discover_schema(&self) -> Result<UnifiedModel> {
		if self.engine.fail_discovery.load(Ordering::Relaxed) {
			return Err(Error::transient("injected discovery failure"));
		}
		if let Some(model) = self.engine.schema_override.lock().clone() {
			return Ok(model);
		}
		let mut model = UnifiedModel::default();
		for (name, table) in self.engine.tables.lock().iter() {
			let mut schema = table.schema.clone();
			if schema.name.is_empty() {
				schema.name = name.clone();
			}
			model.tables.insert(name.clone(), schema);
		}
		Ok(model)
	}

	async fn create_structure(&self, model: &UnifiedModel) -> Result<()> {
		for (name, table) in &model.tables {
			self.engine.define_table(name.clone(), table.clone());
		}
		Ok(())
	}

	async fn list_tables(&self) -> Result<Vec<String>> {
		Ok(self.engine.tables.lock().keys().cloned().collect())
	}

	async fn get_table_schema(&self, name: &str) -> Result<Table> {
		self.engine
			.tables
			.lock()
			.get(name)
			.map(|t| t.schema.clone())
			.ok_or_else(|| Error::table_not_found(name))
	}
}

struct MockDataOp {
	engine: Arc<MockEngine>,
}

#[async_trait]
impl DataOperator for MockDataOp {
	async fn fetch(&self, table: &str, limit: i64) -> Result<Vec<Row>> {
		let rows = self.engine.rows_of(table);
		if limit > 0 {
			Ok(rows.into_iter().take(limit as usize).collect())
		} else {
			Ok(rows)
		}
	}

	async fn fetch_with_columns(
		&self,
		table: &str,
		columns: &[String],
		limit: i64,
	) -> Result<Vec<Row>> {
		let rows = self.fetch(table, limit).await?;
		Ok(rows
			.into_iter()
			.map(|row| {
				row.into_iter().filter(|(column, _)| columns.contains(column)).collect()
			})
			.collect())
	}

	async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		for row in rows {
			self.engine.insert_row(table, row)?;
		}
		Ok(rows.len() as u64)
	}

	async fn update(&self, table: &str, rows: &[Row], where_columns: &[String]) -> Result<u64> {
		if where_columns.is_empty() {
			return Err(Error::invalid_data("update requires where_columns"));
		}
		let mut affected = 0;
		for row in rows {
			let conditions: Row = where_columns
				.iter()
				.filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
				.collect();
			if conditions.is_empty() {
				continue;
			}
			let assignments: Row = row
				.iter()
				.filter(|(c, _)| !where_columns.contains(c))
				.map(|(c, v)| (c.clone(), v.clone()))
				.collect();
			if assignments.is_empty() {
				continue;
			}
			affected += self.engine.update_rows(table, &assignments, &conditions)?;
		}
		Ok(affected)
	}

	async fn upsert(&self, table: &str, rows: &[Row], unique_columns: &[String]) -> Result<u64> {
		if unique_columns.is_empty() {
			return Err(Error::invalid_data("upsert requires unique_columns"));
		}
		let mut affected = 0;
		for row in rows {
			let key: Row = unique_columns
				.iter()
				.filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
				.collect();
			let exists = self
				.engine
				.rows_of(table)
				.iter()
				.any(|existing| MockEngine::matches(existing, &key));
			if exists {
				let assignments: Row = row
					.iter()
					.filter(|(c, _)| !unique_columns.contains(c))
					.map(|(c, v)| (c.clone(), v.clone()))
					.collect();
				affected += self.engine.update_rows(table, &assignments, &key)?;
			} else {
				self.engine.insert_row(table, row)?;
				affected += 1;
			}
		}
		Ok(affected)
	}

	async fn delete(&self, table: &str, conditions: &Row) -> Result<u64> {
		if conditions.is_empty() {
			return Err(Error::invalid_data("delete requires conditions"));
		}
		self.engine.delete_rows(table, conditions)
	}

	async fn execute_query(&self, _sql: &str, _args: &[Value]) -> Result<Vec<Row>> {
		Ok(Vec::new())
	}

	async fn execute_count_query(&self, _sql: &str) -> Result<i64> {
		Ok(0)
	}

	async fn get_row_count(&self, table: &str, _where_clause: Option<&str>) -> Result<(i64, bool)> {
		Ok((self.engine.rows_of(table).len() as i64, true))
	}

	async fn wipe(&self) -> Result<()> {
		for entry in self.engine.tables.lock().values_mut() {
			entry.rows.clear();
		}
		Ok(())
	}

	async fn stream(&self, params: StreamParams) -> Result<StreamResult> {
		let rows = self.engine.rows_of(&params.table);
		Ok(StreamResult {
			has_more: false,
			next_cursor: None,
			rows,
		})
	}
}

struct MockMetadataOp {
	engine: Arc<MockEngine>,
}

#[async_trait]
impl MetadataOperator for MockMetadataOp {
	async fn collect_database_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("version".to_string(), Value::text("mock-1.0"));
		map.insert(
			"tables_count".to_string(),
			Value::Int(self.engine.tables.lock().len() as i64),
		);
		map.insert("database_name".to_string(), Value::text(self.engine.database_id.clone()));
		Ok(map)
	}

	async fn collect_instance_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("version".to_string(), Value::text("mock-1.0"));
		map.insert("unique_identifier".to_string(), Value::text("mock-instance"));
		Ok(map)
	}

	async fn get_version(&self) -> Result<String> {
		Ok("mock-1.0".to_string())
	}

	async fn get_unique_identifier(&self) -> Result<String> {
		Ok("mock-instance".to_string())
	}

	async fn get_database_size(&self) -> Result<i64> {
		Ok(0)
	}

	async fn get_table_count(&self) -> Result<i64> {
		Ok(self.engine.tables.lock().len() as i64)
	}

	async fn execute_command(&self, _command: &str) -> Result<Vec<Row>> {
		Ok(Vec::new())
	}
}

#[derive(Clone)]
pub struct MockReplicationOp {
	engine: Arc<MockEngine>,
}

#[async_trait]
impl ReplicationOperator for MockReplicationOp {
	fn is_supported(&self) -> bool {
		self.engine.kind.capabilities().supports_replication()
	}

	fn supported_mechanisms(&self) -> Vec<CdcMechanism> {
		self.engine.kind.capabilities().cdc_mechanisms.to_vec()
	}

	async fn check_prerequisites(&self) -> Result<()> {
		if self.is_supported() {
			Ok(())
		} else {
			Err(Error::unsupported("replication")
				.with_engine(self.engine.kind.to_string()))
		}
	}

	async fn connect(&self, config: ReplicationConfig) -> Result<Arc<dyn ReplicationSource>> {
		if !self.is_supported() {
			return Err(Error::unsupported("replication")
				.with_engine(self.engine.kind.to_string()));
		}
		let mechanism = self.engine.kind.capabilities().primary_mechanism();
		if mechanism == CdcMechanism::TriggerBased {
			for table in &config.table_names {
				self.setup_cdc_for_table("", table).await?;
			}
		}
		Ok(PollingSource::create(Arc::new(self.clone()), config, mechanism))
	}

	async fn setup_cdc_for_table(&self, _schema: &str, table: &str) -> Result<()> {
		self.engine.setup_calls.fetch_add(1, Ordering::Relaxed);
		if !self.engine.tables.lock().contains_key(table) {
			return Err(Error::table_not_found(table));
		}
		// Existing logs are tolerated, never duplicated.
		self.engine.change_logs.lock().entry(table.to_string()).or_default();
		Ok(())
	}

	async fn fetch_changes(
		&self,
		channel: &PollChannel,
		position: Option<&str>,
		limit: u32,
	) -> Result<ChangeBatch> {
		if self.engine.fail_fetch.load(Ordering::Relaxed) {
			return Err(Error::transient("injected fetch failure"));
		}
		match channel {
			PollChannel::Table(table) => {
				let last_seen = match position {
					Some(position) => change_id_from_position(position)?,
					None => 0,
				};
				let mut batch = ChangeBatch::default();
				let logs = self.engine.change_logs.lock();
				let Some(log) = logs.get(table) else {
					return Ok(batch);
				};
				for entry in &log.rows {
					let Some(Value::Int(id)) = entry.get(CHANGE_ID) else {
						continue;
					};
					let id = *id as u64;
					if id <= last_seen {
						continue;
					}
					if batch.records.len() as u32 >= limit.max(1) {
						break;
					}
					let mut raw = entry.clone();
					raw.insert("__table".to_string(), Value::text(table.clone()));
					batch.records.push(raw);
					batch.next_position = Some(position_from_change_id(id));
				}
				Ok(batch)
			}
			PollChannel::Stream => {
				let last_seen = match position {
					Some(position) => u64::from_str_radix(position, 16)
						.map_err(|_| {
							Error::invalid_data(format!(
								"malformed position '{position}'"
							))
						})?,
					None => 0,
				};
				let mut batch = ChangeBatch::default();
				let stream = self.engine.log_stream.lock();
				for (lsn, record) in &stream.records {
					if *lsn <= last_seen {
						continue;
					}
					if batch.records.len() as u32 >= limit.max(1) {
						break;
					}
					batch.records.push(record.clone());
					batch.next_position = Some(format!("{lsn:016x}"));
				}
				Ok(batch)
			}
		}
	}

	fn parse_event(&self, raw: &Row) -> Result<CdcEvent> {
		if raw.contains_key(CHANGE_OPERATION) {
			let mut raw = raw.clone();
			let table = match raw.remove("__table") {
				Some(Value::Text(table)) => table,
				_ => return Err(Error::invalid_data("change-log record has no table")),
			};
			return parse_change_log_row(&table, &raw);
		}

		// Log-stream record.
		let operation = match raw.get("__operation") {
			Some(Value::Text(op)) => match op.as_str() {
				"insert" => CdcOperation::Insert,
				"update" => CdcOperation::Update,
				"delete" => CdcOperation::Delete,
				other => {
					return Err(Error::invalid_data(format!(
						"unknown operation '{other}'"
					)));
				}
			},
			_ => return Err(Error::invalid_data("log record has no operation")),
		};
		let table = match raw.get("__table") {
			Some(Value::Text(table)) => table.clone(),
			_ => return Err(Error::invalid_data("log record has no table")),
		};
		let mut event = CdcEvent::new(operation, table);
		if let Some(Value::Object(data)) = raw.get("__data") {
			event.data = Some(data.clone().into_iter().collect());
		}
		if let Some(Value::Object(old)) = raw.get("__old") {
			event.old_data = Some(old.clone().into_iter().collect());
		}
		if let Some(Value::Int(lsn)) = raw.get("__lsn") {
			event.lsn = Some(format!("{:016x}", *lsn as u64));
			event.metadata.insert("lsn".to_string(), Value::Int(*lsn));
		}
		Ok(event)
	}

	async fn apply_event(&self, event: &CdcEvent) -> Result<u64> {
		event.validate()?;
		self.engine.applied_events.fetch_add(1, Ordering::Relaxed);
		match event.operation {
			CdcOperation::Insert => {
				let data = event.data.clone().unwrap_or_default();
				self.engine.insert_row(&event.table_name, &data)?;
				Ok(1)
			}
			CdcOperation::Update => {
				let data = event.data.clone().unwrap_or_default();
				let key = event.key_image().cloned().unwrap_or_default();
				self.engine.update_rows(&event.table_name, &data, &key)
			}
			CdcOperation::Delete => {
				let key = event.key_image().cloned().unwrap_or_default();
				if key.is_empty() {
					return Err(Error::invalid_data("delete event has no key image"));
				}
				self.engine.delete_rows(&event.table_name, &key)
			}
		}
	}
}
