// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
	config::EngineKind,
	interface::replication::ReplicationOperator,
	model::{Table, UnifiedModel},
};

/// Deterministic pagination request for [`DataOperator::stream`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamParams {
	pub table: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub columns: Vec<String>,
	pub batch_size: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamResult {
	pub rows: Vec<Row>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_cursor: Option<String>,
	pub has_more: bool,
}

/// Schema discovery and DDL application.
#[async_trait]
pub trait SchemaOperator: Send + Sync {
	async fn discover_schema(&self) -> Result<UnifiedModel>;

	/// Apply a model: schemas, sequences, tables in dependency order,
	/// constraints last, then views, functions, procedures, triggers.
	/// Transactional where the engine supports DDL transactions;
	/// forward-only best effort otherwise.
	async fn create_structure(&self, model: &UnifiedModel) -> Result<()>;

	async fn list_tables(&self) -> Result<Vec<String>>;

	/// Fails with `table_not_found` for an unknown table.
	async fn get_table_schema(&self, name: &str) -> Result<Table>;
}

/// Row-level reads and writes.
///
/// Mutating operations are single-writer per connection; reads may run
/// concurrently.
#[async_trait]
pub trait DataOperator: Send + Sync {
	/// `limit <= 0` means no cap.
	async fn fetch(&self, table: &str, limit: i64) -> Result<Vec<Row>>;

	async fn fetch_with_columns(
		&self,
		table: &str,
		columns: &[String],
		limit: i64,
	) -> Result<Vec<Row>>;

	/// Single-transaction batch insert. Empty input returns 0 without
	/// touching the engine.
	async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64>;

	/// Each row updates the rows matching it by equality over
	/// `where_columns`; rows missing every where-column are skipped.
	async fn update(&self, table: &str, rows: &[Row], where_columns: &[String]) -> Result<u64>;

	/// Insert-or-update on `unique_columns` using the engine's
	/// declared upsert style.
	async fn upsert(&self, table: &str, rows: &[Row], unique_columns: &[String]) -> Result<u64>;

	/// `conditions` must be non-empty; an `Undefined` value matches
	/// with `IS NULL`.
	async fn delete(&self, table: &str, conditions: &Row) -> Result<u64>;

	async fn execute_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>>;

	async fn execute_count_query(&self, sql: &str) -> Result<i64>;

	/// Returns `(count, exact)`; engines may answer from statistics.
	async fn get_row_count(&self, table: &str, where_clause: Option<&str>) -> Result<(i64, bool)>;

	/// Empty every user table respecting FK constraints.
	async fn wipe(&self) -> Result<()>;

	/// Deterministic pagination; engines that cannot paginate
	/// deterministically keep the default.
	async fn stream(&self, _params: StreamParams) -> Result<StreamResult> {
		Err(Error::unsupported("stream"))
	}
}

/// Loose metadata probes. Probes that fail are omitted from the maps,
/// never errored.
#[async_trait]
pub trait MetadataOperator: Send + Sync {
	async fn collect_database_metadata(&self) -> Result<Row>;

	async fn collect_instance_metadata(&self) -> Result<Row>;

	async fn get_version(&self) -> Result<String>;

	async fn get_unique_identifier(&self) -> Result<String>;

	async fn get_database_size(&self) -> Result<i64>;

	async fn get_table_count(&self) -> Result<i64>;

	async fn execute_command(&self, command: &str) -> Result<Vec<Row>>;
}

/// A live, authenticated connection to one database.
///
/// `is_connected` is monotone from `true` to `false` on close; `ping`
/// may fail while the handle still exists. Owned exclusively by the
/// connection registry once registered.
#[async_trait]
pub trait AdapterConnection: Send + Sync {
	fn engine(&self) -> EngineKind;

	fn database_id(&self) -> &str;

	fn is_connected(&self) -> bool;

	async fn ping(&self) -> Result<()>;

	async fn close(&self) -> Result<()>;

	fn schema(&self) -> &dyn SchemaOperator;

	fn data(&self) -> &dyn DataOperator;

	fn metadata(&self) -> &dyn MetadataOperator;

	fn replication(&self) -> &dyn ReplicationOperator;

	/// Cached schema snapshot consumed by the schema watcher.
	fn last_schema(&self) -> Option<UnifiedModel>;

	fn set_last_schema(&self, model: UnifiedModel);
}
