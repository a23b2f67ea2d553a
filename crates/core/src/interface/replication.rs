// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_type::{Error, Result, Row};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::{capability::CdcMechanism, event::CdcEvent, interface::services, transform};

/// Async callback invoked for every canonical event a source emits.
pub type EventHandler = Arc<dyn Fn(CdcEvent) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// What a polling task reads from: one change-log table for
/// trigger-based mechanisms, the single native stream otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollChannel {
	Table(String),
	Stream,
}

/// One page of raw, dialect-specific change records.
#[derive(Clone, Debug, Default)]
pub struct ChangeBatch {
	pub records: Vec<Row>,
	/// Position after the batch, hex-encoded; `None` when nothing new
	/// was read.
	pub next_position: Option<String>,
}

/// Caller-supplied attachment request for one (database, table-set).
#[derive(Clone)]
pub struct ReplicationConfig {
	pub replication_id: String,
	pub database_id: String,
	pub table_names: Vec<String>,
	/// Hex position to resume from; `None` resolves through the
	/// checkpoint store, then falls back to the stream's tail.
	pub start_position: Option<String>,
	pub event_handler: EventHandler,
	pub checkpoint: Option<Arc<dyn services::CheckpointStore>>,
	pub rules: Vec<transform::TransformationRule>,
	/// Remote endpoint for transformation names the built-ins do not
	/// know. Absent or failing endpoints degrade rules to
	/// pass-through.
	pub transform_endpoint: Option<Arc<dyn services::TransformService>>,
}

impl std::fmt::Debug for ReplicationConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReplicationConfig")
			.field("replication_id", &self.replication_id)
			.field("database_id", &self.database_id)
			.field("table_names", &self.table_names)
			.field("start_position", &self.start_position)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationSourceState {
	Created,
	Started,
	Running,
	PausedOnError,
	Stopped,
	Closed,
}

/// Status snapshot reported by [`ReplicationSource::status`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReplicationStatus {
	pub state: ReplicationSourceState,
	pub mechanism: CdcMechanism,
	pub events_processed: u64,
	pub error_count: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_error: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub position: Option<String>,
}

/// A replication slot as reported by slot-based engines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotInfo {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub plugin: Option<String>,
	pub active: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub restart_position: Option<String>,
}

/// A live stream for one (database, table-set).
///
/// Lifecycle: created → started → (running ↔ paused-on-error) →
/// stopped → closed. `close` is idempotent after `stop`.
#[async_trait]
pub trait ReplicationSource: Send + Sync {
	fn source_id(&self) -> &str;

	fn database_id(&self) -> &str;

	fn mechanism(&self) -> CdcMechanism;

	fn is_active(&self) -> bool;

	async fn start(&self) -> Result<()>;

	/// Drains the current batch and flushes a final checkpoint.
	async fn stop(&self) -> Result<()>;

	async fn close(&self) -> Result<()>;

	fn get_position(&self) -> Option<String>;

	/// Set before `start` for crash recovery.
	fn set_position(&self, position: String) -> Result<()>;

	async fn save_checkpoint(&self) -> Result<()>;

	fn status(&self) -> ReplicationStatus;
}

/// CDC surface of one adapter connection.
///
/// The polling pipeline is mechanism-agnostic; it drives these
/// operations and never looks at engine names. Operations tied to
/// slot/publication semantics keep their `unsupported` defaults on
/// engines without them.
#[async_trait]
pub trait ReplicationOperator: Send + Sync {
	fn is_supported(&self) -> bool;

	fn supported_mechanisms(&self) -> Vec<CdcMechanism>;

	/// e.g. "database-level CDC enabled", "logical replication
	/// configured".
	async fn check_prerequisites(&self) -> Result<()>;

	/// Attach a replication source for the configured tables. The
	/// returned source is inert until `start`.
	async fn connect(&self, config: ReplicationConfig) -> Result<Arc<dyn ReplicationSource>>;

	/// Idempotently install the per-table change-log table and
	/// triggers. Only meaningful for trigger-based mechanisms.
	async fn setup_cdc_for_table(&self, _schema: &str, _table: &str) -> Result<()> {
		Err(Error::unsupported("setup_cdc_for_table"))
	}

	/// Mechanism primitive the polling tasks use: read raw change
	/// records after `position` (hex token), bounded by `limit`.
	async fn fetch_changes(
		&self,
		channel: &PollChannel,
		position: Option<&str>,
		limit: u32,
	) -> Result<ChangeBatch>;

	/// Convert one raw record into the canonical event, moving dialect
	/// bookkeeping fields into `metadata`.
	fn parse_event(&self, raw: &Row) -> Result<CdcEvent>;

	/// Translate a canonical event back into dialect SQL and execute
	/// it against this connection.
	async fn apply_event(&self, event: &CdcEvent) -> Result<u64>;

	async fn get_status(&self) -> Result<Row> {
		Ok(Row::new())
	}

	async fn get_lag(&self) -> Result<Option<i64>> {
		Ok(None)
	}

	async fn list_slots(&self) -> Result<Vec<SlotInfo>> {
		Err(Error::unsupported("list_slots"))
	}

	async fn drop_slot(&self, _name: &str) -> Result<()> {
		Err(Error::unsupported("drop_slot"))
	}

	async fn list_publications(&self) -> Result<Vec<String>> {
		Err(Error::unsupported("list_publications"))
	}

	async fn drop_publication(&self, _name: &str) -> Result<()> {
		Err(Error::unsupported("drop_publication"))
	}
}
