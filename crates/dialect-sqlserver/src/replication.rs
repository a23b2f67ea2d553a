// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! CDC-table polling.
//!
//! Tables are enabled with `sys.sp_cdc_enable_table`; changes are read
//! from `cdc.fn_cdc_get_all_changes_<capture_instance>` in `all update
//! old` mode. `__$operation` codes 1/2/3/4 map to delete, insert,
//! update-before and update-after; 3/4 rows sharing `__$seqval`
//! coalesce into one canonical update event. Positions are hex-encoded
//! 10-byte LSNs.

use std::sync::Arc;

use anchor_cdc::PollingSource;
use anchor_core::{
	CdcEvent, CdcMechanism, CdcOperation, EngineKind,
	interface::{
		ChangeBatch, PollChannel, ReplicationConfig, ReplicationOperator, ReplicationSource,
	},
};
use anchor_sql::build_apply_statement;
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::SqlServerDriver;

const OP_DELETE: i64 = 1;
const OP_INSERT: i64 = 2;
const OP_UPDATE_BEFORE: i64 = 3;
const OP_UPDATE_AFTER: i64 = 4;

#[derive(Clone)]
pub struct SqlServerReplication {
	pub(crate) driver: Arc<SqlServerDriver>,
}

pub fn capture_instance(table: &str) -> String {
	match table.split_once('.') {
		Some((schema, name)) => format!("{schema}_{name}"),
		None => format!("dbo_{table}"),
	}
}

fn is_bookkeeping(column: &str) -> bool {
	column.starts_with("__$")
}

/// Collapse `all update old` row pairs: an update-before row is held
/// until its update-after partner (same `__$seqval`) arrives and is
/// attached as the old image.
pub fn coalesce_changes(rows: Vec<Row>) -> Vec<Row> {
	let mut out = Vec::with_capacity(rows.len());
	let mut pending_before: Option<(String, Row)> = None;
	for mut row in rows {
		let operation = match row.get("__$operation") {
			Some(Value::Int(op)) => *op,
			_ => continue,
		};
		let seqval = row.get("__$seqval").map(|v| v.as_sql_text()).unwrap_or_default();
		match operation {
			OP_UPDATE_BEFORE => {
				let image: Row = row
					.iter()
					.filter(|(c, _)| !is_bookkeeping(c))
					.map(|(c, v)| (c.clone(), v.clone()))
					.collect();
				pending_before = Some((seqval, image));
			}
			OP_UPDATE_AFTER => {
				if let Some((before_seqval, image)) = pending_before.take() {
					if before_seqval == seqval {
						row.insert(
							"__$old_data".to_string(),
							Value::Object(image.into_iter().collect()),
						);
					}
				}
				out.push(row);
			}
			_ => out.push(row),
		}
	}
	out
}

/// One coalesced change row into the canonical event.
pub fn parse_cdc_row(raw: &Row) -> Result<CdcEvent> {
	let table = match raw.get("__table") {
		Some(Value::Text(table)) => table.clone(),
		_ => return Err(Error::invalid_data("cdc record has no table")),
	};
	let operation = match raw.get("__$operation") {
		Some(Value::Int(op)) => *op,
		_ => return Err(Error::invalid_data("cdc record has no __$operation")),
	};

	let image: Row = raw
		.iter()
		.filter(|(c, _)| !is_bookkeeping(c) && c.as_str() != "__table")
		.map(|(c, v)| (c.clone(), v.clone()))
		.collect();

	let mut event = match operation {
		OP_INSERT => {
			let mut e = CdcEvent::new(CdcOperation::Insert, table);
			e.data = Some(image);
			e
		}
		OP_DELETE => {
			let mut e = CdcEvent::new(CdcOperation::Delete, table);
			e.old_data = Some(image);
			e
		}
		OP_UPDATE_AFTER => {
			let mut e = CdcEvent::new(CdcOperation::Update, table);
			e.data = Some(image);
			if let Some(Value::Object(old)) = raw.get("__$old_data") {
				e.old_data = Some(old.clone().into_iter().collect());
			}
			e
		}
		OP_UPDATE_BEFORE => {
			return Err(Error::invalid_data(
				"update-before row reached parsing without its after-image",
			));
		}
		other => {
			return Err(Error::invalid_data(format!("unknown __$operation {other}")));
		}
	};

	if let Some(lsn) = raw.get("__$start_lsn") {
		let hex = match lsn {
			Value::Bytes(bytes) => hex::encode(bytes),
			other => other.as_sql_text(),
		};
		event.metadata.insert("start_lsn".to_string(), Value::text(hex.clone()));
		event.lsn = Some(hex);
	}
	if let Some(seqval) = raw.get("__$seqval") {
		let hex = match seqval {
			Value::Bytes(bytes) => hex::encode(bytes),
			other => other.as_sql_text(),
		};
		event.metadata.insert("seqval".to_string(), Value::text(hex));
	}
	Ok(event)
}

impl SqlServerReplication {
	async fn lsn_scalar(&self, sql: &str, args: &[Value]) -> Result<Option<Vec<u8>>> {
		let rows = self.driver.query(sql, args).await?;
		match rows.first().and_then(|row| row.values().next()) {
			Some(Value::Bytes(bytes)) => Ok(Some(bytes.clone())),
			_ => Ok(None),
		}
	}
}

#[async_trait]
impl ReplicationOperator for SqlServerReplication {
	fn is_supported(&self) -> bool {
		true
	}

	fn supported_mechanisms(&self) -> Vec<CdcMechanism> {
		EngineKind::Sqlserver.capabilities().cdc_mechanisms.to_vec()
	}

	async fn check_prerequisites(&self) -> Result<()> {
		let rows = self
			.driver
			.query(
				"SELECT is_cdc_enabled FROM sys.databases WHERE name = DB_NAME()",
				&[],
			)
			.await?;
		let enabled = matches!(
			rows.first().and_then(|r| r.get("is_cdc_enabled")),
			Some(Value::Bool(true)) | Some(Value::Int(1))
		);
		if !enabled {
			return Err(Error::configuration(
				"database-level CDC is not enabled (sys.sp_cdc_enable_db)",
			)
			.with_engine("sqlserver"));
		}
		Ok(())
	}

	async fn connect(&self, config: ReplicationConfig) -> Result<Arc<dyn ReplicationSource>> {
		for table in &config.table_names {
			let (schema, bare) = match table.split_once('.') {
				Some((schema, bare)) => (schema, bare),
				None => ("dbo", table.as_str()),
			};
			self.setup_cdc_for_table(schema, bare).await?;
		}
		Ok(PollingSource::create(
			Arc::new(self.clone()),
			config,
			CdcMechanism::CdcTables,
		))
	}

	async fn setup_cdc_for_table(&self, schema: &str, table: &str) -> Result<()> {
		let schema = if schema.is_empty() { "dbo" } else { schema };
		let rows = self
			.driver
			.query(
				"SELECT t.is_tracked_by_cdc FROM sys.tables t \
				 JOIN sys.schemas s ON s.schema_id = t.schema_id \
				 WHERE s.name = @p1 AND t.name = @p2",
				&[Value::text(schema), Value::text(table)],
			)
			.await?;
		let Some(row) = rows.first() else {
			return Err(Error::table_not_found(format!("{schema}.{table}"))
				.with_engine("sqlserver"));
		};
		let tracked = matches!(
			row.get("is_tracked_by_cdc"),
			Some(Value::Bool(true)) | Some(Value::Int(1))
		);
		if tracked {
			// Existing capture instances are tolerated, not
			// duplicated.
			return Ok(());
		}
		let sql = format!(
			"EXEC sys.sp_cdc_enable_table \
			 @source_schema = N'{}', @source_name = N'{}', @role_name = NULL, \
			 @supports_net_changes = 0",
			schema.replace('\'', "''"),
			table.replace('\'', "''"),
		);
		self.driver.batch(&sql).await?;
		debug!(schema, table, "cdc capture instance enabled");
		Ok(())
	}

	async fn fetch_changes(
		&self,
		channel: &PollChannel,
		position: Option<&str>,
		limit: u32,
	) -> Result<ChangeBatch> {
		let PollChannel::Table(table) = channel else {
			return Err(Error::invalid_data("cdc-table polling is per table"));
		};
		let instance = capture_instance(table);

		let from_lsn = match position {
			Some(position) => hex::decode(position).map_err(|_| {
				Error::invalid_data(format!("malformed position '{position}'"))
			})?,
			None => {
				match self
					.lsn_scalar(
						"SELECT sys.fn_cdc_get_min_lsn(@p1)",
						&[Value::text(instance.clone())],
					)
					.await?
				{
					Some(lsn) => lsn,
					None => return Ok(ChangeBatch::default()),
				}
			}
		};
		let Some(to_lsn) = self.lsn_scalar("SELECT sys.fn_cdc_get_max_lsn()", &[]).await?
		else {
			return Ok(ChangeBatch::default());
		};
		if from_lsn > to_lsn {
			return Ok(ChangeBatch::default());
		}

		let sql = format!(
			"SELECT TOP {} * FROM cdc.fn_cdc_get_all_changes_{instance}(@p1, @p2, N'all update old') \
			 ORDER BY __$start_lsn, __$seqval, __$operation",
			limit.max(2),
		);
		let rows = self
			.driver
			.query(&sql, &[Value::Bytes(from_lsn), Value::Bytes(to_lsn)])
			.await?;
		if rows.is_empty() {
			return Ok(ChangeBatch::default());
		}

		let max_lsn = rows
			.iter()
			.filter_map(|row| match row.get("__$start_lsn") {
				Some(Value::Bytes(bytes)) => Some(bytes.clone()),
				_ => None,
			})
			.max();

		let mut batch = ChangeBatch::default();
		for mut row in coalesce_changes(rows) {
			row.remove("__$update_mask");
			row.insert("__table".to_string(), Value::text(table.clone()));
			batch.records.push(row);
		}

		if let Some(max_lsn) = max_lsn {
			// The stored position is the first unseen LSN.
			if let Some(next) = self
				.lsn_scalar("SELECT sys.fn_cdc_increment_lsn(@p1)", &[Value::Bytes(max_lsn)])
				.await?
			{
				batch.next_position = Some(hex::encode(next));
			}
		}
		Ok(batch)
	}

	fn parse_event(&self, raw: &Row) -> Result<CdcEvent> {
		parse_cdc_row(raw)
	}

	async fn apply_event(&self, event: &CdcEvent) -> Result<u64> {
		let statement =
			build_apply_statement(EngineKind::Sqlserver.capabilities(), event)?;
		self.driver.execute(&statement.sql, &statement.params).await
	}

	async fn get_status(&self) -> Result<Row> {
		let rows = self
			.driver
			.query(
				"SELECT capture_instance, object_id, start_lsn \
				 FROM cdc.change_tables",
				&[],
			)
			.await?;
		let mut status = Row::new();
		status.insert("mechanism".to_string(), Value::text("cdc_tables"));
		status.insert("capture_instances".to_string(), Value::Int(rows.len() as i64));
		Ok(status)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn change_row(op: i64, seqval: &str, pairs: &[(&str, Value)]) -> Row {
		let mut row = Row::new();
		row.insert("__$operation".to_string(), Value::Int(op));
		row.insert("__$start_lsn".to_string(), Value::Bytes(vec![0, 0, 0, 1]));
		row.insert("__$seqval".to_string(), Value::text(seqval));
		for (k, v) in pairs {
			row.insert(k.to_string(), v.clone());
		}
		row
	}

	#[test]
	fn test_coalesce_update_pair() {
		let rows = vec![
			change_row(OP_UPDATE_BEFORE, "s1", &[("ID", Value::Int(1)), ("NAME", Value::text("Ada"))]),
			change_row(OP_UPDATE_AFTER, "s1", &[("ID", Value::Int(1)), ("NAME", Value::text("Grace"))]),
		];
		let coalesced = coalesce_changes(rows);
		assert_eq!(coalesced.len(), 1);
		assert!(coalesced[0].contains_key("__$old_data"));
	}

	#[test]
	fn test_parse_coalesced_update() {
		let mut raw = change_row(OP_UPDATE_AFTER, "s1", &[("ID", Value::Int(1)), ("NAME", Value::text("Grace"))]);
		raw.insert(
			"__$old_data".to_string(),
			Value::Object(
				[("ID".to_string(), Value::Int(1)), ("NAME".to_string(), Value::text("Ada"))]
					.into_iter()
					.collect(),
			),
		);
		raw.insert("__table".to_string(), Value::text("EMPLOYEES"));
		let event = parse_cdc_row(&raw).unwrap();
		assert_eq!(event.operation, CdcOperation::Update);
		assert_eq!(event.data.as_ref().unwrap().get("NAME"), Some(&Value::text("Grace")));
		assert_eq!(event.old_data.as_ref().unwrap().get("NAME"), Some(&Value::text("Ada")));
		// Bookkeeping moved to metadata.
		assert!(!event.data.as_ref().unwrap().contains_key("__$operation"));
		assert_eq!(event.lsn.as_deref(), Some("00000001"));
	}

	#[test]
	fn test_parse_insert_and_delete() {
		let mut raw = change_row(OP_INSERT, "s2", &[("ID", Value::Int(2))]);
		raw.insert("__table".to_string(), Value::text("EMPLOYEES"));
		let event = parse_cdc_row(&raw).unwrap();
		assert_eq!(event.operation, CdcOperation::Insert);
		assert_eq!(event.data.unwrap().get("ID"), Some(&Value::Int(2)));

		let mut raw = change_row(OP_DELETE, "s3", &[("ID", Value::Int(2))]);
		raw.insert("__table".to_string(), Value::text("EMPLOYEES"));
		let event = parse_cdc_row(&raw).unwrap();
		assert_eq!(event.operation, CdcOperation::Delete);
		assert_eq!(event.old_data.unwrap().get("ID"), Some(&Value::Int(2)));
	}

	#[test]
	fn test_capture_instance_names() {
		assert_eq!(capture_instance("EMPLOYEES"), "dbo_EMPLOYEES");
		assert_eq!(capture_instance("hr.EMPLOYEES"), "hr_EMPLOYEES");
	}
}
