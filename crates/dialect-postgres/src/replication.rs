// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Logical-decoding CDC over a named replication slot.
//!
//! Changes are read with `pg_logical_slot_peek_changes` through the
//! `wal2json` output plugin; confirming a position advances the slot
//! with `pg_replication_slot_advance`. Positions travel as
//! hex-encoded 64-bit LSNs.

use std::sync::Arc;

use anchor_cdc::PollingSource;
use anchor_core::{
	CdcEvent, CdcMechanism, CdcOperation, EngineKind,
	interface::{
		ChangeBatch, PollChannel, ReplicationConfig, ReplicationOperator, ReplicationSource,
		SlotInfo,
	},
};
use anchor_sql::build_apply_statement;
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::driver::PgDriver;

#[derive(Clone)]
pub struct PostgresReplication {
	pub(crate) driver: Arc<PgDriver>,
	pub(crate) slot_name: Arc<parking_lot::Mutex<Option<String>>>,
}

/// `0/16B3748` → 64-bit LSN.
pub fn lsn_from_text(text: &str) -> Result<u64> {
	let (hi, lo) = text
		.split_once('/')
		.ok_or_else(|| Error::invalid_data(format!("malformed lsn '{text}'")))?;
	let hi = u64::from_str_radix(hi, 16)
		.map_err(|_| Error::invalid_data(format!("malformed lsn '{text}'")))?;
	let lo = u64::from_str_radix(lo, 16)
		.map_err(|_| Error::invalid_data(format!("malformed lsn '{text}'")))?;
	Ok((hi << 32) | lo)
}

pub fn lsn_to_text(lsn: u64) -> String {
	format!("{:X}/{:X}", lsn >> 32, lsn & 0xFFFF_FFFF)
}

/// Interchange form: fixed-width hex of the 64-bit LSN.
pub fn position_from_lsn(lsn: u64) -> String {
	format!("{lsn:016x}")
}

pub fn lsn_from_position(position: &str) -> Result<u64> {
	u64::from_str_radix(position, 16)
		.map_err(|_| Error::invalid_data(format!("malformed position '{position}'")))
}

pub fn slot_name_for(replication_id: &str) -> String {
	let sanitized: String = replication_id
		.to_ascii_lowercase()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
		.collect();
	let mut name = format!("anchor_{sanitized}");
	name.truncate(63);
	name
}

/// One wal2json (format-version 2) change line into the canonical
/// event.
pub fn parse_wal2json(raw: &Row) -> Result<CdcEvent> {
	let payload = raw
		.get("__payload")
		.ok_or_else(|| Error::invalid_data("raw record has no payload"))?;
	let Value::Object(fields) = payload else {
		return Err(Error::invalid_data("wal2json payload is not an object"));
	};

	let action = match fields.get("action") {
		Some(Value::Text(a)) => a.as_str(),
		_ => return Err(Error::invalid_data("wal2json record has no action")),
	};
	let operation = match action {
		"I" => CdcOperation::Insert,
		"U" => CdcOperation::Update,
		"D" => CdcOperation::Delete,
		other => {
			return Err(Error::invalid_data(format!(
				"wal2json action '{other}' is not a data change"
			)));
		}
	};

	let table = match fields.get("table") {
		Some(Value::Text(t)) => t.clone(),
		_ => return Err(Error::invalid_data("wal2json record has no table")),
	};

	let columns_to_row = |value: Option<&Value>| -> Option<Row> {
		let Some(Value::Array(columns)) = value else {
			return None;
		};
		let mut row = Row::new();
		for column in columns {
			let Value::Object(column) = column else {
				continue;
			};
			let Some(Value::Text(name)) = column.get("name") else {
				continue;
			};
			row.insert(name.clone(), column.get("value").cloned().unwrap_or(Value::Undefined));
		}
		Some(row)
	};

	let mut event = CdcEvent::new(operation, table);
	event.data = columns_to_row(fields.get("columns"));
	event.old_data = columns_to_row(fields.get("identity"));
	if operation == CdcOperation::Delete && event.old_data.is_none() {
		// wal2json reports the old image under `identity`; some
		// replica-identity settings put it in `columns`.
		event.old_data = event.data.take();
	}

	if let Some(Value::Text(timestamp)) = fields.get("timestamp") {
		if let Ok(parsed) = DateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S%.f%#z") {
			event.timestamp = parsed.with_timezone(&Utc);
		}
		event.metadata.insert("source_timestamp".to_string(), Value::text(timestamp.clone()));
	}
	if let Some(Value::Text(schema)) = fields.get("schema") {
		event.metadata.insert("schema".to_string(), Value::text(schema.clone()));
	}
	if let Some(xid) = raw.get("__xid") {
		event.metadata.insert("xid".to_string(), xid.clone());
	}
	if let Some(Value::Text(lsn)) = raw.get("__lsn") {
		event.lsn = Some(position_from_lsn(lsn_from_text(lsn)?));
	}
	Ok(event)
}

impl PostgresReplication {
	async fn confirmed_position(&self, slot: &str) -> Result<Option<u64>> {
		let rows = self
			.driver
			.query(
				"SELECT confirmed_flush_lsn::text AS lsn FROM pg_replication_slots \
				 WHERE slot_name = $1",
				&[Value::text(slot)],
			)
			.await?;
		match rows.first().and_then(|r| r.get("lsn")) {
			Some(Value::Text(lsn)) => Ok(Some(lsn_from_text(lsn)?)),
			_ => Ok(None),
		}
	}

	async fn ensure_slot(&self, slot: &str) -> Result<()> {
		let rows = self
			.driver
			.query(
				"SELECT 1 AS present FROM pg_replication_slots WHERE slot_name = $1",
				&[Value::text(slot)],
			)
			.await?;
		if rows.is_empty() {
			self.driver
				.query(
					"SELECT pg_create_logical_replication_slot($1, 'wal2json')",
					&[Value::text(slot)],
				)
				.await?;
			debug!(slot, "created logical replication slot");
		}
		Ok(())
	}

	fn current_slot(&self) -> Result<String> {
		self.slot_name
			.lock()
			.clone()
			.ok_or_else(|| Error::invalid_data("replication source not connected"))
	}
}

#[async_trait]
impl ReplicationOperator for PostgresReplication {
	fn is_supported(&self) -> bool {
		true
	}

	fn supported_mechanisms(&self) -> Vec<CdcMechanism> {
		EngineKind::Postgres.capabilities().cdc_mechanisms.to_vec()
	}

	async fn check_prerequisites(&self) -> Result<()> {
		let rows = self
			.driver
			.query("SELECT setting FROM pg_settings WHERE name = 'wal_level'", &[])
			.await?;
		let wal_level =
			rows.first().and_then(|r| r.get("setting")).map(|v| v.as_sql_text()).unwrap_or_default();
		if wal_level != "logical" {
			return Err(Error::configuration(format!(
				"logical replication requires wal_level=logical, found '{wal_level}'"
			))
			.with_engine("postgres"));
		}
		let rows = self
			.driver
			.query(
				"SELECT setting::bigint AS slots FROM pg_settings \
				 WHERE name = 'max_replication_slots'",
				&[],
			)
			.await?;
		match rows.first().and_then(|r| r.get("slots")) {
			Some(Value::Int(slots)) if *slots > 0 => Ok(()),
			_ => Err(Error::configuration("no replication slots configured")
				.with_engine("postgres")),
		}
	}

	async fn connect(&self, config: ReplicationConfig) -> Result<Arc<dyn ReplicationSource>> {
		let slot = slot_name_for(&config.replication_id);
		self.ensure_slot(&slot).await?;
		*self.slot_name.lock() = Some(slot);
		let source = PollingSource::create(
			Arc::new(self.clone()),
			config,
			CdcMechanism::LogBasedWithSlot,
		);
		Ok(source)
	}

	async fn fetch_changes(
		&self,
		channel: &PollChannel,
		position: Option<&str>,
		limit: u32,
	) -> Result<ChangeBatch> {
		if *channel != PollChannel::Stream {
			return Err(Error::invalid_data("postgres replication polls the native stream"));
		}
		let slot = self.current_slot()?;

		// Confirm everything up to the caller's position before
		// peeking further.
		if let Some(position) = position {
			let target = lsn_from_position(position)?;
			if let Some(confirmed) = self.confirmed_position(&slot).await? {
				if target > confirmed {
					self.driver
						.query(
							"SELECT pg_replication_slot_advance($1, $2::pg_lsn)",
							&[Value::text(slot.clone()), Value::text(lsn_to_text(target))],
						)
						.await?;
				}
			}
		}

		let rows = self
			.driver
			.query(
				"SELECT lsn::text AS lsn, xid::text AS xid, data \
				 FROM pg_logical_slot_peek_changes($1, NULL, $2, \
				      'format-version', '2', 'include-timestamp', 'true')",
				&[Value::text(slot), Value::Int(limit as i64)],
			)
			.await?;

		let mut batch = ChangeBatch::default();
		for row in rows {
			let lsn_text = row.get("lsn").map(|v| v.as_sql_text()).unwrap_or_default();
			if let Ok(lsn) = lsn_from_text(&lsn_text) {
				batch.next_position = Some(position_from_lsn(lsn));
			}
			let data = row.get("data").map(|v| v.as_sql_text()).unwrap_or_default();
			let Ok(payload) = serde_json::from_str::<serde_json::Value>(&data) else {
				continue;
			};
			let action = payload.get("action").and_then(|a| a.as_str()).unwrap_or("");
			if !matches!(action, "I" | "U" | "D") {
				// Transaction markers only advance the position.
				continue;
			}
			let mut raw = Row::new();
			raw.insert("__payload".to_string(), Value::from_json(payload));
			raw.insert("__lsn".to_string(), Value::text(lsn_text));
			if let Some(xid) = row.get("xid") {
				raw.insert("__xid".to_string(), xid.clone());
			}
			batch.records.push(raw);
		}
		Ok(batch)
	}

	fn parse_event(&self, raw: &Row) -> Result<CdcEvent> {
		parse_wal2json(raw)
	}

	async fn apply_event(&self, event: &CdcEvent) -> Result<u64> {
		let statement = build_apply_statement(EngineKind::Postgres.capabilities(), event)?;
		self.driver.execute(&statement.sql, &statement.params).await
	}

	async fn get_status(&self) -> Result<Row> {
		let slot = self.current_slot()?;
		let rows = self
			.driver
			.query(
				"SELECT slot_name, plugin, active, restart_lsn::text AS restart_lsn, \
				        confirmed_flush_lsn::text AS confirmed_flush_lsn \
				 FROM pg_replication_slots WHERE slot_name = $1",
				&[Value::text(slot)],
			)
			.await?;
		Ok(rows.into_iter().next().unwrap_or_default())
	}

	async fn get_lag(&self) -> Result<Option<i64>> {
		let slot = self.current_slot()?;
		let rows = self
			.driver
			.query(
				"SELECT pg_wal_lsn_diff(pg_current_wal_lsn(), confirmed_flush_lsn)::bigint \
				 AS lag FROM pg_replication_slots WHERE slot_name = $1",
				&[Value::text(slot)],
			)
			.await?;
		match rows.first().and_then(|r| r.get("lag")) {
			Some(Value::Int(lag)) => Ok(Some(*lag)),
			_ => Ok(None),
		}
	}

	async fn list_slots(&self) -> Result<Vec<SlotInfo>> {
		let rows = self
			.driver
			.query(
				"SELECT slot_name, plugin, active, restart_lsn::text AS restart_lsn \
				 FROM pg_replication_slots",
				&[],
			)
			.await?;
		Ok(rows
			.iter()
			.map(|row| SlotInfo {
				name: row.get("slot_name").map(|v| v.as_sql_text()).unwrap_or_default(),
				plugin: row.get("plugin").map(|v| v.as_sql_text()),
				active: matches!(row.get("active"), Some(Value::Bool(true))),
				restart_position: row
					.get("restart_lsn")
					.and_then(|v| lsn_from_text(&v.as_sql_text()).ok())
					.map(position_from_lsn),
			})
			.collect())
	}

	async fn drop_slot(&self, name: &str) -> Result<()> {
		self.driver
			.query("SELECT pg_drop_replication_slot($1)", &[Value::text(name)])
			.await?;
		Ok(())
	}

	async fn list_publications(&self) -> Result<Vec<String>> {
		let rows = self.driver.query("SELECT pubname FROM pg_publication", &[]).await?;
		Ok(rows.iter().map(|r| r.get("pubname").map(|v| v.as_sql_text()).unwrap_or_default()).collect())
	}

	async fn drop_publication(&self, name: &str) -> Result<()> {
		let sql = format!(
			"DROP PUBLICATION IF EXISTS {}",
			anchor_sql::quote_ident(EngineKind::Postgres.capabilities().quoting, name)
		);
		self.driver.batch(&sql).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_lsn_round_trip() {
		let lsn = lsn_from_text("0/16B3748").unwrap();
		assert_eq!(lsn_to_text(lsn), "0/16B3748");
		assert_eq!(position_from_lsn(lsn), "00000000016b3748");
		assert_eq!(lsn_from_position("00000000016b3748").unwrap(), lsn);
	}

	#[test]
	fn test_slot_name_sanitized() {
		assert_eq!(slot_name_for("Repl-42"), "anchor_repl_42");
	}

	fn raw_from(payload: serde_json::Value, lsn: &str) -> Row {
		let mut raw = Row::new();
		raw.insert("__payload".to_string(), Value::from_json(payload));
		raw.insert("__lsn".to_string(), Value::text(lsn));
		raw
	}

	#[test]
	fn test_parse_insert() {
		let raw = raw_from(
			serde_json::json!({
				"action": "I",
				"schema": "public",
				"table": "users",
				"columns": [
					{"name": "id", "type": "integer", "value": 1},
					{"name": "name", "type": "text", "value": "Ada"}
				]
			}),
			"0/16B3748",
		);
		let event = parse_wal2json(&raw).unwrap();
		assert_eq!(event.operation, CdcOperation::Insert);
		assert_eq!(event.table_name, "users");
		let data = event.data.unwrap();
		assert_eq!(data.get("id"), Some(&Value::Int(1)));
		assert_eq!(data.get("name"), Some(&Value::Text("Ada".to_string())));
		assert_eq!(event.lsn.as_deref(), Some("00000000016b3748"));
		// Dialect bookkeeping ends up in metadata, not the images.
		assert_eq!(event.metadata.get("schema"), Some(&Value::Text("public".to_string())));
	}

	#[test]
	fn test_parse_update_images() {
		let raw = raw_from(
			serde_json::json!({
				"action": "U",
				"table": "users",
				"columns": [{"name": "name", "value": "Grace"}],
				"identity": [{"name": "id", "value": 1}, {"name": "name", "value": "Ada"}]
			}),
			"0/16B3800",
		);
		let event = parse_wal2json(&raw).unwrap();
		assert_eq!(event.operation, CdcOperation::Update);
		assert_eq!(event.old_data.as_ref().unwrap().get("name"), Some(&Value::Text("Ada".into())));
		assert_eq!(event.data.as_ref().unwrap().get("name"), Some(&Value::Text("Grace".into())));
	}

	#[test]
	fn test_parse_delete_uses_identity() {
		let raw = raw_from(
			serde_json::json!({
				"action": "D",
				"table": "users",
				"identity": [{"name": "id", "value": 1}]
			}),
			"0/16B3900",
		);
		let event = parse_wal2json(&raw).unwrap();
		assert_eq!(event.operation, CdcOperation::Delete);
		assert!(event.data.is_none());
		assert_eq!(event.old_data.unwrap().get("id"), Some(&Value::Int(1)));
	}

	#[test]
	fn test_parse_rejects_transaction_markers() {
		let raw = raw_from(serde_json::json!({"action": "B"}), "0/16B3748");
		assert!(parse_wal2json(&raw).is_err());
	}
}
