// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Trigger-based CDC: a `<table>_CHANGE_LOG` companion table with an
//! auto-increment change id, populated by three AFTER triggers.

use std::sync::Arc;

use anchor_cdc::{
	PollingSource,
	trigger::{
		CHANGE_ID, CHANGE_OPERATION, CHANGE_TIMESTAMP, change_id_from_position,
		change_log_table_name, parse_change_log_row, position_from_change_id,
	},
};
use anchor_core::{
	CdcEvent, CdcMechanism, EngineKind,
	interface::{
		ChangeBatch, PollChannel, ReplicationConfig, ReplicationOperator, ReplicationSource,
	},
};
use anchor_sql::{build_apply_statement, quote_ident};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::MysqlDriver;

#[derive(Clone)]
pub struct MysqlReplication {
	pub(crate) driver: Arc<MysqlDriver>,
}

fn q(ident: &str) -> String {
	quote_ident(EngineKind::Mysql.capabilities().quoting, ident)
}

impl MysqlReplication {
	async fn table_exists(&self, table: &str) -> Result<bool> {
		let rows = self
			.driver
			.query(
				"SELECT 1 FROM information_schema.TABLES \
				 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
				&[Value::text(table)],
			)
			.await?;
		Ok(!rows.is_empty())
	}

	async fn trigger_exists(&self, trigger: &str) -> Result<bool> {
		let rows = self
			.driver
			.query(
				"SELECT 1 FROM information_schema.TRIGGERS \
				 WHERE TRIGGER_SCHEMA = DATABASE() AND TRIGGER_NAME = ?",
				&[Value::text(trigger)],
			)
			.await?;
		Ok(!rows.is_empty())
	}

	async fn source_columns(&self, table: &str) -> Result<Vec<(String, String)>> {
		let rows = self
			.driver
			.query(
				"SELECT COLUMN_NAME, COLUMN_TYPE FROM information_schema.COLUMNS \
				 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
				 ORDER BY ORDINAL_POSITION",
				&[Value::text(table)],
			)
			.await?;
		let columns: Vec<(String, String)> = rows
			.iter()
			.map(|row| {
				(
					row.get("COLUMN_NAME").map(|v| v.as_sql_text()).unwrap_or_default(),
					row.get("COLUMN_TYPE").map(|v| v.as_sql_text()).unwrap_or_default(),
				)
			})
			.collect();
		if columns.is_empty() {
			return Err(Error::table_not_found(table).with_engine("mysql"));
		}
		Ok(columns)
	}

	async fn create_trigger(
		&self,
		table: &str,
		log_table: &str,
		columns: &[(String, String)],
		operation: &str,
	) -> Result<()> {
		let trigger_name = format!("{table}_cdc_{}", operation.to_ascii_lowercase());
		if self.trigger_exists(&trigger_name).await? {
			return Ok(());
		}
		// DELETE rows carry the old image, everything else the new
		// one.
		let row_ref = if operation == "DELETE" { "OLD" } else { "NEW" };
		let column_list =
			columns.iter().map(|(name, _)| q(name)).collect::<Vec<_>>().join(", ");
		let value_list = columns
			.iter()
			.map(|(name, _)| format!("{row_ref}.{}", q(name)))
			.collect::<Vec<_>>()
			.join(", ");
		let sql = format!(
			"CREATE TRIGGER {} AFTER {operation} ON {} FOR EACH ROW \
			 INSERT INTO {} ({column_list}, {CHANGE_OPERATION}) \
			 VALUES ({value_list}, '{operation}')",
			q(&trigger_name),
			q(table),
			q(log_table),
		);
		self.driver.execute(&sql, &[]).await?;
		debug!(table, operation, "cdc trigger installed");
		Ok(())
	}
}

#[async_trait]
impl ReplicationOperator for MysqlReplication {
	fn is_supported(&self) -> bool {
		true
	}

	fn supported_mechanisms(&self) -> Vec<CdcMechanism> {
		EngineKind::Mysql.capabilities().cdc_mechanisms.to_vec()
	}

	async fn check_prerequisites(&self) -> Result<()> {
		let rows = self.driver.query("SELECT @@read_only AS ro", &[]).await?;
		match rows.first().and_then(|r| r.get("ro")) {
			Some(Value::Int(0)) => Ok(()),
			Some(_) => Err(Error::configuration(
				"trigger-based CDC requires a writable server (read_only is set)",
			)
			.with_engine("mysql")),
			None => Ok(()),
		}
	}

	async fn connect(&self, config: ReplicationConfig) -> Result<Arc<dyn ReplicationSource>> {
		for table in &config.table_names {
			self.setup_cdc_for_table("", table).await?;
		}
		Ok(PollingSource::create(
			Arc::new(self.clone()),
			config,
			CdcMechanism::TriggerBased,
		))
	}

	async fn setup_cdc_for_table(&self, _schema: &str, table: &str) -> Result<()> {
		let log_table = change_log_table_name(table);
		let columns = self.source_columns(table).await?;

		if !self.table_exists(&log_table).await? {
			let column_defs = columns
				.iter()
				.map(|(name, ty)| format!("{} {ty}", q(name)))
				.collect::<Vec<_>>()
				.join(", ");
			let sql = format!(
				"CREATE TABLE {} ({column_defs}, \
				 {CHANGE_OPERATION} VARCHAR(10) NOT NULL, \
				 {CHANGE_TIMESTAMP} TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6), \
				 {CHANGE_ID} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY)",
				q(&log_table),
			);
			self.driver.execute(&sql, &[]).await?;
			debug!(table, log_table = %log_table, "change-log table created");
		}

		for operation in ["INSERT", "UPDATE", "DELETE"] {
			self.create_trigger(table, &log_table, &columns, operation).await?;
		}
		Ok(())
	}

	async fn fetch_changes(
		&self,
		channel: &PollChannel,
		position: Option<&str>,
		limit: u32,
	) -> Result<ChangeBatch> {
		let PollChannel::Table(table) = channel else {
			return Err(Error::invalid_data("trigger-based CDC polls change-log tables"));
		};
		let last_seen = match position {
			Some(position) => change_id_from_position(position)?,
			None => 0,
		};
		let sql = format!(
			"SELECT * FROM {} WHERE {CHANGE_ID} > ? ORDER BY {CHANGE_ID} ASC LIMIT {}",
			q(&change_log_table_name(table)),
			limit.max(1),
		);
		let rows = self.driver.query(&sql, &[Value::Int(last_seen as i64)]).await?;

		let mut batch = ChangeBatch::default();
		for mut row in rows {
			if let Some(Value::Int(id)) = row.get(CHANGE_ID) {
				batch.next_position = Some(position_from_change_id(*id as u64));
			}
			row.insert("__table".to_string(), Value::text(table.clone()));
			batch.records.push(row);
		}
		Ok(batch)
	}

	fn parse_event(&self, raw: &Row) -> Result<CdcEvent> {
		let mut raw = raw.clone();
		let table = match raw.remove("__table") {
			Some(Value::Text(table)) => table,
			_ => return Err(Error::invalid_data("change-log record has no table")),
		};
		parse_change_log_row(&table, &raw)
	}

	async fn apply_event(&self, event: &CdcEvent) -> Result<u64> {
		let statement =
			build_apply_statement(EngineKind::Mysql.capabilities(), event)?;
		self.driver.execute(&statement.sql, &statement.params).await
	}

	async fn get_status(&self) -> Result<Row> {
		let mut status = Row::new();
		status.insert("mechanism".to_string(), Value::text("trigger_based"));
		Ok(status)
	}
}
