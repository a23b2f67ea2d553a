// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::interface::MetadataOperator;
use anchor_type::{Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::MysqlDriver;

pub struct MysqlMetadata {
	pub(crate) driver: Arc<MysqlDriver>,
	pub(crate) database_name: String,
}

impl MysqlMetadata {
	async fn scalar(&self, sql: &str) -> Result<Value> {
		let rows = self.driver.query(sql, &[]).await?;
		Ok(rows.first().and_then(|row| row.values().next().cloned()).unwrap_or(Value::Undefined))
	}

	async fn probe(&self, map: &mut Row, key: &str, sql: &str) {
		match self.scalar(sql).await {
			Ok(value) if !value.is_undefined() => {
				map.insert(key.to_string(), value);
			}
			Ok(_) => {}
			Err(err) => debug!(property = key, %err, "metadata probe failed"),
		}
	}

	async fn global_status(&self, name: &str) -> Result<Option<i64>> {
		let rows = self
			.driver
			.query(
				"SELECT VARIABLE_VALUE FROM performance_schema.global_status \
				 WHERE VARIABLE_NAME = ?",
				&[Value::text(name)],
			)
			.await?;
		Ok(rows
			.first()
			.and_then(|row| row.get("VARIABLE_VALUE"))
			.and_then(|v| v.as_sql_text().parse().ok()))
	}
}

#[async_trait]
impl MetadataOperator for MysqlMetadata {
	async fn collect_database_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("database_name".to_string(), Value::text(self.database_name.clone()));
		self.probe(&mut map, "version", "SELECT VERSION()").await;
		self.probe(
			&mut map,
			"size_bytes",
			"SELECT COALESCE(SUM(DATA_LENGTH + INDEX_LENGTH), 0) \
			 FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()",
		)
		.await;
		self.probe(
			&mut map,
			"tables_count",
			"SELECT COUNT(*) FROM information_schema.TABLES \
			 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
		)
		.await;
		Ok(map)
	}

	async fn collect_instance_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		self.probe(&mut map, "version", "SELECT VERSION()").await;
		self.probe(&mut map, "unique_identifier", "SELECT @@server_uuid").await;
		self.probe(&mut map, "max_connections", "SELECT @@max_connections").await;
		if let Ok(Some(uptime)) = self.global_status("Uptime").await {
			map.insert("uptime_seconds".to_string(), Value::Int(uptime));
		}
		if let Ok(Some(connected)) = self.global_status("Threads_connected").await {
			map.insert("total_connections".to_string(), Value::Int(connected));
		}
		Ok(map)
	}

	async fn get_version(&self) -> Result<String> {
		Ok(self.scalar("SELECT VERSION()").await?.as_sql_text())
	}

	async fn get_unique_identifier(&self) -> Result<String> {
		Ok(self.scalar("SELECT @@server_uuid").await?.as_sql_text())
	}

	async fn get_database_size(&self) -> Result<i64> {
		match self
			.scalar(
				"SELECT COALESCE(SUM(DATA_LENGTH + INDEX_LENGTH), 0) \
				 FROM information_schema.TABLES WHERE TABLE_SCHEMA = DATABASE()",
			)
			.await?
		{
			Value::Int(v) => Ok(v),
			other => Ok(other.as_sql_text().parse().unwrap_or(0)),
		}
	}

	async fn get_table_count(&self) -> Result<i64> {
		match self
			.scalar(
				"SELECT COUNT(*) FROM information_schema.TABLES \
				 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
			)
			.await?
		{
			Value::Int(v) => Ok(v),
			other => Ok(other.as_sql_text().parse().unwrap_or(0)),
		}
	}

	async fn execute_command(&self, command: &str) -> Result<Vec<Row>> {
		self.driver.query(command, &[]).await
	}
}
