// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::interface::MetadataOperator;
use anchor_type::{Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::SqlServerDriver;

pub struct SqlServerMetadata {
	pub(crate) driver: Arc<SqlServerDriver>,
	pub(crate) database_name: String,
}

impl SqlServerMetadata {
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
}

#[async_trait]
impl MetadataOperator for SqlServerMetadata {
	async fn collect_database_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("database_name".to_string(), Value::text(self.database_name.clone()));
		self.probe(&mut map, "version", "SELECT @@VERSION").await;
		self.probe(
			&mut map,
			"size_bytes",
			"SELECT CAST(SUM(size) AS bigint) * 8192 FROM sys.database_files",
		)
		.await;
		self.probe(
			&mut map,
			"tables_count",
			"SELECT COUNT_BIG(*) FROM sys.tables WHERE is_ms_shipped = 0",
		)
		.await;
		Ok(map)
	}

	async fn collect_instance_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		self.probe(&mut map, "version", "SELECT @@VERSION").await;
		self.probe(
			&mut map,
			"unique_identifier",
			"SELECT CAST(SERVERPROPERTY('ServerName') AS nvarchar(256))",
		)
		.await;
		self.probe(
			&mut map,
			"uptime_seconds",
			"SELECT DATEDIFF(second, sqlserver_start_time, SYSDATETIME()) \
			 FROM sys.dm_os_sys_info",
		)
		.await;
		self.probe(
			&mut map,
			"total_connections",
			"SELECT COUNT_BIG(*) FROM sys.dm_exec_connections",
		)
		.await;
		self.probe(
			&mut map,
			"max_connections",
			"SELECT CAST(@@MAX_CONNECTIONS AS bigint)",
		)
		.await;
		Ok(map)
	}

	async fn get_version(&self) -> Result<String> {
		Ok(self.scalar("SELECT @@VERSION").await?.as_sql_text())
	}

	async fn get_unique_identifier(&self) -> Result<String> {
		Ok(self
			.scalar("SELECT CAST(SERVERPROPERTY('ServerName') AS nvarchar(256))")
			.await?
			.as_sql_text())
	}

	async fn get_database_size(&self) -> Result<i64> {
		match self
			.scalar("SELECT CAST(SUM(size) AS bigint) * 8192 FROM sys.database_files")
			.await?
		{
			Value::Int(v) => Ok(v),
			other => Ok(other.as_sql_text().parse().unwrap_or(0)),
		}
	}

	async fn get_table_count(&self) -> Result<i64> {
		match self
			.scalar("SELECT COUNT_BIG(*) FROM sys.tables WHERE is_ms_shipped = 0")
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
