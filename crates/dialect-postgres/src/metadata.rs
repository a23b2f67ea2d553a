// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::interface::MetadataOperator;
use anchor_type::{Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::PgDriver;

pub struct PostgresMetadata {
	pub(crate) driver: Arc<PgDriver>,
	pub(crate) database_name: String,
}

impl PostgresMetadata {
	async fn scalar(&self, sql: &str) -> Result<Value> {
		let rows = self.driver.query(sql, &[]).await?;
		Ok(rows.first().and_then(|row| row.values().next().cloned()).unwrap_or(Value::Undefined))
	}

	/// Probe one property; failures are logged and omitted.
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
impl MetadataOperator for PostgresMetadata {
	async fn collect_database_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("database_name".to_string(), Value::text(self.database_name.clone()));
		self.probe(&mut map, "version", "SELECT version()").await;
		self.probe(&mut map, "size_bytes", "SELECT pg_database_size(current_database())")
			.await;
		self.probe(
			&mut map,
			"tables_count",
			"SELECT COUNT(*)::bigint FROM information_schema.tables \
			 WHERE table_type = 'BASE TABLE' \
			   AND table_schema NOT IN ('pg_catalog', 'information_schema')",
		)
		.await;
		Ok(map)
	}

	async fn collect_instance_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		self.probe(&mut map, "version", "SELECT version()").await;
		self.probe(
			&mut map,
			"uptime_seconds",
			"SELECT EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time()))::bigint",
		)
		.await;
		self.probe(
			&mut map,
			"total_connections",
			"SELECT COUNT(*)::bigint FROM pg_stat_activity",
		)
		.await;
		self.probe(
			&mut map,
			"max_connections",
			"SELECT setting::bigint FROM pg_settings WHERE name = 'max_connections'",
		)
		.await;
		self.probe(
			&mut map,
			"unique_identifier",
			"SELECT system_identifier::text FROM pg_control_system()",
		)
		.await;
		Ok(map)
	}

	async fn get_version(&self) -> Result<String> {
		Ok(self.scalar("SELECT version()").await?.as_sql_text())
	}

	async fn get_unique_identifier(&self) -> Result<String> {
		Ok(self
			.scalar("SELECT system_identifier::text FROM pg_control_system()")
			.await?
			.as_sql_text())
	}

	async fn get_database_size(&self) -> Result<i64> {
		match self.scalar("SELECT pg_database_size(current_database())").await? {
			Value::Int(v) => Ok(v),
			other => Ok(other.as_sql_text().parse().unwrap_or(0)),
		}
	}

	async fn get_table_count(&self) -> Result<i64> {
		match self
			.scalar(
				"SELECT COUNT(*)::bigint FROM information_schema.tables \
				 WHERE table_type = 'BASE TABLE' \
				   AND table_schema NOT IN ('pg_catalog', 'information_schema')",
			)
			.await?
		{
			Value::Int(v) => Ok(v),
			other => Ok(other.as_sql_text().parse().unwrap_or(0)),
		}
	}

	async fn execute_command(&self, command: &str) -> Result<Vec<Row>> {
		self.driver.simple(command).await
	}
}
