// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::interface::MetadataOperator;
use anchor_type::{Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::Db2Driver;

pub struct Db2Metadata {
	pub(crate) driver: Arc<Db2Driver>,
	pub(crate) database_name: String,
}

impl Db2Metadata {
	async fn scalar(&self, sql: &str) -> Result<Value> {
		let rows = self.driver.query(sql).await?;
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
impl MetadataOperator for Db2Metadata {
	async fn collect_database_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		map.insert("database_name".to_string(), Value::text(self.database_name.clone()));
		self.probe(
			&mut map,
			"version",
			"SELECT SERVICE_LEVEL FROM TABLE(SYSPROC.ENV_GET_INST_INFO())",
		)
		.await;
		self.probe(
			&mut map,
			"tables_count",
			"SELECT COUNT(*) FROM SYSCAT.TABLES WHERE TYPE = 'T' \
			 AND TABSCHEMA NOT LIKE 'SYS%'",
		)
		.await;
		self.probe(
			&mut map,
			"size_bytes",
			"SELECT SUM(TBSP_TOTAL_SIZE_KB) * 1024 \
			 FROM TABLE(MON_GET_TABLESPACE(NULL, -2))",
		)
		.await;
		Ok(map)
	}

	async fn collect_instance_metadata(&self) -> Result<Row> {
		let mut map = Row::new();
		self.probe(
			&mut map,
			"version",
			"SELECT SERVICE_LEVEL FROM TABLE(SYSPROC.ENV_GET_INST_INFO())",
		)
		.await;
		self.probe(
			&mut map,
			"unique_identifier",
			"SELECT INST_NAME FROM TABLE(SYSPROC.ENV_GET_INST_INFO())",
		)
		.await;
		self.probe(
			&mut map,
			"total_connections",
			"SELECT COUNT(*) FROM TABLE(MON_GET_CONNECTION(NULL, -2))",
		)
		.await;
		Ok(map)
	}

	async fn get_version(&self) -> Result<String> {
		Ok(self
			.scalar("SELECT SERVICE_LEVEL FROM TABLE(SYSPROC.ENV_GET_INST_INFO())")
			.await?
			.as_sql_text()
			.trim()
			.to_string())
	}

	async fn get_unique_identifier(&self) -> Result<String> {
		Ok(self
			.scalar("SELECT INST_NAME FROM TABLE(SYSPROC.ENV_GET_INST_INFO())")
			.await?
			.as_sql_text()
			.trim()
			.to_string())
	}

	async fn get_database_size(&self) -> Result<i64> {
		Ok(self
			.scalar(
				"SELECT SUM(TBSP_TOTAL_SIZE_KB) * 1024 \
				 FROM TABLE(MON_GET_TABLESPACE(NULL, -2))",
			)
			.await?
			.as_sql_text()
			.trim()
			.parse()
			.unwrap_or(0))
	}

	async fn get_table_count(&self) -> Result<i64> {
		Ok(self
			.scalar(
				"SELECT COUNT(*) FROM SYSCAT.TABLES WHERE TYPE = 'T' \
				 AND TABSCHEMA NOT LIKE 'SYS%'",
			)
			.await?
			.as_sql_text()
			.trim()
			.parse()
			.unwrap_or(0))
	}

	async fn execute_command(&self, command: &str) -> Result<Vec<Row>> {
		self.driver.query(command).await
	}
}
