// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::{Capabilities, EngineKind, interface::DataOperator};
use anchor_sql::{build_delete, build_insert, build_update, build_upsert, quote_ident, quote_qualified};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::MysqlDriver;

pub struct MysqlData {
	pub(crate) driver: Arc<MysqlDriver>,
}

fn caps() -> &'static Capabilities {
	EngineKind::Mysql.capabilities()
}

impl MysqlData {
	fn select(&self, table: &str, columns: Option<&[String]>, limit: i64) -> String {
		let cols = match columns {
			Some(columns) if !columns.is_empty() => columns
				.iter()
				.map(|c| quote_ident(caps().quoting, c))
				.collect::<Vec<_>>()
				.join(", "),
			_ => "*".to_string(),
		};
		let mut sql = format!("SELECT {cols} FROM {}", quote_qualified(caps().quoting, table));
		if limit > 0 {
			sql.push_str(&format!(" LIMIT {limit}"));
		}
		sql
	}
}

#[async_trait]
impl DataOperator for MysqlData {
	async fn fetch(&self, table: &str, limit: i64) -> Result<Vec<Row>> {
		self.driver.query(&self.select(table, None, limit), &[]).await
	}

	async fn fetch_with_columns(
		&self,
		table: &str,
		columns: &[String],
		limit: i64,
	) -> Result<Vec<Row>> {
		self.driver.query(&self.select(table, Some(columns), limit), &[]).await
	}

	async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		let statements = rows
			.iter()
			.map(|row| build_insert(caps(), table, row))
			.collect::<Result<Vec<_>>>()?;
		self.driver.transactional(&statements).await
	}

	async fn update(&self, table: &str, rows: &[Row], where_columns: &[String]) -> Result<u64> {
		if where_columns.is_empty() {
			return Err(Error::invalid_data("update requires where_columns")
				.with_engine("mysql"));
		}
		let mut statements = Vec::new();
		for row in rows {
			if let Some(statement) = build_update(caps(), table, row, where_columns)? {
				statements.push(statement);
			}
		}
		if statements.is_empty() {
			return Ok(0);
		}
		self.driver.transactional(&statements).await
	}

	async fn upsert(&self, table: &str, rows: &[Row], unique_columns: &[String]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		let statements = rows
			.iter()
			.map(|row| build_upsert(caps(), table, row, unique_columns))
			.collect::<Result<Vec<_>>>()?;
		self.driver.transactional(&statements).await
	}

	async fn delete(&self, table: &str, conditions: &Row) -> Result<u64> {
		let statement = build_delete(caps(), table, conditions)?;
		self.driver.execute(&statement.sql, &statement.params).await
	}

	async fn execute_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
		self.driver.query(sql, args).await
	}

	async fn execute_count_query(&self, sql: &str) -> Result<i64> {
		let rows = self.driver.query(sql, &[]).await?;
		let value = rows
			.first()
			.and_then(|row| row.values().next().cloned())
			.unwrap_or(Value::Undefined);
		match value {
			Value::Int(v) => Ok(v),
			Value::Text(v) => v.parse().map_err(|_| {
				Error::invalid_data(format!("count query returned non-numeric '{v}'"))
			}),
			other => Err(Error::invalid_data(format!(
				"count query returned {}",
				other.kind()
			))),
		}
	}

	async fn get_row_count(&self, table: &str, where_clause: Option<&str>) -> Result<(i64, bool)> {
		match where_clause {
			Some(clause) if !clause.trim().is_empty() => {
				let sql = format!(
					"SELECT COUNT(*) FROM {} WHERE {clause}",
					quote_qualified(caps().quoting, table)
				);
				Ok((self.execute_count_query(&sql).await?, true))
			}
			_ => {
				let rows = self
					.driver
					.query(
						"SELECT TABLE_ROWS FROM information_schema.TABLES \
						 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
						&[Value::text(table)],
					)
					.await?;
				if let Some(Value::Int(estimate)) =
					rows.first().and_then(|r| r.get("TABLE_ROWS"))
				{
					return Ok((*estimate, false));
				}
				let sql = format!(
					"SELECT COUNT(*) FROM {}",
					quote_qualified(caps().quoting, table)
				);
				Ok((self.execute_count_query(&sql).await?, true))
			}
		}
	}

	async fn wipe(&self) -> Result<()> {
		let rows = self
			.driver
			.query(
				"SELECT TABLE_NAME FROM information_schema.TABLES \
				 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'",
				&[],
			)
			.await?;
		if rows.is_empty() {
			return Ok(());
		}
		debug!(tables = rows.len(), "wiping user tables");
		// Disable FK checks, truncate, re-enable.
		self.driver.execute("SET FOREIGN_KEY_CHECKS = 0", &[]).await?;
		let mut result = Ok(());
		for row in &rows {
			let table = row.get("TABLE_NAME").map(|v| v.as_sql_text()).unwrap_or_default();
			let sql = format!("TRUNCATE TABLE {}", quote_ident(caps().quoting, &table));
			if let Err(err) = self.driver.execute(&sql, &[]).await {
				result = Err(err);
				break;
			}
		}
		self.driver.execute("SET FOREIGN_KEY_CHECKS = 1", &[]).await?;
		result
	}
}
