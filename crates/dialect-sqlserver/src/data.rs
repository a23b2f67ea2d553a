// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::{Capabilities, EngineKind, interface::DataOperator};
use anchor_sql::{build_delete, build_insert, build_update, build_upsert, quote_ident, quote_qualified};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::SqlServerDriver;

pub struct SqlServerData {
	pub(crate) driver: Arc<SqlServerDriver>,
}

fn caps() -> &'static Capabilities {
	EngineKind::Sqlserver.capabilities()
}

impl SqlServerData {
	fn select(&self, table: &str, columns: Option<&[String]>, limit: i64) -> String {
		let cols = match columns {
			Some(columns) if !columns.is_empty() => columns
				.iter()
				.map(|c| quote_ident(caps().quoting, c))
				.collect::<Vec<_>>()
				.join(", "),
			_ => "*".to_string(),
		};
		let top = if limit > 0 { format!("TOP {limit} ") } else { String::new() };
		format!("SELECT {top}{cols} FROM {}", quote_qualified(caps().quoting, table))
	}

	async fn transactional(&self, statements: Vec<anchor_sql::Statement>) -> Result<u64> {
		self.driver.batch("BEGIN TRANSACTION").await?;
		let mut affected = 0u64;
		for statement in &statements {
			match self.driver.execute(&statement.sql, &statement.params).await {
				Ok(count) => affected += count,
				Err(err) => {
					let _ = self.driver.batch("ROLLBACK TRANSACTION").await;
					return Err(err);
				}
			}
		}
		self.driver.batch("COMMIT TRANSACTION").await?;
		Ok(affected)
	}

	async fn user_tables(&self) -> Result<Vec<String>> {
		let rows = self
			.driver
			.query(
				"SELECT s.name AS schema_name, t.name AS table_name FROM sys.tables t \
				 JOIN sys.schemas s ON s.schema_id = t.schema_id WHERE t.is_ms_shipped = 0",
				&[],
			)
			.await?;
		Ok(rows
			.iter()
			.map(|row| {
				format!(
					"{}.{}",
					quote_ident(
						caps().quoting,
						&row.get("schema_name").map(|v| v.as_sql_text()).unwrap_or_default()
					),
					quote_ident(
						caps().quoting,
						&row.get("table_name").map(|v| v.as_sql_text()).unwrap_or_default()
					)
				)
			})
			.collect())
	}
}

#[async_trait]
impl DataOperator for SqlServerData {
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
		self.transactional(statements).await
	}

	async fn update(&self, table: &str, rows: &[Row], where_columns: &[String]) -> Result<u64> {
		if where_columns.is_empty() {
			return Err(Error::invalid_data("update requires where_columns")
				.with_engine("sqlserver"));
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
		self.transactional(statements).await
	}

	async fn upsert(&self, table: &str, rows: &[Row], unique_columns: &[String]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		let statements = rows
			.iter()
			.map(|row| build_upsert(caps(), table, row, unique_columns))
			.collect::<Result<Vec<_>>>()?;
		self.transactional(statements).await
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
					"SELECT COUNT_BIG(*) FROM {} WHERE {clause}",
					quote_qualified(caps().quoting, table)
				);
				Ok((self.execute_count_query(&sql).await?, true))
			}
			_ => {
				// Partition statistics answer without a scan.
				let bare = table.rsplit('.').next().unwrap_or(table);
				let rows = self
					.driver
					.query(
						"SELECT SUM(p.rows) AS estimate FROM sys.partitions p \
						 JOIN sys.tables t ON t.object_id = p.object_id \
						 WHERE t.name = @p1 AND p.index_id IN (0, 1)",
						&[Value::text(bare)],
					)
					.await?;
				if let Some(Value::Int(estimate)) =
					rows.first().and_then(|r| r.get("estimate"))
				{
					return Ok((*estimate, false));
				}
				let sql = format!(
					"SELECT COUNT_BIG(*) FROM {}",
					quote_qualified(caps().quoting, table)
				);
				Ok((self.execute_count_query(&sql).await?, true))
			}
		}
	}

	async fn wipe(&self) -> Result<()> {
		let tables = self.user_tables().await?;
		if tables.is_empty() {
			return Ok(());
		}
		debug!(tables = tables.len(), "wiping user tables");
		// Disable FK checking, delete, re-enable with validation.
		for table in &tables {
			self.driver.batch(&format!("ALTER TABLE {table} NOCHECK CONSTRAINT ALL")).await?;
		}
		let mut result = Ok(());
		for table in &tables {
			if let Err(err) = self.driver.batch(&format!("DELETE FROM {table}")).await {
				result = Err(err);
				break;
			}
		}
		for table in &tables {
			self.driver
				.batch(&format!("ALTER TABLE {table} WITH CHECK CHECK CONSTRAINT ALL"))
				.await?;
		}
		result
	}
}
