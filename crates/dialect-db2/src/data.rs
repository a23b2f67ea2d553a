// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::{Capabilities, EngineKind, interface::DataOperator};
use anchor_sql::{build_delete, build_insert, build_update, build_upsert, quote_ident, quote_qualified};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::{Db2Driver, inline_statement};

pub struct Db2Data {
	pub(crate) driver: Arc<Db2Driver>,
}

fn caps() -> &'static Capabilities {
	EngineKind::Db2.capabilities()
}

impl Db2Data {
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
			sql.push_str(&format!(" FETCH FIRST {limit} ROWS ONLY"));
		}
		sql
	}

	/// DML row counts come from data-change table references: the
	/// statement is wrapped in `SELECT COUNT(*) FROM FINAL|OLD TABLE
	/// (…)`.
	async fn counted(&self, wrapped: String) -> Result<u64> {
		let rows = self.driver.query(&wrapped).await?;
		Ok(rows
			.first()
			.and_then(|row| row.values().next())
			.and_then(|v| v.as_sql_text().trim().parse::<u64>().ok())
			.unwrap_or(0))
	}
}

#[async_trait]
impl DataOperator for Db2Data {
	async fn fetch(&self, table: &str, limit: i64) -> Result<Vec<Row>> {
		self.driver.query(&self.select(table, None, limit)).await
	}

	async fn fetch_with_columns(
		&self,
		table: &str,
		columns: &[String],
		limit: i64,
	) -> Result<Vec<Row>> {
		self.driver.query(&self.select(table, Some(columns), limit)).await
	}

	async fn insert(&self, table: &str, rows: &[Row]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		let statements = rows
			.iter()
			.map(|row| build_insert(caps(), table, row).map(|s| inline_statement(&s)))
			.collect::<Result<Vec<_>>>()?;
		let count = statements.len() as u64;
		self.driver.transactional(statements).await?;
		Ok(count)
	}

	async fn update(&self, table: &str, rows: &[Row], where_columns: &[String]) -> Result<u64> {
		if where_columns.is_empty() {
			return Err(Error::invalid_data("update requires where_columns").with_engine("db2"));
		}
		let mut affected = 0u64;
		for row in rows {
			let Some(statement) = build_update(caps(), table, row, where_columns)? else {
				continue;
			};
			affected += self
				.counted(format!(
					"SELECT COUNT(*) FROM FINAL TABLE ({})",
					inline_statement(&statement)
				))
				.await?;
		}
		Ok(affected)
	}

	async fn upsert(&self, table: &str, rows: &[Row], unique_columns: &[String]) -> Result<u64> {
		if rows.is_empty() {
			return Ok(0);
		}
		let statements = rows
			.iter()
			.map(|row| build_upsert(caps(), table, row, unique_columns).map(|s| inline_statement(&s)))
			.collect::<Result<Vec<_>>>()?;
		let count = statements.len() as u64;
		self.driver.transactional(statements).await?;
		Ok(count)
	}

	async fn delete(&self, table: &str, conditions: &Row) -> Result<u64> {
		let statement = build_delete(caps(), table, conditions)?;
		self.counted(format!(
			"SELECT COUNT(*) FROM OLD TABLE ({})",
			inline_statement(&statement)
		))
		.await
	}

	async fn execute_query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
		let statement = anchor_sql::Statement {
			sql: sql.to_string(),
			params: args.to_vec(),
		};
		self.driver.query(&inline_statement(&statement)).await
	}

	async fn execute_count_query(&self, sql: &str) -> Result<i64> {
		let rows = self.driver.query(sql).await?;
		rows.first()
			.and_then(|row| row.values().next())
			.and_then(|v| v.as_sql_text().trim().parse().ok())
			.ok_or_else(|| Error::invalid_data("count query returned no numeric value"))
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
				// CARD is a statistics estimate; -1 before RUNSTATS.
				let bare = table.rsplit('.').next().unwrap_or(table);
				let sql = format!(
					"SELECT CARD FROM SYSCAT.TABLES WHERE TABNAME = '{}'",
					bare.replace('\'', "''")
				);
				let rows = self.driver.query(&sql).await?;
				if let Some(estimate) = rows
					.first()
					.and_then(|r| r.values().next())
					.and_then(|v| v.as_sql_text().trim().parse::<i64>().ok())
				{
					if estimate >= 0 {
						return Ok((estimate, false));
					}
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
		let tables = self
			.driver
			.query(
				"SELECT TABSCHEMA, TABNAME FROM SYSCAT.TABLES \
				 WHERE TYPE = 'T' AND TABSCHEMA NOT LIKE 'SYS%'",
			)
			.await?;
		if tables.is_empty() {
			return Ok(());
		}
		debug!(tables = tables.len(), "wiping user tables");
		let quoted: Vec<String> = tables
			.iter()
			.map(|row| {
				format!(
					"{}.{}",
					quote_ident(
						caps().quoting,
						row.get("TABSCHEMA")
							.map(|v| v.as_sql_text().trim().to_string())
							.unwrap_or_default()
							.as_str()
					),
					quote_ident(
						caps().quoting,
						row.get("TABNAME")
							.map(|v| v.as_sql_text().trim().to_string())
							.unwrap_or_default()
							.as_str()
					)
				)
			})
			.collect();
		// Defer FK enforcement, delete, restore.
		let mut statements = Vec::new();
		for table in &quoted {
			statements.push(format!(
				"ALTER TABLE {table} ALTER FOREIGN KEYS NOT ENFORCED"
			));
		}
		for table in &quoted {
			statements.push(format!("DELETE FROM {table}"));
		}
		for table in &quoted {
			statements.push(format!("ALTER TABLE {table} ALTER FOREIGN KEYS ENFORCED"));
		}
		self.driver.transactional(statements).await
	}
}
