// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::{
	Capabilities, EngineKind,
	interface::{DataOperator, StreamParams, StreamResult},
};
use anchor_sql::{build_delete, build_insert, build_update, build_upsert, quote_ident, quote_qualified};
use anchor_type::{Error, Result, Row, Value};
use async_trait::async_trait;
use tracing::debug;

use crate::driver::PgDriver;

pub struct PostgresData {
	pub(crate) driver: Arc<PgDriver>,
}

fn caps() -> &'static Capabilities {
	EngineKind::Postgres.capabilities()
}

impl PostgresData {
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

	/// Run the statements inside one transaction, rolling back on the
	/// first failure.
	async fn transactional(&self, statements: Vec<anchor_sql::Statement>) -> Result<u64> {
		self.driver.batch("BEGIN").await?;
		let mut affected = 0u64;
		for statement in &statements {
			match self.driver.execute(&statement.sql, &statement.params).await {
				Ok(count) => affected += count,
				Err(err) => {
					let _ = self.driver.batch("ROLLBACK").await;
					return Err(err);
				}
			}
		}
		self.driver.batch("COMMIT").await?;
		Ok(affected)
	}

	async fn single_column_pk(&self, table: &str) -> Result<Option<String>> {
		let sql = "SELECT kcu.column_name \
		           FROM information_schema.table_constraints tc \
		           JOIN information_schema.key_column_usage kcu \
		             ON kcu.constraint_name = tc.constraint_name \
		           WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = $1";
		let rows = self.driver.query(sql, &[Value::text(table)]).await?;
		if rows.len() != 1 {
			return Ok(None);
		}
		Ok(rows[0].get("column_name").map(|v| v.as_sql_text()))
	}
}

#[async_trait]
impl DataOperator for PostgresData {
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
				.with_engine("postgres"));
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
					"SELECT COUNT(*) FROM {} WHERE {clause}",
					quote_qualified(caps().quoting, table)
				);
				Ok((self.execute_count_query(&sql).await?, true))
			}
			_ => {
				// Planner statistics first; exact count only when the
				// table was never analyzed.
				let sql = "SELECT reltuples::bigint AS estimate FROM pg_class \
				           WHERE oid = $1::regclass";
				let rows = self.driver.query(sql, &[Value::text(table)]).await?;
				if let Some(Value::Int(estimate)) =
					rows.first().and_then(|r| r.get("estimate")).cloned()
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
		let rows = self
			.driver
			.query(
				"SELECT table_schema, table_name FROM information_schema.tables \
				 WHERE table_type = 'BASE TABLE' \
				   AND table_schema NOT IN ('pg_catalog', 'information_schema')",
				&[],
			)
			.await?;
		if rows.is_empty() {
			return Ok(());
		}
		let tables: Vec<String> = rows
			.iter()
			.map(|row| {
				let schema = row.get("table_schema").map(|v| v.as_sql_text()).unwrap_or_default();
				let name = row.get("table_name").map(|v| v.as_sql_text()).unwrap_or_default();
				format!(
					"{}.{}",
					quote_ident(caps().quoting, &schema),
					quote_ident(caps().quoting, &name)
				)
			})
			.collect();
		debug!(tables = tables.len(), "wiping user tables");
		// CASCADE resolves FK ordering in one statement.
		self.driver.batch(&format!("TRUNCATE TABLE {} CASCADE", tables.join(", "))).await
	}

	async fn stream(&self, params: StreamParams) -> Result<StreamResult> {
		let Some(pk) = self.single_column_pk(&params.table).await? else {
			return Err(Error::unsupported("stream")
				.with_engine("postgres")
				.with_context("table", params.table.clone()));
		};
		let quoted_pk = quote_ident(caps().quoting, &pk);
		let cols = if params.columns.is_empty() {
			"*".to_string()
		} else {
			params.columns
				.iter()
				.map(|c| quote_ident(caps().quoting, c))
				.collect::<Vec<_>>()
				.join(", ")
		};
		let mut sql = format!(
			"SELECT {cols} FROM {} ",
			quote_qualified(caps().quoting, &params.table)
		);
		let args = match &params.cursor {
			Some(cursor) => {
				sql.push_str(&format!("WHERE {quoted_pk} > $1 "));
				vec![Value::text(cursor.clone())]
			}
			None => vec![],
		};
		sql.push_str(&format!("ORDER BY {quoted_pk} LIMIT {}", params.batch_size.max(1)));
		let rows = self.driver.query(&sql, &args).await?;
		let next_cursor = rows.last().and_then(|row| row.get(&pk)).map(|v| v.as_sql_text());
		let has_more = rows.len() as u32 >= params.batch_size.max(1);
		Ok(StreamResult {
			rows,
			next_cursor: if has_more { next_cursor } else { None },
			has_more,
		})
	}
}
