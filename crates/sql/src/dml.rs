// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::{Capabilities, UpsertStyle};
use anchor_type::{Error, Result, Row, Value};

use crate::{
	ident::{placeholder, quote_ident, quote_qualified},
	statement::{Statement, push_conditions},
};

/// `INSERT INTO t (cols…) VALUES (placeholders…)` for one row.
/// `Undefined` values render as literal `NULL` so every engine accepts
/// the statement without type hints.
pub fn build_insert(caps: &Capabilities, table: &str, row: &Row) -> Result<Statement> {
	if row.is_empty() {
		return Err(Error::invalid_data("insert row has no columns"));
	}
	let mut columns = Vec::with_capacity(row.len());
	let mut values = Vec::with_capacity(row.len());
	let mut params = Vec::new();
	let mut index = 1;
	for (column, value) in row {
		columns.push(quote_ident(caps.quoting, column));
		if value.is_undefined() {
			values.push("NULL".to_string());
		} else {
			values.push(placeholder(caps.placeholders, index));
			params.push(value.clone());
			index += 1;
		}
	}
	let sql = format!(
		"INSERT INTO {} ({}) VALUES ({})",
		quote_qualified(caps.quoting, table),
		columns.join(", "),
		values.join(", ")
	);
	Ok(Statement {
		sql,
		params,
	})
}

/// `UPDATE t SET … WHERE …` matching by equality over `where_columns`.
/// Returns `None` when the row carries none of the where-columns or
/// nothing to set.
pub fn build_update(
	caps: &Capabilities,
	table: &str,
	row: &Row,
	where_columns: &[String],
) -> Result<Option<Statement>> {
	if where_columns.is_empty() {
		return Err(Error::invalid_data("update requires where_columns"));
	}

	let conditions: Row = where_columns
		.iter()
		.filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
		.collect();
	if conditions.is_empty() {
		return Ok(None);
	}

	let assignments: Vec<(&String, &Value)> =
		row.iter().filter(|(c, _)| !where_columns.contains(c)).collect();
	if assignments.is_empty() {
		return Ok(None);
	}

	let mut sql = format!("UPDATE {} SET ", quote_qualified(caps.quoting, table));
	let mut params = Vec::new();
	let mut index = 1;
	for (i, (column, value)) in assignments.iter().enumerate() {
		if i > 0 {
			sql.push_str(", ");
		}
		sql.push_str(&quote_ident(caps.quoting, column));
		sql.push_str(" = ");
		if value.is_undefined() {
			sql.push_str("NULL");
		} else {
			sql.push_str(&placeholder(caps.placeholders, index));
			params.push((*value).clone());
			index += 1;
		}
	}
	sql.push_str(" WHERE ");
	push_conditions(&mut sql, &mut params, caps, index, &conditions);
	Ok(Some(Statement {
		sql,
		params,
	}))
}

/// `DELETE FROM t WHERE …` with `IS NULL` for undefined condition
/// values. Empty conditions are rejected, never "delete all".
pub fn build_delete(caps: &Capabilities, table: &str, conditions: &Row) -> Result<Statement> {
	if conditions.is_empty() {
		return Err(Error::invalid_data("delete requires conditions"));
	}
	let mut sql = format!("DELETE FROM {} WHERE ", quote_qualified(caps.quoting, table));
	let mut params = Vec::new();
	push_conditions(&mut sql, &mut params, caps, 1, conditions);
	Ok(Statement {
		sql,
		params,
	})
}

/// Insert-or-update on `unique_columns` in the engine's declared
/// style.
pub fn build_upsert(
	caps: &Capabilities,
	table: &str,
	row: &Row,
	unique_columns: &[String],
) -> Result<Statement> {
	if unique_columns.is_empty() {
		return Err(Error::invalid_data("upsert requires unique_columns"));
	}
	match caps.upsert {
		Some(UpsertStyle::Replace) => {
			let insert = build_insert(caps, table, row)?;
			Ok(Statement {
				sql: insert.sql.replacen("INSERT INTO", "REPLACE INTO", 1),
				params: insert.params,
			})
		}
		Some(UpsertStyle::OnConflict) => build_on_conflict(caps, table, row, unique_columns),
		Some(UpsertStyle::Merge) => build_merge(caps, table, row, unique_columns),
		None => Err(Error::unsupported("upsert")),
	}
}

fn build_on_conflict(
	caps: &Capabilities,
	table: &str,
	row: &Row,
	unique_columns: &[String],
) -> Result<Statement> {
	let insert = build_insert(caps, table, row)?;
	let conflict_cols: Vec<String> =
		unique_columns.iter().map(|c| quote_ident(caps.quoting, c)).collect();
	let updates: Vec<String> = row
		.keys()
		.filter(|c| !unique_columns.contains(c))
		.map(|c| {
			let q = quote_ident(caps.quoting, c);
			format!("{q} = EXCLUDED.{q}")
		})
		.collect();
	let clause = if updates.is_empty() {
		format!(" ON CONFLICT ({}) DO NOTHING", conflict_cols.join(", "))
	} else {
		format!(" ON CONFLICT ({}) DO UPDATE SET {}", conflict_cols.join(", "), updates.join(", "))
	};
	Ok(Statement {
		sql: insert.sql + &clause,
		params: insert.params,
	})
}

/// MERGE binds every row value twice: once for the `USING` row and
/// once for the `INSERT` value list. Placeholders are numbered
/// positionally and never reused.
fn build_merge(
	caps: &Capabilities,
	table: &str,
	row: &Row,
	unique_columns: &[String],
) -> Result<Statement> {
	if row.is_empty() {
		return Err(Error::invalid_data("upsert row has no columns"));
	}
	let quoted: Vec<(String, &Value)> =
		row.iter().map(|(c, v)| (quote_ident(caps.quoting, c), v)).collect();

	let mut params = Vec::new();
	let mut index = 1;
	let mut using_values = Vec::with_capacity(quoted.len());
	for (_, value) in &quoted {
		if value.is_undefined() {
			using_values.push("NULL".to_string());
		} else {
			using_values.push(placeholder(caps.placeholders, index));
			params.push((*value).clone());
			index += 1;
		}
	}

	let on: Vec<String> = unique_columns
		.iter()
		.map(|c| {
			let q = quote_ident(caps.quoting, c);
			format!("t.{q} = s.{q}")
		})
		.collect();

	let updates: Vec<String> = row
		.keys()
		.filter(|c| !unique_columns.contains(c))
		.map(|c| {
			let q = quote_ident(caps.quoting, c);
			format!("t.{q} = s.{q}")
		})
		.collect();

	let mut insert_values = Vec::with_capacity(quoted.len());
	for (_, value) in &quoted {
		if value.is_undefined() {
			insert_values.push("NULL".to_string());
		} else {
			insert_values.push(placeholder(caps.placeholders, index));
			params.push((*value).clone());
			index += 1;
		}
	}

	let column_list = quoted.iter().map(|(q, _)| q.clone()).collect::<Vec<_>>().join(", ");
	let mut sql = format!(
		"MERGE INTO {} AS t USING (VALUES ({})) AS s ({}) ON {}",
		quote_qualified(caps.quoting, table),
		using_values.join(", "),
		column_list,
		on.join(" AND "),
	);
	if !updates.is_empty() {
		sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", updates.join(", ")));
	}
	sql.push_str(&format!(
		" WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
		column_list,
		insert_values.join(", ")
	));
	if caps.merge_terminator {
		sql.push(';');
	}
	Ok(Statement {
		sql,
		params,
	})
}

#[cfg(test)]
mod tests {
	use anchor_core::EngineKind;

	use super::*;

	fn row(pairs: &[(&str, Value)]) -> Row {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn test_insert_with_null() {
		let caps = EngineKind::Postgres.capabilities();
		let stmt = build_insert(
			caps,
			"users",
			&row(&[("id", Value::Int(1)), ("city", Value::Undefined)]),
		)
		.unwrap();
		assert_eq!(stmt.sql, "INSERT INTO \"users\" (\"city\", \"id\") VALUES (NULL, $1)");
		assert_eq!(stmt.params, vec![Value::Int(1)]);
	}

	#[test]
	fn test_update_skips_row_without_where_values() {
		let caps = EngineKind::Postgres.capabilities();
		let stmt = build_update(
			caps,
			"users",
			&row(&[("name", Value::text("Ada"))]),
			&["id".to_string()],
		)
		.unwrap();
		assert!(stmt.is_none());
	}

	#[test]
	fn test_update_where_equality() {
		let caps = EngineKind::Mysql.capabilities();
		let stmt = build_update(
			caps,
			"users",
			&row(&[("id", Value::Int(1)), ("name", Value::text("Grace"))]),
			&["id".to_string()],
		)
		.unwrap()
		.unwrap();
		assert_eq!(stmt.sql, "UPDATE `users` SET `name` = ? WHERE `id` = ?");
		assert_eq!(stmt.params, vec![Value::text("Grace"), Value::Int(1)]);
	}

	#[test]
	fn test_delete_null_becomes_is_null() {
		let caps = EngineKind::Postgres.capabilities();
		let stmt = build_delete(
			caps,
			"users",
			&row(&[("city", Value::Undefined), ("id", Value::Int(7))]),
		)
		.unwrap();
		assert_eq!(stmt.sql, "DELETE FROM \"users\" WHERE \"city\" IS NULL AND \"id\" = $1");
		assert_eq!(stmt.params, vec![Value::Int(7)]);
	}

	#[test]
	fn test_delete_requires_conditions() {
		let caps = EngineKind::Postgres.capabilities();
		assert!(build_delete(caps, "users", &Row::new()).is_err());
	}

	#[test]
	fn test_on_conflict_upsert() {
		let caps = EngineKind::Postgres.capabilities();
		let stmt = build_upsert(
			caps,
			"orders",
			&row(&[("id", Value::Int(1)), ("total", Value::Int(10))]),
			&["id".to_string()],
		)
		.unwrap();
		assert_eq!(
			stmt.sql,
			"INSERT INTO \"orders\" (\"id\", \"total\") VALUES ($1, $2) \
			 ON CONFLICT (\"id\") DO UPDATE SET \"total\" = EXCLUDED.\"total\""
		);
	}

	#[test]
	fn test_replace_upsert() {
		let caps = EngineKind::Mysql.capabilities();
		let stmt = build_upsert(
			caps,
			"orders",
			&row(&[("id", Value::Int(1))]),
			&["id".to_string()],
		)
		.unwrap();
		assert!(stmt.sql.starts_with("REPLACE INTO `orders`"));
	}

	#[test]
	fn test_merge_binds_values_twice() {
		let caps = EngineKind::Db2.capabilities();
		let stmt = build_upsert(
			caps,
			"ORDERS",
			&row(&[("ID", Value::Int(1)), ("TOTAL", Value::Int(10))]),
			&["ID".to_string()],
		)
		.unwrap();
		assert_eq!(
			stmt.sql,
			"MERGE INTO \"ORDERS\" AS t USING (VALUES (?, ?)) AS s (\"ID\", \"TOTAL\") \
			 ON t.\"ID\" = s.\"ID\" \
			 WHEN MATCHED THEN UPDATE SET t.\"TOTAL\" = s.\"TOTAL\" \
			 WHEN NOT MATCHED THEN INSERT (\"ID\", \"TOTAL\") VALUES (?, ?)"
		);
		assert_eq!(
			stmt.params,
			vec![Value::Int(1), Value::Int(10), Value::Int(1), Value::Int(10)]
		);
	}

	#[test]
	fn test_merge_terminator_for_named_placeholders() {
		let caps = EngineKind::Sqlserver.capabilities();
		let stmt = build_upsert(
			caps,
			"ORDERS",
			&row(&[("ID", Value::Int(1)), ("TOTAL", Value::Int(10))]),
			&["ID".to_string()],
		)
		.unwrap();
		assert!(stmt.sql.ends_with(';'));
		assert!(stmt.sql.contains("@p1"));
		assert!(stmt.sql.contains("@p4"));
	}
}
