// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::{Capabilities, CdcEvent, CdcOperation};
use anchor_type::{Error, Result, Row};

use crate::{
	dml::{build_delete, build_insert},
	ident::{placeholder, quote_ident, quote_qualified},
	statement::{Statement, push_conditions},
};

/// Render a canonical CDC event into the dialect statement that
/// applies it to a target table.
///
/// - insert: the post-image becomes an INSERT.
/// - update: SET from `data`, WHERE from `old_data` (falling back to
///   `data`), `IS NULL` for undefined values.
/// - delete: WHERE from the key image; an empty WHERE is an error,
///   never "delete all".
pub fn build_apply_statement(caps: &Capabilities, event: &CdcEvent) -> Result<Statement> {
	event.validate()?;
	let table = &event.table_name;
	let missing_image = || Error::internal("validated event lost its image");
	match event.operation {
		CdcOperation::Insert => {
			let data = event.data.as_ref().ok_or_else(missing_image)?;
			build_insert(caps, table, data)
		}
		CdcOperation::Update => {
			let data = event
				.data
				.as_ref()
				.filter(|d| !d.is_empty())
				.ok_or_else(|| Error::invalid_data("update event has no post-image to apply"))?;
			let key = event.key_image().ok_or_else(missing_image)?;
			build_update_from_images(caps, table, data, key)
		}
		CdcOperation::Delete => {
			let key = event.key_image().ok_or_else(missing_image)?;
			build_delete(caps, table, key)
		}
	}
}

fn build_update_from_images(
	caps: &Capabilities,
	table: &str,
	data: &Row,
	key: &Row,
) -> Result<Statement> {
	let mut sql = format!("UPDATE {} SET ", quote_qualified(caps.quoting, table));
	let mut params = Vec::new();
	let mut index = 1;
	for (i, (column, value)) in data.iter().enumerate() {
		if i > 0 {
			sql.push_str(", ");
		}
		sql.push_str(&quote_ident(caps.quoting, column));
		sql.push_str(" = ");
		if value.is_undefined() {
			sql.push_str("NULL");
		} else {
			sql.push_str(&placeholder(caps.placeholders, index));
			params.push(value.clone());
			index += 1;
		}
	}
	sql.push_str(" WHERE ");
	push_conditions(&mut sql, &mut params, caps, index, key);
	Ok(Statement {
		sql,
		params,
	})
}

#[cfg(test)]
mod tests {
	use anchor_core::EngineKind;
	use anchor_type::Value;

	use super::*;

	fn row(pairs: &[(&str, Value)]) -> Row {
		pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	#[test]
	fn test_apply_update_where_uses_old_image() {
		let caps = EngineKind::Postgres.capabilities();
		let mut event = CdcEvent::new(CdcOperation::Update, "users");
		event.data = Some(row(&[("name", Value::text("Grace"))]));
		event.old_data = Some(row(&[("id", Value::Int(1)), ("name", Value::text("Ada"))]));
		let stmt = build_apply_statement(caps, &event).unwrap();
		assert_eq!(
			stmt.sql,
			"UPDATE \"users\" SET \"name\" = $1 WHERE \"id\" = $2 AND \"name\" = $3"
		);
		assert_eq!(stmt.params, vec![Value::text("Grace"), Value::Int(1), Value::text("Ada")]);
	}

	#[test]
	fn test_apply_delete_falls_back_to_post_image() {
		let caps = EngineKind::Postgres.capabilities();
		let mut event = CdcEvent::new(CdcOperation::Delete, "users");
		event.data = Some(row(&[("id", Value::Int(1))]));
		let stmt = build_apply_statement(caps, &event).unwrap();
		assert_eq!(stmt.sql, "DELETE FROM \"users\" WHERE \"id\" = $1");
	}

	#[test]
	fn test_apply_insert() {
		let caps = EngineKind::Mysql.capabilities();
		let mut event = CdcEvent::new(CdcOperation::Insert, "users");
		event.data = Some(row(&[("id", Value::Int(1)), ("name", Value::text("Ada"))]));
		let stmt = build_apply_statement(caps, &event).unwrap();
		assert_eq!(stmt.sql, "INSERT INTO `users` (`id`, `name`) VALUES (?, ?)");
	}

	#[test]
	fn test_apply_update_null_in_where() {
		let caps = EngineKind::Postgres.capabilities();
		let mut event = CdcEvent::new(CdcOperation::Update, "users");
		event.data = Some(row(&[("city", Value::text("London"))]));
		event.old_data = Some(row(&[("city", Value::Undefined), ("id", Value::Int(2))]));
		let stmt = build_apply_statement(caps, &event).unwrap();
		assert_eq!(
			stmt.sql,
			"UPDATE \"users\" SET \"city\" = $1 WHERE \"city\" IS NULL AND \"id\" = $2"
		);
	}
}
