// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Capability-driven DDL rendering used by `create_structure`.
//!
//! Tables are emitted in foreign-key dependency order with the
//! primary key inline; remaining constraints and indexes come last as
//! ALTER/CREATE statements.

use std::collections::BTreeSet;

use anchor_core::{
	Capabilities,
	model::{Column, ConstraintKind, Table, UnifiedModel},
};

use crate::ident::{quote_ident, quote_qualified};

/// Render a column type from the model: the engine-native type when
/// discovery recorded one, an ANSI mapping of the unified type
/// otherwise.
pub fn render_type(column: &Column) -> String {
	if !column.data_type.is_empty() && !column.data_type.eq_ignore_ascii_case("array") {
		let mut ty = column.data_type.clone();
		if needs_length(&ty) {
			if let Some(len) = column.max_length {
				ty = format!("{ty}({len})");
			}
		}
		if column.is_array {
			ty.push_str("[]");
		}
		return ty;
	}
	let base = match column.unified_data_type.as_str() {
		"int" => "BIGINT",
		"float" => "DOUBLE PRECISION",
		"decimal" => match (column.precision, column.scale) {
			(Some(p), Some(s)) => return format!("DECIMAL({p}, {s})"),
			_ => "DECIMAL",
		},
		"bool" => "BOOLEAN",
		"bytes" => "BLOB",
		"date" => "DATE",
		"time" => "TIME",
		"timestamp" => "TIMESTAMP",
		"json" => "TEXT",
		"uuid" => "VARCHAR(36)",
		_ => match column.max_length {
			Some(len) => return format!("VARCHAR({len})"),
			None => "VARCHAR(255)",
		},
	};
	base.to_string()
}

fn needs_length(ty: &str) -> bool {
	let lower = ty.to_ascii_lowercase();
	matches!(lower.as_str(), "character varying" | "varchar" | "character" | "char" | "nvarchar")
		&& !ty.contains('(')
}

/// Keys of `model.tables` ordered so every foreign-key target comes
/// before its referrer. Cycles and cross-schema references fall back
/// to name order.
pub fn tables_in_dependency_order(model: &UnifiedModel) -> Vec<String> {
	let mut ordered = Vec::with_capacity(model.tables.len());
	let mut placed: BTreeSet<&str> = BTreeSet::new();
	let mut remaining: Vec<&str> = model.tables.keys().map(String::as_str).collect();

	while !remaining.is_empty() {
		let mut progressed = false;
		remaining.retain(|key| {
			let table = &model.tables[*key];
			let blocked = table
				.constraints
				.iter()
				.filter(|c| c.kind == ConstraintKind::ForeignKey)
				.filter_map(|c| c.reference.as_ref())
				.any(|r| {
					!r.cross_schema
						&& r.table != table.name
						&& model.tables.contains_key(&r.table)
						&& !placed.contains(r.table.as_str())
				});
			if blocked {
				true
			} else {
				ordered.push((*key).to_string());
				placed.insert(*key);
				progressed = true;
				false
			}
		});
		if !progressed {
			// Cycle: emit the rest in name order.
			for key in &remaining {
				ordered.push((*key).to_string());
			}
			break;
		}
	}
	ordered
}

/// `CREATE TABLE` with columns in ordinal order and the primary key
/// inline.
pub fn create_table(
	caps: &Capabilities,
	key: &str,
	table: &Table,
	render: &dyn Fn(&Column) -> String,
) -> String {
	let mut parts = Vec::with_capacity(table.columns.len() + 1);
	for (name, column) in &table.columns {
		let mut part = format!("{} {}", quote_ident(caps.quoting, name), render(column));
		if !column.nullable {
			part.push_str(" NOT NULL");
		}
		if let Some(default) = &column.default {
			if !default.is_empty() && !column.is_identity {
				part.push_str(&format!(" DEFAULT {default}"));
			}
		}
		parts.push(part);
	}
	let pk: Vec<String> = table
		.constraints
		.iter()
		.find(|c| c.kind == ConstraintKind::PrimaryKey)
		.map(|c| c.columns.iter().map(|c| quote_ident(caps.quoting, c)).collect())
		.unwrap_or_default();
	if !pk.is_empty() {
		parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
	}
	format!("CREATE TABLE {} ({})", quote_qualified(caps.quoting, key), parts.join(", "))
}

/// ALTER statements for everything but the primary key.
pub fn constraint_statements(caps: &Capabilities, key: &str, table: &Table) -> Vec<String> {
	let quoted_table = quote_qualified(caps.quoting, key);
	table.constraints
		.iter()
		.filter_map(|constraint| {
			let clause = match constraint.kind {
				ConstraintKind::PrimaryKey => return None,
				ConstraintKind::Unique => format!(
					"UNIQUE ({})",
					constraint
						.columns
						.iter()
						.map(|c| quote_ident(caps.quoting, c))
						.collect::<Vec<_>>()
						.join(", ")
				),
				ConstraintKind::ForeignKey => {
					let reference = constraint.reference.as_ref()?;
					format!(
						"FOREIGN KEY ({}) REFERENCES {} ({})",
						constraint
							.columns
							.iter()
							.map(|c| quote_ident(caps.quoting, c))
							.collect::<Vec<_>>()
							.join(", "),
						quote_qualified(caps.quoting, &reference.table),
						reference
							.columns
							.iter()
							.map(|c| quote_ident(caps.quoting, c))
							.collect::<Vec<_>>()
							.join(", ")
					)
				}
				ConstraintKind::Check => {
					format!("CHECK ({})", constraint.expression.clone()?)
				}
			};
			let name = constraint
				.name
				.clone()
				.unwrap_or_else(|| format!("{}_{}", table.name, constraint.columns.join("_")));
			Some(format!(
				"ALTER TABLE {quoted_table} ADD CONSTRAINT {} {clause}",
				quote_ident(caps.quoting, &name)
			))
		})
		.collect()
}

/// CREATE INDEX statements, skipping indexes that back constraints.
pub fn index_statements(caps: &Capabilities, key: &str, table: &Table) -> Vec<String> {
	let constraint_names: BTreeSet<&str> =
		table.constraints.iter().filter_map(|c| c.name.as_deref()).collect();
	table.indexes
		.iter()
		.filter(|index| !constraint_names.contains(index.name.as_str()))
		.filter(|index| !index.columns.is_empty())
		.map(|index| {
			format!(
				"CREATE {}INDEX {} ON {} ({})",
				if index.unique { "UNIQUE " } else { "" },
				quote_ident(caps.quoting, &index.name),
				quote_qualified(caps.quoting, key),
				index.columns
					.iter()
					.map(|c| quote_ident(caps.quoting, c))
					.collect::<Vec<_>>()
					.join(", ")
			)
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use anchor_core::{
		EngineKind,
		model::{Constraint, ConstraintReference},
	};

	use super::*;

	fn column(unified: &str, nullable: bool) -> Column {
		Column {
			data_type: String::new(),
			unified_data_type: unified.to_string(),
			nullable,
			..Default::default()
		}
	}

	#[test]
	fn test_create_table_inline_pk() {
		let caps = EngineKind::Postgres.capabilities();
		let mut table = Table::new("users")
			.with_column("id", column("int", false))
			.with_column("name", column("text", true));
		table.constraints.push(Constraint::primary_key(vec!["id".into()]));
		let sql = create_table(caps, "users", &table, &render_type_for_test);
		assert_eq!(
			sql,
			"CREATE TABLE \"users\" (\"id\" BIGINT NOT NULL, \"name\" VARCHAR(255), \
			 PRIMARY KEY (\"id\"))"
		);
	}

	fn render_type_for_test(column: &Column) -> String {
		render_type(column)
	}

	#[test]
	fn test_dependency_order_places_targets_first() {
		let mut model = UnifiedModel::default();
		let mut orders = Table::new("ORDERS").with_column("USER_ID", column("int", true));
		orders.constraints.push(Constraint {
			name: None,
			kind: ConstraintKind::ForeignKey,
			columns: vec!["USER_ID".into()],
			reference: Some(ConstraintReference {
				table: "USERS".into(),
				columns: vec!["ID".into()],
				cross_schema: false,
			}),
			expression: None,
		});
		model.insert_table(orders);
		model.insert_table(Table::new("USERS").with_column("ID", column("int", false)));
		assert_eq!(tables_in_dependency_order(&model), vec!["USERS", "ORDERS"]);
	}

	#[test]
	fn test_constraint_statements_skip_pk() {
		let caps = EngineKind::Mysql.capabilities();
		let mut table = Table::new("t").with_column("a", column("int", true));
		table.constraints.push(Constraint::primary_key(vec!["a".into()]));
		assert!(constraint_statements(caps, "t", &table).is_empty());
	}
}
