// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{collections::BTreeMap, sync::Arc};

use anchor_core::{
	EngineKind,
	interface::SchemaOperator,
	model::{
		Column, Constraint, ConstraintKind, ConstraintReference, Function, Index, Procedure,
		Schema, Sequence, Table, Trigger, UnifiedModel, View,
	},
};
use anchor_sql::quote_qualified;
use anchor_type::{Error, Result, Value};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::driver::PgDriver;

const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema')";

pub struct PostgresSchema {
	pub(crate) driver: Arc<PgDriver>,
}

fn text(row: &anchor_type::Row, key: &str) -> String {
	match row.get(key) {
		Some(Value::Text(v)) => v.clone(),
		Some(other) if !other.is_undefined() => other.as_sql_text(),
		_ => String::new(),
	}
}

fn int(row: &anchor_type::Row, key: &str) -> Option<i64> {
	match row.get(key) {
		Some(Value::Int(v)) => Some(*v),
		Some(Value::Text(v)) => v.parse().ok(),
		_ => None,
	}
}

/// Key objects by bare name in the default schema, qualified name
/// elsewhere.
fn object_key(schema: &str, name: &str) -> String {
	if schema.is_empty() || schema == "public" {
		name.to_string()
	} else {
		format!("{schema}.{name}")
	}
}

pub fn unified_type(data_type: &str) -> &'static str {
	match data_type.to_ascii_lowercase().as_str() {
		"smallint" | "integer" | "bigint" | "smallserial" | "serial" | "bigserial" => "int",
		"real" | "double precision" => "float",
		"numeric" | "decimal" | "money" => "decimal",
		"character varying" | "varchar" | "character" | "char" | "text" | "name" => "text",
		"boolean" => "bool",
		"bytea" => "bytes",
		"date" => "date",
		"json" | "jsonb" => "json",
		"uuid" => "uuid",
		"array" => "array",
		t if t.starts_with("timestamp") => "timestamp",
		t if t.starts_with("time") => "time",
		_ => "unknown",
	}
}

impl PostgresSchema {
	async fn load_tables(&self, model: &mut UnifiedModel, only: Option<&str>) -> Result<()> {
		let filter = match only {
			Some(_) => "AND c.table_name = $1",
			None => "",
		};
		let sql = format!(
			"SELECT c.table_schema, c.table_name, c.column_name, c.data_type, c.udt_name, \
			        c.is_nullable, c.column_default, c.character_maximum_length, \
			        c.numeric_precision, c.numeric_scale, c.is_identity \
			 FROM information_schema.columns c \
			 JOIN information_schema.tables t \
			   ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
			 WHERE t.table_type = 'BASE TABLE' \
			   AND c.table_schema NOT IN {SYSTEM_SCHEMAS} {filter} \
			 ORDER BY c.table_schema, c.table_name, c.ordinal_position"
		);
		let args: Vec<Value> = match only {
			Some(name) => vec![Value::text(name)],
			None => vec![],
		};
		for row in self.driver.query(&sql, &args).await? {
			let schema = text(&row, "table_schema");
			let name = text(&row, "table_name");
			let key = object_key(&schema, &name);
			let table = model.tables.entry(key).or_insert_with(|| {
				let mut t = Table::new(name.clone());
				if schema != "public" {
					t.schema = Some(schema.clone());
				}
				t
			});
			let data_type = text(&row, "data_type");
			let is_array = data_type.eq_ignore_ascii_case("array");
			let default = match text(&row, "column_default") {
				d if d.is_empty() => None,
				d => Some(d),
			};
			table.columns.insert(
				text(&row, "column_name"),
				Column {
					unified_data_type: unified_type(&data_type).to_string(),
					data_type: if is_array {
						// udt_name is `_elem` for arrays.
						text(&row, "udt_name")
					} else {
						data_type
					},
					nullable: text(&row, "is_nullable") == "YES",
					is_identity: text(&row, "is_identity") == "YES",
					default,
					is_primary_key: false,
					max_length: int(&row, "character_maximum_length"),
					precision: int(&row, "numeric_precision").map(|v| v as i32),
					scale: int(&row, "numeric_scale").map(|v| v as i32),
					is_array,
					options: anchor_type::Row::new(),
				},
			);
		}
		Ok(())
	}

	async fn load_constraints(&self, model: &mut UnifiedModel, only: Option<&str>) -> Result<()> {
		let filter = match only {
			Some(_) => "AND tc.table_name = $1",
			None => "",
		};
		let sql = format!(
			"SELECT tc.table_schema, tc.table_name, tc.constraint_name, tc.constraint_type, \
			        kcu.column_name, ccu.table_name AS ref_table, ccu.column_name AS ref_column, \
			        cc.check_clause \
			 FROM information_schema.table_constraints tc \
			 LEFT JOIN information_schema.key_column_usage kcu \
			   ON kcu.constraint_name = tc.constraint_name \
			  AND kcu.constraint_schema = tc.constraint_schema \
			 LEFT JOIN information_schema.constraint_column_usage ccu \
			   ON ccu.constraint_name = tc.constraint_name \
			  AND tc.constraint_type = 'FOREIGN KEY' \
			 LEFT JOIN information_schema.check_constraints cc \
			   ON cc.constraint_name = tc.constraint_name \
			  AND cc.constraint_schema = tc.constraint_schema \
			 WHERE tc.table_schema NOT IN {SYSTEM_SCHEMAS} {filter} \
			 ORDER BY tc.table_schema, tc.table_name, tc.constraint_name, kcu.ordinal_position"
		);
		let args: Vec<Value> = match only {
			Some(name) => vec![Value::text(name)],
			None => vec![],
		};

		// constraint name -> (table key, partial constraint)
		let mut grouped: BTreeMap<String, (String, Constraint)> = BTreeMap::new();
		for row in self.driver.query(&sql, &args).await? {
			let kind = match text(&row, "constraint_type").as_str() {
				"PRIMARY KEY" => ConstraintKind::PrimaryKey,
				"FOREIGN KEY" => ConstraintKind::ForeignKey,
				"UNIQUE" => ConstraintKind::Unique,
				"CHECK" => ConstraintKind::Check,
				_ => continue,
			};
			let table_key = object_key(&text(&row, "table_schema"), &text(&row, "table_name"));
			let constraint_name = text(&row, "constraint_name");
			let entry =
				grouped.entry(constraint_name.clone()).or_insert_with(|| {
					(
						table_key,
						Constraint {
							name: Some(constraint_name.clone()),
							kind,
							columns: Vec::new(),
							reference: None,
							expression: None,
						},
					)
				});
			let column = text(&row, "column_name");
			if !column.is_empty() && !entry.1.columns.contains(&column) {
				entry.1.columns.push(column);
			}
			if kind == ConstraintKind::ForeignKey {
				let ref_table = text(&row, "ref_table");
				let ref_column = text(&row, "ref_column");
				let reference =
					entry.1.reference.get_or_insert_with(ConstraintReference::default);
				if reference.table.is_empty() {
					reference.table = ref_table;
				}
				if !ref_column.is_empty() && !reference.columns.contains(&ref_column) {
					reference.columns.push(ref_column);
				}
			}
			if kind == ConstraintKind::Check {
				let clause = text(&row, "check_clause");
				if !clause.is_empty() {
					entry.1.expression = Some(clause);
				}
			}
		}

		for (_, (table_key, constraint)) in grouped {
			let Some(table) = model.tables.get_mut(&table_key) else {
				continue;
			};
			if constraint.kind == ConstraintKind::PrimaryKey {
				for column_name in &constraint.columns {
					if let Some(column) = table.columns.get_mut(column_name) {
						column.is_primary_key = true;
					}
				}
			}
			table.constraints.push(constraint);
		}

		// Mark dangling FK references as cross-schema after the fact.
		let known: Vec<String> = model.tables.keys().cloned().collect();
		for table in model.tables.values_mut() {
			for constraint in &mut table.constraints {
				if let Some(reference) = &mut constraint.reference {
					if !known.iter().any(|k| {
						k == &reference.table
							|| k.ends_with(&format!(".{}", reference.table))
					}) {
						reference.cross_schema = true;
					}
				}
			}
		}
		Ok(())
	}

	async fn load_indexes(&self, model: &mut UnifiedModel) -> Result<()> {
		let sql = format!(
			"SELECT schemaname, tablename, indexname, indexdef \
			 FROM pg_indexes WHERE schemaname NOT IN {SYSTEM_SCHEMAS}"
		);
		for row in self.driver.query(&sql, &[]).await? {
			let key = object_key(&text(&row, "schemaname"), &text(&row, "tablename"));
			let Some(table) = model.tables.get_mut(&key) else {
				continue;
			};
			let definition = text(&row, "indexdef");
			table.indexes.push(Index {
				name: text(&row, "indexname"),
				columns: index_columns(&definition),
				unique: definition.starts_with("CREATE UNIQUE"),
			});
		}
		Ok(())
	}
}

/// Pull the column list out of a `CREATE INDEX … (col, col)` text.
fn index_columns(definition: &str) -> Vec<String> {
	let Some(open) = definition.find('(') else {
		return Vec::new();
	};
	let Some(close) = definition.rfind(')') else {
		return Vec::new();
	};
	definition[open + 1..close]
		.split(',')
		.map(|c| c.trim().trim_matches('"').to_string())
		.filter(|c| !c.is_empty())
		.collect()
}

#[async_trait]
impl SchemaOperator for PostgresSchema {
	#[instrument(name = "postgres::schema::discover", level = "debug", skip(self))]
	async fn discover_schema(&self) -> Result<UnifiedModel> {
		let mut model = UnifiedModel::default();

		let sql = format!(
			"SELECT schema_name FROM information_schema.schemata \
			 WHERE schema_name NOT IN {SYSTEM_SCHEMAS} AND schema_name NOT LIKE 'pg_%'"
		);
		for row in self.driver.query(&sql, &[]).await? {
			let name = text(&row, "schema_name");
			model.schemas.insert(
				name.clone(),
				Schema {
					name,
					owner: None,
					comment: None,
				},
			);
		}

		self.load_tables(&mut model, None).await?;
		self.load_constraints(&mut model, None).await?;
		self.load_indexes(&mut model).await?;

		let sql = format!(
			"SELECT table_schema, table_name, view_definition \
			 FROM information_schema.views WHERE table_schema NOT IN {SYSTEM_SCHEMAS}"
		);
		for row in self.driver.query(&sql, &[]).await? {
			let schema = text(&row, "table_schema");
			let name = text(&row, "table_name");
			model.views.insert(
				object_key(&schema, &name),
				View {
					name,
					schema: (schema != "public").then_some(schema),
					definition: text(&row, "view_definition"),
					materialized: false,
					comment: None,
				},
			);
		}

		let sql = format!(
			"SELECT routine_schema, routine_name, routine_type, data_type, routine_definition \
			 FROM information_schema.routines WHERE routine_schema NOT IN {SYSTEM_SCHEMAS}"
		);
		for row in self.driver.query(&sql, &[]).await? {
			let schema = text(&row, "routine_schema");
			let name = text(&row, "routine_name");
			let key = object_key(&schema, &name);
			let schema_opt = (schema != "public").then_some(schema);
			if text(&row, "routine_type") == "PROCEDURE" {
				model.procedures.insert(
					key,
					Procedure {
						name,
						schema: schema_opt,
						definition: text(&row, "routine_definition"),
					},
				);
			} else {
				model.functions.insert(
					key,
					Function {
						name,
						schema: schema_opt,
						definition: text(&row, "routine_definition"),
						returns: Some(text(&row, "data_type")),
					},
				);
			}
		}

		let sql = format!(
			"SELECT trigger_name, event_object_table, event_manipulation, action_timing, \
			        action_statement \
			 FROM information_schema.triggers WHERE trigger_schema NOT IN {SYSTEM_SCHEMAS}"
		);
		for row in self.driver.query(&sql, &[]).await? {
			let name = text(&row, "trigger_name");
			model.triggers.insert(
				format!("{}.{}", text(&row, "event_object_table"), name),
				Trigger {
					name,
					table: text(&row, "event_object_table"),
					event: text(&row, "event_manipulation"),
					timing: text(&row, "action_timing"),
					definition: text(&row, "action_statement"),
				},
			);
		}

		let sql = format!(
			"SELECT sequence_schema, sequence_name, start_value, increment \
			 FROM information_schema.sequences WHERE sequence_schema NOT IN {SYSTEM_SCHEMAS}"
		);
		for row in self.driver.query(&sql, &[]).await? {
			let schema = text(&row, "sequence_schema");
			let name = text(&row, "sequence_name");
			model.sequences.insert(
				object_key(&schema, &name),
				Sequence {
					name,
					schema: (schema != "public").then_some(schema),
					start: int(&row, "start_value").unwrap_or(1),
					increment: int(&row, "increment").unwrap_or(1),
				},
			);
		}

		debug!(tables = model.tables.len(), views = model.views.len(), "schema discovered");
		Ok(model)
	}

	#[instrument(name = "postgres::schema::create", level = "debug", skip_all)]
	async fn create_structure(&self, model: &UnifiedModel) -> Result<()> {
		let caps = EngineKind::Postgres.capabilities();
		let mut statements = Vec::new();

		for schema in model.schemas.values() {
			statements.push(format!(
				"CREATE SCHEMA IF NOT EXISTS {}",
				anchor_sql::quote_ident(caps.quoting, &schema.name)
			));
		}
		for sequence in model.sequences.values() {
			statements.push(format!(
				"CREATE SEQUENCE IF NOT EXISTS {} START {} INCREMENT {}",
				quote_qualified(caps.quoting, &sequence_key(sequence)),
				if sequence.start == 0 { 1 } else { sequence.start },
				if sequence.increment == 0 { 1 } else { sequence.increment },
			));
		}
		for key in anchor_sql::ddl::tables_in_dependency_order(model) {
			let table = &model.tables[&key];
			statements.push(anchor_sql::ddl::create_table(
				caps,
				&key,
				table,
				&anchor_sql::ddl::render_type,
			));
		}
		for (key, table) in &model.tables {
			statements.extend(anchor_sql::ddl::constraint_statements(caps, key, table));
			statements.extend(anchor_sql::ddl::index_statements(caps, key, table));
		}
		for (key, view) in &model.views {
			if !view.definition.trim().is_empty() {
				statements.push(format!(
					"CREATE OR REPLACE VIEW {} AS {}",
					quote_qualified(caps.quoting, key),
					view.definition.trim_end_matches(';')
				));
			}
		}
		for routine in model.functions.values().map(|f| &f.definition).chain(
			model.procedures.values().map(|p| &p.definition),
		) {
			let body = routine.trim();
			// Only full statements survive discovery on every engine;
			// fragments are skipped.
			if body.to_ascii_uppercase().starts_with("CREATE") {
				statements.push(body.trim_end_matches(';').to_string());
			}
		}
		for trigger in model.triggers.values() {
			let body = trigger.definition.trim();
			if body.to_ascii_uppercase().starts_with("CREATE") {
				statements.push(body.trim_end_matches(';').to_string());
			}
		}

		if statements.is_empty() {
			return Ok(());
		}
		let script = format!("BEGIN;\n{};\nCOMMIT;", statements.join(";\n"));
		self.driver.batch(&script).await
	}

	async fn list_tables(&self) -> Result<Vec<String>> {
		let sql = format!(
			"SELECT table_schema, table_name FROM information_schema.tables \
			 WHERE table_type = 'BASE TABLE' AND table_schema NOT IN {SYSTEM_SCHEMAS} \
			 ORDER BY table_schema, table_name"
		);
		let rows = self.driver.query(&sql, &[]).await?;
		Ok(rows
			.iter()
			.map(|row| object_key(&text(row, "table_schema"), &text(row, "table_name")))
			.collect())
	}

	async fn get_table_schema(&self, name: &str) -> Result<Table> {
		let bare = name.rsplit('.').next().unwrap_or(name);
		let mut model = UnifiedModel::default();
		self.load_tables(&mut model, Some(bare)).await?;
		self.load_constraints(&mut model, Some(bare)).await?;
		model
			.tables
			.remove(name)
			.or_else(|| {
				let key = model.tables.keys().find(|k| k.as_str() == bare)?.clone();
				model.tables.remove(&key)
			})
			.ok_or_else(|| Error::table_not_found(name).with_engine("postgres"))
	}
}

fn sequence_key(sequence: &Sequence) -> String {
	match &sequence.schema {
		Some(schema) => format!("{schema}.{}", sequence.name),
		None => sequence.name.clone(),
	}
}
