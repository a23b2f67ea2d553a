// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{collections::BTreeMap, sync::Arc};

use anchor_core::{
	EngineKind,
	interface::SchemaOperator,
	model::{
		Column, Constraint, ConstraintKind, ConstraintReference, Function, Index, Procedure,
		Table, Trigger, UnifiedModel, View,
	},
};
use anchor_type::{Error, Result, Value};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::driver::MysqlDriver;

pub struct MysqlSchema {
	pub(crate) driver: Arc<MysqlDriver>,
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

pub fn unified_type(data_type: &str) -> &'static str {
	match data_type.to_ascii_lowercase().as_str() {
		"tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => "int",
		"float" | "double" => "float",
		"decimal" | "numeric" => "decimal",
		"char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "enum"
		| "set" => "text",
		"bit" | "bool" | "boolean" => "bool",
		"binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => "bytes",
		"date" => "date",
		"time" => "time",
		"datetime" | "timestamp" => "timestamp",
		"json" => "json",
		_ => "unknown",
	}
}

impl MysqlSchema {
	pub(crate) async fn load_tables(
		&self,
		model: &mut UnifiedModel,
		only: Option<&str>,
	) -> Result<()> {
		let filter = match only {
			Some(_) => "AND TABLE_NAME = ?",
			None => "",
		};
		let sql = format!(
			"SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE, COLUMN_TYPE, IS_NULLABLE, \
			        COLUMN_DEFAULT, CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, \
			        NUMERIC_SCALE, EXTRA \
			 FROM information_schema.COLUMNS \
			 WHERE TABLE_SCHEMA = DATABASE() {filter} \
			 ORDER BY TABLE_NAME, ORDINAL_POSITION"
		);
		let args: Vec<Value> = only.map(|t| vec![Value::text(t)]).unwrap_or_default();
		for row in self.driver.query(&sql, &args).await? {
			let table_name = text(&row, "TABLE_NAME");
			let table = model
				.tables
				.entry(table_name.clone())
				.or_insert_with(|| Table::new(table_name));
			let default = match text(&row, "COLUMN_DEFAULT") {
				d if d.is_empty() => None,
				d => Some(d),
			};
			table.columns.insert(
				text(&row, "COLUMN_NAME"),
				Column {
					unified_data_type: unified_type(&text(&row, "DATA_TYPE")).to_string(),
					// COLUMN_TYPE keeps length/unsigned details.
					data_type: text(&row, "COLUMN_TYPE"),
					nullable: text(&row, "IS_NULLABLE") == "YES",
					default,
					is_primary_key: false,
					max_length: int(&row, "CHARACTER_MAXIMUM_LENGTH"),
					precision: int(&row, "NUMERIC_PRECISION").map(|v| v as i32),
					scale: int(&row, "NUMERIC_SCALE").map(|v| v as i32),
					is_identity: text(&row, "EXTRA").contains("auto_increment"),
					is_array: false,
					options: anchor_type::Row::new(),
				},
			);
		}
		Ok(())
	}

	pub(crate) async fn load_constraints(
		&self,
		model: &mut UnifiedModel,
		only: Option<&str>,
	) -> Result<()> {
		let filter = match only {
			Some(_) => "AND tc.TABLE_NAME = ?",
			None => "",
		};
		let sql = format!(
			"SELECT tc.TABLE_NAME, tc.CONSTRAINT_NAME, tc.CONSTRAINT_TYPE, \
			        kcu.COLUMN_NAME, kcu.REFERENCED_TABLE_NAME, kcu.REFERENCED_COLUMN_NAME \
			 FROM information_schema.TABLE_CONSTRAINTS tc \
			 LEFT JOIN information_schema.KEY_COLUMN_USAGE kcu \
			   ON kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
			  AND kcu.TABLE_SCHEMA = tc.TABLE_SCHEMA \
			  AND kcu.TABLE_NAME = tc.TABLE_NAME \
			 WHERE tc.TABLE_SCHEMA = DATABASE() {filter} \
			 ORDER BY tc.TABLE_NAME, tc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION"
		);
		let args: Vec<Value> = only.map(|t| vec![Value::text(t)]).unwrap_or_default();

		let mut grouped: BTreeMap<(String, String), Constraint> = BTreeMap::new();
		for row in self.driver.query(&sql, &args).await? {
			let kind = match text(&row, "CONSTRAINT_TYPE").as_str() {
				"PRIMARY KEY" => ConstraintKind::PrimaryKey,
				"FOREIGN KEY" => ConstraintKind::ForeignKey,
				"UNIQUE" => ConstraintKind::Unique,
				"CHECK" => ConstraintKind::Check,
				_ => continue,
			};
			let table_name = text(&row, "TABLE_NAME");
			let constraint_name = text(&row, "CONSTRAINT_NAME");
			let entry = grouped
				.entry((table_name, constraint_name.clone()))
				.or_insert_with(|| Constraint {
					name: Some(constraint_name),
					kind,
					columns: Vec::new(),
					reference: None,
					expression: None,
				});
			let column = text(&row, "COLUMN_NAME");
			if !column.is_empty() && !entry.columns.contains(&column) {
				entry.columns.push(column);
			}
			let ref_table = text(&row, "REFERENCED_TABLE_NAME");
			if kind == ConstraintKind::ForeignKey && !ref_table.is_empty() {
				let reference =
					entry.reference.get_or_insert_with(ConstraintReference::default);
				reference.table = ref_table;
				let ref_column = text(&row, "REFERENCED_COLUMN_NAME");
				if !ref_column.is_empty() && !reference.columns.contains(&ref_column) {
					reference.columns.push(ref_column);
				}
			}
		}

		for ((table_name, _), constraint) in grouped {
			let Some(table) = model.tables.get_mut(&table_name) else {
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
		Ok(())
	}

	async fn load_indexes(&self, model: &mut UnifiedModel) -> Result<()> {
		let sql = "SELECT TABLE_NAME, INDEX_NAME, COLUMN_NAME, NON_UNIQUE \
		           FROM information_schema.STATISTICS \
		           WHERE TABLE_SCHEMA = DATABASE() AND INDEX_NAME <> 'PRIMARY' \
		           ORDER BY TABLE_NAME, INDEX_NAME, SEQ_IN_INDEX";
		for row in self.driver.query(sql, &[]).await? {
			let Some(table) = model.tables.get_mut(&text(&row, "TABLE_NAME")) else {
				continue;
			};
			let index_name = text(&row, "INDEX_NAME");
			let column = text(&row, "COLUMN_NAME");
			if let Some(index) = table.indexes.iter_mut().find(|i| i.name == index_name) {
				index.columns.push(column);
			} else {
				table.indexes.push(Index {
					name: index_name,
					columns: vec![column],
					unique: int(&row, "NON_UNIQUE") == Some(0),
				});
			}
		}
		Ok(())
	}
}

#[async_trait]
impl SchemaOperator for MysqlSchema {
	#[instrument(name = "mysql::schema::discover", level = "debug", skip(self))]
	async fn discover_schema(&self) -> Result<UnifiedModel> {
		let mut model = UnifiedModel::default();
		self.load_tables(&mut model, None).await?;
		self.load_constraints(&mut model, None).await?;
		self.load_indexes(&mut model).await?;

		let sql = "SELECT TABLE_NAME, VIEW_DEFINITION FROM information_schema.VIEWS \
		           WHERE TABLE_SCHEMA = DATABASE()";
		for row in self.driver.query(sql, &[]).await? {
			let name = text(&row, "TABLE_NAME");
			model.views.insert(
				name.clone(),
				View {
					name,
					schema: None,
					definition: text(&row, "VIEW_DEFINITION"),
					materialized: false,
					comment: None,
				},
			);
		}

		let sql = "SELECT ROUTINE_NAME, ROUTINE_TYPE, DTD_IDENTIFIER, ROUTINE_DEFINITION \
		           FROM information_schema.ROUTINES WHERE ROUTINE_SCHEMA = DATABASE()";
		for row in self.driver.query(sql, &[]).await? {
			let name = text(&row, "ROUTINE_NAME");
			if text(&row, "ROUTINE_TYPE") == "PROCEDURE" {
				model.procedures.insert(
					name.clone(),
					Procedure {
						name,
						schema: None,
						definition: text(&row, "ROUTINE_DEFINITION"),
					},
				);
			} else {
				model.functions.insert(
					name.clone(),
					Function {
						name,
						schema: None,
						definition: text(&row, "ROUTINE_DEFINITION"),
						returns: Some(text(&row, "DTD_IDENTIFIER")),
					},
				);
			}
		}

		let sql = "SELECT TRIGGER_NAME, EVENT_OBJECT_TABLE, EVENT_MANIPULATION, \
		           ACTION_TIMING, ACTION_STATEMENT \
		           FROM information_schema.TRIGGERS WHERE TRIGGER_SCHEMA = DATABASE()";
		for row in self.driver.query(sql, &[]).await? {
			let name = text(&row, "TRIGGER_NAME");
			model.triggers.insert(
				format!("{}.{name}", text(&row, "EVENT_OBJECT_TABLE")),
				Trigger {
					name,
					table: text(&row, "EVENT_OBJECT_TABLE"),
					event: text(&row, "EVENT_MANIPULATION"),
					timing: text(&row, "ACTION_TIMING"),
					definition: text(&row, "ACTION_STATEMENT"),
				},
			);
		}

		debug!(tables = model.tables.len(), "schema discovered");
		Ok(model)
	}

	#[instrument(name = "mysql::schema::create", level = "debug", skip_all)]
	async fn create_structure(&self, model: &UnifiedModel) -> Result<()> {
		let caps = EngineKind::Mysql.capabilities();
		let mut statements = Vec::new();
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
					anchor_sql::quote_qualified(caps.quoting, key),
					view.definition.trim_end_matches(';')
				));
			}
		}
		// MySQL DDL is not transactional: forward-only, stop at the
		// first failure.
		for statement in &statements {
			self.driver.execute(statement, &[]).await?;
		}
		Ok(())
	}

	async fn list_tables(&self) -> Result<Vec<String>> {
		let sql = "SELECT TABLE_NAME FROM information_schema.TABLES \
		           WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
		           ORDER BY TABLE_NAME";
		let rows = self.driver.query(sql, &[]).await?;
		Ok(rows.iter().map(|row| text(row, "TABLE_NAME")).collect())
	}

	async fn get_table_schema(&self, name: &str) -> Result<Table> {
		let mut model = UnifiedModel::default();
		self.load_tables(&mut model, Some(name)).await?;
		self.load_constraints(&mut model, Some(name)).await?;
		model
			.tables
			.remove(name)
			.ok_or_else(|| Error::table_not_found(name).with_engine("mysql"))
	}
}
