// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{collections::BTreeMap, sync::Arc};

use anchor_core::{
	EngineKind,
	interface::SchemaOperator,
	model::{
		Column, Constraint, ConstraintKind, ConstraintReference, Index, Procedure, Schema,
		Table, Trigger, UnifiedModel, View,
	},
};
use anchor_type::{Error, Result, Value};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::driver::SqlServerDriver;

pub struct SqlServerSchema {
	pub(crate) driver: Arc<SqlServerDriver>,
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

fn object_key(schema: &str, name: &str) -> String {
	if schema.is_empty() || schema == "dbo" {
		name.to_string()
	} else {
		format!("{schema}.{name}")
	}
}

pub fn unified_type(data_type: &str) -> &'static str {
	match data_type.to_ascii_lowercase().as_str() {
		"tinyint" | "smallint" | "int" | "bigint" => "int",
		"real" | "float" => "float",
		"decimal" | "numeric" | "money" | "smallmoney" => "decimal",
		"char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "sysname" => "text",
		"bit" => "bool",
		"binary" | "varbinary" | "image" => "bytes",
		"date" => "date",
		"time" => "time",
		"datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => "timestamp",
		"uniqueidentifier" => "uuid",
		_ => "unknown",
	}
}

impl SqlServerSchema {
	pub(crate) async fn load_tables(
		&self,
		model: &mut UnifiedModel,
		only: Option<&str>,
	) -> Result<()> {
		let filter = match only {
			Some(_) => "AND t.name = @p1",
			None => "",
		};
		let sql = format!(
			"SELECT s.name AS schema_name, t.name AS table_name, c.name AS column_name, \
			        ty.name AS data_type, c.is_nullable, c.max_length, c.precision, c.scale, \
			        c.is_identity, dc.definition AS default_definition \
			 FROM sys.tables t \
			 JOIN sys.schemas s ON s.schema_id = t.schema_id \
			 JOIN sys.columns c ON c.object_id = t.object_id \
			 JOIN sys.types ty ON ty.user_type_id = c.user_type_id \
			 LEFT JOIN sys.default_constraints dc ON dc.object_id = c.default_object_id \
			 WHERE t.is_ms_shipped = 0 {filter} \
			 ORDER BY s.name, t.name, c.column_id"
		);
		let args: Vec<Value> = only.map(|t| vec![Value::text(t)]).unwrap_or_default();
		for row in self.driver.query(&sql, &args).await? {
			let schema = text(&row, "schema_name");
			let name = text(&row, "table_name");
			let key = object_key(&schema, &name);
			let table = model.tables.entry(key).or_insert_with(|| {
				let mut t = Table::new(name.clone());
				if schema != "dbo" {
					t.schema = Some(schema.clone());
				}
				t
			});
			let data_type = text(&row, "data_type");
			let default = match text(&row, "default_definition") {
				d if d.is_empty() => None,
				d => Some(d),
			};
			table.columns.insert(
				text(&row, "column_name"),
				Column {
					unified_data_type: unified_type(&data_type).to_string(),
					data_type,
					nullable: int(&row, "is_nullable") == Some(1)
						|| matches!(row.get("is_nullable"), Some(Value::Bool(true))),
					default,
					is_primary_key: false,
					max_length: int(&row, "max_length").filter(|v| *v > 0),
					precision: int(&row, "precision").map(|v| v as i32),
					scale: int(&row, "scale").map(|v| v as i32),
					is_identity: int(&row, "is_identity") == Some(1)
						|| matches!(row.get("is_identity"), Some(Value::Bool(true))),
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
			Some(_) => "AND t.name = @p1",
			None => "",
		};
		let args: Vec<Value> = only.map(|t| vec![Value::text(t)]).unwrap_or_default();

		// Primary keys and unique constraints via key indexes.
		let sql = format!(
			"SELECT s.name AS schema_name, t.name AS table_name, kc.name AS constraint_name, \
			        kc.type AS kind, c.name AS column_name \
			 FROM sys.key_constraints kc \
			 JOIN sys.tables t ON t.object_id = kc.parent_object_id \
			 JOIN sys.schemas s ON s.schema_id = t.schema_id \
			 JOIN sys.index_columns ic \
			   ON ic.object_id = t.object_id AND ic.index_id = kc.unique_index_id \
			 JOIN sys.columns c ON c.object_id = t.object_id AND c.column_id = ic.column_id \
			 WHERE t.is_ms_shipped = 0 {filter} \
			 ORDER BY t.name, kc.name, ic.key_ordinal"
		);
		let mut grouped: BTreeMap<(String, String), Constraint> = BTreeMap::new();
		for row in self.driver.query(&sql, &args).await? {
			let kind = match text(&row, "kind").as_str() {
				"PK" => ConstraintKind::PrimaryKey,
				"UQ" => ConstraintKind::Unique,
				_ => continue,
			};
			let table_key = object_key(&text(&row, "schema_name"), &text(&row, "table_name"));
			let constraint_name = text(&row, "constraint_name");
			let entry = grouped
				.entry((table_key, constraint_name.clone()))
				.or_insert_with(|| Constraint {
					name: Some(constraint_name),
					kind,
					columns: Vec::new(),
					reference: None,
					expression: None,
				});
			entry.columns.push(text(&row, "column_name"));
		}

		// Foreign keys.
		let sql = format!(
			"SELECT s.name AS schema_name, t.name AS table_name, fk.name AS constraint_name, \
			        pc.name AS column_name, rt.name AS ref_table, rc.name AS ref_column \
			 FROM sys.foreign_keys fk \
			 JOIN sys.tables t ON t.object_id = fk.parent_object_id \
			 JOIN sys.schemas s ON s.schema_id = t.schema_id \
			 JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id \
			 JOIN sys.columns pc \
			   ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id \
			 JOIN sys.tables rt ON rt.object_id = fk.referenced_object_id \
			 JOIN sys.columns rc \
			   ON rc.object_id = fkc.referenced_object_id \
			  AND rc.column_id = fkc.referenced_column_id \
			 WHERE t.is_ms_shipped = 0 {filter} \
			 ORDER BY t.name, fk.name, fkc.constraint_column_id"
		);
		for row in self.driver.query(&sql, &args).await? {
			let table_key = object_key(&text(&row, "schema_name"), &text(&row, "table_name"));
			let constraint_name = text(&row, "constraint_name");
			let entry = grouped
				.entry((table_key, constraint_name.clone()))
				.or_insert_with(|| Constraint {
					name: Some(constraint_name),
					kind: ConstraintKind::ForeignKey,
					columns: Vec::new(),
					reference: None,
					expression: None,
				});
			let column = text(&row, "column_name");
			if !entry.columns.contains(&column) {
				entry.columns.push(column);
			}
			let reference = entry.reference.get_or_insert_with(ConstraintReference::default);
			reference.table = text(&row, "ref_table");
			let ref_column = text(&row, "ref_column");
			if !reference.columns.contains(&ref_column) {
				reference.columns.push(ref_column);
			}
		}

		// Check constraints.
		let sql = format!(
			"SELECT s.name AS schema_name, t.name AS table_name, cc.name AS constraint_name, \
			        cc.definition \
			 FROM sys.check_constraints cc \
			 JOIN sys.tables t ON t.object_id = cc.parent_object_id \
			 JOIN sys.schemas s ON s.schema_id = t.schema_id \
			 WHERE t.is_ms_shipped = 0 {filter}"
		);
		for row in self.driver.query(&sql, &args).await? {
			let table_key = object_key(&text(&row, "schema_name"), &text(&row, "table_name"));
			let constraint_name = text(&row, "constraint_name");
			grouped.insert(
				(table_key, constraint_name.clone()),
				Constraint {
					name: Some(constraint_name),
					kind: ConstraintKind::Check,
					columns: Vec::new(),
					reference: None,
					expression: Some(text(&row, "definition")),
				},
			);
		}

		for ((table_key, _), constraint) in grouped {
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
		Ok(())
	}
}

#[async_trait]
impl SchemaOperator for SqlServerSchema {
	#[instrument(name = "sqlserver::schema::discover", level = "debug", skip(self))]
	async fn discover_schema(&self) -> Result<UnifiedModel> {
		let mut model = UnifiedModel::default();

		let sql = "SELECT name FROM sys.schemas \
		           WHERE name NOT IN ('sys', 'guest', 'INFORMATION_SCHEMA') \
		             AND name NOT LIKE 'db[_]%'";
		for row in self.driver.query(sql, &[]).await? {
			let name = text(&row, "name");
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

		let sql = "SELECT s.name AS schema_name, i.name AS index_name, t.name AS table_name, \
		                  c.name AS column_name, i.is_unique \
		           FROM sys.indexes i \
		           JOIN sys.tables t ON t.object_id = i.object_id \
		           JOIN sys.schemas s ON s.schema_id = t.schema_id \
		           JOIN sys.index_columns ic \
		             ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
		           JOIN sys.columns c ON c.object_id = t.object_id AND c.column_id = ic.column_id \
		           WHERE i.is_primary_key = 0 AND i.is_unique_constraint = 0 \
		             AND i.type > 0 AND t.is_ms_shipped = 0 \
		           ORDER BY t.name, i.name, ic.key_ordinal";
		for row in self.driver.query(sql, &[]).await? {
			let key = object_key(&text(&row, "schema_name"), &text(&row, "table_name"));
			let Some(table) = model.tables.get_mut(&key) else {
				continue;
			};
			let index_name = text(&row, "index_name");
			let column = text(&row, "column_name");
			if let Some(index) = table.indexes.iter_mut().find(|i| i.name == index_name) {
				index.columns.push(column);
			} else {
				table.indexes.push(Index {
					name: index_name,
					columns: vec![column],
					unique: int(&row, "is_unique") == Some(1)
						|| matches!(row.get("is_unique"), Some(Value::Bool(true))),
				});
			}
		}

		let sql = "SELECT s.name AS schema_name, v.name AS view_name, m.definition \
		           FROM sys.views v \
		           JOIN sys.schemas s ON s.schema_id = v.schema_id \
		           JOIN sys.sql_modules m ON m.object_id = v.object_id \
		           WHERE v.is_ms_shipped = 0";
		for row in self.driver.query(sql, &[]).await? {
			let schema = text(&row, "schema_name");
			let name = text(&row, "view_name");
			model.views.insert(
				object_key(&schema, &name),
				View {
					name,
					schema: (schema != "dbo").then_some(schema),
					definition: text(&row, "definition"),
					materialized: false,
					comment: None,
				},
			);
		}

		let sql = "SELECT s.name AS schema_name, p.name AS proc_name, m.definition \
		           FROM sys.procedures p \
		           JOIN sys.schemas s ON s.schema_id = p.schema_id \
		           JOIN sys.sql_modules m ON m.object_id = p.object_id \
		           WHERE p.is_ms_shipped = 0";
		for row in self.driver.query(sql, &[]).await? {
			let schema = text(&row, "schema_name");
			let name = text(&row, "proc_name");
			model.procedures.insert(
				object_key(&schema, &name),
				Procedure {
					name,
					schema: (schema != "dbo").then_some(schema),
					definition: text(&row, "definition"),
				},
			);
		}

		let sql = "SELECT tr.name AS trigger_name, t.name AS table_name, m.definition, \
		                  te.type_desc AS event \
		           FROM sys.triggers tr \
		           JOIN sys.tables t ON t.object_id = tr.parent_id \
		           JOIN sys.sql_modules m ON m.object_id = tr.object_id \
		           JOIN sys.trigger_events te ON te.object_id = tr.object_id \
		           WHERE tr.is_ms_shipped = 0";
		for row in self.driver.query(sql, &[]).await? {
			let name = text(&row, "trigger_name");
			model.triggers.insert(
				format!("{}.{name}", text(&row, "table_name")),
				Trigger {
					name,
					table: text(&row, "table_name"),
					event: text(&row, "event"),
					timing: "AFTER".to_string(),
					definition: text(&row, "definition"),
				},
			);
		}

		debug!(tables = model.tables.len(), "schema discovered");
		Ok(model)
	}

	#[instrument(name = "sqlserver::schema::create", level = "debug", skip_all)]
	async fn create_structure(&self, model: &UnifiedModel) -> Result<()> {
		let caps = EngineKind::Sqlserver.capabilities();
		let mut statements = Vec::new();
		for schema in model.schemas.values() {
			if schema.name != "dbo" {
				statements.push(format!(
					"IF SCHEMA_ID(N'{}') IS NULL EXEC('CREATE SCHEMA {}')",
					schema.name.replace('\'', "''"),
					anchor_sql::quote_ident(caps.quoting, &schema.name)
				));
			}
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
		for view in model.views.values() {
			let body = view.definition.trim();
			if body.to_ascii_uppercase().starts_with("CREATE") {
				statements.push(body.trim_end_matches(';').to_string());
			}
		}

		if statements.is_empty() {
			return Ok(());
		}
		// DDL participates in transactions here.
		let script = format!(
			"BEGIN TRANSACTION;\n{};\nCOMMIT TRANSACTION;",
			statements.join(";\n")
		);
		self.driver.batch(&script).await
	}

	async fn list_tables(&self) -> Result<Vec<String>> {
		let sql = "SELECT s.name AS schema_name, t.name AS table_name \
		           FROM sys.tables t JOIN sys.schemas s ON s.schema_id = t.schema_id \
		           WHERE t.is_ms_shipped = 0 ORDER BY s.name, t.name";
		let rows = self.driver.query(sql, &[]).await?;
		Ok(rows
			.iter()
			.map(|row| object_key(&text(row, "schema_name"), &text(row, "table_name")))
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
			.ok_or_else(|| Error::table_not_found(name).with_engine("sqlserver"))
	}
}
