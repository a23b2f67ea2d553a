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
use anchor_type::{Error, Result, Value};
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::driver::Db2Driver;

pub struct Db2Schema {
	pub(crate) driver: Arc<Db2Driver>,
}

fn text(row: &anchor_type::Row, key: &str) -> String {
	match row.get(key) {
		Some(Value::Text(v)) => v.trim().to_string(),
		Some(other) if !other.is_undefined() => other.as_sql_text(),
		_ => String::new(),
	}
}

fn int(row: &anchor_type::Row, key: &str) -> Option<i64> {
	text(row, key).parse().ok()
}

fn escape(value: &str) -> String {
	value.replace('\'', "''")
}

pub fn unified_type(data_type: &str) -> &'static str {
	match data_type.to_ascii_uppercase().as_str() {
		"SMALLINT" | "INTEGER" | "BIGINT" => "int",
		"REAL" | "DOUBLE" | "DECFLOAT" => "float",
		"DECIMAL" | "NUMERIC" => "decimal",
		"CHARACTER" | "CHAR" | "VARCHAR" | "CLOB" | "GRAPHIC" | "VARGRAPHIC" | "DBCLOB" => {
			"text"
		}
		"BOOLEAN" => "bool",
		"BLOB" | "BINARY" | "VARBINARY" => "bytes",
		"DATE" => "date",
		"TIME" => "time",
		"TIMESTAMP" => "timestamp",
		"XML" => "text",
		_ => "unknown",
	}
}

impl Db2Schema {
	async fn current_schema(&self) -> Result<String> {
		let rows = self.driver.query("VALUES CURRENT SCHEMA").await?;
		Ok(rows
			.first()
			.and_then(|row| row.values().next())
			.map(|v| v.as_sql_text().trim().to_string())
			.unwrap_or_default())
	}

	fn object_key(current: &str, schema: &str, name: &str) -> String {
		if schema.is_empty() || schema == current {
			name.to_string()
		} else {
			format!("{schema}.{name}")
		}
	}

	pub(crate) async fn load_tables(
		&self,
		model: &mut UnifiedModel,
		current: &str,
		only: Option<&str>,
	) -> Result<()> {
		let filter = match only {
			Some(table) => format!("AND C.TABNAME = '{}'", escape(table)),
			None => String::new(),
		};
		let sql = format!(
			"SELECT C.TABSCHEMA, C.TABNAME, C.COLNAME, C.TYPENAME, C.NULLS, C.DEFAULT, \
			        C.LENGTH, C.SCALE, C.IDENTITY \
			 FROM SYSCAT.COLUMNS C \
			 JOIN SYSCAT.TABLES T \
			   ON T.TABSCHEMA = C.TABSCHEMA AND T.TABNAME = C.TABNAME AND T.TYPE = 'T' \
			 WHERE C.TABSCHEMA NOT LIKE 'SYS%' {filter} \
			 ORDER BY C.TABSCHEMA, C.TABNAME, C.COLNO"
		);
		for row in self.driver.query(&sql).await? {
			let schema = text(&row, "TABSCHEMA");
			let name = text(&row, "TABNAME");
			let key = Self::object_key(current, &schema, &name);
			let table = model.tables.entry(key).or_insert_with(|| {
				let mut t = Table::new(name.clone());
				if schema != current {
					t.schema = Some(schema.clone());
				}
				t
			});
			let data_type = text(&row, "TYPENAME");
			let default = match text(&row, "DEFAULT") {
				d if d.is_empty() => None,
				d => Some(d),
			};
			table.columns.insert(
				text(&row, "COLNAME"),
				Column {
					unified_data_type: unified_type(&data_type).to_string(),
					data_type,
					nullable: text(&row, "NULLS") == "Y",
					default,
					is_primary_key: false,
					max_length: int(&row, "LENGTH"),
					precision: int(&row, "LENGTH").map(|v| v as i32),
					scale: int(&row, "SCALE").map(|v| v as i32),
					is_identity: text(&row, "IDENTITY") == "Y",
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
		current: &str,
		only: Option<&str>,
	) -> Result<()> {
		let filter = match only {
			Some(table) => format!("AND TC.TABNAME = '{}'", escape(table)),
			None => String::new(),
		};
		let sql = format!(
			"SELECT TC.TABSCHEMA, TC.TABNAME, TC.CONSTNAME, TC.TYPE, KC.COLNAME \
			 FROM SYSCAT.TABCONST TC \
			 LEFT JOIN SYSCAT.KEYCOLUSE KC \
			   ON KC.CONSTNAME = TC.CONSTNAME AND KC.TABSCHEMA = TC.TABSCHEMA \
			  AND KC.TABNAME = TC.TABNAME \
			 WHERE TC.TABSCHEMA NOT LIKE 'SYS%' {filter} \
			 ORDER BY TC.TABNAME, TC.CONSTNAME, KC.COLSEQ"
		);

		let mut grouped: BTreeMap<(String, String), Constraint> = BTreeMap::new();
		for row in self.driver.query(&sql).await? {
			let kind = match text(&row, "TYPE").as_str() {
				"P" => ConstraintKind::PrimaryKey,
				"F" => ConstraintKind::ForeignKey,
				"U" => ConstraintKind::Unique,
				"K" => ConstraintKind::Check,
				_ => continue,
			};
			let key = Self::object_key(current, &text(&row, "TABSCHEMA"), &text(&row, "TABNAME"));
			let constraint_name = text(&row, "CONSTNAME");
			let entry = grouped
				.entry((key, constraint_name.clone()))
				.or_insert_with(|| Constraint {
					name: Some(constraint_name),
					kind,
					columns: Vec::new(),
					reference: None,
					expression: None,
				});
			let column = text(&row, "COLNAME");
			if !column.is_empty() && !entry.columns.contains(&column) {
				entry.columns.push(column);
			}
		}

		// Foreign-key targets from SYSCAT.REFERENCES.
		let sql = "SELECT CONSTNAME, TABSCHEMA, TABNAME, REFTABSCHEMA, REFTABNAME \
		           FROM SYSCAT.REFERENCES WHERE TABSCHEMA NOT LIKE 'SYS%'";
		for row in self.driver.query(sql).await? {
			let key = Self::object_key(current, &text(&row, "TABSCHEMA"), &text(&row, "TABNAME"));
			let constraint_name = text(&row, "CONSTNAME");
			if let Some(constraint) = grouped.get_mut(&(key, constraint_name)) {
				let ref_schema = text(&row, "REFTABSCHEMA");
				constraint.reference = Some(ConstraintReference {
					table: Self::object_key(current, &ref_schema, &text(&row, "REFTABNAME")),
					columns: Vec::new(),
					cross_schema: ref_schema != current,
				});
			}
		}

		for ((key, _), constraint) in grouped {
			let Some(table) = model.tables.get_mut(&key) else {
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
impl SchemaOperator for Db2Schema {
	#[instrument(name = "db2::schema::discover", level = "debug", skip(self))]
	async fn discover_schema(&self) -> Result<UnifiedModel> {
		let current = self.current_schema().await?;
		let mut model = UnifiedModel::default();

		let sql = "SELECT SCHEMANAME FROM SYSCAT.SCHEMATA \
		           WHERE SCHEMANAME NOT LIKE 'SYS%' AND SCHEMANAME NOT LIKE 'NULLID%'";
		for row in self.driver.query(sql).await? {
			let name = text(&row, "SCHEMANAME");
			model.schemas.insert(
				name.clone(),
				Schema {
					name,
					owner: None,
					comment: None,
				},
			);
		}

		self.load_tables(&mut model, &current, None).await?;
		self.load_constraints(&mut model, &current, None).await?;

		let sql = "SELECT TABSCHEMA, TABNAME, INDNAME, UNIQUERULE, COLNAMES \
		           FROM SYSCAT.INDEXES WHERE TABSCHEMA NOT LIKE 'SYS%'";
		for row in self.driver.query(sql).await? {
			let key =
				Self::object_key(&current, &text(&row, "TABSCHEMA"), &text(&row, "TABNAME"));
			let Some(table) = model.tables.get_mut(&key) else {
				continue;
			};
			// COLNAMES is `+COL1+COL2` with sort prefixes.
			let columns: Vec<String> = text(&row, "COLNAMES")
				.split(['+', '-'])
				.filter(|c| !c.is_empty())
				.map(str::to_string)
				.collect();
			if columns.is_empty() {
				continue;
			}
			table.indexes.push(Index {
				name: text(&row, "INDNAME"),
				columns,
				unique: matches!(text(&row, "UNIQUERULE").as_str(), "U" | "P"),
			});
		}

		let sql = "SELECT VIEWSCHEMA, VIEWNAME, TEXT FROM SYSCAT.VIEWS \
		           WHERE VIEWSCHEMA NOT LIKE 'SYS%'";
		for row in self.driver.query(sql).await? {
			let schema = text(&row, "VIEWSCHEMA");
			let name = text(&row, "VIEWNAME");
			model.views.insert(
				Self::object_key(&current, &schema, &name),
				View {
					name,
					schema: (schema != current).then_some(schema),
					definition: text(&row, "TEXT"),
					materialized: false,
					comment: None,
				},
			);
		}

		let sql = "SELECT ROUTINESCHEMA, ROUTINENAME, ROUTINETYPE, TEXT \
		           FROM SYSCAT.ROUTINES WHERE ROUTINESCHEMA NOT LIKE 'SYS%'";
		for row in self.driver.query(sql).await? {
			let schema = text(&row, "ROUTINESCHEMA");
			let name = text(&row, "ROUTINENAME");
			let key = Self::object_key(&current, &schema, &name);
			let schema_opt = (schema != current).then_some(schema);
			if text(&row, "ROUTINETYPE") == "P" {
				model.procedures.insert(
					key,
					Procedure {
						name,
						schema: schema_opt,
						definition: text(&row, "TEXT"),
					},
				);
			} else {
				model.functions.insert(
					key,
					Function {
						name,
						schema: schema_opt,
						definition: text(&row, "TEXT"),
						returns: None,
					},
				);
			}
		}

		let sql = "SELECT TRIGNAME, TABNAME, TRIGEVENT, TRIGTIME, TEXT \
		           FROM SYSCAT.TRIGGERS WHERE TRIGSCHEMA NOT LIKE 'SYS%'";
		for row in self.driver.query(sql).await? {
			let name = text(&row, "TRIGNAME");
			let event = match text(&row, "TRIGEVENT").as_str() {
				"I" => "INSERT",
				"U" => "UPDATE",
				"D" => "DELETE",
				other => {
					debug!(trigger = name, event = other, "skipping trigger event");
					continue;
				}
			};
			model.triggers.insert(
				format!("{}.{name}", text(&row, "TABNAME")),
				Trigger {
					name,
					table: text(&row, "TABNAME"),
					event: event.to_string(),
					timing: if text(&row, "TRIGTIME") == "B" { "BEFORE" } else { "AFTER" }
						.to_string(),
					definition: text(&row, "TEXT"),
				},
			);
		}

		let sql = "SELECT SEQSCHEMA, SEQNAME, START, INCREMENT FROM SYSCAT.SEQUENCES \
		           WHERE SEQSCHEMA NOT LIKE 'SYS%'";
		for row in self.driver.query(sql).await? {
			let schema = text(&row, "SEQSCHEMA");
			let name = text(&row, "SEQNAME");
			model.sequences.insert(
				Self::object_key(&current, &schema, &name),
				Sequence {
					name,
					schema: (schema != current).then_some(schema),
					start: int(&row, "START").unwrap_or(1),
					increment: int(&row, "INCREMENT").unwrap_or(1),
				},
			);
		}

		debug!(tables = model.tables.len(), "schema discovered");
		Ok(model)
	}

	#[instrument(name = "db2::schema::create", level = "debug", skip_all)]
	async fn create_structure(&self, model: &UnifiedModel) -> Result<()> {
		let caps = EngineKind::Db2.capabilities();
		let mut statements = Vec::new();
		for sequence in model.sequences.values() {
			statements.push(format!(
				"CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
				anchor_sql::quote_ident(caps.quoting, &sequence.name),
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
			let body = view.definition.trim();
			if !body.is_empty() {
				if body.to_ascii_uppercase().starts_with("CREATE") {
					statements.push(body.trim_end_matches(';').to_string());
				} else {
					statements.push(format!(
						"CREATE VIEW {} AS {}",
						anchor_sql::quote_qualified(caps.quoting, key),
						body.trim_end_matches(';')
					));
				}
			}
		}
		if statements.is_empty() {
			return Ok(());
		}
		// DDL participates in the unit of work.
		self.driver.transactional(statements).await
	}

	async fn list_tables(&self) -> Result<Vec<String>> {
		let current = self.current_schema().await?;
		let sql = "SELECT TABSCHEMA, TABNAME FROM SYSCAT.TABLES \
		           WHERE TYPE = 'T' AND TABSCHEMA NOT LIKE 'SYS%' \
		           ORDER BY TABSCHEMA, TABNAME";
		let rows = self.driver.query(sql).await?;
		Ok(rows
			.iter()
			.map(|row| {
				Self::object_key(&current, &text(row, "TABSCHEMA"), &text(row, "TABNAME"))
			})
			.collect())
	}

	async fn get_table_schema(&self, name: &str) -> Result<Table> {
		let current = self.current_schema().await?;
		let bare = name.rsplit('.').next().unwrap_or(name);
		let mut model = UnifiedModel::default();
		self.load_tables(&mut model, &current, Some(bare)).await?;
		self.load_constraints(&mut model, &current, Some(bare)).await?;
		model
			.tables
			.remove(name)
			.or_else(|| {
				let key = model.tables.keys().find(|k| k.as_str() == bare)?.clone();
				model.tables.remove(&key)
			})
			.ok_or_else(|| Error::table_not_found(name).with_engine("db2"))
	}
}
