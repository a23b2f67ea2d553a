// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Dialect-agnostic schema snapshot.
//!
//! Every adapter discovers into this model and applies from it. Keys
//! are object names; column maps preserve declared ordinal order.

pub use constraint::{Constraint, ConstraintKind, ConstraintReference, Index};
pub use routine::{Function, Procedure, Sequence, Trigger, View};
pub use table::{Column, Table};
pub use validate::validate_model;

mod constraint;
mod routine;
mod table;
mod validate;

use std::collections::BTreeMap;

use anchor_type::Row;
use serde::{Deserialize, Serialize};

/// A named schema (PostgreSQL schema, DB2 schema, SQL Server schema).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub owner: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub comment: Option<String>,
}

/// A lake namespace (Iceberg); path components joined with `.`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
	pub name: String,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub properties: Row,
}

/// A table whose data lives outside the engine (external/foreign).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalTable {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub format: Option<String>,
}

/// A point-in-time snapshot advertised by lake table formats.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub table: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp_ms: Option<i64>,
}

/// Canonical schema snapshot of one database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedModel {
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub schemas: BTreeMap<String, Schema>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub tables: BTreeMap<String, Table>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub views: BTreeMap<String, View>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub functions: BTreeMap<String, Function>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub procedures: BTreeMap<String, Procedure>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub triggers: BTreeMap<String, Trigger>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub sequences: BTreeMap<String, Sequence>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub namespaces: BTreeMap<String, Namespace>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub external_tables: BTreeMap<String, ExternalTable>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub snapshots: BTreeMap<String, Snapshot>,
}

impl UnifiedModel {
	pub fn is_empty(&self) -> bool {
		self.schemas.is_empty()
			&& self.tables.is_empty()
			&& self.views.is_empty()
			&& self.functions.is_empty()
			&& self.procedures.is_empty()
			&& self.triggers.is_empty()
			&& self.sequences.is_empty()
			&& self.namespaces.is_empty()
			&& self.external_tables.is_empty()
			&& self.snapshots.is_empty()
	}

	pub fn insert_table(&mut self, table: Table) {
		self.tables.insert(table.name.clone(), table);
	}

	/// Serialize into the commit payload wire form.
	pub fn to_payload(&self) -> anchor_type::Result<String> {
		serde_json::to_string(self)
			.map_err(|e| anchor_type::Error::internal(format!("serialize model: {e}")))
	}

	pub fn from_payload(payload: &str) -> anchor_type::Result<Self> {
		serde_json::from_str(payload).map_err(|e| {
			anchor_type::Error::invalid_data(format!("malformed model payload: {e}"))
		})
	}
}
