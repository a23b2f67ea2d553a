// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
	PrimaryKey,
	ForeignKey,
	Unique,
	Check,
}

/// Target of a foreign-key constraint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintReference {
	pub table: String,
	pub columns: Vec<String>,
	/// The referenced table lives outside this model's schema scope.
	#[serde(default)]
	pub cross_schema: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(rename = "type")]
	pub kind: ConstraintKind,
	pub columns: Vec<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reference: Option<ConstraintReference>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expression: Option<String>,
}

impl Constraint {
	pub fn primary_key(columns: Vec<String>) -> Self {
		Self {
			name: None,
			kind: ConstraintKind::PrimaryKey,
			columns,
			reference: None,
			expression: None,
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Index {
	pub name: String,
	pub columns: Vec<String>,
	#[serde(default)]
	pub unique: bool,
}
