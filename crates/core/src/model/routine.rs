// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schema: Option<String>,
	pub definition: String,
	#[serde(default)]
	pub materialized: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub comment: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Function {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schema: Option<String>,
	pub definition: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub returns: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Procedure {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schema: Option<String>,
	pub definition: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
	pub name: String,
	pub table: String,
	/// INSERT, UPDATE or DELETE.
	pub event: String,
	/// BEFORE or AFTER.
	pub timing: String,
	pub definition: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schema: Option<String>,
	#[serde(default)]
	pub start: i64,
	#[serde(default)]
	pub increment: i64,
}
