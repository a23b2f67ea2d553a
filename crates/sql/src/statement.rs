// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::Capabilities;
use anchor_type::{Row, Value};

use crate::ident::{placeholder, quote_ident};

/// A rendered statement with its positional parameters. `Undefined`
/// values never appear in `params`; they render as `IS NULL` or a SQL
/// `NULL` literal at build time.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
	pub sql: String,
	pub params: Vec<Value>,
}

impl Statement {
	pub fn new(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			params: Vec::new(),
		}
	}
}

/// Append `AND`-joined equality conditions, rendering `Undefined` as
/// `IS NULL`. Returns the next placeholder index.
pub fn push_conditions(
	sql: &mut String,
	params: &mut Vec<Value>,
	caps: &Capabilities,
	mut index: usize,
	conditions: &Row,
) -> usize {
	let mut first = true;
	for (column, value) in conditions {
		if !first {
			sql.push_str(" AND ");
		}
		first = false;
		sql.push_str(&quote_ident(caps.quoting, column));
		if value.is_undefined() {
			sql.push_str(" IS NULL");
		} else {
			sql.push_str(" = ");
			sql.push_str(&placeholder(caps.placeholders, index));
			params.push(value.clone());
			index += 1;
		}
	}
	index
}
