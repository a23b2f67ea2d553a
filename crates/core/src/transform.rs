// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Per-column transformation rules applied to CDC payloads.
//!
//! Built-ins run in process; unknown transformation names are
//! delegated to the external transformation service. A missing
//! endpoint or a failed call degrades the rule to pass-through; a
//! transformation never fails the event.

use anchor_type::{Row, Value};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::interface::services::TransformService;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformationRule {
	pub source_column: String,
	pub target_column: String,
	pub transformation_name: String,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub parameters: Row,
}

/// Apply rules to one data image. Columns without a rule pass through
/// unchanged; a rule renames its column when target differs from
/// source.
pub async fn apply_rules(
	data: &Row,
	rules: &[TransformationRule],
	endpoint: Option<&dyn TransformService>,
) -> Row {
	if rules.is_empty() {
		return data.clone();
	}

	let mut out = data.clone();
	for rule in rules {
		let Some(value) = data.get(&rule.source_column) else {
			continue;
		};
		let transformed = apply_one(rule, value, endpoint).await;
		if rule.target_column != rule.source_column {
			out.remove(&rule.source_column);
		}
		out.insert(rule.target_column.clone(), transformed);
	}
	out
}

async fn apply_one(
	rule: &TransformationRule,
	value: &Value,
	endpoint: Option<&dyn TransformService>,
) -> Value {
	match rule.transformation_name.as_str() {
		"direct" => value.clone(),
		"uppercase" => match value {
			Value::Text(s) => Value::Text(s.to_uppercase()),
			other => other.clone(),
		},
		"lowercase" => match value {
			Value::Text(s) => Value::Text(s.to_lowercase()),
			other => other.clone(),
		},
		"cast" => {
			let target = rule
				.parameters
				.get("target_type")
				.map(|v| v.as_sql_text())
				.unwrap_or_default();
			cast(value, &target)
		}
		"default" => {
			if value.is_undefined() {
				rule.parameters.get("default_value").cloned().unwrap_or(Value::Undefined)
			} else {
				value.clone()
			}
		}
		name => match endpoint {
			Some(service) => {
				match service.transform(name, value, &rule.parameters).await {
					Ok(result) => result,
					Err(err) => {
						debug!(transformation = name, %err, "transformation service failed, passing value through");
						value.clone()
					}
				}
			}
			None => value.clone(),
		},
	}
}

/// Best-effort coercion. An impossible cast keeps the original value.
fn cast(value: &Value, target: &str) -> Value {
	match target {
		"int" => match value {
			Value::Int(_) => value.clone(),
			Value::Float(f) => Value::Int(*f as i64),
			Value::Bool(b) => Value::Int(i64::from(*b)),
			Value::Text(s) => s.trim().parse::<i64>().map(Value::Int).unwrap_or_else(|_| value.clone()),
			_ => value.clone(),
		},
		"float" => match value {
			Value::Float(_) => value.clone(),
			Value::Int(i) => Value::Float(*i as f64),
			Value::Text(s) => {
				s.trim().parse::<f64>().map(Value::Float).unwrap_or_else(|_| value.clone())
			}
			_ => value.clone(),
		},
		"text" => match value {
			Value::Text(_) => value.clone(),
			Value::Undefined => Value::Undefined,
			other => Value::Text(other.as_sql_text()),
		},
		"bool" => match value {
			Value::Bool(_) => value.clone(),
			Value::Int(i) => Value::Bool(*i != 0),
			Value::Text(s) => match s.to_ascii_lowercase().as_str() {
				"true" | "t" | "1" | "yes" => Value::Bool(true),
				"false" | "f" | "0" | "no" => Value::Bool(false),
				_ => value.clone(),
			},
			_ => value.clone(),
		},
		"timestamp" => match value {
			Value::Timestamp(_) => value.clone(),
			Value::Text(s) => DateTime::parse_from_rfc3339(s)
				.map(|dt| Value::Timestamp(dt.to_utc()))
				.unwrap_or_else(|_| value.clone()),
			_ => value.clone(),
		},
		_ => value.clone(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rule(name: &str, source: &str, target: &str) -> TransformationRule {
		TransformationRule {
			source_column: source.to_string(),
			target_column: target.to_string(),
			transformation_name: name.to_string(),
			parameters: Row::new(),
		}
	}

	fn data() -> Row {
		[
			("NAME".to_string(), Value::Text("Ada".to_string())),
			("CITY".to_string(), Value::Undefined),
		]
		.into_iter()
		.collect()
	}

	#[tokio::test]
	async fn test_uppercase_and_rename() {
		let out = apply_rules(&data(), &[rule("uppercase", "NAME", "NAME_UPPER")], None).await;
		assert_eq!(out.get("NAME_UPPER"), Some(&Value::Text("ADA".to_string())));
		assert!(!out.contains_key("NAME"));
	}

	#[tokio::test]
	async fn test_default_fills_null_only() {
		let mut r = rule("default", "CITY", "CITY");
		r.parameters.insert("default_value".into(), Value::Text("London".into()));
		let out = apply_rules(&data(), &[r.clone()], None).await;
		assert_eq!(out.get("CITY"), Some(&Value::Text("London".to_string())));

		r.source_column = "NAME".into();
		r.target_column = "NAME".into();
		let out = apply_rules(&data(), &[r], None).await;
		assert_eq!(out.get("NAME"), Some(&Value::Text("Ada".to_string())));
	}

	#[tokio::test]
	async fn test_unknown_without_endpoint_passes_through() {
		let out = apply_rules(&data(), &[rule("tokenize", "NAME", "NAME")], None).await;
		assert_eq!(out.get("NAME"), Some(&Value::Text("Ada".to_string())));
	}

	#[test]
	fn test_cast_table() {
		assert_eq!(cast(&Value::Text("42".into()), "int"), Value::Int(42));
		assert_eq!(cast(&Value::Int(1), "bool"), Value::Bool(true));
		assert_eq!(cast(&Value::Int(3), "float"), Value::Float(3.0));
		assert_eq!(cast(&Value::Text("nope".into()), "int"), Value::Text("nope".into()));
	}
}
