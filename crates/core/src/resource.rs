// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Canonical resource URIs and the registry rows derived from a
//! unified model.
//!
//! Database objects: `redb://data/database/<db>/<kind>/<name>` and
//! `…/<kind>/<name>/<item_kind>/<item_name>`. Integration objects use
//! `webhook://`, `mcp://` and `stream://` schemes with `#`-fragment
//! item paths.

use std::fmt::{Display, Formatter};

use anchor_type::{Error, Result, Row};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DATA_SCHEME: &str = "redb";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
	Table,
	View,
	MaterializedView,
	Collection,
	GraphNode,
	GraphEdge,
	Topic,
	Stream,
}

impl ObjectKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ObjectKind::Table => "table",
			ObjectKind::View => "view",
			ObjectKind::MaterializedView => "materialized_view",
			ObjectKind::Collection => "collection",
			ObjectKind::GraphNode => "graph_node",
			ObjectKind::GraphEdge => "graph_edge",
			ObjectKind::Topic => "topic",
			ObjectKind::Stream => "stream",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"table" => Some(ObjectKind::Table),
			"view" => Some(ObjectKind::View),
			"materialized_view" => Some(ObjectKind::MaterializedView),
			"collection" => Some(ObjectKind::Collection),
			"graph_node" => Some(ObjectKind::GraphNode),
			"graph_edge" => Some(ObjectKind::GraphEdge),
			"topic" => Some(ObjectKind::Topic),
			"stream" => Some(ObjectKind::Stream),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
	Column,
	Field,
}

impl ItemKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ItemKind::Column => "column",
			ItemKind::Field => "field",
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"column" => Some(ItemKind::Column),
			"field" => Some(ItemKind::Field),
			_ => None,
		}
	}
}

/// Build the canonical container URI for a database object.
pub fn container_uri(database_id: &str, kind: ObjectKind, name: &str) -> String {
	format!("{DATA_SCHEME}://data/database/{database_id}/{}/{name}", kind.as_str())
}

/// Build the canonical item URI for a field within a container.
pub fn item_uri(
	database_id: &str,
	kind: ObjectKind,
	name: &str,
	item_kind: ItemKind,
	item_name: &str,
) -> String {
	format!(
		"{DATA_SCHEME}://data/database/{database_id}/{}/{name}/{}/{item_name}",
		kind.as_str(),
		item_kind.as_str()
	)
}

/// Prefix every URI under one database starts with; mapping
/// invalidation and the status monitor match on it.
pub fn database_uri_prefix(database_id: &str) -> String {
	format!("{DATA_SCHEME}://data/database/{database_id}/")
}

/// A parsed `redb://data/database/…` URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceUri {
	pub database_id: String,
	pub object_kind: ObjectKind,
	pub object_name: String,
	pub item: Option<(ItemKind, String)>,
}

impl ResourceUri {
	pub fn parse(uri: &str) -> Result<Self> {
		let rest = uri
			.strip_prefix(&format!("{DATA_SCHEME}://data/database/"))
			.ok_or_else(|| Error::invalid_data(format!("not a data resource uri: '{uri}'")))?;
		let parts: Vec<&str> = rest.split('/').collect();
		let malformed = || Error::invalid_data(format!("malformed resource uri: '{uri}'"));
		match parts.as_slice() {
			[database_id, kind, name] => Ok(Self {
				database_id: (*database_id).to_string(),
				object_kind: ObjectKind::parse(kind).ok_or_else(malformed)?,
				object_name: (*name).to_string(),
				item: None,
			}),
			[database_id, kind, name, item_kind, item_name] => Ok(Self {
				database_id: (*database_id).to_string(),
				object_kind: ObjectKind::parse(kind).ok_or_else(malformed)?,
				object_name: (*name).to_string(),
				item: Some((
					ItemKind::parse(item_kind).ok_or_else(malformed)?,
					(*item_name).to_string(),
				)),
			}),
			_ => Err(malformed()),
		}
	}

	/// The container prefix of an item URI (the URI itself for a
	/// container).
	pub fn container(&self) -> String {
		container_uri(&self.database_id, self.object_kind, &self.object_name)
	}
}

impl Display for ResourceUri {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match &self.item {
			None => f.write_str(&self.container()),
			Some((kind, name)) => f.write_str(&item_uri(
				&self.database_id,
				self.object_kind,
				&self.object_name,
				*kind,
				name,
			)),
		}
	}
}

/// Registry row for a top-level object (table, view, topic, webhook…).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceContainer {
	pub container_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub database_id: Option<String>,
	pub uri: String,
	pub kind: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub online: bool,
	pub last_seen: DateTime<Utc>,
	pub updated: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub metadata: Row,
}

/// Registry row for a field within a container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
	pub item_id: String,
	pub container_id: String,
	pub uri: String,
	pub kind: String,
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub online: bool,
	pub last_seen: DateTime<Utc>,
	pub updated: DateTime<Utc>,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub metadata: Row,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_container_uri_shape() {
		assert_eq!(
			container_uri("db-1", ObjectKind::Table, "users"),
			"redb://data/database/db-1/table/users"
		);
	}

	#[test]
	fn test_item_uri_round_trip() {
		let uri = item_uri("db-1", ObjectKind::View, "orders_v", ItemKind::Column, "total");
		let parsed = ResourceUri::parse(&uri).unwrap();
		assert_eq!(parsed.database_id, "db-1");
		assert_eq!(parsed.object_kind, ObjectKind::View);
		assert_eq!(parsed.item, Some((ItemKind::Column, "total".to_string())));
		assert_eq!(parsed.to_string(), uri);
		assert_eq!(parsed.container(), "redb://data/database/db-1/view/orders_v");
	}

	#[test]
	fn test_parse_rejects_foreign_schemes() {
		assert!(ResourceUri::parse("webhook://integrations/wh-1").is_err());
		assert!(ResourceUri::parse("redb://data/database/db-1/widget/x").is_err());
	}

	#[test]
	fn test_database_prefix_matches_children() {
		let prefix = database_uri_prefix("db-1");
		assert!(container_uri("db-1", ObjectKind::Table, "users").starts_with(&prefix));
		assert!(!container_uri("db-10", ObjectKind::Table, "users").starts_with(&prefix));
	}
}
