// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::{
	interface::services::SchemaEnrichment,
	model::UnifiedModel,
	resource::{ItemKind, ObjectKind, container_uri, item_uri},
};
use anchor_type::{Row, Value};

/// A container row as the model wants it, before ids and timestamps
/// are assigned.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredContainer {
	pub uri: String,
	pub kind: ObjectKind,
	pub name: String,
	pub description: Option<String>,
	pub metadata: Row,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DesiredItem {
	pub uri: String,
	pub container_uri: String,
	pub kind: ItemKind,
	pub name: String,
	pub data_type: Option<String>,
	pub description: Option<String>,
	pub metadata: Row,
}

/// Walk the model into desired registry rows: one container per
/// table, view and namespace, one item per table column. Enrichment
/// descriptions attach where present.
pub fn derive_rows(
	database_id: &str,
	model: &UnifiedModel,
	enrichment: &SchemaEnrichment,
) -> (Vec<DesiredContainer>, Vec<DesiredItem>) {
	let mut containers = Vec::new();
	let mut items = Vec::new();

	for (key, table) in &model.tables {
		let table_enrichment = enrichment.tables.get(key);
		let uri = container_uri(database_id, ObjectKind::Table, key);
		let mut metadata = Row::new();
		if let Some(schema) = &table.schema {
			metadata.insert("schema".to_string(), Value::text(schema.clone()));
		}
		if let Some(comment) = &table.comment {
			metadata.insert("comment".to_string(), Value::text(comment.clone()));
		}
		containers.push(DesiredContainer {
			uri: uri.clone(),
			kind: ObjectKind::Table,
			name: key.clone(),
			description: table_enrichment.and_then(|e| e.description.clone()),
			metadata,
		});

		for (column_name, column) in &table.columns {
			let mut metadata = Row::new();
			metadata.insert("nullable".to_string(), Value::Bool(column.nullable));
			if column.is_primary_key {
				metadata.insert("primary_key".to_string(), Value::Bool(true));
			}
			items.push(DesiredItem {
				uri: item_uri(
					database_id,
					ObjectKind::Table,
					key,
					ItemKind::Column,
					column_name,
				),
				container_uri: uri.clone(),
				kind: ItemKind::Column,
				name: column_name.clone(),
				data_type: Some(column.unified_data_type.clone()),
				description: table_enrichment
					.and_then(|e| e.columns.get(column_name))
					.and_then(|c| c.description.clone()),
				metadata,
			});
		}
	}

	for (key, view) in &model.views {
		let kind = if view.materialized {
			ObjectKind::MaterializedView
		} else {
			ObjectKind::View
		};
		containers.push(DesiredContainer {
			uri: container_uri(database_id, kind, key),
			kind,
			name: key.clone(),
			description: None,
			metadata: Row::new(),
		});
	}

	for key in model.namespaces.keys() {
		containers.push(DesiredContainer {
			uri: container_uri(database_id, ObjectKind::Collection, key),
			kind: ObjectKind::Collection,
			name: key.clone(),
			description: None,
			metadata: Row::new(),
		});
	}

	(containers, items)
}

#[cfg(test)]
mod tests {
	use anchor_core::model::{Column, Table};

	use super::*;

	fn model() -> UnifiedModel {
		let mut model = UnifiedModel::default();
		let table = Table::new("users").with_column(
			"id",
			Column {
				data_type: "integer".into(),
				unified_data_type: "int".into(),
				nullable: false,
				is_primary_key: true,
				..Default::default()
			},
		);
		model.insert_table(table);
		model
	}

	#[test]
	fn test_derive_table_and_column() {
		let (containers, items) = derive_rows("db-1", &model(), &SchemaEnrichment::default());
		assert_eq!(containers.len(), 1);
		assert_eq!(containers[0].uri, "redb://data/database/db-1/table/users");
		assert_eq!(items.len(), 1);
		assert_eq!(items[0].uri, "redb://data/database/db-1/table/users/column/id");
		assert_eq!(items[0].container_uri, containers[0].uri);
		assert_eq!(items[0].data_type.as_deref(), Some("int"));
	}

	#[test]
	fn test_enrichment_descriptions_attach() {
		let mut enrichment = SchemaEnrichment::default();
		let mut table = anchor_core::interface::services::TableEnrichment {
			description: Some("user accounts".to_string()),
			..Default::default()
		};
		table.columns.insert(
			"id".to_string(),
			anchor_core::interface::services::ColumnEnrichment {
				description: Some("surrogate key".to_string()),
				classification: None,
			},
		);
		enrichment.tables.insert("users".to_string(), table);

		let (containers, items) = derive_rows("db-1", &model(), &enrichment);
		assert_eq!(containers[0].description.as_deref(), Some("user accounts"));
		assert_eq!(items[0].description.as_deref(), Some("surrogate key"));
	}

	#[test]
	fn test_derive_is_deterministic() {
		let model = model();
		let a = derive_rows("db-1", &model, &SchemaEnrichment::default());
		let b = derive_rows("db-1", &model, &SchemaEnrichment::default());
		assert_eq!(a, b);
	}
}
