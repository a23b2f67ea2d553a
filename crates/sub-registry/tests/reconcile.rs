// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::{
	interface::services::SchemaEnrichment,
	model::{Column, Table, UnifiedModel},
};
use anchor_sub_registry::{Reconciler, derive_rows};
use anchor_testing::MockRegistryStore;

fn column(unified: &str, pk: bool) -> Column {
	Column {
		data_type: String::new(),
		unified_data_type: unified.to_string(),
		nullable: !pk,
		is_primary_key: pk,
		..Default::default()
	}
}

fn model(tables: &[(&str, &[&str])]) -> UnifiedModel {
	let mut model = UnifiedModel::default();
	for (name, columns) in tables {
		let mut table = Table::new(*name);
		for (i, column_name) in columns.iter().enumerate() {
			table.columns.insert((*column_name).to_string(), column("int", i == 0));
		}
		model.insert_table(table);
	}
	model
}

#[tokio::test]
async fn test_reconciler_is_stable_on_unchanged_model() {
	let store = MockRegistryStore::default();
	let reconciler = Reconciler::new(Arc::new(store.clone()));
	let model = model(&[("users", &["id", "name"]), ("orders", &["id", "total"])]);

	let first = reconciler
		.reconcile("db-1", &model, None)
		.await
		.expect("first run failed");
	assert_eq!(first.containers_inserted, 2);
	assert_eq!(first.items_inserted, 4);
	assert_eq!(first.containers_deleted, 0);

	let before = store.containers();
	let second = reconciler
		.reconcile("db-1", &model, None)
		.await
		.expect("second run failed");

	// No deletes, no inserts; only volatile-field updates.
	assert_eq!(second.containers_inserted, 0);
	assert_eq!(second.items_inserted, 0);
	assert_eq!(second.containers_deleted, 0);
	assert_eq!(second.items_deleted, 0);
	assert_eq!(second.containers_updated, 2);
	assert_eq!(second.items_updated, 4);

	// Ids survive, timestamps move forward.
	let after = store.containers();
	for container in &before {
		let survivor = after
			.iter()
			.find(|c| c.uri == container.uri)
			.expect("container survived");
		assert_eq!(survivor.container_id, container.container_id);
		assert!(survivor.last_seen >= container.last_seen);
	}
}

#[tokio::test]
async fn test_schema_change_never_deletes_the_container() {
	let store = MockRegistryStore::default();
	let reconciler = Reconciler::new(Arc::new(store.clone()));

	reconciler
		.reconcile("db-1", &model(&[("users", &["id", "email"])]), None)
		.await
		.expect("seed failed");
	let container_id_before = store.containers()[0].container_id.clone();

	// The column set changes; the container must survive with its id.
	let summary = reconciler
		.reconcile("db-1", &model(&[("users", &["id", "phone"])]), None)
		.await
		.expect("change failed");

	assert_eq!(summary.containers_deleted, 0);
	assert_eq!(summary.containers_updated, 1);
	assert_eq!(summary.items_deleted, 1, "email item removed");
	assert_eq!(summary.items_inserted, 1, "phone item added");
	assert_eq!(store.containers()[0].container_id, container_id_before);
}

#[tokio::test]
async fn test_disappeared_container_is_deleted_with_items() {
	let store = MockRegistryStore::default();
	let reconciler = Reconciler::new(Arc::new(store.clone()));

	reconciler
		.reconcile(
			"db-1",
			&model(&[("users", &["id"]), ("legacy", &["id"])]),
			None,
		)
		.await
		.expect("seed failed");
	assert_eq!(store.containers().len(), 2);
	assert_eq!(store.items().len(), 2);

	let summary = reconciler
		.reconcile("db-1", &model(&[("users", &["id"])]), None)
		.await
		.expect("shrink failed");

	assert_eq!(summary.containers_deleted, 1);
	assert_eq!(store.containers().len(), 1);
	// The store cascades item deletion with the container.
	assert_eq!(store.items().len(), 1);
	assert!(store.containers()[0].uri.ends_with("/table/users"));
}

#[tokio::test]
async fn test_reconciler_scoped_to_its_database() {
	let store = MockRegistryStore::default();
	let reconciler = Reconciler::new(Arc::new(store.clone()));

	reconciler
		.reconcile("db-1", &model(&[("users", &["id"])]), None)
		.await
		.expect("db-1 failed");
	reconciler
		.reconcile("db-2", &model(&[("users", &["id"])]), None)
		.await
		.expect("db-2 failed");
	assert_eq!(store.containers().len(), 2);

	// Emptying db-1 leaves db-2 untouched.
	let summary = reconciler
		.reconcile("db-1", &UnifiedModel::default(), None)
		.await
		.expect("empty failed");
	assert_eq!(summary.containers_deleted, 1);
	let remaining = store.containers();
	assert_eq!(remaining.len(), 1);
	assert_eq!(remaining[0].database_id.as_deref(), Some("db-2"));
}

#[tokio::test]
async fn test_enrichment_descriptions_survive_unenriched_runs() {
	let store = MockRegistryStore::default();
	let reconciler = Reconciler::new(Arc::new(store.clone()));
	let model = model(&[("users", &["id"])]);

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

	reconciler
		.reconcile("db-1", &model, Some(&enrichment))
		.await
		.expect("enriched run failed");
	assert_eq!(store.containers()[0].description.as_deref(), Some("user accounts"));

	// A later pass without enrichment keeps the stored descriptions.
	reconciler.reconcile("db-1", &model, None).await.expect("plain run failed");
	assert_eq!(store.containers()[0].description.as_deref(), Some("user accounts"));
	assert_eq!(store.items()[0].description.as_deref(), Some("surrogate key"));

	// A fresh enrichment replaces them.
	enrichment.tables.get_mut("users").unwrap().description = Some("accounts".to_string());
	reconciler
		.reconcile("db-1", &model, Some(&enrichment))
		.await
		.expect("second enriched run failed");
	assert_eq!(store.containers()[0].description.as_deref(), Some("accounts"));
}

#[test]
fn test_derive_never_marks_desired_for_delete() {
	// The reconciler's delete set is "existing minus desired"; a URI
	// in the desired set can therefore never be deleted. Guard the
	// derivation itself against duplicate URIs, which would make the
	// set ambiguous.
	let model = model(&[("users", &["id", "name"]), ("orders", &["id"])]);
	let (containers, items) = derive_rows("db-1", &model, &SchemaEnrichment::default());
	let mut uris: Vec<&str> = containers
		.iter()
		.map(|c| c.uri.as_str())
		.chain(items.iter().map(|i| i.uri.as_str()))
		.collect();
	let total = uris.len();
	uris.sort();
	uris.dedup();
	assert_eq!(uris.len(), total, "derived URIs must be unique");
}
