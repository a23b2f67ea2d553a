// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_adapter::ConnectionRegistry;
use anchor_core::{
	EngineKind,
	interface::AdapterConnection,
	model::{Column, Table},
};
use anchor_testing::{MockConnection, MockEngine};
use anchor_type::{ErrorKind, Row, Value};

fn orders_table() -> Table {
	Table::new("ORDERS")
		.with_column(
			"ID",
			Column {
				data_type: "INTEGER".into(),
				unified_data_type: "int".into(),
				nullable: false,
				is_primary_key: true,
				..Default::default()
			},
		)
		.with_column(
			"TOTAL",
			Column {
				data_type: "INTEGER".into(),
				unified_data_type: "int".into(),
				nullable: true,
				..Default::default()
			},
		)
}

fn row(pairs: &[(&str, Value)]) -> Row {
	pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn mock(database_id: &str) -> Arc<MockConnection> {
	let engine = MockEngine::new(EngineKind::Db2, database_id);
	engine.define_table("ORDERS", orders_table());
	MockConnection::new(engine)
}

#[tokio::test]
async fn test_registry_rejects_duplicate_ids() {
	let registry = ConnectionRegistry::new();
	registry.register("db-1", mock("db-1")).expect("first register failed");
	let err = registry.register("db-1", mock("db-1")).expect_err("duplicate must fail");
	assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_close_transitions_is_connected_and_removes() {
	let registry = ConnectionRegistry::new();
	let conn = mock("db-1");
	let handle: Arc<dyn AdapterConnection> = conn.clone();
	registry.register("db-1", handle).expect("register failed");
	assert!(conn.is_connected());

	registry.close("db-1").await.expect("close failed");
	assert!(!conn.is_connected(), "close is monotone to false");
	assert!(registry.get("db-1").is_none());

	let err = registry.close("db-1").await.expect_err("double close is not_found");
	assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_list_ids_reflects_registrations() {
	let registry = ConnectionRegistry::new();
	registry.register("db-1", mock("db-1")).expect("register failed");
	registry.register("db-2", mock("db-2")).expect("register failed");
	let mut ids = registry.list_ids();
	ids.sort();
	assert_eq!(ids, vec!["db-1", "db-2"]);

	registry.register_instance("inst-1", mock("inst-1")).expect("register failed");
	assert_eq!(registry.list_instance_ids(), vec!["inst-1"]);
}

#[tokio::test]
async fn test_insert_of_zero_rows_is_a_no_op() {
	let conn = mock("db-1");
	assert_eq!(conn.data().insert("ORDERS", &[]).await.expect("insert failed"), 0);
	assert!(conn.engine_handle().rows_of("ORDERS").is_empty());
}

#[tokio::test]
async fn test_update_without_where_values_updates_nothing() {
	let conn = mock("db-1");
	conn.data()
		.insert("ORDERS", &[row(&[("ID", Value::Int(1)), ("TOTAL", Value::Int(10))])])
		.await
		.expect("insert failed");

	// The row carries none of the where-columns: skipped.
	let affected = conn
		.data()
		.update("ORDERS", &[row(&[("TOTAL", Value::Int(99))])], &["ID".to_string()])
		.await
		.expect("update failed");
	assert_eq!(affected, 0);
	assert_eq!(
		conn.engine_handle().rows_of("ORDERS")[0].get("TOTAL"),
		Some(&Value::Int(10))
	);
}

#[tokio::test]
async fn test_delete_with_empty_conditions_is_invalid() {
	let conn = mock("db-1");
	let err = conn.data().delete("ORDERS", &Row::new()).await.expect_err("must fail");
	assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[tokio::test]
async fn test_fetch_limit_semantics() {
	let conn = mock("db-1");
	let rows: Vec<Row> = (1..=5)
		.map(|i| row(&[("ID", Value::Int(i)), ("TOTAL", Value::Int(i * 10))]))
		.collect();
	conn.data().insert("ORDERS", &rows).await.expect("insert failed");

	// limit 0 means no cap.
	assert_eq!(conn.data().fetch("ORDERS", 0).await.expect("fetch failed").len(), 5);
	assert_eq!(conn.data().fetch("ORDERS", 3).await.expect("fetch failed").len(), 3);
}

#[tokio::test]
async fn test_upsert_inserts_then_updates_on_key() {
	let conn = mock("db-1");

	// First call on an empty table inserts both rows.
	let affected = conn
		.data()
		.upsert(
			"ORDERS",
			&[
				row(&[("ID", Value::Int(1)), ("TOTAL", Value::Int(10))]),
				row(&[("ID", Value::Int(2)), ("TOTAL", Value::Int(20))]),
			],
			&["ID".to_string()],
		)
		.await
		.expect("upsert failed");
	assert_eq!(affected, 2);

	// Second call updates row 1 and leaves row 2 untouched.
	conn.data()
		.upsert(
			"ORDERS",
			&[row(&[("ID", Value::Int(1)), ("TOTAL", Value::Int(15))])],
			&["ID".to_string()],
		)
		.await
		.expect("upsert failed");

	let rows = conn.engine_handle().rows_of("ORDERS");
	assert_eq!(rows.len(), 2);
	let one = rows.iter().find(|r| r.get("ID") == Some(&Value::Int(1))).unwrap();
	assert_eq!(one.get("TOTAL"), Some(&Value::Int(15)));
	let two = rows.iter().find(|r| r.get("ID") == Some(&Value::Int(2))).unwrap();
	assert_eq!(two.get("TOTAL"), Some(&Value::Int(20)));
}

#[tokio::test]
async fn test_discover_then_create_round_trips() {
	let source = mock("db-src");
	let model = source.schema().discover_schema().await.expect("discover failed");

	let target_engine = MockEngine::new(EngineKind::Db2, "db-dst");
	let target = MockConnection::new(Arc::clone(&target_engine));
	target.schema().create_structure(&model).await.expect("create failed");

	let round_tripped = target.schema().discover_schema().await.expect("discover failed");
	assert_eq!(model, round_tripped);
}
