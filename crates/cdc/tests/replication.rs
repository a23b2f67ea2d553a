// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use anchor_cdc::{ReplicationWatcher, SourceStatus, channel_key};
use anchor_core::{
	CdcEvent, CdcOperation, EngineKind,
	interface::{
		AdapterConnection, PollChannel, ReplicationConfig, ReplicationSourceState,
		services::CheckpointStore,
	},
	model::{Column, Table},
	transform::TransformationRule,
};
use anchor_testing::{MockCheckpointStore, MockConnection, MockEngine, wait_for};
use anchor_type::{Error, Result, Row, Value};
use parking_lot::Mutex;

fn employees_table() -> Table {
	Table::new("EMPLOYEES")
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
			"NAME",
			Column {
				data_type: "VARCHAR(40)".into(),
				unified_data_type: "text".into(),
				nullable: true,
				..Default::default()
			},
		)
}

fn row(pairs: &[(&str, Value)]) -> Row {
	pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

struct Captured {
	events: Arc<Mutex<Vec<CdcEvent>>>,
}

impl Captured {
	fn new() -> Self {
		Self {
			events: Arc::new(Mutex::new(Vec::new())),
		}
	}

	fn handler(&self) -> anchor_core::interface::EventHandler {
		let events = Arc::clone(&self.events);
		Arc::new(move |event| {
			let events = Arc::clone(&events);
			Box::pin(async move {
				events.lock().push(event);
				Ok(())
			}) as futures_util::future::BoxFuture<'static, Result<()>>
		})
	}

	fn len(&self) -> usize {
		self.events.lock().len()
	}

	fn snapshot(&self) -> Vec<CdcEvent> {
		self.events.lock().clone()
	}
}

fn config(
	replication_id: &str,
	tables: &[&str],
	handler: anchor_core::interface::EventHandler,
	checkpoint: Option<Arc<MockCheckpointStore>>,
) -> ReplicationConfig {
	ReplicationConfig {
		replication_id: replication_id.to_string(),
		database_id: "db-1".to_string(),
		table_names: tables.iter().map(|t| t.to_string()).collect(),
		start_position: None,
		event_handler: handler,
		checkpoint: checkpoint.map(|c| -> Arc<dyn CheckpointStore> { c }),
		rules: Vec::new(),
		transform_endpoint: None,
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_trigger_cdc_round_trip() {
	let engine = MockEngine::new(EngineKind::Db2, "db-1");
	engine.define_table("EMPLOYEES", employees_table());
	let conn = MockConnection::new(Arc::clone(&engine));

	let captured = Captured::new();
	let source = conn
		.replication()
		.connect(config("repl-1", &["EMPLOYEES"], captured.handler(), None))
		.await
		.expect("connect failed");
	source.start().await.expect("start failed");

	conn.data()
		.insert("EMPLOYEES", &[row(&[("ID", Value::Int(1)), ("NAME", Value::text("Ada"))])])
		.await
		.expect("insert failed");
	conn.data()
		.update(
			"EMPLOYEES",
			&[row(&[("ID", Value::Int(1)), ("NAME", Value::text("Grace"))])],
			&["ID".to_string()],
		)
		.await
		.expect("update failed");
	conn.data()
		.delete("EMPLOYEES", &row(&[("ID", Value::Int(1))]))
		.await
		.expect("delete failed");

	assert!(wait_for(Duration::from_secs(5), || captured.len() == 3).await, "expected 3 events");

	let events = captured.snapshot();
	assert_eq!(events[0].operation, CdcOperation::Insert);
	assert_eq!(events[0].data.as_ref().unwrap().get("ID"), Some(&Value::Int(1)));
	assert_eq!(events[0].data.as_ref().unwrap().get("NAME"), Some(&Value::text("Ada")));

	assert_eq!(events[1].operation, CdcOperation::Update);
	assert_eq!(events[1].data.as_ref().unwrap().get("NAME"), Some(&Value::text("Grace")));

	assert_eq!(events[2].operation, CdcOperation::Delete);
	assert_eq!(events[2].old_data.as_ref().unwrap().get("NAME"), Some(&Value::text("Grace")));

	// Positions advance monotonically; the change log keeps its rows.
	let positions: Vec<&str> = events.iter().filter_map(|e| e.lsn.as_deref()).collect();
	assert_eq!(positions.len(), 3);
	assert!(positions.windows(2).all(|w| w[0] < w[1]));
	assert_eq!(engine.change_log_len("EMPLOYEES"), 3);

	source.close().await.expect("close failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_log_based_resume_from_checkpoint() {
	let engine = MockEngine::new(EngineKind::Postgres, "db-1");
	let conn = MockConnection::new(Arc::clone(&engine));
	let checkpoint = Arc::new(MockCheckpointStore::default());

	engine.push_log_event(
		CdcOperation::Insert,
		"users",
		Some(row(&[("ID", Value::Int(1))])),
		None,
	);
	engine.push_log_event(
		CdcOperation::Insert,
		"users",
		Some(row(&[("ID", Value::Int(2))])),
		None,
	);

	let captured = Captured::new();
	let source = conn
		.replication()
		.connect(config("repl-2", &[], captured.handler(), Some(Arc::clone(&checkpoint))))
		.await
		.expect("connect failed");
	source.start().await.expect("start failed");

	assert!(wait_for(Duration::from_secs(5), || captured.len() == 2).await);
	source.save_checkpoint().await.expect("checkpoint failed");
	source.stop().await.expect("stop failed");

	let key = channel_key("repl-2", &PollChannel::Stream);
	let saved = checkpoint.position_of(&key).expect("no checkpoint saved");
	assert_eq!(saved, format!("{:016x}", 2));

	// A third event arrives while the source is down.
	engine.push_log_event(
		CdcOperation::Insert,
		"users",
		Some(row(&[("ID", Value::Int(3))])),
		None,
	);

	// Restart with no explicit start position: the checkpoint wins.
	let captured2 = Captured::new();
	let source2 = conn
		.replication()
		.connect(config("repl-2", &[], captured2.handler(), Some(Arc::clone(&checkpoint))))
		.await
		.expect("connect failed");
	source2.start().await.expect("start failed");

	assert!(wait_for(Duration::from_secs(5), || captured2.len() == 1).await);
	let events = captured2.snapshot();
	assert_eq!(events[0].data.as_ref().unwrap().get("ID"), Some(&Value::Int(3)));
	source2.close().await.expect("close failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsupported_replication_is_recorded() {
	let engine = MockEngine::new(EngineKind::Iceberg, "db-lake");
	let conn = MockConnection::new(engine);
	let watcher = ReplicationWatcher::new();

	let captured = Captured::new();
	let mut cfg = config("repl-lake", &[], captured.handler(), None);
	cfg.database_id = "db-lake".to_string();
	let err = match watcher.attach(conn.as_ref(), cfg).await {
		Err(err) => err,
		Ok(_) => panic!("must fail"),
	};
	assert!(err.is_unsupported());

	let entry = watcher.entry("repl-lake").expect("entry recorded");
	assert_eq!(entry.status, SourceStatus::Error);
	assert!(entry.message.as_deref().unwrap_or_default().contains("unsupported"));
	assert!(entry.source.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_setup_cdc_is_idempotent() {
	let engine = MockEngine::new(EngineKind::Db2, "db-1");
	engine.define_table("EMPLOYEES", employees_table());
	let conn = MockConnection::new(Arc::clone(&engine));

	conn.replication().setup_cdc_for_table("", "EMPLOYEES").await.expect("setup failed");
	conn.replication().setup_cdc_for_table("", "EMPLOYEES").await.expect("setup failed");

	assert_eq!(engine.setup_calls(), 2);
	assert!(engine.has_change_log("EMPLOYEES"));
	assert_eq!(engine.change_log_len("EMPLOYEES"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_source_lifecycle_is_idempotent() {
	let engine = MockEngine::new(EngineKind::Db2, "db-1");
	engine.define_table("EMPLOYEES", employees_table());
	let conn = MockConnection::new(engine);

	let captured = Captured::new();
	let source = conn
		.replication()
		.connect(config("repl-3", &["EMPLOYEES"], captured.handler(), None))
		.await
		.expect("connect failed");

	assert!(!source.is_active());
	source.start().await.expect("start failed");
	assert!(source.is_active());
	source.start().await.expect("double start is a no-op");

	source.stop().await.expect("stop failed");
	assert!(!source.is_active());
	source.stop().await.expect("double stop is a no-op");

	source.close().await.expect("close failed");
	source.close().await.expect("double close is a no-op");
	assert_eq!(source.status().state, ReplicationSourceState::Closed);
	assert!(source.start().await.is_err(), "closed source cannot restart");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_poll_errors_back_off_and_recover() {
	let engine = MockEngine::new(EngineKind::Db2, "db-1");
	engine.define_table("EMPLOYEES", employees_table());
	let conn = MockConnection::new(Arc::clone(&engine));

	let captured = Captured::new();
	let source = conn
		.replication()
		.connect(config("repl-4", &["EMPLOYEES"], captured.handler(), None))
		.await
		.expect("connect failed");

	engine.set_fail_fetch(true);
	source.start().await.expect("start failed");

	assert!(
		wait_for(Duration::from_secs(5), || source.status().error_count > 0).await,
		"poll errors should be counted"
	);
	assert_eq!(source.status().state, ReplicationSourceState::PausedOnError);
	assert!(source.status().last_error.is_some());

	conn.data()
		.insert("EMPLOYEES", &[row(&[("ID", Value::Int(1)), ("NAME", Value::text("Ada"))])])
		.await
		.expect("insert failed");
	engine.set_fail_fetch(false);

	assert!(wait_for(Duration::from_secs(10), || captured.len() == 1).await, "source must recover");
	assert_eq!(source.status().state, ReplicationSourceState::Running);
	source.close().await.expect("close failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_failure_blocks_position() {
	let engine = MockEngine::new(EngineKind::Db2, "db-1");
	engine.define_table("EMPLOYEES", employees_table());
	let conn = MockConnection::new(Arc::clone(&engine));

	let fail = Arc::new(AtomicBool::new(true));
	let events = Arc::new(Mutex::new(Vec::<CdcEvent>::new()));
	let handler: anchor_core::interface::EventHandler = {
		let fail = Arc::clone(&fail);
		let events = Arc::clone(&events);
		Arc::new(move |event| {
			let fail = Arc::clone(&fail);
			let events = Arc::clone(&events);
			Box::pin(async move {
				if fail.load(Ordering::Relaxed) {
					return Err(Error::transient("target unavailable"));
				}
				events.lock().push(event);
				Ok(())
			}) as futures_util::future::BoxFuture<'static, Result<()>>
		})
	};

	let source = conn
		.replication()
		.connect(config("repl-5", &["EMPLOYEES"], handler, None))
		.await
		.expect("connect failed");
	source.start().await.expect("start failed");

	conn.data()
		.insert("EMPLOYEES", &[row(&[("ID", Value::Int(1)), ("NAME", Value::text("Ada"))])])
		.await
		.expect("insert failed");

	assert!(wait_for(Duration::from_secs(5), || source.status().error_count > 0).await);
	// Position must not advance past the failed event.
	assert!(source.get_position().is_none());
	assert!(events.lock().is_empty());

	fail.store(false, Ordering::Relaxed);
	assert!(wait_for(Duration::from_secs(10), || events.lock().len() == 1).await);
	assert_eq!(source.get_position(), Some(format!("{:016x}", 1)));
	source.close().await.expect("close failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transformation_rules_apply_to_post_image() {
	let engine = MockEngine::new(EngineKind::Db2, "db-1");
	engine.define_table("EMPLOYEES", employees_table());
	let conn = MockConnection::new(Arc::clone(&engine));

	let captured = Captured::new();
	let mut cfg = config("repl-6", &["EMPLOYEES"], captured.handler(), None);
	cfg.rules = vec![TransformationRule {
		source_column: "NAME".to_string(),
		target_column: "NAME".to_string(),
		transformation_name: "uppercase".to_string(),
		parameters: Row::new(),
	}];
	let source = conn.replication().connect(cfg).await.expect("connect failed");
	source.start().await.expect("start failed");

	conn.data()
		.insert("EMPLOYEES", &[row(&[("ID", Value::Int(1)), ("NAME", Value::text("Ada"))])])
		.await
		.expect("insert failed");

	assert!(wait_for(Duration::from_secs(5), || captured.len() == 1).await);
	let events = captured.snapshot();
	assert_eq!(events[0].data.as_ref().unwrap().get("NAME"), Some(&Value::text("ADA")));
	source.close().await.expect("close failed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_ferry_to_a_target_connection() {
	let source_engine = MockEngine::new(EngineKind::Db2, "db-src");
	source_engine.define_table("EMPLOYEES", employees_table());
	let source_conn = MockConnection::new(Arc::clone(&source_engine));

	let target_engine = MockEngine::new(EngineKind::Db2, "db-dst");
	target_engine.define_table("EMPLOYEES", employees_table());
	let target_conn = MockConnection::new(Arc::clone(&target_engine));

	let handler: anchor_core::interface::EventHandler = {
		let target = Arc::clone(&target_conn);
		Arc::new(move |event| {
			let target = Arc::clone(&target);
			Box::pin(async move {
				target.replication().apply_event(&event).await.map(|_| ())
			}) as futures_util::future::BoxFuture<'static, Result<()>>
		})
	};

	let mut cfg = config("repl-7", &["EMPLOYEES"], handler, None);
	cfg.database_id = "db-src".to_string();
	let source = source_conn.replication().connect(cfg).await.expect("connect failed");
	source.start().await.expect("start failed");

	source_conn
		.data()
		.insert("EMPLOYEES", &[row(&[("ID", Value::Int(7)), ("NAME", Value::text("Lin"))])])
		.await
		.expect("insert failed");

	assert!(
		wait_for(Duration::from_secs(5), || target_engine.rows_of("EMPLOYEES").len() == 1)
			.await
	);
	assert_eq!(
		target_engine.rows_of("EMPLOYEES")[0].get("NAME"),
		Some(&Value::text("Lin"))
	);
	source.close().await.expect("close failed");
}
