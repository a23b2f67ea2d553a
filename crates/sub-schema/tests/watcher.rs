// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{sync::Arc, time::Duration};

use anchor_adapter::ConnectionRegistry;
use anchor_core::{
	EngineKind,
	interface::services::{DatabaseRow, MappingRow, SchemaRepo},
	model::{Column, Table, UnifiedModel},
};
use anchor_sub_schema::{
	SchemaWatcher, SchemaWatcherConfig, ensure_repo_branch_commit, sanitize_repo_name,
};
use anchor_testing::{MockAnalysisService, MockConnection, MockEngine, MockRegistryStore, MockSchemaRepo};
use tokio_util::sync::CancellationToken;

fn users_model(with_email: bool) -> UnifiedModel {
	let mut table = Table::new("users").with_column(
		"id",
		Column {
			data_type: "integer".into(),
			unified_data_type: "int".into(),
			nullable: false,
			is_primary_key: true,
			..Default::default()
		},
	);
	if with_email {
		table = table.with_column(
			"email",
			Column {
				data_type: "varchar(100)".into(),
				unified_data_type: "text".into(),
				nullable: true,
				..Default::default()
			},
		);
	}
	let mut model = UnifiedModel::default();
	model.insert_table(table);
	model
}

struct Fixture {
	watcher: SchemaWatcher,
	engine: Arc<MockEngine>,
	connections: Arc<ConnectionRegistry>,
	store: MockRegistryStore,
	repo: MockSchemaRepo,
	analysis: MockAnalysisService,
}

fn fixture(database_id: &str) -> Fixture {
	let engine = MockEngine::new(EngineKind::Postgres, database_id);
	let conn = MockConnection::new(Arc::clone(&engine));
	let connections = Arc::new(ConnectionRegistry::new());
	connections.register(database_id, conn).expect("register failed");

	let store = MockRegistryStore::default();
	store.add_database(DatabaseRow {
		database_id: database_id.to_string(),
		workspace_id: "ws-1".to_string(),
		name: format!("{database_id} production"),
		enabled: true,
		status: "connected".to_string(),
	});
	let repo = MockSchemaRepo::default();
	let analysis = MockAnalysisService::default();

	let watcher = SchemaWatcher::new(
		Arc::clone(&connections),
		Arc::new(analysis.clone()),
		Arc::new(repo.clone()),
		Arc::new(store.clone()),
		SchemaWatcherConfig {
			interval: Duration::from_millis(50),
			per_database_deadline: Duration::from_secs(5),
		},
	);
	Fixture {
		watcher,
		engine,
		connections,
		store,
		repo,
		analysis,
	}
}

fn mapping(id: &str, uri: &str) -> MappingRow {
	MappingRow {
		mapping_id: id.to_string(),
		rule: serde_json::json!({"source": uri, "target": "redb://data/database/other/table/t"}),
		validated: true,
		validation_errors: vec!["stale".to_string()],
		validation_warnings: vec![],
	}
}

#[tokio::test]
async fn test_schema_diff_commit_and_mapping_invalidation() {
	let f = fixture("D");
	let cancel = CancellationToken::new();

	// Tick 1: no prior commit, full schema committed.
	f.engine.set_schema_override(users_model(false));
	assert_eq!(f.watcher.tick(&cancel).await, 0);
	assert_eq!(f.repo.total_commits(), 1);
	assert!(f.store.schema_cache_of("D").is_some());

	// Mappings appear between ticks; one targets this database.
	f.store.add_mapping(mapping("m-users", "redb://data/database/D/table/users/column/email"));
	f.store.add_mapping(mapping("m-other", "redb://data/database/E/table/users/column/id"));

	// Tick 2: EMAIL column appears.
	f.engine.set_schema_override(users_model(true));
	assert_eq!(f.watcher.tick(&cancel).await, 0);
	assert_eq!(f.repo.total_commits(), 2, "one commit appended per change");

	let mappings = f.store.mappings();
	let users = mappings.iter().find(|m| m.mapping_id == "m-users").unwrap();
	assert!(!users.validated, "mapping under D must be invalidated");
	assert!(users.validation_errors.is_empty(), "validation messages are cleared");
	let other = mappings.iter().find(|m| m.mapping_id == "m-other").unwrap();
	assert!(other.validated, "mappings under other databases stay validated");

	// The registry now carries the new column.
	assert!(
		f.store
			.items()
			.iter()
			.any(|i| i.uri == "redb://data/database/D/table/users/column/email")
	);
}

#[tokio::test]
async fn test_unchanged_schema_creates_no_commit() {
	let f = fixture("D");
	let cancel = CancellationToken::new();
	f.engine.set_schema_override(users_model(false));

	assert_eq!(f.watcher.tick(&cancel).await, 0);
	assert_eq!(f.watcher.tick(&cancel).await, 0);
	assert_eq!(f.watcher.tick(&cancel).await, 0);

	assert_eq!(f.repo.total_commits(), 1, "only the first sight commits");
	// Comparison ran on the later ticks.
	assert!(f.analysis.compare_calls.load(std::sync::atomic::Ordering::Relaxed) >= 2);
}

#[tokio::test]
async fn test_enrichment_failure_surfaces_on_health_note() {
	let f = fixture("D");
	let cancel = CancellationToken::new();
	f.engine.set_schema_override(users_model(false));
	f.analysis.fail_enrich.store(true, std::sync::atomic::Ordering::Relaxed);

	f.watcher.tick(&cancel).await;

	// The commit still happened; the failure is visible, not
	// swallowed.
	assert_eq!(f.repo.total_commits(), 1);
	let note = f.store.health_of("D").expect("health note recorded");
	assert!(note.contains("enrichment"));
}

#[tokio::test]
async fn test_per_database_errors_stay_local_to_their_database() {
	let f = fixture("D");
	let cancel = CancellationToken::new();
	f.engine.set_schema_override(users_model(false));

	// A second database whose discovery fails.
	let broken_engine = MockEngine::new(EngineKind::Postgres, "E");
	broken_engine.set_fail_discovery(true);
	f.connections
		.register("E", MockConnection::new(broken_engine))
		.expect("register failed");

	let errors = f.watcher.tick(&cancel).await;
	assert_eq!(errors, 1, "the broken database is counted");
	assert_eq!(f.repo.total_commits(), 1, "the healthy database still commits");
}

#[tokio::test]
async fn test_repo_names_are_sanitized_and_suffixed() {
	let repo = MockSchemaRepo::default();
	// Another database already took the sanitized name.
	repo.create_repo("orders-db", "other-database").await.expect("seed failed");

	let model = users_model(false);
	let commit = ensure_repo_branch_commit(
		&repo,
		"D",
		"Orders DB",
		EngineKind::Postgres,
		&model,
		None,
		"Initial schema discovery",
	)
	.await
	.expect("commit failed");
	assert_eq!(commit.schema_type, "postgres");

	let names = repo.repo_names();
	assert!(names.contains(&"orders-db".to_string()));
	assert!(names.contains(&"orders-db-2".to_string()), "collision suffixes with -2: {names:?}");

	// The next commit for the same database reuses the repo.
	ensure_repo_branch_commit(
		&repo,
		"D",
		"Orders DB",
		EngineKind::Postgres,
		&model,
		None,
		"Schema update: 1 change(s)",
	)
	.await
	.expect("second commit failed");
	assert_eq!(repo.repo_names().len(), 2);
}

#[test]
fn test_sanitize_rules() {
	assert_eq!(sanitize_repo_name("My Database #1"), "my-database-1");
	assert_eq!(sanitize_repo_name(""), "database");
}
