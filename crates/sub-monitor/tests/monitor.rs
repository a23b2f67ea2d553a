// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::{Arc, atomic::Ordering};

use anchor_core::{
	interface::services::{DatabaseRow, IntegrationKind, IntegrationRow},
	resource::{ResourceContainer, ResourceItem},
};
use anchor_sub_monitor::{StatusMonitor, StatusMonitorConfig};
use anchor_testing::MockRegistryStore;
use anchor_type::Row;
use chrono::Utc;

fn database(id: &str, enabled: bool, status: &str) -> DatabaseRow {
	DatabaseRow {
		database_id: id.to_string(),
		workspace_id: "ws-1".to_string(),
		name: id.to_string(),
		enabled,
		status: status.to_string(),
	}
}

fn container(id: &str, database_id: Option<&str>, uri: &str, online: bool) -> ResourceContainer {
	ResourceContainer {
		container_id: id.to_string(),
		database_id: database_id.map(str::to_string),
		uri: uri.to_string(),
		kind: "table".to_string(),
		name: id.to_string(),
		description: None,
		online,
		last_seen: Utc::now(),
		updated: Utc::now(),
		metadata: Row::new(),
	}
}

fn item(id: &str, container_id: &str, uri: &str, online: bool) -> ResourceItem {
	ResourceItem {
		item_id: id.to_string(),
		container_id: container_id.to_string(),
		uri: uri.to_string(),
		kind: "column".to_string(),
		name: id.to_string(),
		data_type: Some("int".to_string()),
		description: None,
		online,
		last_seen: Utc::now(),
		updated: Utc::now(),
		metadata: Row::new(),
	}
}

#[tokio::test]
async fn test_database_liveness_projects_to_containers_and_items() {
	let store = MockRegistryStore::default();
	store.add_database(database("db-1", true, "connected"));
	store.add_container(container("c1", Some("db-1"), "redb://data/database/db-1/table/users", false));
	store.add_item(item("i1", "c1", "redb://data/database/db-1/table/users/column/id", false));

	let monitor = StatusMonitor::new(Arc::new(store.clone()), StatusMonitorConfig::default());
	let transitions = monitor.tick().await.expect("tick failed");
	assert_eq!(transitions, 1);
	assert!(store.containers()[0].online);
	assert!(store.items()[0].online);

	// Going disconnected flips everything back off.
	store.set_database_status("db-1", true, "error");
	let transitions = monitor.tick().await.expect("tick failed");
	assert_eq!(transitions, 1);
	assert!(!store.containers()[0].online);
	assert!(!store.items()[0].online);
}

#[tokio::test]
async fn test_only_changed_rows_are_written() {
	let store = MockRegistryStore::default();
	store.add_database(database("db-1", true, "connected"));
	store.add_container(container("c1", Some("db-1"), "redb://data/database/db-1/table/users", false));

	let monitor = StatusMonitor::new(Arc::new(store.clone()), StatusMonitorConfig::default());
	assert_eq!(monitor.tick().await.expect("tick failed"), 1);
	let writes_after_first = store.container_writes.load(Ordering::Relaxed);

	// Second tick with no status change writes nothing.
	assert_eq!(monitor.tick().await.expect("tick failed"), 0);
	assert_eq!(store.container_writes.load(Ordering::Relaxed), writes_after_first);
}

#[tokio::test]
async fn test_disabled_database_counts_as_offline() {
	let store = MockRegistryStore::default();
	store.add_database(database("db-1", false, "connected"));
	store.add_container(container("c1", Some("db-1"), "redb://data/database/db-1/table/users", true));

	let monitor = StatusMonitor::new(Arc::new(store.clone()), StatusMonitorConfig::default());
	assert_eq!(monitor.tick().await.expect("tick failed"), 1);
	assert!(!store.containers()[0].online);
}

#[tokio::test]
async fn test_integration_status_projects_to_its_containers() {
	let store = MockRegistryStore::default();
	store.add_integration(IntegrationRow {
		integration_id: "wh-1".to_string(),
		kind: IntegrationKind::Webhook,
		enabled: true,
		status: "connected".to_string(),
	});
	store.add_container(container("c-wh", None, "webhook://integrations/wh-1", false));
	store.add_container(container("c-other", None, "mcp://integrations/mcp-9", false));

	let monitor = StatusMonitor::new(Arc::new(store.clone()), StatusMonitorConfig::default());
	assert_eq!(monitor.tick().await.expect("tick failed"), 1);

	let containers = store.containers();
	let webhook = containers.iter().find(|c| c.container_id == "c-wh").unwrap();
	assert!(webhook.online);
	let other = containers.iter().find(|c| c.container_id == "c-other").unwrap();
	assert!(!other.online, "unrelated integration containers are untouched");
}
