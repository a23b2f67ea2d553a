// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Status monitor subsystem.
//!
//! On a fixed interval, database liveness (`enabled` and connected)
//! and integration statuses are projected onto their registry
//! containers; container transitions propagate to items. Only rows
//! whose `online` value actually changes are written.

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use anchor_core::{
	interface::services::{IntegrationRow, RegistryStore},
	resource::database_uri_prefix,
};
use anchor_sub_api::{HealthStatus, Subsystem};
use anchor_type::Result;
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

const CONNECTED: &str = "connected";

#[derive(Clone, Debug)]
pub struct StatusMonitorConfig {
	pub interval: Duration,
}

impl Default for StatusMonitorConfig {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(30),
		}
	}
}

pub struct StatusMonitor {
	store: Arc<dyn RegistryStore>,
	config: StatusMonitorConfig,
	running: Arc<AtomicBool>,
	cancel: parking_lot::Mutex<Option<CancellationToken>>,
	task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StatusMonitor {
	pub fn new(store: Arc<dyn RegistryStore>, config: StatusMonitorConfig) -> Self {
		Self {
			store,
			config,
			running: Arc::new(AtomicBool::new(false)),
			cancel: parking_lot::Mutex::new(None),
			task: tokio::sync::Mutex::new(None),
		}
	}

	/// One projection pass. Returns the number of containers whose
	/// online flag changed.
	#[instrument(name = "status_monitor::tick", level = "debug", skip_all)]
	pub async fn tick(&self) -> Result<usize> {
		let mut transitions = 0;

		for database in self.store.list_databases().await? {
			let online = database.enabled && database.status == CONNECTED;
			let prefix = database_uri_prefix(&database.database_id);
			for container in self.store.list_containers(&database.database_id).await? {
				if !container.uri.starts_with(&prefix) {
					continue;
				}
				if container.online == online {
					continue;
				}
				self.store.set_container_online(&container.container_id, online).await?;
				self.store
					.set_items_online_for_container(&container.container_id, online)
					.await?;
				transitions += 1;
			}
		}

		let integrations = self.store.list_integrations().await?;
		if !integrations.is_empty() {
			let containers = self.store.list_integration_containers().await?;
			for integration in &integrations {
				let online = integration.enabled && integration.status == CONNECTED;
				for container in
					containers.iter().filter(|c| belongs_to(c.uri.as_str(), integration))
				{
					if container.online == online {
						continue;
					}
					self.store
						.set_container_online(&container.container_id, online)
						.await?;
					self.store
						.set_items_online_for_container(&container.container_id, online)
						.await?;
					transitions += 1;
				}
			}
		}

		if transitions > 0 {
			debug!(transitions, "online flags projected");
		}
		Ok(transitions)
	}
}

fn belongs_to(uri: &str, integration: &IntegrationRow) -> bool {
	uri.starts_with(&format!("{}://", integration.kind.scheme()))
		&& uri.contains(&integration.integration_id)
}

#[async_trait]
impl Subsystem for StatusMonitor {
	fn name(&self) -> &'static str {
		"StatusMonitor"
	}

	async fn start(&mut self) -> Result<()> {
		if self.running.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		let cancel = CancellationToken::new();
		*self.cancel.lock() = Some(cancel.clone());

		let monitor = StatusMonitor {
			store: Arc::clone(&self.store),
			config: self.config.clone(),
			running: Arc::clone(&self.running),
			cancel: parking_lot::Mutex::new(None),
			task: tokio::sync::Mutex::new(None),
		};
		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = cancel.cancelled() => break,
					_ = tokio::time::sleep(monitor.config.interval) => {}
				}
				if cancel.is_cancelled() {
					break;
				}
				if let Err(err) = monitor.tick().await {
					warn!(%err, "status projection failed");
				}
			}
		});
		*self.task.lock().await = Some(task);
		Ok(())
	}

	async fn shutdown(&mut self) -> Result<()> {
		if !self.running.swap(false, Ordering::AcqRel) {
			return Ok(());
		}
		if let Some(cancel) = self.cancel.lock().take() {
			cancel.cancel();
		}
		if let Some(task) = self.task.lock().await.take() {
			let _ = task.await;
		}
		Ok(())
	}

	fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}

	fn health(&self) -> HealthStatus {
		HealthStatus::Healthy
	}
}
