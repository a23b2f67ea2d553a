// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	sync::{
		Arc,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
	time::Duration,
};

use anchor_adapter::ConnectionRegistry;
use anchor_core::{
	interface::{
		AdapterConnection,
		services::{AnalysisService, RegistryStore, SchemaComparison, SchemaRepo},
	},
	model::UnifiedModel,
	resource::database_uri_prefix,
};
use anchor_sub_api::{HealthStatus, Subsystem};
use anchor_sub_registry::Reconciler;
use anchor_type::{Error, Result};
use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::repo::ensure_repo_branch_commit;

#[derive(Clone, Debug)]
pub struct SchemaWatcherConfig {
	pub interval: Duration,
	/// Soft deadline per database so one slow engine cannot starve
	/// the tick.
	pub per_database_deadline: Duration,
}

impl Default for SchemaWatcherConfig {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(10),
			per_database_deadline: Duration::from_secs(30),
		}
	}
}

/// Flip `validated` off for exactly the mappings whose rule targets a
/// URI under this database; every other mapping is left alone.
pub async fn invalidate_mappings_for_database(
	store: &dyn RegistryStore,
	database_id: &str,
) -> Result<usize> {
	let prefix = database_uri_prefix(database_id);
	let mut invalidated = 0;
	for mapping in store.list_mappings().await? {
		if !mapping.validated {
			continue;
		}
		if mapping.target_uris().iter().any(|uri| uri.starts_with(&prefix)) {
			store.invalidate_mapping(&mapping.mapping_id).await?;
			invalidated += 1;
		}
	}
	Ok(invalidated)
}

pub struct SchemaWatcher {
	connections: Arc<ConnectionRegistry>,
	analysis: Arc<dyn AnalysisService>,
	repo: Arc<dyn SchemaRepo>,
	store: Arc<dyn RegistryStore>,
	reconciler: Reconciler,
	config: SchemaWatcherConfig,
	running: Arc<AtomicBool>,
	last_tick_errors: Arc<AtomicUsize>,
	cancel: parking_lot::Mutex<Option<CancellationToken>>,
	task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SchemaWatcher {
	pub fn new(
		connections: Arc<ConnectionRegistry>,
		analysis: Arc<dyn AnalysisService>,
		repo: Arc<dyn SchemaRepo>,
		store: Arc<dyn RegistryStore>,
		config: SchemaWatcherConfig,
	) -> Self {
		Self {
			reconciler: Reconciler::new(Arc::clone(&store)),
			connections,
			analysis,
			repo,
			store,
			config,
			running: Arc::new(AtomicBool::new(false)),
			last_tick_errors: Arc::new(AtomicUsize::new(0)),
			cancel: parking_lot::Mutex::new(None),
			task: tokio::sync::Mutex::new(None),
		}
	}

	/// One pass over every registered database. Errors are local to
	/// their database; the tick itself never fails.
	pub async fn tick(&self, cancel: &CancellationToken) -> usize {
		let mut errors = 0;
		for database_id in self.connections.list_ids() {
			if cancel.is_cancelled() {
				break;
			}
			let outcome = tokio::time::timeout(
				self.config.per_database_deadline,
				self.process_database(&database_id),
			)
			.await;
			match outcome {
				Ok(Ok(())) => {}
				Ok(Err(err)) => {
					warn!(%database_id, %err, "schema watch failed");
					errors += 1;
				}
				Err(_) => {
					warn!(
						%database_id,
						deadline = ?self.config.per_database_deadline,
						"schema watch deadline exceeded"
					);
					errors += 1;
				}
			}
		}
		self.last_tick_errors.store(errors, Ordering::Relaxed);
		errors
	}

	#[instrument(name = "schema_watcher::process", level = "debug", skip(self))]
	async fn process_database(&self, database_id: &str) -> Result<()> {
		let Some(conn) = self.connections.get(database_id) else {
			return Err(Error::not_found(format!(
				"connection '{database_id}' disappeared during tick"
			)));
		};

		let current = conn.schema().discover_schema().await?;
		let previous = self.previous_schema(conn.as_ref(), database_id).await;

		let comparison = match &previous {
			Some(previous) => {
				match self.analysis.compare_unified_models(previous, &current).await {
					Ok(comparison) => comparison,
					Err(err) => {
						// A broken comparison must not block
						// versioning; record and treat as changed.
						warn!(database_id, %err, "model comparison failed");
						self.store
							.set_database_health(
								database_id,
								&format!("schema comparison failed: {err}"),
							)
							.await?;
						SchemaComparison {
							has_changes: true,
							changes: Vec::new(),
							warnings: vec![err.to_string()],
						}
					}
				}
			}
			None => SchemaComparison::default(),
		};

		let first_sight = previous.is_none();
		if comparison.has_changes || first_sight {
			self.commit_and_invalidate(database_id, &conn, &current, &comparison).await?;
		} else {
			// Keep last-seen fresh even without changes. No enrichment
			// here: the descriptions stored on the last commit stand.
			self.reconciler.reconcile(database_id, &current, None).await?;
		}

		conn.set_last_schema(current);
		Ok(())
	}

	async fn previous_schema(
		&self,
		conn: &dyn AdapterConnection,
		database_id: &str,
	) -> Option<UnifiedModel> {
		if let Some(cached) = conn.last_schema() {
			return Some(cached);
		}
		let info = self.repo.find_repo_for_database(database_id).await.ok().flatten()?;
		let commit =
			self.repo.latest_commit(&info.repo_id, &info.default_branch_id).await.ok().flatten()?;
		match UnifiedModel::from_payload(&commit.schema_json) {
			Ok(model) => Some(model),
			Err(err) => {
				warn!(database_id, %err, "stored commit payload unreadable");
				None
			}
		}
	}

	async fn commit_and_invalidate(
		&self,
		database_id: &str,
		conn: &Arc<dyn AdapterConnection>,
		current: &UnifiedModel,
		comparison: &SchemaComparison,
	) -> Result<()> {
		let database_name = self
			.store
			.list_databases()
			.await?
			.into_iter()
			.find(|row| row.database_id == database_id)
			.map(|row| row.name)
			.unwrap_or_else(|| database_id.to_string());

		// Enrichment failures degrade to a commit without enrichment,
		// surfaced on the database health note.
		let enrichment = match self
			.analysis
			.analyze_schema_enriched(conn.engine(), current)
			.await
		{
			Ok(enrichment) => {
				self.store.set_database_health(database_id, "").await?;
				Some(enrichment)
			}
			Err(err) => {
				warn!(database_id, %err, "schema enrichment failed");
				self.store
					.set_database_health(
						database_id,
						&format!("schema enrichment failed: {err}"),
					)
					.await?;
				None
			}
		};

		let message = if comparison.changes.is_empty() {
			"Initial schema discovery".to_string()
		} else {
			format!("Schema update: {} change(s)", comparison.changes.len())
		};
		let commit = ensure_repo_branch_commit(
			self.repo.as_ref(),
			database_id,
			&database_name,
			conn.engine(),
			current,
			enrichment.clone(),
			&message,
		)
		.await?;
		self.store.set_database_schema_cache(database_id, &commit.schema_json).await?;

		self.reconciler.reconcile(database_id, current, enrichment.as_ref()).await?;

		let invalidated = invalidate_mappings_for_database(self.store.as_ref(), database_id).await?;
		info!(
			database_id,
			commit = commit.commit_id,
			invalidated_mappings = invalidated,
			"schema change committed"
		);
		Ok(())
	}
}

#[async_trait]
impl Subsystem for SchemaWatcher {
	fn name(&self) -> &'static str {
		"SchemaWatcher"
	}

	async fn start(&mut self) -> Result<()> {
		if self.running.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		let cancel = CancellationToken::new();
		*self.cancel.lock() = Some(cancel.clone());

		// The loop borrows nothing from `self` that can move; clone
		// the shared pieces into the task.
		let watcher = SchemaWatcher {
			connections: Arc::clone(&self.connections),
			analysis: Arc::clone(&self.analysis),
			repo: Arc::clone(&self.repo),
			store: Arc::clone(&self.store),
			reconciler: Reconciler::new(Arc::clone(&self.store)),
			config: self.config.clone(),
			running: Arc::clone(&self.running),
			last_tick_errors: Arc::clone(&self.last_tick_errors),
			cancel: parking_lot::Mutex::new(None),
			task: tokio::sync::Mutex::new(None),
		};
		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = cancel.cancelled() => break,
					_ = tokio::time::sleep(watcher.config.interval) => {}
				}
				if cancel.is_cancelled() {
					break;
				}
				watcher.tick(&cancel).await;
			}
			debug!("schema watcher loop exited");
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
		match self.last_tick_errors.load(Ordering::Relaxed) {
			0 => HealthStatus::Healthy,
			errors => HealthStatus::Degraded {
				reason: format!("{errors} database(s) failed on the last tick"),
			},
		}
	}
}
