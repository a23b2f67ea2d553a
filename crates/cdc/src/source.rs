// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	collections::HashMap,
	sync::{
		Arc, Weak,
		atomic::{AtomicU64, Ordering},
	},
	time::Duration,
};

use anchor_core::{
	CdcMechanism,
	interface::{
		PollChannel, ReplicationConfig, ReplicationOperator, ReplicationSource,
		ReplicationSourceState, ReplicationStatus,
	},
	transform,
};
use anchor_type::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const POLL_LIMIT: u32 = 256;
const IDLE_INTERVAL: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Key under which a channel's position is checkpointed.
pub fn channel_key(replication_id: &str, channel: &PollChannel) -> String {
	match channel {
		PollChannel::Stream => replication_id.to_string(),
		PollChannel::Table(table) => format!("{replication_id}/{table}"),
	}
}

/// Generic replication source driving one attachment through the
/// owning adapter's replication operator.
///
/// State machine: created → started → (running ↔ paused-on-error) →
/// stopped → closed. Every sleep is a cancellation point; `stop`
/// drains the in-flight batch and flushes a final checkpoint.
pub struct PollingSource {
	weak: Weak<PollingSource>,
	ops: Arc<dyn ReplicationOperator>,
	config: ReplicationConfig,
	mechanism: CdcMechanism,
	channels: Vec<PollChannel>,
	state: Mutex<ReplicationSourceState>,
	positions: Mutex<HashMap<String, Option<String>>>,
	events_processed: AtomicU64,
	error_count: AtomicU64,
	last_error: Mutex<Option<String>>,
	cancel: Mutex<Option<CancellationToken>>,
	tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl PollingSource {
	/// Build an inert source. One channel per table for trigger-based
	/// mechanisms, the single native stream otherwise.
	pub fn create(
		ops: Arc<dyn ReplicationOperator>,
		config: ReplicationConfig,
		mechanism: CdcMechanism,
	) -> Arc<Self> {
		let channels = match mechanism {
			// Change records live in per-table companion objects.
			CdcMechanism::TriggerBased | CdcMechanism::CdcTables => config
				.table_names
				.iter()
				.map(|t| PollChannel::Table(t.clone()))
				.collect(),
			_ => vec![PollChannel::Stream],
		};
		let positions = channels
			.iter()
			.map(|c| (channel_key(&config.replication_id, c), config.start_position.clone()))
			.collect();
		Arc::new_cyclic(|weak| Self {
			weak: weak.clone(),
			ops,
			config,
			mechanism,
			channels,
			state: Mutex::new(ReplicationSourceState::Created),
			positions: Mutex::new(positions),
			events_processed: AtomicU64::new(0),
			error_count: AtomicU64::new(0),
			last_error: Mutex::new(None),
			cancel: Mutex::new(None),
			tasks: tokio::sync::Mutex::new(Vec::new()),
		})
	}

	fn set_state(&self, state: ReplicationSourceState) {
		*self.state.lock() = state;
	}

	fn position_of(&self, key: &str) -> Option<String> {
		self.positions.lock().get(key).cloned().flatten()
	}

	/// Resolve start positions: an explicit `start_position` wins,
	/// otherwise the checkpoint store, otherwise the stream's tail.
	async fn resolve_positions(&self) -> Result<()> {
		let Some(store) = &self.config.checkpoint else {
			return Ok(());
		};
		for channel in &self.channels {
			let key = channel_key(&self.config.replication_id, channel);
			if self.position_of(&key).is_some() {
				continue;
			}
			if let Some(position) = store.load(&key).await? {
				debug!(%key, %position, "resumed position from checkpoint");
				self.positions.lock().insert(key, Some(position));
			}
		}
		Ok(())
	}

	/// One poll cycle on one channel. Returns the number of events
	/// emitted; the position only advances after every event of the
	/// batch was handled.
	async fn poll_once(&self, channel: &PollChannel) -> Result<usize> {
		let key = channel_key(&self.config.replication_id, channel);
		let position = self.position_of(&key);
		let batch = self.ops.fetch_changes(channel, position.as_deref(), POLL_LIMIT).await?;
		if batch.records.is_empty() {
			// Position-only batches (e.g. transaction markers) still
			// advance the checkpoint.
			if let Some(next) = batch.next_position {
				self.positions.lock().insert(key.clone(), Some(next.clone()));
				if let Some(store) = &self.config.checkpoint {
					store.save(&key, &next).await?;
				}
			}
			return Ok(0);
		}

		let mut emitted = 0usize;
		for raw in &batch.records {
			let mut event = self.ops.parse_event(raw)?;
			event.validate()?;
			if !self.config.rules.is_empty() {
				if let Some(data) = event.data.take() {
					event.data = Some(
						transform::apply_rules(
							&data,
							&self.config.rules,
							self.config.transform_endpoint.as_deref(),
						)
						.await,
					);
				}
			}
			(self.config.event_handler)(event).await?;
			emitted += 1;
			self.events_processed.fetch_add(1, Ordering::Relaxed);
		}

		if let Some(next) = batch.next_position {
			self.positions.lock().insert(key.clone(), Some(next.clone()));
			if let Some(store) = &self.config.checkpoint {
				store.save(&key, &next).await?;
			}
		}
		Ok(emitted)
	}

	async fn run_channel(self: Arc<Self>, channel: PollChannel, cancel: CancellationToken) {
		let mut backoff = IDLE_INTERVAL;
		loop {
			if cancel.is_cancelled() {
				break;
			}
			match self.poll_once(&channel).await {
				Ok(emitted) => {
					backoff = IDLE_INTERVAL;
					self.set_state(ReplicationSourceState::Running);
					if emitted > 0 {
						// Rows were returned: re-poll immediately.
						continue;
					}
					tokio::select! {
						_ = cancel.cancelled() => break,
						_ = tokio::time::sleep(IDLE_INTERVAL) => {}
					}
				}
				Err(err) => {
					self.error_count.fetch_add(1, Ordering::Relaxed);
					*self.last_error.lock() = Some(err.to_string());
					self.set_state(ReplicationSourceState::PausedOnError);
					warn!(
						source = %self.config.replication_id,
						channel = ?channel,
						%err,
						"poll failed, backing off"
					);
					tokio::select! {
						_ = cancel.cancelled() => break,
						_ = tokio::time::sleep(backoff) => {}
					}
					backoff = (backoff * 2).min(BACKOFF_CAP);
				}
			}
		}
	}

	async fn flush_checkpoints(&self) -> Result<()> {
		let Some(store) = &self.config.checkpoint else {
			return Ok(());
		};
		let snapshot: Vec<(String, String)> = self
			.positions
			.lock()
			.iter()
			.filter_map(|(k, v)| v.clone().map(|p| (k.clone(), p)))
			.collect();
		for (key, position) in snapshot {
			store.save(&key, &position).await?;
		}
		Ok(())
	}
}

#[async_trait]
impl ReplicationSource for PollingSource {
	fn source_id(&self) -> &str {
		&self.config.replication_id
	}

	fn database_id(&self) -> &str {
		&self.config.database_id
	}

	fn mechanism(&self) -> CdcMechanism {
		self.mechanism
	}

	fn is_active(&self) -> bool {
		matches!(
			*self.state.lock(),
			ReplicationSourceState::Started
				| ReplicationSourceState::Running
				| ReplicationSourceState::PausedOnError
		)
	}

	async fn start(&self) -> Result<()> {
		{
			let state = self.state.lock();
			match *state {
				ReplicationSourceState::Created | ReplicationSourceState::Stopped => {}
				ReplicationSourceState::Closed => {
					return Err(Error::invalid_data("source is closed"));
				}
				// Already running.
				_ => return Ok(()),
			}
		}
		self.resolve_positions().await?;

		let this = self
			.weak
			.upgrade()
			.ok_or_else(|| Error::internal("source dropped while starting"))?;
		let cancel = CancellationToken::new();
		let mut tasks = self.tasks.lock().await;
		for channel in &self.channels {
			tasks.push(tokio::spawn(Arc::clone(&this).run_channel(
				channel.clone(),
				cancel.child_token(),
			)));
		}
		*self.cancel.lock() = Some(cancel);
		self.set_state(ReplicationSourceState::Started);
		debug!(source = %self.config.replication_id, channels = self.channels.len(), "source started");
		Ok(())
	}

	async fn stop(&self) -> Result<()> {
		let cancel = self.cancel.lock().take();
		let Some(cancel) = cancel else {
			return Ok(());
		};
		cancel.cancel();
		let mut tasks = self.tasks.lock().await;
		for task in tasks.drain(..) {
			let _ = task.await;
		}
		self.flush_checkpoints().await?;
		self.set_state(ReplicationSourceState::Stopped);
		debug!(source = %self.config.replication_id, "source stopped");
		Ok(())
	}

	async fn close(&self) -> Result<()> {
		if *self.state.lock() == ReplicationSourceState::Closed {
			return Ok(());
		}
		self.stop().await?;
		self.set_state(ReplicationSourceState::Closed);
		Ok(())
	}

	fn get_position(&self) -> Option<String> {
		match self.channels.as_slice() {
			[channel] => {
				self.position_of(&channel_key(&self.config.replication_id, channel))
			}
			_ => None,
		}
	}

	fn set_position(&self, position: String) -> Result<()> {
		match self.channels.as_slice() {
			[channel] => {
				let key = channel_key(&self.config.replication_id, channel);
				self.positions.lock().insert(key, Some(position));
				Ok(())
			}
			_ => Err(Error::configuration(
				"set_position requires a single-channel source",
			)),
		}
	}

	async fn save_checkpoint(&self) -> Result<()> {
		self.flush_checkpoints().await
	}

	fn status(&self) -> ReplicationStatus {
		ReplicationStatus {
			state: *self.state.lock(),
			mechanism: self.mechanism,
			events_processed: self.events_processed.load(Ordering::Relaxed),
			error_count: self.error_count.load(Ordering::Relaxed),
			last_error: self.last_error.lock().clone(),
			position: self.get_position(),
		}
	}
}
