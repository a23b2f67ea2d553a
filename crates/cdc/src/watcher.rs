// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{collections::HashMap, sync::Arc};

use anchor_core::interface::{AdapterConnection, ReplicationConfig, ReplicationSource};
use anchor_type::{Error, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Recorded state of one attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceStatus {
	Active,
	Error,
	Stopped,
}

#[derive(Clone)]
pub struct SourceEntry {
	pub replication_id: String,
	pub database_id: String,
	pub status: SourceStatus,
	pub message: Option<String>,
	pub source: Option<Arc<dyn ReplicationSource>>,
}

/// Supervises replication attachments across databases.
///
/// Engines that report replication as unsupported are recorded with
/// an error status and the message attached; the caller proceeds to
/// its next source. Recoverable source errors stay visible through
/// the entry until the next successful poll.
#[derive(Default)]
pub struct ReplicationWatcher {
	entries: RwLock<HashMap<String, SourceEntry>>,
}

impl ReplicationWatcher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Attach and start a replication source on `conn`. Every failure
	/// is recorded before it is returned.
	pub async fn attach(
		&self,
		conn: &dyn AdapterConnection,
		config: ReplicationConfig,
	) -> Result<Arc<dyn ReplicationSource>> {
		let replication_id = config.replication_id.clone();
		let database_id = config.database_id.clone();
		let replication = conn.replication();

		if !replication.is_supported() {
			let err = Error::unsupported("replication")
				.with_engine(conn.engine().to_string())
				.with_context("database_id", database_id.clone());
			self.record_error(&replication_id, &database_id, &err);
			return Err(err);
		}

		if let Err(err) = replication.check_prerequisites().await {
			self.record_error(&replication_id, &database_id, &err);
			return Err(err);
		}

		let source = match replication.connect(config).await {
			Ok(source) => source,
			Err(err) => {
				self.record_error(&replication_id, &database_id, &err);
				return Err(err);
			}
		};

		if let Err(err) = source.start().await {
			self.record_error(&replication_id, &database_id, &err);
			return Err(err);
		}

		debug!(%replication_id, %database_id, "replication source attached");
		self.entries.write().insert(
			replication_id.clone(),
			SourceEntry {
				replication_id,
				database_id,
				status: SourceStatus::Active,
				message: None,
				source: Some(Arc::clone(&source)),
			},
		);
		Ok(source)
	}

	fn record_error(&self, replication_id: &str, database_id: &str, err: &Error) {
		warn!(replication_id, database_id, %err, "replication source failed");
		self.entries.write().insert(
			replication_id.to_string(),
			SourceEntry {
				replication_id: replication_id.to_string(),
				database_id: database_id.to_string(),
				status: SourceStatus::Error,
				message: Some(err.to_string()),
				source: None,
			},
		);
	}

	/// Stop and close one attachment.
	pub async fn detach(&self, replication_id: &str) -> Result<()> {
		let source = {
			let entries = self.entries.read();
			entries.get(replication_id).and_then(|e| e.source.clone())
		};
		let Some(source) = source else {
			return Err(Error::not_found(format!(
				"no replication source '{replication_id}'"
			)));
		};
		source.close().await?;
		let mut entries = self.entries.write();
		if let Some(entry) = entries.get_mut(replication_id) {
			entry.status = SourceStatus::Stopped;
			entry.source = None;
		}
		Ok(())
	}

	pub fn entry(&self, replication_id: &str) -> Option<SourceEntry> {
		self.entries.read().get(replication_id).cloned()
	}

	pub fn entries(&self) -> Vec<SourceEntry> {
		self.entries.read().values().cloned().collect()
	}

	pub async fn stop_all(&self) {
		let sources: Vec<(String, Arc<dyn ReplicationSource>)> = self
			.entries
			.read()
			.iter()
			.filter_map(|(id, e)| e.source.clone().map(|s| (id.clone(), s)))
			.collect();
		for (id, source) in sources {
			if let Err(err) = source.close().await {
				warn!(replication_id = %id, %err, "failed to close replication source");
			}
			let mut entries = self.entries.write();
			if let Some(entry) = entries.get_mut(&id) {
				entry.status = SourceStatus::Stopped;
				entry.source = None;
			}
		}
	}
}
