// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::interface::AdapterConnection;
use anchor_type::{Error, Result};
use dashmap::DashMap;
use tracing::debug;

/// Process-wide mapping from database ids (and separately instance
/// ids) to live adapter connections.
///
/// Reads never block each other; register/close are exclusive per
/// entry. Once registered, the registry owns the connection.
#[derive(Default)]
pub struct ConnectionRegistry {
	databases: DashMap<String, Arc<dyn AdapterConnection>>,
	instances: DashMap<String, Arc<dyn AdapterConnection>>,
}

impl ConnectionRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, database_id: &str, conn: Arc<dyn AdapterConnection>) -> Result<()> {
		match self.databases.entry(database_id.to_string()) {
			dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::already_exists(format!(
				"connection for database '{database_id}' already registered"
			))),
			dashmap::mapref::entry::Entry::Vacant(entry) => {
				debug!(database_id, engine = %conn.engine(), "connection registered");
				entry.insert(conn);
				Ok(())
			}
		}
	}

	pub fn get(&self, database_id: &str) -> Option<Arc<dyn AdapterConnection>> {
		self.databases.get(database_id).map(|e| Arc::clone(e.value()))
	}

	pub fn list_ids(&self) -> Vec<String> {
		self.databases.iter().map(|e| e.key().clone()).collect()
	}

	/// Close the connection and drop it from the registry. Closing an
	/// unknown id is a `not_found`.
	pub async fn close(&self, database_id: &str) -> Result<()> {
		let Some((_, conn)) = self.databases.remove(database_id) else {
			return Err(Error::not_found(format!(
				"no connection registered for database '{database_id}'"
			)));
		};
		conn.close().await?;
		debug!(database_id, "connection closed");
		Ok(())
	}

	pub fn register_instance(
		&self,
		instance_id: &str,
		conn: Arc<dyn AdapterConnection>,
	) -> Result<()> {
		match self.instances.entry(instance_id.to_string()) {
			dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::already_exists(format!(
				"connection for instance '{instance_id}' already registered"
			))),
			dashmap::mapref::entry::Entry::Vacant(entry) => {
				entry.insert(conn);
				Ok(())
			}
		}
	}

	pub fn get_instance(&self, instance_id: &str) -> Option<Arc<dyn AdapterConnection>> {
		self.instances.get(instance_id).map(|e| Arc::clone(e.value()))
	}

	pub fn list_instance_ids(&self) -> Vec<String> {
		self.instances.iter().map(|e| e.key().clone()).collect()
	}

	pub async fn close_instance(&self, instance_id: &str) -> Result<()> {
		let Some((_, conn)) = self.instances.remove(instance_id) else {
			return Err(Error::not_found(format!(
				"no connection registered for instance '{instance_id}'"
			)));
		};
		conn.close().await
	}
}
