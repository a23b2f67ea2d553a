// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! PostgreSQL dialect adapter.
//!
//! Discovery reads `information_schema` and `pg_catalog`; CDC uses
//! logical decoding through a named slot with the `wal2json` plugin.

pub use replication::{PostgresReplication, lsn_from_text, lsn_to_text, slot_name_for};
pub use schema::unified_type;

mod data;
mod driver;
mod metadata;
mod replication;
mod schema;

use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use anchor_core::{
	ConnectionConfig, EngineKind,
	interface::{
		AdapterConnection, AdapterFactory, DataOperator, MetadataOperator, ReplicationOperator,
		SchemaOperator, decrypt_password, services::SecretService,
	},
	model::UnifiedModel,
};
use anchor_type::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::{
	data::PostgresData, driver::PgDriver, metadata::PostgresMetadata, schema::PostgresSchema,
};

pub struct PostgresConnection {
	database_id: String,
	driver: Arc<PgDriver>,
	connected: AtomicBool,
	schema_op: PostgresSchema,
	data_op: PostgresData,
	metadata_op: PostgresMetadata,
	replication_op: PostgresReplication,
	last_schema: parking_lot::Mutex<Option<UnifiedModel>>,
}

#[async_trait]
impl AdapterConnection for PostgresConnection {
	fn engine(&self) -> EngineKind {
		EngineKind::Postgres
	}

	fn database_id(&self) -> &str {
		&self.database_id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire) && !self.driver.is_closed()
	}

	async fn ping(&self) -> Result<()> {
		if !self.connected.load(Ordering::Acquire) {
			return Err(Error::connection("connection is closed").with_engine("postgres"));
		}
		self.driver.ping().await
	}

	async fn close(&self) -> Result<()> {
		self.connected.store(false, Ordering::Release);
		debug!(database_id = %self.database_id, "postgres connection closed");
		Ok(())
	}

	fn schema(&self) -> &dyn SchemaOperator {
		&self.schema_op
	}

	fn data(&self) -> &dyn DataOperator {
		&self.data_op
	}

	fn metadata(&self) -> &dyn MetadataOperator {
		&self.metadata_op
	}

	fn replication(&self) -> &dyn ReplicationOperator {
		&self.replication_op
	}

	fn last_schema(&self) -> Option<UnifiedModel> {
		self.last_schema.lock().clone()
	}

	fn set_last_schema(&self, model: UnifiedModel) {
		*self.last_schema.lock() = Some(model);
	}
}

pub struct PostgresFactory;

#[async_trait]
impl AdapterFactory for PostgresFactory {
	fn engine(&self) -> EngineKind {
		EngineKind::Postgres
	}

	async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		let password = decrypt_password(config, secrets).await?;
		let driver = PgDriver::open(config, &password).await?;

		if let Err(err) = driver.ping().await {
			return Err(Error::connection(format!("postgres ping failed: {err}"))
				.with_engine("postgres")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string()));
		}

		Ok(Arc::new(PostgresConnection {
			database_id: config.database_id.clone(),
			schema_op: PostgresSchema {
				driver: Arc::clone(&driver),
			},
			data_op: PostgresData {
				driver: Arc::clone(&driver),
			},
			metadata_op: PostgresMetadata {
				driver: Arc::clone(&driver),
				database_name: config.database_name.clone(),
			},
			replication_op: PostgresReplication {
				driver: Arc::clone(&driver),
				slot_name: Arc::new(parking_lot::Mutex::new(None)),
			},
			driver,
			connected: AtomicBool::new(true),
			last_schema: parking_lot::Mutex::new(None),
		}))
	}
}
