// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! DB2 dialect adapter over ODBC. SYSCAT discovery, trigger-based CDC
//! through `<table>_CHANGE_LOG` companions, MERGE upserts with
//! double-bound parameters.

pub use driver::connection_string;
pub use replication::{Db2Replication, change_log_ddl, trigger_ddl};
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

use crate::{data::Db2Data, driver::Db2Driver, metadata::Db2Metadata, schema::Db2Schema};

pub struct Db2Connection {
	database_id: String,
	driver: Arc<Db2Driver>,
	connected: AtomicBool,
	schema_op: Db2Schema,
	data_op: Db2Data,
	metadata_op: Db2Metadata,
	replication_op: Db2Replication,
	last_schema: parking_lot::Mutex<Option<UnifiedModel>>,
}

#[async_trait]
impl AdapterConnection for Db2Connection {
	fn engine(&self) -> EngineKind {
		EngineKind::Db2
	}

	fn database_id(&self) -> &str {
		&self.database_id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire)
	}

	async fn ping(&self) -> Result<()> {
		if !self.connected.load(Ordering::Acquire) {
			return Err(Error::connection("connection is closed").with_engine("db2"));
		}
		self.driver.ping().await
	}

	async fn close(&self) -> Result<()> {
		self.connected.store(false, Ordering::Release);
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

pub struct Db2Factory;

#[async_trait]
impl AdapterFactory for Db2Factory {
	fn engine(&self) -> EngineKind {
		EngineKind::Db2
	}

	async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		let password = decrypt_password(config, secrets).await?;
		let driver = Arc::new(Db2Driver::open(config, &password).await?);

		if let Err(err) = driver.ping().await {
			return Err(Error::connection(format!("db2 ping failed: {err}"))
				.with_engine("db2")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string()));
		}

		Ok(Arc::new(Db2Connection {
			database_id: config.database_id.clone(),
			schema_op: Db2Schema {
				driver: Arc::clone(&driver),
			},
			data_op: Db2Data {
				driver: Arc::clone(&driver),
			},
			metadata_op: Db2Metadata {
				driver: Arc::clone(&driver),
				database_name: config.database_name.clone(),
			},
			replication_op: Db2Replication {
				driver: Arc::clone(&driver),
			},
			driver,
			connected: AtomicBool::new(true),
			last_schema: parking_lot::Mutex::new(None),
		}))
	}
}
