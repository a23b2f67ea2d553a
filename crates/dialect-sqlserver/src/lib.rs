// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! SQL Server dialect adapter. Discovery over `sys.*` catalog views,
//! CDC through change tables, bracketed identifiers, MERGE upserts.

pub use replication::{SqlServerReplication, capture_instance};
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

use crate::{
	data::SqlServerData, driver::SqlServerDriver, metadata::SqlServerMetadata,
	schema::SqlServerSchema,
};

pub struct SqlServerConnection {
	database_id: String,
	driver: Arc<SqlServerDriver>,
	connected: AtomicBool,
	schema_op: SqlServerSchema,
	data_op: SqlServerData,
	metadata_op: SqlServerMetadata,
	replication_op: SqlServerReplication,
	last_schema: parking_lot::Mutex<Option<UnifiedModel>>,
}

#[async_trait]
impl AdapterConnection for SqlServerConnection {
	fn engine(&self) -> EngineKind {
		EngineKind::Sqlserver
	}

	fn database_id(&self) -> &str {
		&self.database_id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire)
	}

	async fn ping(&self) -> Result<()> {
		if !self.connected.load(Ordering::Acquire) {
			return Err(Error::connection("connection is closed").with_engine("sqlserver"));
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

pub struct SqlServerFactory;

#[async_trait]
impl AdapterFactory for SqlServerFactory {
	fn engine(&self) -> EngineKind {
		EngineKind::Sqlserver
	}

	async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		let password = decrypt_password(config, secrets).await?;
		let driver = Arc::new(SqlServerDriver::open(config, &password).await?);

		if let Err(err) = driver.ping().await {
			return Err(Error::connection(format!("sqlserver ping failed: {err}"))
				.with_engine("sqlserver")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string()));
		}

		Ok(Arc::new(SqlServerConnection {
			database_id: config.database_id.clone(),
			schema_op: SqlServerSchema {
				driver: Arc::clone(&driver),
			},
			data_op: SqlServerData {
				driver: Arc::clone(&driver),
			},
			metadata_op: SqlServerMetadata {
				driver: Arc::clone(&driver),
				database_name: config.database_name.clone(),
			},
			replication_op: SqlServerReplication {
				driver: Arc::clone(&driver),
			},
			driver,
			connected: AtomicBool::new(true),
			last_schema: parking_lot::Mutex::new(None),
		}))
	}
}
