// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! MySQL dialect adapter. Trigger-based CDC through `<table>_CHANGE_LOG`
//! companion tables; backtick quoting; `REPLACE INTO` upserts.

pub use replication::MysqlReplication;
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

use crate::{data::MysqlData, driver::MysqlDriver, metadata::MysqlMetadata, schema::MysqlSchema};

pub struct MysqlConnection {
	database_id: String,
	driver: Arc<MysqlDriver>,
	connected: AtomicBool,
	schema_op: MysqlSchema,
	data_op: MysqlData,
	metadata_op: MysqlMetadata,
	replication_op: MysqlReplication,
	last_schema: parking_lot::Mutex<Option<UnifiedModel>>,
}

#[async_trait]
impl AdapterConnection for MysqlConnection {
	fn engine(&self) -> EngineKind {
		EngineKind::Mysql
	}

	fn database_id(&self) -> &str {
		&self.database_id
	}

	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Acquire)
	}

	async fn ping(&self) -> Result<()> {
		if !self.connected.load(Ordering::Acquire) {
			return Err(Error::connection("connection is closed").with_engine("mysql"));
		}
		self.driver.ping().await
	}

	async fn close(&self) -> Result<()> {
		if self.connected.swap(false, Ordering::AcqRel) {
			self.driver.close().await?;
		}
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

pub struct MysqlFactory;

#[async_trait]
impl AdapterFactory for MysqlFactory {
	fn engine(&self) -> EngineKind {
		EngineKind::Mysql
	}

	async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		let password = decrypt_password(config, secrets).await?;
		let driver = Arc::new(MysqlDriver::open(config, &password)?);

		if let Err(err) = driver.ping().await {
			let _ = driver.close().await;
			return Err(Error::connection(format!("mysql ping failed: {err}"))
				.with_engine("mysql")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string()));
		}

		Ok(Arc::new(MysqlConnection {
			database_id: config.database_id.clone(),
			schema_op: MysqlSchema {
				driver: Arc::clone(&driver),
			},
			data_op: MysqlData {
				driver: Arc::clone(&driver),
			},
			metadata_op: MysqlMetadata {
				driver: Arc::clone(&driver),
				database_name: config.database_name.clone(),
			},
			replication_op: MysqlReplication {
				driver: Arc::clone(&driver),
			},
			driver,
			connected: AtomicBool::new(true),
			last_schema: parking_lot::Mutex::new(None),
		}))
	}
}
