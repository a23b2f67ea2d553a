// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_core::{
	ConnectionConfig, EngineKind, InstanceConfig,
	interface::{AdapterConnection, AdapterFactory, services::SecretService},
};
use anchor_type::{Error, Result};
use dashmap::DashMap;
use tracing::debug;

/// Registration surface mapping an engine kind to its adapter
/// factory. Compiled-in dialects self-register through
/// [`FactoryRegistry::with_builtin`].
#[derive(Default)]
pub struct FactoryRegistry {
	factories: DashMap<EngineKind, Arc<dyn AdapterFactory>>,
}

impl FactoryRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry pre-populated with every dialect this build carries.
	pub fn with_builtin() -> Self {
		let registry = Self::new();
		#[cfg(feature = "postgres")]
		registry.register(Arc::new(anchor_dialect_postgres::PostgresFactory));
		#[cfg(feature = "mysql")]
		registry.register(Arc::new(anchor_dialect_mysql::MysqlFactory));
		#[cfg(feature = "sqlserver")]
		registry.register(Arc::new(anchor_dialect_sqlserver::SqlServerFactory));
		#[cfg(feature = "db2")]
		registry.register(Arc::new(anchor_dialect_db2::Db2Factory));
		#[cfg(feature = "iceberg")]
		registry.register(Arc::new(anchor_dialect_iceberg::IcebergFactory));
		registry
	}

	/// Later registrations for the same engine replace earlier ones.
	pub fn register(&self, factory: Arc<dyn AdapterFactory>) {
		debug!(engine = %factory.engine(), "adapter factory registered");
		self.factories.insert(factory.engine(), factory);
	}

	pub fn supported_engines(&self) -> Vec<EngineKind> {
		self.factories.iter().map(|e| *e.key()).collect()
	}

	fn factory(&self, engine: EngineKind) -> Result<Arc<dyn AdapterFactory>> {
		self.factories.get(&engine).map(|e| Arc::clone(e.value())).ok_or_else(|| {
			Error::configuration(format!("no adapter compiled in for engine '{engine}'"))
				.with_engine(engine.to_string())
		})
	}

	/// Open a database connection with the adapter the config selects.
	pub async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		config.validate()?;
		self.factory(config.engine_kind)?.connect(config, secrets).await
	}

	/// Open an instance-scoped connection.
	pub async fn connect_instance(
		&self,
		config: &InstanceConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		config.connection.validate()?;
		self.factory(config.connection.engine_kind)?.connect_instance(config, secrets).await
	}
}
