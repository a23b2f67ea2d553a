// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::sync::Arc;

use anchor_type::{Error, Result};
use async_trait::async_trait;

use crate::{
	config::{ConnectionConfig, EngineKind, InstanceConfig},
	interface::{operator::AdapterConnection, services::SecretService},
};

/// First phase of every connection bootstrap: resolve the stored
/// credential within the tenant scope. Failures are configuration
/// errors carrying engine, host and port so operators can place them.
pub async fn decrypt_password(
	config: &ConnectionConfig,
	secrets: &dyn SecretService,
) -> Result<String> {
	secrets.decrypt(&config.tenant_id, &config.encrypted_password).await.map_err(|err| {
		Error::configuration(format!("credential decryption failed: {err}"))
			.with_engine(config.engine_kind.to_string())
			.with_context("host", config.host.clone())
			.with_context("port", config.port.to_string())
			.with_context("database_id", config.database_id.clone())
	})
}

/// Builds live connections for one engine kind.
///
/// Every implementation follows the same phases: decrypt the password
/// through the secret service, assemble the engine's connection
/// string, open the driver handle, ping. Any failure closes the
/// handle and yields a `connection_error` carrying engine, host and
/// port.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
	fn engine(&self) -> EngineKind;

	async fn connect(
		&self,
		config: &ConnectionConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>>;

	/// Instance-scoped connection for listing/creating/dropping
	/// databases. Defaults to the plain connection.
	async fn connect_instance(
		&self,
		config: &InstanceConfig,
		secrets: &dyn SecretService,
	) -> Result<Arc<dyn AdapterConnection>> {
		self.connect(&config.connection, secrets).await
	}
}
