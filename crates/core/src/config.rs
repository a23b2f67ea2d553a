// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	fmt::{Display, Formatter},
	str::FromStr,
};

use anchor_type::{Error, Result};
use serde::{Deserialize, Serialize};

/// Closed set of engines the service can anchor. Selecting the dialect
/// adapter is the only thing the name is used for; every other
/// decision goes through [`crate::capability::Capabilities`].
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
	Postgres,
	Mysql,
	Sqlserver,
	Db2,
	Iceberg,
}

impl EngineKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EngineKind::Postgres => "postgres",
			EngineKind::Mysql => "mysql",
			EngineKind::Sqlserver => "sqlserver",
			EngineKind::Db2 => "db2",
			EngineKind::Iceberg => "iceberg",
		}
	}

	pub fn all() -> &'static [EngineKind] {
		&[
			EngineKind::Postgres,
			EngineKind::Mysql,
			EngineKind::Sqlserver,
			EngineKind::Db2,
			EngineKind::Iceberg,
		]
	}
}

impl Display for EngineKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for EngineKind {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"postgres" | "postgresql" => Ok(EngineKind::Postgres),
			"mysql" | "mariadb" => Ok(EngineKind::Mysql),
			"sqlserver" | "mssql" => Ok(EngineKind::Sqlserver),
			"db2" => Ok(EngineKind::Db2),
			"iceberg" => Ok(EngineKind::Iceberg),
			other => Err(Error::configuration(format!("unknown engine kind '{other}'"))),
		}
	}
}

/// TLS options as stored on the connection record. Absent fields keep
/// their presence bit; defaults are applied by the dialect adapter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslConfig {
	pub enabled: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mode: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reject_unauthorized: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub cert: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub root_cert: Option<String>,
}

/// Everything needed to open one database connection on behalf of a
/// tenant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
	pub database_id: String,
	pub workspace_id: String,
	pub tenant_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instance_id: Option<String>,
	pub vendor: String,
	pub engine_kind: EngineKind,
	pub host: String,
	pub port: u16,
	pub username: String,
	pub encrypted_password: String,
	pub database_name: String,
	#[serde(default)]
	pub ssl: SslConfig,
	pub role: String,
	pub node_id: String,
	pub owner_id: String,
}

impl ConnectionConfig {
	/// The password can only be decrypted within a tenant scope.
	pub fn validate(&self) -> Result<()> {
		if self.tenant_id.is_empty() {
			return Err(Error::configuration("tenant_id is required to decrypt credentials")
				.with_context("database_id", self.database_id.clone()));
		}
		if self.host.is_empty() {
			return Err(Error::configuration("host must not be empty")
				.with_context("database_id", self.database_id.clone()));
		}
		Ok(())
	}
}

/// Superset of [`ConnectionConfig`] for instance-scoped operations
/// such as listing or creating databases.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstanceConfig {
	#[serde(flatten)]
	pub connection: ConnectionConfig,
	pub unique_identifier: String,
	pub version: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_engine_kind_round_trip() {
		for kind in EngineKind::all() {
			assert_eq!(kind.as_str().parse::<EngineKind>().unwrap(), *kind);
		}
		assert_eq!("POSTGRESQL".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
		assert!("oracle9".parse::<EngineKind>().is_err());
	}

	#[test]
	fn test_validate_requires_tenant() {
		let config = ConnectionConfig {
			database_id: "db-1".into(),
			workspace_id: "ws-1".into(),
			tenant_id: String::new(),
			instance_id: None,
			vendor: "postgres".into(),
			engine_kind: EngineKind::Postgres,
			host: "localhost".into(),
			port: 5432,
			username: "anchor".into(),
			encrypted_password: "enc:abc".into(),
			database_name: "app".into(),
			ssl: SslConfig::default(),
			role: "primary".into(),
			node_id: "node-1".into(),
			owner_id: "owner-1".into(),
		};
		assert!(config.validate().is_err());
	}
}
