// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::ConnectionConfig;
use anchor_type::{Error, Result, Row, Value};
use chrono::{DateTime, NaiveDateTime, Utc};
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

type TdsClient = Client<Compat<TcpStream>>;

/// Assemble the ADO-style connection string:
/// `server=<h>;port=<p>;database=<db>;user id=<u>;password=<pw>;`
/// `encrypt=<true|false>;trustservercertificate=<true|false>`.
pub fn connection_string(config: &ConnectionConfig, password: &str) -> String {
	let trust = config.ssl.reject_unauthorized == Some(false);
	format!(
		"server={};port={};database={};user id={};password={};encrypt={};trustservercertificate={}",
		config.host,
		config.port,
		config.database_name,
		config.username,
		password,
		config.ssl.enabled,
		trust,
	)
}

/// One TDS session guarded by a mutex; tiberius clients are
/// single-statement at a time.
pub struct SqlServerDriver {
	client: tokio::sync::Mutex<TdsClient>,
}

impl SqlServerDriver {
	pub async fn open(config: &ConnectionConfig, password: &str) -> Result<Self> {
		let conn_str = connection_string(config, password);
		let mut tds = Config::from_ado_string(&conn_str).map_err(|e| {
			Error::configuration(format!("malformed connection string: {e}"))
				.with_engine("sqlserver")
		})?;
		// The port travels as its own key; pin it on the parsed
		// config as well.
		tds.port(config.port);
		tds.authentication(AuthMethod::sql_server(&config.username, password));
		if config.ssl.enabled {
			tds.encryption(EncryptionLevel::Required);
			if config.ssl.reject_unauthorized == Some(false) {
				tds.trust_cert();
			}
		} else {
			tds.encryption(EncryptionLevel::NotSupported);
		}

		let connect_err = |message: String| {
			Error::connection(message)
				.with_engine("sqlserver")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string())
		};

		let tcp = TcpStream::connect(tds.get_addr())
			.await
			.map_err(|e| connect_err(format!("tcp connect failed: {e}")))?;
		tcp.set_nodelay(true)
			.map_err(|e| connect_err(format!("tcp configuration failed: {e}")))?;
		let client = Client::connect(tds, tcp.compat_write())
			.await
			.map_err(|e| connect_err(format!("tds handshake failed: {e}")))?;
		debug!(host = %config.host, "sqlserver session established");
		Ok(Self {
			client: tokio::sync::Mutex::new(client),
		})
	}

	fn wrap(operation: &str, err: tiberius::error::Error) -> Error {
		Error::internal(format!("sqlserver statement failed: {err}"))
			.with_engine("sqlserver")
			.with_operation(operation.to_string())
	}

	pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
		let params = to_params(args);
		let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
		let mut client = self.client.lock().await;
		let stream =
			client.query(sql, &refs).await.map_err(|e| Self::wrap("query", e))?;
		let rows = stream.into_first_result().await.map_err(|e| Self::wrap("query", e))?;
		Ok(rows.iter().map(convert_row).collect())
	}

	pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
		let params = to_params(args);
		let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
		let mut client = self.client.lock().await;
		let result =
			client.execute(sql, &refs).await.map_err(|e| Self::wrap("execute", e))?;
		Ok(result.total())
	}

	pub async fn batch(&self, sql: &str) -> Result<()> {
		let mut client = self.client.lock().await;
		client.simple_query(sql).await.map_err(|e| Self::wrap("batch", e))?;
		Ok(())
	}

	pub async fn ping(&self) -> Result<()> {
		self.query("SELECT 1 AS ok", &[]).await.map(|_| ())
	}
}

fn to_params(args: &[Value]) -> Vec<Box<dyn ToSql>> {
	args.iter()
		.map(|value| -> Box<dyn ToSql> {
			match value {
				Value::Undefined => Box::new(Option::<String>::None),
				Value::Bool(v) => Box::new(*v),
				Value::Int(v) => Box::new(*v),
				Value::Float(v) => Box::new(*v),
				Value::Text(v) => Box::new(v.clone()),
				Value::Bytes(v) => Box::new(v.clone()),
				Value::Timestamp(v) => Box::new(v.naive_utc()),
				Value::Array(_) | Value::Object(_) => {
					Box::new(value.to_json().to_string())
				}
			}
		})
		.collect()
}

pub fn convert_row(row: &tiberius::Row) -> Row {
	let mut out = Row::new();
	for (i, column) in row.columns().iter().enumerate() {
		out.insert(column.name().to_string(), convert_value(row, i));
	}
	out
}

/// tiberius exposes values by requested type; walk the common
/// representations until one fits.
fn convert_value(row: &tiberius::Row, i: usize) -> Value {
	if let Ok(Some(v)) = row.try_get::<i32, _>(i) {
		return Value::Int(v as i64);
	}
	if let Ok(Some(v)) = row.try_get::<i64, _>(i) {
		return Value::Int(v);
	}
	if let Ok(Some(v)) = row.try_get::<i16, _>(i) {
		return Value::Int(v as i64);
	}
	if let Ok(Some(v)) = row.try_get::<u8, _>(i) {
		return Value::Int(v as i64);
	}
	if let Ok(Some(v)) = row.try_get::<bool, _>(i) {
		return Value::Bool(v);
	}
	if let Ok(Some(v)) = row.try_get::<f64, _>(i) {
		return Value::Float(v);
	}
	if let Ok(Some(v)) = row.try_get::<f32, _>(i) {
		return Value::Float(v as f64);
	}
	if let Ok(Some(v)) = row.try_get::<&str, _>(i) {
		return Value::Text(v.to_string());
	}
	if let Ok(Some(v)) = row.try_get::<NaiveDateTime, _>(i) {
		return Value::Timestamp(v.and_utc());
	}
	if let Ok(Some(v)) = row.try_get::<DateTime<Utc>, _>(i) {
		return Value::Timestamp(v);
	}
	if let Ok(Some(v)) = row.try_get::<&[u8], _>(i) {
		return Value::Bytes(v.to_vec());
	}
	Value::Undefined
}

#[cfg(test)]
mod tests {
	use anchor_core::{EngineKind, SslConfig};

	use super::*;

	fn config(ssl: SslConfig) -> ConnectionConfig {
		ConnectionConfig {
			database_id: "db-1".into(),
			workspace_id: "ws".into(),
			tenant_id: "t".into(),
			instance_id: None,
			vendor: "sqlserver".into(),
			engine_kind: EngineKind::Sqlserver,
			host: "sql.internal".into(),
			port: 1433,
			username: "anchor".into(),
			encrypted_password: "enc".into(),
			database_name: "app".into(),
			ssl,
			role: "primary".into(),
			node_id: "n1".into(),
			owner_id: "o1".into(),
		}
	}

	#[test]
	fn test_connection_string_format() {
		let conn_str = connection_string(&config(SslConfig::default()), "secret");
		assert_eq!(
			conn_str,
			"server=sql.internal;port=1433;database=app;user id=anchor;\
			 password=secret;encrypt=false;trustservercertificate=false"
		);
	}

	#[test]
	fn test_connection_string_tls_options() {
		let ssl = SslConfig {
			enabled: true,
			reject_unauthorized: Some(false),
			..Default::default()
		};
		let conn_str = connection_string(&config(ssl), "secret");
		assert!(conn_str.contains("encrypt=true"));
		assert!(conn_str.contains("trustservercertificate=true"));
	}
}
