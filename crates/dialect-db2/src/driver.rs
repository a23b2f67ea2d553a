// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Blocking ODBC session wrapped for the async world.
//!
//! The ODBC environment is process-wide; each driver owns one
//! connection behind a mutex and hops onto the blocking pool for every
//! call. Result cells come back as text; the unified value layer
//! re-types them where column types are known.

use std::sync::{Arc, Mutex};

use anchor_core::ConnectionConfig;
use anchor_type::{Error, Result, Row, Value};
use odbc_api::{Connection, ConnectionOptions, Cursor, Environment, ResultSetMetadata, buffers::TextRowSet};
use once_cell::sync::OnceCell;
use tracing::debug;

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

fn environment() -> Result<&'static Environment> {
	ENVIRONMENT.get_or_try_init(|| {
		Environment::new()
			.map_err(|e| Error::internal(format!("odbc environment failed: {e}")))
	})
}

/// Assemble the DB2 connection string:
/// `HOSTNAME=<h>;DATABASE=<db>;PORT=<p>;UID=<u>;PWD=<pw>;` plus the
/// SSL keystore options when TLS is on.
pub fn connection_string(config: &ConnectionConfig, password: &str) -> String {
	let mut out = format!(
		"HOSTNAME={};DATABASE={};PORT={};UID={};PWD={};",
		config.host, config.database_name, config.port, config.username, password
	);
	if config.ssl.enabled {
		let security = if config.ssl.reject_unauthorized == Some(true) {
			"SSL_VERIFY_SERVER_CERTIFICATE"
		} else {
			"SSL"
		};
		out.push_str(&format!("Security={security};"));
		if let Some(cert) = &config.ssl.cert {
			out.push_str(&format!("SSLClientKeystoredb={cert};"));
		}
		if let Some(key) = &config.ssl.key {
			out.push_str(&format!("SSLClientKeystash={key};"));
		}
		if let Some(root) = &config.ssl.root_cert {
			out.push_str(&format!("SSLServerCertificate={root};"));
		}
	}
	out
}

pub struct Db2Driver {
	conn: Arc<Mutex<Connection<'static>>>,
}

impl Db2Driver {
	pub async fn open(config: &ConnectionConfig, password: &str) -> Result<Self> {
		let conn_str = connection_string(config, password);
		let host = config.host.clone();
		let port = config.port;
		let conn = tokio::task::spawn_blocking(move || {
			environment()?
				.connect_with_connection_string(&conn_str, ConnectionOptions::default())
				.map_err(|e| {
					Error::connection(format!("db2 connect failed: {e}"))
						.with_engine("db2")
						.with_operation("connect")
						.with_context("host", host)
						.with_context("port", port.to_string())
				})
		})
		.await
		.map_err(|e| Error::internal(format!("blocking task failed: {e}")))??;
		debug!(host = %config.host, "db2 session established");
		Ok(Self {
			conn: Arc::new(Mutex::new(conn)),
		})
	}

	fn wrap(operation: &str, err: odbc_api::Error) -> Error {
		Error::internal(format!("db2 statement failed: {err}"))
			.with_engine("db2")
			.with_operation(operation.to_string())
	}

	async fn blocking<T, F>(&self, f: F) -> Result<T>
	where
		T: Send + 'static,
		F: FnOnce(&Connection<'static>) -> Result<T> + Send + 'static,
	{
		let conn = Arc::clone(&self.conn);
		tokio::task::spawn_blocking(move || {
			let guard = conn
				.lock()
				.map_err(|_| Error::internal("db2 connection mutex poisoned"))?;
			f(&guard)
		})
		.await
		.map_err(|e| Error::internal(format!("blocking task failed: {e}")))?
	}

	/// Execute a statement returning rows; every cell arrives as text.
	pub async fn query(&self, sql: &str) -> Result<Vec<Row>> {
		let sql = sql.to_string();
		self.blocking(move |conn| {
			let Some(mut cursor) =
				conn.execute(&sql, ()).map_err(|e| Self::wrap("query", e))?
			else {
				return Ok(Vec::new());
			};
			let count = cursor.num_result_cols().map_err(|e| Self::wrap("query", e))?;
			let mut names = Vec::with_capacity(count as usize);
			for i in 1..=count {
				names.push(
					cursor.col_name(i as u16).map_err(|e| Self::wrap("query", e))?,
				);
			}
			let mut buffers = TextRowSet::for_cursor(256, &mut cursor, Some(16384))
				.map_err(|e| Self::wrap("query", e))?;
			let mut row_set =
				cursor.bind_buffer(&mut buffers).map_err(|e| Self::wrap("query", e))?;
			let mut rows = Vec::new();
			while let Some(batch) =
				row_set.fetch().map_err(|e| Self::wrap("query", e))?
			{
				for r in 0..batch.num_rows() {
					let mut row = Row::new();
					for (c, name) in names.iter().enumerate() {
						let value = batch
							.at(c, r)
							.map(|bytes| {
								Value::Text(
									String::from_utf8_lossy(bytes).into_owned(),
								)
							})
							.unwrap_or(Value::Undefined);
						row.insert(name.clone(), value);
					}
					rows.push(row);
				}
			}
			Ok(rows)
		})
		.await
	}

	/// Execute a statement without reading a result set.
	pub async fn execute(&self, sql: &str) -> Result<()> {
		let sql = sql.to_string();
		self.blocking(move |conn| {
			conn.execute(&sql, ()).map_err(|e| Self::wrap("execute", e))?;
			Ok(())
		})
		.await
	}

	/// Run statements inside one unit of work.
	pub async fn transactional(&self, statements: Vec<String>) -> Result<()> {
		self.blocking(move |conn| {
			conn.set_autocommit(false).map_err(|e| Self::wrap("begin", e))?;
			for sql in &statements {
				if let Err(err) = conn.execute(sql, ()) {
					let _ = conn.rollback();
					let _ = conn.set_autocommit(true);
					return Err(Self::wrap("execute", err));
				}
			}
			conn.commit().map_err(|e| Self::wrap("commit", e))?;
			conn.set_autocommit(true).map_err(|e| Self::wrap("commit", e))?;
			Ok(())
		})
		.await
	}

	pub async fn ping(&self) -> Result<()> {
		self.query("SELECT 1 FROM SYSIBM.SYSDUMMY1").await.map(|_| ())
	}
}

/// Render a value as a DB2 SQL literal. The ODBC path executes text
/// statements; parameters are inlined with proper escaping.
pub fn sql_literal(value: &Value) -> String {
	match value {
		Value::Undefined => "NULL".to_string(),
		Value::Bool(true) => "TRUE".to_string(),
		Value::Bool(false) => "FALSE".to_string(),
		Value::Int(v) => v.to_string(),
		Value::Float(v) => v.to_string(),
		Value::Text(v) => format!("'{}'", v.replace('\'', "''")),
		Value::Bytes(v) => format!("BX'{}'", hex::encode_upper(v)),
		Value::Timestamp(v) => {
			format!("TIMESTAMP '{}'", v.format("%Y-%m-%d %H:%M:%S%.6f"))
		}
		Value::Array(_) | Value::Object(_) => {
			format!("'{}'", value.to_json().to_string().replace('\'', "''"))
		}
	}
}

/// Substitute `?` markers with inline literals, in order. Markers
/// inside quoted strings are left alone.
pub fn inline_statement(statement: &anchor_sql::Statement) -> String {
	let mut out = String::with_capacity(statement.sql.len() + 16 * statement.params.len());
	let mut params = statement.params.iter();
	let mut in_string = false;
	for ch in statement.sql.chars() {
		match ch {
			'\'' => {
				in_string = !in_string;
				out.push(ch);
			}
			'?' if !in_string => match params.next() {
				Some(value) => out.push_str(&sql_literal(value)),
				None => out.push(ch),
			},
			_ => out.push(ch),
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use anchor_core::EngineKind;
	use anchor_sql::build_insert;

	use super::*;

	#[test]
	fn test_sql_literal_escapes_quotes() {
		assert_eq!(sql_literal(&Value::text("O'Brien")), "'O''Brien'");
		assert_eq!(sql_literal(&Value::Undefined), "NULL");
		assert_eq!(sql_literal(&Value::Int(42)), "42");
	}

	#[test]
	fn test_inline_statement() {
		let caps = EngineKind::Db2.capabilities();
		let row: Row = [
			("ID".to_string(), Value::Int(1)),
			("NAME".to_string(), Value::text("Ada")),
		]
		.into_iter()
		.collect();
		let statement = build_insert(caps, "EMPLOYEES", &row).unwrap();
		assert_eq!(
			inline_statement(&statement),
			"INSERT INTO \"EMPLOYEES\" (\"ID\", \"NAME\") VALUES (1, 'Ada')"
		);
	}

	#[test]
	fn test_connection_string_format() {
		let config = ConnectionConfig {
			database_id: "db-1".into(),
			workspace_id: "ws".into(),
			tenant_id: "t".into(),
			instance_id: None,
			vendor: "db2".into(),
			engine_kind: EngineKind::Db2,
			host: "db2.internal".into(),
			port: 50000,
			username: "anchor".into(),
			encrypted_password: "enc".into(),
			database_name: "SAMPLE".into(),
			ssl: Default::default(),
			role: "primary".into(),
			node_id: "n1".into(),
			owner_id: "o1".into(),
		};
		assert_eq!(
			connection_string(&config, "secret"),
			"HOSTNAME=db2.internal;DATABASE=SAMPLE;PORT=50000;UID=anchor;PWD=secret;"
		);
	}

	#[test]
	fn test_connection_string_ssl() {
		let mut config = ConnectionConfig {
			database_id: "db-1".into(),
			workspace_id: "ws".into(),
			tenant_id: "t".into(),
			instance_id: None,
			vendor: "db2".into(),
			engine_kind: EngineKind::Db2,
			host: "h".into(),
			port: 50001,
			username: "u".into(),
			encrypted_password: "enc".into(),
			database_name: "D".into(),
			ssl: Default::default(),
			role: "r".into(),
			node_id: "n".into(),
			owner_id: "o".into(),
		};
		config.ssl.enabled = true;
		config.ssl.reject_unauthorized = Some(true);
		config.ssl.root_cert = Some("/certs/server.arm".into());
		let conn_str = connection_string(&config, "pw");
		assert!(conn_str.contains("Security=SSL_VERIFY_SERVER_CERTIFICATE;"));
		assert!(conn_str.contains("SSLServerCertificate=/certs/server.arm;"));
	}
}
