// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{sync::Arc, time::Duration};

use anchor_core::ConnectionConfig;
use anchor_type::{Error, Result, Row, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::{
	Client, Config, NoTls,
	row::Row as PgRow,
	types::{ToSql, Type},
};
use tracing::debug;

/// Thin wrapper around one `tokio-postgres` client. The connection
/// task runs detached; its exit flips nothing here, liveness is
/// observed through `ping`.
pub struct PgDriver {
	client: Client,
}

impl PgDriver {
	pub async fn open(config: &ConnectionConfig, password: &str) -> Result<Arc<Self>> {
		let mut pg = Config::new();
		pg.host(&config.host)
			.port(config.port)
			.user(&config.username)
			.password(password)
			.dbname(&config.database_name)
			.connect_timeout(Duration::from_secs(10));

		let connect_err = |err: tokio_postgres::Error| {
			Error::connection(format!("postgres connect failed: {err}"))
				.with_engine("postgres")
				.with_operation("connect")
				.with_context("host", config.host.clone())
				.with_context("port", config.port.to_string())
		};

		let client = if config.ssl.enabled {
			pg.ssl_mode(tokio_postgres::config::SslMode::Require);
			let mut builder = native_tls::TlsConnector::builder();
			if config.ssl.reject_unauthorized == Some(false) {
				builder.danger_accept_invalid_certs(true);
			}
			if let Some(root) = &config.ssl.root_cert {
				let cert = native_tls::Certificate::from_pem(root.as_bytes())
					.map_err(|e| Error::configuration(format!("bad root certificate: {e}")))?;
				builder.add_root_certificate(cert);
			}
			if let (Some(cert), Some(key)) = (&config.ssl.cert, &config.ssl.key) {
				let identity =
					native_tls::Identity::from_pkcs8(cert.as_bytes(), key.as_bytes())
						.map_err(|e| {
							Error::configuration(format!("bad client certificate: {e}"))
						})?;
				builder.identity(identity);
			}
			let tls = builder
				.build()
				.map_err(|e| Error::configuration(format!("tls setup failed: {e}")))?;
			let connector = postgres_native_tls::MakeTlsConnector::new(tls);
			let (client, connection) = pg.connect(connector).await.map_err(connect_err)?;
			tokio::spawn(async move {
				if let Err(err) = connection.await {
					debug!(%err, "postgres connection task ended");
				}
			});
			client
		} else {
			let (client, connection) = pg.connect(NoTls).await.map_err(connect_err)?;
			tokio::spawn(async move {
				if let Err(err) = connection.await {
					debug!(%err, "postgres connection task ended");
				}
			});
			client
		};

		Ok(Arc::new(Self {
			client,
		}))
	}

	fn wrap(operation: &str, err: tokio_postgres::Error) -> Error {
		let kind = if err.is_closed() {
			Error::connection(format!("postgres i/o failed: {err}"))
		} else {
			Error::internal(format!("postgres statement failed: {err}"))
		};
		kind.with_engine("postgres").with_operation(operation.to_string())
	}

	pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
		let boxed = to_sql_params(args);
		let params: Vec<&(dyn ToSql + Sync)> =
			boxed.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();
		let rows = self
			.client
			.query(sql, &params)
			.await
			.map_err(|e| Self::wrap("query", e))?;
		Ok(rows.iter().map(convert_row).collect())
	}

	pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
		let boxed = to_sql_params(args);
		let params: Vec<&(dyn ToSql + Sync)> =
			boxed.iter().map(|b| b.as_ref() as &(dyn ToSql + Sync)).collect();
		self.client.execute(sql, &params).await.map_err(|e| Self::wrap("execute", e))
	}

	/// Run statements outside the extended protocol; used for DDL
	/// batches and transaction control.
	pub async fn batch(&self, sql: &str) -> Result<()> {
		self.client.batch_execute(sql).await.map_err(|e| Self::wrap("batch", e))
	}

	/// Simple-protocol command returning text rows.
	pub async fn simple(&self, sql: &str) -> Result<Vec<Row>> {
		let messages =
			self.client.simple_query(sql).await.map_err(|e| Self::wrap("command", e))?;
		let mut out = Vec::new();
		for message in messages {
			if let tokio_postgres::SimpleQueryMessage::Row(row) = message {
				let mut converted = Row::new();
				for (i, column) in row.columns().iter().enumerate() {
					let value = row
						.get(i)
						.map(|v| Value::Text(v.to_string()))
						.unwrap_or(Value::Undefined);
					converted.insert(column.name().to_string(), value);
				}
				out.push(converted);
			}
		}
		Ok(out)
	}

	pub async fn ping(&self) -> Result<()> {
		self.client
			.query_one("SELECT 1", &[])
			.await
			.map(|_| ())
			.map_err(|e| Self::wrap("ping", e))
	}

	pub fn is_closed(&self) -> bool {
		self.client.is_closed()
	}
}

fn to_sql_params(args: &[Value]) -> Vec<Box<dyn ToSql + Sync + Send>> {
	args.iter()
		.map(|value| -> Box<dyn ToSql + Sync + Send> {
			match value {
				Value::Undefined => Box::new(None::<String>),
				Value::Bool(v) => Box::new(*v),
				Value::Int(v) => Box::new(*v),
				Value::Float(v) => Box::new(*v),
				Value::Text(v) => Box::new(v.clone()),
				Value::Bytes(v) => Box::new(v.clone()),
				Value::Timestamp(v) => Box::new(*v),
				Value::Array(_) | Value::Object(_) => Box::new(value.to_json()),
			}
		})
		.collect()
}

pub fn convert_row(row: &PgRow) -> Row {
	let mut out = Row::new();
	for (i, column) in row.columns().iter().enumerate() {
		out.insert(column.name().to_string(), convert_value(row, i, column.type_()));
	}
	out
}

fn convert_value(row: &PgRow, i: usize, ty: &Type) -> Value {
	match ty.name() {
		"bool" => opt(row.try_get::<_, Option<bool>>(i)).map_or(Value::Undefined, Value::Bool),
		"int2" => opt(row.try_get::<_, Option<i16>>(i))
			.map_or(Value::Undefined, |v| Value::Int(v as i64)),
		"int4" => opt(row.try_get::<_, Option<i32>>(i))
			.map_or(Value::Undefined, |v| Value::Int(v as i64)),
		"int8" => opt(row.try_get::<_, Option<i64>>(i)).map_or(Value::Undefined, Value::Int),
		"float4" => opt(row.try_get::<_, Option<f32>>(i))
			.map_or(Value::Undefined, |v| Value::Float(v as f64)),
		"float8" => {
			opt(row.try_get::<_, Option<f64>>(i)).map_or(Value::Undefined, Value::Float)
		}
		"bytea" => {
			opt(row.try_get::<_, Option<Vec<u8>>>(i)).map_or(Value::Undefined, Value::Bytes)
		}
		"timestamptz" => opt(row.try_get::<_, Option<DateTime<Utc>>>(i))
			.map_or(Value::Undefined, Value::Timestamp),
		"timestamp" => opt(row.try_get::<_, Option<NaiveDateTime>>(i))
			.map_or(Value::Undefined, |v| Value::Timestamp(v.and_utc())),
		"date" => opt(row.try_get::<_, Option<NaiveDate>>(i))
			.map_or(Value::Undefined, |v| Value::Text(v.to_string())),
		"json" | "jsonb" => opt(row.try_get::<_, Option<serde_json::Value>>(i))
			.map_or(Value::Undefined, Value::from_json),
		_ => {
			// Text-ish and vendor types: fall back through the common
			// representations.
			if let Some(v) = opt(row.try_get::<_, Option<String>>(i)) {
				Value::Text(v)
			} else if let Some(v) = opt(row.try_get::<_, Option<i64>>(i)) {
				Value::Int(v)
			} else if let Some(v) = opt(row.try_get::<_, Option<f64>>(i)) {
				Value::Float(v)
			} else {
				Value::Undefined
			}
		}
	}
}

fn opt<T>(result: std::result::Result<Option<T>, tokio_postgres::Error>) -> Option<T> {
	result.ok().flatten()
}
