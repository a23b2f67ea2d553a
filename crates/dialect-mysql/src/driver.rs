// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::ConnectionConfig;
use anchor_type::{Error, Result, Row, Value};
use chrono::{TimeZone, Utc};
use mysql_async::{Opts, OptsBuilder, Pool, SslOpts, prelude::Queryable};
use tracing::debug;

/// Pooled `mysql_async` handle shared by the facet operators.
pub struct MysqlDriver {
	pool: Pool,
}

impl MysqlDriver {
	pub fn open(config: &ConnectionConfig, password: &str) -> Result<Self> {
		let mut builder = OptsBuilder::default()
			.ip_or_hostname(config.host.clone())
			.tcp_port(config.port)
			.user(Some(config.username.clone()))
			.pass(Some(password.to_string()))
			.db_name(Some(config.database_name.clone()));
		if config.ssl.enabled {
			let mut ssl = SslOpts::default();
			if config.ssl.reject_unauthorized == Some(false) {
				ssl = ssl.with_danger_accept_invalid_certs(true);
			}
			builder = builder.ssl_opts(ssl);
		}
		Ok(Self {
			pool: Pool::new(Opts::from(builder)),
		})
	}

	fn wrap(operation: &str, err: mysql_async::Error) -> Error {
		let base = match &err {
			mysql_async::Error::Io(_) => Error::connection(format!("mysql i/o failed: {err}")),
			_ => Error::internal(format!("mysql statement failed: {err}")),
		};
		base.with_engine("mysql").with_operation(operation.to_string())
	}

	pub async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>> {
		let mut conn =
			self.pool.get_conn().await.map_err(|e| Self::wrap("acquire", e))?;
		let rows: Vec<mysql_async::Row> = if args.is_empty() {
			conn.query(sql).await.map_err(|e| Self::wrap("query", e))?
		} else {
			conn.exec(sql, to_params(args)).await.map_err(|e| Self::wrap("query", e))?
		};
		Ok(rows.iter().map(convert_row).collect())
	}

	pub async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64> {
		let mut conn =
			self.pool.get_conn().await.map_err(|e| Self::wrap("acquire", e))?;
		let result = conn
			.exec_iter(sql, to_params(args))
			.await
			.map_err(|e| Self::wrap("execute", e))?;
		let affected = result.affected_rows();
		result.drop_result().await.map_err(|e| Self::wrap("execute", e))?;
		Ok(affected)
	}

	/// Run statements sequentially on one connection inside a
	/// transaction.
	pub async fn transactional(&self, statements: &[anchor_sql::Statement]) -> Result<u64> {
		let mut conn =
			self.pool.get_conn().await.map_err(|e| Self::wrap("acquire", e))?;
		conn.query_drop("START TRANSACTION").await.map_err(|e| Self::wrap("begin", e))?;
		let mut affected = 0u64;
		for statement in statements {
			let result = match conn.exec_iter(statement.sql.as_str(), to_params(&statement.params)).await
			{
				Ok(result) => result,
				Err(err) => {
					let _ = conn.query_drop("ROLLBACK").await;
					return Err(Self::wrap("execute", err));
				}
			};
			affected += result.affected_rows();
			if let Err(err) = result.drop_result().await {
				let _ = conn.query_drop("ROLLBACK").await;
				return Err(Self::wrap("execute", err));
			}
		}
		conn.query_drop("COMMIT").await.map_err(|e| Self::wrap("commit", e))?;
		Ok(affected)
	}

	pub async fn ping(&self) -> Result<()> {
		let mut conn =
			self.pool.get_conn().await.map_err(|e| Self::wrap("ping", e))?;
		conn.query_drop("SELECT 1").await.map_err(|e| Self::wrap("ping", e))
	}

	pub async fn close(&self) -> Result<()> {
		self.pool.clone().disconnect().await.map_err(|e| Self::wrap("close", e))?;
		debug!("mysql pool disconnected");
		Ok(())
	}
}

fn to_params(args: &[Value]) -> mysql_async::Params {
	if args.is_empty() {
		return mysql_async::Params::Empty;
	}
	mysql_async::Params::Positional(args.iter().map(to_mysql_value).collect())
}

fn to_mysql_value(value: &Value) -> mysql_async::Value {
	match value {
		Value::Undefined => mysql_async::Value::NULL,
		Value::Bool(v) => mysql_async::Value::Int(i64::from(*v)),
		Value::Int(v) => mysql_async::Value::Int(*v),
		Value::Float(v) => mysql_async::Value::Double(*v),
		Value::Text(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
		Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
		Value::Timestamp(v) => {
			mysql_async::Value::Bytes(v.format("%Y-%m-%d %H:%M:%S%.6f").to_string().into_bytes())
		}
		Value::Array(_) | Value::Object(_) => {
			mysql_async::Value::Bytes(value.to_json().to_string().into_bytes())
		}
	}
}

pub fn convert_row(row: &mysql_async::Row) -> Row {
	let mut out = Row::new();
	for (i, column) in row.columns_ref().iter().enumerate() {
		let name = column.name_str().to_string();
		let value = row.as_ref(i).map(convert_value).unwrap_or(Value::Undefined);
		out.insert(name, value);
	}
	out
}

fn convert_value(value: &mysql_async::Value) -> Value {
	match value {
		mysql_async::Value::NULL => Value::Undefined,
		mysql_async::Value::Int(v) => Value::Int(*v),
		mysql_async::Value::UInt(v) => Value::Int(*v as i64),
		mysql_async::Value::Float(v) => Value::Float(*v as f64),
		mysql_async::Value::Double(v) => Value::Float(*v),
		mysql_async::Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
			Ok(text) => Value::Text(text.to_string()),
			Err(_) => Value::Bytes(bytes.clone()),
		},
		mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => Utc
			.with_ymd_and_hms(*year as i32, *month as u32, *day as u32, *hour as u32, *minute as u32, *second as u32)
			.single()
			.map(|ts| {
				Value::Timestamp(ts + chrono::Duration::microseconds(*micros as i64))
			})
			.unwrap_or(Value::Undefined),
		mysql_async::Value::Time(negative, days, hours, minutes, seconds, micros) => {
			let sign = if *negative { "-" } else { "" };
			Value::Text(format!(
				"{sign}{}:{minutes:02}:{seconds:02}.{micros:06}",
				*days as u64 * 24 + *hours as u64
			))
		}
	}
}
