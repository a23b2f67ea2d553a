// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::{
	collections::BTreeMap,
	fmt::{Display, Formatter},
};

/// Closed set of error kinds every anchor operation reports.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ErrorKind {
	Connection,
	Configuration,
	InvalidData,
	NotFound,
	UnsupportedOperation,
	TableNotFound,
	AlreadyExists,
	/// Retryable; pollers back off instead of surfacing these.
	Transient,
	Internal,
}

impl ErrorKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::Connection => "connection_error",
			ErrorKind::Configuration => "configuration_error",
			ErrorKind::InvalidData => "invalid_data",
			ErrorKind::NotFound => "not_found",
			ErrorKind::UnsupportedOperation => "unsupported_operation",
			ErrorKind::TableNotFound => "table_not_found",
			ErrorKind::AlreadyExists => "already_exists",
			ErrorKind::Transient => "transient",
			ErrorKind::Internal => "internal",
		}
	}
}

impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Error carried by every fallible anchor operation.
///
/// Always knows its kind; engine, operation and context are attached
/// at the boundary that has them.
#[derive(Debug, thiserror::Error)]
pub struct Error {
	pub kind: ErrorKind,
	pub engine: Option<String>,
	pub operation: Option<String>,
	pub message: String,
	pub context: BTreeMap<String, String>,
	#[source]
	pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.kind)?;
		if let Some(engine) = &self.engine {
			write!(f, " [{engine}]")?;
		}
		if let Some(operation) = &self.operation {
			write!(f, " {operation}")?;
		}
		write!(f, ": {}", self.message)?;
		for (key, value) in &self.context {
			write!(f, " {key}={value}")?;
		}
		Ok(())
	}
}

impl Error {
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			engine: None,
			operation: None,
			message: message.into(),
			context: BTreeMap::new(),
			cause: None,
		}
	}

	pub fn connection(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Connection, message)
	}

	pub fn configuration(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Configuration, message)
	}

	pub fn invalid_data(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::InvalidData, message)
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::NotFound, message)
	}

	pub fn unsupported(operation: impl Into<String>) -> Self {
		let operation = operation.into();
		Self::new(ErrorKind::UnsupportedOperation, format!("{operation} is not supported"))
			.with_operation(operation)
	}

	pub fn table_not_found(table: impl Into<String>) -> Self {
		let table = table.into();
		Self::new(ErrorKind::TableNotFound, format!("table '{table}' not found"))
			.with_context("table", table)
	}

	pub fn already_exists(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::AlreadyExists, message)
	}

	pub fn transient(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Transient, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Internal, message)
	}

	pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
		self.engine = Some(engine.into());
		self
	}

	pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
		self.operation = Some(operation.into());
		self
	}

	pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.context.insert(key.into(), value.into());
		self
	}

	pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
		self.cause = Some(Box::new(cause));
		self
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	pub fn is_transient(&self) -> bool {
		self.kind == ErrorKind::Transient
	}

	pub fn is_unsupported(&self) -> bool {
		self.kind == ErrorKind::UnsupportedOperation
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_display_carries_kind_engine_operation() {
		let err = Error::connection("refused")
			.with_engine("postgres")
			.with_operation("connect")
			.with_context("host", "db.internal")
			.with_context("port", "5432");
		let rendered = err.to_string();
		assert!(rendered.starts_with("connection_error [postgres] connect: refused"));
		assert!(rendered.contains("host=db.internal"));
		assert!(rendered.contains("port=5432"));
	}

	#[test]
	fn test_unsupported_records_operation() {
		let err = Error::unsupported("list_slots");
		assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
		assert_eq!(err.operation.as_deref(), Some("list_slots"));
		assert!(err.is_unsupported());
	}

	#[test]
	fn test_table_not_found_context() {
		let err = Error::table_not_found("ORDERS");
		assert_eq!(err.kind(), ErrorKind::TableNotFound);
		assert_eq!(err.context.get("table").map(String::as_str), Some("ORDERS"));
	}
}
