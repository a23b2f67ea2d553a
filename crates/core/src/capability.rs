// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Static per-engine feature declarations.
//!
//! Callers never branch on an engine name; they ask the capability
//! table. The table is a pure function of [`EngineKind`] and performs
//! no I/O.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::config::EngineKind;

/// The CDC technique an engine supports.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CdcMechanism {
	LogBasedWithSlot,
	TriggerBased,
	CdcTables,
	ChangeTracking,
	SnapshotDiff,
	None,
}

impl Display for CdcMechanism {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			CdcMechanism::LogBasedWithSlot => "log_based_with_slot",
			CdcMechanism::TriggerBased => "trigger_based",
			CdcMechanism::CdcTables => "cdc_tables",
			CdcMechanism::ChangeTracking => "change_tracking",
			CdcMechanism::SnapshotDiff => "snapshot_diff",
			CdcMechanism::None => "none",
		};
		f.write_str(s)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuotingStyle {
	/// `"identifier"`
	DoubleQuote,
	/// `[identifier]`
	Bracketed,
	/// `` `identifier` ``
	Backtick,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderStyle {
	/// `$1`, `$2`, …
	Numbered,
	/// `?`
	Question,
	/// `@p1`, `@p2`, …
	Named,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertStyle {
	Merge,
	OnConflict,
	Replace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaginationStyle {
	OffsetFetch,
	Limit,
	Keyset,
}

/// Feature bits for one engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
	pub cdc_mechanisms: &'static [CdcMechanism],
	pub quoting: QuotingStyle,
	pub placeholders: PlaceholderStyle,
	pub upsert: Option<UpsertStyle>,
	pub pagination: PaginationStyle,
	/// DDL statements participate in transactions.
	pub ddl_transactions: bool,
	/// The engine accepts mutating data operations at all.
	pub mutations: bool,
	/// MERGE statements must end with a terminator.
	pub merge_terminator: bool,
}

impl Capabilities {
	pub fn supports_replication(&self) -> bool {
		self.cdc_mechanisms.iter().any(|m| *m != CdcMechanism::None)
	}

	pub fn supports_mechanism(&self, mechanism: CdcMechanism) -> bool {
		self.cdc_mechanisms.contains(&mechanism)
	}

	pub fn primary_mechanism(&self) -> CdcMechanism {
		self.cdc_mechanisms.first().copied().unwrap_or(CdcMechanism::None)
	}
}

static POSTGRES: Capabilities = Capabilities {
	cdc_mechanisms: &[CdcMechanism::LogBasedWithSlot],
	quoting: QuotingStyle::DoubleQuote,
	placeholders: PlaceholderStyle::Numbered,
	upsert: Some(UpsertStyle::OnConflict),
	pagination: PaginationStyle::Limit,
	ddl_transactions: true,
	mutations: true,
	merge_terminator: false,
};

static MYSQL: Capabilities = Capabilities {
	cdc_mechanisms: &[CdcMechanism::TriggerBased],
	quoting: QuotingStyle::Backtick,
	placeholders: PlaceholderStyle::Question,
	upsert: Some(UpsertStyle::Replace),
	pagination: PaginationStyle::Limit,
	ddl_transactions: false,
	mutations: true,
	merge_terminator: false,
};

static SQLSERVER: Capabilities = Capabilities {
	cdc_mechanisms: &[CdcMechanism::CdcTables, CdcMechanism::ChangeTracking],
	quoting: QuotingStyle::Bracketed,
	placeholders: PlaceholderStyle::Named,
	upsert: Some(UpsertStyle::Merge),
	pagination: PaginationStyle::OffsetFetch,
	ddl_transactions: true,
	mutations: true,
	merge_terminator: true,
};

static DB2: Capabilities = Capabilities {
	cdc_mechanisms: &[CdcMechanism::TriggerBased],
	quoting: QuotingStyle::DoubleQuote,
	placeholders: PlaceholderStyle::Question,
	upsert: Some(UpsertStyle::Merge),
	pagination: PaginationStyle::OffsetFetch,
	ddl_transactions: true,
	mutations: true,
	merge_terminator: false,
};

static ICEBERG: Capabilities = Capabilities {
	cdc_mechanisms: &[CdcMechanism::None],
	quoting: QuotingStyle::DoubleQuote,
	placeholders: PlaceholderStyle::Question,
	upsert: None,
	pagination: PaginationStyle::Keyset,
	ddl_transactions: false,
	mutations: false,
	merge_terminator: false,
};

impl EngineKind {
	pub fn capabilities(&self) -> &'static Capabilities {
		match self {
			EngineKind::Postgres => &POSTGRES,
			EngineKind::Mysql => &MYSQL,
			EngineKind::Sqlserver => &SQLSERVER,
			EngineKind::Db2 => &DB2,
			EngineKind::Iceberg => &ICEBERG,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_every_engine_declares_capabilities() {
		for kind in EngineKind::all() {
			let caps = kind.capabilities();
			assert!(!caps.cdc_mechanisms.is_empty(), "{kind} declares no mechanism");
		}
	}

	#[test]
	fn test_iceberg_declares_no_replication() {
		let caps = EngineKind::Iceberg.capabilities();
		assert!(!caps.supports_replication());
		assert!(!caps.mutations);
		assert_eq!(caps.primary_mechanism(), CdcMechanism::None);
	}

	#[test]
	fn test_trigger_engines() {
		assert!(EngineKind::Db2.capabilities().supports_mechanism(CdcMechanism::TriggerBased));
		assert!(EngineKind::Mysql.capabilities().supports_mechanism(CdcMechanism::TriggerBased));
		assert!(!EngineKind::Postgres.capabilities().supports_mechanism(CdcMechanism::TriggerBased));
	}
}
