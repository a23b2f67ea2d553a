// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Capability-driven SQL text assembly.
//!
//! Dialect adapters own their catalog queries and DDL. The DML every
//! engine shares (inserts, updates, deletes, upserts and the
//! statements that apply canonical CDC events) is assembled here from
//! the engine's declared capabilities. No engine names appear in this
//! crate.

pub use apply::build_apply_statement;
pub use dml::{build_delete, build_insert, build_update, build_upsert};
pub use ident::{placeholder, quote_ident, quote_qualified};
pub use statement::{Statement, push_conditions};

mod apply;
pub mod ddl;
mod dml;
mod ident;
mod statement;
