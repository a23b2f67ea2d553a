// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Foundational types shared by every anchor crate: the loose [`Value`]
//! union used for row payloads and event images, the [`Row`] map, and
//! the closed [`Error`] model every operation returns.

pub use error::{Error, ErrorKind, Result};
pub use row::{Row, row_from_json, row_to_json};
pub use value::{Value, ValueKind};

mod error;
mod row;
mod value;
