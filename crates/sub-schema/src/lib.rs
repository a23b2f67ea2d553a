// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Schema watcher subsystem.
//!
//! One task per process on a fixed tick. Each tick walks every
//! registered database connection under a per-database soft deadline:
//! discover, compare against the previous snapshot, commit on change,
//! reconcile the resource registry and invalidate dependent mappings.
//! Per-database errors are local; the tick always proceeds to the
//! next database.

pub use repo::{ensure_repo_branch_commit, sanitize_repo_name};
pub use watcher::{SchemaWatcher, SchemaWatcherConfig, invalidate_mappings_for_database};

mod repo;
mod watcher;
