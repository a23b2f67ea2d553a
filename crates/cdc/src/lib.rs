// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Mechanism-agnostic CDC pipeline.
//!
//! A [`PollingSource`] drives one replication attachment: it resolves
//! the start position, runs one cooperative polling task per channel
//! (one per table for trigger-based mechanisms, one for the native
//! stream otherwise), parses raw records through the owning adapter,
//! applies transformation rules, hands canonical events to the caller
//! and checkpoints positions. The [`ReplicationWatcher`] supervises
//! attachments across databases.

pub use source::{PollingSource, channel_key};
pub use watcher::{ReplicationWatcher, SourceEntry, SourceStatus};

mod source;
pub mod trigger;
mod watcher;
