// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Lifecycle contract shared by the long-running subsystems (schema
//! watcher, status monitor, replication watcher).

use anchor_type::Result;
use async_trait::async_trait;

/// Health snapshot a subsystem reports between ticks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
	Healthy,
	Degraded { reason: String },
	Failed { reason: String },
}

/// A long-running component with idempotent start/shutdown.
///
/// `start` spawns the subsystem's tasks and returns; `shutdown`
/// cancels them and waits for the current iteration to drain. Calling
/// either twice is a no-op.
#[async_trait]
pub trait Subsystem: Send + Sync {
	fn name(&self) -> &'static str;

	async fn start(&mut self) -> Result<()>;

	async fn shutdown(&mut self) -> Result<()>;

	fn is_running(&self) -> bool;

	fn health(&self) -> HealthStatus {
		HealthStatus::Healthy
	}
}
