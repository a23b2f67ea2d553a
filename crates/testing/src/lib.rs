// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Test doubles for the anchor service: an in-memory mock engine that
//! implements the full adapter contract (including a working
//! trigger-style change log and a log-based stream), mock external
//! collaborators, and small wait helpers.

pub use engine::{MockConnection, MockEngine};
pub use services::{
	MockAnalysisService, MockCheckpointStore, MockRegistryStore, MockSchemaRepo,
	MockSecretService, MockTransformService,
};
pub use util::wait_for;

mod engine;
mod services;
mod util;
