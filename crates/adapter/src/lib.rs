// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! The dialect-independent half of connection management: a factory
//! registry that maps an engine kind to its adapter, and the process
//! wide registry of live connections.
//!
//! Dialects are compiled in or out with cargo features; the registry
//! API never changes and nothing here branches on an engine name.

pub use factory::FactoryRegistry;
pub use registry::ConnectionRegistry;

mod factory;
mod registry;
