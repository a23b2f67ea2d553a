// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Resource registry reconciliation.
//!
//! Derives container and item rows from a unified model, keyed by
//! canonical resource URI, and converges the stored registry onto
//! them: delete rows whose URI left the desired set, update survivors,
//! insert newcomers. Never bulk-delete-and-reinsert: mappings hold
//! container ids, and a cascade would destroy user data.

pub use derive::{DesiredContainer, DesiredItem, derive_rows};

mod derive;

use std::{collections::BTreeMap, sync::Arc};

use anchor_core::{
	interface::services::{RegistryStore, SchemaEnrichment},
	model::UnifiedModel,
	resource::{ResourceContainer, ResourceItem},
};
use anchor_type::Result;
use chrono::Utc;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
	pub containers_inserted: usize,
	pub containers_updated: usize,
	pub containers_deleted: usize,
	pub items_inserted: usize,
	pub items_updated: usize,
	pub items_deleted: usize,
}

pub struct Reconciler {
	store: Arc<dyn RegistryStore>,
}

impl Reconciler {
	pub fn new(store: Arc<dyn RegistryStore>) -> Self {
		Self {
			store,
		}
	}

	/// Converge the stored registry onto `model`. With no enrichment
	/// supplied, descriptions written by an earlier enriched pass are
	/// left untouched on surviving rows.
	#[instrument(name = "registry::reconcile", level = "debug", skip(self, model, enrichment))]
	pub async fn reconcile(
		&self,
		database_id: &str,
		model: &UnifiedModel,
		enrichment: Option<&SchemaEnrichment>,
	) -> Result<ReconcileSummary> {
		let now = Utc::now();
		let empty = SchemaEnrichment::default();
		let (desired_containers, desired_items) =
			derive_rows(database_id, model, enrichment.unwrap_or(&empty));
		let mut summary = ReconcileSummary::default();

		let existing_containers = self.store.list_containers(database_id).await?;
		let existing_items = self.store.list_items_for_database(database_id).await?;

		let desired_container_uris: BTreeMap<&str, &DesiredContainer> =
			desired_containers.iter().map(|c| (c.uri.as_str(), c)).collect();
		let desired_item_uris: BTreeMap<&str, &DesiredItem> =
			desired_items.iter().map(|i| (i.uri.as_str(), i)).collect();

		// Deletes first: containers that left the authoritative model.
		// Item deletion cascades on the store side.
		let mut deleted_containers = Vec::new();
		for existing in &existing_containers {
			if !desired_container_uris.contains_key(existing.uri.as_str()) {
				self.store.delete_container(&existing.container_id).await?;
				deleted_containers.push(existing.container_id.clone());
				summary.containers_deleted += 1;
			}
		}

		// Upsert containers and learn the id for each desired URI.
		let mut container_ids: BTreeMap<String, String> = BTreeMap::new();
		let existing_by_uri: BTreeMap<&str, &ResourceContainer> =
			existing_containers.iter().map(|c| (c.uri.as_str(), c)).collect();
		for desired in &desired_containers {
			match existing_by_uri.get(desired.uri.as_str()) {
				Some(existing) => {
					let mut row = (*existing).clone();
					row.name = desired.name.clone();
					if enrichment.is_some() {
						row.description = desired.description.clone();
					}
					row.metadata = desired.metadata.clone();
					row.last_seen = now;
					row.updated = now;
					self.store.update_container(&row).await?;
					container_ids.insert(desired.uri.clone(), row.container_id);
					summary.containers_updated += 1;
				}
				None => {
					let container_id = Uuid::new_v4().to_string();
					self.store
						.insert_container(ResourceContainer {
							container_id: container_id.clone(),
							database_id: Some(database_id.to_string()),
							uri: desired.uri.clone(),
							kind: desired.kind.as_str().to_string(),
							name: desired.name.clone(),
							description: desired.description.clone(),
							online: false,
							last_seen: now,
							updated: now,
							metadata: desired.metadata.clone(),
						})
						.await?;
					container_ids.insert(desired.uri.clone(), container_id);
					summary.containers_inserted += 1;
				}
			}
		}

		// Items whose container survived but whose URI left the model.
		for existing in &existing_items {
			if desired_item_uris.contains_key(existing.uri.as_str()) {
				continue;
			}
			if deleted_containers.contains(&existing.container_id) {
				continue;
			}
			self.store.delete_item(&existing.item_id).await?;
			summary.items_deleted += 1;
		}

		let existing_items_by_uri: BTreeMap<&str, &ResourceItem> =
			existing_items.iter().map(|i| (i.uri.as_str(), i)).collect();
		for desired in &desired_items {
			match existing_items_by_uri.get(desired.uri.as_str()) {
				Some(existing) => {
					let mut row = (*existing).clone();
					row.name = desired.name.clone();
					row.data_type = desired.data_type.clone();
					if enrichment.is_some() {
						row.description = desired.description.clone();
					}
					row.metadata = desired.metadata.clone();
					row.last_seen = now;
					row.updated = now;
					self.store.update_item(&row).await?;
					summary.items_updated += 1;
				}
				None => {
					// The container id comes from the container
					// prefix of the item URI.
					let Some(container_id) = container_ids.get(&desired.container_uri)
					else {
						continue;
					};
					self.store
						.insert_item(ResourceItem {
							item_id: Uuid::new_v4().to_string(),
							container_id: container_id.clone(),
							uri: desired.uri.clone(),
							kind: desired.kind.as_str().to_string(),
							name: desired.name.clone(),
							data_type: desired.data_type.clone(),
							description: desired.description.clone(),
							online: false,
							last_seen: now,
							updated: now,
							metadata: desired.metadata.clone(),
						})
						.await?;
					summary.items_inserted += 1;
				}
			}
		}

		debug!(
			database_id,
			inserted = summary.containers_inserted + summary.items_inserted,
			updated = summary.containers_updated + summary.items_updated,
			deleted = summary.containers_deleted + summary.items_deleted,
			"registry reconciled"
		);
		Ok(summary)
	}
}
