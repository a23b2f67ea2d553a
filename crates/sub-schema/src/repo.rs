// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_core::{
	EngineKind,
	interface::services::{NewSchemaCommit, RepoInfo, SchemaCommit, SchemaEnrichment, SchemaRepo},
	model::UnifiedModel,
};
use anchor_type::{Error, ErrorKind, Result};
use tracing::debug;

const MAX_NAME_ATTEMPTS: usize = 50;

/// Repository names: lowercase, `[a-z0-9-]`, dashes collapsed, never
/// empty.
pub fn sanitize_repo_name(name: &str) -> String {
	let mut out = String::with_capacity(name.len());
	let mut last_dash = true;
	for c in name.to_lowercase().chars() {
		if c.is_ascii_alphanumeric() {
			out.push(c);
			last_dash = false;
		} else if !last_dash {
			out.push('-');
			last_dash = true;
		}
	}
	let trimmed = out.trim_matches('-').to_string();
	if trimmed.is_empty() {
		"database".to_string()
	} else {
		trimmed
	}
}

/// Find or create the repository for a database (suffixing on name
/// collisions) and promote a new head commit carrying the serialized
/// model.
pub async fn ensure_repo_branch_commit(
	repo: &dyn SchemaRepo,
	database_id: &str,
	database_name: &str,
	engine: EngineKind,
	model: &UnifiedModel,
	enrichment: Option<SchemaEnrichment>,
	message: &str,
) -> Result<SchemaCommit> {
	let info = match repo.find_repo_for_database(database_id).await? {
		Some(info) => info,
		None => create_repo_with_unique_name(repo, database_id, database_name).await?,
	};

	let commit = repo
		.commit_head(
			&info.repo_id,
			&info.default_branch_id,
			NewSchemaCommit {
				schema_type: engine.as_str().to_string(),
				schema_json: model.to_payload()?,
				message: message.to_string(),
				enrichment,
			},
		)
		.await?;
	debug!(database_id, repo = info.name, commit = commit.commit_id, "schema commit promoted");
	Ok(commit)
}

async fn create_repo_with_unique_name(
	repo: &dyn SchemaRepo,
	database_id: &str,
	database_name: &str,
) -> Result<RepoInfo> {
	let base = sanitize_repo_name(database_name);
	for attempt in 0..MAX_NAME_ATTEMPTS {
		let candidate = if attempt == 0 {
			base.clone()
		} else {
			format!("{base}-{}", attempt + 1)
		};
		match repo.create_repo(&candidate, database_id).await {
			Ok(info) => return Ok(info),
			Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
			Err(err) => return Err(err),
		}
	}
	Err(Error::internal(format!(
		"could not find a free repository name for '{base}' after {MAX_NAME_ATTEMPTS} attempts"
	)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sanitize_repo_name() {
		assert_eq!(sanitize_repo_name("Orders DB (prod)"), "orders-db-prod");
		assert_eq!(sanitize_repo_name("--__--"), "database");
		assert_eq!(sanitize_repo_name("Sales"), "sales");
		assert_eq!(sanitize_repo_name("a..b"), "a-b");
	}
}
