// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_type::{Error, Result};

use super::{ConstraintKind, UnifiedModel};

/// Check the model invariants:
///
/// - a column flagged primary-key appears in exactly one primary-key
///   constraint of its table;
/// - a foreign-key reference resolves within the model unless it is
///   explicitly marked cross-schema.
pub fn validate_model(model: &UnifiedModel) -> Result<()> {
	for (table_name, table) in &model.tables {
		let pk_constraints: Vec<_> =
			table.constraints.iter().filter(|c| c.kind == ConstraintKind::PrimaryKey).collect();

		if pk_constraints.len() > 1 {
			return Err(Error::invalid_data(format!(
				"table '{table_name}' declares {} primary-key constraints",
				pk_constraints.len()
			)));
		}

		for (column_name, column) in &table.columns {
			if !column.is_primary_key {
				continue;
			}
			let covered = pk_constraints
				.first()
				.map(|c| c.columns.iter().any(|n| n == column_name))
				.unwrap_or(false);
			if !covered {
				return Err(Error::invalid_data(format!(
					"column '{table_name}.{column_name}' is flagged primary-key but no primary-key constraint covers it"
				)));
			}
		}

		for constraint in &table.constraints {
			if constraint.kind != ConstraintKind::ForeignKey {
				continue;
			}
			let Some(reference) = &constraint.reference else {
				return Err(Error::invalid_data(format!(
					"foreign-key constraint on '{table_name}' has no reference"
				)));
			};
			if !reference.cross_schema && !model.tables.contains_key(&reference.table) {
				return Err(Error::invalid_data(format!(
					"foreign key on '{table_name}' references unknown table '{}'",
					reference.table
				)));
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Column, Constraint, ConstraintKind, ConstraintReference, Table};

	fn pk_column() -> Column {
		Column {
			data_type: "INTEGER".into(),
			unified_data_type: "int".into(),
			nullable: false,
			is_primary_key: true,
			..Default::default()
		}
	}

	fn model_with(table: Table) -> UnifiedModel {
		let mut model = UnifiedModel::default();
		model.insert_table(table);
		model
	}

	#[test]
	fn test_pk_column_needs_constraint() {
		let table = Table::new("USERS").with_column("ID", pk_column());
		assert!(validate_model(&model_with(table)).is_err());

		let mut table = Table::new("USERS").with_column("ID", pk_column());
		table.constraints.push(Constraint::primary_key(vec!["ID".into()]));
		assert!(validate_model(&model_with(table)).is_ok());
	}

	#[test]
	fn test_foreign_key_must_resolve() {
		let mut orders = Table::new("ORDERS").with_column("USER_ID", Column::default());
		orders.constraints.push(Constraint {
			name: None,
			kind: ConstraintKind::ForeignKey,
			columns: vec!["USER_ID".into()],
			reference: Some(ConstraintReference {
				table: "USERS".into(),
				columns: vec!["ID".into()],
				cross_schema: false,
			}),
			expression: None,
		});
		assert!(validate_model(&model_with(orders.clone())).is_err());

		// Cross-schema references are allowed to dangle.
		orders.constraints[0].reference.as_mut().unwrap().cross_schema = true;
		assert!(validate_model(&model_with(orders)).is_ok());
	}
}
