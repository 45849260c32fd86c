//! Combining several schema snapshots into one model.
//!
//! A merge is a fold over the input models in the order given. Name
//! collisions within an object class resolve according to the chosen
//! [`MergeStrategy`]; objects are taken whole, never field-merged.

use crate::model::SchemaModel;

/// Collision policy for objects sharing a name across inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// The first definition seen wins; later duplicates are ignored.
    #[default]
    FirstSeenWins,
    /// The last definition seen replaces earlier ones.
    LastSeenWins,
}

/// Merge models left to right into a single schema.
pub fn merge_schemas(models: &[SchemaModel], strategy: MergeStrategy) -> SchemaModel {
    let mut merged = SchemaModel::new();

    for model in models {
        for table in &model.tables {
            match merged.tables.iter_mut().find(|t| t.name == table.name) {
                None => merged.tables.push(table.clone()),
                Some(existing) if strategy == MergeStrategy::LastSeenWins => {
                    *existing = table.clone();
                }
                Some(_) => {}
            }
        }
        for index in &model.indexes {
            match merged.indexes.iter_mut().find(|i| i.name == index.name) {
                None => merged.indexes.push(index.clone()),
                Some(existing) if strategy == MergeStrategy::LastSeenWins => {
                    *existing = index.clone();
                }
                Some(_) => {}
            }
        }
        for enum_type in &model.enums {
            match merged.enums.iter_mut().find(|e| e.name == enum_type.name) {
                None => merged.enums.push(enum_type.clone()),
                Some(existing) if strategy == MergeStrategy::LastSeenWins => {
                    *existing = enum_type.clone();
                }
                Some(_) => {}
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Table};

    fn table(name: &str, column_type: &str) -> Table {
        Table {
            name: name.to_string(),
            columns: vec![Column {
                name: "id".to_string(),
                data_type: column_type.to_string(),
                is_nullable: false,
                default_value: None,
                ordinal_position: 1,
            }],
            primary_key: None,
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
        }
    }

    fn model(tables: Vec<Table>) -> SchemaModel {
        SchemaModel {
            tables,
            indexes: Vec::new(),
            enums: Vec::new(),
        }
    }

    #[test]
    fn disjoint_models_union() {
        let merged = merge_schemas(
            &[
                model(vec![table("users", "integer")]),
                model(vec![table("orders", "integer")]),
            ],
            MergeStrategy::default(),
        );
        assert_eq!(merged.tables.len(), 2);
    }

    #[test]
    fn first_seen_wins_keeps_earlier_definition() {
        let merged = merge_schemas(
            &[
                model(vec![table("users", "integer")]),
                model(vec![table("users", "bigint")]),
            ],
            MergeStrategy::FirstSeenWins,
        );
        assert_eq!(merged.tables.len(), 1);
        assert_eq!(merged.tables[0].columns[0].data_type, "integer");
    }

    #[test]
    fn last_seen_wins_replaces_whole_object() {
        let merged = merge_schemas(
            &[
                model(vec![table("users", "integer")]),
                model(vec![table("users", "bigint")]),
            ],
            MergeStrategy::LastSeenWins,
        );
        assert_eq!(merged.tables.len(), 1);
        assert_eq!(merged.tables[0].columns[0].data_type, "bigint");
    }

    #[test]
    fn merge_of_empty_slice_is_empty() {
        let merged = merge_schemas(&[], MergeStrategy::default());
        assert_eq!(merged, SchemaModel::new());
    }
}
