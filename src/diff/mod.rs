//! Schema diff engine.
//!
//! [`compare_schemas`] matches objects by name at each level, classifies
//! each as Added/Removed/Modified, and folds the rendered UP/DOWN SQL into
//! every item. Pure and deterministic: no I/O, and emission order is fixed
//! by declaration order of the inputs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{EnumType, SchemaModel, Table};
use crate::render::{render, SchemaChange};

/// The kind of difference detected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Modified,
}

/// The class of schema object a diff item refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Table,
    Column,
    Constraint,
    Index,
    Enum,
}

/// A single schema difference with its forward and reverse SQL.
///
/// Created exactly once per comparison run and immutable thereafter. The
/// `dangerous` flag is monotonic: nothing downstream may downgrade it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffItem {
    /// Opaque token, unique within one report.
    pub id: String,
    pub kind: DiffKind,
    pub object_type: ObjectType,
    /// Dotted path, e.g. `users.email` for a column.
    pub object_name: String,
    pub details: String,
    pub generated_up_sql: String,
    pub generated_down_sql: String,
    pub dangerous: bool,
}

impl DiffItem {
    fn new(
        kind: DiffKind,
        object_type: ObjectType,
        object_name: impl Into<String>,
        details: impl Into<String>,
        change: &SchemaChange,
    ) -> Self {
        let rendered = render(change);
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            object_type,
            object_name: object_name.into(),
            details: details.into(),
            generated_up_sql: rendered.up_sql,
            generated_down_sql: rendered.down_sql,
            dangerous: rendered.dangerous,
        }
    }
}

/// The complete result of one comparison run. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiffReport {
    pub items: Vec<DiffItem>,
    pub source_connection: String,
    pub target_connection: String,
    pub generated_at: String,
}

impl DiffReport {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            source_connection: String::new(),
            target_connection: String::new(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn has_dangerous(&self) -> bool {
        self.items.iter().any(|i| i.dangerous)
    }
}

/// Compare two schema models. `source` is the desired state, `target` the
/// current state of the database being migrated.
///
/// Emission order: new and dropped tables (declaration order), standalone
/// indexes, per-table modifications grouped by table in source declaration
/// order, enum changes last.
pub fn compare_schemas(source: &SchemaModel, target: &SchemaModel) -> DiffReport {
    let mut report = DiffReport::new();

    // Index names covered by table-level comparison. The model also carries
    // a flattened top-level index list; anything in this set must not be
    // emitted a second time from that list.
    let mut covered_indexes = HashSet::new();

    for source_table in &source.tables {
        if target.find_table(&source_table.name).is_none() {
            // An added table embeds its columns, constraints and indexes in
            // the single CREATE TABLE item; no sub-items are emitted.
            for index in &source_table.indexes {
                covered_indexes.insert(index.name.clone());
            }
            report.items.push(DiffItem::new(
                DiffKind::Added,
                ObjectType::Table,
                &source_table.name,
                format!("Create table '{}'", source_table.name),
                &SchemaChange::TableAdded(source_table.clone()),
            ));
        } else {
            for index in &source_table.indexes {
                covered_indexes.insert(index.name.clone());
            }
        }
    }

    for target_table in &target.tables {
        for index in &target_table.indexes {
            covered_indexes.insert(index.name.clone());
        }
        if source.find_table(&target_table.name).is_none() {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Table,
                &target_table.name,
                format!("Drop table '{}'", target_table.name),
                &SchemaChange::TableRemoved(target_table.clone()),
            ));
        }
    }

    compare_standalone_indexes(&mut report, source, target, &covered_indexes);

    // Columns, constraints and table indexes only produce independent items
    // for tables present in both snapshots.
    for source_table in &source.tables {
        if let Some(target_table) = target.find_table(&source_table.name) {
            compare_columns(&mut report, source_table, target_table);
            compare_primary_keys(&mut report, source_table, target_table);
            compare_unique_constraints(&mut report, source_table, target_table);
            compare_table_indexes(&mut report, source_table, target_table);
        }
    }

    compare_enums(&mut report, source, target);

    report
}

fn compare_columns(report: &mut DiffReport, source: &Table, target: &Table) {
    for source_col in &source.columns {
        if target.find_column(&source_col.name).is_none() {
            report.items.push(DiffItem::new(
                DiffKind::Added,
                ObjectType::Column,
                format!("{}.{}", source.name, source_col.name),
                format!("Add column '{}' to table '{}'", source_col.name, source.name),
                &SchemaChange::ColumnAdded {
                    table: source.name.clone(),
                    column: source_col.clone(),
                },
            ));
        }
    }

    for target_col in &target.columns {
        if source.find_column(&target_col.name).is_none() {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Column,
                format!("{}.{}", target.name, target_col.name),
                format!(
                    "Drop column '{}' from table '{}'",
                    target_col.name, target.name
                ),
                &SchemaChange::ColumnRemoved {
                    table: target.name.clone(),
                    column: target_col.clone(),
                },
            ));
        }
    }

    for source_col in &source.columns {
        if let Some(target_col) = target.find_column(&source_col.name) {
            if !source_col.same_definition(target_col) {
                report.items.push(DiffItem::new(
                    DiffKind::Modified,
                    ObjectType::Column,
                    format!("{}.{}", source.name, source_col.name),
                    describe_column_changes(source_col, target_col),
                    &SchemaChange::ColumnModified {
                        table: source.name.clone(),
                        desired: source_col.clone(),
                        current: target_col.clone(),
                    },
                ));
            }
        }
    }
}

fn describe_column_changes(
    desired: &crate::model::Column,
    current: &crate::model::Column,
) -> String {
    let mut changes = Vec::new();
    if desired.data_type != current.data_type {
        changes.push(format!("type: {} -> {}", current.data_type, desired.data_type));
    }
    if desired.is_nullable != current.is_nullable {
        changes.push(format!(
            "nullable: {} -> {}",
            current.is_nullable, desired.is_nullable
        ));
    }
    if desired.default_value != current.default_value {
        changes.push(format!(
            "default: {:?} -> {:?}",
            current.default_value, desired.default_value
        ));
    }
    format!("Modify column '{}': {}", desired.name, changes.join(", "))
}

fn compare_primary_keys(report: &mut DiffReport, source: &Table, target: &Table) {
    match (&source.primary_key, &target.primary_key) {
        (Some(source_pk), None) => {
            report.items.push(DiffItem::new(
                DiffKind::Added,
                ObjectType::Constraint,
                format!("{}.{}", source.name, source_pk.name),
                format!(
                    "Add primary key '{}' to table '{}'",
                    source_pk.name, source.name
                ),
                &SchemaChange::ConstraintAdded {
                    table: source.name.clone(),
                    constraint: source_pk.clone(),
                },
            ));
        }
        (None, Some(target_pk)) => {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Constraint,
                format!("{}.{}", target.name, target_pk.name),
                format!(
                    "Drop primary key '{}' from table '{}'",
                    target_pk.name, target.name
                ),
                &SchemaChange::ConstraintRemoved {
                    table: target.name.clone(),
                    constraint: target_pk.clone(),
                },
            ));
        }
        (Some(source_pk), Some(target_pk)) => {
            if source_pk != target_pk {
                report.items.push(DiffItem::new(
                    DiffKind::Modified,
                    ObjectType::Constraint,
                    format!("{}.{}", source.name, source_pk.name),
                    format!(
                        "Modify primary key '{}' on table '{}'",
                        source_pk.name, source.name
                    ),
                    &SchemaChange::ConstraintModified {
                        table: source.name.clone(),
                        desired: source_pk.clone(),
                        current: target_pk.clone(),
                    },
                ));
            }
        }
        (None, None) => {}
    }
}

fn compare_unique_constraints(report: &mut DiffReport, source: &Table, target: &Table) {
    for source_uc in &source.unique_constraints {
        match target
            .unique_constraints
            .iter()
            .find(|t| t.name == source_uc.name)
        {
            None => {
                report.items.push(DiffItem::new(
                    DiffKind::Added,
                    ObjectType::Constraint,
                    format!("{}.{}", source.name, source_uc.name),
                    format!(
                        "Add unique constraint '{}' to table '{}'",
                        source_uc.name, source.name
                    ),
                    &SchemaChange::ConstraintAdded {
                        table: source.name.clone(),
                        constraint: source_uc.clone(),
                    },
                ));
            }
            Some(target_uc) if target_uc != source_uc => {
                report.items.push(DiffItem::new(
                    DiffKind::Modified,
                    ObjectType::Constraint,
                    format!("{}.{}", source.name, source_uc.name),
                    format!(
                        "Modify unique constraint '{}' on table '{}'",
                        source_uc.name, source.name
                    ),
                    &SchemaChange::ConstraintModified {
                        table: source.name.clone(),
                        desired: source_uc.clone(),
                        current: target_uc.clone(),
                    },
                ));
            }
            Some(_) => {}
        }
    }

    for target_uc in &target.unique_constraints {
        if !source
            .unique_constraints
            .iter()
            .any(|s| s.name == target_uc.name)
        {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Constraint,
                format!("{}.{}", target.name, target_uc.name),
                format!(
                    "Drop unique constraint '{}' from table '{}'",
                    target_uc.name, target.name
                ),
                &SchemaChange::ConstraintRemoved {
                    table: target.name.clone(),
                    constraint: target_uc.clone(),
                },
            ));
        }
    }
}

fn compare_table_indexes(report: &mut DiffReport, source: &Table, target: &Table) {
    for source_idx in &source.indexes {
        match target.find_index(&source_idx.name) {
            None => {
                report.items.push(DiffItem::new(
                    DiffKind::Added,
                    ObjectType::Index,
                    format!("{}.{}", source.name, source_idx.name),
                    format!(
                        "Create index '{}' on table '{}'",
                        source_idx.name, source.name
                    ),
                    &SchemaChange::IndexAdded {
                        table: source.name.clone(),
                        index: source_idx.clone(),
                    },
                ));
            }
            Some(target_idx) if target_idx != source_idx => {
                report.items.push(DiffItem::new(
                    DiffKind::Modified,
                    ObjectType::Index,
                    format!("{}.{}", source.name, source_idx.name),
                    format!(
                        "Modify index '{}' on table '{}'",
                        source_idx.name, source.name
                    ),
                    &SchemaChange::IndexModified {
                        table: source.name.clone(),
                        desired: source_idx.clone(),
                        current: target_idx.clone(),
                    },
                ));
            }
            Some(_) => {}
        }
    }

    for target_idx in &target.indexes {
        if source.find_index(&target_idx.name).is_none() {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Index,
                format!("{}.{}", target.name, target_idx.name),
                format!(
                    "Drop index '{}' from table '{}'",
                    target_idx.name, target.name
                ),
                &SchemaChange::IndexRemoved {
                    table: target.name.clone(),
                    index: target_idx.clone(),
                },
            ));
        }
    }
}

/// Compare the top-level index lists. Indexes already covered by a table
/// comparison (the introspector flattens table indexes into the top-level
/// list) are skipped; an index whose owning table cannot be resolved in
/// either snapshot is not renderable and is skipped as well.
fn compare_standalone_indexes(
    report: &mut DiffReport,
    source: &SchemaModel,
    target: &SchemaModel,
    covered: &HashSet<String>,
) {
    for source_idx in &source.indexes {
        if covered.contains(&source_idx.name) || target.find_index(&source_idx.name).is_some() {
            continue;
        }
        if let Some(table) = owning_table(source, &source_idx.name) {
            report.items.push(DiffItem::new(
                DiffKind::Added,
                ObjectType::Index,
                format!("{}.{}", table, source_idx.name),
                format!("Create index '{}' on table '{}'", source_idx.name, table),
                &SchemaChange::IndexAdded {
                    table,
                    index: source_idx.clone(),
                },
            ));
        }
    }

    for target_idx in &target.indexes {
        if covered.contains(&target_idx.name) || source.find_index(&target_idx.name).is_some() {
            continue;
        }
        if let Some(table) = owning_table(target, &target_idx.name) {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Index,
                format!("{}.{}", table, target_idx.name),
                format!("Drop index '{}' from table '{}'", target_idx.name, table),
                &SchemaChange::IndexRemoved {
                    table,
                    index: target_idx.clone(),
                },
            ));
        }
    }
}

fn owning_table(model: &SchemaModel, index_name: &str) -> Option<String> {
    model
        .tables
        .iter()
        .find(|t| t.find_index(index_name).is_some())
        .map(|t| t.name.clone())
}

fn compare_enums(report: &mut DiffReport, source: &SchemaModel, target: &SchemaModel) {
    for source_enum in &source.enums {
        match target.find_enum(&source_enum.name) {
            None => {
                report.items.push(DiffItem::new(
                    DiffKind::Added,
                    ObjectType::Enum,
                    &source_enum.name,
                    format!(
                        "Create enum type '{}' with values: {:?}",
                        source_enum.name, source_enum.values
                    ),
                    &SchemaChange::EnumAdded(source_enum.clone()),
                ));
            }
            Some(target_enum) if target_enum.values != source_enum.values => {
                compare_enum_values(report, source_enum, target_enum);
            }
            Some(_) => {}
        }
    }

    for target_enum in &target.enums {
        if source.find_enum(&target_enum.name).is_none() {
            report.items.push(DiffItem::new(
                DiffKind::Removed,
                ObjectType::Enum,
                &target_enum.name,
                format!("Drop enum type '{}'", target_enum.name),
                &SchemaChange::EnumRemoved(target_enum.clone()),
            ));
        }
    }
}

fn compare_enum_values(report: &mut DiffReport, source_enum: &EnumType, target_enum: &EnumType) {
    // Values to add, in source declaration order so they land in the same
    // internal ordering.
    let added_values: Vec<String> = source_enum
        .values
        .iter()
        .filter(|v| !target_enum.values.contains(v))
        .cloned()
        .collect();

    // Values present only in the target are not removable in plain DDL.
    let removed_values: Vec<String> = target_enum
        .values
        .iter()
        .filter(|v| !source_enum.values.contains(v))
        .cloned()
        .collect();

    if !added_values.is_empty() {
        report.items.push(DiffItem::new(
            DiffKind::Modified,
            ObjectType::Enum,
            &source_enum.name,
            format!(
                "Add values to enum '{}': {:?}",
                source_enum.name, added_values
            ),
            &SchemaChange::EnumValuesAdded {
                enum_name: source_enum.name.clone(),
                values: added_values,
            },
        ));
    }

    if !removed_values.is_empty() {
        report.items.push(DiffItem::new(
            DiffKind::Modified,
            ObjectType::Enum,
            &source_enum.name,
            format!(
                "Remove values from enum '{}': {:?} (not expressible in DDL)",
                source_enum.name, removed_values
            ),
            &SchemaChange::EnumValuesRemoved {
                enum_name: source_enum.name.clone(),
                values: removed_values,
            },
        ));
    }
}
