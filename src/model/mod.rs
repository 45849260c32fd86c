//! Schema model types representing one PostgreSQL namespace snapshot.
//!
//! A [`SchemaModel`] is immutable once produced: the introspector builds it,
//! the differ and version store consume it. Object names are the identity
//! keys used to match objects across two snapshots.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One namespace snapshot at one point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaModel {
    pub tables: Vec<Table>,
    pub indexes: Vec<Index>,
    #[serde(default)]
    pub enums: Vec<EnumType>,
}

impl SchemaModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn find_enum(&self, name: &str) -> Option<&EnumType> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Reject duplicate object names within a class. Duplicate names are a
    /// precondition violation: the differ assumes name-keyed identity and is
    /// total only over validated models.
    pub fn validate(&self) -> Result<()> {
        let mut table_names = HashSet::new();
        for table in &self.tables {
            if !table_names.insert(table.name.as_str()) {
                return Err(Error::model(format!("duplicate table name '{}'", table.name)));
            }
            table.validate()?;
        }

        let mut enum_names = HashSet::new();
        for enum_type in &self.enums {
            if !enum_names.insert(enum_type.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate enum type name '{}'",
                    enum_type.name
                )));
            }
        }

        // The top-level index list mirrors the per-table lists; an entry
        // with no owning table or a diverging definition has no table to
        // render DDL against and the differ could misclassify it.
        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(Error::model(format!("duplicate index name '{}'", index.name)));
            }
            match self.tables.iter().find_map(|t| t.find_index(&index.name)) {
                Some(embedded) if embedded == index => {}
                Some(_) => {
                    return Err(Error::model(format!(
                        "index '{}' differs from its table's definition",
                        index.name
                    )))
                }
                None => {
                    return Err(Error::model(format!(
                        "index '{}' does not belong to any table",
                        index.name
                    )))
                }
            }
        }

        Ok(())
    }

    /// Content hash of the snapshot, stable across runs for equal models.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let json = serde_json::to_string(self).expect("SchemaModel must serialize");
        let hash = Sha256::digest(json.as_bytes());
        hex::encode(hash)
    }
}

/// A database table. `name` is the identity key within a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    /// Ordered by ordinal position.
    pub columns: Vec<Column>,
    pub primary_key: Option<Constraint>,
    pub unique_constraints: Vec<Constraint>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn find_constraint(&self, name: &str) -> Option<&Constraint> {
        if let Some(pk) = &self.primary_key {
            if pk.name == name {
                return Some(pk);
            }
        }
        self.unique_constraints.iter().find(|c| c.name == name)
    }

    pub fn find_index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    fn validate(&self) -> Result<()> {
        let mut column_names = HashSet::new();
        for column in &self.columns {
            if !column_names.insert(column.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate column name '{}' in table '{}'",
                    column.name, self.name
                )));
            }
        }

        let mut constraint_names = HashSet::new();
        let constraints = self.primary_key.iter().chain(&self.unique_constraints);
        for constraint in constraints {
            if !constraint_names.insert(constraint.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate constraint name '{}' in table '{}'",
                    constraint.name, self.name
                )));
            }
        }

        let mut index_names = HashSet::new();
        for index in &self.indexes {
            if !index_names.insert(index.name.as_str()) {
                return Err(Error::model(format!(
                    "duplicate index name '{}' in table '{}'",
                    index.name, self.name
                )));
            }
        }

        Ok(())
    }
}

/// A table column. `ordinal_position` is informational only and never
/// participates in diff decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Normalized catalog type string, e.g. `varchar(255)` or `integer`.
    pub data_type: String,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i32,
}

impl Column {
    /// Structural equality excluding ordinal position.
    pub fn same_definition(&self, other: &Column) -> bool {
        self.name == other.name
            && self.data_type == other.data_type
            && self.is_nullable == other.is_nullable
            && self.default_value == other.default_value
    }
}

/// A PRIMARY KEY or UNIQUE constraint. Column order matters for equality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraint {
    pub name: String,
    pub constraint_type: ConstraintType,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConstraintType {
    #[serde(rename = "PRIMARY KEY")]
    PrimaryKey,
    #[serde(rename = "UNIQUE")]
    Unique,
}

impl ConstraintType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ConstraintType::PrimaryKey => "PRIMARY KEY",
            ConstraintType::Unique => "UNIQUE",
        }
    }
}

/// An index. `name` is the identity key; column order matters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub index_type: IndexType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    BTree,
    Hash,
    Gin,
    Gist,
}

impl IndexType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IndexType::BTree => "btree",
            IndexType::Hash => "hash",
            IndexType::Gin => "gin",
            IndexType::Gist => "gist",
        }
    }
}

/// A PostgreSQL ENUM type. Declaration order of values is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub values: Vec<String>,
}
