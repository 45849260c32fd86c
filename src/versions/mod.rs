//! Named schema snapshots stored on disk.
//!
//! A version pins a full [`SchemaModel`] under a human-chosen name so two
//! points in time can be diffed without a live database on either side.
//! The store is a single `schema_versions.json` file under the base path.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::{compare_schemas, DiffReport};
use crate::error::{Error, Result};
use crate::model::SchemaModel;

const STORE_FILE: &str = "schema_versions.json";

/// One saved snapshot with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: String,
    pub name: String,
    pub description: String,
    pub database_name: String,
    pub schema: SchemaModel,
    pub created_at: String,
    pub tags: Vec<String>,
    pub fingerprint: String,
}

/// File-backed collection of schema versions.
pub struct VersionStore {
    base_path: PathBuf,
}

impl VersionStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn store_path(&self) -> PathBuf {
        self.base_path.join(STORE_FILE)
    }

    pub fn load(&self) -> Result<Vec<SchemaVersion>> {
        let path = self.store_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, versions: &[SchemaVersion]) -> Result<()> {
        fs::create_dir_all(&self.base_path)?;
        let json = serde_json::to_string_pretty(versions)?;
        // Write-then-rename keeps the store readable if we crash mid-write.
        let tmp = self.base_path.join(format!(".{}.tmp", STORE_FILE));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.store_path())?;
        Ok(())
    }

    /// Snapshot a schema under a new version entry.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        database_name: &str,
        schema: SchemaModel,
        tags: Vec<String>,
    ) -> Result<SchemaVersion> {
        schema.validate()?;
        let version = SchemaVersion {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            database_name: database_name.to_string(),
            fingerprint: schema.fingerprint(),
            schema,
            created_at: chrono::Utc::now().to_rfc3339(),
            tags,
        };

        let mut versions = self.load()?;
        versions.push(version.clone());
        self.save(&versions)?;
        Ok(version)
    }

    /// Look a version up by id or, failing that, by name.
    pub fn get(&self, key: &str) -> Result<SchemaVersion> {
        let versions = self.load()?;
        versions
            .iter()
            .find(|v| v.id == key)
            .or_else(|| versions.iter().find(|v| v.name == key))
            .cloned()
            .ok_or_else(|| Error::VersionNotFound(key.to_string()))
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        let mut versions = self.load()?;
        let before = versions.len();
        versions.retain(|v| v.id != key && v.name != key);
        if versions.len() == before {
            return Err(Error::VersionNotFound(key.to_string()));
        }
        self.save(&versions)
    }

    /// Diff two stored versions. The report migrates `from` toward `to`,
    /// so `to` acts as the desired state.
    pub fn compare(&self, from: &str, to: &str) -> Result<DiffReport> {
        let from_version = self.get(from)?;
        let to_version = self.get(to)?;
        let mut report = compare_schemas(&to_version.schema, &from_version.schema);
        report.source_connection = format!("version:{}", to_version.name);
        report.target_connection = format!("version:{}", from_version.name);
        Ok(report)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
