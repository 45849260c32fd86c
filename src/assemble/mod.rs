//! Migration assembly and on-disk layout.
//!
//! Turns a [`DiffReport`](crate::diff::DiffReport) into one migration
//! artifact: a directory named `<timestamp>__<name>` holding `up.sql`,
//! `down.sql` and `meta.json`. Writes go through a temporary directory
//! renamed into place, so a crash never leaves a partial migration behind.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diff::{DiffItem, DiffKind, DiffReport, ObjectType};
use crate::error::{Error, Result};

/// Machine-readable sidecar describing one generated migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMeta {
    pub name: String,
    pub timestamp: String,
    pub generated_at: String,
    pub items_count: usize,
    pub has_dangerous: bool,
    pub items: Vec<MigrationItemMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationItemMeta {
    pub id: String,
    pub kind: DiffKind,
    pub object_type: ObjectType,
    pub object_name: String,
    pub dangerous: bool,
}

/// An assembled migration, not yet written to disk.
#[derive(Debug, Clone)]
pub struct MigrationScripts {
    pub up_sql: String,
    pub down_sql: String,
    pub meta: MigrationMeta,
}

/// Build the UP and DOWN scripts for a report.
///
/// Item order follows the report, except that enum creations are hoisted to
/// the front of UP: a CREATE TABLE referencing a new enum type must come
/// after the type exists. DOWN replays the hoisted order in reverse.
pub fn assemble(report: &DiffReport, name: &str) -> MigrationScripts {
    let timestamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();

    let ordered = execution_order(&report.items);

    let mut up = String::new();
    up.push_str(&format!("-- Migration: {}\n", name));
    up.push_str(&format!("-- Generated: {}\n", report.generated_at));
    up.push_str(&format!("-- Items: {}\n\n", ordered.len()));
    up.push_str("BEGIN;\n\n");
    for item in &ordered {
        up.push_str(&format!("-- {}\n", item.details));
        if item.dangerous {
            up.push_str("-- WARNING: this change can lose data\n");
        }
        up.push_str(&item.generated_up_sql);
        up.push_str("\n\n");
    }
    up.push_str("COMMIT;\n");

    let mut down = String::new();
    down.push_str(&format!("-- Rollback of migration: {}\n\n", name));
    down.push_str("BEGIN;\n\n");
    for item in ordered.iter().rev() {
        down.push_str(&format!("-- Revert: {}\n", item.details));
        down.push_str(&item.generated_down_sql);
        down.push_str("\n\n");
    }
    down.push_str("COMMIT;\n");

    let meta = MigrationMeta {
        name: name.to_string(),
        timestamp,
        generated_at: report.generated_at.clone(),
        items_count: ordered.len(),
        has_dangerous: ordered.iter().any(|i| i.dangerous),
        items: ordered
            .iter()
            .map(|i| MigrationItemMeta {
                id: i.id.clone(),
                kind: i.kind,
                object_type: i.object_type,
                object_name: i.object_name.clone(),
                dangerous: i.dangerous,
            })
            .collect(),
    };

    MigrationScripts {
        up_sql: up,
        down_sql: down,
        meta,
    }
}

/// Stable partition: added enums first, everything else in report order.
fn execution_order(items: &[DiffItem]) -> Vec<&DiffItem> {
    let mut ordered: Vec<&DiffItem> = items
        .iter()
        .filter(|i| i.object_type == ObjectType::Enum && i.kind == DiffKind::Added)
        .collect();
    ordered.extend(
        items
            .iter()
            .filter(|i| !(i.object_type == ObjectType::Enum && i.kind == DiffKind::Added)),
    );
    ordered
}

/// Write the migration under `base`, creating `base` if needed.
///
/// Returns the final migration directory. Fails with
/// [`Error::MigrationExists`] if the directory is already present.
pub fn write_migration(scripts: &MigrationScripts, base: &Path) -> Result<PathBuf> {
    let folder = format!(
        "{}__{}",
        scripts.meta.timestamp,
        sanitize_name(&scripts.meta.name)
    );
    let final_dir = base.join(&folder);
    if final_dir.exists() {
        return Err(Error::MigrationExists { path: final_dir });
    }

    fs::create_dir_all(base)?;

    let tmp_dir = base.join(format!(".tmp-{}", folder));
    if tmp_dir.exists() {
        fs::remove_dir_all(&tmp_dir)?;
    }
    fs::create_dir(&tmp_dir)?;

    fs::write(tmp_dir.join("up.sql"), &scripts.up_sql)?;
    fs::write(tmp_dir.join("down.sql"), &scripts.down_sql)?;
    let meta_json = serde_json::to_string_pretty(&scripts.meta)?;
    fs::write(tmp_dir.join("meta.json"), meta_json)?;

    fs::rename(&tmp_dir, &final_dir)?;
    Ok(final_dir)
}

/// Lowercase the name and replace anything outside `[a-z0-9_-]` with `_`.
/// An empty result falls back to `migration`.
pub fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "migration".to_string()
    } else {
        sanitized
    }
}

/// List migration directories under `base`, newest first.
pub fn list_migrations(base: &Path) -> Result<Vec<PathBuf>> {
    let pattern = Regex::new(r"^\d{14}__[a-z0-9_-]+$").expect("valid migration folder pattern");

    let mut dirs = Vec::new();
    if !base.exists() {
        return Ok(dirs);
    }
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if pattern.is_match(name) {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.reverse();
    Ok(dirs)
}

/// Read the `meta.json` sidecar of a migration directory.
pub fn read_meta(dir: &Path) -> Result<MigrationMeta> {
    let raw = fs::read_to_string(dir.join("meta.json"))?;
    Ok(serde_json::from_str(&raw)?)
}
