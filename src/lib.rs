//! pgdelta - PostgreSQL schema diffing and reversible migrations.
//!
//! Introspect two databases (or saved snapshots), compute a name-keyed
//! structural diff, and turn it into a migration artifact with paired
//! `up.sql` and `down.sql` scripts plus a machine-readable `meta.json`.
//!
//! # Modules
//!
//! - [`model`] - Schema snapshot types (Table, Column, Index, EnumType)
//! - [`pg`] - Connection pooling and catalog introspection
//! - [`diff`] - Schema comparison producing a [`diff::DiffReport`]
//! - [`render`] - DDL generation for individual schema changes
//! - [`assemble`] - Migration scripts and on-disk artifact layout
//! - [`apply`] - Transactional execution against a live database
//! - [`merge`] - Combining multiple schema snapshots into one model
//! - [`versions`] - Named schema snapshots stored on disk

pub mod apply;
pub mod assemble;
pub mod diff;
pub mod error;
pub mod merge;
pub mod model;
pub mod pg;
pub mod render;
pub mod versions;
