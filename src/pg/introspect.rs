//! Catalog introspection for the `public` schema.
//!
//! Produces a [`SchemaModel`] snapshot. Per-table indexes are also mirrored
//! into the top-level index list so callers can look them up without walking
//! the table tree.

use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::{Error, Result};
use crate::model::{
    Column, Constraint, ConstraintType, EnumType, Index, IndexType, SchemaModel, Table,
};

/// Snapshot the `public` schema of the connected database.
pub async fn introspect_schema(pool: &PgPool) -> Result<SchemaModel> {
    let enums = fetch_enums(pool).await?;
    let table_names = fetch_table_names(pool).await?;

    let mut tables = Vec::new();
    let mut all_indexes = Vec::new();

    for name in table_names {
        let columns = fetch_columns(pool, &name).await?;
        let primary_key = fetch_primary_key(pool, &name).await?;
        let unique_constraints = fetch_unique_constraints(pool, &name).await?;
        let indexes = fetch_indexes(pool, &name).await?;

        all_indexes.extend(indexes.iter().cloned());
        tables.push(Table {
            name,
            columns,
            primary_key,
            unique_constraints,
            indexes,
        });
    }

    let model = SchemaModel {
        tables,
        indexes: all_indexes,
        enums,
    };
    model.validate()?;
    Ok(model)
}

async fn fetch_enums(pool: &PgPool) -> Result<Vec<EnumType>> {
    let rows = sqlx::query(
        r#"
        SELECT
            t.typname AS enum_name,
            array_agg(e.enumlabel ORDER BY e.enumsortorder) AS enum_values
        FROM pg_type t
        JOIN pg_enum e ON t.oid = e.enumtypid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        WHERE n.nspname = 'public'
        GROUP BY t.typname
        ORDER BY t.typname
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(introspection_error)?;

    Ok(rows
        .iter()
        .map(|r| EnumType {
            name: r.get("enum_name"),
            values: r.get("enum_values"),
        })
        .collect())
}

async fn fetch_table_names(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT table_name
        FROM information_schema.tables
        WHERE table_schema = 'public'
          AND table_type = 'BASE TABLE'
        ORDER BY table_name
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(introspection_error)?;

    Ok(rows.iter().map(|r| r.get("table_name")).collect())
}

async fn fetch_columns(pool: &PgPool, table: &str) -> Result<Vec<Column>> {
    let rows = sqlx::query(
        r#"
        SELECT
            column_name,
            data_type,
            udt_name,
            is_nullable,
            column_default,
            ordinal_position,
            character_maximum_length,
            numeric_precision,
            numeric_scale
        FROM information_schema.columns
        WHERE table_schema = 'public'
          AND table_name = $1
        ORDER BY ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(introspection_error)?;

    Ok(rows
        .iter()
        .map(|r| {
            let data_type: String = r.get("data_type");
            let udt_name: String = r.get("udt_name");
            Column {
                name: r.get("column_name"),
                data_type: normalize_data_type(
                    &data_type,
                    &udt_name,
                    r.get("character_maximum_length"),
                    r.get("numeric_precision"),
                    r.get("numeric_scale"),
                ),
                is_nullable: r.get::<String, _>("is_nullable") == "YES",
                default_value: r.get("column_default"),
                ordinal_position: r.get("ordinal_position"),
            }
        })
        .collect())
}

/// Fold the catalog's split type columns into one rendering-ready string.
/// `ARRAY` and `USER-DEFINED` resolve through `udt_name`.
fn normalize_data_type(
    data_type: &str,
    udt_name: &str,
    char_max_len: Option<i32>,
    numeric_precision: Option<i32>,
    numeric_scale: Option<i32>,
) -> String {
    match data_type {
        "character varying" => match char_max_len {
            Some(len) => format!("varchar({})", len),
            None => "varchar".to_string(),
        },
        "character" => match char_max_len {
            Some(len) => format!("char({})", len),
            None => "char".to_string(),
        },
        "numeric" => match (numeric_precision, numeric_scale) {
            (Some(p), Some(s)) if s > 0 => format!("numeric({},{})", p, s),
            (Some(p), _) => format!("numeric({})", p),
            _ => "numeric".to_string(),
        },
        "ARRAY" => format!("{}[]", udt_name.trim_start_matches('_')),
        "USER-DEFINED" => udt_name.to_string(),
        _ => data_type.to_string(),
    }
}

async fn fetch_primary_key(pool: &PgPool, table: &str) -> Result<Option<Constraint>> {
    let rows = sqlx::query(
        r#"
        SELECT
            tc.constraint_name,
            kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_schema = 'public'
          AND tc.table_name = $1
          AND tc.constraint_type = 'PRIMARY KEY'
        ORDER BY kcu.ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(introspection_error)?;

    if rows.is_empty() {
        return Ok(None);
    }

    Ok(Some(Constraint {
        name: rows[0].get("constraint_name"),
        constraint_type: ConstraintType::PrimaryKey,
        columns: rows.iter().map(|r| r.get("column_name")).collect(),
    }))
}

async fn fetch_unique_constraints(pool: &PgPool, table: &str) -> Result<Vec<Constraint>> {
    let rows = sqlx::query(
        r#"
        SELECT
            tc.constraint_name,
            kcu.column_name,
            kcu.ordinal_position
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.table_schema = 'public'
          AND tc.table_name = $1
          AND tc.constraint_type = 'UNIQUE'
        ORDER BY tc.constraint_name, kcu.ordinal_position
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(introspection_error)?;

    let mut constraints: Vec<Constraint> = Vec::new();
    for row in &rows {
        let name: String = row.get("constraint_name");
        let column: String = row.get("column_name");
        match constraints.last_mut() {
            Some(last) if last.name == name => last.columns.push(column),
            _ => constraints.push(Constraint {
                name,
                constraint_type: ConstraintType::Unique,
                columns: vec![column],
            }),
        }
    }
    Ok(constraints)
}

/// Indexes that are neither the primary key index nor the backing index of
/// a unique constraint. Those are represented as constraints instead.
async fn fetch_indexes(pool: &PgPool, table: &str) -> Result<Vec<Index>> {
    let rows = sqlx::query(
        r#"
        SELECT
            i.relname AS index_name,
            am.amname AS index_type,
            ix.indisunique AS is_unique,
            array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)) AS columns
        FROM pg_class t
        JOIN pg_index ix ON t.oid = ix.indrelid
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_am am ON i.relam = am.oid
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        JOIN pg_namespace n ON t.relnamespace = n.oid
        WHERE n.nspname = 'public'
          AND t.relname = $1
          AND NOT ix.indisprimary
          AND NOT EXISTS (
              SELECT 1 FROM pg_constraint c
              WHERE c.conindid = ix.indexrelid AND c.contype = 'u'
          )
        GROUP BY i.relname, am.amname, ix.indisunique
        ORDER BY i.relname
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .map_err(introspection_error)?;

    rows.iter()
        .map(|r| {
            let access_method: String = r.get("index_type");
            Ok(Index {
                name: r.get("index_name"),
                columns: r.get("columns"),
                is_unique: r.get("is_unique"),
                index_type: parse_index_type(&access_method)?,
            })
        })
        .collect()
}

fn parse_index_type(access_method: &str) -> Result<IndexType> {
    match access_method {
        "btree" => Ok(IndexType::BTree),
        "hash" => Ok(IndexType::Hash),
        "gin" => Ok(IndexType::Gin),
        "gist" => Ok(IndexType::Gist),
        other => Err(Error::introspection(format!(
            "unsupported index access method '{}'",
            other
        ))),
    }
}

fn introspection_error(e: sqlx::Error) -> Error {
    Error::introspection(e.to_string())
}
