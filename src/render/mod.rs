//! SQL rendering for classified schema changes.
//!
//! Given one classified change, [`render`] produces the forward (UP)
//! statement, the reverse (DOWN) statement, and the dangerousness flag.
//! Dangerousness is a static table keyed on the change variant, never
//! inferred from the generated SQL text.

use crate::model::{Column, Constraint, EnumType, Index, IndexType, Table};

/// A classified schema change: object kind crossed with change kind.
///
/// `desired` carries the source (wanted) definition, `current` the target's
/// (existing) definition. Removed variants carry the target's last known
/// definition so the DOWN statement can reconstruct it.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    TableAdded(Table),
    TableRemoved(Table),
    ColumnAdded {
        table: String,
        column: Column,
    },
    ColumnRemoved {
        table: String,
        column: Column,
    },
    ColumnModified {
        table: String,
        desired: Column,
        current: Column,
    },
    ConstraintAdded {
        table: String,
        constraint: Constraint,
    },
    ConstraintRemoved {
        table: String,
        constraint: Constraint,
    },
    ConstraintModified {
        table: String,
        desired: Constraint,
        current: Constraint,
    },
    IndexAdded {
        table: String,
        index: Index,
    },
    IndexRemoved {
        table: String,
        index: Index,
    },
    IndexModified {
        table: String,
        desired: Index,
        current: Index,
    },
    EnumAdded(EnumType),
    EnumRemoved(EnumType),
    EnumValuesAdded {
        enum_name: String,
        values: Vec<String>,
    },
    EnumValuesRemoved {
        enum_name: String,
        values: Vec<String>,
    },
}

/// The rendered pair of statements plus the dangerousness flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub up_sql: String,
    pub down_sql: String,
    pub dangerous: bool,
}

/// Render one classified change into UP and DOWN SQL.
pub fn render(change: &SchemaChange) -> Rendered {
    match change {
        SchemaChange::TableAdded(table) => Rendered {
            up_sql: create_table_sql(table),
            down_sql: format!("DROP TABLE IF EXISTS {} CASCADE;", quote_ident(&table.name)),
            dangerous: false,
        },

        SchemaChange::TableRemoved(table) => Rendered {
            up_sql: format!("DROP TABLE IF EXISTS {} CASCADE;", quote_ident(&table.name)),
            down_sql: create_table_sql(table),
            dangerous: true,
        },

        SchemaChange::ColumnAdded { table, column } => Rendered {
            up_sql: add_column_sql(table, column),
            down_sql: drop_column_sql(table, &column.name),
            dangerous: false,
        },

        SchemaChange::ColumnRemoved { table, column } => Rendered {
            up_sql: drop_column_sql(table, &column.name),
            down_sql: add_column_sql(table, column),
            dangerous: true,
        },

        SchemaChange::ColumnModified {
            table,
            desired,
            current,
        } => {
            let (up_sql, down_sql) = alter_column_sql(table, desired, current);
            Rendered {
                up_sql,
                down_sql,
                // Type changes may lose data; SET NOT NULL may fail on
                // existing NULLs. Relaxing to nullable or changing a default
                // is safe.
                dangerous: desired.data_type != current.data_type
                    || (current.is_nullable && !desired.is_nullable),
            }
        }

        SchemaChange::ConstraintAdded { table, constraint } => Rendered {
            up_sql: add_constraint_sql(table, constraint),
            down_sql: drop_constraint_sql(table, &constraint.name),
            dangerous: false,
        },

        SchemaChange::ConstraintRemoved { table, constraint } => Rendered {
            up_sql: drop_constraint_sql(table, &constraint.name),
            down_sql: add_constraint_sql(table, constraint),
            dangerous: true,
        },

        SchemaChange::ConstraintModified {
            table,
            desired,
            current,
        } => Rendered {
            up_sql: format!(
                "{}\n{}",
                drop_constraint_sql(table, &current.name),
                add_constraint_sql(table, desired)
            ),
            down_sql: format!(
                "{}\n{}",
                drop_constraint_sql(table, &desired.name),
                add_constraint_sql(table, current)
            ),
            dangerous: true,
        },

        SchemaChange::IndexAdded { table, index } => Rendered {
            up_sql: create_index_sql(table, index),
            down_sql: drop_index_sql(&index.name),
            dangerous: false,
        },

        SchemaChange::IndexRemoved { table, index } => Rendered {
            up_sql: drop_index_sql(&index.name),
            down_sql: create_index_sql(table, index),
            dangerous: true,
        },

        SchemaChange::IndexModified {
            table,
            desired,
            current,
        } => Rendered {
            up_sql: format!(
                "{}\n{}",
                drop_index_sql(&current.name),
                create_index_sql(table, desired)
            ),
            down_sql: format!(
                "{}\n{}",
                drop_index_sql(&desired.name),
                create_index_sql(table, current)
            ),
            dangerous: true,
        },

        SchemaChange::EnumAdded(enum_type) => Rendered {
            up_sql: create_enum_sql(enum_type),
            down_sql: format!("DROP TYPE IF EXISTS {} CASCADE;", quote_ident(&enum_type.name)),
            dangerous: false,
        },

        SchemaChange::EnumRemoved(enum_type) => Rendered {
            up_sql: format!("DROP TYPE IF EXISTS {} CASCADE;", quote_ident(&enum_type.name)),
            down_sql: create_enum_sql(enum_type),
            dangerous: true,
        },

        SchemaChange::EnumValuesAdded { enum_name, values } => Rendered {
            // Values must be added in declaration order, one statement each.
            up_sql: values
                .iter()
                .map(|v| {
                    format!(
                        "ALTER TYPE {} ADD VALUE '{}';",
                        quote_ident(enum_name),
                        escape_string(v)
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
            down_sql: format!(
                "-- PostgreSQL cannot remove enum values; rollback of added values {:?} on type \"{}\" is a no-op.",
                values, enum_name
            ),
            dangerous: false,
        },

        SchemaChange::EnumValuesRemoved { enum_name, values } => Rendered {
            // Not expressible in plain DDL: removing a value requires
            // recreating the type and rewriting every dependent column.
            up_sql: format!(
                "-- WARNING: enum type \"{}\" has values {:?} that are absent from the source schema.\n\
                 -- Removing enum values requires recreating the type; handle manually.",
                enum_name, values
            ),
            down_sql: format!(
                "-- No reverse operation: enum values {:?} on type \"{}\" were not removed automatically.",
                values, enum_name
            ),
            dangerous: true,
        },
    }
}

/// Known PostgreSQL built-in types that are emitted unquoted. Anything else
/// is assumed to be a user-defined type (typically an enum) and quoted.
const BUILTIN_TYPES: &[&str] = &[
    "integer",
    "int",
    "int2",
    "int4",
    "int8",
    "smallint",
    "bigint",
    "serial",
    "serial4",
    "serial8",
    "smallserial",
    "bigserial",
    "text",
    "varchar",
    "character varying",
    "char",
    "character",
    "bpchar",
    "boolean",
    "bool",
    "real",
    "float4",
    "double precision",
    "float8",
    "numeric",
    "decimal",
    "date",
    "time",
    "timetz",
    "timestamp",
    "timestamptz",
    "timestamp without time zone",
    "timestamp with time zone",
    "time without time zone",
    "time with time zone",
    "uuid",
    "json",
    "jsonb",
    "xml",
    "bytea",
    "bit",
    "bit varying",
    "varbit",
    "inet",
    "cidr",
    "macaddr",
    "macaddr8",
    "money",
    "interval",
    "point",
    "line",
    "lseg",
    "box",
    "path",
    "polygon",
    "circle",
    "tsquery",
    "tsvector",
    "oid",
    "name",
    "regclass",
    "regtype",
];

fn is_builtin_type(data_type: &str) -> bool {
    let lower = data_type.to_lowercase();
    let base = lower
        .trim_end_matches("[]")
        .split('(')
        .next()
        .unwrap_or(&lower)
        .trim()
        .to_string();
    BUILTIN_TYPES.contains(&base.as_str())
}

/// Format a data type for DDL, quoting user-defined types only.
fn format_data_type(data_type: &str) -> String {
    if is_builtin_type(data_type) {
        data_type.to_string()
    } else {
        quote_ident(data_type)
    }
}

/// Double-quote an identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a string literal for single-quoted SQL.
fn escape_string(value: &str) -> String {
    value.replace('\'', "''")
}

fn quoted_column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A default of the form `nextval('..._seq'::regclass)` marks a serial
/// column; the renderer emits SERIAL syntax instead of the raw default.
fn is_serial_default(default: &str) -> bool {
    let lower = default.to_lowercase();
    lower.contains("nextval(") && lower.contains("_seq")
}

fn serial_type_for(data_type: &str) -> &'static str {
    match data_type {
        "bigint" => "BIGSERIAL",
        "smallint" => "SMALLSERIAL",
        _ => "SERIAL",
    }
}

/// Pull the sequence name out of a `nextval('name'::regclass)` default.
fn extract_sequence_name(default: &str) -> Option<String> {
    if !default.to_lowercase().contains("nextval(") {
        return None;
    }
    let start = default.find('\'')?;
    let end = default[start + 1..].find('\'')?;
    let seq_name = &default[start + 1..start + 1 + end];
    let unqualified = seq_name.split('.').next_back().unwrap_or(seq_name);
    Some(unqualified.to_string())
}

fn column_definition(column: &Column) -> String {
    if let Some(default) = &column.default_value {
        if is_serial_default(default) {
            let mut def = format!(
                "{} {}",
                quote_ident(&column.name),
                serial_type_for(&column.data_type)
            );
            if !column.is_nullable {
                def.push_str(" NOT NULL");
            }
            return def;
        }
    }

    let mut def = format!(
        "{} {}",
        quote_ident(&column.name),
        format_data_type(&column.data_type)
    );
    if !column.is_nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default_value {
        def.push_str(&format!(" DEFAULT {}", default));
    }
    def
}

fn create_table_sql(table: &Table) -> String {
    let mut sql = String::new();

    // Sequences referenced by nextval defaults must exist before the table.
    for column in &table.columns {
        if let Some(default) = &column.default_value {
            if !is_serial_default(default) {
                if let Some(seq_name) = extract_sequence_name(default) {
                    sql.push_str(&format!(
                        "CREATE SEQUENCE IF NOT EXISTS {};\n",
                        quote_ident(&seq_name)
                    ));
                }
            }
        }
    }

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("    {}", column_definition(c)))
        .collect();

    if let Some(pk) = &table.primary_key {
        parts.push(format!(
            "    CONSTRAINT {} PRIMARY KEY ({})",
            quote_ident(&pk.name),
            quoted_column_list(&pk.columns)
        ));
    }

    for uc in &table.unique_constraints {
        parts.push(format!(
            "    CONSTRAINT {} UNIQUE ({})",
            quote_ident(&uc.name),
            quoted_column_list(&uc.columns)
        ));
    }

    sql.push_str(&format!(
        "CREATE TABLE {} (\n{}\n);",
        quote_ident(&table.name),
        parts.join(",\n")
    ));

    for index in &table.indexes {
        sql.push('\n');
        sql.push_str(&create_index_sql(&table.name, index));
    }

    sql
}

fn add_column_sql(table: &str, column: &Column) -> String {
    let mut sql = String::new();

    if let Some(default) = &column.default_value {
        if is_serial_default(default) {
            sql.push_str(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_ident(table),
                quote_ident(&column.name),
                serial_type_for(&column.data_type)
            ));
            if !column.is_nullable {
                sql.push_str(" NOT NULL");
            }
            sql.push(';');
            return sql;
        }
        if let Some(seq_name) = extract_sequence_name(default) {
            sql.push_str(&format!(
                "CREATE SEQUENCE IF NOT EXISTS {};\n",
                quote_ident(&seq_name)
            ));
        }
    }

    sql.push_str(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_ident(table),
        quote_ident(&column.name),
        format_data_type(&column.data_type)
    ));
    if !column.is_nullable {
        sql.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default_value {
        sql.push_str(&format!(" DEFAULT {}", default));
    }
    sql.push(';');
    sql
}

fn drop_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
        quote_ident(table),
        quote_ident(column)
    )
}

fn alter_column_sql(table: &str, desired: &Column, current: &Column) -> (String, String) {
    let table_ident = quote_ident(table);
    let column_ident = quote_ident(&desired.name);
    let mut up = Vec::new();
    let mut down = Vec::new();

    if desired.data_type != current.data_type {
        let desired_type = format_data_type(&desired.data_type);
        let current_type = format_data_type(&current.data_type);
        up.push(format!(
            "ALTER TABLE {table_ident} ALTER COLUMN {column_ident} TYPE {desired_type} USING {column_ident}::{desired_type};"
        ));
        down.push(format!(
            "ALTER TABLE {table_ident} ALTER COLUMN {column_ident} TYPE {current_type} USING {column_ident}::{current_type};"
        ));
    }

    if desired.is_nullable != current.is_nullable {
        let (up_action, down_action) = if desired.is_nullable {
            ("DROP NOT NULL", "SET NOT NULL")
        } else {
            ("SET NOT NULL", "DROP NOT NULL")
        };
        up.push(format!(
            "ALTER TABLE {table_ident} ALTER COLUMN {column_ident} {up_action};"
        ));
        down.push(format!(
            "ALTER TABLE {table_ident} ALTER COLUMN {column_ident} {down_action};"
        ));
    }

    if desired.default_value != current.default_value {
        up.push(set_default_sql(&table_ident, &column_ident, &desired.default_value));
        down.push(set_default_sql(&table_ident, &column_ident, &current.default_value));
    }

    (up.join("\n"), down.join("\n"))
}

fn set_default_sql(table_ident: &str, column_ident: &str, default: &Option<String>) -> String {
    match default {
        Some(value) => format!(
            "ALTER TABLE {table_ident} ALTER COLUMN {column_ident} SET DEFAULT {value};"
        ),
        None => format!("ALTER TABLE {table_ident} ALTER COLUMN {column_ident} DROP DEFAULT;"),
    }
}

fn add_constraint_sql(table: &str, constraint: &Constraint) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {} ({});",
        quote_ident(table),
        quote_ident(&constraint.name),
        constraint.constraint_type.as_sql(),
        quoted_column_list(&constraint.columns)
    )
}

fn drop_constraint_sql(table: &str, constraint: &str) -> String {
    format!(
        "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
        quote_ident(table),
        quote_ident(constraint)
    )
}

fn create_index_sql(table: &str, index: &Index) -> String {
    let unique = if index.is_unique { "UNIQUE " } else { "" };
    let using = match index.index_type {
        IndexType::BTree => String::new(),
        other => format!(" USING {}", other.as_sql()),
    };
    format!(
        "CREATE {}INDEX {} ON {}{} ({});",
        unique,
        quote_ident(&index.name),
        quote_ident(table),
        using,
        quoted_column_list(&index.columns)
    )
}

fn drop_index_sql(name: &str) -> String {
    format!("DROP INDEX IF EXISTS {};", quote_ident(name))
}

fn create_enum_sql(enum_type: &EnumType) -> String {
    let values = enum_type
        .values
        .iter()
        .map(|v| format!("'{}'", escape_string(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TYPE {} AS ENUM ({});",
        quote_ident(&enum_type.name),
        values
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConstraintType;

    fn column(name: &str, data_type: &str, nullable: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: nullable,
            default_value: None,
            ordinal_position: 1,
        }
    }

    #[test]
    fn renders_added_table_with_primary_key() {
        let table = Table {
            name: "users".to_string(),
            columns: vec![column("id", "integer", false), column("email", "text", false)],
            primary_key: Some(Constraint {
                name: "users_pkey".to_string(),
                constraint_type: ConstraintType::PrimaryKey,
                columns: vec!["id".to_string()],
            }),
            unique_constraints: Vec::new(),
            indexes: Vec::new(),
        };

        let rendered = render(&SchemaChange::TableAdded(table));
        assert!(rendered.up_sql.starts_with("CREATE TABLE \"users\" ("));
        assert!(rendered.up_sql.contains("\"id\" integer NOT NULL"));
        assert!(rendered.up_sql.contains("\"email\" text NOT NULL"));
        assert!(rendered
            .up_sql
            .contains("CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")"));
        assert_eq!(rendered.down_sql, "DROP TABLE IF EXISTS \"users\" CASCADE;");
        assert!(!rendered.dangerous);
    }

    #[test]
    fn removed_column_reconstructs_definition_in_down() {
        let rendered = render(&SchemaChange::ColumnRemoved {
            table: "users".to_string(),
            column: column("email", "text", false),
        });
        assert_eq!(
            rendered.up_sql,
            "ALTER TABLE \"users\" DROP COLUMN IF EXISTS \"email\";"
        );
        assert_eq!(
            rendered.down_sql,
            "ALTER TABLE \"users\" ADD COLUMN \"email\" text NOT NULL;"
        );
        assert!(rendered.dangerous);
    }

    #[test]
    fn type_change_is_dangerous_and_uses_cast() {
        let rendered = render(&SchemaChange::ColumnModified {
            table: "users".to_string(),
            desired: column("age", "bigint", true),
            current: column("age", "integer", true),
        });
        assert!(rendered.dangerous);
        assert_eq!(
            rendered.up_sql,
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE bigint USING \"age\"::bigint;"
        );
        assert_eq!(
            rendered.down_sql,
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE integer USING \"age\"::integer;"
        );
    }

    #[test]
    fn tightening_nullability_is_dangerous_relaxing_is_not() {
        let tighten = render(&SchemaChange::ColumnModified {
            table: "users".to_string(),
            desired: column("email", "text", false),
            current: column("email", "text", true),
        });
        assert!(tighten.dangerous);
        assert!(tighten.up_sql.contains("SET NOT NULL"));
        assert!(tighten.down_sql.contains("DROP NOT NULL"));

        let relax = render(&SchemaChange::ColumnModified {
            table: "users".to_string(),
            desired: column("email", "text", true),
            current: column("email", "text", false),
        });
        assert!(!relax.dangerous);
        assert!(relax.up_sql.contains("DROP NOT NULL"));
    }

    #[test]
    fn default_change_is_safe_and_invertible() {
        let mut desired = column("status", "text", true);
        desired.default_value = Some("'active'".to_string());
        let current = column("status", "text", true);

        let rendered = render(&SchemaChange::ColumnModified {
            table: "users".to_string(),
            desired,
            current,
        });
        assert!(!rendered.dangerous);
        assert_eq!(
            rendered.up_sql,
            "ALTER TABLE \"users\" ALTER COLUMN \"status\" SET DEFAULT 'active';"
        );
        assert_eq!(
            rendered.down_sql,
            "ALTER TABLE \"users\" ALTER COLUMN \"status\" DROP DEFAULT;"
        );
    }

    #[test]
    fn serial_default_renders_as_serial_column() {
        let mut col = column("id", "integer", false);
        col.default_value = Some("nextval('users_id_seq'::regclass)".to_string());
        let rendered = render(&SchemaChange::ColumnAdded {
            table: "users".to_string(),
            column: col,
        });
        assert_eq!(
            rendered.up_sql,
            "ALTER TABLE \"users\" ADD COLUMN \"id\" SERIAL NOT NULL;"
        );
    }

    #[test]
    fn enum_type_is_quoted_in_column_definition() {
        let rendered = render(&SchemaChange::ColumnAdded {
            table: "users".to_string(),
            column: column("state", "user_status", true),
        });
        assert_eq!(
            rendered.up_sql,
            "ALTER TABLE \"users\" ADD COLUMN \"state\" \"user_status\";"
        );
    }

    #[test]
    fn btree_index_omits_using_clause() {
        let index = Index {
            name: "idx_users_email".to_string(),
            columns: vec!["email".to_string()],
            is_unique: true,
            index_type: IndexType::BTree,
        };
        let rendered = render(&SchemaChange::IndexAdded {
            table: "users".to_string(),
            index,
        });
        assert_eq!(
            rendered.up_sql,
            "CREATE UNIQUE INDEX \"idx_users_email\" ON \"users\" (\"email\");"
        );
        assert_eq!(rendered.down_sql, "DROP INDEX IF EXISTS \"idx_users_email\";");
    }

    #[test]
    fn gin_index_carries_using_clause() {
        let index = Index {
            name: "idx_docs_body".to_string(),
            columns: vec!["body".to_string()],
            is_unique: false,
            index_type: IndexType::Gin,
        };
        let rendered = render(&SchemaChange::IndexAdded {
            table: "docs".to_string(),
            index,
        });
        assert_eq!(
            rendered.up_sql,
            "CREATE INDEX \"idx_docs_body\" ON \"docs\" USING gin (\"body\");"
        );
    }

    #[test]
    fn enum_values_added_one_statement_per_value_in_order() {
        let rendered = render(&SchemaChange::EnumValuesAdded {
            enum_name: "status".to_string(),
            values: vec!["archived".to_string(), "deleted".to_string()],
        });
        assert_eq!(
            rendered.up_sql,
            "ALTER TYPE \"status\" ADD VALUE 'archived';\nALTER TYPE \"status\" ADD VALUE 'deleted';"
        );
        assert!(rendered.down_sql.starts_with("--"));
        assert!(!rendered.dangerous);
    }

    #[test]
    fn enum_values_removed_renders_comments_both_ways() {
        let rendered = render(&SchemaChange::EnumValuesRemoved {
            enum_name: "status".to_string(),
            values: vec!["legacy".to_string()],
        });
        assert!(rendered.up_sql.starts_with("--"));
        assert!(rendered.down_sql.starts_with("--"));
        assert!(rendered.dangerous);
    }

    #[test]
    fn constraint_modified_drops_then_adds_both_ways() {
        let desired = Constraint {
            name: "users_pkey".to_string(),
            constraint_type: ConstraintType::PrimaryKey,
            columns: vec!["id".to_string(), "tenant_id".to_string()],
        };
        let current = Constraint {
            name: "users_pkey".to_string(),
            constraint_type: ConstraintType::PrimaryKey,
            columns: vec!["id".to_string()],
        };
        let rendered = render(&SchemaChange::ConstraintModified {
            table: "users".to_string(),
            desired,
            current,
        });
        assert!(rendered.dangerous);
        assert!(rendered.up_sql.contains("DROP CONSTRAINT IF EXISTS \"users_pkey\""));
        assert!(rendered
            .up_sql
            .contains("ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\", \"tenant_id\")"));
        assert!(rendered
            .down_sql
            .contains("ADD CONSTRAINT \"users_pkey\" PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn identifiers_with_quotes_are_escaped() {
        assert_eq!(quote_ident("wei\"rd"), "\"wei\"\"rd\"");
        assert_eq!(escape_string("it's"), "it''s");
    }
}
