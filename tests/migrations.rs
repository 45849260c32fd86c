//! End-to-end tests of the diff to migration-artifact pipeline.

use pgdelta::assemble::{assemble, list_migrations, read_meta, write_migration};
use pgdelta::diff::compare_schemas;
use pgdelta::error::Error;
use pgdelta::model::{
    Column, Constraint, ConstraintType, EnumType, Index, IndexType, SchemaModel, Table,
};

fn column(name: &str, data_type: &str, position: i32) -> Column {
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        is_nullable: false,
        default_value: None,
        ordinal_position: position,
    }
}

fn desired_schema() -> SchemaModel {
    SchemaModel {
        tables: vec![Table {
            name: "users".to_string(),
            columns: vec![
                column("id", "integer", 1),
                column("email", "varchar(255)", 2),
                column("status", "account_status", 3),
            ],
            primary_key: Some(Constraint {
                name: "users_pkey".to_string(),
                constraint_type: ConstraintType::PrimaryKey,
                columns: vec!["id".to_string()],
            }),
            unique_constraints: vec![Constraint {
                name: "users_email_key".to_string(),
                constraint_type: ConstraintType::Unique,
                columns: vec!["email".to_string()],
            }],
            indexes: vec![Index {
                name: "idx_users_status".to_string(),
                columns: vec!["status".to_string()],
                is_unique: false,
                index_type: IndexType::BTree,
            }],
        }],
        indexes: Vec::new(),
        enums: vec![EnumType {
            name: "account_status".to_string(),
            values: vec!["active".to_string(), "suspended".to_string()],
        }],
    }
}

#[test]
fn generate_write_and_list_round_trip() {
    let tmp = tempfile::tempdir().unwrap();

    let report = compare_schemas(&desired_schema(), &SchemaModel::new());
    let scripts = assemble(&report, "Initial Schema");
    let dir = write_migration(&scripts, tmp.path()).unwrap();

    let folder = dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(folder.ends_with("__initial_schema"));
    assert_eq!(folder.len(), 14 + 2 + "initial_schema".len());

    let up = std::fs::read_to_string(dir.join("up.sql")).unwrap();
    let down = std::fs::read_to_string(dir.join("down.sql")).unwrap();

    // The enum must exist before the table that uses it.
    let enum_pos = up.find("CREATE TYPE \"account_status\"").unwrap();
    let table_pos = up.find("CREATE TABLE \"users\"").unwrap();
    assert!(enum_pos < table_pos);

    // DOWN undoes UP in reverse.
    let drop_table = down.find("DROP TABLE IF EXISTS \"users\"").unwrap();
    let drop_enum = down.find("DROP TYPE IF EXISTS \"account_status\"").unwrap();
    assert!(drop_table < drop_enum);

    let meta = read_meta(&dir).unwrap();
    assert_eq!(meta.name, "Initial Schema");
    assert_eq!(meta.items_count, 2);
    assert!(!meta.has_dangerous);
    assert_eq!(meta.items.len(), 2);
    for item in &meta.items {
        assert!(!item.id.is_empty());
    }

    assert_eq!(list_migrations(tmp.path()).unwrap(), vec![dir]);
}

#[test]
fn dangerous_changes_are_flagged_in_meta() {
    let tmp = tempfile::tempdir().unwrap();

    // Dropping the whole schema is as dangerous as it gets.
    let report = compare_schemas(&SchemaModel::new(), &desired_schema());
    let scripts = assemble(&report, "teardown");
    assert!(scripts.meta.has_dangerous);

    let dir = write_migration(&scripts, tmp.path()).unwrap();
    let meta = read_meta(&dir).unwrap();
    assert!(meta.has_dangerous);
    assert!(meta.items.iter().any(|i| i.dangerous));

    let up = std::fs::read_to_string(dir.join("up.sql")).unwrap();
    assert!(up.contains("-- WARNING: this change can lose data"));
}

#[test]
fn column_type_change_round_trips_through_scripts() {
    let mut target = desired_schema();
    target.tables[0].columns[0].data_type = "bigint".to_string();

    let report = compare_schemas(&desired_schema(), &target);
    assert_eq!(report.items.len(), 1);

    let scripts = assemble(&report, "narrow id");
    assert!(scripts.up_sql.contains(
        "ALTER TABLE \"users\" ALTER COLUMN \"id\" TYPE integer USING \"id\"::integer;"
    ));
    assert!(scripts.down_sql.contains(
        "ALTER TABLE \"users\" ALTER COLUMN \"id\" TYPE bigint USING \"id\"::bigint;"
    ));
}

#[test]
fn duplicate_write_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let report = compare_schemas(&desired_schema(), &SchemaModel::new());
    let scripts = assemble(&report, "initial");

    write_migration(&scripts, tmp.path()).unwrap();
    // Same timestamp and name, so the folder collides.
    match write_migration(&scripts, tmp.path()) {
        Err(Error::MigrationExists { .. }) => {}
        other => panic!("expected MigrationExists, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn no_partial_artifacts_on_success() {
    let tmp = tempfile::tempdir().unwrap();
    let report = compare_schemas(&desired_schema(), &SchemaModel::new());
    let scripts = assemble(&report, "initial");
    write_migration(&scripts, tmp.path()).unwrap();

    let leftovers: Vec<String> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}
