use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pgdelta::assemble;
use pgdelta::diff::{compare_schemas, DiffReport};
use pgdelta::merge::{merge_schemas, MergeStrategy};
use pgdelta::model::SchemaModel;
use pgdelta::pg::{introspect_schema, PgConnection};
use pgdelta::versions::VersionStore;

#[derive(Parser)]
#[command(name = "pgdelta")]
#[command(about = "PostgreSQL schema diff and reversible migrations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two databases and show the differences
    Diff {
        /// Desired-state database URL; may repeat, later ones merged in
        #[arg(long, required = true)]
        source: Vec<String>,
        #[arg(long)]
        target: String,
        /// On duplicate names across sources, let the last one win
        #[arg(long)]
        prefer_last: bool,
    },

    /// Generate a reversible migration from the differences
    Generate {
        #[arg(long, required = true)]
        source: Vec<String>,
        #[arg(long)]
        target: String,
        /// Human-readable migration name
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "migrations")]
        out_dir: PathBuf,
        #[arg(long)]
        prefer_last: bool,
    },

    /// Apply a generated migration to a database
    Apply {
        #[arg(long, env = "DATABASE_URL")]
        database: String,
        /// Migration directory containing up.sql and meta.json
        #[arg(long)]
        migration: PathBuf,
        /// Required when the migration contains dangerous items
        #[arg(long)]
        allow_destructive: bool,
        /// Run down.sql instead of up.sql
        #[arg(long)]
        down: bool,
    },

    /// List generated migrations, newest first
    Migrations {
        #[arg(long, default_value = "migrations")]
        dir: PathBuf,
    },

    /// Save a named snapshot of a database schema
    Snapshot {
        #[arg(long, env = "DATABASE_URL")]
        database: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        tag: Vec<String>,
        #[arg(long, default_value = ".pgdelta")]
        store: PathBuf,
    },

    /// List or compare saved snapshots
    Versions {
        #[arg(long, default_value = ".pgdelta")]
        store: PathBuf,
        /// Compare two versions by name or id, migrating FROM toward TO
        #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
        compare: Option<Vec<String>>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Diff {
            source,
            target,
            prefer_last,
        } => {
            let report = diff_databases(&source, &target, prefer_last).await?;
            print_report(&report);
            Ok(())
        }
        Commands::Generate {
            source,
            target,
            name,
            out_dir,
            prefer_last,
        } => {
            let report = diff_databases(&source, &target, prefer_last).await?;
            if report.items.is_empty() {
                println!("Schemas are identical, nothing to generate");
                return Ok(());
            }
            let scripts = assemble::assemble(&report, &name);
            let dir = assemble::write_migration(&scripts, &out_dir)?;
            println!("Wrote migration to {}", dir.display());
            if scripts.meta.has_dangerous {
                println!("WARNING: migration contains dangerous changes, review before applying");
            }
            Ok(())
        }
        Commands::Apply {
            database,
            migration,
            allow_destructive,
            down,
        } => {
            let meta = assemble::read_meta(&migration)?;
            if meta.has_dangerous && !allow_destructive {
                anyhow::bail!(
                    "migration '{}' contains dangerous changes; re-run with --allow-destructive",
                    meta.name
                );
            }

            let connection = PgConnection::new(&database).await?;
            let result = if down {
                pgdelta::apply::revert_migration_dir(connection.pool(), &migration).await
            } else {
                pgdelta::apply::apply_migration_dir(connection.pool(), &migration).await
            };
            match result {
                Ok(log) => {
                    for line in &log {
                        println!("{line}");
                    }
                    Ok(())
                }
                Err(e) => {
                    if let Some(log) = e.partial_log() {
                        for line in log {
                            eprintln!("{line}");
                        }
                    }
                    Err(e.into())
                }
            }
        }
        Commands::Migrations { dir } => {
            let migrations = assemble::list_migrations(&dir)?;
            if migrations.is_empty() {
                println!("No migrations found in {}", dir.display());
                return Ok(());
            }
            for path in migrations {
                match assemble::read_meta(&path) {
                    Ok(meta) => {
                        let marker = if meta.has_dangerous { " [dangerous]" } else { "" };
                        println!(
                            "{}  {} ({} items){}",
                            meta.timestamp, meta.name, meta.items_count, marker
                        );
                    }
                    Err(_) => println!("{}  (missing meta.json)", path.display()),
                }
            }
            Ok(())
        }
        Commands::Snapshot {
            database,
            name,
            description,
            tag,
            store,
        } => {
            let connection = PgConnection::new(&database).await?;
            let schema = introspect_schema(connection.pool()).await?;
            let store = VersionStore::new(store);
            let version = store.create(&name, &description, &database_name(&database), schema, tag)?;
            println!("Saved version '{}' ({})", version.name, version.id);
            Ok(())
        }
        Commands::Versions { store, compare } => {
            let store = VersionStore::new(store);
            match compare {
                Some(pair) => {
                    let report = store.compare(&pair[0], &pair[1])?;
                    print_report(&report);
                }
                None => {
                    for version in store.load()? {
                        println!(
                            "{}  {}  {}  {}",
                            version.created_at, version.name, version.database_name, version.id
                        );
                    }
                }
            }
            Ok(())
        }
    }
}

/// Introspect every source, merge them, introspect the target and diff.
async fn diff_databases(
    sources: &[String],
    target: &str,
    prefer_last: bool,
) -> Result<DiffReport> {
    let mut source_models = Vec::new();
    for url in sources {
        let connection = PgConnection::new(url).await?;
        source_models.push(introspect_schema(connection.pool()).await?);
    }
    let strategy = if prefer_last {
        MergeStrategy::LastSeenWins
    } else {
        MergeStrategy::FirstSeenWins
    };
    let source: SchemaModel = merge_schemas(&source_models, strategy);

    let target_connection = PgConnection::new(target).await?;
    let target_model = introspect_schema(target_connection.pool()).await?;

    let mut report = compare_schemas(&source, &target_model);
    report.source_connection = sources
        .iter()
        .map(|u| database_name(u))
        .collect::<Vec<_>>()
        .join(",");
    report.target_connection = database_name(target);
    Ok(report)
}

fn print_report(report: &DiffReport) {
    if report.items.is_empty() {
        println!("Schemas are identical");
        return;
    }
    println!("Found {} difference(s):", report.items.len());
    for item in &report.items {
        let marker = if item.dangerous { " [dangerous]" } else { "" };
        println!("  {:?} {:?} {}: {}{}", item.kind, item.object_type, item.object_name, item.details, marker);
    }
    if report.has_dangerous() {
        println!("\nSome changes can lose data; generated migrations will flag them");
    }
}

/// Last path segment of a connection URL, for display only.
fn database_name(url: &str) -> String {
    url.rsplit('/')
        .next()
        .map(|s| s.split('?').next().unwrap_or(s))
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
