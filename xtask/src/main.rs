// Copyright (C) 2024-2025 Fred Clausen and the ratatui project contributors
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

//! # xtask - Project Automation
//!
//! - `cargo xtask ci` runs lint, dependency checks, build, tests and the
//!   migration check
//! - `cargo xtask verify-migrations` applies the embedded `SQLite`
//!   migrations to a scratch database, checks the resulting schema, reverts
//!   everything and applies it again
//!
//! Standard `cargo test` stays infrastructure-free; every database used here
//! is in memory.

#![deny(
    clippy::pedantic,
    //clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all
)]

use std::{fmt::Debug, io, process::Output, vec};

use cargo_metadata::MetadataCommand;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use color_eyre::{eyre::Context, Result};
use diesel::sql_types::{Integer, Text};
use diesel::{Connection, QueryableByName, SqliteConnection};
use duct::cmd;
use std::collections::{BTreeMap, BTreeSet};
use tracing::level_filters::LevelFilter;
use tracing_log::AsTrace;

/// Tables the ledger store expects after all migrations ran.
const EXPECTED_TABLES: [&str; 8] = [
    "affiliate_config",
    "audit_events",
    "commissions",
    "fraud_alerts",
    "profile_codes",
    "profiles",
    "referrals",
    "withdrawals",
];

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .without_time()
        .init();

    match args.run() {
        Ok(()) => (),
        Err(err) => {
            tracing::error!("{err}");
            std::process::exit(1);
        }
    }
    Ok(())
}

#[derive(Debug, Parser)]
#[command(bin_name = "cargo xtask", styles = clap_cargo::style::CLAP_STYLING)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

impl Args {
    fn run(self) -> Result<()> {
        self.command.run()
    }

    fn log_level(&self) -> LevelFilter {
        self.verbosity.log_level_filter().as_trace()
    }
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Run CI checks (lint, build, test)
    CI,

    /// Build the project
    #[command(visible_alias = "b")]
    Build,

    /// Run cargo check
    #[command(visible_alias = "c")]
    Check,

    /// Generate code coverage report
    #[command(visible_alias = "cov")]
    Coverage,

    /// Check dependencies
    #[command(visible_alias = "cd")]
    Deny,

    // Check unused dependencies
    #[command(visible_alias = "m")]
    Machete,

    /// Lint formatting, typos, clippy, and docs
    #[command(visible_alias = "l")]
    Lint,

    /// Run clippy on the project
    #[command(visible_alias = "cl")]
    LintClippy,

    /// Check documentation for errors and warnings
    #[command(visible_alias = "d")]
    LintDocs,

    /// Check for formatting issues in the project
    #[command(visible_alias = "lf")]
    LintFormatting,

    /// Lint markdown files
    #[command(visible_alias = "md")]
    LintMarkdown,

    /// Check for typos in the project
    #[command(visible_alias = "lt")]
    LintTypos,

    /// Fix clippy warnings in the project
    #[command(visible_alias = "fc")]
    FixClippy,

    /// Fix formatting issues in the project
    #[command(visible_alias = "fmt")]
    FixFormatting,

    /// Fix typos in the project
    #[command(visible_alias = "typos")]
    FixTypos,

    /// Run tests
    #[command(visible_alias = "t")]
    Test,

    /// Run doc tests
    #[command(visible_alias = "td")]
    TestDocs,

    /// Run lib tests
    #[command(visible_alias = "tl")]
    TestLibs,

    /// Apply, revert and re-apply the `SQLite` migrations and check the schema
    #[command(visible_alias = "vm")]
    VerifyMigrations,
}

impl Command {
    fn run(self) -> Result<()> {
        match self {
            Self::CI => ci(),
            Self::Build => build(),
            Self::Check => check(),
            Self::Deny => deny(),
            Self::Machete => machete(),
            Self::Coverage => coverage(),
            Self::Lint => lint(),
            Self::LintClippy => lint_clippy(),
            Self::LintDocs => lint_docs(),
            Self::LintFormatting => lint_format(),
            Self::LintTypos => lint_typos(),
            Self::LintMarkdown => lint_markdown(),
            Self::FixClippy => fix_clippy(),
            Self::FixFormatting => fix_format(),
            Self::FixTypos => fix_typos(),
            Self::Test => test(),
            Self::TestDocs => test_docs(),
            Self::TestLibs => test_libs(),
            Self::VerifyMigrations => verify_migrations(),
        }
    }
}

/// Run CI checks (lint, build, test)
fn ci() -> Result<()> {
    lint()?;
    deny()?;
    machete()?;
    build()?;
    test()?;
    verify_migrations()?;
    Ok(())
}

fn deny() -> Result<()> {
    run_cargo(vec!["deny", "check"])
}

fn machete() -> Result<()> {
    cmd!("cargo-machete").run_with_trace()?;
    Ok(())
}

/// Build the project
fn build() -> Result<()> {
    run_cargo(vec!["build", "--all-targets", "--all-features"])
}

/// Run cargo check
fn check() -> Result<()> {
    run_cargo(vec!["check", "--all-targets", "--all-features"])
}

/// Generate code coverage report
fn coverage() -> Result<()> {
    run_cargo(vec![
        "llvm-cov",
        "--lcov",
        "--output-path",
        "target/lcov.info",
        "--all-features",
    ])
}

/// Lint formatting, typos, clippy, and docs (and a soft fail on markdown)
fn lint() -> Result<()> {
    lint_clippy()?;
    lint_docs()?;
    lint_format()?;
    lint_typos()?;
    if let Err(err) = lint_markdown() {
        tracing::warn!("known issue: markdownlint is currently noisy and can be ignored: {err}");
    }
    Ok(())
}

/// Run clippy on the project
fn lint_clippy() -> Result<()> {
    run_cargo(vec![
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ])
}

/// Fix clippy warnings in the project
fn fix_clippy() -> Result<()> {
    run_cargo(vec![
        "clippy",
        "--all-targets",
        "--all-features",
        "--fix",
        "--allow-dirty",
        "--allow-staged",
        "--",
        "-D",
        "warnings",
    ])
}

/// Check that docs build without errors using docs.rs-equivalent flags
fn lint_docs() -> Result<()> {
    let meta = MetadataCommand::new()
        .exec()
        .wrap_err("failed to get cargo metadata")?;

    for package in meta.workspace_default_packages() {
        cmd(
            "cargo",
            [
                "doc",
                "--no-deps",
                "--all-features",
                "--package",
                &package.name,
            ],
        )
        .env_remove("CARGO")
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .env("RUSTDOCFLAGS", "--cfg docsrs -D warnings")
        .run_with_trace()?;
    }

    Ok(())
}

/// Lint formatting issues in the project
fn lint_format() -> Result<()> {
    run_cargo_nightly(vec!["fmt", "--all", "--check"])
}

/// Fix formatting issues in the project
fn fix_format() -> Result<()> {
    run_cargo_nightly(vec!["fmt", "--all"])
}

/// Lint markdown files using [markdownlint-cli2](https://github.com/DavidAnson/markdownlint-cli2)
fn lint_markdown() -> Result<()> {
    cmd!("markdownlint-cli2", "**/*.md", "!target", "!**/target").run_with_trace()?;

    Ok(())
}

/// Check for typos in the project using [typos-cli](https://github.com/crate-ci/typos/)
fn lint_typos() -> Result<()> {
    cmd!("typos").run_with_trace()?;
    Ok(())
}

/// Fix typos in the project
fn fix_typos() -> Result<()> {
    cmd!("typos", "-w").run_with_trace()?;
    Ok(())
}

/// Run lib and doc tests
fn test() -> Result<()> {
    test_libs()?;
    test_docs()?; // run last because it's slow
    Ok(())
}

/// Run doc tests for the workspace's default packages
fn test_docs() -> Result<()> {
    run_cargo(vec!["test", "--doc", "--all-features"])
}

/// Run lib tests for the workspace's default packages
fn test_libs() -> Result<()> {
    run_cargo(vec!["test", "--all-targets", "--all-features"])
}

/// Run a cargo subcommand with the default toolchain
fn run_cargo(args: Vec<&str>) -> Result<()> {
    cmd("cargo", args).run_with_trace()?;
    Ok(())
}

/// Run a cargo subcommand with the nightly toolchain
fn run_cargo_nightly(args: Vec<&str>) -> Result<()> {
    cmd("cargo", args)
        // CARGO env var is set because we're running in a cargo subcommand
        .env_remove("CARGO")
        .env("RUSTUP_TOOLCHAIN", "nightly")
        .run_with_trace()?;
    Ok(())
}

/// Verify the embedded `SQLite` migrations
///
/// 1. Applies every migration to an in-memory database
/// 2. Checks that the expected tables exist and that a referrer can hold at
///    most one active withdrawal
/// 3. Reverts every migration and checks that no table is left behind
/// 4. Applies everything again and checks the schema is unchanged
///
/// ## Usage
///
/// ```bash
/// cargo xtask verify-migrations
/// ```
fn verify_migrations() -> Result<()> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("../crates/persistence/migrations");

    tracing::info!("Applying SQLite migrations");
    let mut conn = SqliteConnection::establish(":memory:")
        .wrap_err("Failed to open in-memory SQLite database")?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to apply SQLite migrations: {}", e))?;
    let first = introspect_sqlite_schema(&mut conn)?;

    let actual: BTreeSet<&str> = first.tables.keys().map(String::as_str).collect();
    let expected: BTreeSet<&str> = EXPECTED_TABLES.into_iter().collect();
    if actual != expected {
        return Err(color_eyre::eyre::eyre!(
            "❌ Migration check FAILED: table mismatch\n  missing: {:?}\n  unexpected: {:?}",
            expected.difference(&actual).collect::<Vec<_>>(),
            actual.difference(&expected).collect::<Vec<_>>()
        ));
    }
    let withdrawals = &first.tables["withdrawals"];
    if !withdrawals
        .indexes
        .iter()
        .any(|idx| idx.unique && idx.partial && idx.columns == ["referrer_id"])
    {
        return Err(color_eyre::eyre::eyre!(
            "❌ Migration check FAILED: withdrawals lacks the one-active-per-referrer unique index"
        ));
    }

    tracing::info!("Reverting SQLite migrations");
    conn.revert_all_migrations(MIGRATIONS)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to revert SQLite migrations: {}", e))?;
    let reverted = introspect_sqlite_schema(&mut conn)?;
    if !reverted.tables.is_empty() {
        return Err(color_eyre::eyre::eyre!(
            "❌ Migration check FAILED: tables left after revert: {:?}",
            reverted.tables.keys().collect::<Vec<_>>()
        ));
    }

    tracing::info!("Re-applying SQLite migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to re-apply SQLite migrations: {}", e))?;
    let second = introspect_sqlite_schema(&mut conn)?;
    compare_schemas(&first, &second)?;

    tracing::info!("✓ Migration verification passed");
    Ok(())
}

/// Normalized schema representation
#[derive(Debug, Clone, PartialEq, Eq)]
struct Schema {
    tables: BTreeMap<String, Table>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Table {
    columns: BTreeMap<String, Column>,
    primary_keys: BTreeSet<String>,
    foreign_keys: BTreeSet<ForeignKey>,
    unique_constraints: BTreeSet<UniqueConstraint>,
    indexes: BTreeSet<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Column {
    name: String,
    normalized_type: String,
    nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ForeignKey {
    from_column: String,
    to_table: String,
    to_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct UniqueConstraint {
    columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Index {
    name: String,
    columns: Vec<String>,
    unique: bool,
    partial: bool,
}

/// Introspect `SQLite` schema
#[allow(clippy::too_many_lines)]
fn introspect_sqlite_schema(conn: &mut SqliteConnection) -> Result<Schema> {
    use diesel::RunQueryDsl;

    #[derive(QueryableByName)]
    struct TableName {
        #[diesel(sql_type = Text)]
        name: String,
    }

    #[derive(QueryableByName)]
    struct ColumnInfo {
        #[diesel(sql_type = Integer)]
        #[allow(dead_code)]
        cid: i32,
        #[diesel(sql_type = Text)]
        name: String,
        #[diesel(sql_type = Text)]
        r#type: String,
        #[diesel(sql_type = Integer)]
        notnull: i32,
        #[diesel(sql_type = Integer)]
        pk: i32,
    }

    #[derive(QueryableByName)]
    struct ForeignKeyInfo {
        #[diesel(sql_type = Text)]
        table: String,
        #[diesel(sql_type = Text)]
        from: String,
        #[diesel(sql_type = Text)]
        to: String,
    }

    #[derive(QueryableByName)]
    struct IndexInfo {
        #[diesel(sql_type = Text)]
        name: String,
        #[diesel(sql_type = Integer)]
        unique: i32,
        #[diesel(sql_type = Text)]
        origin: String,
        #[diesel(sql_type = Integer)]
        partial: i32,
    }

    #[derive(QueryableByName)]
    struct IndexColumnInfo {
        #[diesel(sql_type = Text)]
        name: String,
    }

    let mut schema = Schema {
        tables: BTreeMap::new(),
    };

    // Get all tables
    let tables: Vec<TableName> = diesel::sql_query(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '__diesel_schema_migrations' ORDER BY name"
    )
    .load(conn)
    .wrap_err("Failed to query SQLite tables")?;

    for table in tables {
        let mut table_info = Table {
            columns: BTreeMap::new(),
            primary_keys: BTreeSet::new(),
            foreign_keys: BTreeSet::new(),
            unique_constraints: BTreeSet::new(),
            indexes: BTreeSet::new(),
        };

        // Get columns
        let columns: Vec<ColumnInfo> =
            diesel::sql_query(format!("PRAGMA table_info({})", table.name))
                .load(conn)
                .wrap_err(format!("Failed to get columns for table {}", table.name))?;

        for col in columns {
            let normalized_type = normalize_sqlite_type(&col.r#type);
            table_info.columns.insert(
                col.name.clone(),
                Column {
                    name: col.name.clone(),
                    normalized_type,
                    nullable: col.notnull == 0,
                },
            );

            if col.pk > 0 {
                table_info.primary_keys.insert(col.name);
            }
        }

        // Get foreign keys
        let fks: Vec<ForeignKeyInfo> =
            diesel::sql_query(format!("PRAGMA foreign_key_list({})", table.name))
                .load(conn)
                .wrap_err(format!(
                    "Failed to get foreign keys for table {}",
                    table.name
                ))?;

        for fk in fks {
            table_info.foreign_keys.insert(ForeignKey {
                from_column: fk.from,
                to_table: fk.table,
                to_column: fk.to,
            });
        }

        // Get indexes and unique constraints
        let indexes: Vec<IndexInfo> =
            diesel::sql_query(format!("PRAGMA index_list({})", table.name))
                .load(conn)
                .wrap_err(format!("Failed to get indexes for table {}", table.name))?;

        for idx in indexes {
            let index_columns: Vec<IndexColumnInfo> =
                diesel::sql_query(format!("PRAGMA index_info({})", idx.name))
                    .load(conn)
                    .wrap_err(format!("Failed to get index columns for {}", idx.name))?;

            let column_names: Vec<String> = index_columns.into_iter().map(|c| c.name).collect();

            // If origin is 'u', it's a unique constraint (including sqlite_autoindex_*)
            if idx.origin == "u" {
                table_info.unique_constraints.insert(UniqueConstraint {
                    columns: column_names,
                });
            } else if !idx.name.starts_with("sqlite_autoindex_") {
                // Regular index (skip auto-generated indexes that aren't unique constraints)
                table_info.indexes.insert(Index {
                    name: idx.name,
                    columns: column_names,
                    unique: idx.unique != 0,
                    partial: idx.partial != 0,
                });
            }
        }

        schema.tables.insert(table.name, table_info);
    }

    Ok(schema)
}

/// Compares two schemas table by table
fn compare_schemas(expected: &Schema, actual: &Schema) -> Result<()> {
    for (table_name, expected_table) in &expected.tables {
        let Some(actual_table) = actual.tables.get(table_name) else {
            return Err(color_eyre::eyre::eyre!(
                "❌ Schema check FAILED: table '{}' is missing",
                table_name
            ));
        };
        if expected_table.columns != actual_table.columns {
            return Err(color_eyre::eyre::eyre!(
                "❌ Schema check FAILED: column mismatch in table '{}'\n  expected: {:?}\n  actual: {:?}",
                table_name,
                expected_table.columns.values().collect::<Vec<_>>(),
                actual_table.columns.values().collect::<Vec<_>>()
            ));
        }
        if expected_table.primary_keys != actual_table.primary_keys {
            return Err(color_eyre::eyre::eyre!(
                "❌ Schema check FAILED: primary key mismatch in table '{}'\n  expected: {:?}\n  actual: {:?}",
                table_name,
                expected_table.primary_keys,
                actual_table.primary_keys
            ));
        }
        if expected_table.foreign_keys != actual_table.foreign_keys {
            return Err(color_eyre::eyre::eyre!(
                "❌ Schema check FAILED: foreign key mismatch in table '{}'\n  expected: {:?}\n  actual: {:?}",
                table_name,
                expected_table.foreign_keys,
                actual_table.foreign_keys
            ));
        }
        if expected_table.unique_constraints != actual_table.unique_constraints
            || expected_table.indexes != actual_table.indexes
        {
            return Err(color_eyre::eyre::eyre!(
                "❌ Schema check FAILED: index mismatch in table '{}'",
                table_name
            ));
        }
    }
    if let Some(extra) = actual
        .tables
        .keys()
        .find(|name| !expected.tables.contains_key(*name))
    {
        return Err(color_eyre::eyre::eyre!(
            "❌ Schema check FAILED: unexpected table '{}'",
            extra
        ));
    }
    Ok(())
}

/// Normalizes a `SQLite` declared type to its affinity
fn normalize_sqlite_type(declared: &str) -> String {
    let upper = declared.to_uppercase();
    if upper.contains("INT") {
        String::from("INTEGER")
    } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
        String::from("TEXT")
    } else if upper.contains("BLOB") || upper.is_empty() {
        String::from("BLOB")
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        String::from("REAL")
    } else {
        String::from("NUMERIC")
    }
}

/// An extension trait for `duct::Expression` that logs the command being run
/// before running it.
trait ExpressionExt {
    /// Run the command and log the command being run
    fn run_with_trace(&self) -> io::Result<Output>;
}

impl ExpressionExt for duct::Expression {
    fn run_with_trace(&self) -> io::Result<Output> {
        tracing::info!("running command: {:?}", self);
        self.run().inspect_err(|_| {
            // The command that was run may have scrolled off the screen, so repeat it here
            tracing::error!("failed to run command: {:?}", self);
        })
    }
}
