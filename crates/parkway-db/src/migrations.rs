//! Versioned schema migrations.
//!
//! A run lists every available [`MigrationUnit`], sorts them by version
//! (byte-wise lexicographic, so `v10` sorts before `v2`), and applies the ones
//! not yet present in the `schema_migrations` ledger. The first failure stops
//! the run; units applied before it stay applied and recorded.
//!
//! Versions derived by a [`MigrationSource`] must be unique within one listing.
//! This is not checked.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parkway_common::{Error, Result};
use tracing::{debug, error, info};

use crate::executor::{StatementExecutor, Value};

pub const LEDGER_TABLE: &str = "schema_migrations";

const MIGRATION_EXTENSION: &str = "sql";

/// One versioned unit of schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub version: String,
    pub body: String,
}

impl MigrationUnit {
    pub fn new(version: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            body: body.into(),
        }
    }
}

/// Lists the migration units available to a run.
pub trait MigrationSource {
    fn units(&self) -> Result<Vec<MigrationUnit>>;
}

/// A fixed, in-memory list of units.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    units: Vec<MigrationUnit>,
}

impl StaticSource {
    pub fn new(units: Vec<MigrationUnit>) -> Self {
        Self { units }
    }
}

impl MigrationSource for StaticSource {
    fn units(&self) -> Result<Vec<MigrationUnit>> {
        Ok(self.units.clone())
    }
}

/// Reads `<version>.sql` files from a directory. Subdirectories and other
/// files are ignored.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MigrationSource for DirectorySource {
    fn units(&self) -> Result<Vec<MigrationUnit>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            Error::Database(format!(
                "failed to read migrations directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut units = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(MIGRATION_EXTENSION) {
                continue;
            }
            let Some(version) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let body = std::fs::read_to_string(&path).map_err(|e| {
                Error::Database(format!(
                    "failed to read migration file {}: {e}",
                    path.display()
                ))
            })?;
            units.push(MigrationUnit::new(version, body));
        }

        debug!(
            "found {} migration files in {}",
            units.len(),
            self.dir.display()
        );
        Ok(units)
    }
}

/// The migrations shipped with this crate, compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedSource;

const EMBEDDED: &[(&str, &str)] = &[
    (
        "0001_create_users.sql",
        include_str!("../migrations/0001_create_users.sql"),
    ),
    (
        "0002_users_name_index.sql",
        include_str!("../migrations/0002_users_name_index.sql"),
    ),
];

impl MigrationSource for EmbeddedSource {
    fn units(&self) -> Result<Vec<MigrationUnit>> {
        Ok(EMBEDDED
            .iter()
            .map(|&(file, body)| {
                let version = file.strip_suffix(".sql").unwrap_or(file);
                MigrationUnit::new(version, body)
            })
            .collect())
    }
}

/// A row of the `schema_migrations` ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub version: String,
    pub applied_at: DateTime<Utc>,
}

/// Durable record of which versions have been applied.
pub struct MigrationLedger {
    executor: Arc<dyn StatementExecutor>,
}

impl MigrationLedger {
    pub fn new(executor: Arc<dyn StatementExecutor>) -> Self {
        Self { executor }
    }

    /// Create the ledger table if it does not exist yet.
    pub fn ensure_storage(&self) -> Result<()> {
        self.executor
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (
                    version TEXT PRIMARY KEY,
                    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
                );"
            ))
            .inspect_err(|e| error!("failed to create {LEDGER_TABLE} table: {e}"))
    }

    pub fn applied_versions(&self) -> Result<BTreeSet<String>> {
        let rows = self
            .executor
            .query(&format!("SELECT version FROM {LEDGER_TABLE}"), &[])
            .inspect_err(|e| error!("failed to query applied migrations: {e}"))?;

        rows.iter()
            .map(|row| row.get_str(0).map(str::to_string))
            .collect()
    }

    /// Insert `version`. Fails with [`Error::DuplicateKey`] if it is already
    /// recorded.
    pub fn record(&self, version: &str) -> Result<()> {
        self.executor
            .execute(
                &format!("INSERT INTO {LEDGER_TABLE} (version) VALUES (?1)"),
                &[Value::from(version)],
            )
            .map(|_| ())
            .map_err(|e| match e {
                Error::DuplicateKey(_) => {
                    Error::DuplicateKey(format!("{LEDGER_TABLE}.version = {version}"))
                }
                other => other,
            })
            .inspect_err(|e| error!("failed to record migration {version}: {e}"))
    }

    /// All entries in insertion order.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let rows = self.executor.query(
            &format!("SELECT version, applied_at FROM {LEDGER_TABLE} ORDER BY rowid"),
            &[],
        )?;

        rows.iter()
            .map(|row| {
                let version = row.get_str(0)?.to_string();
                let applied_at = row
                    .get_opt_str(1)?
                    .ok_or_else(|| {
                        Error::Database(format!("migration {version} has no applied_at"))
                    })
                    .and_then(parse_timestamp)?;
                Ok(LedgerEntry {
                    version,
                    applied_at,
                })
            })
            .collect()
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Applies pending units in version order, each at most once.
pub struct MigrationRunner {
    executor: Arc<dyn StatementExecutor>,
    ledger: MigrationLedger,
}

impl MigrationRunner {
    pub fn new(executor: Arc<dyn StatementExecutor>) -> Self {
        Self {
            ledger: MigrationLedger::new(Arc::clone(&executor)),
            executor,
        }
    }

    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Apply every unit of `source` that the ledger does not know about yet.
    ///
    /// Stops at the first unit whose body or ledger insert fails and returns
    /// [`Error::Migration`] naming that version. Later units are not attempted.
    pub fn run(&self, source: &dyn MigrationSource) -> Result<MigrationReport> {
        self.ledger.ensure_storage()?;
        let applied = self.ledger.applied_versions()?;
        let units = sorted_units(source)?;

        let mut report = MigrationReport::default();
        for unit in units {
            if applied.contains(&unit.version) {
                info!("migration {} already applied, skipping", unit.version);
                report.skipped.push(unit.version);
                continue;
            }

            info!("applying migration {}", unit.version);
            self.apply(&unit).map_err(|e| {
                error!("failed to apply migration {}: {e}", unit.version);
                Error::migration(&unit.version, e)
            })?;
            info!("applied migration {}", unit.version);
            report.applied.push(unit.version);
        }

        Ok(report)
    }

    /// Versions that a run against `source` would apply, in order.
    pub fn pending(&self, source: &dyn MigrationSource) -> Result<Vec<String>> {
        self.ledger.ensure_storage()?;
        let applied = self.ledger.applied_versions()?;

        Ok(sorted_units(source)?
            .into_iter()
            .map(|unit| unit.version)
            .filter(|version| !applied.contains(version))
            .collect())
    }

    // Bodies run outside a transaction: some backends reject schema changes
    // inside one. The ledger insert only happens after the body succeeded.
    fn apply(&self, unit: &MigrationUnit) -> Result<()> {
        self.executor.execute_batch(&unit.body)?;
        self.ledger.record(&unit.version)
    }
}

fn sorted_units(source: &dyn MigrationSource) -> Result<Vec<MigrationUnit>> {
    let mut units = source.units()?;
    units.sort_by(|a, b| a.version.cmp(&b.version));
    Ok(units)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // CURRENT_TIMESTAMP produces "YYYY-MM-DD HH:MM:SS"
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Database(format!("invalid applied_at {s:?}: {e}")))
}
