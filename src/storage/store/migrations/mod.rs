use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::core::error::HubError;
use crate::storage::constants::RootPrefix;
use crate::storage::db::{RocksDB, RocksdbError};
use crate::storage::store::migrations::m1_fix_link_type_padding::M1FixLinkTypePadding;

mod m1_fix_link_type_padding;

/// The latest DB schema version supported by this version of the code.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error during migration: {0}")]
    DbError(#[from] RocksdbError),

    #[error("Internal migration error: {0}")]
    InternalError(String),
}

impl From<MigrationError> for HubError {
    fn from(err: MigrationError) -> Self {
        HubError::internal_db_error(&err.to_string())
    }
}

impl From<HubError> for MigrationError {
    fn from(err: HubError) -> Self {
        MigrationError::InternalError(err.to_string())
    }
}

#[async_trait]
pub trait Migration: Send + Sync {
    /// The schema version this migration upgrades the DB to.
    fn to_db_version(&self) -> u32;

    fn description(&self) -> &str;

    async fn run(&self, db: Arc<RocksDB>) -> Result<(), MigrationError>;
}

fn make_schema_version_key() -> Vec<u8> {
    vec![RootPrefix::DBSchemaVersion as u8]
}

pub fn get_schema_version(db: &RocksDB) -> Result<u32, RocksdbError> {
    match db.get(&make_schema_version_key())? {
        Some(bytes) => Ok(u32::from_be_bytes(bytes.try_into().unwrap_or_default())),
        None => Ok(0),
    }
}

pub fn set_schema_version(db: &RocksDB, version: u32) -> Result<(), RocksdbError> {
    db.put(&make_schema_version_key(), &version.to_be_bytes())
}

pub struct MigrationRunner {
    db: Arc<RocksDB>,
    all_migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(db: Arc<RocksDB>) -> Self {
        let all_migrations: Vec<Box<dyn Migration>> = vec![
            Box::new(M1FixLinkTypePadding),
            // Future migrations append here
        ];

        Self { db, all_migrations }
    }

    #[cfg(test)]
    pub fn new_with_list(db: Arc<RocksDB>, migrations: Vec<Box<dyn Migration>>) -> Self {
        Self {
            db,
            all_migrations: migrations,
        }
    }

    /// Run every migration past the stored schema version, in order,
    /// persisting the version after each so a crash resumes where it left
    /// off. Returns the number of migrations run.
    pub async fn run_pending_migrations(self) -> Result<u32, MigrationError> {
        let db_version = get_schema_version(&self.db)?;

        for (i, migration) in self.all_migrations.iter().enumerate() {
            if migration.to_db_version() as usize != i + 1 {
                return Err(MigrationError::InternalError(format!(
                    "Migration version mismatch for '{}': expected {}, found {}",
                    migration.description(),
                    i + 1,
                    migration.to_db_version()
                )));
            }
        }

        let pending = self
            .all_migrations
            .into_iter()
            .skip(db_version as usize)
            .collect::<Vec<_>>();
        if pending.is_empty() {
            return Ok(0);
        }

        info!(
            db_version,
            code_version = LATEST_SCHEMA_VERSION,
            pending = pending.len(),
            "DB needs migrations, running..."
        );

        let mut run = 0;
        for migration in pending {
            info!(
                version = migration.to_db_version(),
                description = migration.description(),
                "Starting migration"
            );
            migration.run(self.db.clone()).await?;
            set_schema_version(&self.db, migration.to_db_version())?;
            run += 1;
            info!(
                version = migration.to_db_version(),
                "Migration completed successfully"
            );
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct TestMigration {
        version: u32,
        run_tracker: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl Migration for TestMigration {
        fn to_db_version(&self) -> u32 {
            self.version
        }

        fn description(&self) -> &str {
            "A test migration"
        }

        async fn run(&self, _db: Arc<RocksDB>) -> Result<(), MigrationError> {
            self.run_tracker.lock().await.push(self.version);
            Ok(())
        }
    }

    fn open_tmp_db() -> (Arc<RocksDB>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = RocksDB::new(tmp.path().join("db").to_str().unwrap());
        db.open().unwrap();
        (Arc::new(db), tmp)
    }

    #[tokio::test]
    async fn test_runner_runs_migrations_in_order_and_persists_version() {
        let (db, _tmp) = open_tmp_db();
        assert_eq!(get_schema_version(&db).unwrap(), 0);

        let run_tracker = Arc::new(Mutex::new(Vec::new()));
        let migrations: Vec<Box<dyn Migration>> = vec![
            Box::new(TestMigration {
                version: 1,
                run_tracker: run_tracker.clone(),
            }),
            Box::new(TestMigration {
                version: 2,
                run_tracker: run_tracker.clone(),
            }),
        ];

        let runner = MigrationRunner::new_with_list(db.clone(), migrations);
        assert_eq!(runner.run_pending_migrations().await.unwrap(), 2);

        assert_eq!(*run_tracker.lock().await, vec![1, 2]);
        assert_eq!(get_schema_version(&db).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_runner_skips_already_applied_migrations() {
        let (db, _tmp) = open_tmp_db();
        set_schema_version(&db, 1).unwrap();

        let run_tracker = Arc::new(Mutex::new(Vec::new()));
        let migrations: Vec<Box<dyn Migration>> = vec![
            Box::new(TestMigration {
                version: 1,
                run_tracker: run_tracker.clone(),
            }),
            Box::new(TestMigration {
                version: 2,
                run_tracker: run_tracker.clone(),
            }),
        ];

        let runner = MigrationRunner::new_with_list(db.clone(), migrations);
        assert_eq!(runner.run_pending_migrations().await.unwrap(), 1);

        assert_eq!(*run_tracker.lock().await, vec![2]);
        assert_eq!(get_schema_version(&db).unwrap(), 2);
    }
}
