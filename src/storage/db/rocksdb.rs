use crate::core::error::HubError;
use crate::storage::util::increment_vec_u8;
use rocksdb::{Options, TransactionDB, DB};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard};
use thiserror::Error;
use tokio::time::Duration;
use tracing::info;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RocksdbError {
    #[error(transparent)]
    InternalError(#[from] rocksdb::Error),

    #[error("Unable to decode record")]
    DecodeError,

    #[error("DB is not open")]
    DbNotOpen,

    #[error("DB is read only")]
    ReadOnly,

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// A set of key/value mutations that commit together. Kept ordered so a batch
/// replays deterministically; overlapping writes within a batch resolve to
/// the last write.
#[derive(Debug, Clone, Default)]
pub struct RocksDbTransactionBatch {
    pub batch: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl RocksDbTransactionBatch {
    pub fn new() -> RocksDbTransactionBatch {
        RocksDbTransactionBatch {
            batch: BTreeMap::new(),
        }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.batch.insert(key, Some(value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.batch.insert(key, None);
    }

    pub fn get(&self, key: &[u8]) -> Option<&Option<Vec<u8>>> {
        self.batch.get(key)
    }

    pub fn merge(&mut self, other: RocksDbTransactionBatch) {
        for (key, value) in other.batch {
            self.batch.insert(key, value);
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

struct IteratorOptions {
    opts: rocksdb::ReadOptions,
    reverse: bool,
}

enum DbProvider {
    Transaction(TransactionDB),
    ReadOnly(DB),
}

/// Thin wrapper over a RocksDB TransactionDB. The database is the single
/// source of truth for all hub state; everything else is rebuildable from it.
#[derive(Default)]
pub struct RocksDB {
    inner: RwLock<Option<DbProvider>>,
    pub path: String,
}

/// Cursor-style paging for range reads. The `page_token` is the raw last key
/// of the previous page and is treated as opaque by callers.
#[derive(Debug, Default)]
pub struct PageOptions {
    pub page_size: Option<usize>,
    pub page_token: Option<Vec<u8>>,
    pub reverse: bool,
}

impl std::fmt::Debug for RocksDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDB").field("path", &self.path).finish()
    }
}

impl RocksDB {
    pub fn new(path: &str) -> RocksDB {
        RocksDB {
            inner: RwLock::new(None),
            path: path.to_string(),
        }
    }

    pub fn open_at(path: &str) -> Result<Arc<RocksDB>, RocksdbError> {
        let db = RocksDB::new(path);
        db.open()?;
        Ok(Arc::new(db))
    }

    pub fn open(&self) -> Result<(), RocksdbError> {
        info!(path = self.path, "Opening RocksDB database");
        let mut inner = self.inner.write().unwrap();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut tx_db_opts = rocksdb::TransactionDBOptions::default();
        tx_db_opts.set_default_lock_timeout(5000); // 5 seconds

        let db = rocksdb::TransactionDB::open(&opts, &tx_db_opts, &self.path)?;
        *inner = Some(DbProvider::Transaction(db));

        Ok(())
    }

    /// Open a second read-only handle on the same files. Used by offline
    /// tooling (backfills) while a primary may be running.
    pub fn open_read_only(&self) -> Result<Self, RocksdbError> {
        let _guard = self.inner.write().unwrap();

        let mut opts = Options::default();
        opts.create_if_missing(false);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = rocksdb::DB::open_for_read_only(&opts, self.path.clone(), true)?;
        Ok(RocksDB {
            inner: RwLock::new(Some(DbProvider::ReadOnly(db))),
            path: self.path.clone(),
        })
    }

    pub fn close(&self) {
        let mut inner = self.inner.write().unwrap();
        if let Some(db) = inner.take() {
            drop(db);
        }
    }

    pub fn destroy(&self) -> Result<(), RocksdbError> {
        self.close();
        let path = Path::new(&self.path);

        let result = rocksdb::DB::destroy(&rocksdb::Options::default(), path);

        // Remove any leftover files, ignoring errors
        let _ = fs::remove_dir_all(path);

        result?;
        Ok(())
    }

    fn db(&self) -> RwLockReadGuard<'_, Option<DbProvider>> {
        self.inner.read().unwrap()
    }

    pub fn location(&self) -> String {
        self.path.clone()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, RocksdbError> {
        match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => db.get(key),
            Some(DbProvider::ReadOnly(db)) => db.get(key),
            None => return Err(RocksdbError::DbNotOpen),
        }
        .map_err(RocksdbError::InternalError)
    }

    pub fn get_many(&self, keys: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, RocksdbError> {
        let results = match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => db.multi_get(keys),
            Some(DbProvider::ReadOnly(db)) => db.multi_get(keys),
            None => return Err(RocksdbError::DbNotOpen),
        };

        let results = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        Ok(results.into_iter().map(|r| r.unwrap_or_default()).collect())
    }

    pub fn keys_exist(&self, keys: &Vec<Vec<u8>>) -> Vec<bool> {
        match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => db.multi_get(keys),
            Some(DbProvider::ReadOnly(db)) => db.multi_get(keys),
            None => vec![],
        }
        .into_iter()
        .map(|result| matches!(result, Ok(Some(_))))
        .collect()
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), RocksdbError> {
        match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => db.put(key, value),
            Some(DbProvider::ReadOnly(_)) => return Err(RocksdbError::ReadOnly),
            None => return Err(RocksdbError::DbNotOpen),
        }
        .map_err(RocksdbError::InternalError)
    }

    pub fn del(&self, key: &[u8]) -> Result<(), RocksdbError> {
        match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => db.delete(key),
            Some(DbProvider::ReadOnly(_)) => return Err(RocksdbError::ReadOnly),
            None => return Err(RocksdbError::DbNotOpen),
        }
        .map_err(RocksdbError::InternalError)
    }

    pub fn txn(&self) -> RocksDbTransactionBatch {
        RocksDbTransactionBatch::new()
    }

    pub fn commit(&self, batch: RocksDbTransactionBatch) -> Result<(), RocksdbError> {
        match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => {
                let txn = db.transaction();
                for (key, value) in batch.batch {
                    match value {
                        Some(value) => txn.put(key, value)?,
                        None => txn.delete(key)?,
                    }
                }
                txn.commit().map_err(RocksdbError::InternalError)
            }
            Some(DbProvider::ReadOnly(_)) => Err(RocksdbError::ReadOnly),
            None => Err(RocksdbError::DbNotOpen),
        }
    }

    fn iterator_options(
        start_prefix: Option<Vec<u8>>,
        stop_prefix: Option<Vec<u8>>,
        page_options: &PageOptions,
    ) -> IteratorOptions {
        let start = start_prefix.unwrap_or_default();
        let stop = stop_prefix.unwrap_or(vec![255u8; 32]);

        let upper_bound = if page_options.reverse {
            match &page_options.page_token {
                Some(page_token) => page_token.clone(),
                None => stop,
            }
        } else {
            stop
        };

        let lower_bound = if page_options.reverse {
            start
        } else {
            match &page_options.page_token {
                // The lexicographically next key after K is K ‖ 0x00: shorter
                // keys sort before longer keys with the same prefix.
                Some(page_token) => [page_token.clone(), vec![0u8]].concat(),
                None => start,
            }
        };

        let mut opts = rocksdb::ReadOptions::default();
        opts.set_iterate_lower_bound(lower_bound);
        opts.set_iterate_upper_bound(upper_bound);

        IteratorOptions {
            opts,
            reverse: page_options.reverse,
        }
    }

    /// Iterate keys in `[start_prefix, stop_prefix)`, honoring the page token
    /// and page size. The callback returns `true` to stop early. Returns
    /// whether the range was exhausted.
    pub fn for_each_iterator_by_prefix_paged<F>(
        &self,
        start_prefix: Option<Vec<u8>>,
        stop_prefix: Option<Vec<u8>>,
        page_options: &PageOptions,
        mut f: F,
    ) -> Result<bool, HubError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, HubError>,
    {
        let iter_opts = RocksDB::iterator_options(start_prefix, stop_prefix, page_options);

        macro_rules! drive {
            ($db:expr) => {{
                let mut iter = $db.raw_iterator_opt(iter_opts.opts);
                if iter_opts.reverse {
                    iter.seek_to_last();
                } else {
                    iter.seek_to_first();
                }

                let mut all_done = true;
                let mut count = 0;
                while iter.valid() {
                    if let Some((key, value)) = iter.item() {
                        if f(&key, &value)? {
                            all_done = false;
                            break;
                        }
                        if let Some(page_size) = page_options.page_size {
                            count += 1;
                            if count >= page_size {
                                all_done = true;
                                break;
                            }
                        }
                    }
                    if iter_opts.reverse {
                        iter.prev();
                    } else {
                        iter.next();
                    }
                }
                Ok(all_done)
            }};
        }

        match self.db().as_ref() {
            Some(DbProvider::Transaction(db)) => drive!(db),
            Some(DbProvider::ReadOnly(db)) => drive!(db),
            None => Err(RocksdbError::DbNotOpen.into()),
        }
    }

    /// Like `for_each_iterator_by_prefix_paged` but without a page-size bound,
    /// for callers that filter and count on their own.
    pub fn for_each_iterator_by_prefix<F>(
        &self,
        start_prefix: Option<Vec<u8>>,
        stop_prefix: Option<Vec<u8>>,
        page_options: &PageOptions,
        f: F,
    ) -> Result<bool, HubError>
    where
        F: FnMut(&[u8], &[u8]) -> Result<bool, HubError>,
    {
        let unbounded = PageOptions {
            page_size: None,
            page_token: page_options.page_token.clone(),
            reverse: page_options.reverse,
        };
        self.for_each_iterator_by_prefix_paged(start_prefix, stop_prefix, &unbounded, f)
    }

    pub fn count_keys_at_prefix(&self, prefix: &[u8]) -> Result<u32, HubError> {
        let mut count = 0;
        self.for_each_iterator_by_prefix(
            Some(prefix.to_vec()),
            Some(increment_vec_u8(&prefix.to_vec())),
            &PageOptions::default(),
            |_, _| {
                count += 1;
                Ok(false)
            },
        )?;
        Ok(count)
    }

    /// Find the first index row at or after `start` within `index_prefix`,
    /// then follow the stored value as a primary key and return that row.
    pub fn get_next_by_index(
        &self,
        index_prefix: Vec<u8>,
        start: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, HubError> {
        let page_options = PageOptions {
            page_size: Some(1),
            ..PageOptions::default()
        };
        let mut primary_key: Option<Vec<u8>> = None;
        self.for_each_iterator_by_prefix(
            Some(start),
            Some(increment_vec_u8(&index_prefix)),
            &page_options,
            |_, index| {
                primary_key = Some(index.to_vec());
                Ok(true)
            },
        )?;
        primary_key
            .map(|primary_key| {
                self.get(&primary_key)
                    .map_err(HubError::from)?
                    .ok_or(HubError::not_found("no value found for the given key"))
            })
            .transpose()
    }

    /// Delete one page of keys in the given range. Returns the number deleted.
    pub fn delete_page(
        &self,
        start_prefix: Option<Vec<u8>>,
        stop_prefix: Option<Vec<u8>>,
        page_options: &PageOptions,
    ) -> Result<u32, HubError> {
        let mut txn = self.txn();
        self.for_each_iterator_by_prefix_paged(start_prefix, stop_prefix, page_options, |key, _| {
            txn.delete(key.to_vec());
            Ok(false)
        })?;

        let count = txn.len();
        self.commit(txn)?;
        Ok(count as u32)
    }

    /// Delete a key range page by page with a throttle between pages, so bulk
    /// deletion never starves foreground writes.
    pub async fn delete_paginated(
        &self,
        start_prefix: Option<Vec<u8>>,
        stop_prefix: Option<Vec<u8>>,
        page_options: &PageOptions,
        throttle: Duration,
        progress_callback: Option<impl Fn(u32) + Send>,
    ) -> Result<u32, HubError> {
        let mut total_deleted = 0;
        loop {
            match self.delete_page(start_prefix.clone(), stop_prefix.clone(), page_options)? {
                0 => break,
                count => total_deleted += count,
            }

            if let Some(callback) = &progress_callback {
                callback(total_deleted);
            }
            tokio::time::sleep(throttle).await;
        }

        Ok(total_deleted)
    }

    pub fn approximate_size(&self) -> u64 {
        WalkDir::new(self.location())
            .into_iter()
            .filter_map(Result::ok)
            .filter_map(|entry| fs::metadata(entry.path()).ok())
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.len())
            .sum()
    }

    pub fn is_open(&self) -> bool {
        self.db().is_some()
    }
}

pub fn open_db(path: &str) -> Arc<RocksDB> {
    RocksDB::open_at(path).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp_db() -> (RocksDB, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let db = RocksDB::new(tmp.path().join("db").to_str().unwrap());
        db.open().unwrap();
        (db, tmp)
    }

    #[test]
    fn test_batch_merge_last_write_wins() {
        let mut txn = RocksDbTransactionBatch::new();
        txn.put(b"key1".to_vec(), b"value1".to_vec());
        txn.put(b"key2".to_vec(), b"value2".to_vec());
        txn.delete(b"key3".to_vec());

        let mut other = RocksDbTransactionBatch::new();
        other.put(b"key1".to_vec(), b"value1_new".to_vec());
        other.delete(b"key2".to_vec());

        txn.merge(other);

        assert_eq!(txn.len(), 3);
        assert_eq!(
            txn.get(b"key1").unwrap().as_ref().unwrap(),
            &b"value1_new".to_vec()
        );
        assert!(txn.get(b"key2").unwrap().is_none());
        assert!(txn.get(b"key3").unwrap().is_none());
    }

    #[test]
    fn test_commit_applies_puts_and_deletes() {
        let (db, _tmp) = open_tmp_db();

        db.put(b"stale", b"v").unwrap();

        let mut txn = db.txn();
        txn.put(b"key1".to_vec(), b"value1".to_vec());
        txn.delete(b"stale".to_vec());
        db.commit(txn).unwrap();

        assert_eq!(db.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(db.get(b"stale").unwrap(), None);

        db.destroy().unwrap();
    }

    #[test]
    fn test_count_keys_at_prefix() {
        let (db, _tmp) = open_tmp_db();

        db.put(b"key100", b"value1").unwrap();
        db.put(b"key101", b"value3").unwrap();
        db.put(b"key104", b"value4").unwrap();
        db.put(b"key200", b"value2").unwrap();

        assert_eq!(db.count_keys_at_prefix(b"key").unwrap(), 4);
        assert_eq!(db.count_keys_at_prefix(b"key1").unwrap(), 3);
        assert_eq!(db.count_keys_at_prefix(b"key11").unwrap(), 0);
        assert_eq!(db.count_keys_at_prefix(b"key200").unwrap(), 1);

        db.destroy().unwrap();
    }

    #[test]
    fn test_get_next_by_index_does_not_cross_index_boundary() {
        let (db, _tmp) = open_tmp_db();

        db.put(b"key100", b"value1").unwrap();
        db.put(b"index100", b"key100").unwrap();

        // Exact and predecessor lookups both land on the index row
        let got = db
            .get_next_by_index(b"index".to_vec(), b"index100".to_vec())
            .unwrap()
            .unwrap();
        assert_eq!(got, b"value1".to_vec());
        let got = db
            .get_next_by_index(b"index".to_vec(), b"index099".to_vec())
            .unwrap()
            .unwrap();
        assert_eq!(got, b"value1".to_vec());

        // A start past the last index row must not bleed into a sibling index
        db.put(increment_vec_u8(&b"index".to_vec()).as_slice(), b"key100")
            .unwrap();
        let got = db
            .get_next_by_index(b"index".to_vec(), b"index101".to_vec())
            .unwrap();
        assert!(got.is_none());

        db.destroy().unwrap();
    }

    #[test]
    fn test_pagination_resumes_from_page_token() {
        let (db, _tmp) = open_tmp_db();

        for i in 1..=10u8 {
            db.put(&[0u8, 0u8, i], format!("value{}", i).as_bytes())
                .unwrap();
        }

        let page_size = 3;
        let mut last_key = None;
        let mut seen = 0;
        loop {
            let page_options = PageOptions {
                page_size: Some(page_size),
                page_token: last_key.clone(),
                reverse: false,
            };

            let mut this_pass = 0;
            let all_done = db
                .for_each_iterator_by_prefix_paged(
                    Some(vec![0u8]),
                    Some(vec![1u8]),
                    &page_options,
                    |key, _value| {
                        this_pass += 1;
                        if this_pass == page_size {
                            last_key = Some(key.to_vec());
                            return Ok(true);
                        }
                        Ok(false)
                    },
                )
                .unwrap();
            seen += this_pass;

            if all_done {
                assert_eq!(this_pass, 10 % page_size);
                break;
            }
            assert_eq!(this_pass, page_size);
        }
        assert_eq!(seen, 10);

        db.destroy().unwrap();
    }

    #[test]
    fn test_reverse_iteration() {
        let (db, _tmp) = open_tmp_db();

        for i in 1..=5u8 {
            db.put(&[9u8, i], &[i]).unwrap();
        }

        let mut keys = vec![];
        db.for_each_iterator_by_prefix(
            Some(vec![9u8]),
            Some(vec![10u8]),
            &PageOptions {
                reverse: true,
                ..PageOptions::default()
            },
            |key, _| {
                keys.push(key.to_vec());
                Ok(false)
            },
        )
        .unwrap();

        assert_eq!(keys.first().unwrap(), &vec![9u8, 5]);
        assert_eq!(keys.last().unwrap(), &vec![9u8, 1]);

        db.destroy().unwrap();
    }
}
