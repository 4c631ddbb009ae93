use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{Migration, MigrationError};
use crate::storage::constants::{RootPrefix, UserPostfix};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::store::account::{FID_BYTES, LINK_TYPE_BYTES};
use crate::storage::util::{increment_vec_u8, pad_fixed_width};

/// Canonical link index keys carry an 8-byte zero-padded type. Early writers
/// emitted the type at its natural width, leaving rows the padded lookups
/// can't see. This sweep rewrites every remaining short row in place.
pub struct M1FixLinkTypePadding;

const CANONICAL_KEY_LEN: usize = 1 + FID_BYTES + 1 + LINK_TYPE_BYTES + FID_BYTES;
const COMMIT_BATCH_SIZE: usize = 1000;

#[async_trait]
impl Migration for M1FixLinkTypePadding {
    fn to_db_version(&self) -> u32 {
        1
    }

    fn description(&self) -> &str {
        "Rewrites legacy unpadded link-type secondary index keys to the fixed-width form."
    }

    async fn run(&self, db: Arc<RocksDB>) -> Result<(), MigrationError> {
        let mut fixed = 0u32;
        for postfix in [UserPostfix::LinkAdds, UserPostfix::LinkRemoves] {
            fixed += rewrite_legacy_rows(&db, postfix)?;
        }
        info!(count = fixed, "Finished link type padding fix");
        Ok(())
    }
}

fn rewrite_legacy_rows(db: &RocksDB, postfix: UserPostfix) -> Result<u32, MigrationError> {
    let prefix = vec![RootPrefix::User as u8];
    let mut txn = RocksDbTransactionBatch::new();
    let mut fixed = 0u32;

    db.for_each_iterator_by_prefix(
        Some(prefix.clone()),
        Some(increment_vec_u8(&prefix)),
        &PageOptions::default(),
        |key, value| {
            // [User] ‖ fid(4) ‖ postfix(1) ‖ type(<8) ‖ targetFid(4)
            if key.len() >= CANONICAL_KEY_LEN
                || key.len() <= 1 + FID_BYTES + 1 + FID_BYTES
                || key[1 + FID_BYTES] != postfix.as_u8()
            {
                return Ok(false);
            }

            let type_start = 1 + FID_BYTES + 1;
            let type_end = key.len() - FID_BYTES;
            let mut canonical = key[..type_start].to_vec();
            canonical.extend_from_slice(&pad_fixed_width(
                &key[type_start..type_end],
                LINK_TYPE_BYTES,
            ));
            canonical.extend_from_slice(&key[type_end..]);

            txn.delete(key.to_vec());
            txn.put(canonical, value.to_vec());
            fixed += 1;
            Ok(false)
        },
    )?;

    if !txn.is_empty() {
        // Commit in chunks so a huge backlog doesn't build one giant batch
        let mut chunk = RocksDbTransactionBatch::new();
        for (key, value) in txn.batch {
            match value {
                Some(value) => chunk.put(key, value),
                None => chunk.delete(key),
            }
            if chunk.len() >= COMMIT_BATCH_SIZE {
                db.commit(std::mem::take(&mut chunk))?;
            }
        }
        if !chunk.is_empty() {
            db.commit(chunk)?;
        }
    }

    Ok(fixed)
}
