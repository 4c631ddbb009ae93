use std::sync::Arc;

use tracing::info;

use crate::core::error::HubError;
use crate::storage::constants::{RootPrefix, USER_POSTFIX_MAX_MESSAGE, PAGE_SIZE_MAX};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::store::account::{message_decode, OnchainEventStore, StoreEventHandler, FID_BYTES, TS_HASH_LENGTH};
use crate::storage::trie::merkle_trie::{MerkleTrie, TrieKey};
use crate::storage::util::increment_vec_u8;

const BATCH_SIZE: usize = 1000;

/// Rebuild the sync trie from the message rows. The trie is a cache over the
/// message set, so dropping it and re-inserting every message's sync id is
/// always safe.
pub async fn backfill_messages(db: Arc<RocksDB>) -> Result<u64, HubError> {
    info!("Clearing existing sync trie nodes");
    let trie_prefix = vec![RootPrefix::SyncMerkleTrieNode as u8];
    db.delete_paginated(
        Some(trie_prefix.clone()),
        Some(increment_vec_u8(&trie_prefix)),
        &PageOptions {
            page_size: Some(PAGE_SIZE_MAX),
            ..PageOptions::default()
        },
        tokio::time::Duration::from_millis(10),
        None::<fn(u32)>,
    )
    .await?;

    let mut trie = MerkleTrie::new();
    trie.initialize(&db)
        .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;

    let prefix = vec![RootPrefix::User as u8];
    let mut inserted: u64 = 0;
    let mut txn = RocksDbTransactionBatch::new();
    let mut pending: Vec<Vec<u8>> = vec![];

    db.for_each_iterator_by_prefix(
        Some(prefix.clone()),
        Some(increment_vec_u8(&prefix)),
        &PageOptions::default(),
        |key, value| {
            if key.len() != 1 + FID_BYTES + 1 + TS_HASH_LENGTH
                || key[1 + FID_BYTES] > USER_POSTFIX_MAX_MESSAGE
            {
                return Ok(false);
            }
            let message = message_decode(value)?;
            pending.push(TrieKey::for_message(&message));
            Ok(false)
        },
    )?;

    for sync_id in pending {
        trie.insert(&db, &mut txn, vec![&sync_id])
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        inserted += 1;

        if txn.len() >= BATCH_SIZE {
            db.commit(std::mem::take(&mut txn))?;
            trie.reload(&db)
                .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
            if inserted % (BATCH_SIZE as u64 * 10) == 0 {
                info!(inserted, "Backfilling sync trie...");
            }
        }
    }
    if !txn.is_empty() {
        db.commit(txn)?;
    }

    info!(inserted, "Sync trie backfill complete");
    Ok(inserted)
}

/// Replay the on-chain event log through the derived indices (tx-hash dedup,
/// signer-by-key, id-register-by-address). The primary rows are the source of
/// truth; replaying the merge path is idempotent for rows already present.
pub async fn backfill_onchain_events(db: Arc<RocksDB>) -> Result<u64, HubError> {
    let store = OnchainEventStore::new(db.clone(), StoreEventHandler::new());

    let mut replayed: u64 = 0;
    let mut page_token = None;
    loop {
        let page = store
            .get_all_onchain_events(&PageOptions {
                page_size: Some(BATCH_SIZE),
                page_token,
                reverse: false,
            })
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;

        for event in &page.onchain_events {
            let mut txn = RocksDbTransactionBatch::new();
            store
                .rebuild_secondary_indices(event, &mut txn)
                .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
            db.commit(txn)?;
            replayed += 1;
            if replayed % 10_000 == 0 {
                info!(replayed, "Backfilling onchain events...");
            }
        }

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    info!(replayed, "Onchain event backfill complete");
    Ok(replayed)
}
