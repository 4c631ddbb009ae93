use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

use crate::core::error::HubError;
use crate::core::util::bytes_compare;
use crate::proto::{hub_event, HubEvent, OnChainEventType};
use crate::storage::constants::{RootPrefix, USER_POSTFIX_MAX_MESSAGE};
use crate::storage::db::{PageOptions, RocksDB};
use crate::storage::store::account::{
    make_message_primary_key, make_ts_hash_from_message, type_to_set_postfix,
    OnchainEventStorageError, OnchainEventStore, StorageSlot, FID_BYTES, TS_HASH_LENGTH,
};
use crate::storage::util::increment_vec_u8;

#[derive(Clone, Debug, Default)]
struct Usage {
    count: u32,
    earliest_ts_hash: Option<[u8; TS_HASH_LENGTH]>,
}

/// In-memory usage counters: per `(fid, message postfix)` the number of
/// stored messages and the earliest tsHash, plus a per-fid memo of the
/// storage slot. Rebuilt from the primary keyspace on open; every update is
/// applied after the corresponding KV commit, so the rebuilt form is always
/// the authority.
pub struct StorageCache {
    usage: RwLock<HashMap<(u64, u8), Usage>>,
    slots: RwLock<HashMap<u64, StorageSlot>>,
}

impl StorageCache {
    pub fn empty() -> Self {
        StorageCache {
            usage: RwLock::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Sweep the `[User]` keyspace and count message rows. Keys iterate in
    /// order, so the first row seen for a `(fid, postfix)` group is its
    /// earliest tsHash.
    pub fn rebuild(db: &RocksDB) -> Result<Self, HubError> {
        let cache = Self::empty();
        let prefix = vec![RootPrefix::User as u8];
        let mut scanned: u64 = 0;

        {
            let mut usage = cache.usage.write().unwrap();
            db.for_each_iterator_by_prefix(
                Some(prefix.clone()),
                Some(increment_vec_u8(&prefix)),
                &PageOptions::default(),
                |key, _| {
                    scanned += 1;
                    // [User] ‖ fid(4) ‖ postfix(1) ‖ tsHash(24)
                    if key.len() != 1 + FID_BYTES + 1 + TS_HASH_LENGTH {
                        return Ok(false);
                    }
                    let postfix = key[1 + FID_BYTES];
                    if postfix > USER_POSTFIX_MAX_MESSAGE {
                        return Ok(false);
                    }
                    let fid = crate::storage::store::account::read_fid_key(key, 1);
                    let ts_hash: [u8; TS_HASH_LENGTH] =
                        key[1 + FID_BYTES + 1..].try_into().unwrap();

                    let entry = usage.entry((fid, postfix)).or_default();
                    entry.count += 1;
                    if entry.earliest_ts_hash.is_none() {
                        entry.earliest_ts_hash = Some(ts_hash);
                    }
                    Ok(false)
                },
            )?;
        }

        info!(rows = scanned, "Rebuilt storage cache from primary keyspace");
        Ok(cache)
    }

    pub fn message_count(&self, fid: u64, postfix: u8) -> u32 {
        self.usage
            .read()
            .unwrap()
            .get(&(fid, postfix))
            .map(|u| u.count)
            .unwrap_or(0)
    }

    pub fn earliest_ts_hash(&self, fid: u64, postfix: u8) -> Option<[u8; TS_HASH_LENGTH]> {
        self.usage
            .read()
            .unwrap()
            .get(&(fid, postfix))
            .and_then(|u| u.earliest_ts_hash)
    }

    /// A merge that would land below the earliest stored message of a full
    /// store is pointless: it would be the next prune victim.
    pub fn is_prunable(
        &self,
        fid: u64,
        postfix: u8,
        store_count: u32,
        max_count: u32,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> bool {
        if store_count < max_count {
            return false;
        }
        match self.earliest_ts_hash(fid, postfix) {
            Some(earliest) => bytes_compare(ts_hash, &earliest) < 0,
            None => false,
        }
    }

    /// Fold a committed event into the counters. Must run only after the KV
    /// commit for the event succeeded.
    pub fn apply_event(&self, db: &RocksDB, event: &HubEvent) {
        match &event.body {
            Some(hub_event::Body::MergeMessageBody(body)) => {
                if let Some(message) = &body.message {
                    self.on_message_stored(message);
                }
                for deleted in &body.deleted_messages {
                    self.on_message_dropped(db, deleted);
                }
            }
            Some(hub_event::Body::PruneMessageBody(body)) => {
                if let Some(message) = &body.message {
                    self.on_message_dropped(db, message);
                }
            }
            Some(hub_event::Body::RevokeMessageBody(body)) => {
                if let Some(message) = &body.message {
                    self.on_message_dropped(db, message);
                }
            }
            Some(hub_event::Body::MergeUsernameProofBody(body)) => {
                if let Some(message) = &body.username_proof_message {
                    self.on_message_stored(message);
                }
                if let Some(message) = &body.deleted_username_proof_message {
                    self.on_message_dropped(db, message);
                }
            }
            Some(hub_event::Body::MergeOnChainEventBody(body)) => {
                if let Some(onchain_event) = &body.on_chain_event {
                    if onchain_event.r#type() == OnChainEventType::EventTypeStorageRent {
                        self.invalidate_slot(onchain_event.fid);
                    }
                }
            }
            None => {}
        }
    }

    fn on_message_stored(&self, message: &crate::proto::Message) {
        let ts_hash = match make_ts_hash_from_message(message) {
            Ok(ts_hash) => ts_hash,
            Err(_) => return,
        };
        let postfix = type_to_set_postfix(message.msg_type()).as_u8();
        let mut usage = self.usage.write().unwrap();
        let entry = usage.entry((message.fid(), postfix)).or_default();
        entry.count += 1;
        if entry.earliest_ts_hash.is_none()
            || bytes_compare(&ts_hash, entry.earliest_ts_hash.as_ref().unwrap()) < 0
        {
            entry.earliest_ts_hash = Some(ts_hash);
        }
    }

    fn on_message_dropped(&self, db: &RocksDB, message: &crate::proto::Message) {
        let ts_hash = match make_ts_hash_from_message(message) {
            Ok(ts_hash) => ts_hash,
            Err(_) => return,
        };
        let postfix = type_to_set_postfix(message.msg_type()).as_u8();
        let fid = message.fid();

        let mut usage = self.usage.write().unwrap();
        let entry = usage.entry((fid, postfix)).or_default();
        entry.count = entry.count.saturating_sub(1);
        if entry.count == 0 {
            usage.remove(&(fid, postfix));
            return;
        }
        // Dropping the earliest row moves the floor; re-seek it from the DB.
        if entry.earliest_ts_hash == Some(ts_hash) {
            entry.earliest_ts_hash = Self::seek_earliest(db, fid, postfix);
        }
    }

    fn seek_earliest(db: &RocksDB, fid: u64, postfix: u8) -> Option<[u8; TS_HASH_LENGTH]> {
        let prefix = make_message_primary_key(fid, postfix, None);
        let mut earliest = None;
        let _ = db.for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            &PageOptions {
                page_size: Some(1),
                ..PageOptions::default()
            },
            |key, _| {
                let ts_hash: [u8; TS_HASH_LENGTH] =
                    key[key.len() - TS_HASH_LENGTH..].try_into().unwrap();
                earliest = Some(ts_hash);
                Ok(true)
            },
        );
        earliest
    }

    /// Storage slot for a fid, memoized until the next rent event or expiry.
    pub fn storage_slot(
        &self,
        fid: u64,
        onchain_event_store: &OnchainEventStore,
    ) -> Result<StorageSlot, OnchainEventStorageError> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        if let Some(slot) = self.slots.read().unwrap().get(&fid) {
            let expired = slot.invalidates_at != 0 && (slot.invalidates_at as u64) <= now;
            if !expired {
                return Ok(slot.clone());
            }
        }

        let slot = onchain_event_store.get_storage_slot_for_fid(fid, now)?;
        self.slots.write().unwrap().insert(fid, slot.clone());
        Ok(slot)
    }

    pub fn invalidate_slot(&self, fid: u64) {
        self.slots.write().unwrap().remove(&fid);
    }
}
