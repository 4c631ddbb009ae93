use std::collections::HashSet;
use std::sync::Arc;

use crate::core::error::HubError;
use crate::core::util::bytes_compare;
use crate::proto::{self, HubEvent, HubEventType, MessageType};
use crate::storage::constants::UserPostfix;
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::store::account::message::{
    delete_message_transaction, get_message, get_messages_page_by_prefix,
    make_message_primary_key, make_ts_hash_from_message, make_user_key, message_decode,
    put_message_transaction, type_to_set_postfix, IntoU8, MessagesPage, TS_HASH_LENGTH,
};
use crate::storage::store::account::StoreEventHandler;
use crate::storage::util::increment_vec_u8;

/// Behavior a message family plugs into the generic store: which types it
/// accepts, how body identity maps to index keys, and which extra indices it
/// maintains. Everything else (conflict resolution, events, pruning,
/// revocation) is shared.
pub trait StoreDef: Send + Sync {
    /// Postfix of the primary message rows this store owns.
    fn postfix(&self) -> u8;

    fn add_message_type(&self) -> u8;
    fn remove_message_type(&self) -> u8;
    fn compact_state_message_type(&self) -> u8;

    fn is_add_type(&self, message: &proto::Message) -> bool;
    fn is_remove_type(&self, message: &proto::Message) -> bool;
    fn is_compact_state_type(&self, message: &proto::Message) -> bool;

    fn remove_type_supported(&self) -> bool {
        self.remove_message_type() != MessageType::None as u8
    }

    fn compact_state_type_supported(&self) -> bool {
        self.compact_state_message_type() != MessageType::None as u8
    }

    /// Index key under which an add with this body identity is recorded. A
    /// remove computes the same body key, so both sides of a conflict land on
    /// the same index rows.
    fn make_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError>;
    fn make_remove_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError>;
    fn make_compact_state_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError>;

    /// Legacy (pre-padding) add-index key for stores that changed their key
    /// width. Returns the key and its stored value when a legacy row exists.
    fn find_legacy_add_key(
        &self,
        _db: &RocksDB,
        _message: &proto::Message,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, HubError> {
        Ok(None)
    }

    fn build_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError>;

    fn delete_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError>;

    fn get_prune_size_limit(&self) -> u32;
}

#[derive(Clone)]
pub struct StoreOptions {
    /// Skip conflict resolution entirely; used for bulk imports of state that
    /// is already known to be conflict-free.
    pub conflict_free: bool,
    /// Persist hub events alongside mutations. Disabled when replaying state
    /// that another node already emitted events for.
    pub save_hub_events: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            conflict_free: false,
            save_hub_events: true,
        }
    }
}

/// Read a key through the pending batch first, then the committed DB, so
/// merges later in a batch observe earlier ones.
fn get_from_txn_or_db(
    db: &RocksDB,
    txn: &RocksDbTransactionBatch,
    key: &[u8],
) -> Result<Option<Vec<u8>>, HubError> {
    match txn.get(key) {
        Some(Some(value)) => Ok(Some(value.clone())),
        Some(None) => Ok(None), // deleted earlier in this batch
        None => Ok(db.get(key)?),
    }
}

fn ts_hash_from_index_value(value: &[u8]) -> Result<[u8; TS_HASH_LENGTH], HubError> {
    value
        .try_into()
        .map_err(|_| HubError::invalid_internal_state("index value is not a tsHash"))
}

#[derive(Clone)]
pub struct Store<T: StoreDef + Clone> {
    store_def: T,
    event_handler: Arc<StoreEventHandler>,
    db: Arc<RocksDB>,
    options: StoreOptions,
}

impl<T: StoreDef + Clone> Store<T> {
    pub fn new_with_store_def(
        db: Arc<RocksDB>,
        event_handler: Arc<StoreEventHandler>,
        store_def: T,
    ) -> Store<T> {
        Store {
            store_def,
            event_handler,
            db,
            options: StoreOptions::default(),
        }
    }

    pub fn new_with_store_def_opts(
        db: Arc<RocksDB>,
        event_handler: Arc<StoreEventHandler>,
        store_def: T,
        options: StoreOptions,
    ) -> Store<T> {
        Store {
            store_def,
            event_handler,
            db,
            options,
        }
    }

    pub fn db(&self) -> &Arc<RocksDB> {
        &self.db
    }

    pub fn store_def(&self) -> &T {
        &self.store_def
    }

    pub fn event_handler(&self) -> Arc<StoreEventHandler> {
        self.event_handler.clone()
    }

    pub fn prune_size_limit(&self) -> u32 {
        self.store_def.get_prune_size_limit()
    }

    /// The store's total order over conflicting messages: timestamp first,
    /// then adds over removes, then lexicographic hash. Returns 0 only for
    /// the identical message.
    fn message_compare(
        &self,
        a_type: u8,
        a_ts_hash: &[u8; TS_HASH_LENGTH],
        b_type: u8,
        b_ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> i8 {
        let ts_order = bytes_compare(&a_ts_hash[0..4], &b_ts_hash[0..4]);
        if ts_order != 0 {
            return ts_order;
        }

        let hash_order = bytes_compare(&a_ts_hash[4..], &b_ts_hash[4..]);
        if hash_order == 0 {
            return 0;
        }

        if a_type == self.store_def.add_message_type()
            && b_type == self.store_def.remove_message_type()
        {
            return 1;
        }
        if a_type == self.store_def.remove_message_type()
            && b_type == self.store_def.add_message_type()
        {
            return -1;
        }

        hash_order
    }

    fn get_stored_message(
        &self,
        txn: &RocksDbTransactionBatch,
        fid: u64,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> Result<proto::Message, HubError> {
        let primary_key = make_message_primary_key(fid, self.store_def.postfix(), Some(ts_hash));
        match get_from_txn_or_db(&self.db, txn, &primary_key)? {
            Some(bytes) => message_decode(&bytes),
            None => Err(HubError::invalid_internal_state(&format!(
                "index entry has no message row at tsHash {}",
                hex::encode(ts_hash)
            ))),
        }
    }

    /// Find every stored message the incoming one displaces. Errors with
    /// `duplicate` when the message is already present and `conflict` when a
    /// stored message outranks it. Also reports a legacy-keyed add index row
    /// that must be dropped as part of the merge.
    fn get_merge_conflicts(
        &self,
        txn: &RocksDbTransactionBatch,
        message: &proto::Message,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> Result<(Vec<proto::Message>, Option<Vec<u8>>), HubError> {
        let mut conflicts = vec![];
        let mut legacy_add_key = None;
        let message_type = message.msg_type().into_u8();
        let fid = message.fid();

        // A compact state summarizes everything before its timestamp; older
        // messages of the same body family are rejected outright.
        if self.store_def.compact_state_type_supported() {
            let compact_key = self.store_def.make_compact_state_add_key(message)?;
            if let Some(value) = get_from_txn_or_db(&self.db, txn, &compact_key)? {
                let compact_ts_hash = ts_hash_from_index_value(&value)?;
                if bytes_compare(&compact_ts_hash[0..4], &ts_hash[0..4]) >= 0 {
                    return Err(HubError {
                        code: "bad_request.conflict".to_string(),
                        message: "message conflicts with a more recent compact state".to_string(),
                    });
                }
            }
        }

        if self.store_def.remove_type_supported() {
            let remove_key = self.store_def.make_remove_key(message)?;
            if let Some(value) = get_from_txn_or_db(&self.db, txn, &remove_key)? {
                let existing_ts_hash = ts_hash_from_index_value(&value)?;
                let order = self.message_compare(
                    self.store_def.remove_message_type(),
                    &existing_ts_hash,
                    message_type,
                    ts_hash,
                );
                if order > 0 {
                    return Err(HubError {
                        code: "bad_request.conflict".to_string(),
                        message: "message conflicts with a more recent remove".to_string(),
                    });
                }
                if order == 0 {
                    return Err(HubError::duplicate("message has already been merged"));
                }
                conflicts.push(self.get_stored_message(txn, fid, &existing_ts_hash)?);
            }
        }

        let add_key = self.store_def.make_add_key(message)?;
        let add_value = match get_from_txn_or_db(&self.db, txn, &add_key)? {
            Some(value) => Some(value),
            None => match self.store_def.find_legacy_add_key(&self.db, message)? {
                Some((key, value)) => {
                    legacy_add_key = Some(key);
                    Some(value)
                }
                None => None,
            },
        };
        if let Some(value) = add_value {
            let existing_ts_hash = ts_hash_from_index_value(&value)?;
            let order = self.message_compare(
                self.store_def.add_message_type(),
                &existing_ts_hash,
                message_type,
                ts_hash,
            );
            if order > 0 {
                return Err(HubError {
                    code: "bad_request.conflict".to_string(),
                    message: "message conflicts with a more recent add".to_string(),
                });
            }
            if order == 0 {
                return Err(HubError::duplicate("message has already been merged"));
            }
            conflicts.push(self.get_stored_message(txn, fid, &existing_ts_hash)?);
        }

        Ok((conflicts, legacy_add_key))
    }

    fn put_add_transaction(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        put_message_transaction(txn, message)?;
        txn.put(self.store_def.make_add_key(message)?, ts_hash.to_vec());
        self.store_def.build_secondary_indices(txn, ts_hash, message)
    }

    fn put_remove_transaction(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        put_message_transaction(txn, message)?;
        txn.put(self.store_def.make_remove_key(message)?, ts_hash.to_vec());
        Ok(())
    }

    /// Remove a stored message and every row derived from it.
    fn delete_message_from_store(
        &self,
        txn: &mut RocksDbTransactionBatch,
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let ts_hash = make_ts_hash_from_message(message)?;

        if self.store_def.is_add_type(message) {
            txn.delete(self.store_def.make_add_key(message)?);
            if let Some((legacy_key, _)) = self.store_def.find_legacy_add_key(&self.db, message)? {
                txn.delete(legacy_key);
            }
            self.store_def
                .delete_secondary_indices(txn, &ts_hash, message)?;
        } else if self.store_def.is_remove_type(message) {
            txn.delete(self.store_def.make_remove_key(message)?);
        } else if self.store_def.is_compact_state_type(message) {
            txn.delete(self.store_def.make_compact_state_add_key(message)?);
        }

        delete_message_transaction(txn, message)
    }

    pub fn merge(
        &self,
        message: &proto::Message,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<HubEvent, HubError> {
        if !self.store_def.is_add_type(message)
            && !self.store_def.is_remove_type(message)
            && !self.store_def.is_compact_state_type(message)
        {
            return Err(HubError::invalid_parameter(
                "invalid message type for this store",
            ));
        }

        let ts_hash = make_ts_hash_from_message(message)?;

        if self.store_def.is_compact_state_type(message) {
            return self.merge_compact_state(message, &ts_hash, txn);
        }

        let (deleted, legacy_add_key) = if self.options.conflict_free {
            (vec![], None)
        } else {
            self.get_merge_conflicts(txn, message, &ts_hash)?
        };

        // A displaced row that still lives under a legacy key won't be found
        // by the canonical delete below.
        if let Some(legacy_key) = legacy_add_key {
            txn.delete(legacy_key);
        }
        for conflict in &deleted {
            self.delete_message_from_store(txn, conflict)?;
        }

        if self.store_def.is_add_type(message) {
            self.put_add_transaction(txn, &ts_hash, message)?;
        } else {
            self.put_remove_transaction(txn, &ts_hash, message)?;
        }

        let mut event = HubEvent::merge_message_event(message.clone(), deleted);
        if self.options.save_hub_events {
            self.event_handler.commit_transaction(txn, &mut event)?;
        }
        Ok(event)
    }

    /// A compact state asserts the full add-set of its body family as of its
    /// timestamp: every older message of that family not covered by the set
    /// is dropped with it.
    fn merge_compact_state(
        &self,
        message: &proto::Message,
        ts_hash: &[u8; TS_HASH_LENGTH],
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<HubEvent, HubError> {
        let mut deleted = vec![];

        let compact_key = self.store_def.make_compact_state_add_key(message)?;
        if let Some(value) = get_from_txn_or_db(&self.db, txn, &compact_key)? {
            let existing_ts_hash = ts_hash_from_index_value(&value)?;
            let order = bytes_compare(&existing_ts_hash, ts_hash);
            if order > 0 {
                return Err(HubError {
                    code: "bad_request.conflict".to_string(),
                    message: "message conflicts with a more recent compact state".to_string(),
                });
            }
            if order == 0 {
                return Err(HubError::duplicate("message has already been merged"));
            }
            let compact_postfix = type_to_set_postfix(
                MessageType::try_from(self.store_def.compact_state_message_type() as i32)
                    .unwrap_or(MessageType::None),
            )
            .as_u8();
            let primary_key =
                make_message_primary_key(message.fid(), compact_postfix, Some(&existing_ts_hash));
            let existing = match get_from_txn_or_db(&self.db, txn, &primary_key)? {
                Some(bytes) => message_decode(&bytes)?,
                None => {
                    return Err(HubError::invalid_internal_state(
                        "compact state index has no message row",
                    ))
                }
            };
            deleted.push(existing);
        }

        deleted.extend(self.compacted_messages(message, txn)?);

        for conflict in &deleted {
            self.delete_message_from_store(txn, conflict)?;
        }

        put_message_transaction(txn, message)?;
        txn.put(compact_key, ts_hash.to_vec());

        let mut event = HubEvent::merge_message_event(message.clone(), deleted);
        if self.options.save_hub_events {
            self.event_handler.commit_transaction(txn, &mut event)?;
        }
        Ok(event)
    }

    /// Messages of the compacted family older than the compact state and not
    /// present in its retained set.
    fn compacted_messages(
        &self,
        compact_message: &proto::Message,
        txn: &RocksDbTransactionBatch,
    ) -> Result<Vec<proto::Message>, HubError> {
        let body = match compact_message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(proto::message_data::Body::LinkCompactStateBody(body)) => body,
            _ => {
                return Err(HubError::invalid_parameter(
                    "compact state message has no compact body",
                ))
            }
        };
        let retained: HashSet<u64> = body.target_fids.iter().cloned().collect();
        let compact_type = body.r#type.clone();
        let compact_timestamp = compact_message.timestamp();

        let mut compacted = vec![];
        let prefix =
            make_message_primary_key(compact_message.fid(), self.store_def.postfix(), None);
        self.db.for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            &PageOptions::default(),
            |key, value| {
                if let Some(None) = txn.get(key) {
                    return Ok(false); // already deleted in this batch
                }
                let existing = message_decode(value)?;
                if existing.timestamp() >= compact_timestamp {
                    return Ok(false);
                }
                match existing.data.as_ref().and_then(|d| d.body.as_ref()) {
                    Some(proto::message_data::Body::LinkBody(link)) => {
                        if link.r#type != compact_type {
                            return Ok(false);
                        }
                        let target = match &link.target {
                            Some(proto::link_body::Target::TargetFid(fid)) => *fid,
                            None => return Ok(false),
                        };
                        let keep = self.store_def.is_add_type(&existing)
                            && retained.contains(&target);
                        if !keep {
                            compacted.push(existing);
                        }
                    }
                    _ => {}
                }
                Ok(false)
            },
        )?;

        Ok(compacted)
    }

    /// Delete a message because the authority that signed it is gone. A
    /// message that was never merged reports `not_found`, which makes repeat
    /// revocations harmless.
    pub fn revoke(
        &self,
        message: &proto::Message,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<HubEvent, HubError> {
        let ts_hash = make_ts_hash_from_message(message)?;
        let postfix = type_to_set_postfix(message.msg_type()).as_u8();
        if get_message(&self.db, message.fid(), postfix, &ts_hash)?.is_none() {
            return Err(HubError::not_found("message not found"));
        }

        self.delete_message_from_store(txn, message)?;

        let mut event = HubEvent::from(
            HubEventType::RevokeMessage,
            proto::hub_event::Body::RevokeMessageBody(proto::RevokeMessageBody {
                message: Some(message.clone()),
            }),
        );
        if self.options.save_hub_events {
            self.event_handler.commit_transaction(txn, &mut event)?;
        }
        Ok(event)
    }

    /// Evict earliest-first until the store is back under its limit. Rows
    /// already deleted in this batch are skipped so a merge and its prune can
    /// share a transaction.
    pub fn prune_messages(
        &self,
        fid: u64,
        current_count: u32,
        max_count: u32,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, HubError> {
        let mut events = vec![];
        if current_count <= max_count {
            return Ok(events);
        }
        let mut to_prune = current_count - max_count;

        let prefix = make_message_primary_key(fid, self.store_def.postfix(), None);
        let mut prunable = vec![];
        self.db.for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            &PageOptions::default(),
            |key, value| {
                if let Some(None) = txn.get(key) {
                    return Ok(false);
                }
                let message = message_decode(value)?;
                prunable.push(message);
                Ok(prunable.len() as u32 >= to_prune)
            },
        )?;

        for message in prunable {
            if to_prune == 0 {
                break;
            }
            self.delete_message_from_store(txn, &message)?;
            let mut event = HubEvent::from(
                HubEventType::PruneMessage,
                proto::hub_event::Body::PruneMessageBody(proto::PruneMessageBody {
                    message: Some(message),
                }),
            );
            if self.options.save_hub_events {
                self.event_handler.commit_transaction(txn, &mut event)?;
            }
            events.push(event);
            to_prune -= 1;
        }

        Ok(events)
    }

    /// Revoke everything in this store signed by `signer`, via the by-signer
    /// index.
    pub fn revoke_messages_by_signer(
        &self,
        fid: u64,
        signer: &[u8],
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, HubError> {
        let mut prefix = make_user_key(fid);
        prefix.push(UserPostfix::BySigner as u8);
        prefix.extend_from_slice(signer);

        let own_types = [
            self.store_def.add_message_type(),
            self.store_def.remove_message_type(),
            self.store_def.compact_state_message_type(),
        ];

        let mut targets: Vec<(u8, [u8; TS_HASH_LENGTH])> = vec![];
        self.db.for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            &PageOptions::default(),
            |key, _| {
                let message_type = key[prefix.len()];
                if message_type != MessageType::None as u8 && own_types.contains(&message_type) {
                    let ts_hash: [u8; TS_HASH_LENGTH] = key[prefix.len() + 1..]
                        .try_into()
                        .map_err(|_| {
                            HubError::invalid_internal_state("malformed by-signer index key")
                        })?;
                    targets.push((message_type, ts_hash));
                }
                Ok(false)
            },
        )?;

        let mut events = vec![];
        for (message_type, ts_hash) in targets {
            let postfix = type_to_set_postfix(
                MessageType::try_from(message_type as i32).unwrap_or(MessageType::None),
            )
            .as_u8();
            if let Some(message) = get_message(&self.db, fid, postfix, &ts_hash)? {
                events.push(self.revoke(&message, txn)?);
            }
        }
        Ok(events)
    }

    pub fn get_add(&self, message: &proto::Message) -> Result<Option<proto::Message>, HubError> {
        let add_key = self.store_def.make_add_key(message)?;
        let value = match self.db.get(&add_key)? {
            Some(value) => Some(value),
            None => self
                .store_def
                .find_legacy_add_key(&self.db, message)?
                .map(|(_, value)| value),
        };
        match value {
            Some(value) => {
                let ts_hash = ts_hash_from_index_value(&value)?;
                Ok(get_message(
                    &self.db,
                    message.fid(),
                    self.store_def.postfix(),
                    &ts_hash,
                )?)
            }
            None => Ok(None),
        }
    }

    pub fn get_remove(&self, message: &proto::Message) -> Result<Option<proto::Message>, HubError> {
        if !self.store_def.remove_type_supported() {
            return Err(HubError::invalid_parameter("removes not supported"));
        }
        let remove_key = self.store_def.make_remove_key(message)?;
        match self.db.get(&remove_key)? {
            Some(value) => {
                let ts_hash = ts_hash_from_index_value(&value)?;
                Ok(get_message(
                    &self.db,
                    message.fid(),
                    self.store_def.postfix(),
                    &ts_hash,
                )?)
            }
            None => Ok(None),
        }
    }

    pub fn get_adds_by_fid<F>(
        &self,
        fid: u64,
        page_options: &PageOptions,
        filter: Option<F>,
    ) -> Result<MessagesPage, HubError>
    where
        F: Fn(&proto::Message) -> bool,
    {
        let prefix = make_message_primary_key(fid, self.store_def.postfix(), None);
        get_messages_page_by_prefix(&self.db, prefix, page_options, |message| {
            self.store_def.is_add_type(message)
                && filter.as_ref().map(|f| f(message)).unwrap_or(true)
        })
    }

    pub fn get_removes_by_fid<F>(
        &self,
        fid: u64,
        page_options: &PageOptions,
        filter: Option<F>,
    ) -> Result<MessagesPage, HubError>
    where
        F: Fn(&proto::Message) -> bool,
    {
        let prefix = make_message_primary_key(fid, self.store_def.postfix(), None);
        get_messages_page_by_prefix(&self.db, prefix, page_options, |message| {
            self.store_def.is_remove_type(message)
                && filter.as_ref().map(|f| f(message)).unwrap_or(true)
        })
    }

    pub fn get_all_messages_by_fid(
        &self,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let prefix = make_message_primary_key(fid, self.store_def.postfix(), None);
        get_messages_page_by_prefix(&self.db, prefix, page_options, |_| true)
    }
}
