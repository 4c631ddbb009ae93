use std::collections::HashMap;

use tracing::info;

use super::super::db::{RocksDB, RocksDbTransactionBatch};
use super::errors::TrieError;
use super::trie_node::TrieNode;
use crate::proto;
use crate::storage::store::account::{make_ts_hash, type_to_set_postfix, FID_BYTES, TS_HASH_LENGTH};
use crate::storage::trie::util::{combine_nibbles, expand_nibbles};

/// Decimal digits used to render the message timestamp at the head of a sync
/// id. Fixed width keeps ids chronologically ordered under the byte order the
/// trie sees.
pub const TIMESTAMP_LENGTH: usize = 10;

/// timestamp(10 ascii digits) ‖ set postfix(1) ‖ fid(4 BE) ‖ hash(20)
pub const SYNC_ID_LENGTH: usize = TIMESTAMP_LENGTH + 1 + FID_BYTES + 20;

pub struct TrieKey {}

impl TrieKey {
    /// The sync id under which a message is tracked in the trie.
    pub fn for_message(msg: &proto::Message) -> Vec<u8> {
        let mut key = Vec::with_capacity(SYNC_ID_LENGTH);
        key.extend_from_slice(format!("{:010}", msg.timestamp()).as_bytes());
        key.push(type_to_set_postfix(msg.msg_type()).as_u8());
        key.extend_from_slice(&(msg.fid() as u32).to_be_bytes());
        key.extend_from_slice(&msg.hash);
        key
    }

    /// Recover the primary-row coordinates from a sync id.
    pub fn decode(sync_id: &[u8]) -> Result<(u64, u8, [u8; TS_HASH_LENGTH]), TrieError> {
        if sync_id.len() != SYNC_ID_LENGTH {
            return Err(TrieError::KeyLengthTooShort);
        }
        let timestamp: u32 = std::str::from_utf8(&sync_id[0..TIMESTAMP_LENGTH])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(TrieError::InvalidState("bad sync id timestamp".to_string()))?;
        let postfix = sync_id[TIMESTAMP_LENGTH];
        let fid = u32::from_be_bytes(
            sync_id[TIMESTAMP_LENGTH + 1..TIMESTAMP_LENGTH + 1 + FID_BYTES]
                .try_into()
                .unwrap(),
        ) as u64;
        let hash = &sync_id[TIMESTAMP_LENGTH + 1 + FID_BYTES..];
        let ts_hash = make_ts_hash(timestamp, hash)
            .map_err(|e| TrieError::InvalidState(e.to_string()))?;
        Ok((fid, postfix, ts_hash))
    }

    /// The trie mutations implied by a committed hub event: merges insert the
    /// winner and drop the displaced messages, prunes and revokes drop theirs.
    pub fn for_hub_event(event: &proto::HubEvent) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let mut inserts = Vec::new();
        let mut deletes = Vec::new();

        match &event.body {
            Some(proto::hub_event::Body::MergeMessageBody(merge)) => {
                if let Some(msg) = &merge.message {
                    inserts.push(TrieKey::for_message(msg));
                }
                for deleted_message in &merge.deleted_messages {
                    deletes.push(TrieKey::for_message(deleted_message));
                }
            }
            Some(proto::hub_event::Body::PruneMessageBody(prune)) => {
                if let Some(msg) = &prune.message {
                    deletes.push(TrieKey::for_message(msg));
                }
            }
            Some(proto::hub_event::Body::RevokeMessageBody(revoke)) => {
                if let Some(msg) = &revoke.message {
                    deletes.push(TrieKey::for_message(msg));
                }
            }
            Some(proto::hub_event::Body::MergeUsernameProofBody(merge)) => {
                if let Some(msg) = &merge.username_proof_message {
                    inserts.push(TrieKey::for_message(msg));
                }
                if let Some(msg) = &merge.deleted_username_proof_message {
                    deletes.push(TrieKey::for_message(msg));
                }
            }
            // The trie tracks the replicated message set only; on-chain
            // events are ordered by the chain itself.
            Some(proto::hub_event::Body::MergeOnChainEventBody(_)) => {}
            None => {}
        };
        (inserts, deletes)
    }
}

#[derive(Debug)]
pub struct NodeMetadata {
    pub prefix: Vec<u8>,
    pub num_messages: usize,
    pub hash: String,
    pub children: HashMap<u8, NodeMetadata>,
}

pub struct MerkleTrie {
    root: Option<TrieNode>,
}

impl MerkleTrie {
    pub fn new() -> Self {
        MerkleTrie { root: None }
    }

    pub fn initialize(&mut self, db: &RocksDB) -> Result<(), TrieError> {
        match self.load_root(db)? {
            Some(root_node) => {
                self.root.replace(root_node);
            }
            None => {
                info!("Initializing empty merkle trie root");
                let mut txn_batch = RocksDbTransactionBatch::new();
                self.create_empty_root(&mut txn_batch);
                db.commit(txn_batch).map_err(TrieError::wrap_database)?;
            }
        }
        Ok(())
    }

    fn create_empty_root(&mut self, txn_batch: &mut RocksDbTransactionBatch) {
        let root_key = TrieNode::make_primary_key(&[], None);
        let empty = TrieNode::new();
        let serialized = TrieNode::serialize(&empty);

        txn_batch.put(root_key, serialized);
        self.root.replace(empty);
    }

    fn load_root(&self, db: &RocksDB) -> Result<Option<TrieNode>, TrieError> {
        let root_key = TrieNode::make_primary_key(&[], None);

        if let Some(root_bytes) = db.get(&root_key).map_err(TrieError::wrap_database)? {
            Ok(Some(TrieNode::deserialize(&root_bytes)?))
        } else {
            Ok(None)
        }
    }

    /// Drop lazily-loaded children and re-read the root from the DB. Called
    /// after every commit so the in-memory view never outlives the batch it
    /// was built against.
    pub fn reload(&mut self, db: &RocksDB) -> Result<(), TrieError> {
        match self.load_root(db)? {
            Some(replacement_root) => {
                self.root.replace(replacement_root);
                Ok(())
            }
            None => Err(TrieError::UnableToReloadRoot),
        }
    }

    pub fn insert(
        &mut self,
        db: &RocksDB,
        txn_batch: &mut RocksDbTransactionBatch,
        keys: Vec<&[u8]>,
    ) -> Result<Vec<bool>, TrieError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        for key in keys.iter() {
            if key.len() != SYNC_ID_LENGTH {
                return Err(TrieError::KeyLengthTooShort);
            }
        }
        let keys: Vec<Vec<u8>> = keys.into_iter().map(expand_nibbles).collect();

        let root = self.root.as_mut().ok_or(TrieError::TrieNotInitialized)?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(root.insert(db, txn_batch, &key, 0)?);
        }
        Ok(results)
    }

    pub fn delete(
        &mut self,
        db: &RocksDB,
        txn_batch: &mut RocksDbTransactionBatch,
        keys: Vec<&[u8]>,
    ) -> Result<Vec<bool>, TrieError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        for key in keys.iter() {
            if key.len() != SYNC_ID_LENGTH {
                return Err(TrieError::KeyLengthTooShort);
            }
        }
        let keys: Vec<Vec<u8>> = keys.into_iter().map(expand_nibbles).collect();

        let root = self.root.as_mut().ok_or(TrieError::TrieNotInitialized)?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(root.delete(db, txn_batch, &key, 0)?);
        }
        Ok(results)
    }

    /// Apply the trie side of a hub event in the same batch as the store
    /// mutation that produced it.
    pub fn update_for_event(
        &mut self,
        db: &RocksDB,
        event: &proto::HubEvent,
        txn_batch: &mut RocksDbTransactionBatch,
    ) -> Result<(), TrieError> {
        let (inserts, deletes) = TrieKey::for_hub_event(event);

        for key in inserts {
            self.insert(db, txn_batch, vec![&key])?;
        }
        for key in deletes {
            self.delete(db, txn_batch, vec![&key])?;
        }

        Ok(())
    }

    pub fn exists(&mut self, db: &RocksDB, key: &[u8]) -> Result<bool, TrieError> {
        let key = expand_nibbles(key);
        let root = self.root.as_mut().ok_or(TrieError::TrieNotInitialized)?;
        root.exists(db, &key, 0)
    }

    pub fn items(&self) -> Result<usize, TrieError> {
        let root = self.root.as_ref().ok_or(TrieError::TrieNotInitialized)?;
        Ok(root.items())
    }

    pub fn root_hash(&self) -> Result<Vec<u8>, TrieError> {
        let root = self.root.as_ref().ok_or(TrieError::TrieNotInitialized)?;
        Ok(root.hash())
    }

    fn get_node(
        db: &RocksDB,
        txn_batch: &RocksDbTransactionBatch,
        node_key: &[u8],
    ) -> Option<TrieNode> {
        // Prefer the pending batch over the committed row
        if let Some(Some(node_bytes)) = txn_batch.get(node_key) {
            if let Ok(node) = TrieNode::deserialize(node_bytes) {
                return Some(node);
            }
        }

        if let Some(node_bytes) = db.get(node_key).ok().flatten() {
            if let Ok(node) = TrieNode::deserialize(&node_bytes) {
                return Some(node);
            }
        }

        None
    }

    /// Subtree hash at a nibble prefix; empty if the prefix is vacant.
    pub fn get_hash(
        &self,
        db: &RocksDB,
        txn_batch: &RocksDbTransactionBatch,
        prefix: &[u8],
    ) -> Result<Vec<u8>, TrieError> {
        let node_key = TrieNode::make_primary_key(prefix, None);
        Ok(Self::get_node(db, txn_batch, &node_key)
            .map(|node| node.hash())
            .unwrap_or_default())
    }

    /// Leaf count at a nibble prefix.
    pub fn get_count(
        &self,
        db: &RocksDB,
        txn_batch: &RocksDbTransactionBatch,
        prefix: &[u8],
    ) -> Result<u64, TrieError> {
        let node_key = TrieNode::make_primary_key(prefix, None);
        Ok(Self::get_node(db, txn_batch, &node_key)
            .map(|node| node.items() as u64)
            .unwrap_or(0))
    }

    /// Every sync id in the subtree under a nibble prefix, up to `max_values`.
    pub fn get_all_values(
        &mut self,
        db: &RocksDB,
        prefix: &[u8],
        max_values: usize,
    ) -> Result<Vec<Vec<u8>>, TrieError> {
        let root = self.root.as_mut().ok_or(TrieError::TrieNotInitialized)?;

        match root.get_node_from_trie(db, prefix, 0) {
            Some(node) => {
                let mut expanded = Vec::new();
                node.get_all_values(db, prefix, max_values, &mut expanded)?;
                Ok(expanded
                    .into_iter()
                    .map(|v| combine_nibbles(v.as_slice()))
                    .collect())
            }
            None => Ok(Vec::new()),
        }
    }

    /// Node hash plus per-child subtree hashes at a nibble prefix. Peers
    /// compare these maps and descend only where they differ.
    pub fn get_trie_node_metadata(
        &self,
        db: &RocksDB,
        txn_batch: &RocksDbTransactionBatch,
        prefix: &[u8],
    ) -> Result<NodeMetadata, TrieError> {
        let node_key = TrieNode::make_primary_key(prefix, None);
        let node = Self::get_node(db, txn_batch, &node_key).ok_or(TrieError::NodeNotFound {
            prefix: prefix.to_vec(),
        })?;

        let mut children = HashMap::new();
        for char in node.children_chars() {
            let mut child_prefix = prefix.to_vec();
            child_prefix.push(char);

            let child_key = TrieNode::make_primary_key(&child_prefix, None);
            let child_node = Self::get_node(db, txn_batch, &child_key).ok_or(
                TrieError::ChildNotFound {
                    char,
                    prefix: prefix.to_vec(),
                },
            )?;

            children.insert(
                char,
                NodeMetadata {
                    prefix: child_prefix,
                    num_messages: child_node.items(),
                    hash: hex::encode(child_node.hash()),
                    children: HashMap::new(),
                },
            );
        }

        Ok(NodeMetadata {
            prefix: prefix.to_vec(),
            num_messages: node.items(),
            hash: hex::encode(node.hash()),
            children,
        })
    }
}
