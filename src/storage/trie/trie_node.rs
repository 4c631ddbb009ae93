use std::collections::BTreeMap;

use prost::Message as _;

use super::errors::TrieError;
use crate::proto::DbTrieNode;
use crate::storage::constants::RootPrefix;
use crate::storage::db::{RocksDB, RocksDbTransactionBatch};

/// Nibble depth below which nodes are never compacted into leaves. This spans
/// the 10 timestamp digits at the head of every sync id, so metadata queries
/// over timestamp prefixes always resolve to real interior nodes.
pub const UNCOMPACTED_LENGTH: usize = 20;

fn blake3_20(inputs: &[&[u8]]) -> Vec<u8> {
    let mut hasher = blake3::Hasher::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize().as_bytes()[0..20].to_vec()
}

enum Child {
    /// Present in the serialized form but not yet read from the DB.
    Serialized,
    Node(Box<TrieNode>),
}

/// One node of the sync trie. A node is either a leaf carrying a full
/// (nibble-expanded) sync id, or an interior node whose hash rolls up its
/// children. Interior hashes are computed over `(char ‖ child_hash)` pairs in
/// char order, so structurally identical tries hash identically regardless of
/// insertion order.
pub struct TrieNode {
    hash: Vec<u8>,
    items: usize,
    children: BTreeMap<u8, Child>,
    key: Option<Vec<u8>>,
}

impl TrieNode {
    pub fn new() -> TrieNode {
        TrieNode {
            hash: vec![],
            items: 0,
            children: BTreeMap::new(),
            key: None,
        }
    }

    pub fn make_primary_key(prefix: &[u8], child_char: Option<u8>) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + prefix.len() + 1);
        key.push(RootPrefix::SyncMerkleTrieNode as u8);
        key.extend_from_slice(prefix);
        if let Some(char) = child_char {
            key.push(char);
        }
        key
    }

    pub fn serialize(node: &TrieNode) -> Vec<u8> {
        let db_node = DbTrieNode {
            key: node.key.clone().unwrap_or_default(),
            child_chars: node.children.keys().map(|c| *c as u32).collect(),
            items: node.items as u64,
            hash: node.hash.clone(),
        };
        db_node.encode_to_vec()
    }

    pub fn deserialize(serialized: &[u8]) -> Result<TrieNode, TrieError> {
        let db_node = DbTrieNode::decode(serialized).map_err(TrieError::wrap_deserialize)?;

        let mut children = BTreeMap::new();
        for char in db_node.child_chars {
            children.insert(char as u8, Child::Serialized);
        }

        Ok(TrieNode {
            hash: db_node.hash,
            items: db_node.items as usize,
            children,
            key: if db_node.key.is_empty() {
                None
            } else {
                Some(db_node.key)
            },
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.key.is_some()
    }

    pub fn value(&self) -> Option<Vec<u8>> {
        self.key.clone()
    }

    pub fn items(&self) -> usize {
        self.items
    }

    pub fn hash(&self) -> Vec<u8> {
        self.hash.clone()
    }

    pub fn children_chars(&self) -> Vec<u8> {
        self.children.keys().cloned().collect()
    }

    fn get_or_load_child(
        &mut self,
        db: &RocksDB,
        prefix: &[u8],
        char: u8,
    ) -> Result<&mut TrieNode, TrieError> {
        let needs_load = match self.children.get(&char) {
            None => {
                return Err(TrieError::ChildNotFound {
                    char,
                    prefix: prefix.to_vec(),
                })
            }
            Some(Child::Serialized) => true,
            Some(Child::Node(_)) => false,
        };

        if needs_load {
            let child_key = Self::make_primary_key(prefix, Some(char));
            let bytes = db
                .get(&child_key)
                .map_err(TrieError::wrap_database)?
                .ok_or(TrieError::NodeNotFound {
                    prefix: child_key.clone(),
                })?;
            let node = TrieNode::deserialize(&bytes)?;
            self.children.insert(char, Child::Node(Box::new(node)));
        }

        match self.children.get_mut(&char) {
            Some(Child::Node(node)) => Ok(node),
            _ => unreachable!(),
        }
    }

    fn update_hash(&mut self, db: &RocksDB, prefix: &[u8]) -> Result<(), TrieError> {
        if let Some(key) = &self.key {
            self.hash = blake3_20(&[key]);
            return Ok(());
        }
        if self.children.is_empty() {
            self.hash = vec![];
            return Ok(());
        }

        let chars = self.children_chars();
        let mut parts: Vec<Vec<u8>> = Vec::with_capacity(chars.len() * 2);
        for char in chars {
            let child = self.get_or_load_child(db, prefix, char)?;
            let child_hash = child.hash.clone();
            parts.push(vec![char]);
            parts.push(child_hash);
        }
        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_slice()).collect();
        self.hash = blake3_20(&refs);
        Ok(())
    }

    fn put_to_txn(&self, txn: &mut RocksDbTransactionBatch, prefix: &[u8]) {
        txn.put(Self::make_primary_key(prefix, None), Self::serialize(self));
    }

    /// Insert a nibble-expanded key. Returns false if it was already present.
    pub fn insert(
        &mut self,
        db: &RocksDB,
        txn: &mut RocksDbTransactionBatch,
        key: &[u8],
        depth: usize,
    ) -> Result<bool, TrieError> {
        if depth >= key.len() {
            return Err(TrieError::InvalidState(
                "insert exhausted key without finding a slot".to_string(),
            ));
        }
        let prefix = &key[..depth];

        if self.is_leaf() {
            if self.key.as_deref() == Some(key) {
                return Ok(false);
            }

            // Two distinct keys now share this prefix: push the resident key
            // one level down, then continue as an interior node. If both keys
            // agree on the next char too, the child splits again on recursion.
            let existing = self.key.take().unwrap();
            self.items = 0;
            let existing_char = existing[depth];
            self.children
                .insert(existing_char, Child::Node(Box::new(TrieNode::new())));
            let child = self.get_or_load_child(db, prefix, existing_char)?;
            child.insert(db, txn, &existing, depth + 1)?;
            self.items += 1;
        }

        // An untouched slot deep enough to compact becomes a leaf.
        if self.children.is_empty() && self.items == 0 && depth >= UNCOMPACTED_LENGTH {
            self.key = Some(key.to_vec());
            self.items = 1;
            self.update_hash(db, prefix)?;
            self.put_to_txn(txn, prefix);
            return Ok(true);
        }

        let char = key[depth];
        if !self.children.contains_key(&char) {
            self.children
                .insert(char, Child::Node(Box::new(TrieNode::new())));
        }
        let child = self.get_or_load_child(db, prefix, char)?;
        let inserted = child.insert(db, txn, key, depth + 1)?;

        if inserted {
            self.items += 1;
        }
        self.update_hash(db, prefix)?;
        self.put_to_txn(txn, prefix);
        Ok(inserted)
    }

    /// Delete a nibble-expanded key. Returns false if it was not present.
    pub fn delete(
        &mut self,
        db: &RocksDB,
        txn: &mut RocksDbTransactionBatch,
        key: &[u8],
        depth: usize,
    ) -> Result<bool, TrieError> {
        let prefix = &key[..depth];

        if self.is_leaf() {
            if self.key.as_deref() == Some(key) {
                self.key = None;
                self.items = 0;
                self.update_hash(db, prefix)?;
                self.put_to_txn(txn, prefix);
                return Ok(true);
            }
            return Ok(false);
        }

        if depth >= key.len() {
            return Ok(false);
        }
        let char = key[depth];
        if !self.children.contains_key(&char) {
            return Ok(false);
        }

        let mut child_prefix = prefix.to_vec();
        child_prefix.push(char);

        let child = self.get_or_load_child(db, prefix, char)?;
        let deleted = child.delete(db, txn, key, depth + 1)?;
        if !deleted {
            return Ok(false);
        }

        self.items -= 1;
        if self.get_or_load_child(db, prefix, char)?.items == 0 {
            self.children.remove(&char);
            txn.delete(Self::make_primary_key(&child_prefix, None));
        }

        // Re-compact: a lone leaf child is pulled up so the structure (and
        // with it the root hash) depends only on the surviving key set.
        if depth >= UNCOMPACTED_LENGTH && self.children.len() == 1 {
            let char = *self.children.keys().next().unwrap();
            let child = self.get_or_load_child(db, prefix, char)?;
            if child.is_leaf() {
                let leaf_key = child.key.clone();
                self.children.remove(&char);
                let mut lone_prefix = prefix.to_vec();
                lone_prefix.push(char);
                txn.delete(Self::make_primary_key(&lone_prefix, None));
                self.key = leaf_key;
            }
        }

        self.update_hash(db, prefix)?;
        self.put_to_txn(txn, prefix);
        Ok(true)
    }

    pub fn exists(&mut self, db: &RocksDB, key: &[u8], depth: usize) -> Result<bool, TrieError> {
        if self.is_leaf() {
            return Ok(self.key.as_deref() == Some(key));
        }
        if depth >= key.len() {
            return Ok(false);
        }
        let char = key[depth];
        if !self.children.contains_key(&char) {
            return Ok(false);
        }
        let prefix = &key[..depth];
        let child = self.get_or_load_child(db, prefix, char)?;
        child.exists(db, key, depth + 1)
    }

    /// Walk down to the node at `prefix`, or the leaf that covers it.
    pub fn get_node_from_trie(
        &mut self,
        db: &RocksDB,
        prefix: &[u8],
        depth: usize,
    ) -> Option<&mut TrieNode> {
        if depth == prefix.len() {
            return Some(self);
        }
        if self.is_leaf() {
            if self.key.as_deref().map(|k| k.starts_with(prefix)) == Some(true) {
                return Some(self);
            }
            return None;
        }
        let char = prefix[depth];
        if !self.children.contains_key(&char) {
            return None;
        }
        match self.get_or_load_child(db, &prefix[..depth], char) {
            Ok(child) => child.get_node_from_trie(db, prefix, depth + 1),
            Err(_) => None,
        }
    }

    /// Collect every leaf key in this subtree, up to `max_values`. `prefix` is
    /// the nibble path from the root to this node.
    pub fn get_all_values(
        &mut self,
        db: &RocksDB,
        prefix: &[u8],
        max_values: usize,
        out: &mut Vec<Vec<u8>>,
    ) -> Result<(), TrieError> {
        if out.len() >= max_values {
            return Ok(());
        }
        if let Some(key) = &self.key {
            out.push(key.clone());
            return Ok(());
        }
        for char in self.children_chars() {
            let mut child_prefix = prefix.to_vec();
            child_prefix.push(char);
            let child = self.get_or_load_child(db, prefix, char)?;
            child.get_all_values(db, &child_prefix, max_values, out)?;
            if out.len() >= max_values {
                break;
            }
        }
        Ok(())
    }
}
