use std::sync::Arc;

use crate::storage::db::{RocksDB, RocksDbTransactionBatch};
use crate::storage::trie::merkle_trie::{MerkleTrie, TrieKey, SYNC_ID_LENGTH};
use crate::storage::trie::util::expand_nibbles;
use crate::utils::factory::messages_factory;

fn open_db() -> (Arc<RocksDB>, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let db = RocksDB::open_at(tmp.path().join("db").to_str().unwrap()).unwrap();
    (db, tmp)
}

fn new_trie(db: &RocksDB) -> MerkleTrie {
    let mut trie = MerkleTrie::new();
    trie.initialize(db).unwrap();
    trie
}

fn sync_id(timestamp: u32, seed: u8) -> Vec<u8> {
    let mut id = format!("{:010}", timestamp).into_bytes();
    id.push(1); // cast store postfix
    id.extend_from_slice(&1234u32.to_be_bytes());
    id.extend_from_slice(&[seed; 20]);
    assert_eq!(id.len(), SYNC_ID_LENGTH);
    id
}

fn insert_and_commit(trie: &mut MerkleTrie, db: &RocksDB, ids: &[Vec<u8>]) {
    let mut txn = RocksDbTransactionBatch::new();
    let keys: Vec<&[u8]> = ids.iter().map(|v| v.as_slice()).collect();
    let results = trie.insert(db, &mut txn, keys).unwrap();
    assert!(results.iter().all(|r| *r));
    db.commit(txn).unwrap();
    trie.reload(db).unwrap();
}

fn delete_and_commit(trie: &mut MerkleTrie, db: &RocksDB, ids: &[Vec<u8>]) {
    let mut txn = RocksDbTransactionBatch::new();
    let keys: Vec<&[u8]> = ids.iter().map(|v| v.as_slice()).collect();
    let results = trie.delete(db, &mut txn, keys).unwrap();
    assert!(results.iter().all(|r| *r));
    db.commit(txn).unwrap();
    trie.reload(db).unwrap();
}

#[test]
fn test_insert_exists_delete() {
    let (db, _tmp) = open_db();
    let mut trie = new_trie(&db);

    let id1 = sync_id(1000, 1);
    let id2 = sync_id(1000, 2);

    assert!(!trie.exists(&db, &id1).unwrap());
    insert_and_commit(&mut trie, &db, &[id1.clone(), id2.clone()]);

    assert!(trie.exists(&db, &id1).unwrap());
    assert!(trie.exists(&db, &id2).unwrap());
    assert_eq!(trie.items().unwrap(), 2);

    // Re-inserting reports not-inserted and changes nothing
    let mut txn = RocksDbTransactionBatch::new();
    let results = trie.insert(&db, &mut txn, vec![&id1]).unwrap();
    assert_eq!(results, vec![false]);

    delete_and_commit(&mut trie, &db, &[id1.clone()]);
    assert!(!trie.exists(&db, &id1).unwrap());
    assert!(trie.exists(&db, &id2).unwrap());
    assert_eq!(trie.items().unwrap(), 1);

    // Deleting an absent key reports not-deleted
    let mut txn = RocksDbTransactionBatch::new();
    let results = trie.delete(&db, &mut txn, vec![&id1]).unwrap();
    assert_eq!(results, vec![false]);
}

#[test]
fn test_root_hash_depends_only_on_key_set() {
    let (db_a, _tmp_a) = open_db();
    let (db_b, _tmp_b) = open_db();
    let mut trie_a = new_trie(&db_a);
    let mut trie_b = new_trie(&db_b);

    // Same timestamp so the keys share a long prefix and force splits
    let ids = vec![sync_id(1000, 1), sync_id(1000, 2), sync_id(2000, 3)];

    insert_and_commit(&mut trie_a, &db_a, &ids);

    let mut reversed = ids.clone();
    reversed.reverse();
    insert_and_commit(&mut trie_b, &db_b, &reversed);

    assert_eq!(trie_a.root_hash().unwrap(), trie_b.root_hash().unwrap());

    // Insert-then-delete converges to the same structure (and hash) as
    // never having inserted
    let extra = sync_id(1000, 9);
    let before = trie_a.root_hash().unwrap();
    insert_and_commit(&mut trie_a, &db_a, &[extra.clone()]);
    assert_ne!(trie_a.root_hash().unwrap(), before);
    delete_and_commit(&mut trie_a, &db_a, &[extra]);
    assert_eq!(trie_a.root_hash().unwrap(), before);
}

#[test]
fn test_empty_trie_hash_is_stable() {
    let (db, _tmp) = open_db();
    let mut trie = new_trie(&db);
    let empty_hash = trie.root_hash().unwrap();

    let id = sync_id(1234, 7);
    insert_and_commit(&mut trie, &db, &[id.clone()]);
    delete_and_commit(&mut trie, &db, &[id]);

    assert_eq!(trie.root_hash().unwrap(), empty_hash);
    assert_eq!(trie.items().unwrap(), 0);
}

#[test]
fn test_get_all_values_under_prefix() {
    let (db, _tmp) = open_db();
    let mut trie = new_trie(&db);

    let early = vec![sync_id(1111, 1), sync_id(1111, 2)];
    let late = vec![sync_id(2222, 3)];
    insert_and_commit(&mut trie, &db, &early);
    insert_and_commit(&mut trie, &db, &late);

    // The whole set from the root
    let mut all = trie.get_all_values(&db, &[], 100).unwrap();
    all.sort();
    let mut expected = [early.clone(), late.clone()].concat();
    expected.sort();
    assert_eq!(all, expected);

    // Only the subtree under the early timestamp's nibble path. The two
    // timestamps ("0000001111" / "0000002222") diverge at the seventh digit.
    let early_prefix = expand_nibbles(&early[0][0..7]);
    let mut subset = trie.get_all_values(&db, &early_prefix, 100).unwrap();
    subset.sort();
    let mut expected_early = early.clone();
    expected_early.sort();
    assert_eq!(subset, expected_early);

    // max_values caps the result
    let capped = trie.get_all_values(&db, &[], 1).unwrap();
    assert_eq!(capped.len(), 1);
}

#[test]
fn test_metadata_children_reflect_divergence() {
    let (db, _tmp) = open_db();
    let mut trie = new_trie(&db);

    let ids = vec![sync_id(1111, 1), sync_id(9999, 2)];
    insert_and_commit(&mut trie, &db, &ids);

    // Walk the shared prefix down to the divergence point, the way a peer
    // compares children hashes during reconciliation
    let txn = RocksDbTransactionBatch::new();
    let mut prefix: Vec<u8> = vec![];
    loop {
        let meta = trie.get_trie_node_metadata(&db, &txn, &prefix).unwrap();
        assert_eq!(meta.num_messages, 2);
        if meta.children.len() == 2 {
            // Subtree hashes at the divergence point differ
            let hashes: Vec<String> = meta.children.values().map(|c| c.hash.clone()).collect();
            assert_ne!(hashes[0], hashes[1]);
            break;
        }
        assert_eq!(meta.children.len(), 1, "shared prefix nodes have one child");
        prefix = meta.children.values().next().unwrap().prefix.clone();
    }
}

#[test]
fn test_trie_key_round_trips_message_coordinates() {
    let message = messages_factory::casts::create_cast_add(54321, "hello", Some(7_000_000), None);
    let sync_id = TrieKey::for_message(&message);
    assert_eq!(sync_id.len(), SYNC_ID_LENGTH);

    let (fid, postfix, ts_hash) = TrieKey::decode(&sync_id).unwrap();
    assert_eq!(fid, 54321);
    assert_eq!(
        postfix,
        crate::storage::constants::UserPostfix::CastMessage.as_u8()
    );
    assert_eq!(&ts_hash[0..4], &7_000_000u32.to_be_bytes());
    assert_eq!(&ts_hash[4..], message.hash.as_slice());
}

#[test]
fn test_get_count_at_prefix() {
    let (db, _tmp) = open_db();
    let mut trie = new_trie(&db);

    insert_and_commit(
        &mut trie,
        &db,
        &[sync_id(1111, 1), sync_id(1111, 2), sync_id(2222, 3)],
    );

    let txn = RocksDbTransactionBatch::new();
    assert_eq!(trie.get_count(&db, &txn, &[]).unwrap(), 3);
    let early_prefix = expand_nibbles(b"0000001111");
    assert_eq!(trie.get_count(&db, &txn, &early_prefix).unwrap(), 2);
    let late_prefix = expand_nibbles(b"0000002222");
    assert_eq!(trie.get_count(&db, &txn, &late_prefix).unwrap(), 1);
    let missing_prefix = expand_nibbles(b"0000003333");
    assert_eq!(trie.get_count(&db, &txn, &missing_prefix).unwrap(), 0);
}
