#[cfg(test)]
mod tests {
    use super::super::super::test_helper::FID_FOR_TEST;
    use crate::proto::{self as message, hub_event, HubEvent, HubEventType};
    use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
    use crate::storage::store::account::{CastStore, CastStoreDef, Store, StoreEventHandler};
    use crate::utils::factory::{messages_factory, time};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (Store<CastStoreDef>, Arc<RocksDB>, TempDir) {
        create_test_store_with_prune_limit(10)
    }

    fn create_test_store_with_prune_limit(
        prune_size_limit: u32,
    ) -> (Store<CastStoreDef>, Arc<RocksDB>, TempDir) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = RocksDB::open_at(temp_dir.path().join("test.db").to_str().unwrap()).unwrap();

        let event_handler = StoreEventHandler::new();
        let store = CastStore::new(db.clone(), event_handler.clone(), prune_size_limit);

        (store, db, temp_dir)
    }

    fn merge_message_failure(
        store: &Store<CastStoreDef>,
        message: &message::Message,
        err_code: &str,
    ) {
        let mut txn = RocksDbTransactionBatch::new();
        let result = store.merge(message, &mut txn);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().code, err_code);
    }

    fn merge_messages(
        store: &Store<CastStoreDef>,
        db: &Arc<RocksDB>,
        messages: Vec<&message::Message>,
    ) -> Vec<HubEvent> {
        let mut txn = RocksDbTransactionBatch::new();
        let mut events = Vec::new();

        for message in messages {
            let result = store.merge(message, &mut txn).unwrap();
            assert_eq!(result.r#type(), HubEventType::MergeMessage);
            match &result.body {
                Some(hub_event::Body::MergeMessageBody(body)) => {
                    assert_eq!(*body.message.as_ref().unwrap(), *message)
                }
                _ => panic!("Unexpected event"),
            }
            events.push(result);
        }
        db.commit(txn).unwrap();
        events
    }

    #[tokio::test]
    async fn test_get_cast_add_fails_if_missing() {
        let (store, _db, _temp_dir) = create_test_store();

        let cast_add =
            messages_factory::casts::create_cast_add(FID_FOR_TEST, "Test cast", None, None);

        let result = CastStore::get_cast_add(&store, FID_FOR_TEST, cast_add.hash.clone());
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_cast_add_succeeds_with_message() {
        let (store, db, _temp_dir) = create_test_store();

        let cast_add =
            messages_factory::casts::create_cast_add(FID_FOR_TEST, "Test cast", None, None);

        merge_messages(&store, &db, vec![&cast_add]);
        let retrieved = CastStore::get_cast_add(&store, FID_FOR_TEST, cast_add.hash.clone())
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, cast_add);

        // Wrong fid finds nothing
        let result = CastStore::get_cast_add(&store, 999999, cast_add.hash.clone());
        assert!(result.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_cast_remove_succeeds() {
        let (store, db, _temp_dir) = create_test_store();

        let target_hash: Vec<u8> = (0..20).map(|_| rand::random::<u8>()).collect();
        let cast_remove =
            messages_factory::casts::create_cast_remove(FID_FOR_TEST, &target_hash, None, None);

        merge_messages(&store, &db, vec![&cast_remove]);

        let retrieved = CastStore::get_cast_remove(&store, FID_FOR_TEST, target_hash)
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, cast_remove);
    }

    #[tokio::test]
    async fn test_duplicate_merge_fails() {
        let (store, db, _temp_dir) = create_test_store();

        let cast_add = messages_factory::casts::create_cast_add(FID_FOR_TEST, "dup", None, None);
        merge_messages(&store, &db, vec![&cast_add]);

        merge_message_failure(&store, &cast_add, "bad_request.duplicate");
    }

    #[tokio::test]
    async fn test_remove_displaces_older_add() {
        let (store, db, _temp_dir) = create_test_store();

        let timestamp = time::farcaster_time();
        let cast_add =
            messages_factory::casts::create_cast_add(FID_FOR_TEST, "bye", Some(timestamp), None);
        let cast_remove = messages_factory::casts::create_cast_remove(
            FID_FOR_TEST,
            &cast_add.hash,
            Some(timestamp + 1),
            None,
        );

        merge_messages(&store, &db, vec![&cast_add]);

        let mut txn = RocksDbTransactionBatch::new();
        let result = store.merge(&cast_remove, &mut txn).unwrap();
        db.commit(txn).unwrap();
        match &result.body {
            Some(hub_event::Body::MergeMessageBody(body)) => {
                assert_eq!(body.deleted_messages, vec![cast_add.clone()]);
            }
            _ => panic!("Unexpected event"),
        }

        assert!(CastStore::get_cast_add(&store, FID_FOR_TEST, cast_add.hash.clone())
            .unwrap()
            .is_none());

        // Replaying the displaced add now loses
        merge_message_failure(&store, &cast_add, "bad_request.conflict");
    }

    #[tokio::test]
    async fn test_add_beats_remove_at_same_timestamp() {
        let (store, db, _temp_dir) = create_test_store();

        let timestamp = time::farcaster_time();
        let cast_add =
            messages_factory::casts::create_cast_add(FID_FOR_TEST, "sticky", Some(timestamp), None);
        let cast_remove = messages_factory::casts::create_cast_remove(
            FID_FOR_TEST,
            &cast_add.hash,
            Some(timestamp),
            None,
        );

        merge_messages(&store, &db, vec![&cast_remove]);

        // Same timestamp: the add outranks the remove and displaces it
        let mut txn = RocksDbTransactionBatch::new();
        let result = store.merge(&cast_add, &mut txn).unwrap();
        db.commit(txn).unwrap();
        match &result.body {
            Some(hub_event::Body::MergeMessageBody(body)) => {
                assert_eq!(body.deleted_messages, vec![cast_remove.clone()]);
            }
            _ => panic!("Unexpected event"),
        }

        assert_eq!(
            CastStore::get_cast_add(&store, FID_FOR_TEST, cast_add.hash.clone())
                .unwrap()
                .unwrap(),
            cast_add
        );
        merge_message_failure(&store, &cast_remove, "bad_request.conflict");
    }

    #[tokio::test]
    async fn test_get_cast_adds_by_fid() {
        let (store, db, _temp_dir) = create_test_store();

        let timestamp = time::farcaster_time();
        let cast1 =
            messages_factory::casts::create_cast_add(FID_FOR_TEST, "one", Some(timestamp), None);
        let cast2 = messages_factory::casts::create_cast_add(
            FID_FOR_TEST,
            "two",
            Some(timestamp + 1),
            None,
        );
        merge_messages(&store, &db, vec![&cast1, &cast2]);

        let page =
            CastStore::get_cast_adds_by_fid(&store, FID_FOR_TEST, &PageOptions::default()).unwrap();
        assert_eq!(page.messages, vec![cast1, cast2]);
        assert!(page.next_page_token.is_none());

        let page = CastStore::get_cast_adds_by_fid(&store, 999999, &PageOptions::default()).unwrap();
        assert!(page.messages.is_empty());
    }

    #[tokio::test]
    async fn test_get_casts_by_parent_and_mention() {
        let (store, db, _temp_dir) = create_test_store();

        let parent = message::cast_add_body::Parent::ParentCastId(message::CastId {
            fid: 99,
            hash: vec![3u8; 20],
        });
        let reply = messages_factory::casts::create_cast_add_with_parent(
            FID_FOR_TEST,
            "a reply",
            parent.clone(),
            None,
            None,
        );
        merge_messages(&store, &db, vec![&reply]);

        let page =
            CastStore::get_casts_by_parent(&store, &parent, &PageOptions::default()).unwrap();
        assert_eq!(page.messages, vec![reply.clone()]);

        let other_parent = message::cast_add_body::Parent::ParentCastId(message::CastId {
            fid: 98,
            hash: vec![4u8; 20],
        });
        let page =
            CastStore::get_casts_by_parent(&store, &other_parent, &PageOptions::default()).unwrap();
        assert!(page.messages.is_empty());
    }

    #[tokio::test]
    async fn test_revoke_removes_message_and_indices() {
        let (store, db, _temp_dir) = create_test_store();

        let cast_add = messages_factory::casts::create_cast_add(FID_FOR_TEST, "gone", None, None);
        merge_messages(&store, &db, vec![&cast_add]);

        let mut txn = RocksDbTransactionBatch::new();
        let result = store.revoke(&cast_add, &mut txn).unwrap();
        assert_eq!(result.r#type(), HubEventType::RevokeMessage);
        db.commit(txn).unwrap();

        assert!(CastStore::get_cast_add(&store, FID_FOR_TEST, cast_add.hash.clone())
            .unwrap()
            .is_none());

        // Revoking an unmerged message is harmless
        let mut txn = RocksDbTransactionBatch::new();
        let result = store.revoke(&cast_add, &mut txn);
        assert_eq!(result.unwrap_err().code, "not_found");
    }

    #[tokio::test]
    async fn test_prune_messages_evicts_earliest() {
        let (store, db, _temp_dir) = create_test_store_with_prune_limit(3);

        let timestamp = time::farcaster_time();
        let mut casts = vec![];
        for i in 0..5u32 {
            let cast = messages_factory::casts::create_cast_add(
                FID_FOR_TEST,
                &format!("cast {}", i),
                Some(timestamp + i),
                None,
            );
            casts.push(cast);
        }
        merge_messages(&store, &db, casts.iter().collect());

        let mut txn = RocksDbTransactionBatch::new();
        let events = store
            .prune_messages(FID_FOR_TEST, 5, 3, &mut txn)
            .unwrap();
        db.commit(txn).unwrap();

        assert_eq!(events.len(), 2);
        for (event, pruned) in events.iter().zip(&casts[0..2]) {
            assert_eq!(event.r#type(), HubEventType::PruneMessage);
            match &event.body {
                Some(hub_event::Body::PruneMessageBody(body)) => {
                    assert_eq!(body.message.as_ref().unwrap().hash, pruned.hash);
                }
                _ => panic!("Unexpected event"),
            }
        }

        let page =
            CastStore::get_cast_adds_by_fid(&store, FID_FOR_TEST, &PageOptions::default()).unwrap();
        assert_eq!(
            page.messages,
            casts[2..].to_vec(),
            "only the three newest casts remain"
        );
    }

    #[tokio::test]
    async fn test_revoke_messages_by_signer() {
        let (store, db, _temp_dir) = create_test_store();

        let signer_a = ed25519_dalek::SigningKey::from_bytes(&[1u8; 32]);
        let signer_b = ed25519_dalek::SigningKey::from_bytes(&[2u8; 32]);
        let timestamp = time::farcaster_time();

        let cast_a1 = messages_factory::casts::create_cast_add(
            FID_FOR_TEST,
            "a1",
            Some(timestamp),
            Some(&signer_a),
        );
        let cast_a2 = messages_factory::casts::create_cast_add(
            FID_FOR_TEST,
            "a2",
            Some(timestamp + 1),
            Some(&signer_a),
        );
        let cast_b = messages_factory::casts::create_cast_add(
            FID_FOR_TEST,
            "b",
            Some(timestamp + 2),
            Some(&signer_b),
        );
        merge_messages(&store, &db, vec![&cast_a1, &cast_a2, &cast_b]);

        let mut txn = RocksDbTransactionBatch::new();
        let events = store
            .revoke_messages_by_signer(
                FID_FOR_TEST,
                signer_a.verifying_key().as_bytes(),
                &mut txn,
            )
            .unwrap();
        db.commit(txn).unwrap();
        assert_eq!(events.len(), 2);

        let page =
            CastStore::get_cast_adds_by_fid(&store, FID_FOR_TEST, &PageOptions::default()).unwrap();
        assert_eq!(page.messages, vec![cast_b]);
    }
}
