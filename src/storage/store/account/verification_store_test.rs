#[cfg(test)]
mod tests {
    use super::super::super::test_helper::FID_FOR_TEST;
    use crate::proto::hub_event;
    use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
    use crate::storage::store::account::{
        Store, StoreEventHandler, VerificationStore, VerificationStoreDef,
    };
    use crate::utils::factory::{messages_factory, time};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (Store<VerificationStoreDef>, Arc<RocksDB>, TempDir) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = RocksDB::open_at(temp_dir.path().join("test.db").to_str().unwrap()).unwrap();
        let event_handler = StoreEventHandler::new();
        let store = VerificationStore::new(db.clone(), event_handler, 10);
        (store, db, temp_dir)
    }

    fn eth_address() -> Vec<u8> {
        vec![0x42u8; 20]
    }

    fn merge(
        store: &Store<VerificationStoreDef>,
        db: &Arc<RocksDB>,
        msg: &crate::proto::Message,
    ) {
        let mut txn = RocksDbTransactionBatch::new();
        store.merge(msg, &mut txn).unwrap();
        db.commit(txn).unwrap();
    }

    #[tokio::test]
    async fn test_verification_round_trip() {
        let (store, db, _temp_dir) = create_test_store();

        let verification = messages_factory::verifications::create_verification_add(
            FID_FOR_TEST,
            eth_address(),
            None,
            None,
        );
        merge(&store, &db, &verification);

        let retrieved = VerificationStore::get_verification_add(&store, FID_FOR_TEST, eth_address())
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, verification);

        let page = VerificationStore::get_verification_adds_by_fid(
            &store,
            FID_FOR_TEST,
            &PageOptions::default(),
        )
        .unwrap();
        assert_eq!(page.messages, vec![verification]);
    }

    #[tokio::test]
    async fn test_remove_displaces_add_by_address() {
        let (store, db, _temp_dir) = create_test_store();
        let timestamp = time::farcaster_time();

        let add = messages_factory::verifications::create_verification_add(
            FID_FOR_TEST,
            eth_address(),
            Some(timestamp),
            None,
        );
        let remove = messages_factory::verifications::create_verification_remove(
            FID_FOR_TEST,
            eth_address(),
            Some(timestamp + 1),
            None,
        );

        merge(&store, &db, &add);

        let mut txn = RocksDbTransactionBatch::new();
        let event = store.merge(&remove, &mut txn).unwrap();
        db.commit(txn).unwrap();
        match &event.body {
            Some(hub_event::Body::MergeMessageBody(body)) => {
                assert_eq!(body.deleted_messages, vec![add]);
            }
            _ => panic!("Unexpected event"),
        }

        assert!(
            VerificationStore::get_verification_add(&store, FID_FOR_TEST, eth_address())
                .unwrap()
                .is_none()
        );
        assert!(
            VerificationStore::get_verification_remove(&store, FID_FOR_TEST, eth_address())
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_different_addresses_do_not_conflict() {
        let (store, db, _temp_dir) = create_test_store();

        let verification_a = messages_factory::verifications::create_verification_add(
            FID_FOR_TEST,
            vec![0x01u8; 20],
            None,
            None,
        );
        let verification_b = messages_factory::verifications::create_verification_add(
            FID_FOR_TEST,
            vec![0x02u8; 20],
            None,
            None,
        );
        merge(&store, &db, &verification_a);
        merge(&store, &db, &verification_b);

        let page = VerificationStore::get_verification_adds_by_fid(
            &store,
            FID_FOR_TEST,
            &PageOptions::default(),
        )
        .unwrap();
        assert_eq!(page.messages.len(), 2);
    }
}
