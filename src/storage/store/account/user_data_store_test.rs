#[cfg(test)]
mod tests {
    use super::super::super::test_helper::FID_FOR_TEST;
    use crate::proto::{hub_event, UserDataType};
    use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
    use crate::storage::store::account::{
        Store, StoreEventHandler, UserDataStore, UserDataStoreDef,
    };
    use crate::utils::factory::{messages_factory, time};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (Store<UserDataStoreDef>, Arc<RocksDB>, TempDir) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = RocksDB::open_at(temp_dir.path().join("test.db").to_str().unwrap()).unwrap();
        let event_handler = StoreEventHandler::new();
        let store = UserDataStore::new(db.clone(), event_handler, 10);
        (store, db, temp_dir)
    }

    fn merge(store: &Store<UserDataStoreDef>, db: &Arc<RocksDB>, msg: &crate::proto::Message) {
        let mut txn = RocksDbTransactionBatch::new();
        store.merge(msg, &mut txn).unwrap();
        db.commit(txn).unwrap();
    }

    #[tokio::test]
    async fn test_one_record_per_type() {
        let (store, db, _temp_dir) = create_test_store();
        let timestamp = time::farcaster_time();

        let bio_v1 = messages_factory::user_data::create_user_data_add(
            FID_FOR_TEST,
            UserDataType::Bio,
            "hello",
            Some(timestamp),
            None,
        );
        let bio_v2 = messages_factory::user_data::create_user_data_add(
            FID_FOR_TEST,
            UserDataType::Bio,
            "hello again",
            Some(timestamp + 1),
            None,
        );
        let pfp = messages_factory::user_data::create_user_data_add(
            FID_FOR_TEST,
            UserDataType::Pfp,
            "https://example.com/pfp.png",
            Some(timestamp),
            None,
        );

        merge(&store, &db, &bio_v1);
        merge(&store, &db, &pfp);

        // A newer record of the same type displaces the older one
        let mut txn = RocksDbTransactionBatch::new();
        let event = store.merge(&bio_v2, &mut txn).unwrap();
        db.commit(txn).unwrap();
        match &event.body {
            Some(hub_event::Body::MergeMessageBody(body)) => {
                assert_eq!(body.deleted_messages, vec![bio_v1]);
            }
            _ => panic!("Unexpected event"),
        }

        let bio =
            UserDataStore::get_user_data_by_fid_and_type(&store, FID_FOR_TEST, UserDataType::Bio)
                .unwrap()
                .unwrap();
        assert_eq!(bio, bio_v2);

        let page =
            UserDataStore::get_user_data_by_fid(&store, FID_FOR_TEST, &PageOptions::default())
                .unwrap();
        assert_eq!(page.messages.len(), 2); // bio + pfp
    }

    #[tokio::test]
    async fn test_older_record_loses() {
        let (store, db, _temp_dir) = create_test_store();
        let timestamp = time::farcaster_time();

        let display_new = messages_factory::user_data::create_user_data_add(
            FID_FOR_TEST,
            UserDataType::Display,
            "new name",
            Some(timestamp + 5),
            None,
        );
        merge(&store, &db, &display_new);

        let display_old = messages_factory::user_data::create_user_data_add(
            FID_FOR_TEST,
            UserDataType::Display,
            "old name",
            Some(timestamp),
            None,
        );
        let mut txn = RocksDbTransactionBatch::new();
        let err = store.merge(&display_old, &mut txn).unwrap_err();
        assert_eq!(err.code, "bad_request.conflict");
    }
}
