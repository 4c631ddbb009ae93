#[cfg(test)]
mod tests {
    use super::super::super::test_helper::FID_FOR_TEST;
    use crate::proto::{self as message, hub_event, HubEventType, ReactionType};
    use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
    use crate::storage::store::account::{
        ReactionStore, ReactionStoreDef, Store, StoreEventHandler,
    };
    use crate::utils::factory::{messages_factory, time};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (Store<ReactionStoreDef>, Arc<RocksDB>, TempDir) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = RocksDB::open_at(temp_dir.path().join("test.db").to_str().unwrap()).unwrap();
        let event_handler = StoreEventHandler::new();
        let store = ReactionStore::new(db.clone(), event_handler, 10);
        (store, db, temp_dir)
    }

    fn cast_target() -> message::reaction_body::Target {
        message::reaction_body::Target::TargetCastId(message::CastId {
            fid: 42,
            hash: vec![6u8; 20],
        })
    }

    fn merge(store: &Store<ReactionStoreDef>, db: &Arc<RocksDB>, msg: &message::Message) {
        let mut txn = RocksDbTransactionBatch::new();
        store.merge(msg, &mut txn).unwrap();
        db.commit(txn).unwrap();
    }

    #[tokio::test]
    async fn test_reaction_add_round_trip() {
        let (store, db, _temp_dir) = create_test_store();

        let reaction = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST,
            ReactionType::Like,
            cast_target(),
            None,
            None,
        );
        merge(&store, &db, &reaction);

        let retrieved = ReactionStore::get_reaction_add(
            &store,
            FID_FOR_TEST,
            ReactionType::Like as i32,
            cast_target(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(retrieved, reaction);

        // Recast of the same target is a different body key
        let missing = ReactionStore::get_reaction_add(
            &store,
            FID_FOR_TEST,
            ReactionType::Recast as i32,
            cast_target(),
        )
        .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_later_remove_displaces_add() {
        let (store, db, _temp_dir) = create_test_store();
        let timestamp = time::farcaster_time();

        let reaction_add = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST,
            ReactionType::Like,
            cast_target(),
            Some(timestamp),
            None,
        );
        let reaction_remove = messages_factory::reactions::create_reaction_remove(
            FID_FOR_TEST,
            ReactionType::Like,
            cast_target(),
            Some(timestamp + 1),
            None,
        );

        merge(&store, &db, &reaction_add);

        let mut txn = RocksDbTransactionBatch::new();
        let event = store.merge(&reaction_remove, &mut txn).unwrap();
        db.commit(txn).unwrap();

        assert_eq!(event.r#type(), HubEventType::MergeMessage);
        match &event.body {
            Some(hub_event::Body::MergeMessageBody(body)) => {
                assert_eq!(body.deleted_messages, vec![reaction_add.clone()]);
            }
            _ => panic!("Unexpected event"),
        }

        let adds = ReactionStore::get_reaction_adds_by_fid(
            &store,
            FID_FOR_TEST,
            ReactionType::Like as i32,
            &PageOptions::default(),
        )
        .unwrap();
        assert!(adds.messages.is_empty());

        // An even older add cannot resurrect the reaction
        let stale_add = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST,
            ReactionType::Like,
            cast_target(),
            Some(timestamp.saturating_sub(10)),
            None,
        );
        let mut txn = RocksDbTransactionBatch::new();
        let err = store.merge(&stale_add, &mut txn).unwrap_err();
        assert_eq!(err.code, "bad_request.conflict");
    }

    #[tokio::test]
    async fn test_reactions_by_target_across_fids() {
        let (store, db, _temp_dir) = create_test_store();
        let timestamp = time::farcaster_time();

        let like_a = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST,
            ReactionType::Like,
            cast_target(),
            Some(timestamp),
            None,
        );
        let like_b = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST + 1,
            ReactionType::Like,
            cast_target(),
            Some(timestamp + 1),
            None,
        );
        let recast = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST + 2,
            ReactionType::Recast,
            cast_target(),
            Some(timestamp + 2),
            None,
        );
        merge(&store, &db, &like_a);
        merge(&store, &db, &like_b);
        merge(&store, &db, &recast);

        let likes = ReactionStore::get_reactions_by_target(
            &store,
            &cast_target(),
            ReactionType::Like as i32,
            &PageOptions::default(),
        )
        .unwrap();
        assert_eq!(likes.messages.len(), 2);
        assert!(likes.messages.contains(&like_a));
        assert!(likes.messages.contains(&like_b));

        let all = ReactionStore::get_reactions_by_target(
            &store,
            &cast_target(),
            ReactionType::None as i32,
            &PageOptions::default(),
        )
        .unwrap();
        assert_eq!(all.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_url_targets_are_distinct_from_cast_targets() {
        let (store, db, _temp_dir) = create_test_store();

        let url_target =
            message::reaction_body::Target::TargetUrl("https://example.com/a".to_string());
        let like_url = messages_factory::reactions::create_reaction_add(
            FID_FOR_TEST,
            ReactionType::Like,
            url_target.clone(),
            None,
            None,
        );
        merge(&store, &db, &like_url);

        let by_url = ReactionStore::get_reaction_add(
            &store,
            FID_FOR_TEST,
            ReactionType::Like as i32,
            url_target,
        )
        .unwrap();
        assert!(by_url.is_some());

        let by_cast = ReactionStore::get_reaction_add(
            &store,
            FID_FOR_TEST,
            ReactionType::Like as i32,
            cast_target(),
        )
        .unwrap();
        assert!(by_cast.is_none());
    }
}
