use ed25519_dalek::SigningKey;

use crate::proto::{
    self, hub_event, FarcasterNetwork, HubEventType, IdRegisterEventType, ReactionType,
    SignerEventType, UserDataType,
};
use crate::storage::db::PageOptions;
use crate::storage::store::account::{CastStore, ReactionStore, UserDataStore, UsernameProofStore};
use crate::storage::store::engine::HubEngine;
use crate::storage::store::test_helper::{
    all_user_rows, message_hashes, new_engine, register_default_user, register_user, FID_FOR_TEST,
};
use crate::utils::factory::{
    default_custody_address, default_signer, events_factory, messages_factory,
};

fn other_signer() -> SigningKey {
    SigningKey::from_bytes(&[9u8; 32])
}

fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<proto::HubEvent>,
) -> Vec<proto::HubEvent> {
    let mut events = vec![];
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_cast_round_trip() {
    let (engine, _tmp) = new_engine().await;
    let signer = register_default_user(&engine).await;

    let cast_add = messages_factory::casts::create_cast_add(
        FID_FOR_TEST,
        "hello world",
        None,
        Some(&signer),
    );
    let event = engine.submit_message(cast_add.clone()).await.unwrap();
    assert_eq!(event.r#type(), HubEventType::MergeMessage);
    assert!(event.id > 0);

    let stores = engine.get_stores();
    let stored = CastStore::get_cast_add(&stores.cast_store, FID_FOR_TEST, cast_add.hash.clone())
        .unwrap()
        .unwrap();
    assert_eq!(stored, cast_add);

    let page =
        CastStore::get_cast_adds_by_fid(&stores.cast_store, FID_FOR_TEST, &PageOptions::default())
            .unwrap();
    assert_eq!(message_hashes(page), vec![cast_add.hash.clone()]);

    // The sync trie tracks exactly the accepted message
    assert_eq!(engine.get_sync_trie_items().await.unwrap(), 1);
    let sync_ids = engine.get_all_sync_ids_by_prefix(&[]).await.unwrap();
    let fetched = engine.get_all_messages_by_sync_ids(&sync_ids).unwrap();
    assert_eq!(fetched, vec![cast_add]);
}

#[tokio::test]
async fn test_submitting_duplicate_is_rejected_and_state_unchanged() {
    let (engine, _tmp) = new_engine().await;
    let signer = register_default_user(&engine).await;

    let cast_add =
        messages_factory::casts::create_cast_add(FID_FOR_TEST, "once", None, Some(&signer));
    engine.submit_message(cast_add.clone()).await.unwrap();

    let rows_before = all_user_rows(&engine.db);
    let root_before = engine.get_sync_root_hash().await.unwrap();

    let err = engine.submit_message(cast_add).await.unwrap_err();
    assert_eq!(err.code, "bad_request.duplicate");

    assert_eq!(all_user_rows(&engine.db), rows_before);
    assert_eq!(engine.get_sync_root_hash().await.unwrap(), root_before);
}

#[tokio::test]
async fn test_unknown_fid_and_inactive_signer_are_rejected() {
    let (engine, _tmp) = new_engine().await;

    // No id registration at all
    let cast = messages_factory::casts::create_cast_add(FID_FOR_TEST, "hi", None, None);
    let err = engine.submit_message(cast).await.unwrap_err();
    assert_eq!(err.code, "bad_request.validation_failure");

    // Registered, but the message is signed by an unregistered key
    let signer = register_default_user(&engine).await;
    let stranger = other_signer();
    let cast = messages_factory::casts::create_cast_add(FID_FOR_TEST, "hi", None, Some(&stranger));
    let err = engine.submit_message(cast).await.unwrap_err();
    assert_eq!(err.code, "bad_request.validation_failure");

    // The registered signer works
    let cast = messages_factory::casts::create_cast_add(FID_FOR_TEST, "hi", None, Some(&signer));
    engine.submit_message(cast).await.unwrap();
}

#[tokio::test]
async fn test_reaction_lww_remove_displaces_add() {
    let (engine, _tmp) = new_engine().await;
    let signer = register_default_user(&engine).await;
    let mut rx = engine.subscribe();

    let target = proto::reaction_body::Target::TargetCastId(proto::CastId {
        fid: 42,
        hash: vec![1u8; 20],
    });
    let ts = crate::utils::factory::time::farcaster_time();

    let reaction_add = messages_factory::reactions::create_reaction_add(
        FID_FOR_TEST,
        ReactionType::Like,
        target.clone(),
        Some(ts),
        Some(&signer),
    );
    let reaction_remove = messages_factory::reactions::create_reaction_remove(
        FID_FOR_TEST,
        ReactionType::Like,
        target.clone(),
        Some(ts + 1),
        Some(&signer),
    );

    engine.submit_message(reaction_add.clone()).await.unwrap();
    engine
        .submit_message(reaction_remove.clone())
        .await
        .unwrap();

    let stores = engine.get_stores();
    let adds = ReactionStore::get_reaction_adds_by_fid(
        &stores.reaction_store,
        FID_FOR_TEST,
        ReactionType::Like as i32,
        &PageOptions::default(),
    )
    .unwrap();
    assert!(adds.messages.is_empty());

    let events = drain_events(&mut rx);
    let merge_events: Vec<_> = events
        .iter()
        .filter(|e| e.r#type() == HubEventType::MergeMessage)
        .collect();
    assert_eq!(merge_events.len(), 2);
    match &merge_events[0].body {
        Some(hub_event::Body::MergeMessageBody(body)) => {
            assert_eq!(body.message.as_ref().unwrap().hash, reaction_add.hash);
            assert!(body.deleted_messages.is_empty());
        }
        _ => panic!("unexpected event body"),
    }
    match &merge_events[1].body {
        Some(hub_event::Body::MergeMessageBody(body)) => {
            assert_eq!(body.message.as_ref().unwrap().hash, reaction_remove.hash);
            assert_eq!(body.deleted_messages.len(), 1);
            assert_eq!(body.deleted_messages[0].hash, reaction_add.hash);
        }
        _ => panic!("unexpected event body"),
    }
}

#[tokio::test]
async fn test_lww_is_order_independent() {
    let ts = crate::utils::factory::time::farcaster_time();
    let signer = default_signer();
    let target = proto::reaction_body::Target::TargetCastId(proto::CastId {
        fid: 42,
        hash: vec![1u8; 20],
    });

    let reaction_add = messages_factory::reactions::create_reaction_add(
        FID_FOR_TEST,
        ReactionType::Like,
        target.clone(),
        Some(ts),
        Some(&signer),
    );
    let reaction_remove = messages_factory::reactions::create_reaction_remove(
        FID_FOR_TEST,
        ReactionType::Like,
        target.clone(),
        Some(ts + 1),
        Some(&signer),
    );
    let cast = messages_factory::casts::create_cast_add(FID_FOR_TEST, "x", Some(ts), Some(&signer));

    let (engine_a, _tmp_a) = new_engine().await;
    register_default_user(&engine_a).await;
    let (engine_b, _tmp_b) = new_engine().await;
    register_default_user(&engine_b).await;

    for message in [&reaction_add, &reaction_remove, &cast] {
        let _ = engine_a.submit_message(message.clone()).await;
    }
    for message in [&cast, &reaction_remove, &reaction_add] {
        // The losing merge order surfaces conflicts; state must not change
        let _ = engine_b.submit_message(message.clone()).await;
    }

    assert_eq!(all_user_rows(&engine_a.db), all_user_rows(&engine_b.db));
    assert_eq!(
        engine_a.get_sync_root_hash().await.unwrap(),
        engine_b.get_sync_root_hash().await.unwrap()
    );
}

#[tokio::test]
async fn test_signer_removal_revokes_all_messages() {
    let (engine, _tmp) = new_engine().await;
    let fid = 7;
    let signer = default_signer();
    register_user(fid, &signer, default_custody_address(), &engine).await;
    let mut rx = engine.subscribe();

    let ts = crate::utils::factory::time::farcaster_time();
    for i in 0..3 {
        let cast = messages_factory::casts::create_cast_add(
            fid,
            &format!("cast {}", i),
            Some(ts + i),
            Some(&signer),
        );
        engine.submit_message(cast).await.unwrap();
    }

    engine
        .merge_onchain_event(events_factory::create_signer_event(
            fid,
            signer.verifying_key().as_bytes().to_vec(),
            SignerEventType::Remove,
            10,
            0,
        ))
        .await
        .unwrap();

    let stores = engine.get_stores();
    let page =
        CastStore::get_cast_adds_by_fid(&stores.cast_store, fid, &PageOptions::default()).unwrap();
    assert!(page.messages.is_empty());
    assert_eq!(engine.get_sync_trie_items().await.unwrap(), 0);

    let events = drain_events(&mut rx);
    let revokes = events
        .iter()
        .filter(|e| e.r#type() == HubEventType::RevokeMessage)
        .count();
    assert_eq!(revokes, 3);

    // The removed key no longer validates new submissions
    let cast = messages_factory::casts::create_cast_add(fid, "too late", None, Some(&signer));
    let err = engine.submit_message(cast).await.unwrap_err();
    assert_eq!(err.code, "bad_request.validation_failure");
}

#[tokio::test]
async fn test_custody_transfer_revokes_username_and_old_signers() {
    let (engine, _tmp) = new_engine().await;
    let fid = 9;
    let signer = default_signer();
    let old_custody = vec![0xAAu8; 20];
    let new_custody = vec![0xBBu8; 20];
    register_user(fid, &signer, old_custody.clone(), &engine).await;

    // Prove and claim a name
    let proof = messages_factory::username_proofs::create_username_proof(
        fid,
        "alice.eth",
        old_custody.clone(),
        None,
        Some(&signer),
    );
    engine.submit_message(proof).await.unwrap();
    let username = messages_factory::user_data::create_user_data_add(
        fid,
        UserDataType::Username,
        "alice.eth",
        None,
        Some(&signer),
    );
    engine.submit_message(username).await.unwrap();

    engine
        .merge_onchain_event(events_factory::create_id_register_event(
            fid,
            IdRegisterEventType::Transfer,
            new_custody,
            old_custody,
            20,
            0,
        ))
        .await
        .unwrap();

    let stores = engine.get_stores();
    let username_after = UserDataStore::get_user_data_by_fid_and_type(
        &stores.user_data_store,
        fid,
        UserDataType::Username,
    )
    .unwrap();
    assert!(username_after.is_none());

    // Everything the old-custody signer produced is gone and the signer no
    // longer validates
    let page =
        CastStore::get_cast_adds_by_fid(&stores.cast_store, fid, &PageOptions::default()).unwrap();
    assert!(page.messages.is_empty());
    let cast = messages_factory::casts::create_cast_add(fid, "post-transfer", None, Some(&signer));
    let err = engine.submit_message(cast).await.unwrap_err();
    assert_eq!(err.code, "bad_request.validation_failure");
}

#[tokio::test]
async fn test_quota_prunes_earliest_messages() {
    let (engine, _tmp) = new_engine().await;
    let signer = register_default_user(&engine).await;
    let mut rx = engine.subscribe();

    // Username proofs have the smallest per-unit limit (2 on a current unit)
    let ts = crate::utils::factory::time::farcaster_time();
    let mut proofs = vec![];
    for i in 0..3u32 {
        let proof = messages_factory::username_proofs::create_username_proof(
            FID_FOR_TEST,
            &format!("name-{}.eth", i),
            default_custody_address(),
            Some(ts + i),
            Some(&signer),
        );
        engine.submit_message(proof.clone()).await.unwrap();
        proofs.push(proof);
    }

    let stores = engine.get_stores();
    let page = UsernameProofStore::get_username_proofs_by_fid(
        &stores.username_proof_store,
        FID_FOR_TEST,
        &PageOptions::default(),
    )
    .unwrap();
    assert_eq!(page.messages.len(), 2);
    // The earliest proof was evicted
    assert!(!page.messages.iter().any(|m| m.hash == proofs[0].hash));

    let events = drain_events(&mut rx);
    let prunes: Vec<_> = events
        .iter()
        .filter(|e| e.r#type() == HubEventType::PruneMessage)
        .collect();
    assert_eq!(prunes.len(), 1);
    match &prunes[0].body {
        Some(hub_event::Body::PruneMessageBody(body)) => {
            assert_eq!(body.message.as_ref().unwrap().hash, proofs[0].hash);
        }
        _ => panic!("unexpected event body"),
    }

    // A message older than everything in a full store is rejected outright
    let stale = messages_factory::username_proofs::create_username_proof(
        FID_FOR_TEST,
        "stale.eth",
        default_custody_address(),
        Some(ts.saturating_sub(100)),
        Some(&signer),
    );
    let err = engine.submit_message(stale).await.unwrap_err();
    assert_eq!(err.code, "bad_request.prunable");
}

#[tokio::test]
async fn test_event_ids_are_strictly_increasing_across_operations() {
    let (engine, _tmp) = new_engine().await;
    let mut rx = engine.subscribe();
    let signer = register_default_user(&engine).await;

    for i in 0..5u32 {
        let cast = messages_factory::casts::create_cast_add(
            FID_FOR_TEST,
            &format!("cast {}", i),
            None,
            Some(&signer),
        );
        engine.submit_message(cast).await.unwrap();
    }

    let events = drain_events(&mut rx);
    assert!(events.len() >= 8); // 3 onchain events + 5 merges
    let mut last_id = 0;
    for event in &events {
        assert!(event.id > last_id, "event ids must be strictly increasing");
        last_id = event.id;
    }

    // The persisted log pages back the same events in the same order
    let log = engine.get_events(0, None).unwrap();
    let log_ids: Vec<u64> = log.events.iter().map(|e| e.id).collect();
    let seen_ids: Vec<u64> = events.iter().map(|e| e.id).collect();
    assert_eq!(log_ids, seen_ids);
}

#[tokio::test]
async fn test_onchain_event_replay_is_a_noop() {
    let (engine, _tmp) = new_engine().await;
    let event = events_factory::create_id_register_event(
        FID_FOR_TEST,
        IdRegisterEventType::Register,
        default_custody_address(),
        vec![],
        1,
        0,
    );

    engine.merge_onchain_event(event.clone()).await.unwrap();
    let err = engine.merge_onchain_event(event).await.unwrap_err();
    assert_eq!(err.code, "bad_request.duplicate");
}

/// Walk the trie of `src`, pulling every subtree `dst` is missing, and merge
/// the fetched messages into `dst`.
async fn pull_missing(dst: &HubEngine, src: &HubEngine) {
    if dst.get_sync_root_hash().await.unwrap() == src.get_sync_root_hash().await.unwrap() {
        return;
    }

    let mut missing_ids: Vec<Vec<u8>> = vec![];
    let mut stack: Vec<Vec<u8>> = vec![vec![]];
    while let Some(prefix) = stack.pop() {
        let src_meta = match src.get_sync_metadata_by_prefix(&prefix).await {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let dst_meta = dst.get_sync_metadata_by_prefix(&prefix).await.ok();
        if let Some(dst_meta) = &dst_meta {
            if dst_meta.hash == src_meta.hash {
                continue;
            }
        }

        if src_meta.children.is_empty() {
            missing_ids.extend(src.get_all_sync_ids_by_prefix(&prefix).await.unwrap());
            continue;
        }
        for (char, child) in src_meta.children {
            let matches = dst_meta
                .as_ref()
                .and_then(|d| d.children.get(&char))
                .map(|dst_child| dst_child.hash == child.hash)
                .unwrap_or(false);
            if !matches {
                stack.push(child.prefix.clone());
            }
        }
    }

    for message in src.get_all_messages_by_sync_ids(&missing_ids).unwrap() {
        // Messages both sides already agree on surface as duplicates
        let _ = dst.submit_message(message).await;
    }
}

#[tokio::test]
async fn test_sync_reconciliation_converges_two_engines() {
    let signer = default_signer();
    let ts = crate::utils::factory::time::farcaster_time();
    let m1 = messages_factory::casts::create_cast_add(FID_FOR_TEST, "m1", Some(ts), Some(&signer));
    let m2 =
        messages_factory::casts::create_cast_add(FID_FOR_TEST, "m2", Some(ts + 1), Some(&signer));
    let m3 =
        messages_factory::casts::create_cast_add(FID_FOR_TEST, "m3", Some(ts + 2), Some(&signer));

    let (engine_a, _tmp_a) = new_engine().await;
    register_default_user(&engine_a).await;
    let (engine_b, _tmp_b) = new_engine().await;
    register_default_user(&engine_b).await;

    engine_a.submit_message(m1.clone()).await.unwrap();
    engine_a.submit_message(m2.clone()).await.unwrap();
    engine_b.submit_message(m2.clone()).await.unwrap();
    engine_b.submit_message(m3.clone()).await.unwrap();

    assert_ne!(
        engine_a.get_sync_root_hash().await.unwrap(),
        engine_b.get_sync_root_hash().await.unwrap()
    );

    pull_missing(&engine_a, &engine_b).await;
    pull_missing(&engine_b, &engine_a).await;

    assert_eq!(
        engine_a.get_sync_root_hash().await.unwrap(),
        engine_b.get_sync_root_hash().await.unwrap()
    );
    assert_eq!(engine_a.get_sync_trie_items().await.unwrap(), 3);

    let page = CastStore::get_cast_adds_by_fid(
        &engine_a.get_stores().cast_store,
        FID_FOR_TEST,
        &PageOptions::default(),
    )
    .unwrap();
    assert_eq!(page.messages.len(), 3);
    assert_eq!(all_user_rows(&engine_a.db), all_user_rows(&engine_b.db));
}

#[tokio::test]
async fn test_network_mismatch_is_rejected() {
    let (engine, _tmp) = new_engine().await;
    let signer = register_default_user(&engine).await;

    let mut cast =
        messages_factory::casts::create_cast_add(FID_FOR_TEST, "wrong net", None, Some(&signer));
    // Re-sign for another network
    let mut data = cast.data.take().unwrap();
    data.network = FarcasterNetwork::Mainnet as i32;
    cast = crate::utils::factory::sign_message_data(data, &signer);

    let err = engine.submit_message(cast).await.unwrap_err();
    assert_eq!(err.code, "bad_request.validation_failure");
}
