use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use crate::proto::{FarcasterNetwork, IdRegisterEventType, SignerEventType};
use crate::storage::db::RocksDB;
use crate::storage::store::engine::HubEngine;
use crate::storage::store::stores::StoreLimits;
use crate::utils::factory::{default_custody_address, default_signer, events_factory};
use crate::utils::statsd_wrapper::StatsdClientWrapper;

pub const FID_FOR_TEST: u64 = 1234;

pub async fn new_engine() -> (HubEngine, TempDir) {
    let tmp = TempDir::new().unwrap();
    let db = RocksDB::open_at(tmp.path().join("db").to_str().unwrap()).unwrap();
    let engine = HubEngine::new(
        db,
        FarcasterNetwork::Devnet,
        StoreLimits::default(),
        StatsdClientWrapper::noop(),
        2,
    )
    .await
    .unwrap();
    (engine, tmp)
}

/// Register an identity, a delegated signer, and one storage unit, mirroring
/// the minimum on-chain state a user needs before messages merge.
pub async fn register_user(
    fid: u64,
    signer: &SigningKey,
    custody_address: Vec<u8>,
    engine: &HubEngine,
) {
    engine
        .merge_onchain_event(events_factory::create_id_register_event(
            fid,
            IdRegisterEventType::Register,
            custody_address,
            vec![],
            1,
            0,
        ))
        .await
        .unwrap();
    engine
        .merge_onchain_event(events_factory::create_signer_event(
            fid,
            signer.verifying_key().as_bytes().to_vec(),
            SignerEventType::Add,
            2,
            0,
        ))
        .await
        .unwrap();
    // Rent as of now, so the unit is live and of the current generation
    let rented_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    engine
        .merge_onchain_event(events_factory::create_rent_event(fid, 1, 3, rented_at))
        .await
        .unwrap();
}

pub async fn register_default_user(engine: &HubEngine) -> SigningKey {
    let signer = default_signer();
    register_user(FID_FOR_TEST, &signer, default_custody_address(), engine).await;
    signer
}

/// Every primary message row, for state comparisons across engines.
pub fn all_user_rows(db: &RocksDB) -> Vec<(Vec<u8>, Vec<u8>)> {
    use crate::storage::constants::RootPrefix;
    use crate::storage::db::PageOptions;
    use crate::storage::util::increment_vec_u8;

    let prefix = vec![RootPrefix::User as u8];
    let mut rows = vec![];
    db.for_each_iterator_by_prefix(
        Some(prefix.clone()),
        Some(increment_vec_u8(&prefix)),
        &PageOptions::default(),
        |key, value| {
            rows.push((key.to_vec(), value.to_vec()));
            Ok(false)
        },
    )
    .unwrap();
    rows
}

pub fn message_hashes(page: crate::storage::store::account::MessagesPage) -> Vec<Vec<u8>> {
    page.messages.into_iter().map(|m| m.hash).collect()
}
