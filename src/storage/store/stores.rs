use std::sync::Arc;

use itertools::Itertools;
use thiserror::Error;

use crate::core::error::HubError;
use crate::proto::{self, HubEvent, MessageType, StorageUnitType, StoreType};
use crate::storage::constants::RootPrefix;
use crate::storage::db::{RocksDB, RocksDbTransactionBatch, RocksdbError};
use crate::storage::store::account::{
    CastStore, CastStoreDef, LinkStore, LinkStoreDef, OnchainEventStorageError, OnchainEventStore,
    ReactionStore, ReactionStoreDef, StorageSlot, Store, StoreEventHandler, StoreOptions,
    UserDataStore, UserDataStoreDef, UsernameProofStore, UsernameProofStoreDef, VerificationStore,
    VerificationStoreDef,
};
use crate::storage::store::storage_cache::StorageCache;

#[derive(Error, Debug)]
pub enum StoresError {
    #[error(transparent)]
    OnchainEventError(#[from] OnchainEventStorageError),

    #[error("unsupported message type")]
    UnsupportedMessageType(MessageType),

    #[error("store error")]
    StoreError {
        inner: HubError,
        hash: Vec<u8>,
    },
}

/// Per-unit message allowances for one rental generation.
#[derive(Clone, Debug)]
pub struct Limits {
    pub casts: u32,
    pub links: u32,
    pub reactions: u32,
    pub user_data: u32,
    pub user_name_proofs: u32,
    pub verifications: u32,
}

impl Limits {
    pub fn default() -> Limits {
        Self::of_type(StorageUnitType::UnitType2025)
    }

    pub fn of_type(unit_type: StorageUnitType) -> Limits {
        match unit_type {
            // Units rented before Aug 24, 2024
            StorageUnitType::UnitTypeLegacy => Limits {
                casts: 5000,
                links: 2500,
                reactions: 2500,
                user_data: 50,
                user_name_proofs: 5,
                verifications: 25,
            },
            // Units rented after Aug 24, 2024
            StorageUnitType::UnitType2024 => Limits {
                casts: 2000,
                links: 1000,
                reactions: 1000,
                user_data: 50,
                user_name_proofs: 5,
                verifications: 25,
            },
            // Units rented after Jul 16, 2025
            StorageUnitType::UnitType2025 => Limits {
                casts: 100,
                links: 200,
                reactions: 200,
                user_data: 25,
                user_name_proofs: 2,
                verifications: 5,
            },
        }
    }

    pub fn legacy() -> Limits {
        Self::of_type(StorageUnitType::UnitTypeLegacy)
    }

    pub fn message_type_to_store_type(message_type: MessageType) -> StoreType {
        match message_type {
            MessageType::CastAdd | MessageType::CastRemove => StoreType::Casts,
            MessageType::LinkAdd | MessageType::LinkRemove | MessageType::LinkCompactState => {
                StoreType::Links
            }
            MessageType::ReactionAdd | MessageType::ReactionRemove => StoreType::Reactions,
            MessageType::UserDataAdd => StoreType::UserData,
            MessageType::VerificationAddEthAddress | MessageType::VerificationRemove => {
                StoreType::Verifications
            }
            MessageType::UsernameProof => StoreType::UsernameProofs,
            MessageType::None => StoreType::None,
        }
    }

    pub fn store_type_to_message_types(store_type: StoreType) -> Vec<MessageType> {
        match store_type {
            StoreType::Casts => vec![MessageType::CastAdd, MessageType::CastRemove],
            StoreType::Links => vec![
                MessageType::LinkAdd,
                MessageType::LinkRemove,
                MessageType::LinkCompactState,
            ],
            StoreType::Reactions => vec![MessageType::ReactionAdd, MessageType::ReactionRemove],
            StoreType::UserData => vec![MessageType::UserDataAdd],
            StoreType::Verifications => vec![
                MessageType::VerificationAddEthAddress,
                MessageType::VerificationRemove,
            ],
            StoreType::UsernameProofs => vec![MessageType::UsernameProof],
            StoreType::None => vec![],
        }
    }

    fn for_store_type(&self, store_type: StoreType) -> u32 {
        match store_type {
            StoreType::Casts => self.casts,
            StoreType::Links => self.links,
            StoreType::Reactions => self.reactions,
            StoreType::UserData => self.user_data,
            StoreType::Verifications => self.verifications,
            StoreType::UsernameProofs => self.user_name_proofs,
            StoreType::None => 0,
        }
    }
}

/// The limit tables for every rental generation; a fid's effective limit is
/// the sum over its units of each generation.
#[derive(Clone, Debug)]
pub struct StoreLimits {
    limits_2025: Limits,
    limits_2024: Limits,
    limits_legacy: Limits,
}

impl StoreLimits {
    pub fn new(limits_2025: Limits, limits_2024: Limits, limits_legacy: Limits) -> StoreLimits {
        StoreLimits {
            limits_2025,
            limits_2024,
            limits_legacy,
        }
    }

    pub fn default() -> StoreLimits {
        StoreLimits {
            limits_legacy: Limits::of_type(StorageUnitType::UnitTypeLegacy),
            limits_2024: Limits::of_type(StorageUnitType::UnitType2024),
            limits_2025: Limits::of_type(StorageUnitType::UnitType2025),
        }
    }

    pub fn for_type(&self, unit_type: StorageUnitType) -> &Limits {
        match unit_type {
            StorageUnitType::UnitTypeLegacy => &self.limits_legacy,
            StorageUnitType::UnitType2024 => &self.limits_2024,
            StorageUnitType::UnitType2025 => &self.limits_2025,
        }
    }

    pub fn max_messages(&self, slot: &StorageSlot, store_type: StoreType) -> u32 {
        [
            StorageUnitType::UnitType2025,
            StorageUnitType::UnitType2024,
            StorageUnitType::UnitTypeLegacy,
        ]
        .iter()
        .map(|&unit_type| {
            self.for_type(unit_type).for_store_type(store_type) * slot.units_for(unit_type)
        })
        .sum()
    }
}

/// Usage and limits for one store of one fid, as reported to callers.
#[derive(Debug, Clone)]
pub struct StorageLimit {
    pub store_type: StoreType,
    pub name: &'static str,
    pub limit: u64,
    pub used: u64,
}

#[derive(Debug, Clone)]
pub struct StorageLimitsResponse {
    pub limits: Vec<StorageLimit>,
    pub units_legacy: u32,
    pub units_2024: u32,
    pub units_2025: u32,
}

/// All typed stores over one database, sharing one event handler so the
/// event log is totally ordered across stores.
pub struct Stores {
    pub cast_store: Store<CastStoreDef>,
    pub link_store: Store<LinkStoreDef>,
    pub reaction_store: Store<ReactionStoreDef>,
    pub user_data_store: Store<UserDataStoreDef>,
    pub verification_store: Store<VerificationStoreDef>,
    pub username_proof_store: Store<UsernameProofStoreDef>,
    pub onchain_event_store: OnchainEventStore,
    pub storage_cache: StorageCache,
    pub store_limits: StoreLimits,
    pub event_handler: Arc<StoreEventHandler>,
    pub db: Arc<RocksDB>,
    pub network: proto::FarcasterNetwork,
}

impl Stores {
    pub fn new(
        db: Arc<RocksDB>,
        network: proto::FarcasterNetwork,
        store_limits: StoreLimits,
    ) -> Result<Stores, HubError> {
        Self::new_with_opts(db, network, store_limits, StoreOptions::default())
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        network: proto::FarcasterNetwork,
        store_limits: StoreLimits,
        store_opts: StoreOptions,
    ) -> Result<Stores, HubError> {
        let event_handler = StoreEventHandler::new();

        let cast_store =
            CastStore::new_with_opts(db.clone(), event_handler.clone(), 100, store_opts.clone());
        let link_store =
            LinkStore::new_with_opts(db.clone(), event_handler.clone(), 100, store_opts.clone());
        let reaction_store =
            ReactionStore::new_with_opts(db.clone(), event_handler.clone(), 100, store_opts.clone());
        let user_data_store =
            UserDataStore::new_with_opts(db.clone(), event_handler.clone(), 100, store_opts.clone());
        let verification_store = VerificationStore::new_with_opts(
            db.clone(),
            event_handler.clone(),
            100,
            store_opts.clone(),
        );
        let username_proof_store = UsernameProofStore::new_with_opts(
            db.clone(),
            event_handler.clone(),
            100,
            store_opts.clone(),
        );
        let onchain_event_store = OnchainEventStore::new(db.clone(), event_handler.clone());

        let storage_cache = StorageCache::rebuild(&db)?;

        Ok(Stores {
            cast_store,
            link_store,
            reaction_store,
            user_data_store,
            verification_store,
            username_proof_store,
            onchain_event_store,
            storage_cache,
            store_limits,
            event_handler,
            db,
            network,
        })
    }

    fn make_schema_version_key() -> Vec<u8> {
        vec![RootPrefix::DBSchemaVersion as u8]
    }

    pub fn get_schema_version(&self) -> Result<u32, RocksdbError> {
        match self.db.get(&Self::make_schema_version_key())? {
            Some(bytes) => Ok(u32::from_be_bytes(bytes.try_into().unwrap_or_default())),
            None => Ok(0),
        }
    }

    pub fn set_schema_version(&self, version: u32) -> Result<(), RocksdbError> {
        self.db
            .put(&Self::make_schema_version_key(), &version.to_be_bytes())
    }

    /// Live storage slot for a fid, memoized until the next rent event.
    pub fn get_storage_slot_for_fid(&self, fid: u64) -> Result<StorageSlot, StoresError> {
        self.storage_cache
            .storage_slot(fid, &self.onchain_event_store)
            .map_err(StoresError::OnchainEventError)
    }

    /// (messages stored, messages allowed) for the store holding this type.
    pub fn get_usage(&self, fid: u64, message_type: MessageType) -> Result<(u32, u32), StoresError> {
        let store_type = Limits::message_type_to_store_type(message_type);
        let used = self.get_usage_by_store_type(fid, store_type);
        let slot = self.get_storage_slot_for_fid(fid)?;
        let max_messages = self.store_limits.max_messages(&slot, store_type);
        Ok((used, max_messages))
    }

    pub fn get_usage_by_store_type(&self, fid: u64, store_type: StoreType) -> u32 {
        // Adds and removes share a postfix; count each row group once
        Limits::store_type_to_message_types(store_type)
            .into_iter()
            .map(|message_type| {
                crate::storage::store::account::type_to_set_postfix(message_type).as_u8()
            })
            .unique()
            .map(|postfix| self.storage_cache.message_count(fid, postfix))
            .sum()
    }

    pub fn get_storage_limits(&self, fid: u64) -> Result<StorageLimitsResponse, StoresError> {
        let slot = self.get_storage_slot_for_fid(fid)?;
        let mut limits = vec![];
        for (store_type, name) in [
            (StoreType::Casts, "CASTS"),
            (StoreType::Links, "LINKS"),
            (StoreType::Reactions, "REACTIONS"),
            (StoreType::UserData, "USER_DATA"),
            (StoreType::Verifications, "VERIFICATIONS"),
            (StoreType::UsernameProofs, "USERNAME_PROOFS"),
        ] {
            limits.push(StorageLimit {
                store_type,
                name,
                limit: self.store_limits.max_messages(&slot, store_type) as u64,
                used: self.get_usage_by_store_type(fid, store_type) as u64,
            });
        }

        Ok(StorageLimitsResponse {
            limits,
            units_legacy: slot.units_for(StorageUnitType::UnitTypeLegacy),
            units_2024: slot.units_for(StorageUnitType::UnitType2024),
            units_2025: slot.units_for(StorageUnitType::UnitType2025),
        })
    }

    /// Sweep every store's by-signer index for `(fid, key)` and revoke what
    /// it finds.
    pub fn revoke_messages(
        &self,
        fid: u64,
        key: &Vec<u8>,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, StoresError> {
        let mut revoke_events = Vec::new();
        macro_rules! sweep {
            ($store:expr) => {
                revoke_events.extend($store.revoke_messages_by_signer(fid, key, txn).map_err(
                    |e| StoresError::StoreError {
                        inner: e,
                        hash: key.clone(),
                    },
                )?);
            };
        }
        sweep!(self.cast_store);
        sweep!(self.link_store);
        sweep!(self.reaction_store);
        sweep!(self.user_data_store);
        sweep!(self.verification_store);
        sweep!(self.username_proof_store);
        Ok(revoke_events)
    }

    pub fn get_events(
        &self,
        start_id: u64,
        stop_id: Option<u64>,
        page_options: Option<crate::storage::db::PageOptions>,
    ) -> Result<super::account::EventsPage, HubError> {
        HubEvent::get_events(self.db.clone(), start_id, stop_id, page_options)
    }

    pub fn get_event(&self, event_id: u64) -> Result<HubEvent, HubError> {
        HubEvent::get_event(self.db.clone(), event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = Limits::default();
        assert_eq!(limits.casts, 100);
        assert_eq!(limits.links, 200);
        assert_eq!(limits.reactions, 200);
        assert_eq!(limits.user_data, 25);
        assert_eq!(limits.user_name_proofs, 2);
        assert_eq!(limits.verifications, 5);
    }

    #[test]
    fn test_legacy_limits() {
        let limits = Limits::legacy();
        assert_eq!(limits.casts, 5000);
        assert_eq!(limits.links, 2500);
        assert_eq!(limits.reactions, 2500);
    }

    #[test]
    fn test_max_messages_scales_with_units() {
        let store_limits = StoreLimits::default();

        let slot_2025 = StorageSlot::new(0, 0, 1, 0);
        assert_eq!(store_limits.max_messages(&slot_2025, StoreType::Casts), 100);

        let slot_legacy = StorageSlot::new(1, 0, 0, 0);
        assert_eq!(
            store_limits.max_messages(&slot_legacy, StoreType::Casts),
            5000
        );

        let slot_mixed = StorageSlot::new(3, 2, 1, 0);
        assert_eq!(
            store_limits.max_messages(&slot_mixed, StoreType::Links),
            2500 * 3 + 1000 * 2 + 200
        );

        let slot_none = StorageSlot::new(0, 0, 0, 0);
        assert_eq!(store_limits.max_messages(&slot_none, StoreType::Links), 0);
    }
}
