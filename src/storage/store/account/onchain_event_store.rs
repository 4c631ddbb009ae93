use std::collections::HashMap;
use std::sync::Arc;

use prost::Message as _;
use thiserror::Error;

use super::{make_fid_key, StoreEventHandler};
use crate::core::error::HubError;
use crate::proto::{
    self, on_chain_event, HubEvent, HubEventType, IdRegisterEventType, OnChainEvent,
    OnChainEventType, SignerEventType, StorageUnitType,
};
use crate::storage::constants::{RootPrefix, PAGE_SIZE_MAX};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch, RocksdbError};
use crate::storage::util::increment_vec_u8;

/// Rent lasts a year; the grace period holds the units live for another 30
/// days so a late renewal doesn't drop messages.
pub const RENT_PERIOD_SECONDS: u64 = 365 * 24 * 60 * 60 + 30 * 24 * 60 * 60;

/// Units rented on or after this instant are 2024-type units.
pub const UNIT_TYPE_2024_CUTOFF: u64 = 1_724_457_600; // 2024-08-24 UTC
/// Units rented on or after this instant are 2025-type units.
pub const UNIT_TYPE_2025_CUTOFF: u64 = 1_752_624_000; // 2025-07-16 UTC

#[derive(Error, Debug)]
pub enum OnchainEventStorageError {
    #[error(transparent)]
    RocksdbError(#[from] RocksdbError),

    #[error(transparent)]
    HubError(#[from] HubError),

    #[error(transparent)]
    DecodeError(#[from] prost::DecodeError),

    #[error("Duplicate onchain event")]
    DuplicateOnchainEvent,

    #[error("Onchain event missing body")]
    EventMissingBody,

    #[error("Unsupported onchain event type")]
    UnsupportedEventType,
}

#[repr(u8)]
enum OnChainEventPostfix {
    OnChainEvents = 1,
    ByTxHash = 2,
    BySignerKey = 3,
    IdRegisterByAddress = 4,
}

/// `[OnChainEvent] ‖ OnChainEvents ‖ fid ‖ type ‖ blockNumber ‖ logIndex`
pub fn make_onchain_event_primary_key(
    fid: u64,
    event_type: u8,
    block_number: u32,
    log_index: u32,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 4 + 1 + 4 + 4);
    key.push(RootPrefix::OnChainEvent as u8);
    key.push(OnChainEventPostfix::OnChainEvents as u8);
    key.extend_from_slice(&make_fid_key(fid));
    key.push(event_type);
    key.extend_from_slice(&block_number.to_be_bytes());
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

fn make_onchain_event_by_tx_hash_key(transaction_hash: &[u8], log_index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + transaction_hash.len() + 4);
    key.push(RootPrefix::OnChainEvent as u8);
    key.push(OnChainEventPostfix::ByTxHash as u8);
    key.extend_from_slice(transaction_hash);
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

fn make_signer_by_key_key(fid: u64, signer_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + 4 + signer_key.len());
    key.push(RootPrefix::OnChainEvent as u8);
    key.push(OnChainEventPostfix::BySignerKey as u8);
    key.extend_from_slice(&make_fid_key(fid));
    key.extend_from_slice(signer_key);
    key
}

fn make_id_register_by_address_key(address: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + address.len());
    key.push(RootPrefix::OnChainEvent as u8);
    key.push(OnChainEventPostfix::IdRegisterByAddress as u8);
    key.extend_from_slice(address);
    key
}

fn block_position(event: &OnChainEvent) -> (u32, u32) {
    (event.block_number, event.log_index)
}

/// Units rented by one fid, bucketed by the rental-date unit type.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSlot {
    pub units_legacy: u32,
    pub units_2024: u32,
    pub units_2025: u32,
    /// Earliest expiry among the live rent events; 0 when no units are live.
    pub invalidates_at: u32,
}

impl StorageSlot {
    pub fn new(units_legacy: u32, units_2024: u32, units_2025: u32, invalidates_at: u32) -> Self {
        StorageSlot {
            units_legacy,
            units_2024,
            units_2025,
            invalidates_at,
        }
    }

    pub fn units_for(&self, unit_type: StorageUnitType) -> u32 {
        match unit_type {
            StorageUnitType::UnitTypeLegacy => self.units_legacy,
            StorageUnitType::UnitType2024 => self.units_2024,
            StorageUnitType::UnitType2025 => self.units_2025,
        }
    }

    pub fn is_active(&self) -> bool {
        self.units_legacy > 0 || self.units_2024 > 0 || self.units_2025 > 0
    }

    pub fn merge(&mut self, other: &StorageSlot) {
        self.units_legacy += other.units_legacy;
        self.units_2024 += other.units_2024;
        self.units_2025 += other.units_2025;
        if self.invalidates_at == 0
            || (other.invalidates_at != 0 && other.invalidates_at < self.invalidates_at)
        {
            self.invalidates_at = other.invalidates_at;
        }
    }
}

pub struct OnChainEventsPage {
    pub onchain_events: Vec<OnChainEvent>,
    pub next_page_token: Option<Vec<u8>>,
}

/// Append-only per-fid log of identity, signer, and storage events, plus the
/// derived views (custody address, active signers, storage quota) the engine
/// consults before any message merge.
#[derive(Clone)]
pub struct OnchainEventStore {
    db: Arc<RocksDB>,
    pub store_event_handler: Arc<StoreEventHandler>,
}

impl OnchainEventStore {
    pub fn new(db: Arc<RocksDB>, store_event_handler: Arc<StoreEventHandler>) -> Self {
        OnchainEventStore {
            db,
            store_event_handler,
        }
    }

    /// Idempotent append. Replaying the same `(transactionHash, logIndex)`
    /// reports a duplicate, which callers treat as a no-op.
    pub fn merge_onchain_event(
        &self,
        onchain_event: OnChainEvent,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<HubEvent, OnchainEventStorageError> {
        let event_type = onchain_event.r#type();
        if event_type == OnChainEventType::EventTypeNone {
            return Err(OnchainEventStorageError::UnsupportedEventType);
        }
        if onchain_event.body.is_none() {
            return Err(OnchainEventStorageError::EventMissingBody);
        }

        let tx_key = make_onchain_event_by_tx_hash_key(
            &onchain_event.transaction_hash,
            onchain_event.log_index,
        );
        let already_present = match txn.get(&tx_key) {
            Some(Some(_)) => true,
            Some(None) => false,
            None => self.db.get(&tx_key)?.is_some(),
        };
        if already_present {
            return Err(OnchainEventStorageError::DuplicateOnchainEvent);
        }

        let primary_key = make_onchain_event_primary_key(
            onchain_event.fid,
            event_type as u8,
            onchain_event.block_number,
            onchain_event.log_index,
        );
        txn.put(primary_key.clone(), onchain_event.encode_to_vec());
        txn.put(tx_key, primary_key.clone());

        match &onchain_event.body {
            Some(on_chain_event::Body::SignerEventBody(signer_body)) => {
                self.update_latest_index(
                    txn,
                    make_signer_by_key_key(onchain_event.fid, &signer_body.key),
                    &primary_key,
                    &onchain_event,
                )?;
            }
            Some(on_chain_event::Body::IdRegisterEventBody(id_register_body)) => {
                self.update_latest_index(
                    txn,
                    make_id_register_by_address_key(&id_register_body.to),
                    &primary_key,
                    &onchain_event,
                )?;
            }
            _ => {}
        }

        let mut hub_event = HubEvent::from(
            HubEventType::MergeOnChainEvent,
            proto::hub_event::Body::MergeOnChainEventBody(proto::MergeOnChainEventBody {
                on_chain_event: Some(onchain_event),
            }),
        );
        self.store_event_handler
            .commit_transaction(txn, &mut hub_event)?;
        Ok(hub_event)
    }

    /// Re-derive the secondary index rows for an already-stored event. Used
    /// by the backfill tooling to repair indices without touching the
    /// append-only primary rows.
    pub fn rebuild_secondary_indices(
        &self,
        onchain_event: &OnChainEvent,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<(), OnchainEventStorageError> {
        let primary_key = make_onchain_event_primary_key(
            onchain_event.fid,
            onchain_event.r#type() as u8,
            onchain_event.block_number,
            onchain_event.log_index,
        );
        txn.put(
            make_onchain_event_by_tx_hash_key(
                &onchain_event.transaction_hash,
                onchain_event.log_index,
            ),
            primary_key.clone(),
        );

        match &onchain_event.body {
            Some(on_chain_event::Body::SignerEventBody(signer_body)) => self.update_latest_index(
                txn,
                make_signer_by_key_key(onchain_event.fid, &signer_body.key),
                &primary_key,
                onchain_event,
            ),
            Some(on_chain_event::Body::IdRegisterEventBody(id_register_body)) => self
                .update_latest_index(
                    txn,
                    make_id_register_by_address_key(&id_register_body.to),
                    &primary_key,
                    onchain_event,
                ),
            _ => Ok(()),
        }
    }

    /// Point an index row at the event with the highest block position, so
    /// out-of-order replays can't roll a derived view backwards.
    fn update_latest_index(
        &self,
        txn: &mut RocksDbTransactionBatch,
        index_key: Vec<u8>,
        primary_key: &[u8],
        event: &OnChainEvent,
    ) -> Result<(), OnchainEventStorageError> {
        let existing_primary = match txn.get(&index_key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => self.db.get(&index_key)?,
        };
        if let Some(existing_primary) = existing_primary {
            let existing = self.get_event_by_primary_key(txn, &existing_primary)?;
            if let Some(existing) = existing {
                if block_position(&existing) > block_position(event) {
                    return Ok(());
                }
            }
        }
        txn.put(index_key, primary_key.to_vec());
        Ok(())
    }

    fn get_event_by_primary_key(
        &self,
        txn: &RocksDbTransactionBatch,
        primary_key: &[u8],
    ) -> Result<Option<OnChainEvent>, OnchainEventStorageError> {
        let bytes = match txn.get(primary_key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => self.db.get(primary_key)?,
        };
        match bytes {
            Some(bytes) => Ok(Some(OnChainEvent::decode(bytes.as_slice())?)),
            None => Ok(None),
        }
    }

    pub fn get_onchain_events(
        &self,
        event_type: OnChainEventType,
        fid: u64,
    ) -> Result<Vec<OnChainEvent>, OnchainEventStorageError> {
        let mut prefix = vec![
            RootPrefix::OnChainEvent as u8,
            OnChainEventPostfix::OnChainEvents as u8,
        ];
        prefix.extend_from_slice(&make_fid_key(fid));
        prefix.push(event_type as u8);

        let mut events = vec![];
        self.db.for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            &PageOptions::default(),
            |_, value| {
                events.push(OnChainEvent::decode(value).map_err(HubError::from)?);
                Ok(false)
            },
        )?;
        Ok(events)
    }

    pub fn get_all_onchain_events(
        &self,
        page_options: &PageOptions,
    ) -> Result<OnChainEventsPage, OnchainEventStorageError> {
        let prefix = vec![
            RootPrefix::OnChainEvent as u8,
            OnChainEventPostfix::OnChainEvents as u8,
        ];
        let page_size = page_options.page_size.unwrap_or(PAGE_SIZE_MAX);

        let mut onchain_events = vec![];
        let mut last_key = vec![];
        self.db.for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            page_options,
            |key, value| {
                onchain_events.push(OnChainEvent::decode(value).map_err(HubError::from)?);
                if onchain_events.len() >= page_size {
                    last_key = key.to_vec();
                    return Ok(true);
                }
                Ok(false)
            },
        )?;

        Ok(OnChainEventsPage {
            onchain_events,
            next_page_token: if last_key.is_empty() {
                None
            } else {
                Some(last_key)
            },
        })
    }

    /// The latest IdRegister event decides the fid's custody address.
    pub fn get_id_register_event_by_fid(
        &self,
        fid: u64,
    ) -> Result<Option<OnChainEvent>, OnchainEventStorageError> {
        let events = self.get_onchain_events(OnChainEventType::EventTypeIdRegister, fid)?;
        Ok(events.into_iter().max_by_key(block_position))
    }

    pub fn get_custody_address(
        &self,
        fid: u64,
    ) -> Result<Option<Vec<u8>>, OnchainEventStorageError> {
        match self.get_id_register_event_by_fid(fid)? {
            Some(event) => match &event.body {
                Some(on_chain_event::Body::IdRegisterEventBody(body)) => Ok(Some(body.to.clone())),
                _ => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn get_fid_by_custody_address(
        &self,
        address: &[u8],
    ) -> Result<Option<u64>, OnchainEventStorageError> {
        let index_key = make_id_register_by_address_key(address);
        match self.db.get(&index_key)? {
            None => Ok(None),
            Some(primary_key) => {
                let event =
                    self.get_event_by_primary_key(&RocksDbTransactionBatch::new(), &primary_key)?;
                Ok(event.map(|e| e.fid))
            }
        }
    }

    /// A signer is active when its most recent key event is an ADD and that
    /// ADD happened under the fid's current custody. A custody transfer
    /// invalidates every key granted before it.
    pub fn get_active_signer(
        &self,
        fid: u64,
        signer_key: &[u8],
    ) -> Result<Option<OnChainEvent>, OnchainEventStorageError> {
        let index_key = make_signer_by_key_key(fid, signer_key);
        let primary_key = match self.db.get(&index_key)? {
            Some(primary_key) => primary_key,
            None => return Ok(None),
        };
        let event = match self
            .get_event_by_primary_key(&RocksDbTransactionBatch::new(), &primary_key)?
        {
            Some(event) => event,
            None => return Ok(None),
        };

        let signer_body = match &event.body {
            Some(on_chain_event::Body::SignerEventBody(body)) => body,
            _ => return Ok(None),
        };
        if signer_body.event_type() != SignerEventType::Add {
            return Ok(None);
        }

        if let Some(id_register) = self.get_id_register_event_by_fid(fid)? {
            let id_body = match &id_register.body {
                Some(on_chain_event::Body::IdRegisterEventBody(body)) => body,
                _ => return Ok(None),
            };
            if id_body.event_type() == IdRegisterEventType::Transfer
                && block_position(&event) < block_position(&id_register)
            {
                return Ok(None);
            }
        }

        Ok(Some(event))
    }

    /// Signer keys whose grant happened while `custody` held the fid and
    /// whose latest key event is still an ADD. Used to cascade revocations
    /// when custody moves.
    pub fn get_signers_added_under(
        &self,
        fid: u64,
        custody: &[u8],
    ) -> Result<Vec<Vec<u8>>, OnchainEventStorageError> {
        let mut id_registers = self.get_onchain_events(OnChainEventType::EventTypeIdRegister, fid)?;
        id_registers.sort_by_key(block_position);
        let mut signer_events = self.get_onchain_events(OnChainEventType::EventTypeSigner, fid)?;
        signer_events.sort_by_key(block_position);

        // Latest state per key, and the custody that held the fid when the
        // key's (latest) ADD landed.
        let mut latest_by_key: HashMap<Vec<u8>, (SignerEventType, Vec<u8>)> = HashMap::new();
        let mut id_register_iter = id_registers.iter().peekable();
        let mut current_custody: Vec<u8> = vec![];

        for signer_event in &signer_events {
            while let Some(id_register) = id_register_iter.peek() {
                if block_position(id_register) < block_position(signer_event) {
                    if let Some(on_chain_event::Body::IdRegisterEventBody(body)) =
                        &id_register.body
                    {
                        current_custody = body.to.clone();
                    }
                    id_register_iter.next();
                } else {
                    break;
                }
            }
            if let Some(on_chain_event::Body::SignerEventBody(body)) = &signer_event.body {
                latest_by_key.insert(
                    body.key.clone(),
                    (body.event_type(), current_custody.clone()),
                );
            }
        }

        Ok(latest_by_key
            .into_iter()
            .filter(|(_, (event_type, added_under))| {
                *event_type == SignerEventType::Add && added_under == custody
            })
            .map(|(key, _)| key)
            .collect())
    }

    /// Sum the live (non-expired) rent events, bucketed by rental date.
    pub fn get_storage_slot_for_fid(
        &self,
        fid: u64,
        current_time_unix: u64,
    ) -> Result<StorageSlot, OnchainEventStorageError> {
        let rent_events = self.get_onchain_events(OnChainEventType::EventTypeStorageRent, fid)?;
        let mut slot = StorageSlot::new(0, 0, 0, 0);

        for event in rent_events {
            let units = match &event.body {
                Some(on_chain_event::Body::StorageRentEventBody(body)) => body.units,
                _ => continue,
            };
            let expires_at = event.block_timestamp + RENT_PERIOD_SECONDS;
            if expires_at <= current_time_unix {
                continue;
            }
            let unit_slot = if event.block_timestamp >= UNIT_TYPE_2025_CUTOFF {
                StorageSlot::new(0, 0, units, expires_at as u32)
            } else if event.block_timestamp >= UNIT_TYPE_2024_CUTOFF {
                StorageSlot::new(0, units, 0, expires_at as u32)
            } else {
                StorageSlot::new(units, 0, 0, expires_at as u32)
            };
            slot.merge(&unit_slot);
        }

        Ok(slot)
    }
}
