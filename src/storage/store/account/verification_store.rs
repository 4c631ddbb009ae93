use std::sync::Arc;

use super::{
    store::{Store, StoreDef, StoreOptions},
    make_user_key, MessagesPage, StoreEventHandler, TS_HASH_LENGTH,
};
use crate::core::error::HubError;
use crate::proto::{self, message_data::Body, MessageType, SignatureScheme};
use crate::storage::constants::UserPostfix;
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::util::pad_fixed_width;

/// Addresses are fixed to 20 bytes in index keys; longer addresses (Solana)
/// are truncated, which is collision-free in practice and keeps the key
/// layout uniform.
pub const VERIFICATION_ADDRESS_BYTES: usize = 20;

#[derive(Clone)]
pub struct VerificationStoreDef {
    prune_size_limit: u32,
}

impl StoreDef for VerificationStoreDef {
    #[inline]
    fn postfix(&self) -> u8 {
        UserPostfix::VerificationMessage as u8
    }

    #[inline]
    fn add_message_type(&self) -> u8 {
        MessageType::VerificationAddEthAddress as u8
    }

    #[inline]
    fn remove_message_type(&self) -> u8 {
        MessageType::VerificationRemove as u8
    }

    #[inline]
    fn compact_state_message_type(&self) -> u8 {
        MessageType::None as u8
    }

    #[inline]
    fn is_add_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::VerificationAddEthAddress)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_remove_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::VerificationRemove)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_compact_state_type(&self, _message: &proto::Message) -> bool {
        false
    }

    fn make_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let address = Self::verification_address(message)?;
        Ok(Self::make_verification_adds_key(message.fid(), &address))
    }

    fn make_remove_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let address = Self::verification_address(message)?;
        Ok(Self::make_verification_removes_key(message.fid(), &address))
    }

    #[inline]
    fn make_compact_state_add_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter(
            "VerificationStore doesn't support compact state",
        ))
    }

    fn build_secondary_indices(
        &self,
        _txn: &mut RocksDbTransactionBatch,
        _ts_hash: &[u8; TS_HASH_LENGTH],
        _message: &proto::Message,
    ) -> Result<(), HubError> {
        Ok(())
    }

    fn delete_secondary_indices(
        &self,
        _txn: &mut RocksDbTransactionBatch,
        _ts_hash: &[u8; TS_HASH_LENGTH],
        _message: &proto::Message,
    ) -> Result<(), HubError> {
        Ok(())
    }

    #[inline]
    fn get_prune_size_limit(&self) -> u32 {
        self.prune_size_limit
    }
}

impl VerificationStoreDef {
    fn verification_address(message: &proto::Message) -> Result<Vec<u8>, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::VerificationAddAddressBody(body)) => Ok(body.address.clone()),
            Some(Body::VerificationRemoveBody(body)) => Ok(body.address.clone()),
            _ => Err(HubError::invalid_parameter(
                "verification message missing body",
            )),
        }
    }

    /// `[User] ‖ fid ‖ VerificationAdds ‖ address(20)`
    pub fn make_verification_adds_key(fid: u64, address: &[u8]) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::VerificationAdds as u8);
        key.extend_from_slice(&pad_fixed_width(address, VERIFICATION_ADDRESS_BYTES));
        key
    }

    pub fn make_verification_removes_key(fid: u64, address: &[u8]) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::VerificationRemoves as u8);
        key.extend_from_slice(&pad_fixed_width(address, VERIFICATION_ADDRESS_BYTES));
        key
    }
}

pub struct VerificationStore {}

impl VerificationStore {
    pub fn new(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
    ) -> Store<VerificationStoreDef> {
        Store::new_with_store_def(
            db,
            store_event_handler,
            VerificationStoreDef { prune_size_limit },
        )
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
        options: StoreOptions,
    ) -> Store<VerificationStoreDef> {
        Store::new_with_store_def_opts(
            db,
            store_event_handler,
            VerificationStoreDef { prune_size_limit },
            options,
        )
    }

    pub fn get_verification_add(
        store: &Store<VerificationStoreDef>,
        fid: u64,
        address: Vec<u8>,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::VerificationAddEthAddress as i32,
                body: Some(Body::VerificationAddAddressBody(
                    proto::VerificationAddAddressBody {
                        address,
                        ..Default::default()
                    },
                )),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_add(&partial_message)
    }

    pub fn get_verification_remove(
        store: &Store<VerificationStoreDef>,
        fid: u64,
        address: Vec<u8>,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::VerificationRemove as i32,
                body: Some(Body::VerificationRemoveBody(proto::VerificationRemoveBody {
                    address,
                    ..Default::default()
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_remove(&partial_message)
    }

    pub fn get_verification_adds_by_fid(
        store: &Store<VerificationStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_adds_by_fid::<fn(&proto::Message) -> bool>(fid, page_options, None)
    }

    pub fn get_verification_removes_by_fid(
        store: &Store<VerificationStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_removes_by_fid::<fn(&proto::Message) -> bool>(fid, page_options, None)
    }
}
