use std::sync::Arc;

use super::{
    get_message, make_fid_key, make_user_key, read_fid_key,
    store::{Store, StoreDef, StoreOptions},
    MessagesPage, StoreEventHandler, FID_BYTES, TS_HASH_LENGTH,
};
use crate::core::error::HubError;
use crate::core::util::bytes_compare;
use crate::proto::{self, message_data::Body, HubEvent, MessageType, SignatureScheme};
use crate::storage::constants::{RootPrefix, UserPostfix};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::util::pad_fixed_width;

pub const NAME_BYTES: usize = 20;

#[derive(Clone)]
pub struct UsernameProofStoreDef {
    prune_size_limit: u32,
}

impl StoreDef for UsernameProofStoreDef {
    #[inline]
    fn postfix(&self) -> u8 {
        UserPostfix::UsernameProofMessage as u8
    }

    #[inline]
    fn add_message_type(&self) -> u8 {
        MessageType::UsernameProof as u8
    }

    #[inline]
    fn remove_message_type(&self) -> u8 {
        MessageType::None as u8
    }

    #[inline]
    fn compact_state_message_type(&self) -> u8 {
        MessageType::None as u8
    }

    #[inline]
    fn is_add_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::UsernameProof)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_remove_type(&self, _message: &proto::Message) -> bool {
        false
    }

    #[inline]
    fn is_compact_state_type(&self, _message: &proto::Message) -> bool {
        false
    }

    fn make_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let name = Self::proof_name(message)?;
        Ok(Self::make_username_proof_adds_key(message.fid(), &name))
    }

    #[inline]
    fn make_remove_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter("removes not supported"))
    }

    #[inline]
    fn make_compact_state_add_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter(
            "UsernameProofStore doesn't support compact state",
        ))
    }

    fn build_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let name = Self::proof_name(message)?;
        let mut value = make_fid_key(message.fid());
        value.extend_from_slice(ts_hash);
        txn.put(Self::make_username_proof_by_name_key(&name), value);
        Ok(())
    }

    fn delete_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        _ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let name = Self::proof_name(message)?;
        txn.delete(Self::make_username_proof_by_name_key(&name));
        Ok(())
    }

    #[inline]
    fn get_prune_size_limit(&self) -> u32 {
        self.prune_size_limit
    }
}

impl UsernameProofStoreDef {
    fn proof_name(message: &proto::Message) -> Result<Vec<u8>, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::UsernameProofBody(body)) => Ok(body.name.clone()),
            _ => Err(HubError::invalid_parameter(
                "username proof message missing body",
            )),
        }
    }

    /// `[User] ‖ fid ‖ UserNameProofAdds ‖ name(20, padded)`
    pub fn make_username_proof_adds_key(fid: u64, name: &[u8]) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::UserNameProofAdds as u8);
        key.extend_from_slice(&pad_fixed_width(name, NAME_BYTES));
        key
    }

    /// `[UserNameProofByName] ‖ name(20, padded)` → `fid ‖ tsHash`. Names are
    /// claimed globally, so this index is keyed outside the fid space.
    pub fn make_username_proof_by_name_key(name: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + NAME_BYTES);
        key.push(RootPrefix::UserNameProofByName as u8);
        key.extend_from_slice(&pad_fixed_width(name, NAME_BYTES));
        key
    }
}

pub struct UsernameProofStore {}

impl UsernameProofStore {
    pub fn new(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
    ) -> Store<UsernameProofStoreDef> {
        Store::new_with_store_def(
            db,
            store_event_handler,
            UsernameProofStoreDef { prune_size_limit },
        )
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
        options: StoreOptions,
    ) -> Store<UsernameProofStoreDef> {
        Store::new_with_store_def_opts(
            db,
            store_event_handler,
            UsernameProofStoreDef { prune_size_limit },
            options,
        )
    }

    /// Merge with the global one-proof-per-name rule: a proof for a name held
    /// by another fid wins or loses on `(timestamp, hash)`; the loser is
    /// revoked so the name has exactly one owner.
    pub fn merge(
        store: &Store<UsernameProofStoreDef>,
        message: &proto::Message,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, HubError> {
        let name = UsernameProofStoreDef::proof_name(message)?;
        let mut events = vec![];

        if let Some(existing) = Self::get_username_proof_by_name(store, &name)? {
            if existing.fid() != message.fid() {
                let existing_order = (existing.timestamp(), existing.hash.clone());
                let incoming_order = (message.timestamp(), message.hash.clone());
                let incoming_wins = incoming_order.0 > existing_order.0
                    || (incoming_order.0 == existing_order.0
                        && bytes_compare(&incoming_order.1, &existing_order.1) > 0);
                if !incoming_wins {
                    return Err(HubError {
                        code: "bad_request.conflict".to_string(),
                        message: "username proof conflicts with a more recent proof".to_string(),
                    });
                }
                events.push(store.revoke(&existing, txn)?);
            }
        }

        events.push(store.merge(message, txn)?);
        Ok(events)
    }

    pub fn get_username_proof(
        store: &Store<UsernameProofStoreDef>,
        fid: u64,
        name: &[u8],
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::UsernameProof as i32,
                body: Some(Body::UsernameProofBody(proto::UserNameProof {
                    name: name.to_vec(),
                    ..Default::default()
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_add(&partial_message)
    }

    /// Resolve a name to its proof without knowing the owning fid.
    pub fn get_username_proof_by_name(
        store: &Store<UsernameProofStoreDef>,
        name: &[u8],
    ) -> Result<Option<proto::Message>, HubError> {
        let index_key = UsernameProofStoreDef::make_username_proof_by_name_key(name);
        match store.db().get(&index_key)? {
            None => Ok(None),
            Some(value) => {
                if value.len() != FID_BYTES + TS_HASH_LENGTH {
                    return Err(HubError::invalid_internal_state(
                        "malformed username proof index value",
                    ));
                }
                let fid = read_fid_key(&value, 0);
                let ts_hash: [u8; TS_HASH_LENGTH] =
                    value[FID_BYTES..].try_into().unwrap();
                get_message(
                    store.db(),
                    fid,
                    UserPostfix::UsernameProofMessage as u8,
                    &ts_hash,
                )
            }
        }
    }

    pub fn get_username_proofs_by_fid(
        store: &Store<UsernameProofStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_adds_by_fid::<fn(&proto::Message) -> bool>(fid, page_options, None)
    }
}
