use std::sync::Arc;

use super::{
    get_message, make_fid_key, make_user_key, read_fid_key,
    store::{Store, StoreDef, StoreOptions},
    MessagesPage, StoreEventHandler, FID_BYTES, HASH_LENGTH, TRUE_VALUE, TS_HASH_LENGTH,
};
use crate::core::error::HubError;
use crate::proto::{self, message_data::Body, MessageType, SignatureScheme};
use crate::storage::constants::{RootPrefix, UserPostfix};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::util::increment_vec_u8;

#[derive(Clone)]
pub struct CastStoreDef {
    prune_size_limit: u32,
}

impl StoreDef for CastStoreDef {
    #[inline]
    fn postfix(&self) -> u8 {
        UserPostfix::CastMessage as u8
    }

    #[inline]
    fn add_message_type(&self) -> u8 {
        MessageType::CastAdd as u8
    }

    #[inline]
    fn remove_message_type(&self) -> u8 {
        MessageType::CastRemove as u8
    }

    #[inline]
    fn compact_state_message_type(&self) -> u8 {
        MessageType::None as u8
    }

    #[inline]
    fn is_add_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::CastAdd)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_remove_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::CastRemove)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_compact_state_type(&self, _message: &proto::Message) -> bool {
        false
    }

    /// Casts are keyed by their own hash; a remove names the hash it removes,
    /// so both sides share the same body key.
    fn make_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let hash = Self::cast_body_hash(message)?;
        Ok(Self::make_cast_adds_key(message.fid(), hash))
    }

    fn make_remove_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let hash = Self::cast_body_hash(message)?;
        Ok(Self::make_cast_removes_key(message.fid(), hash))
    }

    #[inline]
    fn make_compact_state_add_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter(
            "CastStore doesn't support compact state",
        ))
    }

    fn build_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let body = Self::cast_add_body(message)?;

        if let Some(parent) = &body.parent {
            let key = Self::make_cast_by_parent_key(parent, message.fid(), ts_hash);
            txn.put(key, vec![TRUE_VALUE]);
        }
        for mention in &body.mentions {
            let key = Self::make_cast_by_mention_key(*mention, message.fid(), ts_hash);
            txn.put(key, vec![TRUE_VALUE]);
        }
        Ok(())
    }

    fn delete_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let body = Self::cast_add_body(message)?;

        if let Some(parent) = &body.parent {
            txn.delete(Self::make_cast_by_parent_key(parent, message.fid(), ts_hash));
        }
        for mention in &body.mentions {
            txn.delete(Self::make_cast_by_mention_key(*mention, message.fid(), ts_hash));
        }
        Ok(())
    }

    #[inline]
    fn get_prune_size_limit(&self) -> u32 {
        self.prune_size_limit
    }
}

impl CastStoreDef {
    fn cast_body_hash(message: &proto::Message) -> Result<&Vec<u8>, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::CastAddBody(_)) => Ok(&message.hash),
            Some(Body::CastRemoveBody(body)) => Ok(&body.target_hash),
            _ => Err(HubError::invalid_parameter("cast message missing body")),
        }
    }

    fn cast_add_body(message: &proto::Message) -> Result<&proto::CastAddBody, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::CastAddBody(body)) => Ok(body),
            _ => Err(HubError::invalid_parameter("cast message missing add body")),
        }
    }

    #[inline]
    pub fn make_cast_adds_key(fid: u64, hash: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + FID_BYTES + 1 + HASH_LENGTH);
        key.extend_from_slice(&make_user_key(fid));
        key.push(UserPostfix::CastAdds as u8);
        key.extend_from_slice(hash);
        key
    }

    #[inline]
    pub fn make_cast_removes_key(fid: u64, hash: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + FID_BYTES + 1 + HASH_LENGTH);
        key.extend_from_slice(&make_user_key(fid));
        key.push(UserPostfix::CastRemoves as u8);
        key.extend_from_slice(hash);
        key
    }

    pub fn make_parent_key(parent: &proto::cast_add_body::Parent) -> Vec<u8> {
        match parent {
            proto::cast_add_body::Parent::ParentCastId(cast_id) => {
                let mut key = Vec::with_capacity(FID_BYTES + HASH_LENGTH);
                key.extend_from_slice(&make_fid_key(cast_id.fid));
                key.extend_from_slice(&cast_id.hash);
                key
            }
            proto::cast_add_body::Parent::ParentUrl(url) => url.as_bytes().to_vec(),
        }
    }

    /// `[CastsByParent] ‖ parent ‖ fid ‖ tsHash` — the author fid and tsHash
    /// are parsed from the tail, so the parent part may be variable width.
    pub fn make_cast_by_parent_key(
        parent: &proto::cast_add_body::Parent,
        fid: u64,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> Vec<u8> {
        let parent_bytes = Self::make_parent_key(parent);
        let mut key = Vec::with_capacity(1 + parent_bytes.len() + FID_BYTES + TS_HASH_LENGTH);
        key.push(RootPrefix::CastsByParent as u8);
        key.extend_from_slice(&parent_bytes);
        key.extend_from_slice(&make_fid_key(fid));
        key.extend_from_slice(ts_hash);
        key
    }

    pub fn make_cast_by_mention_key(
        mention: u64,
        fid: u64,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + FID_BYTES * 2 + TS_HASH_LENGTH);
        key.push(RootPrefix::CastsByMention as u8);
        key.extend_from_slice(&make_fid_key(mention));
        key.extend_from_slice(&make_fid_key(fid));
        key.extend_from_slice(ts_hash);
        key
    }
}

pub struct CastStore {}

impl CastStore {
    pub fn new(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
    ) -> Store<CastStoreDef> {
        Store::new_with_store_def(db, store_event_handler, CastStoreDef { prune_size_limit })
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
        options: StoreOptions,
    ) -> Store<CastStoreDef> {
        Store::new_with_store_def_opts(
            db,
            store_event_handler,
            CastStoreDef { prune_size_limit },
            options,
        )
    }

    pub fn get_cast_add(
        store: &Store<CastStoreDef>,
        fid: u64,
        hash: Vec<u8>,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            hash,
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::CastAdd as i32,
                body: Some(Body::CastAddBody(proto::CastAddBody::default())),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_add(&partial_message)
    }

    pub fn get_cast_remove(
        store: &Store<CastStoreDef>,
        fid: u64,
        target_hash: Vec<u8>,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::CastRemove as i32,
                body: Some(Body::CastRemoveBody(proto::CastRemoveBody { target_hash })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_remove(&partial_message)
    }

    pub fn get_cast_adds_by_fid(
        store: &Store<CastStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_adds_by_fid::<fn(&proto::Message) -> bool>(fid, page_options, None)
    }

    pub fn get_cast_removes_by_fid(
        store: &Store<CastStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_removes_by_fid::<fn(&proto::Message) -> bool>(fid, page_options, None)
    }

    pub fn get_casts_by_parent(
        store: &Store<CastStoreDef>,
        parent: &proto::cast_add_body::Parent,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let mut prefix = vec![RootPrefix::CastsByParent as u8];
        prefix.extend_from_slice(&CastStoreDef::make_parent_key(parent));
        Self::get_casts_by_secondary_index(store, prefix, page_options)
    }

    pub fn get_casts_by_mention(
        store: &Store<CastStoreDef>,
        mention: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let mut prefix = vec![RootPrefix::CastsByMention as u8];
        prefix.extend_from_slice(&make_fid_key(mention));
        Self::get_casts_by_secondary_index(store, prefix, page_options)
    }

    fn get_casts_by_secondary_index(
        store: &Store<CastStoreDef>,
        prefix: Vec<u8>,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let mut messages = vec![];
        let mut last_key = vec![];
        let page_size = page_options
            .page_size
            .unwrap_or(crate::storage::constants::PAGE_SIZE_MAX);

        store.db().for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            page_options,
            |key, _| {
                // fid ‖ tsHash at the tail of every secondary key
                let fid_offset = key.len() - TS_HASH_LENGTH - FID_BYTES;
                let fid = read_fid_key(key, fid_offset);
                let ts_hash: [u8; TS_HASH_LENGTH] =
                    key[key.len() - TS_HASH_LENGTH..].try_into().unwrap();

                if let Some(message) =
                    get_message(store.db(), fid, UserPostfix::CastMessage as u8, &ts_hash)?
                {
                    messages.push(message);
                    if messages.len() >= page_size {
                        last_key = key.to_vec();
                        return Ok(true);
                    }
                }
                Ok(false)
            },
        )?;

        Ok(MessagesPage {
            messages,
            next_page_token: if last_key.is_empty() {
                None
            } else {
                Some(last_key)
            },
        })
    }
}
