use std::sync::Arc;

use super::{
    get_message, make_fid_key, make_user_key, read_fid_key,
    store::{Store, StoreDef, StoreOptions},
    MessagesPage, StoreEventHandler, FID_BYTES, TRUE_VALUE, TS_HASH_LENGTH,
};
use crate::core::error::HubError;
use crate::proto::{self, link_body::Target, message_data::Body, MessageType, SignatureScheme};
use crate::storage::constants::{RootPrefix, UserPostfix, PAGE_SIZE_MAX};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::util::{increment_vec_u8, pad_fixed_width};

/// Link relationship types are fixed to 8 bytes in index keys, zero-padded.
pub const LINK_TYPE_BYTES: usize = 8;

#[derive(Clone)]
pub struct LinkStoreDef {
    prune_size_limit: u32,
}

impl StoreDef for LinkStoreDef {
    #[inline]
    fn postfix(&self) -> u8 {
        UserPostfix::LinkMessage as u8
    }

    #[inline]
    fn add_message_type(&self) -> u8 {
        MessageType::LinkAdd as u8
    }

    #[inline]
    fn remove_message_type(&self) -> u8 {
        MessageType::LinkRemove as u8
    }

    #[inline]
    fn compact_state_message_type(&self) -> u8 {
        MessageType::LinkCompactState as u8
    }

    #[inline]
    fn is_add_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::LinkAdd)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_remove_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::LinkRemove)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_compact_state_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::LinkCompactState)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    fn make_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let (link_type, target_fid) = Self::link_body_key_parts(message)?;
        Ok(Self::make_link_adds_key(message.fid(), &link_type, target_fid))
    }

    fn make_remove_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let (link_type, target_fid) = Self::link_body_key_parts(message)?;
        Ok(Self::make_link_removes_key(
            message.fid(),
            &link_type,
            target_fid,
        ))
    }

    fn make_compact_state_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let link_type = Self::link_type(message)?;
        Ok(Self::make_link_compact_state_key(message.fid(), &link_type))
    }

    /// Early releases wrote the link type unpadded, so an index row for
    /// "follow" could live at either width. Readers check both; write paths
    /// drop the legacy row whenever they touch one.
    fn find_legacy_add_key(
        &self,
        db: &RocksDB,
        message: &proto::Message,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, HubError> {
        let (link_type, target_fid) = Self::link_body_key_parts(message)?;
        if link_type.len() == LINK_TYPE_BYTES {
            return Ok(None); // unpadded form is identical
        }

        let mut legacy_key = make_user_key(message.fid());
        legacy_key.push(UserPostfix::LinkAdds as u8);
        legacy_key.extend_from_slice(link_type.as_bytes());
        legacy_key.extend_from_slice(&make_fid_key(target_fid));

        match db.get(&legacy_key)? {
            Some(value) => Ok(Some((legacy_key, value))),
            None => Ok(None),
        }
    }

    fn build_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let (link_type, target_fid) = Self::link_body_key_parts(message)?;
        let key = Self::make_link_by_target_key(target_fid, message.fid(), &link_type, ts_hash);
        txn.put(key, vec![TRUE_VALUE]);
        Ok(())
    }

    fn delete_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let (link_type, target_fid) = Self::link_body_key_parts(message)?;
        txn.delete(Self::make_link_by_target_key(
            target_fid,
            message.fid(),
            &link_type,
            ts_hash,
        ));
        Ok(())
    }

    #[inline]
    fn get_prune_size_limit(&self) -> u32 {
        self.prune_size_limit
    }
}

impl LinkStoreDef {
    fn link_type(message: &proto::Message) -> Result<String, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::LinkBody(body)) => Ok(body.r#type.clone()),
            Some(Body::LinkCompactStateBody(body)) => Ok(body.r#type.clone()),
            _ => Err(HubError::invalid_parameter("link message missing body")),
        }
    }

    fn link_body_key_parts(message: &proto::Message) -> Result<(String, u64), HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::LinkBody(body)) => {
                let target_fid = match &body.target {
                    Some(Target::TargetFid(fid)) => *fid,
                    None => {
                        return Err(HubError::invalid_parameter("link message missing target"))
                    }
                };
                Ok((body.r#type.clone(), target_fid))
            }
            _ => Err(HubError::invalid_parameter("link message missing body")),
        }
    }

    /// `[User] ‖ fid ‖ LinkAdds ‖ type(8, padded) ‖ targetFid`
    pub fn make_link_adds_key(fid: u64, link_type: &str, target_fid: u64) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::LinkAdds as u8);
        key.extend_from_slice(&pad_fixed_width(link_type.as_bytes(), LINK_TYPE_BYTES));
        key.extend_from_slice(&make_fid_key(target_fid));
        key
    }

    pub fn make_link_removes_key(fid: u64, link_type: &str, target_fid: u64) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::LinkRemoves as u8);
        key.extend_from_slice(&pad_fixed_width(link_type.as_bytes(), LINK_TYPE_BYTES));
        key.extend_from_slice(&make_fid_key(target_fid));
        key
    }

    /// `[User] ‖ fid ‖ LinkCompactStateAdds ‖ type(8, padded)`
    pub fn make_link_compact_state_key(fid: u64, link_type: &str) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::LinkCompactStateAdds as u8);
        key.extend_from_slice(&pad_fixed_width(link_type.as_bytes(), LINK_TYPE_BYTES));
        key
    }

    /// `[LinksByTarget] ‖ targetFid ‖ fid ‖ type(8, padded) ‖ tsHash`
    pub fn make_link_by_target_key(
        target_fid: u64,
        fid: u64,
        link_type: &str,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + FID_BYTES * 2 + LINK_TYPE_BYTES + TS_HASH_LENGTH);
        key.push(RootPrefix::LinksByTarget as u8);
        key.extend_from_slice(&make_fid_key(target_fid));
        key.extend_from_slice(&make_fid_key(fid));
        key.extend_from_slice(&pad_fixed_width(link_type.as_bytes(), LINK_TYPE_BYTES));
        key.extend_from_slice(ts_hash);
        key
    }
}

pub struct LinkStore {}

impl LinkStore {
    pub fn new(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
    ) -> Store<LinkStoreDef> {
        Store::new_with_store_def(db, store_event_handler, LinkStoreDef { prune_size_limit })
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
        options: StoreOptions,
    ) -> Store<LinkStoreDef> {
        Store::new_with_store_def_opts(
            db,
            store_event_handler,
            LinkStoreDef { prune_size_limit },
            options,
        )
    }

    pub fn get_link_add(
        store: &Store<LinkStoreDef>,
        fid: u64,
        link_type: String,
        target_fid: u64,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::LinkAdd as i32,
                body: Some(Body::LinkBody(proto::LinkBody {
                    r#type: link_type,
                    display_timestamp: None,
                    target: Some(Target::TargetFid(target_fid)),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_add(&partial_message)
    }

    pub fn get_link_remove(
        store: &Store<LinkStoreDef>,
        fid: u64,
        link_type: String,
        target_fid: u64,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::LinkRemove as i32,
                body: Some(Body::LinkBody(proto::LinkBody {
                    r#type: link_type,
                    display_timestamp: None,
                    target: Some(Target::TargetFid(target_fid)),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_remove(&partial_message)
    }

    pub fn get_link_adds_by_fid(
        store: &Store<LinkStoreDef>,
        fid: u64,
        link_type: String,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_adds_by_fid(
            fid,
            page_options,
            Some(|message: &proto::Message| {
                if link_type.is_empty() {
                    return true;
                }
                match message.data.as_ref().and_then(|d| d.body.as_ref()) {
                    Some(Body::LinkBody(body)) => body.r#type == link_type,
                    _ => false,
                }
            }),
        )
    }

    pub fn get_link_removes_by_fid(
        store: &Store<LinkStoreDef>,
        fid: u64,
        link_type: String,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_removes_by_fid(
            fid,
            page_options,
            Some(|message: &proto::Message| {
                if link_type.is_empty() {
                    return true;
                }
                match message.data.as_ref().and_then(|d| d.body.as_ref()) {
                    Some(Body::LinkBody(body)) => body.r#type == link_type,
                    _ => false,
                }
            }),
        )
    }

    pub fn get_link_compact_state_message_by_fid(
        store: &Store<LinkStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let prefix = super::make_message_primary_key(
            fid,
            UserPostfix::LinkCompactStateMessage as u8,
            None,
        );
        super::get_messages_page_by_prefix(store.db(), prefix, page_options, |_| true)
    }

    /// Links pointing at a target fid, across all authors.
    pub fn get_links_by_target(
        store: &Store<LinkStoreDef>,
        target_fid: u64,
        link_type: String,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let mut prefix = vec![RootPrefix::LinksByTarget as u8];
        prefix.extend_from_slice(&make_fid_key(target_fid));

        let padded_type = if link_type.is_empty() {
            None
        } else {
            Some(pad_fixed_width(link_type.as_bytes(), LINK_TYPE_BYTES))
        };

        let mut messages = vec![];
        let mut last_key = vec![];
        let page_size = page_options.page_size.unwrap_or(PAGE_SIZE_MAX);

        store.db().for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            page_options,
            |key, _| {
                let type_offset = key.len() - TS_HASH_LENGTH - LINK_TYPE_BYTES;
                if let Some(padded_type) = &padded_type {
                    if &key[type_offset..type_offset + LINK_TYPE_BYTES] != padded_type.as_slice() {
                        return Ok(false);
                    }
                }
                let fid = read_fid_key(key, type_offset - FID_BYTES);
                let ts_hash: [u8; TS_HASH_LENGTH] =
                    key[key.len() - TS_HASH_LENGTH..].try_into().unwrap();

                if let Some(message) =
                    get_message(store.db(), fid, UserPostfix::LinkMessage as u8, &ts_hash)?
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
