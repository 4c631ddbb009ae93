use std::sync::Arc;

use super::{
    get_message, make_fid_key, make_user_key, read_fid_key,
    store::{Store, StoreDef, StoreOptions},
    MessagesPage, StoreEventHandler, FID_BYTES, HASH_LENGTH, TRUE_VALUE, TS_HASH_LENGTH,
};
use crate::core::error::HubError;
use crate::proto::{self, message_data::Body, MessageType, ReactionType, SignatureScheme};
use crate::storage::constants::{RootPrefix, UserPostfix, PAGE_SIZE_MAX};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::util::increment_vec_u8;

#[derive(Clone)]
pub struct ReactionStoreDef {
    prune_size_limit: u32,
}

impl StoreDef for ReactionStoreDef {
    #[inline]
    fn postfix(&self) -> u8 {
        UserPostfix::ReactionMessage as u8
    }

    #[inline]
    fn add_message_type(&self) -> u8 {
        MessageType::ReactionAdd as u8
    }

    #[inline]
    fn remove_message_type(&self) -> u8 {
        MessageType::ReactionRemove as u8
    }

    #[inline]
    fn compact_state_message_type(&self) -> u8 {
        MessageType::None as u8
    }

    #[inline]
    fn is_add_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::ReactionAdd)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_remove_type(&self, message: &proto::Message) -> bool {
        message.signature_scheme == SignatureScheme::Ed25519 as i32
            && message.is_type(MessageType::ReactionRemove)
            && message.data.as_ref().map(|d| d.body.is_some()) == Some(true)
    }

    #[inline]
    fn is_compact_state_type(&self, _message: &proto::Message) -> bool {
        false
    }

    fn make_add_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let body = Self::reaction_body(message)?;
        let target = body
            .target
            .as_ref()
            .ok_or(HubError::invalid_parameter("reaction message missing target"))?;
        Ok(Self::make_reaction_adds_key(
            message.fid(),
            body.r#type,
            target,
        ))
    }

    fn make_remove_key(&self, message: &proto::Message) -> Result<Vec<u8>, HubError> {
        let body = Self::reaction_body(message)?;
        let target = body
            .target
            .as_ref()
            .ok_or(HubError::invalid_parameter("reaction message missing target"))?;
        Ok(Self::make_reaction_removes_key(
            message.fid(),
            body.r#type,
            target,
        ))
    }

    #[inline]
    fn make_compact_state_add_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter(
            "ReactionStore doesn't support compact state",
        ))
    }

    fn build_secondary_indices(
        &self,
        txn: &mut RocksDbTransactionBatch,
        ts_hash: &[u8; TS_HASH_LENGTH],
        message: &proto::Message,
    ) -> Result<(), HubError> {
        let body = Self::reaction_body(message)?;
        if let Some(target) = &body.target {
            let key = Self::make_reactions_by_target_key(
                target,
                message.fid(),
                body.r#type as u8,
                ts_hash,
            );
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
        let body = Self::reaction_body(message)?;
        if let Some(target) = &body.target {
            txn.delete(Self::make_reactions_by_target_key(
                target,
                message.fid(),
                body.r#type as u8,
                ts_hash,
            ));
        }
        Ok(())
    }

    #[inline]
    fn get_prune_size_limit(&self) -> u32 {
        self.prune_size_limit
    }
}

impl ReactionStoreDef {
    fn reaction_body(message: &proto::Message) -> Result<&proto::ReactionBody, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::ReactionBody(body)) => Ok(body),
            _ => Err(HubError::invalid_parameter("reaction message missing body")),
        }
    }

    pub fn make_target_key(target: &proto::reaction_body::Target) -> Vec<u8> {
        match target {
            proto::reaction_body::Target::TargetCastId(cast_id) => {
                let mut key = Vec::with_capacity(FID_BYTES + HASH_LENGTH);
                key.extend_from_slice(&make_fid_key(cast_id.fid));
                key.extend_from_slice(&cast_id.hash);
                key
            }
            proto::reaction_body::Target::TargetUrl(url) => url.as_bytes().to_vec(),
        }
    }

    /// `[User] ‖ fid ‖ ReactionAdds ‖ type(1) ‖ target`
    pub fn make_reaction_adds_key(
        fid: u64,
        reaction_type: i32,
        target: &proto::reaction_body::Target,
    ) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::ReactionAdds as u8);
        key.push(reaction_type as u8);
        key.extend_from_slice(&Self::make_target_key(target));
        key
    }

    pub fn make_reaction_removes_key(
        fid: u64,
        reaction_type: i32,
        target: &proto::reaction_body::Target,
    ) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::ReactionRemoves as u8);
        key.push(reaction_type as u8);
        key.extend_from_slice(&Self::make_target_key(target));
        key
    }

    /// `[ReactionsByTarget] ‖ target ‖ fid ‖ type(1) ‖ tsHash`
    pub fn make_reactions_by_target_key(
        target: &proto::reaction_body::Target,
        fid: u64,
        reaction_type: u8,
        ts_hash: &[u8; TS_HASH_LENGTH],
    ) -> Vec<u8> {
        let target_bytes = Self::make_target_key(target);
        let mut key = Vec::with_capacity(1 + target_bytes.len() + FID_BYTES + 1 + TS_HASH_LENGTH);
        key.push(RootPrefix::ReactionsByTarget as u8);
        key.extend_from_slice(&target_bytes);
        key.extend_from_slice(&make_fid_key(fid));
        key.push(reaction_type);
        key.extend_from_slice(ts_hash);
        key
    }
}

pub struct ReactionStore {}

impl ReactionStore {
    pub fn new(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
    ) -> Store<ReactionStoreDef> {
        Store::new_with_store_def(db, store_event_handler, ReactionStoreDef { prune_size_limit })
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
        options: StoreOptions,
    ) -> Store<ReactionStoreDef> {
        Store::new_with_store_def_opts(
            db,
            store_event_handler,
            ReactionStoreDef { prune_size_limit },
            options,
        )
    }

    pub fn get_reaction_add(
        store: &Store<ReactionStoreDef>,
        fid: u64,
        reaction_type: i32,
        target: proto::reaction_body::Target,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::ReactionAdd as i32,
                body: Some(Body::ReactionBody(proto::ReactionBody {
                    r#type: reaction_type,
                    target: Some(target),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_add(&partial_message)
    }

    pub fn get_reaction_remove(
        store: &Store<ReactionStoreDef>,
        fid: u64,
        reaction_type: i32,
        target: proto::reaction_body::Target,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::ReactionRemove as i32,
                body: Some(Body::ReactionBody(proto::ReactionBody {
                    r#type: reaction_type,
                    target: Some(target),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_remove(&partial_message)
    }

    pub fn get_reaction_adds_by_fid(
        store: &Store<ReactionStoreDef>,
        fid: u64,
        reaction_type: i32,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_adds_by_fid(
            fid,
            page_options,
            Some(|message: &proto::Message| {
                if reaction_type == ReactionType::None as i32 {
                    return true;
                }
                match message.data.as_ref().and_then(|d| d.body.as_ref()) {
                    Some(Body::ReactionBody(body)) => body.r#type == reaction_type,
                    _ => false,
                }
            }),
        )
    }

    pub fn get_reaction_removes_by_fid(
        store: &Store<ReactionStoreDef>,
        fid: u64,
        reaction_type: i32,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_removes_by_fid(
            fid,
            page_options,
            Some(|message: &proto::Message| {
                if reaction_type == ReactionType::None as i32 {
                    return true;
                }
                match message.data.as_ref().and_then(|d| d.body.as_ref()) {
                    Some(Body::ReactionBody(body)) => body.r#type == reaction_type,
                    _ => false,
                }
            }),
        )
    }

    /// Reactions pointing at a cast or url, across all fids, optionally
    /// narrowed to one reaction type.
    pub fn get_reactions_by_target(
        store: &Store<ReactionStoreDef>,
        target: &proto::reaction_body::Target,
        reaction_type: i32,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        let mut prefix = vec![RootPrefix::ReactionsByTarget as u8];
        prefix.extend_from_slice(&ReactionStoreDef::make_target_key(target));

        let mut messages = vec![];
        let mut last_key = vec![];
        let page_size = page_options.page_size.unwrap_or(PAGE_SIZE_MAX);

        store.db().for_each_iterator_by_prefix(
            Some(prefix.clone()),
            Some(increment_vec_u8(&prefix)),
            page_options,
            |key, _| {
                let type_offset = key.len() - TS_HASH_LENGTH - 1;
                let row_type = key[type_offset];
                if reaction_type != ReactionType::None as i32 && row_type != reaction_type as u8 {
                    return Ok(false);
                }
                let fid = read_fid_key(key, type_offset - FID_BYTES);
                let ts_hash: [u8; TS_HASH_LENGTH] =
                    key[key.len() - TS_HASH_LENGTH..].try_into().unwrap();

                if let Some(message) =
                    get_message(store.db(), fid, UserPostfix::ReactionMessage as u8, &ts_hash)?
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
