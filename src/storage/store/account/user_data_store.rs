use std::sync::Arc;

use super::{
    make_user_key,
    store::{Store, StoreDef, StoreOptions},
    MessagesPage, StoreEventHandler, TS_HASH_LENGTH,
};
use crate::core::error::HubError;
use crate::proto::{self, message_data::Body, MessageType, SignatureScheme, UserDataType};
use crate::storage::constants::UserPostfix;
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};

#[derive(Clone)]
pub struct UserDataStoreDef {
    prune_size_limit: u32,
}

impl StoreDef for UserDataStoreDef {
    #[inline]
    fn postfix(&self) -> u8 {
        UserPostfix::UserDataMessage as u8
    }

    #[inline]
    fn add_message_type(&self) -> u8 {
        MessageType::UserDataAdd as u8
    }

    /// User data has no removes; setting an empty value supersedes instead.
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
            && message.is_type(MessageType::UserDataAdd)
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
        let body = Self::user_data_body(message)?;
        Ok(Self::make_user_data_adds_key(
            message.fid(),
            body.r#type as u8,
        ))
    }

    #[inline]
    fn make_remove_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter("removes not supported"))
    }

    #[inline]
    fn make_compact_state_add_key(&self, _message: &proto::Message) -> Result<Vec<u8>, HubError> {
        Err(HubError::invalid_parameter(
            "UserDataStore doesn't support compact state",
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

impl UserDataStoreDef {
    fn user_data_body(message: &proto::Message) -> Result<&proto::UserDataBody, HubError> {
        match message.data.as_ref().and_then(|d| d.body.as_ref()) {
            Some(Body::UserDataBody(body)) => Ok(body),
            _ => Err(HubError::invalid_parameter("user data message missing body")),
        }
    }

    /// `[User] ‖ fid ‖ UserDataAdds ‖ type(1)`
    pub fn make_user_data_adds_key(fid: u64, user_data_type: u8) -> Vec<u8> {
        let mut key = make_user_key(fid);
        key.push(UserPostfix::UserDataAdds as u8);
        key.push(user_data_type);
        key
    }
}

pub struct UserDataStore {}

impl UserDataStore {
    pub fn new(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
    ) -> Store<UserDataStoreDef> {
        Store::new_with_store_def(db, store_event_handler, UserDataStoreDef { prune_size_limit })
    }

    pub fn new_with_opts(
        db: Arc<RocksDB>,
        store_event_handler: Arc<StoreEventHandler>,
        prune_size_limit: u32,
        options: StoreOptions,
    ) -> Store<UserDataStoreDef> {
        Store::new_with_store_def_opts(
            db,
            store_event_handler,
            UserDataStoreDef { prune_size_limit },
            options,
        )
    }

    pub fn get_user_data_by_fid_and_type(
        store: &Store<UserDataStoreDef>,
        fid: u64,
        user_data_type: UserDataType,
    ) -> Result<Option<proto::Message>, HubError> {
        let partial_message = proto::Message {
            data: Some(proto::MessageData {
                fid,
                r#type: MessageType::UserDataAdd as i32,
                body: Some(Body::UserDataBody(proto::UserDataBody {
                    r#type: user_data_type as i32,
                    value: "".to_string(),
                })),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.get_add(&partial_message)
    }

    pub fn get_user_data_by_fid(
        store: &Store<UserDataStoreDef>,
        fid: u64,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        store.get_adds_by_fid::<fn(&proto::Message) -> bool>(fid, page_options, None)
    }
}
