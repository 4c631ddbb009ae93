use prost::Message as _;

use crate::core::error::HubError;
use crate::proto::{self, MessageType};
use crate::storage::constants::{RootPrefix, UserPostfix, PAGE_SIZE_MAX};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::util::increment_vec_u8;

/// Fids are encoded as 4 big-endian bytes in keys.
pub const FID_BYTES: usize = 4;

pub const HASH_LENGTH: usize = 20;

/// timestamp(4 BE) ‖ hash(20): the primary sort key for every message.
pub const TS_HASH_LENGTH: usize = 24;

/// Marker value for index rows whose key carries all the information.
pub const TRUE_VALUE: u8 = 1;

pub trait IntoU8 {
    fn into_u8(self) -> u8;
}

impl IntoU8 for MessageType {
    fn into_u8(self) -> u8 {
        self as u8
    }
}

/// The message store a given type lives in.
pub fn type_to_set_postfix(message_type: MessageType) -> UserPostfix {
    match message_type {
        MessageType::CastAdd | MessageType::CastRemove => UserPostfix::CastMessage,
        MessageType::LinkAdd | MessageType::LinkRemove => UserPostfix::LinkMessage,
        MessageType::LinkCompactState => UserPostfix::LinkCompactStateMessage,
        MessageType::ReactionAdd | MessageType::ReactionRemove => UserPostfix::ReactionMessage,
        MessageType::VerificationAddEthAddress | MessageType::VerificationRemove => {
            UserPostfix::VerificationMessage
        }
        MessageType::UserDataAdd => UserPostfix::UserDataMessage,
        MessageType::UsernameProof => UserPostfix::UsernameProofMessage,
        MessageType::None => UserPostfix::CastMessage,
    }
}

#[inline]
pub fn make_fid_key(fid: u64) -> Vec<u8> {
    (fid as u32).to_be_bytes().to_vec()
}

#[inline]
pub fn read_fid_key(key: &[u8], offset: usize) -> u64 {
    u32::from_be_bytes(key[offset..offset + FID_BYTES].try_into().unwrap()) as u64
}

#[inline]
pub fn make_user_key(fid: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + FID_BYTES);
    key.push(RootPrefix::User as u8);
    key.extend_from_slice(&make_fid_key(fid));
    key
}

pub fn make_ts_hash(timestamp: u32, hash: &[u8]) -> Result<[u8; TS_HASH_LENGTH], HubError> {
    if hash.len() != HASH_LENGTH {
        return Err(HubError::invalid_parameter("hash must be 20 bytes"));
    }
    let mut ts_hash = [0u8; TS_HASH_LENGTH];
    ts_hash[0..4].copy_from_slice(&timestamp.to_be_bytes());
    ts_hash[4..].copy_from_slice(hash);
    Ok(ts_hash)
}

pub fn unpack_ts_hash(ts_hash: &[u8; TS_HASH_LENGTH]) -> (u32, [u8; HASH_LENGTH]) {
    let timestamp = u32::from_be_bytes(ts_hash[0..4].try_into().unwrap());
    let mut hash = [0u8; HASH_LENGTH];
    hash.copy_from_slice(&ts_hash[4..]);
    (timestamp, hash)
}

pub fn make_ts_hash_from_message(message: &proto::Message) -> Result<[u8; TS_HASH_LENGTH], HubError> {
    let data = message
        .data
        .as_ref()
        .ok_or(HubError::invalid_parameter("message has no data"))?;
    make_ts_hash(data.timestamp, &message.hash)
}

/// `[User] ‖ fid ‖ postfix (‖ tsHash)` — the canonical message row.
pub fn make_message_primary_key(
    fid: u64,
    set: u8,
    ts_hash: Option<&[u8; TS_HASH_LENGTH]>,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + FID_BYTES + 1 + TS_HASH_LENGTH);
    key.extend_from_slice(&make_user_key(fid));
    key.push(set);
    if let Some(ts_hash) = ts_hash {
        key.extend_from_slice(ts_hash);
    }
    key
}

/// `[User] ‖ fid ‖ BySigner ‖ signer ‖ type ‖ tsHash` — one row per message,
/// so a signer revocation can sweep everything it ever signed.
pub fn make_message_by_signer_key(
    fid: u64,
    signer: &[u8],
    message_type: u8,
    ts_hash: &[u8; TS_HASH_LENGTH],
) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + FID_BYTES + 1 + signer.len() + 1 + TS_HASH_LENGTH);
    key.extend_from_slice(&make_user_key(fid));
    key.push(UserPostfix::BySigner as u8);
    key.extend_from_slice(signer);
    key.push(message_type);
    key.extend_from_slice(ts_hash);
    key
}

pub fn message_encode(message: &proto::Message) -> Vec<u8> {
    message.encode_to_vec()
}

pub fn message_decode(bytes: &[u8]) -> Result<proto::Message, HubError> {
    let message = proto::Message::decode(bytes)?;
    if message.data.is_none() {
        return Err(HubError::parse_failure("message data is missing"));
    }
    Ok(message)
}

pub fn get_message(
    db: &RocksDB,
    fid: u64,
    set: u8,
    ts_hash: &[u8; TS_HASH_LENGTH],
) -> Result<Option<proto::Message>, HubError> {
    let key = make_message_primary_key(fid, set, Some(ts_hash));
    match db.get(&key)? {
        Some(bytes) => Ok(Some(message_decode(&bytes)?)),
        None => Ok(None),
    }
}

pub struct MessagesPage {
    pub messages: Vec<proto::Message>,
    pub next_page_token: Option<Vec<u8>>,
}

/// Page over message rows under `prefix`, in tsHash order. The filter runs
/// before paging so a page always holds `page_size` matching messages when
/// enough exist.
pub fn get_messages_page_by_prefix<F>(
    db: &RocksDB,
    prefix: Vec<u8>,
    page_options: &PageOptions,
    filter: F,
) -> Result<MessagesPage, HubError>
where
    F: Fn(&proto::Message) -> bool,
{
    let mut messages = Vec::new();
    let mut last_key = vec![];
    let page_size = page_options.page_size.unwrap_or(PAGE_SIZE_MAX);

    db.for_each_iterator_by_prefix(
        Some(prefix.clone()),
        Some(increment_vec_u8(&prefix)),
        page_options,
        |key, value| {
            let message = message_decode(value)?;
            if filter(&message) {
                messages.push(message);
                if messages.len() >= page_size {
                    last_key = key.to_vec();
                    return Ok(true);
                }
            }
            Ok(false)
        },
    )?;

    let next_page_token = if last_key.is_empty() {
        None
    } else {
        Some(last_key)
    };

    Ok(MessagesPage {
        messages,
        next_page_token,
    })
}

/// Write the canonical row plus the by-signer index entry.
pub fn put_message_transaction(
    txn: &mut RocksDbTransactionBatch,
    message: &proto::Message,
) -> Result<(), HubError> {
    let ts_hash = make_ts_hash_from_message(message)?;
    let postfix = type_to_set_postfix(message.msg_type()).as_u8();

    let primary_key = make_message_primary_key(message.fid(), postfix, Some(&ts_hash));
    txn.put(primary_key, message_encode(message));

    let by_signer_key = make_message_by_signer_key(
        message.fid(),
        &message.signer,
        message.msg_type().into_u8(),
        &ts_hash,
    );
    txn.put(by_signer_key, vec![TRUE_VALUE]);

    Ok(())
}

pub fn delete_message_transaction(
    txn: &mut RocksDbTransactionBatch,
    message: &proto::Message,
) -> Result<(), HubError> {
    let ts_hash = make_ts_hash_from_message(message)?;
    let postfix = type_to_set_postfix(message.msg_type()).as_u8();

    txn.delete(make_message_primary_key(message.fid(), postfix, Some(&ts_hash)));
    txn.delete(make_message_by_signer_key(
        message.fid(),
        &message.signer,
        message.msg_type().into_u8(),
        &ts_hash,
    ));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ts_hash_orders_by_timestamp_then_hash() {
        let h1 = [1u8; HASH_LENGTH];
        let h2 = [2u8; HASH_LENGTH];

        let a = make_ts_hash(100, &h2).unwrap();
        let b = make_ts_hash(101, &h1).unwrap();
        assert!(a < b);

        let c = make_ts_hash(100, &h1).unwrap();
        assert!(c < a);

        let (timestamp, hash) = unpack_ts_hash(&a);
        assert_eq!(timestamp, 100);
        assert_eq!(hash, h2);
    }

    #[test]
    fn test_make_message_primary_key_layout() {
        let ts_hash = make_ts_hash(7, &[9u8; HASH_LENGTH]).unwrap();
        let key = make_message_primary_key(0x0102, UserPostfix::CastMessage.as_u8(), Some(&ts_hash));

        assert_eq!(key[0], RootPrefix::User as u8);
        assert_eq!(&key[1..5], &[0, 0, 1, 2]);
        assert_eq!(key[5], UserPostfix::CastMessage.as_u8());
        assert_eq!(&key[6..], &ts_hash);
    }
}
