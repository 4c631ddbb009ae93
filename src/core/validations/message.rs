use ed25519_dalek::{Signature, VerifyingKey};
use prost::Message as _;

use super::error::ValidationError;
use crate::core::util::{calculate_message_hash, FarcasterTime};
use crate::proto;
use crate::proto::{
    link_body, message_data::Body, FarcasterNetwork, HashScheme, MessageType, Protocol,
    ReactionType, SignatureScheme, UserDataType, UserNameType,
};

/// How far a message timestamp may run ahead of the local clock.
pub const ALLOWED_CLOCK_SKEW_SECONDS: u32 = 10 * 60;

pub const MAX_CAST_TEXT_BYTES: usize = 320;
pub const MAX_EMBEDS_PER_CAST: usize = 2;
pub const MAX_URL_BYTES: usize = 256;
pub const MAX_LINK_TYPE_BYTES: usize = 8;
pub const MAX_NAME_BYTES: usize = 20;
pub const MAX_USER_DATA_VALUE_BYTES: usize = 2048;
pub const HASH_LENGTH: usize = 20;
pub const ETH_ADDRESS_LENGTH: usize = 20;
pub const SOL_ADDRESS_LENGTH: usize = 32;
pub const ED25519_KEY_LENGTH: usize = 32;
pub const ED25519_SIGNATURE_LENGTH: usize = 64;

/// Pure structural and cryptographic validation of a single message. No state
/// is consulted; custody and signer-registration checks happen in the engine
/// against the on-chain event store.
pub fn validate_message(
    message: &proto::Message,
    network: FarcasterNetwork,
    current_time: &FarcasterTime,
) -> Result<(), ValidationError> {
    let data = message.data.as_ref().ok_or(ValidationError::MissingData)?;

    if data.network != network as i32 {
        return Err(ValidationError::InvalidNetwork);
    }

    validate_message_hash(message, data)?;
    validate_signature(message)?;
    validate_body(data)?;

    if data.timestamp > current_time.to_u64() as u32 + ALLOWED_CLOCK_SKEW_SECONDS {
        return Err(ValidationError::TimestampTooFarInFuture);
    }

    Ok(())
}

fn validate_message_hash(
    message: &proto::Message,
    data: &proto::MessageData,
) -> Result<(), ValidationError> {
    if message.hash_scheme != HashScheme::Blake3 as i32 {
        return Err(ValidationError::InvalidHashScheme);
    }
    if message.hash.len() != HASH_LENGTH {
        return Err(ValidationError::InvalidHash);
    }

    let computed = calculate_message_hash(&data.encode_to_vec());
    if computed != message.hash {
        return Err(ValidationError::InvalidHash);
    }
    Ok(())
}

fn validate_signature(message: &proto::Message) -> Result<(), ValidationError> {
    // Every user-message family is ed25519-signed by a delegated signer key.
    // Eip712 stays on the wire enum for externally-verified artifacts but is
    // never a valid scheme for a message.
    if message.signature_scheme != SignatureScheme::Ed25519 as i32 {
        return Err(ValidationError::InvalidSignatureScheme);
    }

    if message.signature.len() != ED25519_SIGNATURE_LENGTH {
        return Err(ValidationError::InvalidSignature);
    }

    let key_bytes: &[u8; ED25519_KEY_LENGTH] = message
        .signer
        .as_slice()
        .try_into()
        .map_err(|_| ValidationError::InvalidSigner)?;
    let public_key =
        VerifyingKey::from_bytes(key_bytes).map_err(|_| ValidationError::InvalidSigner)?;
    let signature = Signature::from_slice(&message.signature)
        .map_err(|_| ValidationError::InvalidSignature)?;

    public_key
        .verify_strict(&message.hash, &signature)
        .map_err(|_| ValidationError::InvalidSignature)
}

fn validate_body(data: &proto::MessageData) -> Result<(), ValidationError> {
    let body = data.body.as_ref().ok_or(ValidationError::MissingBody)?;

    match (data.r#type(), body) {
        (MessageType::CastAdd, Body::CastAddBody(body)) => validate_cast_add_body(body),
        (MessageType::CastRemove, Body::CastRemoveBody(body)) => {
            validate_target_hash(&body.target_hash)
        }
        (MessageType::ReactionAdd, Body::ReactionBody(body))
        | (MessageType::ReactionRemove, Body::ReactionBody(body)) => validate_reaction_body(body),
        (MessageType::LinkAdd, Body::LinkBody(body))
        | (MessageType::LinkRemove, Body::LinkBody(body)) => validate_link_body(body),
        (MessageType::LinkCompactState, Body::LinkCompactStateBody(body)) => {
            validate_link_type(&body.r#type)
        }
        (MessageType::VerificationAddEthAddress, Body::VerificationAddAddressBody(body)) => {
            validate_verification_address(body.protocol, &body.address)
        }
        (MessageType::VerificationRemove, Body::VerificationRemoveBody(body)) => {
            validate_verification_address(body.protocol, &body.address)
        }
        (MessageType::UserDataAdd, Body::UserDataBody(body)) => validate_user_data_body(body),
        (MessageType::UsernameProof, Body::UsernameProofBody(body)) => {
            validate_username_proof_body(body, data)
        }
        _ => Err(ValidationError::BodyTypeMismatch),
    }
}

fn validate_cast_add_body(body: &proto::CastAddBody) -> Result<(), ValidationError> {
    if body.text.len() > MAX_CAST_TEXT_BYTES {
        return Err(ValidationError::InvalidData("cast text too long".to_string()));
    }
    if body.text.is_empty() && body.embeds.is_empty() {
        return Err(ValidationError::InvalidData("cast is empty".to_string()));
    }
    if body.embeds.len() > MAX_EMBEDS_PER_CAST {
        return Err(ValidationError::InvalidData("too many embeds".to_string()));
    }
    if body.mentions.len() != body.mentions_positions.len() {
        return Err(ValidationError::InvalidData(
            "mentions and mention positions must match".to_string(),
        ));
    }
    for embed in &body.embeds {
        match &embed.embed {
            Some(proto::embed::Embed::Url(url)) => validate_url(url)?,
            Some(proto::embed::Embed::CastId(cast_id)) => validate_cast_id(cast_id)?,
            None => {
                return Err(ValidationError::InvalidData("embed is empty".to_string()));
            }
        }
    }
    match &body.parent {
        Some(proto::cast_add_body::Parent::ParentCastId(cast_id)) => validate_cast_id(cast_id)?,
        Some(proto::cast_add_body::Parent::ParentUrl(url)) => validate_url(url)?,
        None => {}
    }
    Ok(())
}

fn validate_reaction_body(body: &proto::ReactionBody) -> Result<(), ValidationError> {
    if ReactionType::try_from(body.r#type).is_err() || body.r#type == ReactionType::None as i32 {
        return Err(ValidationError::InvalidData(
            "unknown reaction type".to_string(),
        ));
    }
    match &body.target {
        Some(proto::reaction_body::Target::TargetCastId(cast_id)) => validate_cast_id(cast_id),
        Some(proto::reaction_body::Target::TargetUrl(url)) => validate_url(url),
        None => Err(ValidationError::InvalidData(
            "reaction has no target".to_string(),
        )),
    }
}

fn validate_link_body(body: &proto::LinkBody) -> Result<(), ValidationError> {
    validate_link_type(&body.r#type)?;
    match &body.target {
        Some(link_body::Target::TargetFid(fid)) => validate_fid(*fid),
        None => Err(ValidationError::InvalidData("link has no target".to_string())),
    }
}

pub fn validate_link_type(link_type: &str) -> Result<(), ValidationError> {
    if link_type.is_empty()
        || link_type.len() > MAX_LINK_TYPE_BYTES
        || !link_type.is_ascii()
    {
        return Err(ValidationError::InvalidData("invalid link type".to_string()));
    }
    Ok(())
}

fn validate_verification_address(protocol: i32, address: &[u8]) -> Result<(), ValidationError> {
    let expected_len = match Protocol::try_from(protocol) {
        Ok(Protocol::Ethereum) => ETH_ADDRESS_LENGTH,
        Ok(Protocol::Solana) => SOL_ADDRESS_LENGTH,
        Err(_) => {
            return Err(ValidationError::InvalidData(
                "unknown verification protocol".to_string(),
            ))
        }
    };
    if address.len() != expected_len {
        return Err(ValidationError::InvalidData(
            "invalid verification address".to_string(),
        ));
    }
    Ok(())
}

fn validate_user_data_body(body: &proto::UserDataBody) -> Result<(), ValidationError> {
    if UserDataType::try_from(body.r#type).is_err() || body.r#type == UserDataType::None as i32 {
        return Err(ValidationError::InvalidData(
            "unknown user data type".to_string(),
        ));
    }
    if body.value.len() > MAX_USER_DATA_VALUE_BYTES {
        return Err(ValidationError::InvalidData(
            "user data value too long".to_string(),
        ));
    }
    if body.r#type == UserDataType::Username as i32 && body.value.len() > MAX_NAME_BYTES {
        return Err(ValidationError::InvalidData("username too long".to_string()));
    }
    Ok(())
}

fn validate_username_proof_body(
    body: &proto::UserNameProof,
    data: &proto::MessageData,
) -> Result<(), ValidationError> {
    if UserNameType::try_from(body.r#type).is_err()
        || body.r#type == UserNameType::UsernameTypeNone as i32
    {
        return Err(ValidationError::InvalidData(
            "unknown username proof type".to_string(),
        ));
    }
    if body.name.is_empty() || body.name.len() > MAX_NAME_BYTES {
        return Err(ValidationError::InvalidData(
            "invalid username proof name".to_string(),
        ));
    }
    if body.fid != data.fid {
        return Err(ValidationError::InvalidData(
            "username proof fid does not match message fid".to_string(),
        ));
    }
    Ok(())
}

fn validate_cast_id(cast_id: &proto::CastId) -> Result<(), ValidationError> {
    validate_fid(cast_id.fid)?;
    validate_target_hash(&cast_id.hash)
}

fn validate_target_hash(hash: &[u8]) -> Result<(), ValidationError> {
    if hash.len() != HASH_LENGTH {
        return Err(ValidationError::InvalidData("invalid target hash".to_string()));
    }
    Ok(())
}

fn validate_fid(fid: u64) -> Result<(), ValidationError> {
    if fid == 0 {
        return Err(ValidationError::InvalidData("fid must be positive".to_string()));
    }
    Ok(())
}

pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    if url.is_empty() || url.len() > MAX_URL_BYTES {
        return Err(ValidationError::InvalidData("invalid url".to_string()));
    }
    Ok(())
}
