//! Wire and storage types for the hub protocol.
//!
//! These structs are kept in hand-maintained prost form so the encoded bytes
//! are canonical across peers. Field numbers are part of the protocol and
//! must never be reused.

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FarcasterNetwork {
    None = 0,
    Mainnet = 1,
    Testnet = 2,
    Devnet = 3,
}

impl FarcasterNetwork {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            FarcasterNetwork::None => "FARCASTER_NETWORK_NONE",
            FarcasterNetwork::Mainnet => "FARCASTER_NETWORK_MAINNET",
            FarcasterNetwork::Testnet => "FARCASTER_NETWORK_TESTNET",
            FarcasterNetwork::Devnet => "FARCASTER_NETWORK_DEVNET",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HashScheme {
    None = 0,
    Blake3 = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SignatureScheme {
    None = 0,
    Ed25519 = 1,
    Eip712 = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    None = 0,
    CastAdd = 1,
    CastRemove = 2,
    ReactionAdd = 3,
    ReactionRemove = 4,
    LinkAdd = 5,
    LinkRemove = 6,
    VerificationAddEthAddress = 7,
    VerificationRemove = 8,
    UserDataAdd = 11,
    UsernameProof = 12,
    LinkCompactState = 14,
}

impl MessageType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            MessageType::None => "MESSAGE_TYPE_NONE",
            MessageType::CastAdd => "MESSAGE_TYPE_CAST_ADD",
            MessageType::CastRemove => "MESSAGE_TYPE_CAST_REMOVE",
            MessageType::ReactionAdd => "MESSAGE_TYPE_REACTION_ADD",
            MessageType::ReactionRemove => "MESSAGE_TYPE_REACTION_REMOVE",
            MessageType::LinkAdd => "MESSAGE_TYPE_LINK_ADD",
            MessageType::LinkRemove => "MESSAGE_TYPE_LINK_REMOVE",
            MessageType::VerificationAddEthAddress => "MESSAGE_TYPE_VERIFICATION_ADD_ETH_ADDRESS",
            MessageType::VerificationRemove => "MESSAGE_TYPE_VERIFICATION_REMOVE",
            MessageType::UserDataAdd => "MESSAGE_TYPE_USER_DATA_ADD",
            MessageType::UsernameProof => "MESSAGE_TYPE_USERNAME_PROOF",
            MessageType::LinkCompactState => "MESSAGE_TYPE_LINK_COMPACT_STATE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReactionType {
    None = 0,
    Like = 1,
    Recast = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum UserDataType {
    None = 0,
    Pfp = 1,
    Display = 2,
    Bio = 3,
    Url = 5,
    Username = 6,
    Location = 7,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum UserNameType {
    UsernameTypeNone = 0,
    UsernameTypeFname = 1,
    UsernameTypeEnsL1 = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Protocol {
    Ethereum = 0,
    Solana = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum OnChainEventType {
    EventTypeNone = 0,
    EventTypeSigner = 1,
    EventTypeIdRegister = 3,
    EventTypeStorageRent = 4,
}

impl OnChainEventType {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            OnChainEventType::EventTypeNone => "EVENT_TYPE_NONE",
            OnChainEventType::EventTypeSigner => "EVENT_TYPE_SIGNER",
            OnChainEventType::EventTypeIdRegister => "EVENT_TYPE_ID_REGISTER",
            OnChainEventType::EventTypeStorageRent => "EVENT_TYPE_STORAGE_RENT",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum SignerEventType {
    None = 0,
    Add = 1,
    Remove = 2,
    AdminReset = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IdRegisterEventType {
    None = 0,
    Register = 1,
    Transfer = 2,
    ChangeRecovery = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HubEventType {
    None = 0,
    MergeMessage = 1,
    PruneMessage = 2,
    RevokeMessage = 3,
    MergeUsernameProof = 6,
    MergeOnChainEvent = 9,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StoreType {
    None = 0,
    Casts = 1,
    Links = 2,
    Reactions = 3,
    UserData = 4,
    Verifications = 5,
    UsernameProofs = 6,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum StorageUnitType {
    UnitTypeLegacy = 0,
    UnitType2024 = 1,
    UnitType2025 = 2,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(message, optional, tag = "1")]
    pub data: ::core::option::Option<MessageData>,
    /// 20-byte truncated blake3 digest of the encoded `data`.
    #[prost(bytes = "vec", tag = "2")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "HashScheme", tag = "3")]
    pub hash_scheme: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "SignatureScheme", tag = "5")]
    pub signature_scheme: i32,
    #[prost(bytes = "vec", tag = "6")]
    pub signer: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MessageData {
    #[prost(enumeration = "MessageType", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub fid: u64,
    /// Seconds since the Farcaster epoch.
    #[prost(uint32, tag = "3")]
    pub timestamp: u32,
    #[prost(enumeration = "FarcasterNetwork", tag = "4")]
    pub network: i32,
    #[prost(oneof = "message_data::Body", tags = "5, 6, 7, 9, 10, 12, 14, 15, 16")]
    pub body: ::core::option::Option<message_data::Body>,
}

impl MessageData {
    pub fn r#type(&self) -> MessageType {
        MessageType::try_from(self.r#type).unwrap_or(MessageType::None)
    }

    pub fn network(&self) -> FarcasterNetwork {
        FarcasterNetwork::try_from(self.network).unwrap_or(FarcasterNetwork::None)
    }
}

pub mod message_data {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "5")]
        CastAddBody(super::CastAddBody),
        #[prost(message, tag = "6")]
        CastRemoveBody(super::CastRemoveBody),
        #[prost(message, tag = "7")]
        ReactionBody(super::ReactionBody),
        #[prost(message, tag = "9")]
        VerificationAddAddressBody(super::VerificationAddAddressBody),
        #[prost(message, tag = "10")]
        VerificationRemoveBody(super::VerificationRemoveBody),
        #[prost(message, tag = "12")]
        UserDataBody(super::UserDataBody),
        #[prost(message, tag = "14")]
        LinkBody(super::LinkBody),
        #[prost(message, tag = "15")]
        UsernameProofBody(super::UserNameProof),
        #[prost(message, tag = "16")]
        LinkCompactStateBody(super::LinkCompactStateBody),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CastId {
    #[prost(uint64, tag = "1")]
    pub fid: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Embed {
    #[prost(oneof = "embed::Embed", tags = "1, 2")]
    pub embed: ::core::option::Option<embed::Embed>,
}

pub mod embed {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Embed {
        #[prost(string, tag = "1")]
        Url(::prost::alloc::string::String),
        #[prost(message, tag = "2")]
        CastId(super::CastId),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CastAddBody {
    #[prost(uint64, repeated, tag = "2")]
    pub mentions: ::prost::alloc::vec::Vec<u64>,
    #[prost(string, tag = "4")]
    pub text: ::prost::alloc::string::String,
    #[prost(uint32, repeated, tag = "5")]
    pub mentions_positions: ::prost::alloc::vec::Vec<u32>,
    #[prost(message, repeated, tag = "6")]
    pub embeds: ::prost::alloc::vec::Vec<Embed>,
    #[prost(oneof = "cast_add_body::Parent", tags = "3, 7")]
    pub parent: ::core::option::Option<cast_add_body::Parent>,
}

pub mod cast_add_body {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Parent {
        #[prost(message, tag = "3")]
        ParentCastId(super::CastId),
        #[prost(string, tag = "7")]
        ParentUrl(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CastRemoveBody {
    #[prost(bytes = "vec", tag = "1")]
    pub target_hash: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReactionBody {
    #[prost(enumeration = "ReactionType", tag = "1")]
    pub r#type: i32,
    #[prost(oneof = "reaction_body::Target", tags = "2, 3")]
    pub target: ::core::option::Option<reaction_body::Target>,
}

impl ReactionBody {
    pub fn r#type(&self) -> ReactionType {
        ReactionType::try_from(self.r#type).unwrap_or(ReactionType::None)
    }
}

pub mod reaction_body {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Target {
        #[prost(message, tag = "2")]
        TargetCastId(super::CastId),
        #[prost(string, tag = "3")]
        TargetUrl(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerificationAddAddressBody {
    /// 20 bytes for Ethereum, 32 bytes for Solana.
    #[prost(bytes = "vec", tag = "1")]
    pub address: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub claim_signature: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub block_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub verification_type: u32,
    #[prost(uint32, tag = "5")]
    pub chain_id: u32,
    #[prost(enumeration = "Protocol", tag = "7")]
    pub protocol: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VerificationRemoveBody {
    #[prost(bytes = "vec", tag = "1")]
    pub address: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "Protocol", tag = "2")]
    pub protocol: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserDataBody {
    #[prost(enumeration = "UserDataType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub value: ::prost::alloc::string::String,
}

impl UserDataBody {
    pub fn r#type(&self) -> UserDataType {
        UserDataType::try_from(self.r#type).unwrap_or(UserDataType::None)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LinkBody {
    /// Interpreted link relationship, at most 8 ASCII bytes (e.g. "follow").
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(uint32, optional, tag = "2")]
    pub display_timestamp: ::core::option::Option<u32>,
    #[prost(oneof = "link_body::Target", tags = "3")]
    pub target: ::core::option::Option<link_body::Target>,
}

pub mod link_body {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Target {
        #[prost(uint64, tag = "3")]
        TargetFid(u64),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LinkCompactStateBody {
    #[prost(string, tag = "1")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(uint64, repeated, tag = "2")]
    pub target_fids: ::prost::alloc::vec::Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserNameProof {
    #[prost(uint64, tag = "1")]
    pub timestamp: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub name: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub owner: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub fid: u64,
    #[prost(enumeration = "UserNameType", tag = "6")]
    pub r#type: i32,
}

impl UserNameProof {
    pub fn r#type(&self) -> UserNameType {
        UserNameType::try_from(self.r#type).unwrap_or(UserNameType::UsernameTypeNone)
    }
}

// ---------------------------------------------------------------------------
// On-chain events
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OnChainEvent {
    #[prost(enumeration = "OnChainEventType", tag = "1")]
    pub r#type: i32,
    #[prost(uint32, tag = "2")]
    pub chain_id: u32,
    #[prost(uint32, tag = "3")]
    pub block_number: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub block_hash: ::prost::alloc::vec::Vec<u8>,
    /// Unix seconds of the containing block.
    #[prost(uint64, tag = "5")]
    pub block_timestamp: u64,
    #[prost(bytes = "vec", tag = "6")]
    pub transaction_hash: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "7")]
    pub log_index: u32,
    #[prost(uint64, tag = "8")]
    pub fid: u64,
    #[prost(oneof = "on_chain_event::Body", tags = "9, 11, 12")]
    pub body: ::core::option::Option<on_chain_event::Body>,
    #[prost(uint32, tag = "13")]
    pub tx_index: u32,
}

impl OnChainEvent {
    pub fn r#type(&self) -> OnChainEventType {
        OnChainEventType::try_from(self.r#type).unwrap_or(OnChainEventType::EventTypeNone)
    }
}

pub mod on_chain_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "9")]
        SignerEventBody(super::SignerEventBody),
        #[prost(message, tag = "11")]
        IdRegisterEventBody(super::IdRegisterEventBody),
        #[prost(message, tag = "12")]
        StorageRentEventBody(super::StorageRentEventBody),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignerEventBody {
    /// Ed25519 public key of the delegated signer.
    #[prost(bytes = "vec", tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub key_type: u32,
    #[prost(enumeration = "SignerEventType", tag = "3")]
    pub event_type: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub metadata: ::prost::alloc::vec::Vec<u8>,
}

impl SignerEventBody {
    pub fn event_type(&self) -> SignerEventType {
        SignerEventType::try_from(self.event_type).unwrap_or(SignerEventType::None)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IdRegisterEventBody {
    #[prost(bytes = "vec", tag = "1")]
    pub to: ::prost::alloc::vec::Vec<u8>,
    #[prost(enumeration = "IdRegisterEventType", tag = "2")]
    pub event_type: i32,
    #[prost(bytes = "vec", tag = "3")]
    pub from: ::prost::alloc::vec::Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub recovery_address: ::prost::alloc::vec::Vec<u8>,
}

impl IdRegisterEventBody {
    pub fn event_type(&self) -> IdRegisterEventType {
        IdRegisterEventType::try_from(self.event_type).unwrap_or(IdRegisterEventType::None)
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StorageRentEventBody {
    #[prost(bytes = "vec", tag = "1")]
    pub payer: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub units: u32,
    #[prost(uint32, tag = "3")]
    pub expiry: u32,
}

// ---------------------------------------------------------------------------
// Hub events
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HubEvent {
    #[prost(enumeration = "HubEventType", tag = "1")]
    pub r#type: i32,
    /// Monotonic id assigned at commit time.
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(oneof = "hub_event::Body", tags = "3, 4, 5, 8, 10")]
    pub body: ::core::option::Option<hub_event::Body>,
    #[prost(uint64, tag = "11")]
    pub timestamp: u64,
}

impl HubEvent {
    pub fn r#type(&self) -> HubEventType {
        HubEventType::try_from(self.r#type).unwrap_or(HubEventType::None)
    }
}

pub mod hub_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Body {
        #[prost(message, tag = "3")]
        MergeMessageBody(super::MergeMessageBody),
        #[prost(message, tag = "4")]
        PruneMessageBody(super::PruneMessageBody),
        #[prost(message, tag = "5")]
        RevokeMessageBody(super::RevokeMessageBody),
        #[prost(message, tag = "8")]
        MergeUsernameProofBody(super::MergeUserNameProofBody),
        #[prost(message, tag = "10")]
        MergeOnChainEventBody(super::MergeOnChainEventBody),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergeMessageBody {
    #[prost(message, optional, tag = "1")]
    pub message: ::core::option::Option<Message>,
    /// Messages displaced by this merge under the conflict rules.
    #[prost(message, repeated, tag = "2")]
    pub deleted_messages: ::prost::alloc::vec::Vec<Message>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PruneMessageBody {
    #[prost(message, optional, tag = "1")]
    pub message: ::core::option::Option<Message>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RevokeMessageBody {
    #[prost(message, optional, tag = "1")]
    pub message: ::core::option::Option<Message>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergeOnChainEventBody {
    #[prost(message, optional, tag = "1")]
    pub on_chain_event: ::core::option::Option<OnChainEvent>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MergeUserNameProofBody {
    #[prost(message, optional, tag = "1")]
    pub username_proof: ::core::option::Option<UserNameProof>,
    #[prost(message, optional, tag = "2")]
    pub deleted_username_proof: ::core::option::Option<UserNameProof>,
    #[prost(message, optional, tag = "3")]
    pub username_proof_message: ::core::option::Option<Message>,
    #[prost(message, optional, tag = "4")]
    pub deleted_username_proof_message: ::core::option::Option<Message>,
}

// ---------------------------------------------------------------------------
// Internal persistence records
// ---------------------------------------------------------------------------

/// Serialized form of a sync-trie node.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DbTrieNode {
    #[prost(bytes = "vec", tag = "1")]
    pub key: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint32, repeated, tag = "2")]
    pub child_chars: ::prost::alloc::vec::Vec<u32>,
    #[prost(uint64, tag = "3")]
    pub items: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub hash: ::prost::alloc::vec::Vec<u8>,
}

/// Payload for the durable revoke-by-signer job queue.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RevokeMessagesBySignerJobPayload {
    #[prost(uint64, tag = "1")]
    pub fid: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub signer: ::prost::alloc::vec::Vec<u8>,
}
