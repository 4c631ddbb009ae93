//! Factories for building signed messages and on-chain events in tests and
//! benchmarks. All messages are built for the devnet network.

use ed25519_dalek::{Signer, SigningKey};
use prost::Message as _;

use crate::core::util::{calculate_message_hash, get_farcaster_time};
use crate::proto::{self, FarcasterNetwork, HashScheme, SignatureScheme};

pub const FACTORY_NETWORK: FarcasterNetwork = FarcasterNetwork::Devnet;

pub mod time {
    use super::*;

    pub fn farcaster_time() -> u32 {
        get_farcaster_time() as u32
    }
}

pub fn default_signer() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

pub fn default_custody_address() -> Vec<u8> {
    vec![0xABu8; 20]
}

pub fn sign_message_data(data: proto::MessageData, signer: &SigningKey) -> proto::Message {
    let hash = calculate_message_hash(&data.encode_to_vec());
    let signature = signer.sign(&hash).to_bytes().to_vec();
    proto::Message {
        data: Some(data),
        hash,
        hash_scheme: HashScheme::Blake3 as i32,
        signature,
        signature_scheme: SignatureScheme::Ed25519 as i32,
        signer: signer.verifying_key().as_bytes().to_vec(),
    }
}

fn make_message_data(
    fid: u64,
    message_type: proto::MessageType,
    timestamp: Option<u32>,
    body: proto::message_data::Body,
) -> proto::MessageData {
    proto::MessageData {
        r#type: message_type as i32,
        fid,
        timestamp: timestamp.unwrap_or_else(time::farcaster_time),
        network: FACTORY_NETWORK as i32,
        body: Some(body),
    }
}

pub mod messages_factory {
    use super::*;

    pub mod casts {
        use super::*;

        pub fn create_cast_add(
            fid: u64,
            text: &str,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::CastAdd,
                timestamp,
                proto::message_data::Body::CastAddBody(proto::CastAddBody {
                    text: text.to_string(),
                    ..Default::default()
                }),
            );
            sign_message_data(data, &signer)
        }

        pub fn create_cast_add_with_parent(
            fid: u64,
            text: &str,
            parent: proto::cast_add_body::Parent,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::CastAdd,
                timestamp,
                proto::message_data::Body::CastAddBody(proto::CastAddBody {
                    text: text.to_string(),
                    parent: Some(parent),
                    ..Default::default()
                }),
            );
            sign_message_data(data, &signer)
        }

        pub fn create_cast_remove(
            fid: u64,
            target_hash: &Vec<u8>,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::CastRemove,
                timestamp,
                proto::message_data::Body::CastRemoveBody(proto::CastRemoveBody {
                    target_hash: target_hash.clone(),
                }),
            );
            sign_message_data(data, &signer)
        }
    }

    pub mod reactions {
        use super::*;

        pub fn create_reaction_add(
            fid: u64,
            reaction_type: proto::ReactionType,
            target: proto::reaction_body::Target,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::ReactionAdd,
                timestamp,
                proto::message_data::Body::ReactionBody(proto::ReactionBody {
                    r#type: reaction_type as i32,
                    target: Some(target),
                }),
            );
            sign_message_data(data, &signer)
        }

        pub fn create_reaction_remove(
            fid: u64,
            reaction_type: proto::ReactionType,
            target: proto::reaction_body::Target,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::ReactionRemove,
                timestamp,
                proto::message_data::Body::ReactionBody(proto::ReactionBody {
                    r#type: reaction_type as i32,
                    target: Some(target),
                }),
            );
            sign_message_data(data, &signer)
        }
    }

    pub mod links {
        use super::*;

        pub fn create_link_add(
            fid: u64,
            link_type: &str,
            target_fid: u64,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::LinkAdd,
                timestamp,
                proto::message_data::Body::LinkBody(proto::LinkBody {
                    r#type: link_type.to_string(),
                    display_timestamp: None,
                    target: Some(proto::link_body::Target::TargetFid(target_fid)),
                }),
            );
            sign_message_data(data, &signer)
        }

        pub fn create_link_remove(
            fid: u64,
            link_type: &str,
            target_fid: u64,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::LinkRemove,
                timestamp,
                proto::message_data::Body::LinkBody(proto::LinkBody {
                    r#type: link_type.to_string(),
                    display_timestamp: None,
                    target: Some(proto::link_body::Target::TargetFid(target_fid)),
                }),
            );
            sign_message_data(data, &signer)
        }

        pub fn create_link_compact_state(
            fid: u64,
            link_type: &str,
            target_fids: Vec<u64>,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::LinkCompactState,
                timestamp,
                proto::message_data::Body::LinkCompactStateBody(proto::LinkCompactStateBody {
                    r#type: link_type.to_string(),
                    target_fids,
                }),
            );
            sign_message_data(data, &signer)
        }
    }

    pub mod user_data {
        use super::*;

        pub fn create_user_data_add(
            fid: u64,
            user_data_type: proto::UserDataType,
            value: &str,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::UserDataAdd,
                timestamp,
                proto::message_data::Body::UserDataBody(proto::UserDataBody {
                    r#type: user_data_type as i32,
                    value: value.to_string(),
                }),
            );
            sign_message_data(data, &signer)
        }
    }

    pub mod verifications {
        use super::*;

        pub fn create_verification_add(
            fid: u64,
            address: Vec<u8>,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::VerificationAddEthAddress,
                timestamp,
                proto::message_data::Body::VerificationAddAddressBody(
                    proto::VerificationAddAddressBody {
                        address,
                        protocol: proto::Protocol::Ethereum as i32,
                        ..Default::default()
                    },
                ),
            );
            sign_message_data(data, &signer)
        }

        pub fn create_verification_remove(
            fid: u64,
            address: Vec<u8>,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let data = make_message_data(
                fid,
                proto::MessageType::VerificationRemove,
                timestamp,
                proto::message_data::Body::VerificationRemoveBody(proto::VerificationRemoveBody {
                    address,
                    protocol: proto::Protocol::Ethereum as i32,
                }),
            );
            sign_message_data(data, &signer)
        }
    }

    pub mod username_proofs {
        use super::*;

        pub fn create_username_proof(
            fid: u64,
            name: &str,
            owner: Vec<u8>,
            timestamp: Option<u32>,
            signer: Option<&SigningKey>,
        ) -> proto::Message {
            let signer = signer.cloned().unwrap_or_else(default_signer);
            let timestamp = timestamp.unwrap_or_else(time::farcaster_time);
            let data = make_message_data(
                fid,
                proto::MessageType::UsernameProof,
                Some(timestamp),
                proto::message_data::Body::UsernameProofBody(proto::UserNameProof {
                    timestamp: timestamp as u64,
                    name: name.as_bytes().to_vec(),
                    owner,
                    signature: vec![],
                    fid,
                    r#type: proto::UserNameType::UsernameTypeEnsL1 as i32,
                }),
            );
            sign_message_data(data, &signer)
        }
    }
}

pub mod events_factory {
    use super::*;

    pub fn create_id_register_event(
        fid: u64,
        event_type: proto::IdRegisterEventType,
        to: Vec<u8>,
        from: Vec<u8>,
        block_number: u32,
        log_index: u32,
    ) -> proto::OnChainEvent {
        proto::OnChainEvent {
            r#type: proto::OnChainEventType::EventTypeIdRegister as i32,
            chain_id: 10,
            block_number,
            block_hash: blake3::hash(&block_number.to_be_bytes()).as_bytes().to_vec(),
            block_timestamp: 1_700_000_000 + block_number as u64,
            transaction_hash: blake3::hash(
                &[fid.to_be_bytes().as_slice(), &block_number.to_be_bytes()].concat(),
            )
            .as_bytes()
            .to_vec(),
            log_index,
            fid,
            body: Some(proto::on_chain_event::Body::IdRegisterEventBody(
                proto::IdRegisterEventBody {
                    to,
                    event_type: event_type as i32,
                    from,
                    recovery_address: vec![],
                },
            )),
            tx_index: 0,
        }
    }

    pub fn create_signer_event(
        fid: u64,
        key: Vec<u8>,
        event_type: proto::SignerEventType,
        block_number: u32,
        log_index: u32,
    ) -> proto::OnChainEvent {
        proto::OnChainEvent {
            r#type: proto::OnChainEventType::EventTypeSigner as i32,
            chain_id: 10,
            block_number,
            block_hash: blake3::hash(&block_number.to_be_bytes()).as_bytes().to_vec(),
            block_timestamp: 1_700_000_000 + block_number as u64,
            transaction_hash: blake3::hash(
                &[key.as_slice(), &block_number.to_be_bytes(), &[event_type as u8]].concat(),
            )
            .as_bytes()
            .to_vec(),
            log_index,
            fid,
            body: Some(proto::on_chain_event::Body::SignerEventBody(
                proto::SignerEventBody {
                    key,
                    key_type: 1,
                    event_type: event_type as i32,
                    metadata: vec![],
                },
            )),
            tx_index: 0,
        }
    }

    pub fn create_rent_event(
        fid: u64,
        units: u32,
        block_number: u32,
        block_timestamp: u64,
    ) -> proto::OnChainEvent {
        proto::OnChainEvent {
            r#type: proto::OnChainEventType::EventTypeStorageRent as i32,
            chain_id: 10,
            block_number,
            block_hash: blake3::hash(&block_number.to_be_bytes()).as_bytes().to_vec(),
            block_timestamp,
            transaction_hash: blake3::hash(
                &[fid.to_be_bytes().as_slice(), &units.to_be_bytes(), &block_number.to_be_bytes()]
                    .concat(),
            )
            .as_bytes()
            .to_vec(),
            log_index: 0,
            fid,
            body: Some(proto::on_chain_event::Body::StorageRentEventBody(
                proto::StorageRentEventBody {
                    payer: vec![],
                    units,
                    expiry: 0,
                },
            )),
            tx_index: 0,
        }
    }
}
