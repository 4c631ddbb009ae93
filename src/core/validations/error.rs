use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("message has no data")]
    MissingData,

    #[error("message network does not match the engine network")]
    InvalidNetwork,

    #[error("unsupported hash scheme")]
    InvalidHashScheme,

    #[error("message hash does not match the message data")]
    InvalidHash,

    #[error("unsupported signature scheme for this message type")]
    InvalidSignatureScheme,

    #[error("could not parse signer key")]
    InvalidSigner,

    #[error("signature does not verify against the signer")]
    InvalidSignature,

    #[error("message timestamp is too far in the future")]
    TimestampTooFarInFuture,

    #[error("message body is missing")]
    MissingBody,

    #[error("message body does not match the message type")]
    BodyTypeMismatch,

    #[error("invalid message body: {0}")]
    InvalidData(String),

    #[error("validation worker pool unavailable")]
    PoolShutdown,
}
