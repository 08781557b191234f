use std::array::TryFromSliceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("message is empty")]
    Empty,

    #[error("decoding failed: {0}")]
    DecodeFailed(String),

    #[error("hex decoding failed")]
    HexDecodeFailed,

    #[error("invalid bech32")]
    InvalidBech32,

    #[error("invalid byte size")]
    InvalidByteSize,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("note id does not match its contents")]
    InvalidNoteId,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("could not connect to {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("relay {0} closed the connection")]
    RelayClosed(String),

    #[error("no relays available")]
    NoRelaysAvailable,

    #[error("{0}")]
    Generic(String),
}

impl Error {
    pub fn connection(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Connection {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_e: TryFromSliceError) -> Self {
        Error::InvalidByteSize
    }
}

impl From<hex::FromHexError> for Error {
    fn from(_e: hex::FromHexError) -> Self {
        Error::HexDecodeFailed
    }
}
