use std::io;

/// App related errors
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("nostr error: {0}")]
    Nostr(#[from] enostr::Error),

    #[error("zaps error: {0}")]
    Zap(#[from] ZapError),
}

/// Why a zap attempt ended in failure. Every variant is terminal for the
/// attempt it belongs to; retrying is always a fresh attempt.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ZapError {
    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("no relays available")]
    NoRelaysAvailable,

    #[error("timed out fetching the recipient's profile")]
    ProfileFetchTimeout,

    #[error("the recipient has not set up lightning payments")]
    NoPaymentEndpoint,

    #[error("invalid payment endpoint: {0}")]
    InvalidPaymentEndpoint(String),

    #[error("no signer available, install or enable a nostr signing provider")]
    SigningUnavailable,

    #[error("signer returned an invalid signature")]
    InvalidSignature,

    #[error("{0} unavailable, install or enable a provider")]
    CapabilityUnavailable(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("amount must be between {min_sats} and {max_sats} sats")]
    AmountOutOfRange { min_sats: u64, max_sats: u64 },

    #[error("this lightning address does not support nostr zaps")]
    AttributionUnsupported,

    #[error("invalid endpoint response: {0}")]
    InvalidEndpointResponse(String),

    #[error("malformed endpoint response: {0}")]
    MalformedEndpointResponse(String),

    #[error("endpoint error: {0}")]
    EndpointError(String),

    #[error("invoice callback failed with status {status}: {body}")]
    CallbackFailed { status: u16, body: String },

    #[error("no payment request in response")]
    NoInvoiceInResponse,

    #[error("payment failed: {0}")]
    PaymentError(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("zap cancelled")]
    Cancelled,

    #[error("a zap for this note is already in flight")]
    AlreadyInFlight,
}

impl From<enostr::Error> for ZapError {
    fn from(err: enostr::Error) -> Self {
        match err {
            enostr::Error::NoRelaysAvailable => ZapError::NoRelaysAvailable,
            err => ZapError::ConnectionError(err.to_string()),
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Config(s)
    }
}
