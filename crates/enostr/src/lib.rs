mod client;
mod error;
mod filter;
mod keypair;
mod note;
mod profile;
mod pubkey;
pub mod relay;

pub use client::ClientMessage;
pub use error::Error;
pub use ewebsock;
pub use filter::Filter;
pub use keypair::FullKeypair;
pub use note::{event_commitment, sha256, verify_schnorr_signature, Note, NoteId};
pub use profile::ProfileState;
pub use pubkey::Pubkey;
pub use relay::dedup::Deduplicator;
pub use relay::message::RelayMessage;
pub use relay::pool::{PoolEvent, PoolSubscription, RelayPool};
pub use relay::websocket::WebsocketConnector;
pub use relay::{
    canonicalize_url, EventStream, RelayConnection, RelayConnector, RelayStatus, SubEvent,
};

pub type Result<T> = std::result::Result<T, error::Error>;

/// Kind of profile metadata notes
pub const KIND_METADATA: u64 = 0;
/// Kind of short text notes
pub const KIND_TEXT_NOTE: u64 = 1;
