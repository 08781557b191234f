mod config;
pub mod content;
mod error;
mod feed;
pub mod http;
mod profile;
mod signer;
mod wallet;
pub mod zaps;

#[cfg(test)]
mod test_utils;

pub use config::{Config, Timeouts, DEFAULT_RELAYS};
pub use content::{process_content, ProcessedContent};
pub use error::{Error, ZapError};
pub use feed::{Feed, FeedUpdate, FeedView, RenderedPost};
pub use http::{install_crypto, HttpClient, HttpError, HttpResponse, HyperHttpClient};
pub use profile::ProfileResolver;
pub use signer::{LocalSigner, Signer};
pub use wallet::{NwcWallet, PaymentReceipt, Wallet};
pub use zaps::{
    AmountPrompt, Invoice, NoopObserver, PaymentEndpoint, ZapAttempt, ZapObserver, ZapState,
    ZapTarget, Zapper, ZapperTimeouts,
};

pub type Result<T> = std::result::Result<T, error::Error>;
