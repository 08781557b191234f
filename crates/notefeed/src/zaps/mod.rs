mod attempt;
mod endpoint;
mod networking;
mod request;

use enostr::{NoteId, Pubkey};

pub use attempt::{
    AmountPrompt, NoopObserver, ZapAttempt, ZapObserver, ZapState, Zapper, ZapperTimeouts,
};
pub use endpoint::{decode_lnurl, encode_lnurl, PaymentEndpoint};
pub use networking::{Invoice, LNUrlPayRequest, LnurlNegotiator};
pub use request::{SignedZapRequest, UnsignedZapRequest, ZapTag, KIND_ZAP_REQUEST};

/// The note being zapped and the author being paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZapTarget {
    pub note_id: NoteId,
    pub author: Pubkey,
}

impl ZapTarget {
    pub fn new(note_id: NoteId, author: Pubkey) -> Self {
        Self { note_id, author }
    }
}
