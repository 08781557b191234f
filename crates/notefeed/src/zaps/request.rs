use std::time::{SystemTime, UNIX_EPOCH};

use enostr::{event_commitment, verify_schnorr_signature, Note, NoteId, Pubkey};
use tracing::{debug, warn};

use super::{PaymentEndpoint, ZapTarget};
use crate::{Signer, ZapError};

/// Kind of zap request notes (NIP-57)
pub const KIND_ZAP_REQUEST: u64 = 9734;

/// One relation carried by a zap request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZapTag {
    Recipient(Pubkey),
    Note(NoteId),
    /// millisats
    Amount(u64),
    Relays(Vec<String>),
    Lnurl(String),
}

impl ZapTag {
    pub fn to_tag(&self) -> Vec<String> {
        match self {
            ZapTag::Recipient(pk) => vec!["p".to_owned(), pk.hex()],
            ZapTag::Note(id) => vec!["e".to_owned(), id.hex()],
            ZapTag::Amount(msats) => vec!["amount".to_owned(), msats.to_string()],
            ZapTag::Relays(relays) => {
                let mut tag = Vec::with_capacity(relays.len() + 1);
                tag.push("relays".to_owned());
                tag.extend(relays.iter().cloned());
                tag
            }
            ZapTag::Lnurl(lnurl) => vec!["lnurl".to_owned(), lnurl.clone()],
        }
    }
}

/// A zap request before it has a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedZapRequest {
    sender: Pubkey,
    created_at: u64,
    content: String,
    tags: Vec<ZapTag>,
}

impl UnsignedZapRequest {
    pub fn new(
        target: &ZapTarget,
        sender: Pubkey,
        amount_sats: u64,
        relays: Vec<String>,
        endpoint: &PaymentEndpoint,
    ) -> Result<Self, ZapError> {
        if amount_sats == 0 {
            return Err(ZapError::InvalidAmount("amount must be positive".to_owned()));
        }

        let msats = amount_sats
            .checked_mul(1000)
            .ok_or_else(|| ZapError::InvalidAmount(format!("{amount_sats} sats is too large")))?;

        Ok(UnsignedZapRequest {
            sender,
            created_at: unix_now(),
            content: String::new(),
            tags: vec![
                ZapTag::Recipient(target.author),
                ZapTag::Note(target.note_id),
                ZapTag::Amount(msats),
                ZapTag::Relays(relays),
                ZapTag::Lnurl(endpoint.lnurl()?),
            ],
        })
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.content = comment.to_owned();
        self
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn tags(&self) -> &[ZapTag] {
        &self.tags
    }

    fn raw_tags(&self) -> Vec<Vec<String>> {
        self.tags.iter().map(ZapTag::to_tag).collect()
    }

    /// The exact serialization both the id and the signature cover.
    pub fn commitment(&self) -> Result<String, ZapError> {
        event_commitment(
            &self.sender,
            self.created_at,
            KIND_ZAP_REQUEST,
            &self.raw_tags(),
            &self.content,
        )
        .map_err(|e| ZapError::Serialization(e.to_string()))
    }

    pub fn id(&self) -> Result<NoteId, ZapError> {
        Ok(NoteId::from_commitment(&self.commitment()?))
    }

    /// Ask `signer` to sign this request. Without a signer this fails with
    /// [`ZapError::SigningUnavailable`]; a signature that does not verify
    /// against the sender key is rejected.
    pub async fn sign(self, signer: Option<&dyn Signer>) -> Result<SignedZapRequest, ZapError> {
        let Some(signer) = signer else {
            return Err(ZapError::SigningUnavailable);
        };

        let commitment = self.commitment()?;
        let id = NoteId::from_commitment(&commitment);
        let sig = signer.sign(&commitment).await?;

        if !verify_schnorr_signature(&self.sender, &sig, id.bytes()) {
            warn!("signer returned a bad signature for zap request {id}");
            return Err(ZapError::InvalidSignature);
        }

        debug!("signed zap request {id}");

        let tags = self.raw_tags();
        Ok(SignedZapRequest {
            note: Note {
                id,
                pubkey: self.sender,
                created_at: self.created_at,
                kind: KIND_ZAP_REQUEST,
                tags,
                content: self.content,
                sig: hex::encode(sig),
            },
        })
    }
}

/// A signed zap request. Read-only: the note it wraps is exactly what was
/// signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedZapRequest {
    note: Note,
}

impl SignedZapRequest {
    pub fn id(&self) -> NoteId {
        self.note.id
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn amount_msats(&self) -> Option<u64> {
        self.note.get_tag("amount").and_then(|a| a.parse().ok())
    }

    pub fn lnurl(&self) -> Option<&str> {
        self.note.get_tag("lnurl")
    }

    pub fn comment(&self) -> &str {
        &self.note.content
    }

    /// Serialized form sent as the `nostr` callback parameter.
    pub fn to_json(&self) -> Result<String, ZapError> {
        self.note
            .to_json()
            .map_err(|e| ZapError::Serialization(e.to_string()))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
