use crate::{Error, Pubkey};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::Digest;
use std::fmt;
use std::hash::{Hash, Hasher};

#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NoteId([u8; 32]);

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

static HRP_NOTE: bech32::Hrp = bech32::Hrp::parse_unchecked("note");

impl NoteId {
    pub fn new(bytes: [u8; 32]) -> Self {
        NoteId(bytes)
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, Error> {
        Ok(NoteId(hex::decode(hex_str)?.as_slice().try_into()?))
    }

    /// Accepts a hex id or a `note1…` string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if let Ok(id) = NoteId::from_hex(s) {
            return Ok(id);
        }

        let (hrp, data) = bech32::decode(s).map_err(|_| Error::InvalidBech32)?;
        if hrp != HRP_NOTE {
            return Err(Error::InvalidBech32);
        }

        Ok(NoteId(data.as_slice().try_into()?))
    }

    /// sha256 over the canonical serialization produced by [`event_commitment`]
    pub fn from_commitment(commitment: &str) -> Self {
        NoteId(sha256(commitment.as_bytes()))
    }

    pub fn to_bech(&self) -> Option<String> {
        bech32::encode::<bech32::Bech32>(HRP_NOTE, &self.0).ok()
    }
}

/// The exact string a note id is computed over (NIP-01):
/// `[0,<pubkey>,<created_at>,<kind>,<tags>,<content>]`
pub fn event_commitment(
    pubkey: &Pubkey,
    created_at: u64,
    kind: u64,
    tags: &[Vec<String>],
    content: &str,
) -> Result<String, Error> {
    let commitment = (0, pubkey.hex(), created_at, kind, tags, content);
    Ok(serde_json::to_string(&commitment)?)
}

pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = sha2::Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

pub fn verify_schnorr_signature(
    pubkey: &Pubkey,
    sig_bytes: &[u8; 64],
    msg_bytes: &[u8; 32],
) -> bool {
    let secp = secp256k1::Secp256k1::verification_only();

    let Ok(xonly_pubkey) = pubkey.xonly() else {
        return false;
    };
    let Ok(sig) = secp256k1::schnorr::Signature::from_slice(sig_bytes) else {
        return false;
    };

    secp.verify_schnorr(&sig, msg_bytes, &xonly_pubkey).is_ok()
}

/// A nostr event as it travels over the wire.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Note {
    pub id: NoteId,
    pub pubkey: Pubkey,
    /// unix seconds
    pub created_at: u64,
    pub kind: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// hex schnorr signature over `id`
    pub sig: String,
}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.0.hash(state);
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Note {}

impl Note {
    pub fn from_json(s: &str) -> Result<Self, Error> {
        serde_json::from_str(s).map_err(Into::into)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(Into::into)
    }

    pub fn commitment(&self) -> Result<String, Error> {
        event_commitment(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        )
    }

    /// Recompute the id locally and check the signature against it. Notes
    /// that fail this are never handed to callers.
    pub fn verify(&self) -> Result<(), Error> {
        let check_id = NoteId::from_commitment(&self.commitment()?);
        if check_id != self.id {
            return Err(Error::InvalidNoteId);
        }

        let sig_bytes: [u8; 64] = hex::decode(&self.sig)
            .map_err(|_| Error::InvalidSignature)?
            .try_into()
            .map_err(|_| Error::InvalidSignature)?;

        if !verify_schnorr_signature(&self.pubkey, &sig_bytes, self.id.bytes()) {
            return Err(Error::InvalidSignature);
        }

        Ok(())
    }

    pub fn get_tag(&self, name: &str) -> Option<&str> {
        self.tags.iter().find_map(|tag| {
            if tag.len() < 2 || tag[0] != name {
                return None;
            }
            Some(tag[1].as_str())
        })
    }
}

impl Serialize for NoteId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for NoteId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NoteId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
