use secp256k1::{Keypair as SecpKeypair, Secp256k1, SecretKey};

use crate::note::event_commitment;
use crate::{Error, Note, NoteId, Pubkey};

static HRP_NSEC: bech32::Hrp = bech32::Hrp::parse_unchecked("nsec");

/// A key we can sign with.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct FullKeypair {
    pub pubkey: Pubkey,
    pub secret_key: SecretKey,
}

impl FullKeypair {
    pub fn new(pubkey: Pubkey, secret_key: SecretKey) -> Self {
        FullKeypair { pubkey, secret_key }
    }

    pub fn from_secret(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let (xopk, _) = secret_key.x_only_public_key(&secp);
        FullKeypair {
            pubkey: Pubkey::new(xopk.serialize()),
            secret_key,
        }
    }

    pub fn from_secret_bytes(bytes: [u8; 32]) -> Result<Self, Error> {
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| Error::InvalidSecretKey)?;
        Ok(Self::from_secret(secret_key))
    }

    /// Accepts a 64 character hex secret or an `nsec1…` string.
    pub fn parse_secret(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        let bytes = match hex::decode(s) {
            Ok(bytes) => bytes,
            Err(_) => {
                let (hrp, data) = bech32::decode(s).map_err(|_| Error::InvalidBech32)?;
                if hrp != HRP_NSEC {
                    return Err(Error::InvalidBech32);
                }
                data
            }
        };

        Self::from_secret_bytes(bytes.as_slice().try_into()?)
    }

    /// BIP-340 signature over a 32 byte note id
    pub fn sign_id(&self, id: &NoteId) -> [u8; 64] {
        let secp = Secp256k1::signing_only();
        let keypair = SecpKeypair::from_secret_key(&secp, &self.secret_key);
        secp.sign_schnorr_no_aux_rand(id.bytes(), &keypair)
            .serialize()
    }

    pub fn sign_note(
        &self,
        kind: u64,
        created_at: u64,
        tags: Vec<Vec<String>>,
        content: &str,
    ) -> Result<Note, Error> {
        let commitment = event_commitment(&self.pubkey, created_at, kind, &tags, content)?;
        let id = NoteId::from_commitment(&commitment);
        let sig = hex::encode(self.sign_id(&id));

        Ok(Note {
            id,
            pubkey: self.pubkey,
            created_at,
            kind,
            tags,
            content: content.to_owned(),
            sig,
        })
    }
}

impl std::fmt::Display for FullKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (secret hidden)", self.pubkey)
    }
}
