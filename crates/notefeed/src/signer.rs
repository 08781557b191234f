use async_trait::async_trait;
use enostr::{FullKeypair, NoteId, Pubkey};

use crate::ZapError;

/// The user's key-holding agent. Zap requests are never signed anywhere
/// else.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn public_key(&self) -> Result<Pubkey, ZapError>;

    /// Sign the canonical event serialization. The returned schnorr
    /// signature must be over the sha256 of exactly these bytes.
    async fn sign(&self, commitment: &str) -> Result<[u8; 64], ZapError>;
}

/// Signs with a secret key held in memory.
pub struct LocalSigner {
    keys: FullKeypair,
}

impl LocalSigner {
    pub fn new(keys: FullKeypair) -> Self {
        Self { keys }
    }

    /// hex or `nsec1…`
    pub fn parse(secret: &str) -> Result<Self, enostr::Error> {
        Ok(Self::new(FullKeypair::parse_secret(secret)?))
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalSigner({})", self.keys.pubkey)
    }
}

#[async_trait]
impl Signer for LocalSigner {
    async fn public_key(&self) -> Result<Pubkey, ZapError> {
        Ok(self.keys.pubkey)
    }

    async fn sign(&self, commitment: &str) -> Result<[u8; 64], ZapError> {
        let id = NoteId::from_commitment(commitment);
        Ok(self.keys.sign_id(&id))
    }
}
