use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::Error;
use std::fmt;

#[derive(Eq, PartialEq, Clone, Copy, Hash, Ord, PartialOrd)]
pub struct Pubkey([u8; 32]);

static HRP_NPUB: bech32::Hrp = bech32::Hrp::parse_unchecked("npub");

impl Pubkey {
    pub fn new(data: [u8; 32]) -> Self {
        Self(data)
    }

    pub fn hex(&self) -> String {
        hex::encode(self.bytes())
    }

    pub fn bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Accepts either a 64 character hex key or an `npub1…` string.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.starts_with("npub1") {
            Pubkey::from_npub(s)
        } else {
            Pubkey::from_hex(s)
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, Error> {
        Ok(Pubkey(hex::decode(hex_str)?.as_slice().try_into()?))
    }

    /// Decode an `npub1…` string. The key must be a valid curve point.
    pub fn from_npub(s: &str) -> Result<Self, Error> {
        let (hrp, data) = bech32::decode(s).map_err(|_| Error::InvalidBech32)?;
        if hrp != HRP_NPUB {
            return Err(Error::InvalidBech32);
        }

        let pk = Pubkey(data.as_slice().try_into()?);
        pk.xonly()?;
        Ok(pk)
    }

    pub fn xonly(&self) -> Result<secp256k1::XOnlyPublicKey, Error> {
        secp256k1::XOnlyPublicKey::from_slice(&self.0).map_err(|_| Error::InvalidPublicKey)
    }

    pub fn to_bech(&self) -> Option<String> {
        bech32::encode::<bech32::Bech32>(HRP_NPUB, &self.0).ok()
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.hex())
    }
}

impl Serialize for Pubkey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.hex())
    }
}

impl<'de> Deserialize<'de> for Pubkey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
