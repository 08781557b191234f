use std::path::{Path, PathBuf};
use std::time::Duration;

use enostr::{canonicalize_url, Pubkey};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::Error;

pub const DEFAULT_RELAYS: [&str; 3] = [
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
    "wss://nos.lol",
];

/// Static configuration: who to follow, where to look and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relays: Vec<String>,
    pub npubs: Vec<String>,
    pub feed_limit: u64,
    pub default_zap_sats: u64,
    pub timeouts: Timeouts,
    pub nwc_uri: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            npubs: vec![],
            feed_limit: 20,
            default_zap_sats: 1000,
            timeouts: Timeouts::default(),
            nwc_uri: None,
            log_dir: None,
        }
    }
}

/// Upper bounds on every network wait, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub relay_connect: u64,
    pub profile_probe: u64,
    pub http: u64,
    pub signer: u64,
    pub payment: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            relay_connect: 10,
            profile_probe: 5,
            http: 15,
            signer: 30,
            payment: 60,
        }
    }
}

impl Timeouts {
    pub fn relay_connect(&self) -> Duration {
        Duration::from_secs(self.relay_connect)
    }

    pub fn profile_probe(&self) -> Duration {
        Duration::from_secs(self.profile_probe)
    }

    pub fn http(&self) -> Duration {
        Duration::from_secs(self.http)
    }

    pub fn signer(&self) -> Duration {
        Duration::from_secs(self.signer)
    }

    pub fn payment(&self) -> Duration {
        Duration::from_secs(self.payment)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.feed_limit == 0 {
            return Err(Error::Config("feed_limit must be positive".to_owned()));
        }

        let t = &self.timeouts;
        if [t.relay_connect, t.profile_probe, t.http, t.signer, t.payment].contains(&0) {
            return Err(Error::Config("timeouts must be positive".to_owned()));
        }

        Ok(())
    }

    /// Canonical relay urls, first occurrence wins.
    pub fn relay_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = vec![];
        for relay in &self.relays {
            let url = canonicalize_url(relay);
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
        urls
    }

    /// Decoded recipients. Entries that are neither npub nor hex are logged
    /// and skipped.
    pub fn authors(&self) -> Vec<Pubkey> {
        let mut authors: Vec<Pubkey> = vec![];
        for npub in &self.npubs {
            match Pubkey::parse(npub) {
                Ok(pk) if !authors.contains(&pk) => authors.push(pk),
                Ok(_) => {}
                Err(err) => warn!("skipping invalid npub '{}': {err}", npub.trim()),
            }
        }
        authors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    const JB55_NPUB: &str = "npub1xtscya34g58tk0z605fvr788k263gsu6cy9x0mhnm87echrgufzsevkk5s";
    const JB55_HEX: &str = "32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245";

    #[test]
    fn missing_fields_take_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"npubs":["{JB55_NPUB}"],"timeouts":{{"http":3}}}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.feed_limit, 20);
        assert_eq!(config.default_zap_sats, 1000);
        assert_eq!(config.timeouts.http(), Duration::from_secs(3));
        assert_eq!(config.timeouts.profile_probe(), Duration::from_secs(5));
        assert_eq!(config.relays.len(), 3);
        assert_eq!(config.nwc_uri, None);
    }

    #[test]
    fn relays_are_canonical_and_unique() {
        let config = Config {
            relays: vec![
                "wss://nos.lol".to_owned(),
                "wss://nos.lol/".to_owned(),
                " wss://relay.damus.io ".to_owned(),
            ],
            ..Config::default()
        };

        assert_eq!(
            config.relay_urls(),
            vec!["wss://nos.lol/".to_owned(), "wss://relay.damus.io/".to_owned()]
        );
    }

    #[test]
    fn invalid_npubs_are_skipped() {
        let config = Config {
            npubs: vec![
                JB55_NPUB.to_owned(),
                "npub1garbage".to_owned(),
                JB55_HEX.to_owned(),
            ],
            ..Config::default()
        };

        let authors = config.authors();
        assert_eq!(authors, vec![Pubkey::from_hex(JB55_HEX).unwrap()]);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"feed_limit":0}}"#).unwrap();
        assert!(matches!(Config::load(file.path()), Err(Error::Config(_))));

        let config = Config {
            timeouts: Timeouts {
                payment: 0,
                ..Timeouts::default()
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unreadable_config_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = Config::load(&dir.path().join("missing.json"));
        assert!(matches!(res, Err(Error::Io(_))));
    }
}
