use std::sync::Arc;
use std::time::Duration;

use enostr::{
    relay::new_sub_id, Filter, Pubkey, ProfileState, RelayConnection, RelayConnector, RelayPool,
    SubEvent, KIND_METADATA,
};
use tracing::{debug, info, warn};

use crate::zaps::PaymentEndpoint;
use crate::ZapError;

/// What one relay told us about an author.
#[derive(Debug)]
enum Probe {
    Found(PaymentEndpoint),
    /// metadata, but nothing we can pay to
    Unpayable,
    /// no metadata before end of stored events
    Empty,
    Failed,
}

/// Looks up an author's payment endpoint, asking one relay at a time.
pub struct ProfileResolver {
    connector: Arc<dyn RelayConnector>,
    relays: Vec<String>,
    probe_timeout: Duration,
}

impl ProfileResolver {
    pub fn new(
        connector: Arc<dyn RelayConnector>,
        relays: Vec<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            relays,
            probe_timeout,
        }
    }

    pub fn from_pool(pool: &RelayPool, probe_timeout: Duration) -> Self {
        Self::new(pool.connector(), pool.urls().to_vec(), probe_timeout)
    }

    /// Probe each relay in order until one returns a verified metadata note
    /// with a usable payment descriptor. Each probe, connect included, is
    /// bounded by the probe timeout; a probe's connection is closed before
    /// the next one starts and is dropped if this future is.
    pub async fn resolve(&self, author: &Pubkey) -> Result<PaymentEndpoint, ZapError> {
        if self.relays.is_empty() {
            return Err(ZapError::NoRelaysAvailable);
        }

        let mut saw_metadata = false;
        let mut timed_out = 0;

        for relay in &self.relays {
            let probe = tokio::time::timeout(self.probe_timeout, self.probe(relay, author)).await;

            match probe {
                Ok(Probe::Found(endpoint)) => {
                    info!("found payment endpoint {endpoint} for {author} on {relay}");
                    return Ok(endpoint);
                }
                Ok(Probe::Unpayable) => saw_metadata = true,
                Ok(Probe::Empty) | Ok(Probe::Failed) => {}
                Err(_) => {
                    warn!("profile fetch from {relay} timed out");
                    timed_out += 1;
                }
            }
        }

        if !saw_metadata && timed_out > 0 {
            Err(ZapError::ProfileFetchTimeout)
        } else {
            Err(ZapError::NoPaymentEndpoint)
        }
    }

    async fn probe(&self, relay: &str, author: &Pubkey) -> Probe {
        let mut conn = match self.connector.connect(relay).await {
            Ok(conn) => conn,
            Err(err) => {
                warn!("failed to fetch profile from {relay}: {err}");
                return Probe::Failed;
            }
        };

        let probe = probe_connection(conn.as_mut(), author).await;
        conn.close().await;
        probe
    }
}

async fn probe_connection(conn: &mut dyn RelayConnection, author: &Pubkey) -> Probe {
    let relay = conn.url().to_owned();
    let filter = Filter::new()
        .kinds([KIND_METADATA])
        .authors([*author])
        .limit(1);

    let mut stream = match conn.subscribe(&new_sub_id("profile"), &filter).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!("failed to subscribe for profile on {relay}: {err}");
            return Probe::Failed;
        }
    };

    let mut saw_metadata = false;

    while let Some(event) = stream.recv().await {
        let note = match event {
            SubEvent::Event(note) => note,
            SubEvent::Eose => break,
            SubEvent::Closed(reason) => {
                debug!("{relay} closed profile subscription: {reason}");
                break;
            }
        };

        if note.kind != KIND_METADATA || note.pubkey != *author {
            continue;
        }

        if let Err(err) = note.verify() {
            warn!("dropping profile note {} from {relay}: {err}", note.id);
            continue;
        }

        saw_metadata = true;
        let profile = ProfileState::from_note_contents(&note.content);

        let Some(descriptor) = profile.payment_descriptor() else {
            let who = profile.display_name().or(profile.name()).unwrap_or("author");
            info!("{who} ({author}) has no lightning address on {relay}");
            continue;
        };

        match PaymentEndpoint::parse(descriptor) {
            Ok(endpoint) => return Probe::Found(endpoint),
            Err(err) => warn!("unusable lightning address for {author} on {relay}: {err}"),
        }
    }

    if saw_metadata {
        Probe::Unpayable
    } else {
        Probe::Empty
    }
}
