//! In-memory relays for tests and demos.
//!
//! A [`MemoryRelayNetwork`] answers subscriptions from a fixed set of stored
//! notes, can be told to refuse connections, hang while connecting or go
//! silent, and counts open
//! connections so tests can check that every exit path closes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{canonicalize_url, EventStream, RelayConnection, RelayConnector, SubEvent};
use crate::{Error, Filter, Note, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RelayBehavior {
    /// Serves stored notes, then EOSE, then live notes.
    Normal,
    /// Every connection attempt fails.
    Refuse,
    /// Accepts connections and subscriptions but never sends anything.
    Silent,
    /// Connection attempts never complete.
    Hang,
}

#[derive(Default)]
struct RelayState {
    behavior: Option<RelayBehavior>,
    notes: Vec<Note>,
    live: Vec<(Filter, mpsc::UnboundedSender<SubEvent>)>,
    connect_attempts: usize,
    subscriptions: usize,
}

#[derive(Default)]
struct NetworkState {
    relays: HashMap<String, RelayState>,
    open_connections: usize,
}

#[derive(Clone, Default)]
pub struct MemoryRelayNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryRelayNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_relay(&self, url: &str, behavior: RelayBehavior, notes: Vec<Note>) -> &Self {
        let mut state = self.lock();
        let relay = state.relays.entry(canonicalize_url(url)).or_default();
        relay.behavior = Some(behavior);
        relay.notes.extend(notes);
        self
    }

    /// Store a note and push it to every matching live subscription.
    pub fn publish(&self, url: &str, note: Note) {
        let mut state = self.lock();
        let Some(relay) = state.relays.get_mut(&canonicalize_url(url)) else {
            return;
        };

        relay
            .live
            .retain(|(filter, tx)| !filter.matches(&note) || tx.send(SubEvent::Event(note.clone())).is_ok());
        relay.notes.push(note);
    }

    pub fn connect_attempts(&self, url: &str) -> usize {
        self.lock()
            .relays
            .get(&canonicalize_url(url))
            .map(|r| r.connect_attempts)
            .unwrap_or(0)
    }

    pub fn subscriptions(&self, url: &str) -> usize {
        self.lock()
            .relays
            .get(&canonicalize_url(url))
            .map(|r| r.subscriptions)
            .unwrap_or(0)
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    fn begin_connect(&self, url: &str) -> Result<RelayBehavior> {
        let mut state = self.lock();
        let Some(relay) = state.relays.get_mut(url) else {
            return Err(Error::connection(url, "unknown host"));
        };

        relay.connect_attempts += 1;
        match relay.behavior.unwrap_or(RelayBehavior::Normal) {
            RelayBehavior::Refuse => Err(Error::connection(url, "connection refused")),
            behavior => Ok(behavior),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkState> {
        // a panicking test thread should not hide the state from others
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RelayConnector for MemoryRelayNetwork {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayConnection>> {
        let url = canonicalize_url(url);
        let behavior = self.begin_connect(&url)?;

        if behavior == RelayBehavior::Hang {
            return std::future::pending().await;
        }

        self.lock().open_connections += 1;

        Ok(Box::new(MemoryConnection {
            url,
            behavior,
            network: self.clone(),
            open: true,
        }))
    }
}

struct MemoryConnection {
    url: String,
    behavior: RelayBehavior,
    network: MemoryRelayNetwork,
    open: bool,
}

impl MemoryConnection {
    fn release(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let mut state = self.network.lock();
        state.open_connections -= 1;
        if let Some(relay) = state.relays.get_mut(&self.url) {
            relay.live.retain(|(_, tx)| !tx.is_closed());
        }
    }
}

#[async_trait]
impl RelayConnection for MemoryConnection {
    fn url(&self) -> &str {
        &self.url
    }

    async fn subscribe(&mut self, _sub_id: &str, filter: &Filter) -> Result<EventStream> {
        if !self.open {
            return Err(Error::RelayClosed(self.url.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.network.lock();
        let Some(relay) = state.relays.get_mut(&self.url) else {
            return Err(Error::RelayClosed(self.url.clone()));
        };
        relay.subscriptions += 1;

        if self.behavior == RelayBehavior::Silent {
            // keep the sender alive so the stream stays open and empty
            relay.live.push((Filter::new().kinds([]), tx));
            return Ok(rx);
        }

        let mut stored: Vec<&Note> = relay.notes.iter().filter(|n| filter.matches(n)).collect();
        stored.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let limit = filter.get_limit().map(|l| l as usize).unwrap_or(usize::MAX);

        for note in stored.into_iter().take(limit) {
            let _ = tx.send(SubEvent::Event(note.clone()));
        }
        let _ = tx.send(SubEvent::Eose);

        relay.live.push((filter.clone(), tx));
        Ok(rx)
    }

    async fn close(&mut self) {
        self.release();
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}
