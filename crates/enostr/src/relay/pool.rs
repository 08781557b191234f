use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dedup::Deduplicator;
use super::{canonicalize_url, new_sub_id, RelayConnection, RelayConnector, RelayStatus, SubEvent};
use crate::{Error, Filter, Note, Result};

const UPDATE_BUFFER: usize = 1024;

/// What a pool subscription hands to its consumer. Notes are already
/// verified and de-duplicated across relays.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Event { relay: String, note: Note },
    /// `relay` has no more stored results for this subscription.
    Eose { relay: String },
}

#[derive(Debug)]
enum Update {
    Status(RelayStatus),
    Event(Note),
    Eose,
}

#[derive(Debug)]
struct RelayUpdate {
    relay: String,
    update: Update,
}

pub struct RelayPool {
    connector: Arc<dyn RelayConnector>,
    urls: Vec<String>,
    connect_timeout: Duration,
}

impl RelayPool {
    pub fn new(connector: Arc<dyn RelayConnector>) -> RelayPool {
        RelayPool {
            connector,
            urls: vec![],
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn connect_timeout(&mut self, duration: Duration) -> &mut Self {
        self.connect_timeout = duration;
        self
    }

    pub fn has(&self, url: &str) -> bool {
        let url = canonicalize_url(url);
        self.urls.iter().any(|u| *u == url)
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn connector(&self) -> Arc<dyn RelayConnector> {
        self.connector.clone()
    }

    // Adds a websocket url to the RelayPool.
    pub fn add_url(&mut self, url: &str) {
        let url = canonicalize_url(url);
        // Check if the URL already exists in the pool.
        if self.has(&url) {
            return;
        }
        self.urls.push(url);
    }

    pub fn add_urls<'a>(&mut self, urls: impl IntoIterator<Item = &'a str>) {
        for url in urls {
            self.add_url(url);
        }
    }

    /// Connect to every relay concurrently and send each the same filter.
    ///
    /// Returns as soon as one relay is connected; the rest keep connecting
    /// in the background and join the merged stream when they succeed.
    /// Fails with [`Error::NoRelaysAvailable`] only when every relay failed.
    pub async fn subscribe(&self, filter: Filter) -> Result<PoolSubscription> {
        if self.urls.is_empty() {
            return Err(Error::NoRelaysAvailable);
        }

        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let tasks = self
            .urls
            .iter()
            .map(|url| {
                tokio::spawn(run_relay(
                    self.connector.clone(),
                    url.clone(),
                    filter.clone(),
                    self.connect_timeout,
                    tx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        drop(tx);

        let mut sub = PoolSubscription {
            rx,
            dedup: Deduplicator::new(),
            statuses: self
                .urls
                .iter()
                .map(|u| (u.clone(), RelayStatus::Connecting))
                .collect(),
            shutdown: Some(shutdown_tx),
            tasks,
        };

        loop {
            let Some(RelayUpdate { relay, update }) = sub.rx.recv().await else {
                warn!("could not connect to any of {} relays", self.urls.len());
                return Err(Error::NoRelaysAvailable);
            };

            // a relay only sends notes after reporting Connected
            if let Update::Status(status) = update {
                sub.statuses.insert(relay, status);
                if status == RelayStatus::Connected {
                    return Ok(sub);
                }
            }

            if sub.statuses.values().all(|s| *s == RelayStatus::Failed) {
                warn!("could not connect to any of {} relays", self.urls.len());
                return Err(Error::NoRelaysAvailable);
            }
        }
    }
}

/// A live, merged subscription over every relay in the pool. Dropping it
/// tells each relay task to close its connection; [`close`] does the same
/// and waits until they have.
///
/// [`close`]: PoolSubscription::close
pub struct PoolSubscription {
    rx: mpsc::Receiver<RelayUpdate>,
    dedup: Deduplicator,
    statuses: BTreeMap<String, RelayStatus>,
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl PoolSubscription {
    /// Next verified, never-before-seen note or end-of-stored-events
    /// notice. `None` once every relay has gone away.
    pub async fn next(&mut self) -> Option<PoolEvent> {
        loop {
            let RelayUpdate { relay, update } = self.rx.recv().await?;

            match update {
                Update::Status(status) => {
                    debug!("{relay} is now {:?}", status);
                    self.statuses.insert(relay, status);
                }
                Update::Event(note) => {
                    if let Some(note) = self.dedup.admit(note) {
                        return Some(PoolEvent::Event { relay, note });
                    }
                }
                Update::Eose => {
                    info!("end of stored events from {relay}");
                    return Some(PoolEvent::Eose { relay });
                }
            }
        }
    }

    pub fn status(&self, url: &str) -> Option<RelayStatus> {
        self.statuses.get(&canonicalize_url(url)).copied()
    }

    pub fn statuses(&self) -> &BTreeMap<String, RelayStatus> {
        &self.statuses
    }

    pub fn connected(&self) -> usize {
        self.statuses
            .values()
            .filter(|s| **s == RelayStatus::Connected)
            .count()
    }

    pub async fn close(mut self) {
        self.shutdown.take();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for PoolSubscription {
    fn drop(&mut self) {
        // relay tasks watch this channel and close their connections
        self.shutdown.take();
    }
}

async fn run_relay(
    connector: Arc<dyn RelayConnector>,
    url: String,
    filter: Filter,
    connect_timeout: Duration,
    tx: mpsc::Sender<RelayUpdate>,
    mut shutdown: watch::Receiver<bool>,
) {
    let send = |update: Update| {
        let tx = tx.clone();
        let relay = url.clone();
        async move { tx.send(RelayUpdate { relay, update }).await.is_ok() }
    };

    let connected = tokio::select! {
        res = tokio::time::timeout(connect_timeout, connector.connect(&url)) => res,
        _ = shutdown.changed() => return,
    };

    let mut conn = match connected {
        Ok(Ok(conn)) => conn,
        Ok(Err(err)) => {
            warn!("failed to connect to {url}: {err}");
            send(Update::Status(RelayStatus::Failed)).await;
            return;
        }
        Err(_) => {
            warn!("timed out connecting to {url} after {:?}", connect_timeout);
            send(Update::Status(RelayStatus::Failed)).await;
            return;
        }
    };

    if !send(Update::Status(RelayStatus::Connected)).await {
        conn.close().await;
        return;
    }

    forward_notes(conn.as_mut(), &url, &filter, &mut shutdown, &send).await;

    conn.close().await;
    send(Update::Status(RelayStatus::Disconnected)).await;
}

async fn forward_notes<F, Fut>(
    conn: &mut dyn RelayConnection,
    url: &str,
    filter: &Filter,
    shutdown: &mut watch::Receiver<bool>,
    send: &F,
) where
    F: Fn(Update) -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let sub_id = new_sub_id("feed");
    let mut stream = match conn.subscribe(&sub_id, filter).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!("failed to subscribe on {url}: {err}");
            return;
        }
    };

    loop {
        let event = tokio::select! {
            ev = stream.recv() => ev,
            _ = shutdown.changed() => return,
        };

        let delivered = match event {
            Some(SubEvent::Event(note)) => {
                if let Err(err) = note.verify() {
                    warn!("dropping note {} from {url}: {err}", note.id);
                    continue;
                }
                if !filter.matches(&note) {
                    debug!("{url} sent note {} outside the filter", note.id);
                    continue;
                }
                send(Update::Event(note)).await
            }
            Some(SubEvent::Eose) => send(Update::Eose).await,
            Some(SubEvent::Closed(reason)) => {
                info!("{url} closed subscription {sub_id}: {reason}");
                return;
            }
            None => return,
        };

        if !delivered {
            return;
        }
    }
}
