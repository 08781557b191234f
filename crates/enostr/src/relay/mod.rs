use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::{Filter, Note, Result};

pub mod dedup;
pub mod memory;
pub mod message;
pub mod pool;
pub mod websocket;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RelayStatus {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// What a single relay subscription yields.
#[derive(Debug, Clone)]
pub enum SubEvent {
    Event(Note),
    /// The relay has sent everything it had stored for this filter.
    Eose,
    /// The relay ended the subscription on its side.
    Closed(String),
}

/// Per-subscription stream of notes. Dropping it ends interest in the
/// subscription; closing the connection ends the stream.
pub type EventStream = mpsc::UnboundedReceiver<SubEvent>;

/// Opens connections to relays. The pool and profile lookups only ever see
/// relays through this trait, so tests can swap the network out.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayConnection>>;
}

/// An open relay connection. Implementations must release the underlying
/// socket when dropped, so every exit path closes it even if [`close`] was
/// never awaited.
///
/// [`close`]: RelayConnection::close
#[async_trait]
pub trait RelayConnection: Send {
    fn url(&self) -> &str;

    async fn subscribe(&mut self, sub_id: &str, filter: &Filter) -> Result<EventStream>;

    async fn close(&mut self);
}

/// standardize the format (ie, trailing slashes)
pub fn canonicalize_url(url: &str) -> String {
    match Url::parse(url.trim()) {
        Ok(parsed_url) => parsed_url.to_string(),
        Err(_) => url.trim().to_owned(),
    }
}

/// Fresh subscription ids, unique per connection.
pub fn new_sub_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
