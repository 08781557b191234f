use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ewebsock::{Options, WsEvent, WsMessage, WsReceiver, WsSender};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::RelayMessage;
use super::{EventStream, RelayConnection, RelayConnector, SubEvent};
use crate::{ClientMessage, Error, Filter, Result};

type Subscriptions = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<SubEvent>>>>;
type SharedSender = Arc<Mutex<Option<WsSender>>>;

/// Connects to real relays over websockets.
#[derive(Debug, Default, Clone)]
pub struct WebsocketConnector {}

impl WebsocketConnector {
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl RelayConnector for WebsocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn RelayConnection>> {
        let notify = Arc::new(Notify::new());
        let wakeup = {
            let notify = notify.clone();
            move || notify.notify_one()
        };

        let (sender, mut receiver) =
            ewebsock::connect_with_wakeup(url, Options::default(), wakeup)
                .map_err(|e| Error::connection(url, e))?;

        // nothing is sent until the socket reports open
        loop {
            match receiver.try_recv() {
                Some(WsEvent::Opened) => break,
                Some(WsEvent::Error(err)) => return Err(Error::connection(url, err)),
                Some(WsEvent::Closed) => return Err(Error::connection(url, "closed during connect")),
                Some(WsEvent::Message(_)) => continue,
                None => notify.notified().await,
            }
        }

        info!("connected to {url}");

        let subs: Subscriptions = Default::default();
        let sender: SharedSender = Arc::new(Mutex::new(Some(sender)));
        let reader = tokio::spawn(read_loop(
            url.to_owned(),
            receiver,
            notify,
            subs.clone(),
            sender.clone(),
        ));

        Ok(Box::new(WebsocketRelay {
            url: url.to_owned(),
            sender,
            subs,
            reader,
        }))
    }
}

pub struct WebsocketRelay {
    url: String,
    sender: SharedSender,
    subs: Subscriptions,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for WebsocketRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebsocketRelay")
            .field("url", &self.url)
            .finish()
    }
}

impl WebsocketRelay {
    fn send(&self, msg: &ClientMessage) -> Result<()> {
        let json = msg.to_json()?;
        debug!("sending {} to {}", json, self.url);

        let mut guard = self
            .sender
            .lock()
            .map_err(|_| Error::Generic("relay sender lock poisoned".to_owned()))?;

        let Some(sender) = guard.as_mut() else {
            return Err(Error::RelayClosed(self.url.clone()));
        };

        sender.send(WsMessage::Text(json));
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Ok(mut guard) = self.sender.lock() {
            // dropping the sender closes the socket
            guard.take();
        }
        if let Ok(mut subs) = self.subs.lock() {
            subs.clear();
        }
        self.reader.abort();
    }
}

#[async_trait]
impl RelayConnection for WebsocketRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn subscribe(&mut self, sub_id: &str, filter: &Filter) -> Result<EventStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        if let Ok(mut subs) = self.subs.lock() {
            subs.insert(sub_id.to_owned(), tx);
        }

        info!("sending '{}' subscription to {}: {:?}", sub_id, self.url, filter);
        self.send(&ClientMessage::req(sub_id.to_owned(), vec![filter.clone()]))?;

        Ok(rx)
    }

    async fn close(&mut self) {
        let sub_ids: Vec<String> = match self.subs.lock() {
            Ok(subs) => subs.keys().cloned().collect(),
            Err(_) => vec![],
        };

        for sub_id in sub_ids {
            if let Err(err) = self.send(&ClientMessage::close(sub_id)) {
                debug!("could not send CLOSE to {}: {err}", self.url);
            }
        }

        self.shutdown();
        debug!("closed connection to {}", self.url);
    }
}

impl Drop for WebsocketRelay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn read_loop(
    url: String,
    mut receiver: WsReceiver,
    notify: Arc<Notify>,
    subs: Subscriptions,
    sender: SharedSender,
) {
    loop {
        while let Some(event) = receiver.try_recv() {
            match event {
                WsEvent::Opened => {}
                WsEvent::Message(WsMessage::Text(text)) => handle_text(&url, &text, &subs),
                WsEvent::Message(WsMessage::Ping(bs)) => {
                    debug!("pong {}", &url);
                    if let Ok(mut guard) = sender.lock() {
                        if let Some(sender) = guard.as_mut() {
                            sender.send(WsMessage::Pong(bs));
                        }
                    }
                }
                WsEvent::Message(_) => {}
                WsEvent::Error(err) => {
                    error!("relay {url}: {err}");
                    end_all(&subs, err);
                    return;
                }
                WsEvent::Closed => {
                    info!("relay {url} closed the connection");
                    end_all(&subs, "connection closed".to_owned());
                    return;
                }
            }
        }

        notify.notified().await;
    }
}

fn handle_text(url: &str, text: &str, subs: &Subscriptions) {
    let msg = match RelayMessage::from_json(text) {
        Ok(msg) => msg,
        Err(err) => {
            warn!("unparseable message from {url}: {err}");
            return;
        }
    };

    let Ok(mut subs) = subs.lock() else {
        return;
    };

    match msg {
        RelayMessage::Event { sub_id, note } => match subs.get(&sub_id) {
            Some(tx) => {
                let _ = tx.send(SubEvent::Event(note));
            }
            None => debug!("{url}: event for unknown subscription '{sub_id}'"),
        },
        RelayMessage::Eose(sub_id) => {
            if let Some(tx) = subs.get(&sub_id) {
                let _ = tx.send(SubEvent::Eose);
            }
        }
        RelayMessage::Closed { sub_id, reason } => {
            if let Some(tx) = subs.remove(&sub_id) {
                let _ = tx.send(SubEvent::Closed(reason));
            }
        }
        RelayMessage::Notice(notice) => info!("notice from {url}: {notice}"),
        RelayMessage::Ok {
            event_id, accepted, ..
        } => debug!("{url}: OK {event_id} {accepted}"),
    }
}

fn end_all(subs: &Subscriptions, reason: String) {
    if let Ok(mut subs) = subs.lock() {
        for (_, tx) in subs.drain() {
            let _ = tx.send(SubEvent::Closed(reason.clone()));
        }
    }
}
