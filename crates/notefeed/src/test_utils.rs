use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use enostr::relay::memory::{MemoryRelayNetwork, RelayBehavior};
use enostr::{FullKeypair, Note, KIND_METADATA, KIND_TEXT_NOTE};
use url::Url;

use crate::http::{HttpClient, HttpError, HttpResponse};
use crate::zaps::{
    AmountPrompt, Invoice, PaymentEndpoint, SignedZapRequest, UnsignedZapRequest, ZapObserver,
    ZapState, ZapTarget,
};
use crate::{LocalSigner, PaymentReceipt, Wallet, ZapError};

pub const ALICE_SECRET: [u8; 32] = [0xa1; 32];
pub const ALICE_LNURLP: &str = "https://example.com/.well-known/lnurlp/alice";
pub const ALICE_CALLBACK: &str = "https://example.com/cb";
pub const RELAYS: [&str; 2] = ["wss://relay-a.example/", "wss://relay-b.example/"];

pub fn metadata_note(keys: &FullKeypair, content: &str) -> Note {
    keys.sign_note(KIND_METADATA, 1_700_000_000, vec![], content)
        .unwrap()
}

pub fn text_note(keys: &FullKeypair, created_at: u64, content: &str) -> Note {
    keys.sign_note(KIND_TEXT_NOTE, created_at, vec![], content)
        .unwrap()
}

/// Alice's profile and one of her notes live on the first relay; the
/// second is empty. Returns the network and a target for her note.
pub fn alice_network() -> (MemoryRelayNetwork, ZapTarget) {
    let alice = FullKeypair::from_secret_bytes(ALICE_SECRET).unwrap();
    let note = text_note(&alice, 1_700_000_050, "zap me");

    let net = MemoryRelayNetwork::new();
    net.add_relay(
        RELAYS[0],
        RelayBehavior::Normal,
        vec![
            metadata_note(&alice, r#"{"name":"alice","lud16":"alice@example.com"}"#),
            note.clone(),
        ],
    );
    net.add_relay(RELAYS[1], RelayBehavior::Normal, vec![]);

    (net, ZapTarget::new(note.id, note.pubkey))
}

/// alice@example.com's lnurl-pay service.
pub fn alice_http() -> Arc<FakeHttp> {
    let alice = FullKeypair::from_secret_bytes(ALICE_SECRET).unwrap();
    let http = Arc::new(FakeHttp::new());
    let metadata = serde_json::json!({
        "callback": ALICE_CALLBACK,
        "minSendable": 1000,
        "maxSendable": 1_000_000_000u64,
        "allowsNostr": true,
        "nostrPubkey": alice.pubkey.hex(),
        "tag": "payRequest",
    });
    http.route(ALICE_LNURLP, 200, &metadata.to_string());
    http.route(ALICE_CALLBACK, 200, r#"{"pr":"lnbc1alicezap","routes":[]}"#);
    http
}

/// A zap request for a note of Alice's, signed by a throwaway sender.
pub async fn signed_zap_request(sats: u64, comment: &str) -> SignedZapRequest {
    let alice = FullKeypair::from_secret_bytes(ALICE_SECRET).unwrap();
    let note = text_note(&alice, 1_700_000_050, "zap me");
    let sender = FullKeypair::from_secret_bytes([3; 32]).unwrap();
    let endpoint = PaymentEndpoint::parse("alice@example.com").unwrap();
    let signer = LocalSigner::new(sender.clone());

    UnsignedZapRequest::new(
        &ZapTarget::new(note.id, note.pubkey),
        sender.pubkey,
        sats,
        RELAYS.iter().map(|r| r.to_string()).collect(),
        &endpoint,
    )
    .unwrap()
    .comment(comment)
    .sign(Some(&signer))
    .await
    .unwrap()
}

#[derive(Default)]
struct FakeHttpState {
    routes: HashMap<String, (u16, String)>,
    requests: Vec<Url>,
    delay: Option<Duration>,
}

/// Serves canned responses keyed on the url without its query. Anything
/// unrouted is a 404.
#[derive(Default)]
pub struct FakeHttp {
    state: Mutex<FakeHttpState>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.to_owned(), (status, body.to_owned()));
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn requests(&self) -> Vec<Url> {
        self.state.lock().unwrap().requests.clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttp {
    async fn get(&self, url: &Url) -> Result<HttpResponse, HttpError> {
        let mut key = url.clone();
        key.set_query(None);

        let (delay, response) = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(url.clone());
            let response = state
                .routes
                .get(key.as_str())
                .cloned()
                .unwrap_or((404, "not found".to_owned()));
            (state.delay, response)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(HttpResponse {
            status: response.0,
            body: response.1.into_bytes(),
        })
    }
}

/// Records paid invoices, or fails every payment with a fixed message.
#[derive(Default)]
pub struct FakeWallet {
    fail_with: Option<String>,
    paid: Mutex<Vec<String>>,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(msg: &str) -> Self {
        FakeWallet {
            fail_with: Some(msg.to_owned()),
            ..Self::default()
        }
    }

    pub fn paid(&self) -> Vec<String> {
        self.paid.lock().unwrap().clone()
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    async fn enable(&self) -> Result<(), ZapError> {
        Ok(())
    }

    async fn pay(&self, invoice: &Invoice) -> Result<PaymentReceipt, ZapError> {
        if let Some(msg) = &self.fail_with {
            return Err(ZapError::PaymentError(msg.clone()));
        }

        self.paid.lock().unwrap().push(invoice.as_str().to_owned());
        Ok(PaymentReceipt {
            preimage: "00".repeat(32),
        })
    }
}

/// Answers every amount prompt the same way.
pub struct ScriptedPrompt(Option<String>);

impl ScriptedPrompt {
    pub fn answer(answer: &str) -> Self {
        ScriptedPrompt(Some(answer.to_owned()))
    }

    pub fn cancel() -> Self {
        ScriptedPrompt(None)
    }
}

#[async_trait]
impl AmountPrompt for ScriptedPrompt {
    async fn ask_amount(&self, _target: &ZapTarget, _default_sats: u64) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<ZapState>>,
    loading: Mutex<Vec<bool>>,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<ZapState> {
        self.states.lock().unwrap().clone()
    }

    pub fn loading_events(&self) -> Vec<bool> {
        self.loading.lock().unwrap().clone()
    }
}

impl ZapObserver for RecordingObserver {
    fn state_changed(&self, _target: &ZapTarget, state: &ZapState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn loading(&self, _target: &ZapTarget, loading: bool) {
        self.loading.lock().unwrap().push(loading);
    }
}
