use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use enostr::{NoteId, RelayConnector, RelayPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Invoice, LnurlNegotiator, PaymentEndpoint, UnsignedZapRequest, ZapTarget};
use crate::http::HttpClient;
use crate::profile::ProfileResolver;
use crate::{PaymentReceipt, Signer, Timeouts, Wallet, ZapError};

/// Where a zap attempt is. `Settled` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZapState {
    Idle,
    ResolvingProfile,
    BuildingRequest { endpoint: PaymentEndpoint },
    NegotiatingInvoice { request: NoteId },
    AwaitingPayment { invoice: Invoice },
    Settled(PaymentReceipt),
    Failed(ZapError),
}

impl ZapState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ZapState::Settled(_) | ZapState::Failed(_))
    }
}

/// Asks the user how much to zap.
#[async_trait]
pub trait AmountPrompt: Send + Sync {
    /// Raw answer in sats, or `None` if the user backed out.
    async fn ask_amount(&self, target: &ZapTarget, default_sats: u64) -> Option<String>;
}

/// Receives every state change of every attempt, plus the loading
/// indicator for the zap control of the note being zapped.
pub trait ZapObserver: Send + Sync {
    fn state_changed(&self, target: &ZapTarget, state: &ZapState);

    fn loading(&self, target: &ZapTarget, loading: bool);
}

pub struct NoopObserver;

impl ZapObserver for NoopObserver {
    fn state_changed(&self, _target: &ZapTarget, _state: &ZapState) {}

    fn loading(&self, _target: &ZapTarget, _loading: bool) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZapperTimeouts {
    pub profile_probe: Duration,
    pub http: Duration,
    pub signer: Duration,
    pub payment: Duration,
}

impl From<&Timeouts> for ZapperTimeouts {
    fn from(t: &Timeouts) -> Self {
        ZapperTimeouts {
            profile_probe: t.profile_probe(),
            http: t.http(),
            signer: t.signer(),
            payment: t.payment(),
        }
    }
}

impl Default for ZapperTimeouts {
    fn default() -> Self {
        (&Timeouts::default()).into()
    }
}

/// One click on one note, from `Idle` to a terminal state.
#[derive(Debug, Clone)]
pub struct ZapAttempt {
    target: ZapTarget,
    state: ZapState,
    history: Vec<ZapState>,
}

impl ZapAttempt {
    fn new(target: ZapTarget) -> Self {
        ZapAttempt {
            target,
            state: ZapState::Idle,
            history: vec![ZapState::Idle],
        }
    }

    pub fn target(&self) -> &ZapTarget {
        &self.target
    }

    pub fn state(&self) -> &ZapState {
        &self.state
    }

    /// Every state the attempt went through, `Idle` first.
    pub fn history(&self) -> &[ZapState] {
        &self.history
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.state, ZapState::Settled(_))
    }

    pub fn error(&self) -> Option<&ZapError> {
        match &self.state {
            ZapState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs zap attempts: profile lookup, zap request, invoice, payment, in
/// that order, stopping at the first failure. Signing and payment
/// capabilities are handed in; without them every attempt fails up front.
pub struct Zapper {
    connector: Arc<dyn RelayConnector>,
    relays: Vec<String>,
    http: Arc<dyn HttpClient>,
    prompt: Arc<dyn AmountPrompt>,
    signer: Option<Arc<dyn Signer>>,
    wallet: Option<Arc<dyn Wallet>>,
    observer: Arc<dyn ZapObserver>,
    timeouts: ZapperTimeouts,
    default_zap_sats: u64,
    in_flight: Arc<Mutex<hashbrown::HashSet<NoteId>>>,
}

impl Zapper {
    pub fn new(pool: &RelayPool, http: Arc<dyn HttpClient>, prompt: Arc<dyn AmountPrompt>) -> Self {
        Zapper {
            connector: pool.connector(),
            relays: pool.urls().to_vec(),
            http,
            prompt,
            signer: None,
            wallet: None,
            observer: Arc::new(NoopObserver),
            timeouts: ZapperTimeouts::default(),
            default_zap_sats: 1000,
            in_flight: Arc::new(Mutex::new(hashbrown::HashSet::new())),
        }
    }

    pub fn signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn wallet(mut self, wallet: Arc<dyn Wallet>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ZapObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn timeouts(mut self, timeouts: ZapperTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn default_zap_sats(mut self, sats: u64) -> Self {
        self.default_zap_sats = sats;
        self
    }

    /// Whether the zap control for `note_id` should be disabled.
    pub fn is_in_flight(&self, note_id: &NoteId) -> bool {
        lock(&self.in_flight).contains(note_id)
    }

    /// Run one attempt to completion. Cancelling `cancel` fails the attempt
    /// with [`ZapError::Cancelled`] and drops any relay connection it holds,
    /// unless the wallet has already been asked to pay.
    pub async fn zap(&self, target: ZapTarget, comment: &str, cancel: CancellationToken) -> ZapAttempt {
        let mut attempt = ZapAttempt::new(target);

        let Some(_in_flight) = InFlight::acquire(&self.in_flight, target.note_id) else {
            self.transition(&mut attempt, ZapState::Failed(ZapError::AlreadyInFlight));
            return attempt;
        };

        let (signer, wallet) = match (&self.signer, &self.wallet) {
            (Some(signer), Some(wallet)) => (signer.clone(), wallet.clone()),
            (None, _) => {
                let err = ZapError::CapabilityUnavailable("nostr signer".to_owned());
                self.transition(&mut attempt, ZapState::Failed(err));
                return attempt;
            }
            (_, None) => {
                let err = ZapError::CapabilityUnavailable("lightning wallet".to_owned());
                self.transition(&mut attempt, ZapState::Failed(err));
                return attempt;
            }
        };

        let _loading = LoadingGuard::new(self.observer.clone(), target);

        let end = match self
            .run(&mut attempt, signer.as_ref(), wallet.as_ref(), comment, &cancel)
            .await
        {
            Ok(receipt) => ZapState::Settled(receipt),
            Err(err) => ZapState::Failed(err),
        };
        self.transition(&mut attempt, end);

        attempt
    }

    async fn run(
        &self,
        attempt: &mut ZapAttempt,
        signer: &dyn Signer,
        wallet: &dyn Wallet,
        comment: &str,
        cancel: &CancellationToken,
    ) -> Result<PaymentReceipt, ZapError> {
        let target = attempt.target;

        cancelable(cancel, bounded(self.timeouts.payment, "wallet", wallet.enable())).await?;
        let sender =
            cancelable(cancel, bounded(self.timeouts.signer, "signer", signer.public_key())).await?;

        self.transition(attempt, ZapState::ResolvingProfile);
        let resolver = ProfileResolver::new(
            self.connector.clone(),
            self.relays.clone(),
            self.timeouts.profile_probe,
        );
        let endpoint = cancelable(cancel, resolver.resolve(&target.author)).await?;

        self.transition(
            attempt,
            ZapState::BuildingRequest {
                endpoint: endpoint.clone(),
            },
        );
        let answer = cancelable(cancel, async {
            self.prompt
                .ask_amount(&target, self.default_zap_sats)
                .await
                .ok_or(ZapError::Cancelled)
        })
        .await?;
        let sats = parse_amount(&answer)?;

        let request = UnsignedZapRequest::new(&target, sender, sats, self.relays.clone(), &endpoint)?
            .comment(comment);
        let signed = cancelable(
            cancel,
            bounded(self.timeouts.signer, "signer", request.sign(Some(signer))),
        )
        .await?;

        self.transition(
            attempt,
            ZapState::NegotiatingInvoice {
                request: signed.id(),
            },
        );
        let negotiator = LnurlNegotiator::new(self.http.clone(), self.timeouts.http);
        let invoice = cancelable(cancel, negotiator.negotiate(&endpoint, &signed)).await?;

        self.transition(
            attempt,
            ZapState::AwaitingPayment {
                invoice: invoice.clone(),
            },
        );

        // no cancellation from here on, the payment may already be in flight
        bounded(self.timeouts.payment, "payment", wallet.pay(&invoice)).await
    }

    fn transition(&self, attempt: &mut ZapAttempt, state: ZapState) {
        let note = attempt.target.note_id;
        match &state {
            ZapState::Failed(err) => warn!("zap on {note} failed: {err}"),
            ZapState::Settled(_) => info!("zap on {note} settled"),
            state => debug!("zap on {note}: {:?}", state),
        }

        self.observer.state_changed(&attempt.target, &state);
        attempt.history.push(state.clone());
        attempt.state = state;
    }
}

/// A blank answer counts as backing out.
fn parse_amount(answer: &str) -> Result<u64, ZapError> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(ZapError::Cancelled);
    }

    match answer.parse::<u64>() {
        Ok(0) => Err(ZapError::InvalidAmount("amount must be positive".to_owned())),
        Ok(sats) => Ok(sats),
        Err(_) => Err(ZapError::InvalidAmount(format!(
            "'{answer}' is not a whole number of sats"
        ))),
    }
}

async fn cancelable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ZapError>>,
) -> Result<T, ZapError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ZapError::Cancelled),
        res = fut => res,
    }
}

async fn bounded<T>(
    duration: Duration,
    what: &str,
    fut: impl Future<Output = Result<T, ZapError>>,
) -> Result<T, ZapError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(res) => res,
        Err(_) => Err(ZapError::Timeout(what.to_owned())),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Marks a note as being zapped until dropped.
struct InFlight {
    set: Arc<Mutex<hashbrown::HashSet<NoteId>>>,
    note_id: NoteId,
}

impl InFlight {
    fn acquire(set: &Arc<Mutex<hashbrown::HashSet<NoteId>>>, note_id: NoteId) -> Option<Self> {
        if !lock(set).insert(note_id) {
            return None;
        }

        Some(InFlight {
            set: set.clone(),
            note_id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.note_id);
    }
}

/// Shows the loading indicator while alive and hides it exactly once.
struct LoadingGuard {
    observer: Arc<dyn ZapObserver>,
    target: ZapTarget,
}

impl LoadingGuard {
    fn new(observer: Arc<dyn ZapObserver>, target: ZapTarget) -> Self {
        observer.loading(&target, true);
        LoadingGuard { observer, target }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.observer.loading(&self.target, false);
    }
}
