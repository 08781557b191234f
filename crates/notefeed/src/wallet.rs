use async_trait::async_trait;
use nwc::{
    nostr::nips::nip47::{NostrWalletConnectURI, PayInvoiceRequest},
    NWC,
};
use tracing::{info, warn};

use crate::zaps::Invoice;
use crate::{Error, ZapError};

/// Proof that an invoice was paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub preimage: String,
}

/// Something that can settle lightning invoices.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Make sure the wallet is reachable and willing to pay. Fails with
    /// [`ZapError::CapabilityUnavailable`] otherwise.
    async fn enable(&self) -> Result<(), ZapError>;

    async fn pay(&self, invoice: &Invoice) -> Result<PaymentReceipt, ZapError>;
}

/// Nostr Wallet Connect
pub struct NwcWallet {
    pub uri: String,
    wallet: NWC,
}

impl std::fmt::Debug for NwcWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "NwcWallet({})", self.uri)
    }
}

impl NwcWallet {
    pub fn new(uri: String) -> Result<Self, Error> {
        let nwc_uri = NostrWalletConnectURI::parse(uri.clone())
            .map_err(|e| Error::Config(format!("invalid wallet connect uri: {e}")))?;

        Ok(Self {
            uri,
            wallet: NWC::new(nwc_uri),
        })
    }
}

#[async_trait]
impl Wallet for NwcWallet {
    async fn enable(&self) -> Result<(), ZapError> {
        check_reachable(self.wallet.get_balance().await)
    }

    async fn pay(&self, invoice: &Invoice) -> Result<PaymentReceipt, ZapError> {
        let resp = self
            .wallet
            .pay_invoice(PayInvoiceRequest::new(invoice.as_str().to_owned()))
            .await
            .map_err(|e| ZapError::PaymentError(e.to_string()))?;

        Ok(PaymentReceipt {
            preimage: resp.preimage,
        })
    }
}

/// The balance call only proves the wallet answers. A connection may be
/// granted `pay_invoice` alone, so a wallet-side refusal still counts.
fn check_reachable(balance: Result<u64, nwc::Error>) -> Result<(), ZapError> {
    match balance {
        Ok(msats) => {
            info!("wallet connected, balance {msats} msats");
            Ok(())
        }
        Err(nwc::Error::NIP47(err)) => {
            warn!("wallet connected but would not report a balance: {err}");
            Ok(())
        }
        Err(err) => Err(ZapError::CapabilityUnavailable(format!("wallet ({err})"))),
    }
}
