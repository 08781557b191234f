use std::sync::Arc;
use std::time::Duration;

use enostr::Pubkey;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{PaymentEndpoint, SignedZapRequest};
use crate::http::{HttpClient, HttpResponse};
use crate::ZapError;

/// Invoice handed back by the recipient's callback. Opaque to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice(String);

impl Invoice {
    pub fn new(invoice: impl Into<String>) -> Self {
        Invoice(invoice.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Invoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw LNURL-pay metadata. Everything is optional here so that a missing
/// field maps onto the right error instead of a generic parse failure.
#[derive(Debug, Deserialize)]
struct LNUrlPayResponse {
    status: Option<String>,
    reason: Option<String>,

    callback: Option<String>,

    #[serde(rename = "minSendable")]
    min_sendable: Option<u64>,

    #[serde(rename = "maxSendable")]
    max_sendable: Option<u64>,

    #[serde(rename = "allowsNostr")]
    allows_nostr: Option<bool>,

    #[serde(rename = "nostrPubkey")]
    nostr_pubkey: Option<String>,

    #[serde(rename = "commentAllowed")]
    comment_allowed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LNInvoiceResponse {
    status: Option<String>,
    reason: Option<String>,

    #[serde(rename = "pr")]
    invoice: Option<String>,
}

/// Metadata that passed validation for a given amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LNUrlPayRequest {
    pub callback: Url,
    pub min_sendable: u64,
    pub max_sendable: u64,
    pub nostr_pubkey: Pubkey,
    pub comment_allowed: u64,
}

impl LNUrlPayRequest {
    /// Check a metadata response against an amount in millisats. The checks
    /// run in a fixed order: callback, amount range, zap support, then the
    /// endpoint's nostr key.
    fn validate(raw: LNUrlPayResponse, msats: u64) -> Result<Self, ZapError> {
        let callback = raw.callback.filter(|c| !c.trim().is_empty()).ok_or_else(|| {
            ZapError::InvalidEndpointResponse("no callback url".to_owned())
        })?;
        let callback = Url::parse(callback.trim()).map_err(|e| {
            ZapError::InvalidEndpointResponse(format!("invalid callback url '{callback}': {e}"))
        })?;

        let (Some(min_sendable), Some(max_sendable)) = (raw.min_sendable, raw.max_sendable) else {
            return Err(ZapError::InvalidEndpointResponse(
                "missing minSendable or maxSendable".to_owned(),
            ));
        };

        if msats < min_sendable || msats > max_sendable {
            return Err(ZapError::AmountOutOfRange {
                min_sats: min_sendable.div_ceil(1000),
                max_sats: max_sendable / 1000,
            });
        }

        if raw.allows_nostr != Some(true) {
            return Err(ZapError::AttributionUnsupported);
        }

        let nostr_pubkey = raw
            .nostr_pubkey
            .filter(|pk| !pk.trim().is_empty())
            .ok_or_else(|| ZapError::MalformedEndpointResponse("missing nostrPubkey".to_owned()))?;
        let nostr_pubkey = Pubkey::parse(&nostr_pubkey).map_err(|e| {
            ZapError::MalformedEndpointResponse(format!("invalid nostrPubkey '{nostr_pubkey}': {e}"))
        })?;

        Ok(LNUrlPayRequest {
            callback,
            min_sendable,
            max_sendable,
            nostr_pubkey,
            comment_allowed: raw.comment_allowed.unwrap_or(0),
        })
    }
}

/// Turns a payment endpoint and a signed zap request into an invoice:
/// one metadata fetch, then one callback fetch. Nothing is retried.
pub struct LnurlNegotiator {
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl LnurlNegotiator {
    pub fn new(http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub async fn negotiate(
        &self,
        endpoint: &PaymentEndpoint,
        request: &SignedZapRequest,
    ) -> Result<Invoice, ZapError> {
        let msats = request
            .amount_msats()
            .ok_or_else(|| ZapError::InvalidAmount("zap request has no amount".to_owned()))?;

        let pay_req = self.fetch_pay_req(endpoint, msats).await?;
        self.fetch_invoice(&pay_req, endpoint, request, msats).await
    }

    pub async fn fetch_pay_req(
        &self,
        endpoint: &PaymentEndpoint,
        msats: u64,
    ) -> Result<LNUrlPayRequest, ZapError> {
        let url = endpoint.metadata_url()?;
        info!("fetching lnurl metadata from {url}");

        let resp = self.get(&url, "lnurl metadata fetch").await?;
        if !resp.is_success() {
            return Err(ZapError::EndpointError(
                error_reason(&resp.body)
                    .unwrap_or_else(|| format!("bad http response: {}", resp.status)),
            ));
        }

        let raw: LNUrlPayResponse = serde_json::from_slice(&resp.body).map_err(|e| {
            ZapError::InvalidEndpointResponse(format!("metadata is not valid json: {e}"))
        })?;

        if is_error_status(raw.status.as_deref()) {
            return Err(ZapError::EndpointError(
                raw.reason.unwrap_or_else(|| "unknown error".to_owned()),
            ));
        }

        LNUrlPayRequest::validate(raw, msats)
    }

    pub async fn fetch_invoice(
        &self,
        pay_req: &LNUrlPayRequest,
        endpoint: &PaymentEndpoint,
        request: &SignedZapRequest,
        msats: u64,
    ) -> Result<Invoice, ZapError> {
        let url = endpoint_query_for_invoice(pay_req, endpoint, request, msats)?;
        debug!("requesting invoice from {}", pay_req.callback);

        let resp = self.get(&url, "invoice callback").await?;
        if !resp.is_success() {
            let body = resp.text();
            warn!("invoice callback failed ({}): {body}", resp.status);
            return Err(ZapError::CallbackFailed {
                status: resp.status,
                body,
            });
        }

        let parsed: LNInvoiceResponse = serde_json::from_slice(&resp.body).map_err(|e| {
            ZapError::InvalidEndpointResponse(format!("invoice response is not valid json: {e}"))
        })?;

        if is_error_status(parsed.status.as_deref()) {
            return Err(ZapError::EndpointError(
                parsed.reason.unwrap_or_else(|| "unknown error".to_owned()),
            ));
        }

        let invoice = parsed
            .invoice
            .map(|pr| pr.trim().to_owned())
            .filter(|pr| !pr.is_empty())
            .ok_or(ZapError::NoInvoiceInResponse)?;

        info!("got invoice for zap request {}", request.id());
        Ok(Invoice(invoice))
    }

    async fn get(&self, url: &Url, what: &str) -> Result<HttpResponse, ZapError> {
        match tokio::time::timeout(self.timeout, self.http.get(url)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(err)) => Err(ZapError::EndpointError(format!("{what} failed: {err}"))),
            Err(_) => Err(ZapError::Timeout(what.to_owned())),
        }
    }
}

fn endpoint_query_for_invoice(
    pay_req: &LNUrlPayRequest,
    endpoint: &PaymentEndpoint,
    request: &SignedZapRequest,
    msats: u64,
) -> Result<Url, ZapError> {
    let nostr = request.to_json()?;
    let lnurl = endpoint.lnurl()?;

    let mut url = pay_req.callback.clone();
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("amount", &msats.to_string())
            .append_pair("nostr", &nostr)
            .append_pair("lnurl", &lnurl);

        let comment = request.comment();
        if !comment.is_empty() {
            if comment.chars().count() as u64 <= pay_req.comment_allowed {
                query.append_pair("comment", comment);
            } else {
                warn!(
                    "endpoint allows {} comment chars, not sending comment",
                    pay_req.comment_allowed
                );
            }
        }
    }

    Ok(url)
}

fn is_error_status(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case("ERROR"))
}

fn error_reason(body: &[u8]) -> Option<String> {
    let resp: LNInvoiceResponse = serde_json::from_slice(body).ok()?;
    if is_error_status(resp.status.as_deref()) {
        resp.reason
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{signed_zap_request, FakeHttp, ALICE_CALLBACK, ALICE_LNURLP};
    use pretty_assertions::assert_eq;

    fn metadata(min: u64, max: u64, allows_nostr: bool) -> String {
        serde_json::json!({
            "callback": ALICE_CALLBACK,
            "minSendable": min,
            "maxSendable": max,
            "allowsNostr": allows_nostr,
            "nostrPubkey": "32e1827635450ebb3c5a7d12c1f8e7b2b514439ac10a67eef3d9fd9c5c68e245",
            "tag": "payRequest",
        })
        .to_string()
    }

    fn negotiator(http: &Arc<FakeHttp>) -> LnurlNegotiator {
        LnurlNegotiator::new(http.clone(), Duration::from_secs(5))
    }

    fn alice() -> PaymentEndpoint {
        PaymentEndpoint::parse("alice@example.com").unwrap()
    }

    #[tokio::test]
    async fn amount_below_min_is_out_of_range() {
        let http = Arc::new(FakeHttp::new());
        http.route(ALICE_LNURLP, 200, &metadata(1_000_000, 100_000_000, true));

        let err = negotiator(&http)
            .fetch_pay_req(&alice(), 500_000)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ZapError::AmountOutOfRange {
                min_sats: 1000,
                max_sats: 100_000
            }
        );
        assert_eq!(err.to_string(), "amount must be between 1000 and 100000 sats");

        let ok = negotiator(&http).fetch_pay_req(&alice(), 5_000_000).await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn endpoints_without_nostr_support_are_rejected() {
        let http = Arc::new(FakeHttp::new());
        http.route(ALICE_LNURLP, 200, &metadata(1000, 1_000_000_000, false));

        for msats in [1000, 1_000_000, 1_000_000_000] {
            let err = negotiator(&http).fetch_pay_req(&alice(), msats).await;
            assert_eq!(err, Err(ZapError::AttributionUnsupported));
        }
    }

    #[tokio::test]
    async fn missing_callback_is_checked_first() {
        let http = Arc::new(FakeHttp::new());
        http.route(
            ALICE_LNURLP,
            200,
            r#"{"minSendable":1000,"maxSendable":2000,"allowsNostr":false}"#,
        );

        let err = negotiator(&http).fetch_pay_req(&alice(), 1).await;
        assert!(matches!(err, Err(ZapError::InvalidEndpointResponse(_))));
    }

    #[tokio::test]
    async fn attribution_without_pubkey_is_malformed() {
        let http = Arc::new(FakeHttp::new());
        http.route(
            ALICE_LNURLP,
            200,
            &format!(
                r#"{{"callback":"{ALICE_CALLBACK}","minSendable":1000,"maxSendable":2000000,"allowsNostr":true}}"#
            ),
        );

        let err = negotiator(&http).fetch_pay_req(&alice(), 1_000_000).await;
        assert!(matches!(err, Err(ZapError::MalformedEndpointResponse(_))));
    }

    #[tokio::test]
    async fn lnurl_error_status_surfaces_the_reason() {
        let http = Arc::new(FakeHttp::new());
        http.route(
            ALICE_LNURLP,
            200,
            r#"{"status":"ERROR","reason":"user not found"}"#,
        );

        let err = negotiator(&http).fetch_pay_req(&alice(), 1_000_000).await;
        assert_eq!(err, Err(ZapError::EndpointError("user not found".to_owned())));
    }

    #[tokio::test]
    async fn callback_carries_amount_nostr_and_lnurl() {
        let http = Arc::new(FakeHttp::new());
        http.route(ALICE_LNURLP, 200, &metadata(1000, 1_000_000_000, true));
        http.route(ALICE_CALLBACK, 200, r#"{"pr":"lnbc10u1fake","routes":[]}"#);

        let request = signed_zap_request(1000, "").await;
        let invoice = negotiator(&http).negotiate(&alice(), &request).await.unwrap();
        assert_eq!(invoice.as_str(), "lnbc10u1fake");

        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].as_str(), ALICE_LNURLP);

        let params: std::collections::HashMap<String, String> =
            requests[1].query_pairs().into_owned().collect();
        assert_eq!(params["amount"], "1000000");
        assert_eq!(params["lnurl"], alice().lnurl().unwrap());
        assert!(!params.contains_key("comment"));

        let sent = enostr::Note::from_json(&params["nostr"]).unwrap();
        assert_eq!(sent.id, request.id());
        assert!(sent.verify().is_ok());
    }

    #[tokio::test]
    async fn comment_is_sent_only_when_allowed() {
        let http = Arc::new(FakeHttp::new());
        let mut meta: serde_json::Value =
            serde_json::from_str(&metadata(1000, 1_000_000_000, true)).unwrap();
        meta["commentAllowed"] = 10.into();
        http.route(ALICE_LNURLP, 200, &meta.to_string());
        http.route(ALICE_CALLBACK, 200, r#"{"pr":"lnbc1"}"#);

        let short = signed_zap_request(1000, "great post").await;
        negotiator(&http).negotiate(&alice(), &short).await.unwrap();
        let long = signed_zap_request(1000, "a much longer comment").await;
        negotiator(&http).negotiate(&alice(), &long).await.unwrap();

        let requests = http.requests();
        let comment = |url: &Url| {
            url.query_pairs()
                .find(|(k, _)| k == "comment")
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(comment(&requests[1]), Some("great post".to_owned()));
        assert_eq!(comment(&requests[3]), None);
    }

    #[tokio::test]
    async fn failing_callback_keeps_the_body() {
        let http = Arc::new(FakeHttp::new());
        http.route(ALICE_LNURLP, 200, &metadata(1000, 1_000_000_000, true));
        http.route(ALICE_CALLBACK, 500, "boom");

        let request = signed_zap_request(1000, "").await;
        let err = negotiator(&http).negotiate(&alice(), &request).await;
        assert_eq!(
            err,
            Err(ZapError::CallbackFailed {
                status: 500,
                body: "boom".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn callback_without_pr_has_no_invoice() {
        let http = Arc::new(FakeHttp::new());
        http.route(ALICE_LNURLP, 200, &metadata(1000, 1_000_000_000, true));
        http.route(ALICE_CALLBACK, 200, r#"{"routes":[]}"#);

        let request = signed_zap_request(1000, "").await;
        let err = negotiator(&http).negotiate(&alice(), &request).await;
        assert_eq!(err, Err(ZapError::NoInvoiceInResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_endpoints_time_out() {
        let http = Arc::new(FakeHttp::new());
        http.route(ALICE_LNURLP, 200, &metadata(1000, 1_000_000_000, true));
        http.delay(Duration::from_secs(60));

        let err = negotiator(&http).fetch_pay_req(&alice(), 1_000_000).await;
        assert_eq!(err, Err(ZapError::Timeout("lnurl metadata fetch".to_owned())));
    }
}
