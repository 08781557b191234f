use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::{body::Bytes, header, Request, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};
use url::Url;

const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("hyper error: {0}")]
    Hyper(Box<dyn std::error::Error + Send + Sync>),

    #[error("missing host in url")]
    Host,

    #[error("invalid uri")]
    Uri,

    #[error("body too large")]
    BodyTooLarge,

    #[error("too many redirect responses")]
    TooManyRedirects,

    #[error("redirect response missing location header")]
    MissingRedirectLocation,

    #[error("invalid redirect location header")]
    InvalidRedirectLocation,
}

/// GET-only HTTP, which is all LNURL-pay needs. Implementations return
/// non-2xx responses as values; only transport failures are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, HttpError>;
}

/// Pick ring as the process-wide rustls provider. Call once at startup,
/// before any TLS connection is made.
pub fn install_crypto() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

type HttpsClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Empty<Bytes>>;

/// hyper client over rustls, following a bounded number of redirects.
pub struct HyperHttpClient {
    client: HttpsClient,
}

impl HyperHttpClient {
    pub fn new() -> Self {
        let https = {
            let builder = match HttpsConnectorBuilder::new().with_native_roots() {
                Ok(builder) => builder,
                Err(err) => {
                    warn!(
                        "Failed to load native root certificates ({err}). Falling back to WebPKI store."
                    );
                    HttpsConnectorBuilder::new().with_webpki_roots()
                }
            };

            builder.https_or_http().enable_http1().build()
        };

        Self {
            client: Client::builder(TokioExecutor::new()).build(https),
        }
    }
}

impl Default for HyperHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse, HttpError> {
        let mut current_uri: Uri = url.as_str().parse().map_err(|_| HttpError::Uri)?;
        let mut redirects = 0;

        let res = loop {
            let authority = current_uri.authority().ok_or(HttpError::Host)?.clone();

            let req = Request::builder()
                .uri(current_uri.clone())
                .header(header::HOST, authority.as_str())
                .header(header::ACCEPT, "application/json")
                .body(Empty::<Bytes>::new())
                .map_err(|e| HttpError::Hyper(Box::new(e)))?;

            let res = self
                .client
                .request(req)
                .await
                .map_err(|e| HttpError::Hyper(Box::new(e)))?;

            if !res.status().is_redirection() {
                break res;
            }

            if redirects >= MAX_REDIRECTS {
                return Err(HttpError::TooManyRedirects);
            }

            let location = res
                .headers()
                .get(header::LOCATION)
                .ok_or(HttpError::MissingRedirectLocation)?
                .to_str()
                .map_err(|_| HttpError::InvalidRedirectLocation)?
                .to_string();

            res.into_body()
                .collect()
                .await
                .map_err(|e| HttpError::Hyper(Box::new(e)))?;

            current_uri = resolve_redirect(&current_uri, &location)?;
            debug!("following redirect to {current_uri}");
            redirects += 1;
        };

        let status = res.status().as_u16();

        let content_length = res
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|s| s.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());

        if let Some(len) = content_length {
            if len > MAX_BODY_BYTES {
                return Err(HttpError::BodyTooLarge);
            }
        }

        let mut body = res.into_body();
        let mut bytes = Vec::with_capacity(content_length.unwrap_or(0).min(MAX_BODY_BYTES));

        while let Some(frame_result) = body.frame().await {
            let frame = frame_result.map_err(|e| HttpError::Hyper(Box::new(e)))?;
            let Ok(chunk) = frame.into_data() else {
                continue;
            };

            if bytes.len() + chunk.len() > MAX_BODY_BYTES {
                return Err(HttpError::BodyTooLarge);
            }

            bytes.extend_from_slice(&chunk);
        }

        Ok(HttpResponse {
            status,
            body: bytes,
        })
    }
}

fn resolve_redirect(current: &Uri, location: &str) -> Result<Uri, HttpError> {
    if let Ok(uri) = location.parse::<Uri>() {
        if uri.scheme().is_some() {
            return Ok(uri);
        }
    }

    let base = Url::parse(&current.to_string()).map_err(|_| HttpError::Uri)?;
    let joined = base
        .join(location)
        .map_err(|_| HttpError::InvalidRedirectLocation)?;

    joined
        .as_str()
        .parse::<Uri>()
        .map_err(|_| HttpError::InvalidRedirectLocation)
}
