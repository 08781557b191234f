use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;

use crate::ZapError;

static HRP_LNURL: bech32::Hrp = bech32::Hrp::parse_unchecked("lnurl");
const LNURL_PREFIX: &str = "lnurl";

/// Where a recipient can be paid, taken from the `lud16` or `lud06` field
/// of their profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEndpoint {
    /// Lightning address, `name@domain`
    Address { name: String, domain: String },

    /// An already encoded lnurl, kept verbatim next to the url it decodes to
    Lnurl { encoded: String, url: Url },

    /// A plain metadata url
    Url(Url),
}

impl PaymentEndpoint {
    pub fn parse(descriptor: &str) -> Result<Self, ZapError> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(ZapError::InvalidPaymentEndpoint("empty descriptor".to_owned()));
        }

        let lower = descriptor.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(PaymentEndpoint::Url(parse_http_url(descriptor)?));
        }

        // neither bech32 nor base64url can hold an '@', so `lnurlfan@x.com`
        // is an address
        if lower.starts_with(LNURL_PREFIX) && !descriptor.contains('@') {
            return Ok(PaymentEndpoint::Lnurl {
                encoded: descriptor.to_owned(),
                url: decode_lnurl(descriptor)?,
            });
        }

        let Some((name, domain)) = descriptor.split_once('@') else {
            return Err(ZapError::InvalidPaymentEndpoint(format!(
                "'{descriptor}' is neither a lightning address nor an lnurl"
            )));
        };

        if name.is_empty() || domain.is_empty() || domain.contains(['/', '@', '?', '#']) {
            return Err(ZapError::InvalidPaymentEndpoint(format!(
                "invalid lightning address '{descriptor}'"
            )));
        }

        let endpoint = PaymentEndpoint::Address {
            name: name.to_owned(),
            domain: domain.to_ascii_lowercase(),
        };
        // make sure the address actually forms a url
        endpoint.metadata_url()?;

        Ok(endpoint)
    }

    /// The LNURL-pay metadata url this descriptor resolves to.
    pub fn metadata_url(&self) -> Result<Url, ZapError> {
        match self {
            PaymentEndpoint::Address { name, domain } => address_url(name, domain),
            PaymentEndpoint::Lnurl { url, .. } | PaymentEndpoint::Url(url) => Ok(url.clone()),
        }
    }

    /// Value for the `lnurl` tag and callback parameter. Encoded lnurls pass
    /// through untouched; everything else gets the canonical encoding of
    /// its metadata url.
    pub fn lnurl(&self) -> Result<String, ZapError> {
        match self {
            PaymentEndpoint::Lnurl { encoded, .. } => Ok(encoded.clone()),
            _ => Ok(encode_lnurl(&self.metadata_url()?)),
        }
    }
}

impl std::fmt::Display for PaymentEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentEndpoint::Address { name, domain } => write!(f, "{name}@{domain}"),
            PaymentEndpoint::Lnurl { encoded, .. } => write!(f, "{encoded}"),
            PaymentEndpoint::Url(url) => write!(f, "{url}"),
        }
    }
}

/// `https://<domain>/.well-known/lnurlp/<name>`, plain http for onion hosts
fn address_url(name: &str, domain: &str) -> Result<Url, ZapError> {
    let scheme = if domain.ends_with(".onion") {
        "http"
    } else {
        "https"
    };

    Url::parse(&format!("{scheme}://{domain}/.well-known/lnurlp/{name}")).map_err(|e| {
        ZapError::InvalidPaymentEndpoint(format!("bad lightning address {name}@{domain}: {e}"))
    })
}

fn parse_http_url(s: &str) -> Result<Url, ZapError> {
    let url = Url::parse(s)
        .map_err(|e| ZapError::InvalidPaymentEndpoint(format!("invalid url '{s}': {e}")))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ZapError::InvalidPaymentEndpoint(format!(
            "unsupported scheme '{scheme}'"
        ))),
    }
}

/// Deterministic `lnurl` + unpadded url-safe base64 of the url bytes.
pub fn encode_lnurl(url: &Url) -> String {
    format!("{LNURL_PREFIX}{}", URL_SAFE_NO_PAD.encode(url.as_str()))
}

/// Accepts both bech32 lnurls and the base64 form made by [`encode_lnurl`].
pub fn decode_lnurl(lnurl: &str) -> Result<Url, ZapError> {
    let bytes = match bech32::decode(lnurl) {
        Ok((hrp, data)) if hrp == HRP_LNURL => data,
        Ok((hrp, _)) => {
            return Err(ZapError::InvalidPaymentEndpoint(format!(
                "unexpected bech32 prefix '{hrp}'"
            )))
        }
        Err(_) => {
            let encoded = lnurl.strip_prefix(LNURL_PREFIX).ok_or_else(|| {
                ZapError::InvalidPaymentEndpoint(format!("'{lnurl}' is not an lnurl"))
            })?;

            URL_SAFE_NO_PAD
                .decode(encoded)
                .map_err(|e| ZapError::InvalidPaymentEndpoint(format!("bad lnurl: {e}")))?
        }
    };

    let url = String::from_utf8(bytes)
        .map_err(|e| ZapError::InvalidPaymentEndpoint(format!("lnurl is not utf8: {e}")))?;

    parse_http_url(&url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn address_round_trips_through_canonical_lnurl() {
        let endpoint = PaymentEndpoint::parse("alice@example.com").unwrap();
        let direct = Url::parse("https://example.com/.well-known/lnurlp/alice").unwrap();

        assert_eq!(endpoint.metadata_url().unwrap(), direct);

        let lnurl = endpoint.lnurl().unwrap();
        assert!(lnurl.starts_with("lnurl"));
        assert_eq!(decode_lnurl(&lnurl).unwrap(), direct);

        // same input, same encoding
        assert_eq!(
            PaymentEndpoint::parse("alice@example.com")
                .unwrap()
                .lnurl()
                .unwrap(),
            lnurl
        );
    }

    #[test]
    fn bech32_lnurl_passes_through() {
        let bech = "lnurl1dp68gurn8ghj7um9dej8xct5wvhxcmmv9uh8wetvdskkkmn0wahz7mrww4excup0df3r2dg3mj444";
        let endpoint = PaymentEndpoint::parse(bech).unwrap();

        assert_eq!(
            endpoint.metadata_url().unwrap().as_str(),
            "https://sendsats.lol/.well-known/lnurlp/jb55"
        );
        assert_eq!(endpoint.lnurl().unwrap(), bech);
        assert_eq!(
            PaymentEndpoint::parse("jb55@sendsats.lol")
                .unwrap()
                .metadata_url()
                .unwrap(),
            endpoint.metadata_url().unwrap()
        );
    }

    #[test]
    fn onion_addresses_use_http() {
        let endpoint = PaymentEndpoint::parse("bob@abcdef.onion").unwrap();
        assert_eq!(endpoint.metadata_url().unwrap().scheme(), "http");
    }

    #[test]
    fn raw_urls_are_accepted() {
        let endpoint = PaymentEndpoint::parse("https://pay.example.com/lnurlp/bob").unwrap();
        let lnurl = endpoint.lnurl().unwrap();
        assert_eq!(decode_lnurl(&lnurl).unwrap(), endpoint.metadata_url().unwrap());
    }

    #[test]
    fn address_names_may_start_with_lnurl() {
        let endpoint = PaymentEndpoint::parse("lnurlfan@example.com").unwrap();
        assert_eq!(
            endpoint,
            PaymentEndpoint::Address {
                name: "lnurlfan".to_owned(),
                domain: "example.com".to_owned(),
            }
        );
        assert_eq!(
            endpoint.metadata_url().unwrap().as_str(),
            "https://example.com/.well-known/lnurlp/lnurlfan"
        );

        let upper = PaymentEndpoint::parse("LNURLpay@Example.com").unwrap();
        assert_eq!(
            upper.metadata_url().unwrap().as_str(),
            "https://example.com/.well-known/lnurlp/LNURLpay"
        );
    }

    #[test]
    fn garbage_is_rejected() {
        for bad in [
            "",
            "   ",
            "alice",
            "@example.com",
            "alice@",
            "ftp://x.com",
            "lnurl!!",
            "lnurl@",
        ] {
            assert!(
                matches!(
                    PaymentEndpoint::parse(bad),
                    Err(ZapError::InvalidPaymentEndpoint(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }
}
