//! URL conditioning applied before any fetch: shortener expansion and
//! tracking-parameter removal.

use clipper_http::{PageFetcher, RequestOpts};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use tokio::time::sleep;
use url::{Url, form_urlencoded};

/// Hosts that answer with redirects hiding the real destination.
pub const SHORTENER_HOSTS: &[&str] = &[
    "flip.it",
    "bit.ly",
    "t.co",
    "tinyurl.com",
    "goo.gl",
    "ow.ly",
    "short.link",
    "buff.ly",
    "is.gd",
    "v.gd",
    "cutt.ly",
    "rebrand.ly",
    "tiny.cc",
];

const TRACKING_PREFIX: &str = "utm_";

const RESOLVER_HEADERS: &[(&str, &str)] = &[
    (
        "user-agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    ),
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("accept-language", "en-US,en;q=0.9,fr;q=0.8"),
    ("dnt", "1"),
    ("upgrade-insecure-requests", "1"),
];

/// How far and how fast shortener redirects are chased.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    pub max_hops: usize,
    pub hop_delay: Duration,
    pub timeout: Duration,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            max_hops: 10,
            hop_delay: Duration::from_millis(500),
            timeout: Duration::from_secs(10),
        }
    }
}

/// True when the host is a known link shortener or a subdomain of one.
pub fn is_shortener(url: &str) -> bool {
    let Some(host) = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    SHORTENER_HOSTS
        .iter()
        .any(|s| host == *s || host.strip_suffix(s).is_some_and(|rest| rest.ends_with('.')))
}

fn resolver_headers() -> HeaderMap {
    RESOLVER_HEADERS
        .iter()
        .filter_map(|(k, v)| {
            Some((
                HeaderName::from_bytes(k.as_bytes()).ok()?,
                HeaderValue::from_str(v).ok()?,
            ))
        })
        .collect()
}

/// Follow `Location` headers with HEAD requests and return the last URL seen.
///
/// Stops on a non-redirect status, a missing or unusable `Location`, or after
/// `policy.max_hops` requests. Any transport error yields `url` unchanged.
pub async fn resolve_redirects(
    fetcher: &dyn PageFetcher,
    url: &str,
    policy: &RedirectPolicy,
) -> String {
    let mut current = url.to_string();
    for hop in 0..policy.max_hops {
        let opts = RequestOpts::default()
            .with_headers(resolver_headers())
            .with_timeout(policy.timeout)
            .no_redirects();
        let resp = match fetcher.head(&current, opts).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(url=%url, hop, error=%e, "normalize.resolve.failed");
                return url.to_string();
            }
        };
        if !resp.is_redirect() {
            break;
        }
        let Some(next) = resp.location.as_deref().and_then(|loc| {
            Url::parse(&current)
                .and_then(|base| base.join(loc))
                .ok()
                .map(String::from)
        }) else {
            break;
        };
        tracing::debug!(from=%current, to=%next, status=%resp.status, hop, "normalize.resolve.hop");
        current = next;
        if !policy.hop_delay.is_zero() {
            sleep(policy.hop_delay).await;
        }
    }
    current
}

/// Drop `utm_*` query parameters (case-insensitive), keeping the order of
/// everything else. A fragment shaped like a query string gets the same
/// treatment. Unparseable input is returned unchanged.
pub fn clean(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if let Some(query) = parsed.query() {
        let kept = strip_tracking(query);
        parsed.set_query((!kept.is_empty()).then_some(kept.as_str()));
    }
    if let Some(fragment) = parsed.fragment() {
        if fragment.contains('=') || fragment.contains('&') {
            let kept = strip_tracking(fragment);
            parsed.set_fragment((!kept.is_empty()).then_some(kept.as_str()));
        }
    }
    parsed.into()
}

fn strip_tracking(pairs: &str) -> String {
    pairs
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let raw_key = pair.split('=').next().unwrap_or_default();
            // Compare the decoded key so `utm%5Fsource` is caught too.
            let key = form_urlencoded::parse(raw_key.as_bytes())
                .next()
                .map(|(k, _)| k.to_lowercase())
                .unwrap_or_default();
            !key.starts_with(TRACKING_PREFIX)
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Expand shorteners, then strip tracking parameters.
pub async fn normalize(fetcher: &dyn PageFetcher, url: &str, policy: &RedirectPolicy) -> String {
    let target = if is_shortener(url) {
        resolve_redirects(fetcher, url, policy).await
    } else {
        url.to_string()
    };
    clean(&target)
}
