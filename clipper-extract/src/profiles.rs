//! Direct-fetch fingerprints, one per strategy index, in escalation order.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProfile {
    /// 1-based strategy index.
    pub index: usize,
    pub name: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
    /// Certificate verification for the generic download.
    pub verify_tls: bool,
    /// Try an unverified raw GET (which must answer 200) before the generic download.
    pub insecure_prefetch: bool,
}

impl FetchProfile {
    pub fn header_map(&self) -> HeaderMap {
        self.headers
            .iter()
            .filter_map(|(k, v)| {
                Some((
                    HeaderName::from_bytes(k.as_bytes()).ok()?,
                    HeaderValue::from_str(v).ok()?,
                ))
            })
            .collect()
    }

    pub fn user_agent(&self) -> Option<&'static str> {
        self.header("user-agent")
    }

    pub fn referer(&self) -> Option<&'static str> {
        self.header("referer")
    }

    fn header(&self, name: &str) -> Option<&'static str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
    }
}

const LINUX_CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";
const ACCEPT_AVIF: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

pub const PROFILES: &[FetchProfile] = &[
    FetchProfile {
        index: 1,
        name: "linux-chrome",
        headers: &[
            ("user-agent", LINUX_CHROME_UA),
            ("accept", ACCEPT_AVIF),
            ("accept-language", "en-US,en;q=0.9"),
        ],
        verify_tls: true,
        insecure_prefetch: true,
    },
    FetchProfile {
        index: 2,
        name: "macos-chrome",
        headers: &[
            (
                "user-agent",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
            ),
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
            ),
            ("accept-language", "*"),
            ("dnt", "1"),
            ("upgrade-insecure-requests", "1"),
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-site", "none"),
            ("sec-fetch-user", "?1"),
            ("cache-control", "max-age=0"),
        ],
        verify_tls: true,
        insecure_prefetch: false,
    },
    FetchProfile {
        index: 3,
        name: "windows-chrome",
        headers: &[
            (
                "user-agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            ),
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("accept-language", "*"),
            ("dnt", "1"),
            ("upgrade-insecure-requests", "1"),
        ],
        verify_tls: true,
        insecure_prefetch: false,
    },
    FetchProfile {
        index: 4,
        name: "iphone-safari-google",
        headers: &[
            (
                "user-agent",
                "Mozilla/5.0 (iPhone; CPU iPhone OS 16_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1",
            ),
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
            ("accept-language", "*"),
            ("referer", "https://www.google.com/"),
            ("upgrade-insecure-requests", "1"),
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-site", "cross-site"),
            ("sec-fetch-user", "?1"),
        ],
        verify_tls: true,
        insecure_prefetch: false,
    },
    FetchProfile {
        index: 5,
        name: "linux-chrome-bing",
        headers: &[
            ("user-agent", LINUX_CHROME_UA),
            ("accept", ACCEPT_AVIF),
            ("accept-language", "*"),
            ("referer", "https://www.bing.com/"),
            ("upgrade-insecure-requests", "1"),
            ("pragma", "no-cache"),
        ],
        verify_tls: true,
        insecure_prefetch: false,
    },
];

/// Profile bound to a 1-based strategy index.
pub fn profile(index: usize) -> Option<&'static FetchProfile> {
    index.checked_sub(1).and_then(|i| PROFILES.get(i))
}

/// Highest strategy index a pass may reach.
pub fn last_index(max_retries: usize) -> usize {
    max_retries.min(PROFILES.len())
}
