use serde::{Deserialize, Serialize};

/// User agent of the fixed desktop fingerprint used for rendering.
pub const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Snapshot of user agent, viewport, and locale characteristics.
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
}

impl UserAgentProfile {
    /// Windows desktop profile; every render session looks the same.
    pub fn desktop(user_agent: &str, viewport: (u32, u32)) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            viewport,
            platform: platform_for(user_agent).to_string(),
            languages: vec!["en-US".to_string(), "en".to_string()],
        }
    }
}

fn platform_for(user_agent: &str) -> &'static str {
    if user_agent.contains("Macintosh") {
        "MacIntel"
    } else if user_agent.contains("Linux") {
        "Linux x86_64"
    } else {
        "Win32"
    }
}
