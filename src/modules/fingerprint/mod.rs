//! Browser-like client fingerprints.
//!
//! Supplies coherent header bundles (user-agent plus the client-hint family
//! a real browser sends alongside it) so outbound traffic does not read as a
//! generic scripting client. The TLS-level signature is the transport's
//! responsibility; a profile only parameterizes it.

use rand::seq::SliceRandom;
use rand::thread_rng;

/// One coherent browser identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProfile {
    pub user_agent: &'static str,
    pub accept: &'static str,
    pub accept_language: &'static str,
    pub sec_ch_ua: &'static str,
    pub sec_ch_ua_platform: &'static str,
    pub sec_ch_ua_mobile: &'static str,
}

impl ClientProfile {
    /// Header pairs applied as transport defaults for every request made
    /// with this profile.
    pub fn default_headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("user-agent", self.user_agent),
            ("accept", self.accept),
            ("accept-language", self.accept_language),
            ("sec-ch-ua", self.sec_ch_ua),
            ("sec-ch-ua-platform", self.sec_ch_ua_platform),
            ("sec-ch-ua-mobile", self.sec_ch_ua_mobile),
        ]
    }
}

const DESKTOP_PROFILES: &[ClientProfile] = &[
    ClientProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
        sec_ch_ua_platform: "\"Windows\"",
        sec_ch_ua_mobile: "?0",
    },
    ClientProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.9",
        sec_ch_ua: "\"Chromium\";v=\"130\", \"Google Chrome\";v=\"130\", \"Not?A_Brand\";v=\"99\"",
        sec_ch_ua_platform: "\"macOS\"",
        sec_ch_ua_mobile: "?0",
    },
    ClientProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        accept_language: "en-US,en;q=0.8",
        sec_ch_ua: "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
        sec_ch_ua_platform: "\"Linux\"",
        sec_ch_ua_mobile: "?0",
    },
];

const MOBILE_PROFILES: &[ClientProfile] = &[ClientProfile {
    user_agent: "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    accept: "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    accept_language: "en-US,en;q=0.9",
    sec_ch_ua: "\"Google Chrome\";v=\"131\", \"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"",
    sec_ch_ua_platform: "\"Android\"",
    sec_ch_ua_mobile: "?1",
}];

/// Pick a desktop profile at random. One profile is chosen per transport
/// construction and kept for its lifetime; rotating per-request would be a
/// stronger bot signal than keeping a consistent identity.
pub fn random_desktop_profile() -> ClientProfile {
    DESKTOP_PROFILES
        .choose(&mut thread_rng())
        .cloned()
        .unwrap_or_else(|| DESKTOP_PROFILES[0].clone())
}

pub fn random_mobile_profile() -> ClientProfile {
    MOBILE_PROFILES
        .choose(&mut thread_rng())
        .cloned()
        .unwrap_or_else(|| MOBILE_PROFILES[0].clone())
}
