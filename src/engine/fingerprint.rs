//! Fingerprint profiles for the stealth engine.
//!
//! A profile bundles a user agent, platform and language set, pinned to a
//! current Chrome major version. Profiles are chosen deterministically per
//! session id so one session keeps one identity, and applied through
//! `Emulation.setUserAgentOverride` plus a webdriver-flag evasion script.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;

/// Chrome major version the profiles are pinned to. Bump together with the
/// user-agent strings below.
pub const PINNED_CHROME_MAJOR: u32 = 131;

#[derive(Debug, Clone, Copy)]
pub struct FingerprintProfile {
    pub user_agent: &'static str,
    pub platform: &'static str,
    pub accept_language: &'static str,
}

pub const PROFILES: &[FingerprintProfile] = &[
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "Win32",
        accept_language: "en-US,en;q=0.9",
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "MacIntel",
        accept_language: "en-US,en;q=0.9",
    },
    FingerprintProfile {
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        platform: "Linux x86_64",
        accept_language: "en-US,en;q=0.8",
    },
];

/// Deterministic profile for a session: one session, one identity.
#[must_use]
pub fn profile_for_session(session_id: u64) -> &'static FingerprintProfile {
    &PROFILES[(session_id as usize) % PROFILES.len()]
}

const WEBDRIVER_EVASION: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Apply the profile to a page before navigation.
pub async fn apply(page: &Page, profile: &FingerprintProfile) -> Result<()> {
    let params = SetUserAgentOverrideParams::builder()
        .user_agent(profile.user_agent)
        .platform(profile.platform)
        .accept_language(profile.accept_language)
        .build()
        .map_err(|e| anyhow::anyhow!("building user agent override: {e}"))?;
    page.execute(params)
        .await
        .context("applying user agent override")?;

    page.evaluate_on_new_document(WEBDRIVER_EVASION)
        .await
        .context("installing webdriver evasion")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_pin_the_same_major() {
        for p in PROFILES {
            assert!(p.user_agent.contains(&format!("Chrome/{PINNED_CHROME_MAJOR}.")));
        }
    }

    #[test]
    fn session_profile_is_deterministic() {
        let a = profile_for_session(7);
        let b = profile_for_session(7);
        assert_eq!(a.user_agent, b.user_agent);
    }
}
