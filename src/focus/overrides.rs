//! Whitelist / blacklist matching.
//!
//! Overrides are decided purely from the page URL and run before any model
//! work, so a listed page never reaches the embedding backend.

use serde::{Deserialize, Serialize};
use url::Url;

/// One user-maintained list entry.
///
/// `collective` entries match every page on the same authority; the others
/// only match the exact normalized path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListEntry {
    pub url: String,
    #[serde(alias = "collect", default)]
    pub collective: bool,
}

impl ListEntry {
    pub fn new(url: impl Into<String>, collective: bool) -> Self {
        Self {
            url: url.into(),
            collective,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedUrl {
    /// Userinfo, host and explicit port.
    pub authority: String,
    /// Authority plus path with trailing separators removed.
    pub full: String,
}

/// Normalizes a URL for list matching.
///
/// Bare hosts get an `http://` scheme so `example.com/docs` parses; query and
/// fragment are dropped. Returns `None` when the text is not a URL with a host.
pub fn normalize_url(raw: &str) -> Option<NormalizedUrl> {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?;

    let mut authority = String::new();
    if !parsed.username().is_empty() {
        authority.push_str(parsed.username());
        if let Some(password) = parsed.password() {
            authority.push(':');
            authority.push_str(password);
        }
        authority.push('@');
    }
    authority.push_str(host);
    if let Some(port) = parsed.port() {
        authority.push(':');
        authority.push_str(&port.to_string());
    }

    let full = format!("{authority}{}", parsed.path())
        .trim_end_matches('/')
        .to_string();

    Some(NormalizedUrl { authority, full })
}

/// True when `url` matches any entry of `list`.
pub fn classify_override(url: &str, list: &[ListEntry]) -> bool {
    let Some(input) = normalize_url(url) else {
        return false;
    };

    list.iter().any(|entry| match normalize_url(&entry.url) {
        Some(target) if entry.collective => target.authority == input.authority,
        Some(target) => target.full == input.full,
        None => false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDecision {
    Whitelisted,
    Blacklisted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideLists {
    pub whitelist: Vec<ListEntry>,
    pub blacklist: Vec<ListEntry>,
}

impl OverrideLists {
    pub fn new(whitelist: Vec<ListEntry>, blacklist: Vec<ListEntry>) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    /// Whitelist wins when a URL is on both lists.
    pub fn decide(&self, url: &str) -> Option<OverrideDecision> {
        if classify_override(url, &self.whitelist) {
            Some(OverrideDecision::Whitelisted)
        } else if classify_override(url, &self.blacklist) {
            Some(OverrideDecision::Blacklisted)
        } else {
            None
        }
    }
}
