//! URL classification: decides which links must never be rewritten.
//!
//! Two kinds of links are preserved: links that already point at the
//! checking service, and video-conferencing join links. The latter are
//! described by a declarative table of [`SkipPattern`]s, so adding a
//! provider is a data change.

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{GuardError, Result};

/// How a pattern's host is compared with a URL's host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMatch {
    /// The host must equal the pattern host.
    #[default]
    Exact,
    /// The host must equal the pattern host or be a subdomain of it.
    Suffix,
}

/// One provider join-link shape, as written in the built-in table or in the
/// `[[rewrite.skip_patterns]]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipPattern {
    /// Provider label used in logs and `check-url` output.
    pub provider: String,
    /// Host to compare against (case-insensitive).
    pub host: String,
    /// Exact host or domain suffix.
    #[serde(rename = "match", default)]
    pub host_match: HostMatch,
    /// Regex matched case-sensitively at the start of the URL path.
    pub path: String,
}

/// Built-in conferencing providers: `(provider, host, match, path)`.
const BUILTIN_SKIP_PATTERNS: &[(&str, &str, HostMatch, &str)] = &[
    ("zoom", "zoom.us", HostMatch::Suffix, r"/j/\d+"),
    ("zoom", "zoom.us", HostMatch::Suffix, r"/s/\d+"),
    ("zoom", "zoom.us", HostMatch::Suffix, r"/meeting/\d+"),
    ("teams", "teams.microsoft.com", HostMatch::Exact, r"/l/meetup-join/[\w%-]+"),
    ("teams", "teams.live.com", HostMatch::Exact, r"/meet/[\w-]+"),
    ("chime", "chime.aws", HostMatch::Suffix, r"/[\w-]+"),
    ("chime", "app.chime.aws", HostMatch::Exact, r"/meetings/[\w-]+"),
    ("google-meet", "meet.google.com", HostMatch::Exact, r"/[\w-]+"),
    ("google-meet", "hangouts.google.com", HostMatch::Exact, r"/[\w/]+"),
];

/// The built-in table as [`SkipPattern`] values.
pub fn builtin_skip_patterns() -> Vec<SkipPattern> {
    BUILTIN_SKIP_PATTERNS
        .iter()
        .map(|&(provider, host, host_match, path)| SkipPattern {
            provider: provider.to_string(),
            host: host.to_string(),
            host_match,
            path: path.to_string(),
        })
        .collect()
}

/// A compiled [`SkipPattern`].
#[derive(Debug, Clone)]
struct SkipRule {
    provider: String,
    host: String,
    host_match: HostMatch,
    path: Regex,
}

impl SkipRule {
    fn compile(pattern: &SkipPattern) -> Result<Self> {
        let path = Regex::new(&format!("^(?:{})", pattern.path)).map_err(|source| {
            GuardError::InvalidPattern {
                provider: pattern.provider.clone(),
                source,
            }
        })?;
        Ok(Self {
            provider: pattern.provider.clone(),
            host: pattern.host.to_ascii_lowercase(),
            host_match: pattern.host_match,
            path,
        })
    }

    fn matches(&self, url: &Url) -> bool {
        if url.scheme() != "https" {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let host_ok = match self.host_match {
            HostMatch::Exact => host == self.host,
            HostMatch::Suffix => {
                host == self.host
                    || host
                        .strip_suffix(self.host.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
        };
        host_ok && self.path.is_match(url.path())
    }
}

/// Why a URL is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The URL already routes through the checking service.
    AlreadyProxied,
    /// The URL is a join link of this conferencing provider.
    Conferencing(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyProxied => write!(f, "already proxied"),
            Self::Conferencing(provider) => write!(f, "{provider} meeting link"),
        }
    }
}

/// Pure, immutable URL classifier. Safe to share between threads.
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    check_host: String,
    rules: Vec<SkipRule>,
}

impl UrlClassifier {
    /// Classifier with the built-in provider table only.
    pub fn new(check_host: impl Into<String>) -> Self {
        let rules = builtin_skip_patterns()
            .iter()
            .map(SkipRule::compile)
            .collect::<Result<Vec<_>>>()
            .expect("built-in skip patterns are valid regexes");
        Self {
            check_host: check_host.into().to_ascii_lowercase(),
            rules,
        }
    }

    /// Classifier with the built-in table followed by `extra` patterns.
    pub fn with_patterns(check_host: impl Into<String>, extra: &[SkipPattern]) -> Result<Self> {
        let mut classifier = Self::new(check_host);
        for pattern in extra {
            classifier.rules.push(SkipRule::compile(pattern)?);
        }
        Ok(classifier)
    }

    /// Hostname of the checking service.
    pub fn check_host(&self) -> &str {
        &self.check_host
    }

    /// Number of provider rules loaded.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// `true` if the URL must be left exactly as written.
    pub fn should_skip(&self, url: &str) -> bool {
        self.skip_reason(url).is_some()
    }

    /// Classify a URL. Unparseable URLs are never skipped.
    pub fn skip_reason(&self, url: &str) -> Option<SkipReason> {
        let parsed = Url::parse(url.trim()).ok()?;
        if parsed
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(&self.check_host))
        {
            return Some(SkipReason::AlreadyProxied);
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(&parsed))
            .map(|rule| SkipReason::Conferencing(rule.provider.clone()))
    }
}
