//! Protocol matchers and the ordered matcher registry.
//!
//! A matcher inspects the peeked head of a connection and either
//! claims it for its backend or declines. The registry evaluates its
//! matchers in configuration order; the first one whose rule holds
//! wins. Order is load-bearing and never changes after startup.

use std::fmt;

use regex::bytes::Regex;

use crate::config::HostPort;

/// Where a classified connection is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub host: String,
    pub port: u16,
}

impl BackendTarget {
    /// Create a new backend target.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Dial address for this backend.
    ///
    /// `localhost` resolves through the normal resolver here; only
    /// listener binds rewrite it to the wildcard address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<HostPort> for BackendTarget {
    fn from(hp: HostPort) -> Self {
        Self {
            host: hp.host,
            port: hp.port,
        }
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Acceptance rule for one matcher.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// First four bytes are the ASCII literal `SSH-`.
    SshPrefix,
    /// TLS handshake record header: content type 0x16, major version
    /// 0x03, minor version byte in 0x00..=0x03.
    TlsHandshake,
    /// Big-endian u16 length prefix equal to the remaining segment
    /// length. A coarse signature for OpenVPN/TCP: an unrelated packet
    /// whose length happens to be consistent also matches.
    LengthPrefixed,
    /// Precompiled pattern matched anywhere in the raw bytes.
    Regex(Regex),
}

impl MatchRule {
    /// Whether the rule holds for the peeked bytes.
    ///
    /// `data` is the valid portion of the peeked segment; rules never
    /// read past it.
    fn holds(&self, data: &[u8]) -> bool {
        match self {
            MatchRule::SshPrefix => data.starts_with(b"SSH-"),
            MatchRule::TlsHandshake => {
                data.len() >= 4 && data[0] == 0x16 && data[1] == 0x03 && data[3] <= 0x03
            }
            MatchRule::LengthPrefixed => {
                data.len() >= 2
                    && u16::from_be_bytes([data[0], data[1]]) as usize == data.len() - 2
            }
            MatchRule::Regex(pattern) => pattern.is_match(data),
        }
    }
}

/// One acceptance rule bound to exactly one backend.
///
/// Every matcher owns its backend copy (and, for the regex kind, its
/// compiled pattern); nothing is shared between registry entries.
#[derive(Debug, Clone)]
pub struct Matcher {
    rule: MatchRule,
    backend: BackendTarget,
}

impl Matcher {
    /// Create a matcher binding `rule` to `backend`.
    pub fn new(rule: MatchRule, backend: BackendTarget) -> Self {
        Self { rule, backend }
    }

    /// The acceptance rule.
    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    /// The bound backend.
    pub fn backend(&self) -> &BackendTarget {
        &self.backend
    }

    /// Evaluate against the peeked bytes.
    ///
    /// Yields the bound backend when the rule holds; `None` is no
    /// opinion, not an error.
    pub fn evaluate(&self, data: &[u8]) -> Option<&BackendTarget> {
        self.rule.holds(data).then_some(&self.backend)
    }
}

/// Ordered, immutable-after-startup sequence of matchers.
#[derive(Debug, Clone, Default)]
pub struct MatcherRegistry {
    matchers: Vec<Matcher>,
}

impl MatcherRegistry {
    /// Build a registry from matchers in evaluation order.
    pub fn new(matchers: Vec<Matcher>) -> Self {
        Self { matchers }
    }

    /// The matchers in evaluation order.
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Number of matchers.
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Whether the registry holds no matchers.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Resolve the backend for a peeked segment.
    ///
    /// Linear scan in configuration order: the first matcher whose
    /// rule holds wins, regardless of whether a later matcher would
    /// also have matched. `None` means the registry was exhausted and
    /// the connection must be rejected without contacting any backend.
    pub fn resolve(&self, data: &[u8]) -> Option<&BackendTarget> {
        self.matchers.iter().find_map(|m| m.evaluate(data))
    }
}
