// Portal success sentinels
//
// Status codes carry no meaning; the portal signals the outcome only
// through the body text. These literals are the contract; they are
// matched against the decoded body and never re-derived.

use serde::{Deserialize, Serialize};

/// Login success body.
pub const LOGIN_OK: &str = "ok";
/// Body returned when a session drop request is accepted.
pub const LOGOUT_ACCEPTED: &str = "下线请求已发送";
/// Phrase contained in the body when an IP bind request is accepted.
pub const BIND_ACCEPTED: &str = "上线请求已发送";

/// How a sentinel is compared against a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// The whole body must equal the sentinel.
    Exact,
    /// The sentinel may appear anywhere in the body.
    Contains,
}

/// Result of checking a decoded body against a sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    /// Carries the raw body for diagnostics.
    Rejected(String),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A literal success marker plus its comparison rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    pub text: String,
    pub mode: MatchMode,
}

impl Sentinel {
    pub fn exact(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: MatchMode::Exact,
        }
    }

    pub fn contains(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            mode: MatchMode::Contains,
        }
    }

    /// Classify a decoded body.
    pub fn check(&self, body: String) -> Outcome {
        let accepted = match self.mode {
            MatchMode::Exact => body == self.text,
            MatchMode::Contains => body.contains(self.text.as_str()),
        };
        if accepted {
            Outcome::Accepted
        } else {
            Outcome::Rejected(body)
        }
    }
}

/// The full set of sentinels for one portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    pub login: Sentinel,
    pub logout: Sentinel,
    pub bind_ip: Sentinel,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            login: Sentinel::exact(LOGIN_OK),
            logout: Sentinel::exact(LOGOUT_ACCEPTED),
            bind_ip: Sentinel::contains(BIND_ACCEPTED),
        }
    }
}

/// Text overrides for the default sentinels, as read from configuration.
///
/// Match modes are fixed by the portal's behaviour and cannot be changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelOverrides {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub logout: Option<String>,
    #[serde(default)]
    pub bind_ip: Option<String>,
}

impl SentinelOverrides {
    pub fn apply(&self, mut sentinels: Sentinels) -> Sentinels {
        if let Some(ref text) = self.login {
            sentinels.login.text.clone_from(text);
        }
        if let Some(ref text) = self.logout {
            sentinels.logout.text.clone_from(text);
        }
        if let Some(ref text) = self.bind_ip {
            sentinels.bind_ip.text.clone_from(text);
        }
        sentinels
    }
}
