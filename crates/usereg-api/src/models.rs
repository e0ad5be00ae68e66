// Portal data model
//
// Snapshot types produced by the page parser. None of these carry
// identity beyond the values themselves; session ids may be reassigned
// by the portal between calls.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// Traffic and balance figures from the user-info page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageInfo {
    /// IPv4 usage as reported by the portal.
    pub usage_mebibytes: u64,
    /// Account balance. Always finite and non-negative.
    pub balance: f64,
    /// IPv6 usage, when the page lists it.
    pub ipv6_usage_mebibytes: Option<u64>,
}

/// Identity fields from the user-info page. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountProfile {
    pub full_name: Option<String>,
    pub id_number: Option<String>,
}

/// One active network login on the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Opaque id used by the drop action.
    pub id: String,
    pub ip: String,
    /// Login time, always at UTC+8.
    pub start_time: DateTime<FixedOffset>,
    pub usage_bytes: u64,
    pub device_name: String,
}

/// Everything `get_info` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoResult {
    pub usage: UsageInfo,
    pub profile: AccountProfile,
    /// In the portal's row order.
    pub sessions: Vec<Session>,
}

/// Parsed user-info page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfoPage {
    pub usage: UsageInfo,
    pub profile: AccountProfile,
}
