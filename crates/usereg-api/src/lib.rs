// usereg-api: Async Rust client for the campus network self-service portal

pub mod client;
pub mod credentials;
pub mod encoding;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod parser;
pub mod sentinel;
pub mod session;
pub mod transport;

pub use client::PortalClient;
pub use credentials::Credentials;
pub use endpoints::{DEFAULT_BASE_URL, Endpoints};
pub use error::Error;
pub use models::{AccountProfile, InfoResult, Session, UsageInfo, UserInfoPage};
pub use parser::{MaintdParser, PageLayout, PageParser};
pub use sentinel::{MatchMode, Outcome, Sentinel, SentinelOverrides, Sentinels};
pub use session::{AuthSession, AuthState, CookieSession};
pub use transport::{TlsMode, TransportConfig, TrustAnchors};
