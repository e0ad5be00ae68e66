use thiserror::Error;

/// Top-level error type for the `usereg-api` crate.
///
/// Callers branch on the variant (auth vs. transport vs. parse) and never
/// need to inspect message text, except where the portal's own response
/// is the diagnostic payload (`Authentication`, `Logout`, `IpBind`).
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request exceeded its deadline.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS trust-anchor loading or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Encoding ────────────────────────────────────────────────────
    /// The body is not a valid byte sequence in the portal's charset.
    #[error("Malformed {encoding} byte sequence")]
    Decode { encoding: &'static str },

    // ── Authentication ──────────────────────────────────────────────
    /// The login endpoint answered with something other than the
    /// success sentinel. `body` is the decoded response.
    #[error("Authentication failed: {body}")]
    Authentication { body: String },

    /// An authenticated request was attempted before `login`.
    #[error("Not authenticated -- login required")]
    NotAuthenticated,

    /// Credentials rejected before contacting the portal.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    // ── Pages ───────────────────────────────────────────────────────
    /// Expected page structure or field absent or unparsable.
    #[error("Failed to parse portal page: {message}")]
    Parse { message: String },

    // ── Operations ──────────────────────────────────────────────────
    /// The portal did not accept the session drop request.
    #[error("Logout request rejected: {body}")]
    Logout { body: String },

    /// The portal did not accept the IP bind request.
    #[error("IP bind rejected: {body}")]
    IpBind { body: String },

    /// The IP bind request never reached the portal.
    #[error("IP bind failed")]
    IpBindTransport(#[source] Box<Error>),

    /// Caller-supplied argument rejected before any request was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Returns `true` if the portal refused the login.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::NotAuthenticated | Self::InvalidCredentials(_)
        )
    }

    /// Returns `true` if the request failed below the HTTP layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::IpBindTransport(_)
        )
    }

    /// The raw portal response carried by sentinel-mismatch errors.
    pub fn portal_message(&self) -> Option<&str> {
        match self {
            Self::Authentication { body } | Self::Logout { body } | Self::IpBind { body } => {
                Some(body)
            }
            _ => None,
        }
    }
}
