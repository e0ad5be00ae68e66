// Shared transport configuration for building reqwest::Client instances.
//
// Every login builds a fresh client from the same config so a failed
// attempt never leaks cookies into the next one. Trust anchors are read
// from disk once, when the config is created.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Certificate;
use reqwest::cookie::Jar;

use crate::error::Error;

const USER_AGENT: &str = concat!("usereg-api/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Trust only the given root/intermediate certificates.
    Pinned(TrustAnchors),
}

/// A fixed set of PEM certificates loaded at construction.
#[derive(Clone)]
pub struct TrustAnchors {
    sources: Vec<PathBuf>,
    certs: Vec<Certificate>,
}

impl fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustAnchors")
            .field("sources", &self.sources)
            .field("certs", &self.certs.len())
            .finish()
    }
}

impl TrustAnchors {
    /// Load every certificate from the given PEM files. A file may hold
    /// a bundle of several certificates.
    pub fn from_pem_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, Error> {
        if paths.is_empty() {
            return Err(Error::Tls("no trust anchors supplied".into()));
        }

        let mut certs = Vec::new();
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let pem = std::fs::read(path).map_err(|e| {
                Error::Tls(format!("failed to read CA cert {}: {e}", path.display()))
            })?;
            let bundle = Certificate::from_pem_bundle(&pem).map_err(|e| {
                Error::Tls(format!("invalid CA cert {}: {e}", path.display()))
            })?;
            if bundle.is_empty() {
                return Err(Error::Tls(format!(
                    "no certificates found in {}",
                    path.display()
                )));
            }
            certs.extend(bundle);
            sources.push(path.to_path_buf());
        }

        Ok(Self { sources, certs })
    }

    /// Files the anchors were loaded from.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// Number of certificates loaded.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

impl TransportConfig {
    /// Config pinned to the given trust anchors.
    pub fn pinned(anchors: TrustAnchors) -> Self {
        Self {
            tls: TlsMode::Pinned(anchors),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` that stores cookies in `jar`.
    pub fn build_client(&self, jar: &Arc<Jar>) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(jar));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::Pinned(anchors) => {
                builder = builder.tls_built_in_root_certs(false);
                for cert in &anchors.certs {
                    builder = builder.add_root_certificate(cert.clone());
                }
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Map a reqwest failure to `Timeout` or `Network`.
    pub(crate) fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Network(err)
        }
    }
}
