//! TOML configuration, credential resolution, and translation to
//! `usereg_api` types.
//!
//! The API crate never reads files -- it receives a pre-built
//! [`PortalSettings`] and [`Credentials`] from here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use usereg_api::{
    Credentials, DEFAULT_BASE_URL, PortalClient, SentinelOverrides, Sentinels, TransportConfig,
    TrustAnchors,
};

use crate::error::ConfigError;

const ENV_PREFIX: &str = "USEREG_";
const KEYRING_SERVICE: &str = "usereg";

// ── TOML config ──────────────────────────────────────────────────────

/// On-disk configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Portal origin.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// PEM files holding the portal's trust anchors. Empty means the
    /// system store.
    #[serde(default)]
    pub ca_certs: Vec<PathBuf>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    pub username: Option<String>,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    /// MD5 hex digest of the password, used as-is.
    pub password_md5: Option<String>,

    #[serde(default)]
    pub sentinels: SentinelOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ca_certs: Vec::new(),
            timeout: default_timeout(),
            username: None,
            password: None,
            password_md5: None,
            sentinels: SentinelOverrides::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}
fn default_timeout() -> u64 {
    30
}

/// Everything needed to construct a [`PortalClient`].
#[derive(Debug, Clone)]
pub struct PortalSettings {
    pub base_url: Url,
    pub transport: TransportConfig,
    pub sentinels: Sentinels,
}

impl PortalSettings {
    pub fn into_client(self) -> PortalClient {
        let session = usereg_api::AuthSession::new(self.base_url, self.transport);
        PortalClient::with_parts(session, usereg_api::MaintdParser::default(), self.sentinels)
    }
}

// ── Config file path ─────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("cn", "usereg", "usereg")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("usereg");
            p.push("config.toml");
            p
        })
}

// ── Config loading ───────────────────────────────────────────────────

/// Load config from the default path plus `USEREG_*` environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` plus `USEREG_*` environment. A missing file
/// yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!("loading config from {}", path.display());

    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["sentinels"]))
        .extract()?;
    Ok(config)
}

impl Config {
    /// Translate into API-level settings, loading trust anchors from disk.
    pub fn resolve_settings(&self) -> Result<PortalSettings, ConfigError> {
        let base_url: Url = self.base_url.parse().map_err(|_| ConfigError::Validation {
            field: "base_url".into(),
            reason: format!("invalid URL: {}", self.base_url),
        })?;

        if self.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }

        let transport = if self.ca_certs.is_empty() {
            TransportConfig::default()
        } else {
            TransportConfig::pinned(TrustAnchors::from_pem_files(&self.ca_certs)?)
        };
        let transport = transport.with_timeout(Duration::from_secs(self.timeout));

        Ok(PortalSettings {
            base_url,
            transport,
            sentinels: self.sentinels.apply(Sentinels::default()),
        })
    }

    /// Resolve login credentials.
    ///
    /// Order: `password_md5`, `USEREG_PASSWORD`, plaintext `password`,
    /// then the system keyring entry for the username.
    pub fn resolve_credentials(&self) -> Result<Credentials, ConfigError> {
        let username = self
            .username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| ConfigError::Validation {
                field: "username".into(),
                reason: "not set".into(),
            })?;

        // 1. Pre-computed digest
        if let Some(ref digest) = self.password_md5 {
            return Ok(Credentials::new(
                username,
                SecretString::from(digest.clone()),
            )?);
        }

        // 2. Env var
        if let Ok(pw) = std::env::var("USEREG_PASSWORD") {
            return Ok(Credentials::from_plain_password(
                username,
                &SecretString::from(pw),
            )?);
        }

        // 3. Plaintext in config
        if let Some(ref pw) = self.password {
            return Ok(Credentials::from_plain_password(
                username,
                &SecretString::from(pw.clone()),
            )?);
        }

        // 4. Keyring
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &username) {
            if let Ok(pw) = entry.get_password() {
                debug!("using keyring password for {}", username);
                return Ok(Credentials::from_plain_password(
                    username,
                    &SecretString::from(pw),
                )?);
            }
        }

        Err(ConfigError::NoCredentials { username })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use usereg_api::{MatchMode, TlsMode};

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config_from(Path::new("/nonexistent/usereg.toml")).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout, 30);
        assert!(config.ca_certs.is_empty());
    }

    #[test]
    fn file_values_are_loaded() {
        let file = write_config(
            r#"
            base_url = "http://127.0.0.1:8080"
            timeout = 5
            username = "alice"
            password_md5 = "5f4dcc3b5aa765d61d8327deb882cf99"

            [sentinels]
            logout = "drop request sent"
            "#,
        );
        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.username.as_deref(), Some("alice"));

        let settings = config.resolve_settings().unwrap();
        assert_eq!(settings.base_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(settings.transport.timeout, Duration::from_secs(5));
        assert!(matches!(settings.transport.tls, TlsMode::System));
        assert_eq!(settings.sentinels.logout.text, "drop request sent");
        assert_eq!(settings.sentinels.logout.mode, MatchMode::Exact);

        let creds = config.resolve_credentials().unwrap();
        assert_eq!(creds.username(), "alice");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let config = Config {
            base_url: "not a url".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.resolve_settings(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config {
            timeout: 0,
            ..Config::default()
        };
        assert!(config.resolve_settings().is_err());
    }

    #[test]
    fn missing_ca_cert_surfaces_tls_error() {
        let config = Config {
            ca_certs: vec![PathBuf::from("/nonexistent/ca.pem")],
            ..Config::default()
        };
        assert!(matches!(
            config.resolve_settings(),
            Err(ConfigError::Api(usereg_api::Error::Tls(_)))
        ));
    }

    #[test]
    fn missing_username_is_rejected() {
        let config = Config::default();
        assert!(matches!(
            config.resolve_credentials(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn bad_digest_is_rejected() {
        let config = Config {
            username: Some("alice".into()),
            password_md5: Some("short".into()),
            ..Config::default()
        };
        assert!(matches!(
            config.resolve_credentials(),
            Err(ConfigError::Api(usereg_api::Error::InvalidCredentials(_)))
        ));
    }

    #[test]
    fn settings_build_an_unauthenticated_client() {
        let client = Config::default().resolve_settings().unwrap().into_client();
        assert_eq!(
            client.session().base_url().as_str(),
            "https://usereg.tsinghua.edu.cn/"
        );
        assert!(!client.session().is_authenticated());
    }

    #[test]
    fn default_config_serializes_to_toml() {
        let rendered = toml::to_string(&Config::default()).unwrap();
        assert!(rendered.contains("base_url"));
        assert!(rendered.contains("timeout = 30"));
    }
}
