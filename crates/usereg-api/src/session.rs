// Authenticated portal session
//
// Owns one cookie-based conversation with the portal. `login` posts the
// credential form and keeps the resulting cookie jar only if the body
// matches the login sentinel; every other request goes through `get` or
// `post_form`, which refuse to run before a successful login.
//
// Mutation takes `&mut self`, so callers sharing one session must
// serialize access themselves.

use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::Credentials;
use crate::encoding;
use crate::endpoints::{self, Endpoints};
use crate::error::Error;
use crate::sentinel::{Outcome, Sentinel, Sentinels};
use crate::transport::TransportConfig;

/// Cookie state of a logged-in session.
#[derive(Debug, Clone)]
pub struct CookieSession {
    username: String,
    jar: Arc<Jar>,
    http: reqwest::Client,
}

impl CookieSession {
    /// The account this session is logged in as.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The cookie jar holding the portal session cookie.
    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }
}

/// Authentication state of an [`AuthSession`].
#[derive(Debug, Clone, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated(CookieSession),
}

/// One authenticated HTTP conversation with the portal.
#[derive(Debug)]
pub struct AuthSession {
    base_url: Url,
    transport: TransportConfig,
    endpoints: Endpoints,
    login_sentinel: Sentinel,
    state: AuthState,
}

impl AuthSession {
    /// Create an unauthenticated session against `base_url`.
    ///
    /// TLS trust and timeouts come from `transport` and are fixed for
    /// the lifetime of the session.
    pub fn new(base_url: Url, transport: TransportConfig) -> Self {
        Self {
            base_url,
            transport,
            endpoints: Endpoints::default(),
            login_sentinel: Sentinels::default().login,
            state: AuthState::Unauthenticated,
        }
    }

    #[must_use]
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    #[must_use]
    pub fn with_login_sentinel(mut self, sentinel: Sentinel) -> Self {
        self.login_sentinel = sentinel;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, AuthState::Authenticated(_))
    }

    /// The account the session is logged in as, if any.
    pub fn authenticated_user(&self) -> Option<&str> {
        match &self.state {
            AuthState::Authenticated(session) => Some(session.username()),
            AuthState::Unauthenticated => None,
        }
    }

    /// Log in, replacing any existing cookie state.
    ///
    /// `POST {login}` with `action=login`, `user_login_name`,
    /// `user_password` (MD5 hex digest). Succeeds only if the decoded
    /// body equals the login sentinel exactly; otherwise the body is
    /// returned in [`Error::Authentication`] and the session is left
    /// unauthenticated.
    pub async fn login(&mut self, credentials: &Credentials) -> Result<(), Error> {
        self.state = AuthState::Unauthenticated;

        let url = endpoints::resolve(&self.base_url, &self.endpoints.login)?;
        let jar = Arc::new(Jar::default());
        let http = self.transport.build_client(&jar)?;

        debug!("logging in at {}", url);

        let form = [
            ("action", "login"),
            ("user_login_name", credentials.username()),
            ("user_password", credentials.password_digest()),
        ];
        let resp = http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport.transport_error(e))?;
        let body = encoding::decode(&self.read_body(resp).await?)?;

        match self.login_sentinel.check(body) {
            Outcome::Accepted => {
                info!("logged in as {}", credentials.username());
                self.state = AuthState::Authenticated(CookieSession {
                    username: credentials.username().to_owned(),
                    jar,
                    http,
                });
                Ok(())
            }
            Outcome::Rejected(body) => {
                warn!("login as {} rejected: {}", credentials.username(), body);
                Err(Error::Authentication { body })
            }
        }
    }

    /// Forget the cookie state without contacting the portal.
    pub fn logout_local(&mut self) {
        if let AuthState::Authenticated(session) = &self.state {
            debug!("discarding session for {}", session.username());
        }
        self.state = AuthState::Unauthenticated;
    }

    /// Authenticated `GET`, returning the raw body bytes.
    pub async fn get(&self, path: &str) -> Result<Vec<u8>, Error> {
        let http = self.http()?;
        let url = endpoints::resolve(&self.base_url, path)?;

        debug!("GET {}", url);

        let resp = http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport.transport_error(e))?;
        self.read_body(resp).await
    }

    /// Authenticated form-encoded `POST`, returning the raw body bytes.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Vec<u8>, Error> {
        let http = self.http()?;
        let url = endpoints::resolve(&self.base_url, path)?;

        debug!("POST {}", url);

        let resp = http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| self.transport.transport_error(e))?;
        self.read_body(resp).await
    }

    fn http(&self) -> Result<&reqwest::Client, Error> {
        match &self.state {
            AuthState::Authenticated(session) => Ok(&session.http),
            AuthState::Unauthenticated => Err(Error::NotAuthenticated),
        }
    }

    // The status code is ignored; only the body decides the outcome.
    async fn read_body(&self, resp: reqwest::Response) -> Result<Vec<u8>, Error> {
        if !resp.status().is_success() {
            debug!("portal answered {}", resp.status());
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| self.transport.transport_error(e))?;
        Ok(bytes.to_vec())
    }
}
