// Portal operations
//
// `PortalClient` strings the session, charset conversion and page parser
// together into the three things callers actually want: read usage and
// sessions, drop a session, bind an IP. Each operation is all-or-nothing.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};
use url::Url;

use crate::credentials::Credentials;
use crate::encoding;
use crate::endpoints::Endpoints;
use crate::error::Error;
use crate::models::InfoResult;
use crate::parser::{MaintdParser, PageParser};
use crate::sentinel::{Outcome, Sentinels};
use crate::session::AuthSession;
use crate::transport::TransportConfig;

/// Client for the portal's self-service operations.
///
/// Generic over the page parser so layout assumptions can be swapped
/// without touching the request flow.
#[derive(Debug)]
pub struct PortalClient<P = MaintdParser> {
    session: AuthSession,
    parser: P,
    sentinels: Sentinels,
}

impl PortalClient<MaintdParser> {
    /// Create a client with the default portal layout and sentinels.
    pub fn new(base_url: Url, transport: TransportConfig) -> Self {
        Self::with_parts(
            AuthSession::new(base_url, transport),
            MaintdParser::default(),
            Sentinels::default(),
        )
    }
}

impl<P: PageParser> PortalClient<P> {
    /// Assemble a client from its parts. The session's login sentinel is
    /// replaced by `sentinels.login`.
    pub fn with_parts(session: AuthSession, parser: P, sentinels: Sentinels) -> Self {
        let session = session.with_login_sentinel(sentinels.login.clone());
        Self {
            session,
            parser,
            sentinels,
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AuthSession {
        &mut self.session
    }

    fn endpoints(&self) -> &Endpoints {
        self.session.endpoints()
    }

    /// Log in unless already authenticated as `credentials.username()`.
    async fn ensure_login(&mut self, credentials: &Credentials) -> Result<(), Error> {
        if self.session.authenticated_user() == Some(credentials.username()) {
            debug!("reusing session for {}", credentials.username());
            return Ok(());
        }
        self.session.login(credentials).await
    }

    /// Fetch usage, balance and active sessions.
    ///
    /// Reuses an existing login for the same user. `GET {user_info}` and
    /// `GET {sessions}` run concurrently; the first failure aborts the
    /// call. A stale cookie makes the portal serve its login page, which
    /// fails to parse; the reused session is then discarded so the next
    /// call logs in again.
    pub async fn get_info(&mut self, credentials: &Credentials) -> Result<InfoResult, Error> {
        self.ensure_login(credentials).await?;

        match self.fetch_info().await {
            Err(e @ Error::Parse { .. }) => {
                warn!("discarding session for {}: {}", credentials.username(), e);
                self.session.logout_local();
                Err(e)
            }
            result => result,
        }
    }

    async fn fetch_info(&self) -> Result<InfoResult, Error> {
        let endpoints = self.endpoints();
        let (info_page, sessions_page) = tokio::try_join!(
            self.session.get(&endpoints.user_info),
            self.session.get(&endpoints.sessions),
        )?;

        let info = self.parser.parse_user_info(&encoding::decode(&info_page)?)?;
        let sessions = self
            .parser
            .parse_sessions(&encoding::decode(&sessions_page)?)?;

        debug!(
            usage = info.usage.usage_mebibytes,
            sessions = sessions.len(),
            "fetched account info"
        );

        Ok(InfoResult {
            usage: info.usage,
            profile: info.profile,
            sessions,
        })
    }

    /// Ask the portal to drop the session with `session_id`.
    ///
    /// `POST {sessions}` with `action=drops`, `user_ip=<id>,`. Success
    /// means the portal accepted the request, not that the session has
    /// already gone.
    ///
    /// Always logs in first. A stale cookie would otherwise come back as
    /// the login page and be reported as a portal rejection.
    pub async fn logout_session(
        &mut self,
        credentials: &Credentials,
        session_id: &str,
    ) -> Result<(), Error> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(Error::InvalidArgument("session id is empty".into()));
        }

        self.session.login(credentials).await?;

        let ids = format!("{session_id},");
        let form = [("action", "drops"), ("user_ip", ids.as_str())];
        let body = encoding::decode(
            &self
                .session
                .post_form(&self.endpoints().sessions, &form)
                .await?,
        )?;

        match self.sentinels.logout.check(body) {
            Outcome::Accepted => {
                info!("logout request for session {} sent", session_id);
                Ok(())
            }
            Outcome::Rejected(body) => {
                warn!("logout request for session {} rejected: {}", session_id, body);
                Err(Error::Logout { body })
            }
        }
    }

    /// Bind `ip` to the account.
    ///
    /// `POST {ip_login}` with the portal's fixed form fields. Succeeds if
    /// the body contains the bind sentinel anywhere. Always logs in first,
    /// like [`logout_session`](Self::logout_session).
    pub async fn bind_ip(&mut self, credentials: &Credentials, ip: &str) -> Result<(), Error> {
        let ip: Ipv4Addr = ip
            .trim()
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("not an IPv4 address: {ip:?}")))?;

        self.session.login(credentials).await?;

        let ip = ip.to_string();
        let form = [
            ("n", "100"),
            ("is_pad", "1"),
            ("type", "10"),
            ("action", "do_login"),
            ("drop", "0"),
            ("user_ip", ip.as_str()),
        ];
        let raw = match self
            .session
            .post_form(&self.endpoints().ip_login, &form)
            .await
        {
            Ok(raw) => raw,
            Err(e) if e.is_transport() => {
                warn!("IP bind request for {} failed: {}", ip, e);
                return Err(Error::IpBindTransport(Box::new(e)));
            }
            Err(e) => return Err(e),
        };

        match self.sentinels.bind_ip.check(encoding::decode(&raw)?) {
            Outcome::Accepted => {
                info!("bind request for {} sent", ip);
                Ok(())
            }
            Outcome::Rejected(body) => {
                warn!("bind request for {} rejected: {}", ip, body);
                Err(Error::IpBind { body })
            }
        }
    }
}
