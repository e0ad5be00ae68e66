// Portal endpoint layout
//
// All paths are relative to the portal origin.

use url::Url;

use crate::error::Error;

/// Default portal origin.
pub const DEFAULT_BASE_URL: &str = "https://usereg.tsinghua.edu.cn";

/// Paths of the four portal pages this client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// `POST` form login.
    pub login: String,
    /// `POST` bind an IP to the account.
    pub ip_login: String,
    /// `GET` usage and balance.
    pub user_info: String,
    /// `GET` active sessions, `POST` drop a session.
    pub sessions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/do.php".into(),
            ip_login: "/ip_login.php".into(),
            user_info: "/user_info.php".into(),
            sessions: "/online_user_ipv4.php".into(),
        }
    }
}

/// Resolve an endpoint path against the portal origin.
pub(crate) fn resolve(base_url: &Url, path: &str) -> Result<Url, Error> {
    base_url.join(path).map_err(Error::InvalidUrl)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn resolves_against_origin() {
        let base = Url::parse(DEFAULT_BASE_URL).unwrap();
        let url = resolve(&base, &Endpoints::default().sessions).unwrap();
        assert_eq!(url.as_str(), "https://usereg.tsinghua.edu.cn/online_user_ipv4.php");
    }

    #[test]
    fn absolute_paths_replace_base_path() {
        let base = Url::parse("http://127.0.0.1:8080/portal/").unwrap();
        let url = resolve(&base, "/do.php").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/do.php");
    }
}
