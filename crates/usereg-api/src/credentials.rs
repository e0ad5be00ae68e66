use std::fmt;

use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Length of a hex-encoded MD5 digest.
const DIGEST_LEN: usize = 32;

/// Login credentials for the portal.
///
/// The portal never sees the plaintext password: it expects the MD5 hex
/// digest in the `user_password` field. Either hand in a digest you
/// already have or let [`Credentials::from_plain_password`] compute it.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password_digest: SecretString,
}

impl Credentials {
    /// Build credentials from a pre-computed MD5 hex digest.
    pub fn new(username: impl Into<String>, password_digest: SecretString) -> Result<Self, Error> {
        let username = username.into();
        validate_username(&username)?;

        let digest = password_digest.expose_secret();
        if digest.is_empty() {
            return Err(Error::InvalidCredentials("password digest is empty".into()));
        }
        if digest.len() != DIGEST_LEN || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidCredentials(format!(
                "password digest must be {DIGEST_LEN} hex characters"
            )));
        }

        let password_digest = SecretString::from(digest.to_ascii_lowercase());
        Ok(Self {
            username,
            password_digest,
        })
    }

    /// Hash a plaintext password and build credentials from it.
    pub fn from_plain_password(
        username: impl Into<String>,
        password: &SecretString,
    ) -> Result<Self, Error> {
        let username = username.into();
        validate_username(&username)?;

        let digest = Md5::digest(password.expose_secret().as_bytes());
        Ok(Self {
            username,
            password_digest: SecretString::from(format!("{digest:x}")),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password_digest(&self) -> &str {
        self.password_digest.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password_digest", &"[REDACTED]")
            .finish()
    }
}

fn validate_username(username: &str) -> Result<(), Error> {
    if username.trim().is_empty() {
        return Err(Error::InvalidCredentials("username is empty".into()));
    }
    Ok(())
}
