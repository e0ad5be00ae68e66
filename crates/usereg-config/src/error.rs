use thiserror::Error;

/// Errors raised while loading configuration or resolving credentials.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file or environment could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A field holds a value that cannot be used.
    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// No password source yielded a credential for `username`.
    #[error("No credentials found for {username}")]
    NoCredentials { username: String },

    /// The API crate rejected the resolved settings.
    #[error(transparent)]
    Api(#[from] usereg_api::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}
