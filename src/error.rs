use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigServerError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Key material not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid substitution token")]
    InvalidToken,

    #[error("Unable to decrypt the token's content")]
    CannotDecryptToken,

    #[error("The requested repository '{0}' does not exist")]
    RepositoryNotFound(String),

    #[error("Client '{client_id}' is not allowed to access repository '{repository}'")]
    ClientNotAllowed {
        client_id: String,
        repository: String,
    },

    #[error("Repository '{repository}' cannot be served: {reason}")]
    RepositoryUnavailable { repository: String, reason: String },

    #[error("'{0}' is not accessible or is a directory")]
    FileNotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid JSON web token: {0}")]
    InvalidJwt(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ConfigServerError {
    /// True for errors caused by the caller's credentials rather than the server.
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            ConfigServerError::Unauthorized(_)
                | ConfigServerError::InvalidJwt(_)
                | ConfigServerError::ClientNotAllowed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConfigServerError>;
