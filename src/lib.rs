//! # configserver
//!
//! Serves configuration files stored in git repositories over HTTP. Secrets stay
//! encrypted in version control and are decrypted only when a file is served to an
//! authorized client.
//!
//! ## Features
//!
//! - **Git mirrors**: every configured repository is cloned locally and refreshed on its own interval
//! - **Substitution tokens**: `{enc:...}` spans hold AES-256-GCM ciphertext and are opened on serve
//! - **Self-contained client secrets**: no session store, the AES key is enough to validate them
//! - **JSON web tokens**: HS256 tokens whose audience lists the readable repositories
//! - **Client credentials flow**: `POST /oauth2/authorize` trades a client secret for a token
//!
//! ## Quick Start
//!
//! ```bash
//! # Generate keys
//! configserver keygen --path /var/lib/configserver/keys
//!
//! # Mint a secret for a client
//! configserver register payments-api --keys /var/lib/configserver/keys
//!
//! # Seal a value and paste the token into a config file
//! configserver encrypt 'p4ssw0rd' --keys /var/lib/configserver/keys
//!
//! # Serve
//! configserver serve --config configserver.toml
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! Authorization header → auth::Authorizer → Principal
//!   → RepositoryManager::get (entitlement, watcher state)
//!   → Watcher::file (shared lock) → token::detokenize → response
//! ```
//!
//! ## Repository Lifecycle
//!
//! A [`repository::Watcher`] holds its checkout's exclusive lock for the whole
//! clone or fetch, so readers never see a partially updated tree. Network errors on
//! an existing checkout are retried on the next cycle. Any other failure stops the
//! watcher for good: the repository answers `503` until the process is restarted,
//! and the stop is visible in `/api/statistics`, the
//! `configserver_repository_active` gauge and the logs.
//!
//! ## Module Overview
//!
//! - [`crypto`] - AES-256-GCM and HMAC-SHA-256 primitives
//! - [`key`] - Keystore loading and generation
//! - [`token`] - Substitution tokens
//! - [`secret`] - Client secrets
//! - [`jwt`] - JSON web tokens
//! - [`auth`] - Authorization header dispatch and principals
//! - [`git`] - libgit2 mirror
//! - [`repository`] - Watchers and the repository manager
//! - [`server`] - HTTP routes and problem responses
//! - [`config`] - Configuration loading
//! - [`metrics`] - Prometheus counters
//! - [`error`] - Error types
//!
//! ## Cryptography Details
//!
//! - **Algorithm**: AES-256-GCM, 96-bit random nonce per encryption, 16-byte tag
//! - **Sealed layout**: `[12-byte nonce][ciphertext + 16-byte tag]`
//! - **Signatures**: HMAC-SHA-256 with a 64-byte secret, compared in constant time
//!
//! ## Testing
//!
//! ```bash
//! # Unit tests
//! cargo test --lib
//!
//! # HTTP end to end
//! cargo test --test server_test
//! ```

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod git;
pub mod jwt;
pub mod key;
pub mod metrics;
pub mod repository;
pub mod secret;
pub mod server;
pub mod token;

// Re-export commonly used types
pub use auth::{AuthorizationKind, Principal};
pub use config::{Configuration, RepositoryConfig};
pub use crypto::{CryptoKey, HmacSecret};
pub use error::{ConfigServerError, Result};
pub use jwt::JsonWebToken;
pub use key::Keystore;
pub use repository::RepositoryManager;
