//! # Configuration
//!
//! Loaded from a TOML file with environment overrides, then passed by reference
//! into every constructor. Environment variables use the `CONFIGSERVER__` prefix
//! and `__` as the nesting separator, e.g. `CONFIGSERVER__SERVER__LISTEN_ON`.
//!
//! ```toml
//! [server]
//! listen_on = "0.0.0.0:4200"
//! key_path = "/var/lib/configserver/keys"
//! authorization = ["basic", "bearer"]
//!
//! [repositories]
//! checkout_location = "/var/cache/configserver"
//!
//! [[repositories.repositories]]
//! name = "payments"
//! url = "https://github.com/acme/payments-config.git"
//! refresh_interval_seconds = 120
//! clients = ["payments-api"]
//! ```

use crate::auth::AuthorizationKind;
use crate::error::{ConfigServerError, Result};
use crate::secret::ExpiryPolicy;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "CONFIGSERVER";
const ENV_SEPARATOR: &str = "__";

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REFRESH_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub repositories: RepositoriesSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_on: String,
    pub key_path: PathBuf,
    pub create_missing_keys: bool,
    pub generate_rsa: bool,
    pub authorization: Vec<AuthorizationKind>,
    pub secret_expiry_days: u32,
    pub enforce_secret_expiry: bool,
    pub token_validity_hours: u32,
    pub issuer: String,
    /// Zero disables the deadline
    pub git_timeout_seconds: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_on: "0.0.0.0:4200".into(),
            key_path: default_key_path(),
            create_missing_keys: true,
            generate_rsa: false,
            authorization: vec![AuthorizationKind::Basic, AuthorizationKind::Bearer],
            secret_expiry_days: 30,
            enforce_secret_expiry: false,
            token_validity_hours: 24,
            issuer: "ConfigServer".into(),
            git_timeout_seconds: 300,
        }
    }
}

impl ServerSettings {
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(self.secret_expiry_days, self.enforce_secret_expiry)
    }

    pub fn token_validity(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.token_validity_hours))
    }

    pub fn git_timeout(&self) -> Option<Duration> {
        (self.git_timeout_seconds > 0).then(|| Duration::from_secs(self.git_timeout_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepositoriesSettings {
    pub checkout_location: PathBuf,
    pub repositories: Vec<RepositoryConfig>,
}

impl Default for RepositoriesSettings {
    fn default() -> Self {
        Self {
            checkout_location: default_checkout_location(),
            repositories: Vec::new(),
        }
    }
}

/// One mirrored git repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Overrides `<checkout_location>/<name>`
    #[serde(default)]
    pub checkout_location: Option<PathBuf>,
    /// HTTPS credential sent when cloning and fetching
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub clients: Vec<String>,
}

impl RepositoryConfig {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            branch: default_branch(),
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECONDS,
            checkout_location: None,
            token: None,
            clients: Vec::new(),
        }
    }

    pub fn with_clients<I, S>(mut self, clients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clients = clients.into_iter().map(Into::into).collect();
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn is_client_allowed(&self, client_id: &str) -> bool {
        self.clients.iter().any(|c| c == client_id)
    }

    /// Directory holding this repository's working tree
    pub fn checkout_dir(&self, root: &Path) -> PathBuf {
        self.checkout_location
            .clone()
            .unwrap_or_else(|| root.join(&self.name))
    }
}

fn default_branch() -> String {
    DEFAULT_BRANCH.into()
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECONDS
}

fn default_key_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("configserver").join("keys"))
        .unwrap_or_else(|| PathBuf::from("keys"))
}

fn default_checkout_location() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("configserver").join("repositories"))
        .unwrap_or_else(|| std::env::temp_dir().join("configserver"))
}

/// Durations are added to the current time at request time and must not overflow
fn check_horizon(setting: &str, delta: Option<chrono::Duration>) -> Result<()> {
    delta
        .and_then(|delta| chrono::Utc::now().checked_add_signed(delta))
        .map(|_| ())
        .ok_or_else(|| ConfigServerError::Config(format!("'{setting}' is too large")))
}

impl Configuration {
    /// Load from a TOML file, applying `CONFIGSERVER__*` overrides, and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| ConfigServerError::Config("Invalid config path".into()))?;

        let configuration: Configuration = Config::builder()
            .add_source(File::new(path_str, FileFormat::Toml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()
            .map_err(|err| ConfigServerError::Config(format!("Failed to load {path_str}: {err}")))?
            .try_deserialize()
            .map_err(|err| ConfigServerError::Config(format!("Invalid configuration: {err}")))?;

        configuration.validate()?;
        Ok(configuration)
    }

    /// Parse TOML text without environment overrides
    pub fn from_toml(text: &str) -> Result<Self> {
        let configuration: Configuration = toml::from_str(text)
            .map_err(|err| ConfigServerError::Config(format!("Invalid configuration: {err}")))?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.authorization.is_empty() {
            return Err(ConfigServerError::Config(
                "at least one authorization method is required".into(),
            ));
        }
        check_horizon(
            "secret_expiry_days",
            chrono::Duration::try_days(i64::from(self.server.secret_expiry_days)),
        )?;
        check_horizon(
            "token_validity_hours",
            chrono::Duration::try_hours(i64::from(self.server.token_validity_hours)),
        )?;

        let mut names = HashSet::new();
        for repository in &self.repositories.repositories {
            let name = &repository.name;
            if name.is_empty() {
                return Err(ConfigServerError::Config("repository name cannot be empty".into()));
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
                || name.starts_with('.')
            {
                return Err(ConfigServerError::Config(format!(
                    "repository name '{name}' may only contain letters, digits, '.', '_' and '-'"
                )));
            }
            if !names.insert(name.as_str()) {
                return Err(ConfigServerError::Config(format!(
                    "repository '{name}' is configured twice"
                )));
            }
            if repository.url.trim().is_empty() {
                return Err(ConfigServerError::Config(format!(
                    "repository '{name}' has no url"
                )));
            }
            if repository.refresh_interval_seconds == 0 {
                return Err(ConfigServerError::Config(format!(
                    "repository '{name}' needs a refresh interval greater than zero"
                )));
            }
            check_horizon(
                "refresh_interval_seconds",
                i64::try_from(repository.refresh_interval_seconds)
                    .ok()
                    .and_then(chrono::Duration::try_seconds),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[server]
listen_on = "127.0.0.1:9000"
key_path = "/tmp/keys"
authorization = ["basic"]
enforce_secret_expiry = true

[repositories]
checkout_location = "/tmp/checkouts"

[[repositories.repositories]]
name = "payments"
url = "https://example.com/payments.git"
clients = ["api", "batch"]

[[repositories.repositories]]
name = "catalog"
url = "https://example.com/catalog.git"
branch = "release"
refresh_interval_seconds = 5
"#;

    #[test]
    fn test_parse_sample() {
        let configuration = Configuration::from_toml(SAMPLE).unwrap();

        assert_eq!(configuration.server.listen_on, "127.0.0.1:9000");
        assert_eq!(configuration.server.authorization, vec![AuthorizationKind::Basic]);
        assert!(configuration.server.expiry_policy().enforce);
        assert_eq!(configuration.server.token_validity_hours, 24);

        let repos = &configuration.repositories.repositories;
        assert_eq!(repos[0].branch, "main");
        assert_eq!(repos[0].refresh_interval_seconds, 60);
        assert!(repos[0].is_client_allowed("batch"));
        assert!(!repos[0].is_client_allowed("other"));
        assert_eq!(repos[1].branch, "release");
        assert_eq!(
            repos[1].checkout_dir(Path::new("/tmp/checkouts")),
            PathBuf::from("/tmp/checkouts/catalog")
        );
    }

    #[test]
    fn test_defaults() {
        let configuration = Configuration::from_toml("").unwrap();
        assert_eq!(configuration.server.listen_on, "0.0.0.0:4200");
        assert_eq!(configuration.server.git_timeout(), Some(Duration::from_secs(300)));
        assert!(configuration.repositories.repositories.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = r#"
[[repositories.repositories]]
name = "a"
url = "u"
[[repositories.repositories]]
name = "a"
url = "v"
"#;
        assert!(matches!(
            Configuration::from_toml(text),
            Err(ConfigServerError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_repositories_rejected() {
        for body in [
            "name = \"\"\nurl = \"u\"",
            "name = \"../x\"\nurl = \"u\"",
            "name = \"x\"\nurl = \" \"",
            "name = \"x\"\nurl = \"u\"\nrefresh_interval_seconds = 0",
        ] {
            let text = format!("[[repositories.repositories]]\n{body}\n");
            assert!(Configuration::from_toml(&text).is_err(), "accepted: {body}");
        }
    }

    #[test]
    fn test_oversized_durations_rejected() {
        for text in [
            "[server]\nsecret_expiry_days = 4000000000\n",
            "[server]\ntoken_validity_hours = 4000000000\n",
            "[[repositories.repositories]]\nname = \"x\"\nurl = \"u\"\nrefresh_interval_seconds = 9000000000000000\n",
        ] {
            match Configuration::from_toml(text) {
                Err(ConfigServerError::Config(message)) => assert!(message.contains("too large")),
                other => panic!("accepted {text:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_large_durations_within_range_accepted() {
        let text = "[server]\nsecret_expiry_days = 36500\ntoken_validity_hours = 87600\n";
        let configuration = Configuration::from_toml(text).unwrap();
        assert_eq!(configuration.server.secret_expiry_days, 36500);
    }

    #[test]
    fn test_empty_authorization_rejected() {
        assert!(Configuration::from_toml("[server]\nauthorization = []\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("configserver.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let configuration = Configuration::load(&path).unwrap();
        assert_eq!(configuration.repositories.repositories.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(Configuration::load(temp.path().join("missing.toml")).is_err());
    }
}
