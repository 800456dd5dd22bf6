//! Application configuration.
//!
//! Sources, lowest precedence first: built-in defaults, `config/default.*`,
//! `config/local.*`, the file named by `BOOKSHELF_CONFIG_PATH`, then
//! `BOOKSHELF__*` environment variables (`__` separates nesting levels, e.g.
//! `BOOKSHELF__API__DEFAULT_VERSION=2.0`).

use crate::auth::Role;
use crate::error::Result;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const CONFIG_PATH_ENV: &str = "BOOKSHELF_CONFIG_PATH";
const ENV_PREFIX: &str = "BOOKSHELF";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub address: SocketAddr,
    /// Base URL used when building `Location` headers
    pub public_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Version used when the `Accept` header does not name one
    pub default_version: String,
    pub books_page_limit: u32,
    pub authors_page_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub backend: CacheBackendConfig,
    /// Entry lifetime; unset keeps entries until invalidated or evicted
    pub ttl_secs: Option<u64>,
    /// Extra attempts for a failing list computation
    pub retry: u32,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheBackendConfig {
    Memory,
    Memcached {
        servers: Vec<String>,
        pool_size: u32,
        connection_timeout_secs: u64,
    },
}

/// How bearer tokens are turned into principals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AuthConfig {
    /// Static token table, e.g. `tokens = { "admin-token" = ["ROLE_ADMIN"] }`
    Memory {
        #[serde(default)]
        tokens: HashMap<String, Vec<Role>>,
    },
    /// HS256-signed JWTs carrying a `roles` claim
    Jwt {
        secret: String,
        #[serde(default)]
        validate_expiration: Option<bool>,
    },
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig {
                address: SocketAddr::from(([127, 0, 0, 1], 8000)),
                public_url: "http://127.0.0.1:8000".to_string(),
            },
            api: ApiConfig {
                default_version: "1.0".to_string(),
                books_page_limit: 3,
                authors_page_limit: 4,
            },
            cache: CacheConfig {
                backend: CacheBackendConfig::Memory,
                ttl_secs: None,
                retry: 0,
            },
            auth: AuthConfig::Memory {
                tokens: HashMap::new(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from files and the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if a source cannot be read or the merged
    /// result does not deserialize.
    pub fn load() -> Result<Self> {
        let config_dir = "config";

        let mut builder = Self::defaults()?
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Not checked in; developer overrides
            .add_source(File::with_name(&format!("{config_dir}/local")).required(false));

        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }

        Ok(builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?)
    }

    /// `BOOKSHELF__*` variables, kept as strings.
    ///
    /// Typed fields are converted on deserialize; `api.default_version` must
    /// keep its text, since `1.10` parsed as a float would read back as `1.1`.
    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
    }

    /// Defaults overlaid with a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the document is invalid.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(Self::defaults()?
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder().add_source(Config::try_from(&AppConfig::default())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Map;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml("").expect("Failed to load defaults");

        assert_eq!(config.api.default_version, "1.0");
        assert_eq!(config.api.books_page_limit, 3);
        assert_eq!(config.api.authors_page_limit, 4);
        assert!(matches!(config.cache.backend, CacheBackendConfig::Memory));
        assert_eq!(config.cache.ttl(), None);
        assert_eq!(config.server.address.port(), 8000);
    }

    #[test]
    fn test_toml_overrides() {
        let config = AppConfig::from_toml(
            r#"
            [api]
            default_version = "2.0"

            [cache]
            ttl_secs = 60

            [auth]
            kind = "memory"
            tokens = { "admin-token" = ["ROLE_ADMIN"], "reader" = ["ROLE_USER"] }
            "#,
        )
        .expect("Failed to load config");

        assert_eq!(config.api.default_version, "2.0");
        assert_eq!(config.api.books_page_limit, 3);
        assert_eq!(config.cache.ttl(), Some(Duration::from_secs(60)));

        match config.auth {
            AuthConfig::Memory { tokens } => {
                assert_eq!(tokens["admin-token"], vec![Role::Admin]);
                assert_eq!(tokens["reader"], vec![Role::User]);
            }
            other => panic!("Expected memory auth, got {:?}", other),
        }
    }

    fn from_env(vars: &[(&str, &str)]) -> AppConfig {
        let vars: Map<String, String> = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::defaults()
            .expect("Failed to build defaults")
            .add_source(AppConfig::environment().source(Some(vars)))
            .build()
            .expect("Failed to build config")
            .try_deserialize()
            .expect("Failed to deserialize config")
    }

    #[test]
    fn test_env_keeps_version_text() {
        let config = from_env(&[
            ("BOOKSHELF__API__DEFAULT_VERSION", "1.10"),
            ("BOOKSHELF__API__BOOKS_PAGE_LIMIT", "7"),
            ("BOOKSHELF__CACHE__RETRY", "2"),
        ]);

        assert_eq!(config.api.default_version, "1.10");
        assert_eq!(config.api.books_page_limit, 7);
        assert_eq!(config.cache.retry, 2);
    }

    #[test]
    fn test_shipped_defaults_grant_no_tokens() {
        let shipped = std::fs::read_to_string(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/config/default.toml"
        ))
        .expect("Failed to read config/default.toml");
        let config = AppConfig::from_toml(&shipped).expect("Failed to load config");

        match config.auth {
            AuthConfig::Memory { tokens } => assert!(tokens.is_empty()),
            other => panic!("Expected memory auth, got {:?}", other),
        }
    }

    #[test]
    fn test_jwt_and_memcached_sections() {
        let config = AppConfig::from_toml(
            r#"
            [cache.backend]
            kind = "memcached"
            servers = ["cache1:11211"]
            pool_size = 8
            connection_timeout_secs = 2

            [auth]
            kind = "jwt"
            secret = "s3cret"
            "#,
        )
        .expect("Failed to load config");

        match config.cache.backend {
            CacheBackendConfig::Memcached {
                servers, pool_size, ..
            } => {
                assert_eq!(servers, vec!["cache1:11211".to_string()]);
                assert_eq!(pool_size, 8);
            }
            other => panic!("Expected memcached backend, got {:?}", other),
        }
        assert!(matches!(
            config.auth,
            AuthConfig::Jwt {
                validate_expiration: None,
                ..
            }
        ));
    }
}
