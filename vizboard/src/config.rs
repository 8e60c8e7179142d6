//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `VIZBOARD_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `VIZBOARD_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `VIZBOARD_DATA_PROVIDER__MAX_ROWS=500` sets the `data_provider.max_rows` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use vizboard::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `base_url` - HTTP binding and the public URL used in emails
//! - **Database**: `database.url`, `database.pool` - SQLite metadata store
//! - **Admin User**: `admin_email`, `admin_password` - Initial admin user created on startup
//! - **Authentication**: `auth.native`, `auth.security` - Registration, passwords, JWT and CORS
//! - **Email**: `email` - SMTP or file transport for activation and reset mails
//! - **Data providers**: `data_provider` - Source pools, row caps, paging bounds and query timeout
//! - **Features**: `enable_metrics`, `enable_otel_export`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! VIZBOARD_PORT=8080
//! DATABASE_URL="sqlite://vizboard.db"
//! VIZBOARD_AUTH__NATIVE__REQUIRE_ACTIVATION=true
//! VIZBOARD_DATA_PROVIDER__QUERY_TIMEOUT=10s
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "VIZBOARD_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Public URL of the web UI, used to build activation links
    pub base_url: String,
    /// Populated from the raw `DATABASE_URL` variable and folded into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Metadata store configuration
    pub database: DatabaseConfig,
    /// Email address for the initial admin user (created on first startup)
    pub admin_email: String,
    /// Password for the initial admin user (optional, can be set via environment)
    pub admin_password: Option<String>,
    /// Secret key for JWT signing and source password encryption
    pub secret_key: Option<String>,
    /// Site metadata exposed through `/api/v1/config`
    pub metadata: Metadata,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Email configuration for activation and password reset mails
    pub email: EmailConfig,
    /// Settings shared by all data source adapters
    pub data_provider: DataProviderConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Individual pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        (self.max_lifetime_secs > 0).then(|| Duration::from_secs(self.max_lifetime_secs))
    }
}

/// Metadata store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection URL. The file is created if it does not exist.
    pub url: String,
    pub pool: PoolSettings,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://vizboard.db".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

/// Site metadata displayed in the UI.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Metadata {
    /// Site name shown in the UI header and in emails
    pub site_name: String,
    /// Documentation URL shown in the UI header
    pub docs_url: Option<String>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            site_name: "Vizboard".to_string(),
            docs_url: None,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Native username/password authentication
    pub native: NativeAuthConfig,
    /// Security settings (JWT, CORS)
    pub security: SecurityConfig,
}

/// Native username/password authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NativeAuthConfig {
    /// Allow new users to self-register
    pub allow_registration: bool,
    /// New users stay inactive until they follow the emailed activation link
    pub require_activation: bool,
    /// Password validation rules
    pub password: PasswordConfig,
    /// How long activation tokens are valid
    #[serde(with = "humantime_serde")]
    pub activation_token_duration: Duration,
    /// How long password reset tokens are valid
    #[serde(with = "humantime_serde")]
    pub password_reset_token_duration: Duration,
}

impl Default for NativeAuthConfig {
    fn default() -> Self {
        Self {
            allow_registration: true,
            require_activation: false,
            password: PasswordConfig::default(),
            activation_token_duration: Duration::from_secs(24 * 60 * 60), // 24 hours
            password_reset_token_duration: Duration::from_secs(30 * 60),  // 30 minutes
        }
    }
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 64,
            // Argon2id RFC recommendations
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

/// Security configuration for JWT and CORS.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// JWT token expiry duration
    #[serde(with = "humantime_serde")]
    pub jwt_expiry: Duration,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
            cors: CorsConfig::default(),
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Development frontend
            allowed_origins: Url::parse("http://localhost:3000").into_iter().map(CorsOrigin::Url).collect(),
            allow_credentials: true,
            max_age: Some(3600), // Cache preflight for 1 hour
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://bi.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// Email configuration for activation and password reset mails.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
// Note: Cannot use deny_unknown_fields here due to #[serde(flatten)] on transport
pub struct EmailConfig {
    /// Email transport method
    #[serde(flatten)]
    pub transport: EmailTransportConfig,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            transport: EmailTransportConfig::default(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Vizboard".to_string(),
        }
    }
}

/// Email transport configuration - either SMTP or file-based for testing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    /// Send emails via SMTP server
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    /// Write emails to files (for development/testing)
    File {
        /// Directory path where email files will be written
        path: String,
    },
}

impl Default for EmailTransportConfig {
    fn default() -> Self {
        Self::File {
            path: "./emails".to_string(),
        }
    }
}

/// Settings applied to every data source adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataProviderConfig {
    /// Pool settings used for each source's connection pool
    pub pool: PoolSettings,
    /// Row cap for unpaged queries
    pub max_rows: usize,
    /// Page size used when a request omits one
    pub default_page_size: i64,
    /// Largest page size a request may ask for
    pub max_page_size: i64,
    /// Upper bound on a single query or metadata lookup
    #[serde(with = "humantime_serde")]
    pub query_timeout: Duration,
}

impl Default for DataProviderConfig {
    fn default() -> Self {
        Self {
            pool: PoolSettings {
                max_connections: 5,
                ..PoolSettings::default()
            },
            max_rows: 10_000,
            default_page_size: 100,
            max_page_size: 1_000,
            query_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            base_url: "http://localhost:3000".to_string(),
            database_url: None,
            database: DatabaseConfig::default(),
            admin_email: "admin@example.com".to_string(),
            admin_password: None,
            secret_key: None,
            metadata: Metadata::default(),
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            data_provider: DataProviderConfig::default(),
            enable_metrics: true,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.secret_key.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Internal {
                operation: "Config validation: secret_key is not configured. \
                     Please set VIZBOARD_SECRET_KEY environment variable or add secret_key to config file."
                    .to_string(),
            });
        }

        let password = &self.auth.native.password;
        if password.min_length > password.max_length {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: Invalid password configuration: min_length ({}) cannot be greater than max_length ({})",
                    password.min_length, password.max_length
                ),
            });
        }

        if password.min_length < 1 {
            return Err(Error::Internal {
                operation: "Config validation: Invalid password configuration: min_length must be at least 1".to_string(),
            });
        }

        // Validate JWT expiry duration is reasonable
        if self.auth.security.jwt_expiry.as_secs() < 300 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too short (minimum 5 minutes)".to_string(),
            });
        }

        if self.auth.security.jwt_expiry.as_secs() > 86400 * 30 {
            return Err(Error::Internal {
                operation: "Config validation: JWT expiry duration is too long (maximum 30 days)".to_string(),
            });
        }

        if self.auth.security.cors.allowed_origins.is_empty() {
            return Err(Error::Internal {
                operation: "Config validation: CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            });
        }

        let has_wildcard = self
            .auth
            .security
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.auth.security.cors.allow_credentials {
            return Err(Error::Internal {
                operation: "Config validation: CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins."
                    .to_string(),
            });
        }

        let provider = &self.data_provider;
        if provider.default_page_size < 1 || provider.max_page_size < provider.default_page_size {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: data_provider page sizes must satisfy 1 <= default_page_size ({}) <= max_page_size ({})",
                    provider.default_page_size, provider.max_page_size
                ),
            });
        }

        if provider.max_rows == 0 {
            return Err(Error::Internal {
                operation: "Config validation: data_provider.max_rows must be positive".to_string(),
            });
        }

        if provider.query_timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: data_provider.query_timeout must be positive".to_string(),
            });
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("VIZBOARD_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
metadata:
  site_name: Sales BI
"#,
            )?;

            jail.set_env("VIZBOARD_HOST", "127.0.0.1");
            jail.set_env("VIZBOARD_PORT", "8080");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.metadata.site_name, "Sales BI");

            Ok(())
        });
    }

    #[test]
    fn test_database_url_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
database:
  url: sqlite://from-yaml.db
  pool:
    max_connections: 3
"#,
            )?;
            jail.set_env("DATABASE_URL", "sqlite://from-env.db");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.database.url, "sqlite://from-env.db");
            assert_eq!(config.database.pool.max_connections, 3);
            assert!(config.database_url.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_auth_and_provider_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: "test-secret-key-for-testing"
auth:
  native:
    require_activation: true
    activation_token_duration: 2h
    password:
      min_length: 12
  security:
    jwt_expiry: "2h"
data_provider:
  max_rows: 500
  query_timeout: 5s
"#,
            )?;
            jail.set_env("VIZBOARD_DATA_PROVIDER__MAX_PAGE_SIZE", "250");

            let config = Config::load(&args("test.yaml"))?;

            assert!(config.auth.native.require_activation);
            assert!(config.auth.native.allow_registration); // default
            assert_eq!(config.auth.native.activation_token_duration, Duration::from_secs(2 * 60 * 60));
            assert_eq!(config.auth.native.password.min_length, 12);
            assert_eq!(config.auth.native.password.max_length, 64); // default
            assert_eq!(config.auth.security.jwt_expiry, Duration::from_secs(2 * 60 * 60));
            assert_eq!(config.data_provider.max_rows, 500);
            assert_eq!(config.data_provider.max_page_size, 250);
            assert_eq!(config.data_provider.query_timeout, Duration::from_secs(5));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: hello\nnot_a_field: 1\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_smtp_transport_parsed() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
secret_key: hello
email:
  type: smtp
  host: smtp.example.com
  port: 587
  username: mailer
  password: secret
  use_tls: true
  from_email: bi@example.com
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;
            assert!(matches!(config.email.transport, EmailTransportConfig::Smtp { port: 587, .. }));
            assert_eq!(config.email.from_email, "bi@example.com");
            assert_eq!(config.email.from_name, "Vizboard");

            Ok(())
        });
    }

    #[test]
    fn test_config_validation_missing_secret() {
        let config = Config::default();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("secret_key is not configured"));
    }

    #[test]
    fn test_config_validation_invalid_password_length() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.auth.native.password.min_length = 10;
        config.auth.native.password.max_length = 5;

        assert!(config.validate().unwrap_err().to_string().contains("min_length"));
    }

    #[test]
    fn test_config_validation_jwt_bounds() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.auth.security.jwt_expiry = Duration::from_secs(60);
        assert!(config.validate().unwrap_err().to_string().contains("too short"));

        config.auth.security.jwt_expiry = Duration::from_secs(86400 * 31);
        assert!(config.validate().unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_config_validation_wildcard_with_credentials() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.auth.security.cors.allowed_origins = vec![CorsOrigin::Wildcard];
        config.auth.security.cors.allow_credentials = true;
        assert!(config.validate().unwrap_err().to_string().contains("wildcard"));

        config.auth.security.cors.allow_credentials = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_page_sizes() {
        let mut config = Config {
            secret_key: Some("test-key".to_string()),
            ..Default::default()
        };
        config.data_provider.default_page_size = 500;
        config.data_provider.max_page_size = 100;
        assert!(config.validate().unwrap_err().to_string().contains("page sizes"));
    }

    #[test]
    fn test_config_validation_valid_config() {
        let config = Config {
            secret_key: Some("test-secret-key".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
