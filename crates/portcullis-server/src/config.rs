use portcullis_auth::AuthConfig;
use portcullis_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

use crate::i18n::I18nConfig;
use crate::rate_limit::RateLimiterSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Shared state store (Redis) configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Credential validation and identity cache configuration
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub rate_limiter: RateLimiterSettings,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        for directive in &self.logging.directives {
            directive
                .parse::<tracing_subscriber::filter::Directive>()
                .map_err(|e| format!("logging.directives: '{directive}': {e}"))?;
        }
        self.store.validate()?;
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        if self.security.admin_authority.trim().is_empty() {
            return Err("security.admin_authority must not be empty".into());
        }
        self.rate_limiter.validate()?;
        if let Some(interval) = self.sync.interval
            && interval < Duration::from_secs(1)
        {
            return Err("sync.interval must be at least 1s".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

/// Output shape of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Per-target overrides such as `portcullis_store=debug`.
    #[serde(default)]
    pub directives: Vec<String>,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_ansi")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directives: Vec::new(),
            format: LogFormat::default(),
            ansi: default_ansi(),
        }
    }
}

fn default_ansi() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Request security settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Patterns that bypass authentication until the first refresh.
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Authority required by the administrative endpoints.
    #[serde(default = "default_admin_authority")]
    pub admin_authority: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            public_paths: default_public_paths(),
            admin_authority: default_admin_authority(),
        }
    }
}

fn default_public_paths() -> Vec<String> {
    vec![
        "healthz".to_string(),
        "readyz".to_string(),
        "fallback/**".to_string(),
    ]
}

fn default_admin_authority() -> String {
    "ROLE_SYSTEM".to_string()
}

/// Periodic configuration sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Refresh interval. No periodic refresh when unset.
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_FILE: &str = "portcullis.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            tracing::warn!(path = %pathbuf.display(), "configuration file not found, using defaults");
        }
        // Environment variable overrides, e.g., PORTCULLIS__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("PORTCULLIS")
                .prefix_separator("__")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.auth.signing.secret = "secret".to_string();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.security.admin_authority, "ROLE_SYSTEM");
        assert_eq!(cfg.rate_limiter.defaults.ban_threshold, 50);
        assert!(cfg.sync.interval.is_none());
        // No signing secret by default.
        assert!(cfg.validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validation_rules() {
        let mut cfg = valid();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.logging.directives = vec!["portcullis_store=debug".into()];
        assert!(cfg.validate().is_ok());
        cfg.logging.directives = vec!["portcullis_store=loud".into()];
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.rate_limiter.defaults.ban_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.auth.device.key = Some("short".into());
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.sync.interval = Some(Duration::from_millis(10));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
port = 9191

[auth.signing]
secret = "file-secret"
algorithm = "HS256"

[auth.cache]
ttl = "5m"

[rate_limiter]
ban_scope = "route"
excluded_apis = ["internal-*"]

[rate_limiter.defaults]
ban_threshold = 20

[[rate_limiter.routes]]
id = "orders"
patterns = ["api/orders/**"]
uri = "http://orders:8080"
ban_threshold = 5

[sync]
interval = "30s"

[i18n]
default_locale = "vi"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cfg = loader::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.server.port, 9191);
        assert_eq!(cfg.auth.cache.ttl, Duration::from_secs(300));
        assert_eq!(cfg.rate_limiter.ban_scope, crate::rate_limit::BanScope::Route);
        assert_eq!(cfg.rate_limiter.defaults.ban_threshold, 20);
        assert_eq!(cfg.rate_limiter.defaults.window_seconds, 1);
        assert_eq!(cfg.rate_limiter.routes[0].ban_threshold, Some(5));
        assert_eq!(cfg.sync.interval, Some(Duration::from_secs(30)));
        assert_eq!(cfg.i18n.default_locale, crate::i18n::Locale::Vi);
    }
}
