use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use stratum_auth::AuthConfig;
use stratum_graph::GraphConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Identity provider and session configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Microsoft Graph configuration
    #[serde(default)]
    pub graph: GraphConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if !self.server.post_login_path.starts_with('/') {
            return Err("server.post_login_path must be an absolute path".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        self.auth
            .validate()
            .map_err(|e| format!("auth config error: {e}"))?;
        self.graph
            .validate()
            .map_err(|e| format!("graph config error: {e}"))?;
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

    /// Public URL of the portal.
    /// If `base_url` is configured, returns that; otherwise computes from host:port.
    pub fn base_url(&self) -> String {
        self.server
            .base_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server.host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of the portal, used for logging and the default redirect URI.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Where the browser lands after sign-in when no `callbackUrl` was given.
    #[serde(default = "default_post_login_path")]
    pub post_login_path: String,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_post_login_path() -> String {
    "/dashboard".into()
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_url: None,
            post_login_path: default_post_login_path(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
    use std::path::PathBuf;

    /// Default configuration file name.
    pub const DEFAULT_CONFIG_FILE: &str = "stratum.toml";

    /// Loads, merges and validates the configuration.
    ///
    /// Sources, lowest precedence first:
    /// 1. the TOML file at `path` (or `stratum.toml`), if it exists
    /// 2. `STRATUM__SECTION__KEY` environment variables
    /// 3. the portal's legacy variables (`AZURE_AD_*`, `NEXTAUTH_*`)
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., STRATUM__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("STRATUM")
                .try_parsing(true)
                .separator("__"),
        );
        builder = legacy_overrides(builder, |key| std::env::var(key).ok())?;

        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    /// Maps the portal's original environment variables onto config keys.
    ///
    /// `NEXTAUTH_URL` sets the public base URL and, from it, the redirect URI.
    pub(crate) fn legacy_overrides(
        builder: ConfigBuilder<DefaultState>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ConfigBuilder<DefaultState>, String> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let redirect_uri = var("NEXTAUTH_URL")
            .map(|base| format!("{}/api/auth/callback", base.trim_end_matches('/')));

        builder
            .set_override_option("auth.provider.client_id", var("AZURE_AD_CLIENT_ID"))
            .and_then(|b| {
                b.set_override_option("auth.provider.client_secret", var("AZURE_AD_CLIENT_SECRET"))
            })
            .and_then(|b| b.set_override_option("auth.provider.tenant_id", var("AZURE_AD_TENANT_ID")))
            .and_then(|b| b.set_override_option("auth.session.secret", var("NEXTAUTH_SECRET")))
            .and_then(|b| b.set_override_option("server.base_url", var("NEXTAUTH_URL")))
            .and_then(|b| b.set_override_option("auth.provider.redirect_uri", redirect_uri))
            .map_err(|e| format!("config override error: {e}"))
    }
}
