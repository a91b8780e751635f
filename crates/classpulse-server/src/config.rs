use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// The public URL of this server (e.g. https://polls.example.com),
    /// used for websocket origin checks.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/classpulse.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiry_seconds: 86_400,
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults when the file does
    /// not exist. Environment variables override file values.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("could not read config file {path}"))?;
            toml::from_str(&contents)
                .with_context(|| format!("could not parse config file {path}"))?
        } else {
            tracing::info!(path, "config file not found, using defaults");
            Config::default()
        };

        if let Ok(url) = std::env::var("CLASSPULSE_DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(secret) = std::env::var("CLASSPULSE_JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Ok(bind) = std::env::var("CLASSPULSE_BIND_ADDRESS") {
            config.server.bind_address = bind;
        }
        if let Ok(url) = std::env::var("CLASSPULSE_PUBLIC_URL") {
            config.server.public_url = Some(url);
        }

        Ok(config)
    }
}
