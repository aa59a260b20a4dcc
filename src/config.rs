use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub reaper: ReaperSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    /// HS256 secret shared with the REST layer that issues the tokens.
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReaperSettings {
    pub interval_secs: u64,
}

impl Settings {
    /// Loads the TOML file at `path` (optional) with `RELAY_*` environment
    /// overrides, e.g. `RELAY_AUTH__JWT_SECRET`.
    pub fn load(path: &str) -> Result<Self> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5200_i64)?
            .set_default("auth.jwt_secret", "insecure-dev-secret")?
            .set_default("reaper.interval_secs", 300_i64)?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("RELAY").separator("__"))
            .build()
            .and_then(Config::try_deserialize)
            .with_context(|| format!("failed to load configuration from {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let settings = Settings::load("does/not/exist").unwrap();
        assert_eq!(settings.server.port, 5200);
        assert_eq!(settings.reaper.interval_secs, 300);
        assert_eq!(settings.auth.jwt_secret, "insecure-dev-secret");
    }
}
