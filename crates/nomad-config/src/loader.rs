use std::path::{Path, PathBuf};

use nomad_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const DEFAULT_CONFIG_FILE: &str = "nomad.toml";

/// Loads [`AppConfig`] from a TOML file, then layers environment overrides on top.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loader for `./nomad.toml`.
    pub fn default_location() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file (missing file means all defaults), load `.env`, and apply
    /// `NOMAD_*` environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded environment from .env");
        }

        let mut config = if self.path.is_file() {
            info!("loading config from {}", self.path.display());
            let raw = std::fs::read_to_string(&self.path).map_err(|e| {
                Error::Config(format!("failed to read {}: {e}", self.path.display()))
            })?;
            Self::parse(&raw)?
        } else {
            info!(
                "config file {} not found, using defaults",
                self.path.display()
            );
            AppConfig::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<AppConfig> {
        toml::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}

/// Apply overrides from `lookup`, which maps an environment variable name to
/// its value.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("NOMAD_LLM_API_KEY") {
        config.llm.api_key = Some(v);
    }
    if let Some(v) = get("NOMAD_LLM_BASE_URL") {
        config.llm.base_url = v;
    }
    if let Some(v) = get("NOMAD_LLM_MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = get("NOMAD_SPEECH_API_KEY") {
        config.speech.api_key = Some(v);
    }
    if let Some(v) = get("NOMAD_HOST") {
        config.gateway.host = v;
    }
    if let Some(port) = get("NOMAD_PORT").and_then(|v| v.parse().ok()) {
        config.gateway.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_yields_defaults() {
        let loader = ConfigLoader::new("/definitely/not/here/nomad.toml");
        let config = loader.load().unwrap();
        assert_eq!(config.cache.max_size, 500);
    }

    #[test]
    fn reads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nomad.toml");
        std::fs::write(&path, "[gateway]\nport = 8088\n[llm]\nmodel = \"glm-4\"\n").unwrap();

        let config = ConfigLoader::new(&path).load().unwrap();
        assert_eq!(config.gateway.port, 8088);
        assert_eq!(config.llm.model, "glm-4");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = ConfigLoader::parse("[gateway\nport = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("NOMAD_LLM_API_KEY", "key-123"),
            ("NOMAD_PORT", "9000"),
            ("NOMAD_LLM_MODEL", "  "),
        ]);
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.gateway.port, 9000);
        // blank values are ignored
        assert_eq!(config.llm.model, "gpt-4o-mini");
    }
}
