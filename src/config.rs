use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};
use thiserror::Error;

pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/v1";
pub const DEFAULT_HF_MODEL: &str = "moonshotai/Kimi-K2-Instruct-0905";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("failed to read advisory config {path}: {reason}")]
    AdvisoryFile { path: PathBuf, reason: String },
}

/// Settings for the generated advisory call.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AdvisorySettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for AdvisorySettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HF_BASE_URL.to_string(),
            model: DEFAULT_HF_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 400,
            timeout_secs: 30,
        }
    }
}

impl AdvisorySettings {
    /// Load from a JSON file; missing keys keep their defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let err = |reason: String| ConfigError::AdvisoryFile {
            path: PathBuf::from(path),
            reason,
        };
        let data = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        serde_json::from_str(&data).map_err(|e| err(e.to_string()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub model_path: PathBuf,
    pub meta_path: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub hf_token: Option<String>,
    pub advisory: AdvisorySettings,
    pub log_pred: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`ServiceConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let model_path = var("MODEL_PATH").ok_or(ConfigError::Missing("MODEL_PATH"))?;
        let meta_path = var("META_PATH").ok_or(ConfigError::Missing("META_PATH"))?;

        let port = match var("PORT") {
            Some(s) => s.parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: s })?,
            None => 8080,
        };

        let mut advisory = match var("ADVISORY_CONFIG") {
            Some(path) => AdvisorySettings::load(&path)?,
            None => AdvisorySettings::default(),
        };
        if let Some(url) = var("HF_BASE_URL") {
            advisory.base_url = url;
        }
        if let Some(model) = var("HF_MODEL") {
            advisory.model = model;
        }
        if let Some(s) = var("AI_TIMEOUT_SECS") {
            advisory.timeout_secs = s.parse().map_err(|_| ConfigError::Invalid {
                name: "AI_TIMEOUT_SECS",
                value: s,
            })?;
        }

        Ok(Self {
            model_path: PathBuf::from(model_path),
            meta_path: PathBuf::from(meta_path),
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            hf_token: var("HF_TOKEN").filter(|t| !t.trim().is_empty()),
            advisory,
            log_pred: var("LOG_PRED").as_deref() == Some("1"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("MODEL_PATH", "stress_model.json"),
            ("META_PATH", "meta.json"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bind_addr, "0.0.0.0");
        assert_eq!(cfg.hf_token, None);
        assert_eq!(cfg.advisory, AdvisorySettings::default());
        assert!(!cfg.log_pred);
    }

    #[test]
    fn test_missing_model_path() {
        let err = ServiceConfig::from_lookup(lookup(&[("META_PATH", "meta.json")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MODEL_PATH")));
    }

    #[test]
    fn test_blank_token_is_unconfigured() {
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("MODEL_PATH", "m"),
            ("META_PATH", "x"),
            ("HF_TOKEN", "  "),
            ("PORT", "9000"),
            ("LOG_PRED", "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.hf_token, None);
        assert_eq!(cfg.port, 9000);
        assert!(cfg.log_pred);
    }

    #[test]
    fn test_bad_port() {
        let err = ServiceConfig::from_lookup(lookup(&[
            ("MODEL_PATH", "m"),
            ("META_PATH", "x"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn test_advisory_file_overrides() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"model": "local/model", "max_tokens": 200}}"#).unwrap();
        let path = f.path().to_str().unwrap().to_string();
        let cfg = ServiceConfig::from_lookup(lookup(&[
            ("MODEL_PATH", "m"),
            ("META_PATH", "x"),
            ("ADVISORY_CONFIG", path.as_str()),
            ("AI_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(cfg.advisory.model, "local/model");
        assert_eq!(cfg.advisory.max_tokens, 200);
        assert_eq!(cfg.advisory.temperature, 0.3);
        assert_eq!(cfg.advisory.timeout(), Duration::from_secs(5));
    }
}
