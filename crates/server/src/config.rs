use std::{fs, path::PathBuf};

use model::DEFAULT_MODEL_PATH;
use serde::Deserialize;

const SETTINGS_FILE: &str = "server.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_bind: String,
    pub model_path: PathBuf,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8501".into(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    bind_addr: Option<String>,
    model_path: Option<String>,
    log_filter: Option<String>,
}

pub fn load_settings() -> Settings {
    let raw = fs::read_to_string(SETTINGS_FILE).ok();
    settings_from_sources(raw.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then `server.toml`, then environment. Later `APP__*` keys win
/// over the plain ones.
pub(crate) fn settings_from_sources(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        if let Ok(file_cfg) = toml::from_str::<FileSettings>(raw) {
            if let Some(v) = file_cfg.bind_addr {
                settings.server_bind = v;
            }
            if let Some(v) = file_cfg.model_path {
                settings.model_path = normalize_model_path(&v);
            }
            if let Some(v) = file_cfg.log_filter {
                settings.log_filter = v;
            }
        }
    }

    for key in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = env(key) {
            settings.server_bind = v;
        }
    }
    for key in ["MODEL_PATH", "APP__MODEL_PATH"] {
        if let Some(v) = env(key) {
            settings.model_path = normalize_model_path(&v);
        }
    }
    for key in ["RUST_LOG", "APP__LOG_FILTER"] {
        if let Some(v) = env(key).filter(|v| !v.trim().is_empty()) {
            settings.log_filter = v;
        }
    }

    settings
}

fn normalize_model_path(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() {
        return Settings::default().model_path;
    }
    PathBuf::from(raw)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
