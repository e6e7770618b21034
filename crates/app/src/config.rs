use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_core::TagId;
use tally_extract::openai::DEFAULT_MODEL;
use tally_match::MatchWindows;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Could not determine a data directory for the cache")]
    NoDataDir,
}

/// The config file as written: every key optional, environment fills gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    paperless_url: Option<String>,
    paperless_token: Option<String>,
    openai_api_key: Option<String>,
    openai_model: Option<String>,
    statement_tag_id: Option<i64>,
    write_notes: Option<bool>,
    cache_dir: Option<PathBuf>,
    request_timeout_secs: Option<u64>,
    windows: MatchWindows,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paperless_url: String,
    pub paperless_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub statement_tag: TagId,
    pub write_notes: bool,
    pub cache_dir: PathBuf,
    pub request_timeout: Duration,
    pub windows: MatchWindows,
}

impl AppConfig {
    /// Load `path` (if given), then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn from_toml(text: &str, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let file = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::resolve(file, env)
    }

    fn resolve(mut file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = env("PAPERLESS_URL") {
            file.paperless_url = Some(v);
        }
        if let Some(v) = env("PAPERLESS_TOKEN") {
            file.paperless_token = Some(v);
        }
        if let Some(v) = env("OPENAI_API_KEY") {
            file.openai_api_key = Some(v);
        }
        if let Some(v) = env("OPENAI_MODEL") {
            file.openai_model = Some(v);
        }
        if let Some(v) = env("BANK_STATEMENT_TAG_ID") {
            let id = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key: "BANK_STATEMENT_TAG_ID", value: v.clone() })?;
            file.statement_tag_id = Some(id);
        }
        if let Some(v) = env("WRITE_NOTES") {
            file.write_notes = Some(parse_flag(&v));
        }
        if let Some(v) = env("TALLY_CACHE_DIR") {
            file.cache_dir = Some(PathBuf::from(v));
        }

        let cache_dir = match file.cache_dir {
            Some(dir) => dir,
            None => default_cache_dir()?,
        };
        let timeout = file.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout == 0 {
            return Err(ConfigError::Invalid { key: "request_timeout_secs", value: "0".to_string() });
        }

        Ok(Self {
            paperless_url: required(file.paperless_url, "PAPERLESS_URL")?,
            paperless_token: required(file.paperless_token, "PAPERLESS_TOKEN")?,
            openai_api_key: required(file.openai_api_key, "OPENAI_API_KEY")?,
            openai_model: file
                .openai_model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            statement_tag: TagId(file.statement_tag_id.ok_or(ConfigError::Missing("BANK_STATEMENT_TAG_ID"))?),
            write_notes: file.write_notes.unwrap_or(false),
            cache_dir,
            request_timeout: Duration::from_secs(timeout),
            windows: file.windows,
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn default_cache_dir() -> Result<PathBuf, ConfigError> {
    let dirs = directories::ProjectDirs::from("com", "tally", "Tally").ok_or(ConfigError::NoDataDir)?;
    Ok(dirs.data_dir().join("cache"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const BASE: &str = r#"
        paperless_url = "https://docs.example.com"
        paperless_token = "tok"
        openai_api_key = "sk-test"
        statement_tag_id = 12
        cache_dir = "/tmp/tally"
    "#;

    #[test]
    fn file_values_and_defaults() {
        let config = AppConfig::from_toml(BASE, env(&[])).unwrap();
        assert_eq!(config.statement_tag, TagId(12));
        assert_eq!(config.openai_model, DEFAULT_MODEL);
        assert!(!config.write_notes);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.windows, MatchWindows::default());
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/tally"));
    }

    #[test]
    fn environment_overrides_file() {
        let config = AppConfig::from_toml(
            BASE,
            env(&[
                ("PAPERLESS_URL", "https://other.example.com"),
                ("BANK_STATEMENT_TAG_ID", " 7 "),
                ("WRITE_NOTES", "Yes"),
                ("OPENAI_MODEL", "gpt-4o"),
                ("TALLY_CACHE_DIR", "/var/cache/tally"),
            ]),
        )
        .unwrap();
        assert_eq!(config.paperless_url, "https://other.example.com");
        assert_eq!(config.statement_tag, TagId(7));
        assert!(config.write_notes);
        assert_eq!(config.openai_model, "gpt-4o");
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/tally"));
    }

    #[test]
    fn write_notes_accepts_only_known_truthy_values() {
        for (value, expected) in [("true", true), ("1", true), ("YES", true), ("no", false), ("on", false)] {
            let config = AppConfig::from_toml(BASE, env(&[("WRITE_NOTES", value)])).unwrap();
            assert_eq!(config.write_notes, expected, "{value}");
        }
    }

    #[test]
    fn missing_required_setting_is_reported() {
        let err = AppConfig::from_toml("statement_tag_id = 1\ncache_dir = \"/tmp\"", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PAPERLESS_URL")));

        let only_env = env(&[
            ("PAPERLESS_URL", "http://p"),
            ("PAPERLESS_TOKEN", "t"),
            ("OPENAI_API_KEY", "k"),
            ("TALLY_CACHE_DIR", "/tmp"),
        ]);
        let err = AppConfig::from_toml("", only_env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BANK_STATEMENT_TAG_ID")));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let err = AppConfig::from_toml(BASE, env(&[("PAPERLESS_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PAPERLESS_TOKEN")));
    }

    #[test]
    fn non_numeric_tag_is_invalid() {
        let err = AppConfig::from_toml(BASE, env(&[("BANK_STATEMENT_TAG_ID", "bank")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "BANK_STATEMENT_TAG_ID", .. }));
    }

    #[test]
    fn windows_table_overrides_defaults() {
        let text = format!("{BASE}\n[windows]\ndebit_lookback_days = 45\n");
        let config = AppConfig::from_toml(&text, env(&[])).unwrap();
        assert_eq!(config.windows.debit_lookback_days, 45);
        assert_eq!(config.windows.credit_lookback_days, MatchWindows::default().credit_lookback_days);
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let text = format!("request_timeout_secs = 0\n{BASE}");
        assert!(matches!(
            AppConfig::from_toml(&text, env(&[])),
            Err(ConfigError::Invalid { key: "request_timeout_secs", .. })
        ));
    }

    #[test]
    fn missing_config_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
