use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::paths;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine the user config directory")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Storage medium for the progress ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    File,
    Sqlite,
}

impl LedgerBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub config_dir: PathBuf,
    pub ledger: LedgerBackend,
    /// Bytes written between cancellation checks
    pub chunk_size: usize,
    pub poll_interval_ms: u64,
    pub connect_timeout_secs: u64,
    /// Longest wait for the next piece of a download body
    pub read_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Serve every artifact from `<mirror>/<storage dir>/<file>` instead of upstream
    pub mirror_url: Option<String>,
    /// Program and leading arguments for the external transcriber
    pub transcribe_command: Option<Vec<String>>,
}

/// Keys accepted in `server.toml`. Everything is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    ledger: Option<LedgerBackend>,
    chunk_size: Option<usize>,
    poll_interval_ms: Option<u64>,
    connect_timeout_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    mirror_url: Option<String>,
    transcribe_command: Option<Vec<String>>,
}

impl Config {
    pub fn with_root(config_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 52014,
            config_dir,
            ledger: LedgerBackend::File,
            chunk_size: 1024,
            poll_interval_ms: 1000,
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            request_timeout_secs: 1200,
            mirror_url: None,
            transcribe_command: None,
        }
    }

    /// Defaults, then `<root>/server.toml`, then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let root = match std::env::var_os("NEURONBOX_CONFIG_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => paths::default_config_root().ok_or(ConfigError::NoConfigDir)?,
        };

        let mut config = Self::with_root(root);
        let file = paths::config_file_path(&config.config_dir);
        if file.exists() {
            config.merge_file(&file)?;
        }
        config.merge_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(ledger) = file.ledger {
            self.ledger = ledger;
        }
        if let Some(chunk_size) = file.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(secs) = file.read_timeout_secs {
            self.read_timeout_secs = secs;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout_secs = secs;
        }
        if file.mirror_url.is_some() {
            self.mirror_url = file.mirror_url;
        }
        if file.transcribe_command.is_some() {
            self.transcribe_command = file.transcribe_command;
        }
        Ok(())
    }

    fn merge_env<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(host) = get("NEURONBOX_HOST") {
            self.host = host;
        }
        if let Some(port) = get("PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "PORT", value: port })?;
        }
        if let Some(ledger) = get("NEURONBOX_LEDGER") {
            self.ledger = LedgerBackend::parse(&ledger).ok_or(ConfigError::InvalidEnv {
                name: "NEURONBOX_LEDGER",
                value: ledger,
            })?;
        }
        if let Some(mirror) = get("NEURONBOX_MIRROR_URL") {
            self.mirror_url = Some(mirror);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero("chunk_size"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero("poll_interval_ms"));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::Zero("read_timeout_secs"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn models_dir(&self) -> PathBuf {
        paths::models_dir(&self.config_dir)
    }

    pub fn download_status_dir(&self) -> PathBuf {
        paths::download_status_dir(&self.config_dir)
    }
}
