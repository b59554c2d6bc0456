use faceswap_core::MAX_IMAGE_BYTES;
use faceswap_upstream::{UploadEncoding, DEFAULT_COZE_ENDPOINT, DEFAULT_IMGBB_ENDPOINT};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A credential. Never printed.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Daemon configuration.
///
/// Built once at startup from defaults, an optional TOML file named by
/// `FACESWAP_CONFIG`, then environment variables, and handed to each
/// proxy at construction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Socket address the HTTP server binds (default: 0.0.0.0:3000).
    pub listen_addr: String,
    /// Largest decoded image accepted by the upload proxy.
    pub max_upload_bytes: usize,
    pub imgbb: ImgbbConfig,
    pub coze: CozeConfig,
}

/// Image host settings (`[imgbb]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImgbbConfig {
    pub api_key: Option<Secret>,
    pub endpoint: String,
    pub encoding: UploadEncoding,
    /// Auto-delete uploads after this many seconds.
    pub expiration_secs: Option<u64>,
}

/// Workflow engine settings (`[coze]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CozeConfig {
    pub api_key: Option<Secret>,
    pub workflow_id: Option<String>,
    pub endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            max_upload_bytes: MAX_IMAGE_BYTES,
            imgbb: ImgbbConfig::default(),
            coze: CozeConfig::default(),
        }
    }
}

impl Default for ImgbbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_IMGBB_ENDPOINT.to_string(),
            encoding: UploadEncoding::default(),
            expiration_secs: None,
        }
    }
}

impl Default for CozeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            workflow_id: None,
            endpoint: DEFAULT_COZE_ENDPOINT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration, reading variables through `env`.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mut config = match lookup("FACESWAP_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(lookup);
        Ok(config)
    }

    /// Parse a TOML config file. Keys absent from the file keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config.without_blank_credentials())
    }

    /// Blank credentials in the file count as unset, same as empty env values.
    fn without_blank_credentials(mut self) -> Self {
        let blank = |v: &str| v.trim().is_empty();
        self.imgbb.api_key = self.imgbb.api_key.filter(|k| !blank(k.expose()));
        self.coze.api_key = self.coze.api_key.filter(|k| !blank(k.expose()));
        self.coze.workflow_id = self.coze.workflow_id.filter(|id| !blank(id));
        self
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("FACESWAP_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        env_parse(&env, "FACESWAP_MAX_UPLOAD_BYTES", &mut self.max_upload_bytes);

        if let Some(v) = env("IMGBB_API_KEY") {
            self.imgbb.api_key = Some(Secret::new(v));
        }
        if let Some(v) = env("FACESWAP_IMGBB_ENDPOINT") {
            self.imgbb.endpoint = v;
        }
        env_parse(&env, "FACESWAP_IMGBB_ENCODING", &mut self.imgbb.encoding);
        if let Some(v) = env("FACESWAP_IMGBB_EXPIRATION") {
            match v.parse() {
                Ok(secs) => self.imgbb.expiration_secs = Some(secs),
                Err(_) => tracing::warn!(key = "FACESWAP_IMGBB_EXPIRATION", value = %v, "ignoring unparseable value"),
            }
        }

        if let Some(v) = env("COZE_API_KEY") {
            self.coze.api_key = Some(Secret::new(v));
        }
        if let Some(v) = env("COZE_WORKFLOW_ID") {
            self.coze.workflow_id = Some(v);
        }
        if let Some(v) = env("FACESWAP_COZE_ENDPOINT") {
            self.coze.endpoint = v;
        }
    }

    pub fn image_host_configured(&self) -> bool {
        self.imgbb.api_key.is_some()
    }

    pub fn workflow_configured(&self) -> bool {
        self.coze.api_key.is_some() && self.coze.workflow_id.is_some()
    }
}

/// Overwrite `slot` with the parsed value of `key`, keeping the current value
/// when the variable is unset or malformed.
fn env_parse<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(v) = env(key) {
        match v.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %v, "ignoring unparseable value"),
        }
    }
}
