use std::{
    env, fs,
    net::SocketAddr,
    path::Path,
    time::Duration,
};

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::{
    capabilities::DEFAULT_MAX_BATCH_PROMPTS,
    session::{DEFAULT_HISTORY_DISPLAY_LIMIT, DEFAULT_MAX_SESSIONS},
};

const DEFAULT_CONFIG_PATH: &str = "config/app_config.toml";
const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Room for a handful of full-resolution images encoded as data URIs.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub request_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub auth: Option<AuthConfig>,
    pub max_body_bytes: usize,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub access_key: String,
    pub secret_key: String,
    pub signature_ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub server: ServerConfig,
    pub max_batch_prompts: usize,
    pub history_display_limit: usize,
    pub max_sessions: usize,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_path =
            env::var("APP_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let file_config = FileConfig::read(Path::new(&config_path))?;
        Self::from_file(file_config, env::var(API_KEY_ENV).ok())
    }

    fn from_file(file_config: FileConfig, env_api_key: Option<String>) -> anyhow::Result<Self> {
        let gemini = file_config
            .gemini
            .unwrap_or_default()
            .into_domain(env_api_key)?;

        let server = file_config.server.unwrap_or_default().into_domain()?;

        let max_batch_prompts = file_config
            .batch
            .and_then(|section| section.max_prompts)
            .unwrap_or(DEFAULT_MAX_BATCH_PROMPTS)
            .max(1);

        let history_display_limit = file_config
            .session
            .as_ref()
            .and_then(|section| section.history_display_limit)
            .unwrap_or(DEFAULT_HISTORY_DISPLAY_LIMIT)
            .max(1);

        let max_sessions = file_config
            .session
            .as_ref()
            .and_then(|section| section.max_sessions)
            .unwrap_or(DEFAULT_MAX_SESSIONS)
            .max(1);

        Ok(Self {
            gemini,
            server,
            max_batch_prompts,
            history_display_limit,
            max_sessions,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: Option<FileServerConfig>,
    #[serde(default)]
    gemini: Option<FileGeminiConfig>,
    #[serde(default)]
    batch: Option<FileBatchConfig>,
    #[serde(default)]
    session: Option<FileSessionConfig>,
}

impl FileConfig {
    /// A missing file means "all defaults"; a malformed one is an error.
    fn read(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = ?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;

        toml::from_str(&contents).with_context(|| format!("failed to parse config file {:?}", path))
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileGeminiConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    text_model: Option<String>,
    #[serde(default)]
    image_model: Option<String>,
    #[serde(default)]
    request_timeout_seconds: Option<u64>,
}

impl FileGeminiConfig {
    fn into_domain(self, env_api_key: Option<String>) -> anyhow::Result<GeminiConfig> {
        let api_key = env_api_key
            .filter(|key| !key.trim().is_empty())
            .or(self.api_key)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("set {API_KEY_ENV} or gemini.api_key in the config file"))?;

        Ok(GeminiConfig {
            api_key,
            api_base: self
                .api_base
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            text_model: self
                .text_model
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: self
                .image_model
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            request_timeout: Duration::from_secs(
                self.request_timeout_seconds
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECONDS)
                    .max(1),
            ),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileServerConfig {
    #[serde(default)]
    bind_addr: Option<String>,
    #[serde(default)]
    access_key: Option<String>,
    #[serde(default)]
    secret_key: Option<String>,
    #[serde(default)]
    signature_ttl_seconds: Option<u64>,
    #[serde(default)]
    max_body_bytes: Option<usize>,
}

impl FileServerConfig {
    fn into_domain(self) -> anyhow::Result<ServerConfig> {
        let bind_addr_str = self
            .bind_addr
            .unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .with_context(|| format!("failed to parse server.bind_addr: {}", bind_addr_str))?;

        let auth = match (self.access_key, self.secret_key) {
            (Some(access_key), Some(secret_key)) => Some(AuthConfig {
                access_key,
                secret_key,
                signature_ttl: Duration::from_secs(
                    self.signature_ttl_seconds.unwrap_or(300).max(30),
                ),
            }),
            (None, None) => None,
            _ => {
                return Err(anyhow!(
                    "server.access_key and server.secret_key must be configured together"
                ));
            }
        };

        let max_body_bytes = self
            .max_body_bytes
            .unwrap_or(DEFAULT_MAX_BODY_BYTES)
            .max(64 * 1024);

        Ok(ServerConfig {
            bind_addr,
            auth,
            max_body_bytes,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
struct FileBatchConfig {
    #[serde(default)]
    max_prompts: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct FileSessionConfig {
    #[serde(default)]
    history_display_limit: Option<usize>,
    #[serde(default)]
    max_sessions: Option<usize>,
}
