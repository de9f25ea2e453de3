//! Configuration, loaded once per invocation and passed explicitly into the
//! pipeline (no global mutable state).
//!
//! Sources, in order: environment variables (`.env` honored via dotenvy in
//! main), then an optional `provider.cfg` key=value overlay in the data
//! directory. `provider.cfg` carries only the four switchable keys so the
//! review UI can flip providers without touching secrets.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::ConfigError;

pub const PROVIDER_CFG_FILE: &str = "provider.cfg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextProvider {
    Claude,
    Gemini,
    OpenAi,
}

impl FromStr for TextProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(TextProvider::Claude),
            "gemini" => Ok(TextProvider::Gemini),
            "openai" => Ok(TextProvider::OpenAi),
            other => Err(ConfigError::UnknownProvider {
                kind: "text",
                value: other.to_string(),
                expected: "claude, gemini, openai",
            }),
        }
    }
}

impl fmt::Display for TextProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextProvider::Claude => "claude",
            TextProvider::Gemini => "gemini",
            TextProvider::OpenAi => "openai",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProvider {
    Gemini,
    OpenAi,
}

impl FromStr for ImageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(ImageProvider::Gemini),
            "openai" => Ok(ImageProvider::OpenAi),
            other => Err(ConfigError::UnknownProvider {
                kind: "image",
                value: other.to_string(),
                expected: "gemini, openai",
            }),
        }
    }
}

impl fmt::Display for ImageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageProvider::Gemini => "gemini",
            ImageProvider::OpenAi => "openai",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceSwapProvider {
    Replicate,
    Gemini,
    OpenAi,
}

impl FaceSwapProvider {
    /// Gemini/OpenAI can take the reference face as an extra input to the
    /// image-generation call itself; Replicate needs a separate edit call.
    pub fn supports_inline(&self) -> bool {
        matches!(self, FaceSwapProvider::Gemini | FaceSwapProvider::OpenAi)
    }
}

impl FromStr for FaceSwapProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replicate" => Ok(FaceSwapProvider::Replicate),
            "gemini" => Ok(FaceSwapProvider::Gemini),
            "openai" => Ok(FaceSwapProvider::OpenAi),
            other => Err(ConfigError::UnknownProvider {
                kind: "face swap",
                value: other.to_string(),
                expected: "replicate, gemini, openai",
            }),
        }
    }
}

impl fmt::Display for FaceSwapProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaceSwapProvider::Replicate => "replicate",
            FaceSwapProvider::Gemini => "gemini",
            FaceSwapProvider::OpenAi => "openai",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VkConfig {
    pub access_token: String,
    pub group_id: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MaxConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PinterestConfig {
    pub access_token: String,
    pub board_id: String,
    pub footer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub token: String,
    pub repo: String,
}

/// Full runtime configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub text_provider: TextProvider,
    pub image_provider: ImageProvider,
    pub face_swap_provider: Option<FaceSwapProvider>,
    pub autopublish_enabled: bool,
    pub claude_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub replicate_api_key: Option<String>,
    pub telegram: Option<TelegramConfig>,
    pub vk: Option<VkConfig>,
    pub max: Option<MaxConfig>,
    pub pinterest: Option<PinterestConfig>,
    pub github: Option<GithubConfig>,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from the environment, then overlay `provider.cfg`
    /// from the data directory when present.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data_dir = data_dir.as_ref().to_path_buf();

        let mut switches: BTreeMap<String, String> = BTreeMap::new();
        for key in [
            "TEXT_PROVIDER",
            "IMAGE_PROVIDER",
            "AUTOPUBLISH_ENABLED",
            "FACE_SWAP_PROVIDER",
        ] {
            if let Some(value) = env_var(key) {
                switches.insert(key.to_string(), value);
            }
        }

        let cfg_path = data_dir.join(PROVIDER_CFG_FILE);
        if cfg_path.exists() {
            let content = std::fs::read_to_string(&cfg_path).map_err(|source| ConfigError::Io {
                path: cfg_path.display().to_string(),
                source,
            })?;
            let overlay = parse_provider_cfg(&content);
            info!(path = %cfg_path.display(), keys = overlay.len(), "Loaded provider.cfg overlay");
            switches.extend(overlay);
        }

        let text_provider = switches
            .get("TEXT_PROVIDER")
            .map(String::as_str)
            .unwrap_or("claude")
            .parse()?;
        let image_provider = switches
            .get("IMAGE_PROVIDER")
            .map(String::as_str)
            .unwrap_or("gemini")
            .parse()?;
        let face_swap_provider = match switches.get("FACE_SWAP_PROVIDER").map(String::as_str) {
            None | Some("") => None,
            Some(value) => Some(value.parse()?),
        };
        let autopublish_enabled = switches
            .get("AUTOPUBLISH_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let telegram = match (env_var("TELEGRAM_BOT_TOKEN"), env_var("TELEGRAM_CHANNEL_ID")) {
            (Some(bot_token), Some(channel_id)) => Some(TelegramConfig {
                bot_token,
                channel_id,
                footer: env_var("TELEGRAM_FOOTER"),
            }),
            _ => None,
        };
        let vk = match (env_var("VK_ACCESS_TOKEN"), env_var("VK_GROUP_ID")) {
            (Some(access_token), Some(group_id)) => Some(VkConfig {
                access_token,
                group_id,
                footer: env_var("VK_FOOTER"),
            }),
            _ => None,
        };
        let max = match (env_var("MAX_BOT_TOKEN"), env_var("MAX_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(MaxConfig {
                bot_token,
                chat_id,
                footer: env_var("MAX_FOOTER"),
            }),
            _ => None,
        };
        let pinterest = match (
            env_var("PINTEREST_ACCESS_TOKEN"),
            env_var("PINTEREST_BOARD_ID"),
        ) {
            (Some(access_token), Some(board_id)) => Some(PinterestConfig {
                access_token,
                board_id,
                footer: env_var("PINTEREST_FOOTER"),
            }),
            _ => None,
        };
        let github = match (env_var("GITHUB_TOKEN"), env_var("GITHUB_REPO")) {
            (Some(token), Some(repo)) => Some(GithubConfig { token, repo }),
            _ => None,
        };

        if face_swap_provider == Some(FaceSwapProvider::Replicate)
            && env_var("REPLICATE_API_KEY").is_none()
        {
            warn!("FACE_SWAP_PROVIDER=replicate but REPLICATE_API_KEY is not set");
        }

        Ok(Config {
            data_dir,
            text_provider,
            image_provider,
            face_swap_provider,
            autopublish_enabled,
            claude_api_key: env_var("CLAUDE_API_KEY"),
            gemini_api_key: env_var("GEMINI_API_KEY"),
            openai_api_key: env_var("OPENAI_API_KEY"),
            replicate_api_key: env_var("REPLICATE_API_KEY"),
            telegram,
            vk,
            max,
            pinterest,
            github,
        })
    }

    pub fn require_claude_key(&self) -> Result<&str, ConfigError> {
        self.claude_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("CLAUDE_API_KEY"))
    }

    pub fn require_gemini_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("GEMINI_API_KEY"))
    }

    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))
    }

    pub fn require_replicate_key(&self) -> Result<&str, ConfigError> {
        self.replicate_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential("REPLICATE_API_KEY"))
    }
}

/// Parse the key=value lines of a provider.cfg document.
pub fn parse_provider_cfg(content: &str) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            result.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    result
}

/// Render the canonical four-line provider.cfg document.
pub fn render_provider_cfg(
    text_provider: &str,
    image_provider: &str,
    autopublish_enabled: bool,
    face_swap_provider: &str,
) -> String {
    let enabled = if autopublish_enabled { "true" } else { "false" };
    format!(
        "TEXT_PROVIDER={text_provider}\n\
         IMAGE_PROVIDER={image_provider}\n\
         AUTOPUBLISH_ENABLED={enabled}\n\
         FACE_SWAP_PROVIDER={face_swap_provider}\n"
    )
}
