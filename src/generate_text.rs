//! Post text generation.
//!
//! One [`TextGenerator`] trait, three HTTP implementations (Claude, Gemini,
//! OpenAI). The model is asked to answer in a `POST:` / `IMAGE_PROMPT:`
//! two-section format; when it ignores the format, the whole reply becomes
//! the post text and the image prompt falls back to a template.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;
use crate::store::{ContextDocument, PromptOverrides};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
Ты — эксперт по естественному омоложению лица. Ты ведёшь Telegram-канал и пишешь \
увлекательные, полезные посты для женщин 30-55 лет.

Правила:
- Пиши на русском языке
- Используй HTML-разметку для Telegram: <b>жирный</b>, <i>курсив</i>
- Длина поста: 500-1000 символов (не больше, это Telegram)
- Структура: цепляющий заголовок → полезный контент → призыв к действию
- Добавь 3-5 релевантных хэштегов в конце
- Не используй Markdown, только HTML-теги
- Разделяй абзацы пустой строкой (двойной \\n)
- Тон: дружелюбный, экспертный, без воды

Ответ должен быть в формате:
POST:
<текст поста с HTML-разметкой>

IMAGE_PROMPT:
<промпт на английском языке для генерации картинки к этому посту, \
описывающий красивое, эстетичное изображение связанное с темой поста, \
без текста на картинке, в стиле профессиональной фотографии>";

pub const DEFAULT_IMAGE_PROMPT_TEMPLATE: &str =
    "Beautiful aesthetic photo related to facial rejuvenation and {idea}, \
     professional photography, soft lighting, skincare";

const USER_MESSAGE_PREFIX: &str = "Напиши пост на тему: ";

const CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";
const GEMINI_MODEL: &str = "gemini-2.5-flash";
const OPENAI_MODEL: &str = "gpt-4o";
const MAX_TOKENS: u32 = 1500;

/// Parsed model output: the post body and the prompt for the illustration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPost {
    pub post_text: String,
    pub image_prompt: String,
}

/// Generates a raw model reply for a system prompt + user message pair.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError>;
}

/// Split a raw reply on the `POST:` / `IMAGE_PROMPT:` markers. A reply
/// missing either marker is used whole as the post text, with the image
/// prompt rendered from the fallback template.
pub fn parse_reply(reply: &str, idea: &str, image_prompt_template: Option<&str>) -> GeneratedPost {
    if reply.contains("POST:") && reply.contains("IMAGE_PROMPT:") {
        // A repeated marker ends the prompt: only the segment between the
        // first two occurrences is kept.
        let mut segments = reply.split("IMAGE_PROMPT:");
        if let (Some(head), Some(prompt)) = (segments.next(), segments.next()) {
            return GeneratedPost {
                post_text: head.replacen("POST:", "", 1).trim().to_string(),
                image_prompt: prompt.trim().to_string(),
            };
        }
    }
    let template = image_prompt_template.unwrap_or(DEFAULT_IMAGE_PROMPT_TEMPLATE);
    GeneratedPost {
        post_text: reply.trim().to_string(),
        image_prompt: template.replace("{idea}", idea),
    }
}

/// Resolve the effective system prompt and fallback template: stored
/// overrides win over the defaults, and an attached context document is
/// appended to the system prompt verbatim inside a delimited block.
pub fn resolve_prompts(
    overrides: &PromptOverrides,
    context: Option<&ContextDocument>,
) -> (String, Option<String>) {
    let mut system_prompt = overrides
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    if let Some(text) = context.and_then(|c| c.text.as_deref()).filter(|t| !t.is_empty()) {
        system_prompt.push_str(&format!(
            "\n\n--- КОНТЕКСТНЫЙ ДОКУМЕНТ ---\n\
             {text}\n\
             --- КОНЕЦ ДОКУМЕНТА ---\n\n\
             Используй информацию из документа выше как источник данных и контекст \
             при написании поста. Опирайся на факты и стиль из документа."
        ));
    }

    (system_prompt, overrides.image_prompt_template.clone())
}

pub fn user_message(idea: &str) -> String {
    format!("{USER_MESSAGE_PREFIX}{idea}")
}

/// Build the configured generator.
pub fn generator_for(config: &Config) -> Result<Box<dyn TextGenerator>, ProviderError> {
    use crate::config::TextProvider;
    let generator: Box<dyn TextGenerator> = match config.text_provider {
        TextProvider::Claude => Box::new(ClaudeText::new(config.require_claude_key()?)),
        TextProvider::Gemini => Box::new(GeminiText::new(config.require_gemini_key()?)),
        TextProvider::OpenAi => Box::new(OpenAiText::new(config.require_openai_key()?)),
    };
    Ok(generator)
}

fn field<'a>(value: &'a Value, pointer: &str, provider: &'static str) -> Result<&'a str, ProviderError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider,
            detail: format!("missing {pointer} in response"),
        })
}

pub struct ClaudeText {
    client: reqwest::Client,
    api_key: String,
}

impl ClaudeText {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for ClaudeText {
    fn provider_name(&self) -> &'static str {
        "claude"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError> {
        info!(model = CLAUDE_MODEL, "Requesting post text from Claude");
        let body = json!({
            "model": CLAUDE_MODEL,
            "max_tokens": MAX_TOKENS,
            "system": system_prompt,
            "messages": [{ "role": "user", "content": user_message }],
        });
        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "claude",
                source,
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|source| ProviderError::Http {
            provider: "claude",
            source,
        })?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "claude",
                detail: format!("HTTP {status}: {payload}"),
            });
        }
        Ok(field(&payload, "/content/0/text", "claude")?.to_string())
    }
}

pub struct GeminiText {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiText {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiText {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError> {
        info!(model = GEMINI_MODEL, "Requesting post text from Gemini");
        // Gemini takes one flat content string rather than a system role.
        let body = json!({
            "contents": [{
                "parts": [{ "text": format!("{system_prompt}\n\n{user_message}") }],
            }],
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{GEMINI_MODEL}:generateContent"
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "gemini",
                source,
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|source| ProviderError::Http {
            provider: "gemini",
            source,
        })?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "gemini",
                detail: format!("HTTP {status}: {payload}"),
            });
        }
        Ok(field(
            &payload,
            "/candidates/0/content/parts/0/text",
            "gemini",
        )?
        .to_string())
    }
}

pub struct OpenAiText {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiText {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiText {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, ProviderError> {
        info!(model = OPENAI_MODEL, "Requesting post text from OpenAI");
        let body = json!({
            "model": OPENAI_MODEL,
            "max_tokens": MAX_TOKENS,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
        });
        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "openai",
                source,
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|source| ProviderError::Http {
            provider: "openai",
            source,
        })?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "openai",
                detail: format!("HTTP {status}: {payload}"),
            });
        }
        Ok(field(&payload, "/choices/0/message/content", "openai")?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_with_both_markers_is_split() {
        let reply = "POST:\n<b>Заголовок</b>\n\nТекст поста\n\nIMAGE_PROMPT:\nA serene photo";
        let parsed = parse_reply(reply, "idea", None);
        assert_eq!(parsed.post_text, "<b>Заголовок</b>\n\nТекст поста");
        assert_eq!(parsed.image_prompt, "A serene photo");
    }

    #[test]
    fn reply_without_markers_falls_back_to_template() {
        let parsed = parse_reply("Просто текст без маркеров", "массаж лица", None);
        assert_eq!(parsed.post_text, "Просто текст без маркеров");
        assert!(parsed.image_prompt.contains("массаж лица"));
        assert!(parsed.image_prompt.contains("professional photography"));
    }

    #[test]
    fn custom_template_substitutes_idea() {
        let parsed = parse_reply("no markers", "yoga", Some("Photo of {idea}, close up"));
        assert_eq!(parsed.image_prompt, "Photo of yoga, close up");
    }

    #[test]
    fn repeated_image_prompt_marker_ends_the_prompt() {
        let reply = "POST:\nТекст\n\nIMAGE_PROMPT:\nA calm photo\n\nIMAGE_PROMPT:\nsecond attempt";
        let parsed = parse_reply(reply, "idea", None);
        assert_eq!(parsed.post_text, "Текст");
        assert_eq!(parsed.image_prompt, "A calm photo");
    }

    #[test]
    fn only_one_marker_counts_as_missing() {
        let parsed = parse_reply("POST:\nтолько пост", "idea", None);
        assert_eq!(parsed.post_text, "POST:\nтолько пост");
    }

    #[test]
    fn overrides_win_over_defaults() {
        let overrides = PromptOverrides {
            system_prompt: Some("custom system".to_string()),
            image_prompt_template: Some("custom {idea}".to_string()),
        };
        let (system, template) = resolve_prompts(&overrides, None);
        assert_eq!(system, "custom system");
        assert_eq!(template.as_deref(), Some("custom {idea}"));
    }

    #[test]
    fn context_document_is_appended_to_system_prompt() {
        let context = ContextDocument {
            filename: Some("notes.txt".to_string()),
            text: Some("факты о коллагене".to_string()),
        };
        let (system, _) = resolve_prompts(&PromptOverrides::default(), Some(&context));
        assert!(system.starts_with(DEFAULT_SYSTEM_PROMPT));
        assert!(system.contains("факты о коллагене"));
        assert!(system.contains("КОНТЕКСТНЫЙ ДОКУМЕНТ"));
    }

    #[test]
    fn empty_context_text_is_ignored() {
        let context = ContextDocument {
            filename: None,
            text: Some(String::new()),
        };
        let (system, _) = resolve_prompts(&PromptOverrides::default(), Some(&context));
        assert_eq!(system, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn user_message_embeds_idea() {
        assert_eq!(
            user_message("гимнастика для лица"),
            "Напиши пост на тему: гимнастика для лица"
        );
    }
}
