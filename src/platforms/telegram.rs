//! Telegram channel adapter.
//!
//! Photo posts go through `sendPhoto` with an HTML caption. Captions are
//! capped at 1024 characters; longer posts are delivered as a caption-less
//! photo followed immediately by the full text via `sendMessage`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::error::PlatformError;

use super::{with_footer, Platform, PostReceipt};

pub const CAPTION_LIMIT: usize = 1024;

const API_BASE: &str = "https://api.telegram.org";

pub struct Telegram {
    client: reqwest::Client,
    config: TelegramConfig,
    api_base: String,
}

impl Telegram {
    pub fn new(config: TelegramConfig) -> Self {
        Self::with_api_base(config, API_BASE)
    }

    /// Point the adapter at a different API host, for tests against a local
    /// stand-in server.
    pub fn with_api_base(config: TelegramConfig, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_base: api_base.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.config.bot_token)
    }

    async fn call(&self, method: &str, form: reqwest::multipart::Form) -> Result<Value, PlatformError> {
        let response = self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|source| PlatformError::Http {
                platform: "telegram",
                source,
            })?;
        let payload: Value = response.json().await.map_err(|source| PlatformError::Http {
            platform: "telegram",
            source,
        })?;
        if payload.pointer("/ok").and_then(Value::as_bool) != Some(true) {
            return Err(PlatformError::Api {
                platform: "telegram",
                detail: format!("{method}: {payload}"),
            });
        }
        Ok(payload)
    }

    async fn send_photo(
        &self,
        image_jpeg: &[u8],
        caption: Option<&str>,
    ) -> Result<String, PlatformError> {
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", self.config.channel_id.clone())
            .part(
                "photo",
                reqwest::multipart::Part::bytes(image_jpeg.to_vec())
                    .file_name("post.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|source| PlatformError::Http {
                        platform: "telegram",
                        source,
                    })?,
            );
        if let Some(caption) = caption {
            form = form
                .text("caption", caption.to_string())
                .text("parse_mode", "HTML");
        }
        let payload = self.call("sendPhoto", form).await?;
        message_id(&payload)
    }

    async fn send_message(&self, text: &str) -> Result<String, PlatformError> {
        let form = reqwest::multipart::Form::new()
            .text("chat_id", self.config.channel_id.clone())
            .text("text", text.to_string())
            .text("parse_mode", "HTML");
        let payload = self.call("sendMessage", form).await?;
        message_id(&payload)
    }
}

fn message_id(payload: &Value) -> Result<String, PlatformError> {
    payload
        .pointer("/result/message_id")
        .and_then(Value::as_i64)
        .map(|id| id.to_string())
        .ok_or_else(|| PlatformError::Api {
            platform: "telegram",
            detail: format!("no message_id in response: {payload}"),
        })
}

/// Whether the caption fits Telegram's limit, counted in characters rather
/// than bytes (the text is Russian, so the two differ).
pub fn fits_caption(text: &str) -> bool {
    text.chars().count() <= CAPTION_LIMIT
}

#[async_trait]
impl Platform for Telegram {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send_post(
        &self,
        image_jpeg: &[u8],
        html_text: &str,
    ) -> Result<PostReceipt, PlatformError> {
        let text = with_footer(html_text, self.config.footer.as_deref());

        let id = if fits_caption(&text) {
            info!(chars = text.chars().count(), "Sending Telegram photo with caption");
            self.send_photo(image_jpeg, Some(&text)).await?
        } else {
            warn!(
                chars = text.chars().count(),
                limit = CAPTION_LIMIT,
                "Caption over limit, sending photo and text separately"
            );
            let photo_id = self.send_photo(image_jpeg, None).await?;
            self.send_message(&text).await?;
            photo_id
        };
        Ok(PostReceipt { message_id: id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_limit_counts_characters_not_bytes() {
        // 1024 Cyrillic characters are 2048 bytes but still fit.
        let cyrillic = "я".repeat(CAPTION_LIMIT);
        assert!(fits_caption(&cyrillic));
        assert!(!fits_caption(&"я".repeat(CAPTION_LIMIT + 1)));
    }

    #[test]
    fn message_id_extracted_from_result() {
        let payload = serde_json::json!({ "ok": true, "result": { "message_id": 42 } });
        assert_eq!(message_id(&payload).unwrap(), "42");
    }

    #[test]
    fn missing_message_id_is_an_error() {
        let payload = serde_json::json!({ "ok": true, "result": {} });
        assert!(message_id(&payload).is_err());
    }
}
