//! Max messenger channel adapter.
//!
//! Two-step flow: upload the image to get an opaque token, then send a
//! message referencing that token as an attachment. The upload response
//! sometimes nests the token inside a `payload` wrapper.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::MaxConfig;
use crate::error::PlatformError;

use super::{strip_html, with_footer, Platform, PostReceipt};

const API_BASE: &str = "https://platform-api.max.ru";

pub struct Max {
    client: reqwest::Client,
    config: MaxConfig,
}

impl Max {
    pub fn new(config: MaxConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

/// Pull the upload token from either the flat or the wrapped response shape.
pub fn upload_token(payload: &Value) -> Option<&str> {
    payload
        .pointer("/token")
        .or_else(|| payload.pointer("/payload/token"))
        .and_then(Value::as_str)
}

/// Message ID lives at `message.body.mid`, with `message.mid` as a fallback
/// on older API versions.
pub fn message_mid(payload: &Value) -> Option<&str> {
    payload
        .pointer("/message/body/mid")
        .or_else(|| payload.pointer("/message/mid"))
        .and_then(Value::as_str)
}

#[async_trait]
impl Platform for Max {
    fn name(&self) -> &'static str {
        "max"
    }

    async fn send_post(
        &self,
        image_jpeg: &[u8],
        html_text: &str,
    ) -> Result<PostReceipt, PlatformError> {
        let plain_text = with_footer(&strip_html(html_text), self.config.footer.as_deref());

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(image_jpeg.to_vec())
                .file_name("post.jpg")
                .mime_str("image/jpeg")
                .map_err(|source| PlatformError::Http {
                    platform: "max",
                    source,
                })?,
        );
        let upload_response = self
            .client
            .post(format!("{API_BASE}/uploads"))
            .query(&[("type", "image")])
            .bearer_auth(&self.config.bot_token)
            .multipart(form)
            .send()
            .await
            .map_err(|source| PlatformError::Http {
                platform: "max",
                source,
            })?;

        let status = upload_response.status();
        let upload_payload: Value =
            upload_response
                .json()
                .await
                .map_err(|source| PlatformError::Http {
                    platform: "max",
                    source,
                })?;
        if !status.is_success() {
            return Err(PlatformError::Api {
                platform: "max",
                detail: format!("upload: HTTP {status}: {upload_payload}"),
            });
        }
        let token = upload_token(&upload_payload).ok_or_else(|| PlatformError::Api {
            platform: "max",
            detail: format!("upload: no token in response: {upload_payload}"),
        })?;
        info!("Uploaded Max image");

        let body = json!({
            "text": plain_text,
            "attachments": [{ "type": "image", "payload": { "token": token } }],
        });
        let message_response = self
            .client
            .post(format!("{API_BASE}/messages"))
            .query(&[("chat_id", self.config.chat_id.as_str())])
            .bearer_auth(&self.config.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|source| PlatformError::Http {
                platform: "max",
                source,
            })?;

        let status = message_response.status();
        let message_payload: Value =
            message_response
                .json()
                .await
                .map_err(|source| PlatformError::Http {
                    platform: "max",
                    source,
                })?;
        if !status.is_success() {
            return Err(PlatformError::Api {
                platform: "max",
                detail: format!("sendMessage: HTTP {status}: {message_payload}"),
            });
        }

        let mid = message_mid(&message_payload).unwrap_or("unknown").to_string();
        Ok(PostReceipt { message_id: mid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_found_flat_or_wrapped() {
        assert_eq!(upload_token(&json!({ "token": "t1" })), Some("t1"));
        assert_eq!(
            upload_token(&json!({ "payload": { "token": "t2" } })),
            Some("t2")
        );
        assert_eq!(upload_token(&json!({ "url": "x" })), None);
    }

    #[test]
    fn mid_prefers_body_over_top_level() {
        let nested = json!({ "message": { "body": { "mid": "a" }, "mid": "b" } });
        assert_eq!(message_mid(&nested), Some("a"));
        let flat = json!({ "message": { "mid": "b" } });
        assert_eq!(message_mid(&flat), Some("b"));
        assert_eq!(message_mid(&json!({})), None);
    }
}
