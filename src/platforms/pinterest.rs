//! Pinterest board adapter (API v5).
//!
//! A pin wants a short title and a description rather than one caption:
//! the first line of the stripped text becomes the title (100 chars max),
//! the remainder the description (500 chars max). The image travels inline
//! as base64 with an explicit content type.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::PinterestConfig;
use crate::error::PlatformError;
use crate::media;

use super::{strip_html, with_footer, Platform, PostReceipt};

const API_BASE: &str = "https://api.pinterest.com/v5";
pub const TITLE_LIMIT: usize = 100;
pub const DESCRIPTION_LIMIT: usize = 500;

pub struct Pinterest {
    client: reqwest::Client,
    config: PinterestConfig,
}

impl Pinterest {
    pub fn new(config: PinterestConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Split the plain text into `(title, description)` with the v5 length caps.
pub fn title_and_description(plain_text: &str) -> (String, String) {
    match plain_text.split_once('\n') {
        Some((first, rest)) => (
            truncate_chars(first, TITLE_LIMIT),
            truncate_chars(rest, DESCRIPTION_LIMIT),
        ),
        None => (truncate_chars(plain_text, TITLE_LIMIT), String::new()),
    }
}

#[async_trait]
impl Platform for Pinterest {
    fn name(&self) -> &'static str {
        "pinterest"
    }

    async fn send_post(
        &self,
        image_jpeg: &[u8],
        html_text: &str,
    ) -> Result<PostReceipt, PlatformError> {
        let plain_text = with_footer(&strip_html(html_text), self.config.footer.as_deref());
        let (title, description) = title_and_description(&plain_text);

        let body = json!({
            "board_id": self.config.board_id,
            "title": title,
            "description": description,
            "media_source": {
                "source_type": "image_base64",
                "content_type": media::detect_content_type(image_jpeg),
                "data": media::encode_base64(image_jpeg),
            },
        });
        info!(title = %title, "Creating Pinterest pin");

        let response = self
            .client
            .post(format!("{API_BASE}/pins"))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|source| PlatformError::Http {
                platform: "pinterest",
                source,
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|source| PlatformError::Http {
            platform: "pinterest",
            source,
        })?;
        // The pins endpoint answers 201 on create; some proxies report 200.
        if status.as_u16() != 200 && status.as_u16() != 201 {
            return Err(PlatformError::Api {
                platform: "pinterest",
                detail: format!("HTTP {status}: {payload}"),
            });
        }

        let pin_id = payload
            .pointer("/id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        Ok(PostReceipt { message_id: pin_id })
    }
}
