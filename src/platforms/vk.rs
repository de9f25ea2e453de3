//! VKontakte community wall adapter.
//!
//! VK has two photo upload servers. User tokens use the wall upload server;
//! community tokens are rejected there with a group-authorization error and
//! must go through the messages upload server instead. The adapter tries the
//! wall path first and falls back on that specific error.
//!
//! Photos saved via the messages server carry an `access_key` that must be
//! propagated into the attachment string, otherwise the wall attachment
//! silently fails to render.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::VkConfig;
use crate::error::PlatformError;

use super::{strip_html, with_footer, Platform, PostReceipt};

const API_VERSION: &str = "5.199";
const API_BASE: &str = "https://api.vk.com/method";

pub struct Vk {
    client: reqwest::Client,
    config: VkConfig,
    api_base: String,
}

/// A saved photo, ready to be referenced as a wall attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedPhoto {
    pub owner_id: i64,
    pub id: i64,
    pub access_key: Option<String>,
}

/// Render the `photo{owner}_{id}[_{access_key}]` attachment reference.
pub fn attachment_string(photo: &SavedPhoto) -> String {
    match &photo.access_key {
        Some(key) => format!("photo{}_{}_{key}", photo.owner_id, photo.id),
        None => format!("photo{}_{}", photo.owner_id, photo.id),
    }
}

impl Vk {
    pub fn new(config: VkConfig) -> Self {
        Self::with_api_base(config, API_BASE)
    }

    /// Point the adapter at a different API host, for tests against a local
    /// stand-in server.
    pub fn with_api_base(config: VkConfig, api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            api_base: api_base.into(),
        }
    }

    fn group_id(&self) -> &str {
        self.config.group_id.trim_start_matches('-')
    }

    async fn api_get(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, PlatformError> {
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("access_token", &self.config.access_token));
        query.push(("v", API_VERSION));
        let response = self
            .client
            .get(format!("{}/{method}", self.api_base))
            .query(&query)
            .send()
            .await
            .map_err(|source| PlatformError::Http {
                platform: "vk",
                source,
            })?;
        let payload: Value = response.json().await.map_err(|source| PlatformError::Http {
            platform: "vk",
            source,
        })?;
        if let Some(error) = payload.get("error") {
            return Err(PlatformError::Api {
                platform: "vk",
                detail: format!("VK {method}: {error}"),
            });
        }
        Ok(payload)
    }

    /// Upload the raw photo bytes to an upload server URL.
    async fn upload_to(&self, upload_url: &str, image_jpeg: &[u8]) -> Result<Value, PlatformError> {
        let form = reqwest::multipart::Form::new().part(
            "photo",
            reqwest::multipart::Part::bytes(image_jpeg.to_vec())
                .file_name("post.jpg")
                .mime_str("image/jpeg")
                .map_err(|source| PlatformError::Http {
                    platform: "vk",
                    source,
                })?,
        );
        let response = self
            .client
            .post(upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| PlatformError::Http {
                platform: "vk",
                source,
            })?;
        let payload: Value = response.json().await.map_err(|source| PlatformError::Http {
            platform: "vk",
            source,
        })?;

        if !upload_succeeded(&payload) {
            return Err(PlatformError::Api {
                platform: "vk",
                detail: format!("VK photo upload failed: {payload}"),
            });
        }
        Ok(payload)
    }

    async fn upload_wall(&self, image_jpeg: &[u8]) -> Result<SavedPhoto, PlatformError> {
        let server = self
            .api_get("photos.getWallUploadServer", &[("group_id", self.group_id())])
            .await?;
        let upload_url = upload_url(&server)?;
        let uploaded = self.upload_to(&upload_url, image_jpeg).await?;

        let server = field_any(&uploaded, "server")?;
        let saved = self
            .api_get(
                "photos.saveWallPhoto",
                &[
                    ("group_id", self.group_id()),
                    ("photo", field_str(&uploaded, "photo")?),
                    ("server", server.as_str()),
                    ("hash", field_str(&uploaded, "hash")?),
                ],
            )
            .await?;
        saved_photo(&saved)
    }

    async fn upload_messages(&self, image_jpeg: &[u8]) -> Result<SavedPhoto, PlatformError> {
        let server = self
            .api_get(
                "photos.getMessagesUploadServer",
                &[("group_id", self.group_id())],
            )
            .await?;
        let upload_url = upload_url(&server)?;
        let uploaded = self.upload_to(&upload_url, image_jpeg).await?;

        let server = field_any(&uploaded, "server")?;
        let saved = self
            .api_get(
                "photos.saveMessagesPhoto",
                &[
                    ("photo", field_str(&uploaded, "photo")?),
                    ("server", server.as_str()),
                    ("hash", field_str(&uploaded, "hash")?),
                ],
            )
            .await?;
        saved_photo(&saved)
    }
}

/// The upload server reports failure with a missing, empty or literal `"[]"`
/// photo field.
fn upload_succeeded(payload: &Value) -> bool {
    matches!(
        payload.get("photo").and_then(Value::as_str),
        Some(photo) if !photo.is_empty() && photo != "[]"
    )
}

fn upload_url(server_response: &Value) -> Result<String, PlatformError> {
    server_response
        .pointer("/response/upload_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PlatformError::Api {
            platform: "vk",
            detail: format!("no upload_url in response: {server_response}"),
        })
}

fn field_str<'a>(payload: &'a Value, key: &str) -> Result<&'a str, PlatformError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| PlatformError::Api {
            platform: "vk",
            detail: format!("upload response missing {key}: {payload}"),
        })
}

/// `server` comes back as a number; stringify whatever is there.
fn field_any(payload: &Value, key: &str) -> Result<String, PlatformError> {
    match payload.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) if !other.is_null() => Ok(other.to_string()),
        _ => Err(PlatformError::Api {
            platform: "vk",
            detail: format!("upload response missing {key}: {payload}"),
        }),
    }
}

fn saved_photo(saved: &Value) -> Result<SavedPhoto, PlatformError> {
    let info = saved
        .pointer("/response/0")
        .ok_or_else(|| PlatformError::Api {
            platform: "vk",
            detail: format!("empty save response: {saved}"),
        })?;
    let owner_id = info
        .get("owner_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| PlatformError::Api {
            platform: "vk",
            detail: format!("saved photo missing owner_id: {info}"),
        })?;
    let id = info
        .get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| PlatformError::Api {
            platform: "vk",
            detail: format!("saved photo missing id: {info}"),
        })?;
    Ok(SavedPhoto {
        owner_id,
        id,
        access_key: info
            .get("access_key")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[async_trait]
impl Platform for Vk {
    fn name(&self) -> &'static str {
        "vk"
    }

    async fn send_post(
        &self,
        image_jpeg: &[u8],
        html_text: &str,
    ) -> Result<PostReceipt, PlatformError> {
        let plain_text = with_footer(&strip_html(html_text), self.config.footer.as_deref());

        let photo = match self.upload_wall(image_jpeg).await {
            Ok(photo) => photo,
            Err(err) if err.is_group_auth() => {
                warn!("Wall upload rejected for community token, using messages upload server");
                self.upload_messages(image_jpeg).await?
            }
            Err(err) => return Err(err),
        };
        let attachment = attachment_string(&photo);
        info!(attachment = %attachment, "Uploaded VK photo");

        let gid = self.group_id();
        let owner = format!("-{gid}");
        let posted = self
            .api_get(
                "wall.post",
                &[
                    ("owner_id", owner.as_str()),
                    ("from_group", "1"),
                    ("message", &plain_text),
                    ("attachments", &attachment),
                ],
            )
            .await?;
        let post_id = posted
            .pointer("/response/post_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| PlatformError::Api {
                platform: "vk",
                detail: format!("no post_id in wall.post response: {posted}"),
            })?;

        Ok(PostReceipt {
            message_id: format!("wall-{gid}_{post_id}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attachment_includes_access_key_when_present() {
        let photo = SavedPhoto {
            owner_id: -123,
            id: 456,
            access_key: Some("abcdef".to_string()),
        };
        assert_eq!(attachment_string(&photo), "photo-123_456_abcdef");
    }

    #[test]
    fn attachment_omits_missing_access_key() {
        let photo = SavedPhoto {
            owner_id: -123,
            id: 456,
            access_key: None,
        };
        assert_eq!(attachment_string(&photo), "photo-123_456");
    }

    #[test]
    fn saved_photo_parses_access_key() {
        let saved = json!({
            "response": [{ "owner_id": -1, "id": 2, "access_key": "k" }],
        });
        let photo = saved_photo(&saved).unwrap();
        assert_eq!(photo.access_key.as_deref(), Some("k"));
    }

    #[test]
    fn empty_save_response_is_an_error() {
        assert!(saved_photo(&json!({ "response": [] })).is_err());
    }

    #[test]
    fn numeric_server_field_is_stringified() {
        let payload = json!({ "server": 821 });
        assert_eq!(field_any(&payload, "server").unwrap(), "821");
    }

    #[test]
    fn upload_failure_shapes_are_rejected() {
        assert!(!upload_succeeded(&json!({})));
        assert!(!upload_succeeded(&json!({ "photo": "" })));
        assert!(!upload_succeeded(&json!({ "photo": "[]" })));
        assert!(upload_succeeded(
            &json!({ "photo": "[{\"photo\":1}]", "server": 1, "hash": "h" })
        ));
    }
}
