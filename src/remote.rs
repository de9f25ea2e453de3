//! Remote content store backed by the GitHub Contents API.
//!
//! The review UI and the unattended pipeline run on different machines but
//! share one repository: provider.cfg, prompt overrides and the pending
//! draft are mirrored through it. Writes are read-modify-write with the
//! file's sha as an optimistic-concurrency precondition; a rejected sha
//! surfaces as [`RemoteError::Conflict`] and the caller decides whether to
//! re-read and retry.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{self, GithubConfig};
use crate::error::RemoteError;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("autoposter/", env!("CARGO_PKG_VERSION"));

/// A file read from the remote store, with the version token needed to
/// write it back.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub content: String,
    pub sha: String,
}

pub struct RemoteStore {
    client: reqwest::Client,
    token: String,
    repo: String,
}

impl RemoteStore {
    pub fn new(config: &GithubConfig) -> Result<Self, RemoteError> {
        if config.token.is_empty() {
            return Err(RemoteError::MissingToken);
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            token: config.token.clone(),
            repo: config.repo.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!("{API_BASE}/repos/{}/contents/{path}", self.repo)
    }

    /// Read a file, returning `None` when it does not exist. Files over the
    /// Contents API inline limit (1 MB) come back without inline content and
    /// are fetched through their raw download URL instead.
    pub async fn read_file(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError> {
        let response = self
            .client
            .get(self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        let payload: Value = response.json().await?;
        if !status.is_success() {
            return Err(api_error(path, status.as_u16(), &payload));
        }

        let sha = payload
            .pointer("/sha")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Content {
                path: path.to_string(),
                detail: "response has no sha".to_string(),
            })?
            .to_string();

        let inline = payload
            .pointer("/content")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty());
        let content = match inline {
            Some(b64) => decode_content(path, b64)?,
            None => {
                let download_url = payload
                    .pointer("/download_url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RemoteError::Content {
                        path: path.to_string(),
                        detail: "no inline content and no download_url".to_string(),
                    })?;
                debug!(path, "Fetching oversized file via download URL");
                self.client
                    .get(download_url)
                    .header("Authorization", format!("token {}", self.token))
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await?
            }
        };
        Ok(Some(RemoteFile { content, sha }))
    }

    /// Write a file. `sha` must be the version token from the preceding
    /// read (or `None` when creating the file); a stale token is rejected
    /// by the store and surfaced as [`RemoteError::Conflict`].
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        sha: Option<&str>,
        message: &str,
    ) -> Result<(), RemoteError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content.as_bytes()),
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha.to_string());
        }

        let response = self
            .client
            .put(self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(path, "Wrote remote file");
            return Ok(());
        }
        // 409 is the documented conflict status; 422 shows up when the sha
        // is stale or missing on an existing file.
        if status.as_u16() == 409 || status.as_u16() == 422 {
            return Err(RemoteError::Conflict {
                path: path.to_string(),
            });
        }
        let payload: Value = response.json().await.unwrap_or_default();
        Err(api_error(path, status.as_u16(), &payload))
    }

    /// Delete a file. The sha precondition applies the same way as for
    /// writes: a stale token surfaces as [`RemoteError::Conflict`].
    pub async fn delete_file(
        &self,
        path: &str,
        sha: &str,
        message: &str,
    ) -> Result<(), RemoteError> {
        let body = json!({ "message": message, "sha": sha });
        let response = self
            .client
            .delete(self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(path, "Deleted remote file");
            return Ok(());
        }
        if status.as_u16() == 409 || status.as_u16() == 422 {
            return Err(RemoteError::Conflict {
                path: path.to_string(),
            });
        }
        let payload: Value = response.json().await.unwrap_or_default();
        Err(api_error(path, status.as_u16(), &payload))
    }

    /// Read a JSON document from the remote store.
    pub async fn read_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<(T, String)>, RemoteError> {
        let Some(file) = self.read_file(path).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&file.content).map_err(|err| RemoteError::Content {
            path: path.to_string(),
            detail: err.to_string(),
        })?;
        Ok(Some((value, file.sha)))
    }

    /// Write a JSON document, preconditioned on the sha from the read.
    pub async fn write_json<T: Serialize>(
        &self,
        path: &str,
        value: &T,
        sha: Option<&str>,
        message: &str,
    ) -> Result<(), RemoteError> {
        let content = serde_json::to_string_pretty(value).map_err(|err| RemoteError::Content {
            path: path.to_string(),
            detail: err.to_string(),
        })?;
        self.write_file(path, &content, sha, message).await
    }

    /// Read-modify-write the remote provider.cfg: keys absent from the
    /// update keep their current remote value.
    pub async fn update_provider_cfg(
        &self,
        text_provider: &str,
        image_provider: &str,
        autopublish_enabled: Option<bool>,
        face_swap_provider: Option<&str>,
    ) -> Result<(), RemoteError> {
        let current = self.read_file(config::PROVIDER_CFG_FILE).await?;
        let existing = current
            .as_ref()
            .map(|file| config::parse_provider_cfg(&file.content))
            .unwrap_or_default();

        let autopublish = autopublish_enabled.unwrap_or_else(|| {
            existing
                .get("AUTOPUBLISH_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true)
        });
        let face_swap = face_swap_provider
            .map(str::to_string)
            .or_else(|| existing.get("FACE_SWAP_PROVIDER").cloned())
            .unwrap_or_default();

        let rendered =
            config::render_provider_cfg(text_provider, image_provider, autopublish, &face_swap);
        self.write_file(
            config::PROVIDER_CFG_FILE,
            &rendered,
            current.as_ref().map(|file| file.sha.as_str()),
            "Update provider configuration",
        )
        .await
    }
}

fn decode_content(path: &str, b64: &str) -> Result<String, RemoteError> {
    let bytes = crate::media::decode_base64(b64).map_err(|err| RemoteError::Content {
        path: path.to_string(),
        detail: err.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|err| RemoteError::Content {
        path: path.to_string(),
        detail: err.to_string(),
    })
}

fn api_error(path: &str, status: u16, payload: &Value) -> RemoteError {
    let detail = payload
        .pointer("/message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    RemoteError::Api {
        path: path.to_string(),
        status,
        detail,
    }
}
