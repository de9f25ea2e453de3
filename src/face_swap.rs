//! Standalone face swap for already-generated images.
//!
//! Used when the configured face-swap provider cannot take the reference
//! face inline during image generation (Replicate), or as an explicit
//! post-processing step. Gemini and OpenAI variants re-edit the generated
//! image; Replicate calls a dedicated swap model.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;
use crate::media;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

const REPLICATE_MODEL_VERSION: &str =
    "cff87316e31787df12002c9b4bff286f20cee315b38c4743bef89d8113e3d986";
const GEMINI_SWAP_MODEL: &str = "gemini-2.5-flash-preview-04-17";
const OPENAI_EDIT_MODEL: &str = "gpt-image-1";

const SWAP_PROMPT_GEMINI: &str = "Edit this image: replace the woman's face with the face from \
the reference photo. Keep the rest of the image exactly the same — same pose, background, \
lighting, and composition. Make the face blend naturally into the image.";
const SWAP_PROMPT_OPENAI: &str = "Replace the woman's face in the first image with the face \
from the second image. Keep everything else the same — pose, background, lighting, composition. \
Make the face blend naturally.";

/// Replaces the face in an image with the reference face.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FaceSwapper: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn swap(
        &self,
        image: &[u8],
        expert_face_b64: &str,
        image_prompt: &str,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Build the swapper for the configured provider, or `None` when face swap
/// is not configured.
pub fn swapper_for(config: &Config) -> Result<Option<Box<dyn FaceSwapper>>, ProviderError> {
    use crate::config::FaceSwapProvider;
    let swapper: Box<dyn FaceSwapper> = match config.face_swap_provider {
        None => return Ok(None),
        Some(FaceSwapProvider::Replicate) => {
            Box::new(ReplicateSwap::new(config.require_replicate_key()?))
        }
        Some(FaceSwapProvider::Gemini) => Box::new(GeminiSwap::new(config.require_gemini_key()?)),
        Some(FaceSwapProvider::OpenAi) => Box::new(OpenAiSwap::new(config.require_openai_key()?)),
    };
    Ok(Some(swapper))
}

fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", media::encode_base64(bytes))
}

pub struct ReplicateSwap {
    client: reqwest::Client,
    api_key: String,
}

impl ReplicateSwap {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    async fn fetch_prediction(&self, url: &str) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Token {}", self.api_key))
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "replicate",
                source,
            })?;
        response.json().await.map_err(|source| ProviderError::Http {
            provider: "replicate",
            source,
        })
    }
}

#[async_trait]
impl FaceSwapper for ReplicateSwap {
    fn provider_name(&self) -> &'static str {
        "replicate"
    }

    async fn swap(
        &self,
        image: &[u8],
        expert_face_b64: &str,
        _image_prompt: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        info!(version = REPLICATE_MODEL_VERSION, "Requesting Replicate face swap");
        let face_bytes = media::decode_base64(expert_face_b64)?;
        let body = json!({
            "version": REPLICATE_MODEL_VERSION,
            "input": {
                "target_image": data_uri("image/png", image),
                "swap_image": data_uri("image/jpeg", &face_bytes),
            },
        });
        let response = self
            .client
            .post("https://api.replicate.com/v1/predictions")
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "replicate",
                source,
            })?;

        let status = response.status();
        let mut payload: Value =
            response.json().await.map_err(|source| ProviderError::Http {
                provider: "replicate",
                source,
            })?;
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "replicate",
                detail: format!("HTTP {status}: {payload}"),
            });
        }

        // `Prefer: wait` usually resolves synchronously; poll otherwise.
        loop {
            match payload.pointer("/status").and_then(Value::as_str) {
                Some("succeeded") => break,
                Some("failed") | Some("canceled") => {
                    let detail = payload
                        .pointer("/error")
                        .and_then(Value::as_str)
                        .unwrap_or("prediction failed")
                        .to_string();
                    return Err(ProviderError::Api {
                        provider: "replicate",
                        detail,
                    });
                }
                _ => {
                    let poll_url = payload
                        .pointer("/urls/get")
                        .and_then(Value::as_str)
                        .ok_or_else(|| ProviderError::MalformedResponse {
                            provider: "replicate",
                            detail: "prediction has no polling URL".to_string(),
                        })?
                        .to_string();
                    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                    payload = self.fetch_prediction(&poll_url).await?;
                }
            }
        }

        let output_url = match payload.pointer("/output") {
            Some(Value::String(url)) => url.clone(),
            Some(Value::Array(items)) => items
                .first()
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ProviderError::MalformedResponse {
                    provider: "replicate",
                    detail: "empty prediction output".to_string(),
                })?,
            _ => {
                return Err(ProviderError::MalformedResponse {
                    provider: "replicate",
                    detail: "prediction output missing".to_string(),
                })
            }
        };

        let bytes = self
            .client
            .get(&output_url)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "replicate",
                source,
            })?
            .error_for_status()
            .map_err(|source| ProviderError::Http {
                provider: "replicate",
                source,
            })?
            .bytes()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "replicate",
                source,
            })?;
        Ok(bytes.to_vec())
    }
}

pub struct GeminiSwap {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiSwap {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl FaceSwapper for GeminiSwap {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    async fn swap(
        &self,
        image: &[u8],
        expert_face_b64: &str,
        _image_prompt: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        info!(model = GEMINI_SWAP_MODEL, "Requesting Gemini face swap");
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": SWAP_PROMPT_GEMINI },
                    { "inline_data": { "mime_type": "image/png", "data": media::encode_base64(image) } },
                    { "text": "Reference face photo:" },
                    { "inline_data": { "mime_type": "image/jpeg", "data": expert_face_b64 } },
                ],
            }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{GEMINI_SWAP_MODEL}:generateContent"
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

        let parts = payload
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: "gemini",
                detail: "no candidate content parts in response".to_string(),
            })?;
        for part in parts {
            let data = part
                .pointer("/inlineData/data")
                .or_else(|| part.pointer("/inline_data/data"))
                .and_then(Value::as_str);
            if let Some(b64) = data {
                return Ok(media::decode_base64(b64)?);
            }
        }
        Err(ProviderError::MalformedResponse {
            provider: "gemini",
            detail: "face swap response contained no image".to_string(),
        })
    }
}

pub struct OpenAiSwap {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiSwap {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl FaceSwapper for OpenAiSwap {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn swap(
        &self,
        image: &[u8],
        expert_face_b64: &str,
        _image_prompt: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        info!(model = OPENAI_EDIT_MODEL, "Requesting OpenAI face swap");
        let face_bytes = media::decode_base64(expert_face_b64)?;
        let form = reqwest::multipart::Form::new()
            .text("model", OPENAI_EDIT_MODEL)
            .text("prompt", SWAP_PROMPT_OPENAI)
            .text("size", "1024x1024")
            .part(
                "image[]",
                reqwest::multipart::Part::bytes(image.to_vec())
                    .file_name("source.png")
                    .mime_str("image/png")
                    .map_err(|source| ProviderError::Http {
                        provider: "openai",
                        source,
                    })?,
            )
            .part(
                "image[]",
                reqwest::multipart::Part::bytes(face_bytes)
                    .file_name("expert_face.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|source| ProviderError::Http {
                        provider: "openai",
                        source,
                    })?,
            );

        let response = self
            .client
            .post("https://api.openai.com/v1/images/edits")
            .bearer_auth(&self.api_key)
            .multipart(form)
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

        let b64 = payload
            .pointer("/data/0/b64_json")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: "openai",
                detail: "no b64_json in face swap response".to_string(),
            })?;
        Ok(media::decode_base64(b64)?)
    }
}
