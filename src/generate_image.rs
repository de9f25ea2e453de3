//! Illustration generation.
//!
//! Gemini and OpenAI implementations behind one [`ImageGenerator`] trait.
//! Both accept an optional reference face photo and an optional style
//! reference image; when either is present the providers switch to their
//! image-conditioned endpoints so the face lands in the generated picture
//! without a separate swap step.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::error::ProviderError;
use crate::media;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

const GEMINI_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const OPENAI_GENERATE_MODEL: &str = "dall-e-3";
const OPENAI_EDIT_MODEL: &str = "gpt-image-1";
const IMAGE_SIZE: &str = "1024x1024";

const FACE_INSTRUCTION_RU: &str = "\n\nСоздай изображение, где главный персонаж имеет лицо \
с приложенного референсного фото. Сохрани точное сходство лица.";
const REFERENCE_INSTRUCTION_RU: &str = "\n\nИспользуй приложенное фото как визуальный референс \
для стиля, композиции и атмосферы изображения.";
const FACE_INSTRUCTION_EN: &str = "IMPORTANT: The attached photo is a reference face. \
The person in the generated image MUST have exactly this face — \
same facial structure, eyes, nose, lips, skin tone, and overall appearance. \
Do NOT change or stylize the face. Preserve photographic facial likeness.\n\n";
const REFERENCE_INSTRUCTION_EN: &str = "\n\nUse the attached reference photo as visual guidance \
for style, composition, and atmosphere of the image.";

/// Produces raw image bytes (PNG or JPEG) for a prompt, optionally
/// conditioned on a reference face and a style reference photo.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &str,
        expert_face_b64: Option<String>,
        reference_image_b64: Option<String>,
    ) -> Result<Vec<u8>, ProviderError>;
}

/// Build the configured generator.
pub fn generator_for(config: &Config) -> Result<Box<dyn ImageGenerator>, ProviderError> {
    use crate::config::ImageProvider;
    let generator: Box<dyn ImageGenerator> = match config.image_provider {
        ImageProvider::Gemini => Box::new(GeminiImage::new(config.require_gemini_key()?)),
        ImageProvider::OpenAi => Box::new(OpenAiImage::new(config.require_openai_key()?)),
    };
    Ok(generator)
}

pub struct GeminiImage {
    client: reqwest::Client,
    api_key: String,
}

impl GeminiImage {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for GeminiImage {
    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        expert_face_b64: Option<String>,
        reference_image_b64: Option<String>,
    ) -> Result<Vec<u8>, ProviderError> {
        info!(
            model = GEMINI_IMAGE_MODEL,
            with_face = expert_face_b64.is_some(),
            with_reference = reference_image_b64.is_some(),
            "Requesting image from Gemini"
        );

        let mut text_prompt = prompt.to_string();
        if expert_face_b64.is_some() {
            text_prompt.push_str(FACE_INSTRUCTION_RU);
        }
        if reference_image_b64.is_some() {
            text_prompt.push_str(REFERENCE_INSTRUCTION_RU);
        }

        let mut parts = vec![json!({ "text": text_prompt })];
        // Order matters to the model: style reference first, face last.
        if let Some(reference) = reference_image_b64 {
            parts.push(json!({
                "inline_data": { "mime_type": "image/jpeg", "data": reference },
            }));
        }
        if let Some(face) = expert_face_b64 {
            parts.push(json!({
                "inline_data": { "mime_type": "image/jpeg", "data": face },
            }));
        }

        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{GEMINI_IMAGE_MODEL}:generateContent"
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

        extract_gemini_image(&payload)
    }
}

/// Pull the first inline image part out of a generateContent response.
fn extract_gemini_image(payload: &Value) -> Result<Vec<u8>, ProviderError> {
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
        detail: "response contained no image data".to_string(),
    })
}

pub struct OpenAiImage {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAiImage {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Plain prompt-only generation with DALL-E 3; the API returns a URL
    /// that has to be downloaded separately.
    async fn generate_plain(&self, prompt: &str) -> Result<Vec<u8>, ProviderError> {
        let body = json!({
            "model": OPENAI_GENERATE_MODEL,
            "prompt": prompt,
            "size": IMAGE_SIZE,
            "quality": "standard",
            "n": 1,
        });
        let response = self
            .client
            .post("https://api.openai.com/v1/images/generations")
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

        let url = payload
            .pointer("/data/0/url")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::MalformedResponse {
                provider: "openai",
                detail: "no image URL in generations response".to_string(),
            })?;

        let image = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "openai",
                source,
            })?
            .error_for_status()
            .map_err(|source| ProviderError::Http {
                provider: "openai",
                source,
            })?
            .bytes()
            .await
            .map_err(|source| ProviderError::Http {
                provider: "openai",
                source,
            })?;
        Ok(image.to_vec())
    }

    /// Image-conditioned generation with gpt-image-1 via the edits endpoint.
    /// Takes the reference photos as multipart file parts and returns the
    /// result inline as base64.
    async fn generate_with_references(
        &self,
        prompt: &str,
        expert_face_b64: Option<&str>,
        reference_image_b64: Option<&str>,
    ) -> Result<Vec<u8>, ProviderError> {
        let mut full_prompt = prompt.to_string();
        if expert_face_b64.is_some() {
            full_prompt = format!("{FACE_INSTRUCTION_EN}{full_prompt}");
        }
        if reference_image_b64.is_some() {
            full_prompt.push_str(REFERENCE_INSTRUCTION_EN);
        }

        let mut form = reqwest::multipart::Form::new()
            .text("model", OPENAI_EDIT_MODEL)
            .text("prompt", full_prompt)
            .text("size", IMAGE_SIZE)
            .text("quality", "high");
        if let Some(face) = expert_face_b64 {
            let bytes = media::decode_base64(face)?;
            form = form.part(
                "image[]",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name("expert_face.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|source| ProviderError::Http {
                        provider: "openai",
                        source,
                    })?,
            );
        }
        if let Some(reference) = reference_image_b64 {
            let bytes = media::decode_base64(reference)?;
            form = form.part(
                "image[]",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name("reference.jpg")
                    .mime_str("image/jpeg")
                    .map_err(|source| ProviderError::Http {
                        provider: "openai",
                        source,
                    })?,
            );
        }

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
                detail: "no b64_json in edits response".to_string(),
            })?;
        Ok(media::decode_base64(b64)?)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImage {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn generate(
        &self,
        prompt: &str,
        expert_face_b64: Option<String>,
        reference_image_b64: Option<String>,
    ) -> Result<Vec<u8>, ProviderError> {
        info!(
            with_face = expert_face_b64.is_some(),
            with_reference = reference_image_b64.is_some(),
            "Requesting image from OpenAI"
        );
        if expert_face_b64.is_some() || reference_image_b64.is_some() {
            self.generate_with_references(
                prompt,
                expert_face_b64.as_deref(),
                reference_image_b64.as_deref(),
            )
            .await
        } else {
            self.generate_plain(prompt).await
        }
    }
}
