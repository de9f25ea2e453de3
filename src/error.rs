//! Error types shared across the autoposter pipeline.
//!
//! One enum per concern: configuration, flat-file stores, media transcoding,
//! generation providers, platform adapters and the remote content store.

/// Configuration loading / validation errors. Missing credentials are raised
/// immediately and never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    #[error("unknown {kind} provider: '{value}'. Use one of: {expected}")]
    UnknownProvider {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the flat JSON file stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Image transcode / encode errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Errors from text/image/face-swap generation providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} HTTP error: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} API error: {detail}")]
    Api {
        provider: &'static str,
        detail: String,
    },

    #[error("{provider} returned a malformed response: {detail}")]
    MalformedResponse {
        provider: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from social/messaging platform adapters.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("{platform} HTTP error: {source}")]
    Http {
        platform: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{platform} API error: {detail}")]
    Api {
        platform: &'static str,
        detail: String,
    },
}

impl PlatformError {
    /// VK rejects the wall upload server for community tokens with a
    /// "group auth" error; the adapter falls back to the messages upload
    /// server on this condition.
    pub fn is_group_auth(&self) -> bool {
        match self {
            PlatformError::Api { detail, .. } => {
                let lower = detail.to_lowercase();
                lower.contains("group auth") || lower.contains("group authorization")
            }
            _ => false,
        }
    }
}

/// Errors from the remote (GitHub Contents API) store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("GITHUB_TOKEN is not set")]
    MissingToken,

    #[error("remote HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote write conflict on {path}: version token rejected")]
    Conflict { path: String },

    #[error("remote API error on {path}: HTTP {status}: {detail}")]
    Api {
        path: String,
        status: u16,
        detail: String,
    },

    #[error("remote content error on {path}: {detail}")]
    Content { path: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_auth_detection() {
        let err = PlatformError::Api {
            platform: "vk",
            detail: "VK getWallUploadServer: group authorization failed (27)".to_string(),
        };
        assert!(err.is_group_auth());

        let other = PlatformError::Api {
            platform: "vk",
            detail: "VK getWallUploadServer: invalid access token (5)".to_string(),
        };
        assert!(!other.is_group_auth());
    }
}
