//! Draft generation orchestration.
//!
//! One pass: pick the next unused idea, generate the post text, generate the
//! illustration (with the reference face inlined when the provider supports
//! it, or a separate swap call otherwise), re-encode to JPEG and persist the
//! draft. All-or-nothing: nothing is written until every step succeeded.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::ProviderError;
use crate::face_swap::{self, FaceSwapper};
use crate::generate_image::{self, ImageGenerator};
use crate::generate_text::{self, TextGenerator};
use crate::media;
use crate::store::{next_idea, Draft, DraftStatus, Stores};

/// Result of one generation pass.
#[derive(Debug)]
pub enum GenerateOutcome {
    /// Idea list empty or exhausted. Not an error: the caller exits cleanly.
    NoIdeaAvailable,
    Drafted { idea: String, post_text_chars: usize },
}

/// Generate a draft with the providers configured in `config`.
pub async fn generate_draft(
    config: &Config,
    stores: &Stores,
) -> anyhow::Result<GenerateOutcome> {
    // Check the queue before demanding provider credentials: an exhausted
    // idea list is a clean exit, not a configuration error.
    if next_idea(&stores.ideas()?).is_none() {
        info!("No unused ideas left, nothing to generate");
        return Ok(GenerateOutcome::NoIdeaAvailable);
    }

    let text_generator = generate_text::generator_for(config)?;
    let image_generator = generate_image::generator_for(config)?;
    let swapper = face_swap::swapper_for(config)?;
    generate_draft_with(
        config,
        stores,
        text_generator.as_ref(),
        image_generator.as_ref(),
        swapper.as_deref(),
    )
    .await
}

/// Generation pass against explicit provider implementations. Split out so
/// tests can drive it with mocks.
pub async fn generate_draft_with(
    config: &Config,
    stores: &Stores,
    text_generator: &dyn TextGenerator,
    image_generator: &dyn ImageGenerator,
    swapper: Option<&dyn FaceSwapper>,
) -> anyhow::Result<GenerateOutcome> {
    let ideas = stores.ideas()?;
    let Some((idea_index, idea)) = next_idea(&ideas) else {
        info!("No unused ideas left, nothing to generate");
        return Ok(GenerateOutcome::NoIdeaAvailable);
    };
    let idea = idea.to_string();
    info!(index = idea_index, idea = %idea, "Generating draft");

    if let Some(prior) = stores.pending()? {
        if prior.status == DraftStatus::Pending {
            warn!(idea = %prior.idea, "Discarding prior unpublished draft");
        }
    }

    let overrides = stores.prompt_overrides()?;
    let context = stores.context_document()?;
    let (system_prompt, template) = generate_text::resolve_prompts(&overrides, context.as_ref());

    let reply = text_generator
        .generate(&system_prompt, &generate_text::user_message(&idea))
        .await?;
    let generated = generate_text::parse_reply(&reply, &idea, template.as_deref());
    info!(
        chars = generated.post_text.chars().count(),
        "Generated post text"
    );

    let expert_face = stores.expert_face_b64()?;
    let inline_face = expert_face.as_deref().filter(|_| {
        config
            .face_swap_provider
            .is_some_and(|provider| provider.supports_inline())
    });

    let mut image = image_generator
        .generate(&generated.image_prompt, inline_face.map(str::to_string), None)
        .await?;

    // Provenance reflects what actually happened to the image, not what was
    // configured: "gemini-inline" when the face rode along in the generation
    // call, the swapper's name after a successful separate swap, empty when
    // no face was applied at all.
    let mut face_swap_used = String::new();
    if inline_face.is_some() {
        face_swap_used = "gemini-inline".to_string();
        info!("Image generated with the reference face inline");
    } else if let (Some(swapper), Some(face)) = (swapper, expert_face.as_deref()) {
        // A failed swap keeps the un-swapped image rather than losing the
        // draft.
        info!(provider = swapper.provider_name(), "Applying face swap");
        match swapper.swap(&image, face, &generated.image_prompt).await {
            Ok(swapped) => {
                image = swapped;
                face_swap_used = swapper.provider_name().to_string();
            }
            Err(err) => {
                warn!(error = %err, "Face swap failed, keeping the generated image");
            }
        }
    }

    let image_base64 = media::to_jpeg_base64(&image).map_err(ProviderError::Media)?;

    let draft = Draft {
        status: DraftStatus::Pending,
        created_at: crate::store::now_iso(),
        idea: idea.clone(),
        idea_index: Some(idea_index),
        post_text: generated.post_text.clone(),
        image_prompt: generated.image_prompt,
        image_base64,
        text_provider: text_generator.provider_name().to_string(),
        image_provider: image_generator.provider_name().to_string(),
        face_swap_provider: face_swap_used,
        published_at: None,
        message_id: None,
        platform_ids: BTreeMap::new(),
        published_by: None,
    };
    stores.save_pending(&draft)?;
    info!(idea = %idea, "Draft saved as pending");

    Ok(GenerateOutcome::Drafted {
        idea,
        post_text_chars: draft.post_text.chars().count(),
    })
}
