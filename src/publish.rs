//! Publishing the pending draft.
//!
//! Fan-out to every configured platform in a fixed order. Platform failures
//! are isolated: one platform rejecting the post does not stop the others,
//! and the publish counts as successful when at least one accepted it. Only
//! then is the idea marked used, history appended and the draft flipped to
//! its terminal `published` state.

use std::collections::BTreeMap;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::PlatformError;
use crate::media;
use crate::platforms::{build_platforms, Platform};
use crate::store::{
    now_iso, Draft, DraftStatus, HistoryEntry, Idea, PublishedBy, Stores,
};

#[derive(Debug)]
pub enum PublishOutcome {
    /// No pending draft file exists.
    NoDraft,
    /// The draft was already published; nothing was sent anywhere.
    AlreadyPublished,
    Published {
        message_id: String,
        platform_ids: BTreeMap<String, String>,
    },
}

/// Publish the pending draft to the platforms configured in `config`.
pub async fn publish_pending(
    config: &Config,
    stores: &Stores,
    published_by: PublishedBy,
) -> anyhow::Result<PublishOutcome> {
    let platforms = build_platforms(config);
    publish_pending_with(stores, &platforms, published_by).await
}

/// Publish against explicit platform adapters. Split out for mock-driven
/// tests.
pub async fn publish_pending_with(
    stores: &Stores,
    platforms: &[Box<dyn Platform>],
    published_by: PublishedBy,
) -> anyhow::Result<PublishOutcome> {
    let Some(mut draft) = stores.pending()? else {
        info!("No pending draft to publish");
        return Ok(PublishOutcome::NoDraft);
    };
    if draft.status == DraftStatus::Published {
        info!(idea = %draft.idea, "Draft already published, skipping");
        return Ok(PublishOutcome::AlreadyPublished);
    }
    if platforms.is_empty() {
        anyhow::bail!("no platforms configured, cannot publish");
    }

    let image = media::decode_base64(&draft.image_base64)?;
    info!(idea = %draft.idea, platforms = platforms.len(), "Publishing draft");

    let mut platform_ids: BTreeMap<String, String> = BTreeMap::new();
    let mut first_message_id: Option<String> = None;
    let mut failures: Vec<PlatformError> = Vec::new();
    for platform in platforms {
        match platform.send_post(&image, &draft.post_text).await {
            Ok(receipt) => {
                info!(
                    platform = platform.name(),
                    message_id = %receipt.message_id,
                    "Published"
                );
                if first_message_id.is_none() {
                    first_message_id = Some(receipt.message_id.clone());
                }
                platform_ids.insert(platform.name().to_string(), receipt.message_id);
            }
            Err(err) => {
                error!(platform = platform.name(), error = %err, "Platform rejected post");
                failures.push(err);
            }
        }
    }

    if platform_ids.is_empty() {
        // Draft stays pending so the next run can retry.
        anyhow::bail!(
            "all {} platform(s) failed, draft remains pending: {}",
            failures.len(),
            failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        );
    }

    // The headline message_id is the first successful platform's, in
    // fan-out order.
    let message_id = first_message_id.unwrap_or_default();

    mark_idea_used(stores, draft.idea_index, &draft.idea)?;

    stores.append_history(HistoryEntry {
        date: now_iso(),
        idea: draft.idea.clone(),
        post_text: draft.post_text.clone(),
        text_provider: draft.text_provider.clone(),
        image_provider: draft.image_provider.clone(),
        message_id: message_id.clone(),
        platform_ids: platform_ids.clone(),
    })?;

    draft.status = DraftStatus::Published;
    draft.published_at = Some(now_iso());
    draft.message_id = Some(message_id.clone());
    draft.platform_ids = platform_ids.clone();
    draft.published_by = Some(published_by);
    stores.save_pending(&draft)?;

    Ok(PublishOutcome::Published {
        message_id,
        platform_ids,
    })
}

/// Flip the published idea to `used`. The stored index is trusted when it
/// still points at the same text; otherwise fall back to the first exact
/// text match. Concurrent list edits can shift indices, so a stale index
/// with different text only triggers the fallback, never a blind flip.
fn mark_idea_used(
    stores: &Stores,
    idea_index: Option<usize>,
    idea_text: &str,
) -> anyhow::Result<()> {
    let mut ideas = stores.ideas()?;
    let position = idea_index
        .filter(|&i| ideas.get(i).is_some_and(|item: &Idea| item.idea == idea_text))
        .or_else(|| ideas.iter().position(|item| item.idea == idea_text));

    match position {
        Some(i) => {
            ideas[i].used = true;
            stores.save_ideas(&ideas)?;
        }
        None => {
            warn!(idea = %idea_text, "Published idea no longer in the idea list");
        }
    }
    Ok(())
}
