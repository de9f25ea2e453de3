//! Platform adapters.
//!
//! Each destination implements [`Platform`]: take the final JPEG and the
//! HTML-formatted post text, deliver them, and return a receipt with a
//! platform-scoped message ID. Adapters that cannot render HTML strip it to
//! plain text themselves.

pub mod max;
pub mod pinterest;
pub mod telegram;
pub mod vk;

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::Config;
use crate::error::PlatformError;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Proof of delivery from one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReceipt {
    pub message_id: String,
}

/// One publish destination.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Platform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver the image with the HTML-formatted text. Must not mutate any
    /// local state: the caller owns draft/history bookkeeping.
    async fn send_post(
        &self,
        image_jpeg: &[u8],
        html_text: &str,
    ) -> Result<PostReceipt, PlatformError>;
}

/// Build one adapter per configured platform, in a fixed order.
pub fn build_platforms(config: &Config) -> Vec<Box<dyn Platform>> {
    let mut platforms: Vec<Box<dyn Platform>> = Vec::new();
    if let Some(cfg) = &config.telegram {
        platforms.push(Box::new(telegram::Telegram::new(cfg.clone())));
    }
    if let Some(cfg) = &config.vk {
        platforms.push(Box::new(vk::Vk::new(cfg.clone())));
    }
    if let Some(cfg) = &config.max {
        platforms.push(Box::new(max::Max::new(cfg.clone())));
    }
    if let Some(cfg) = &config.pinterest {
        platforms.push(Box::new(pinterest::Pinterest::new(cfg.clone())));
    }
    platforms
}

/// Convert Telegram-style HTML to plain text: `<br>` becomes a newline, all
/// other tags are dropped, common entities are decoded.
pub fn strip_html(text: &str) -> String {
    static BR: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    let br = BR.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());

    let text = br.replace_all(text, "\n");
    let text = tag.replace_all(&text, "");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

/// Append an optional platform footer after a blank line.
pub fn with_footer(text: &str, footer: Option<&str>) -> String {
    match footer.filter(|f| !f.is_empty()) {
        Some(footer) => format!("{text}\n\n{footer}"),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_drops_tags_and_decodes_entities() {
        let html = "<b>Заголовок</b><br/>Текст &amp; ещё &lt;текст&gt; &quot;в кавычках&quot;";
        assert_eq!(
            strip_html(html),
            "Заголовок\nТекст & ещё <текст> \"в кавычках\""
        );
    }

    #[test]
    fn strip_html_handles_br_variants() {
        assert_eq!(strip_html("a<br>b<BR/>c<br />d"), "a\nb\nc\nd");
    }

    #[test]
    fn strip_html_trims_result() {
        assert_eq!(strip_html("  <i>x</i>  "), "x");
    }

    #[test]
    fn footer_appended_after_blank_line() {
        assert_eq!(with_footer("text", Some("follow us")), "text\n\nfollow us");
        assert_eq!(with_footer("text", None), "text");
        assert_eq!(with_footer("text", Some("")), "text");
    }
}
