//! Flat JSON file stores for ideas, history, the pending draft and the
//! prompt/context/face sidecar files.
//!
//! Every store is a whole-file read-modify-write of a single JSON document
//! under one data directory. There is no locking: concurrent local writers
//! are last-write-wins, and marking an idea used, appending history and
//! flipping the draft status are three independent writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

pub const IDEAS_FILE: &str = "ideas.json";
pub const HISTORY_FILE: &str = "history.json";
pub const PENDING_FILE: &str = "pending_post.json";
pub const PROMPTS_FILE: &str = "prompts.json";
pub const CONTEXT_FILE: &str = "prompt_context.json";
pub const EXPERT_FACE_FILE: &str = "expert_face.json";

/// A queued post topic. Flipped to `used: true` exactly once, at successful
/// publish; never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Idea {
    pub idea: String,
    #[serde(default)]
    pub used: bool,
}

/// Return `(index, text)` of the first unused idea in list order, or `None`
/// when the list is empty or exhausted.
pub fn next_idea(ideas: &[Idea]) -> Option<(usize, &str)> {
    ideas
        .iter()
        .enumerate()
        .find(|(_, item)| !item.used)
        .map(|(i, item)| (i, item.idea.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Published,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishedBy {
    Manual,
    Auto,
}

/// A generated-but-not-yet-published post. Created by the generator
/// (overwriting any prior unpublished draft), mutated during review, and
/// terminated by the transition to `status: published`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub status: DraftStatus,
    pub created_at: String,
    pub idea: String,
    pub idea_index: Option<usize>,
    pub post_text: String,
    pub image_prompt: String,
    pub image_base64: String,
    pub text_provider: String,
    pub image_provider: String,
    #[serde(default)]
    pub face_swap_provider: String,
    pub published_at: Option<String>,
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform_ids: BTreeMap<String, String>,
    pub published_by: Option<PublishedBy>,
}

/// One published post, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    pub idea: String,
    pub post_text: String,
    pub text_provider: String,
    pub image_provider: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub platform_ids: BTreeMap<String, String>,
}

/// User overrides for the built-in prompts, synced from the review UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptOverrides {
    pub system_prompt: Option<String>,
    pub image_prompt_template: Option<String>,
}

/// Optional context document appended verbatim to the system prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextDocument {
    pub filename: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ExpertFace {
    image_base64: Option<String>,
}

/// ISO-8601 timestamp for draft/history records.
pub fn now_iso() -> String {
    chrono::Local::now().to_rfc3339()
}

/// Document store rooted at a data directory, one JSON file per document.
#[derive(Debug, Clone)]
pub struct Stores {
    root: PathBuf,
}

impl Stores {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Read a document, returning `None` when the file does not exist.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StoreError> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let value = serde_json::from_str(&content)?;
        Ok(Some(value))
    }

    /// Write a document wholesale (pretty-printed, UTF-8).
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path(name);
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, content)?;
        debug!(path = %path.display(), "Wrote store file");
        Ok(())
    }

    pub fn ideas(&self) -> Result<Vec<Idea>, StoreError> {
        Ok(self.read(IDEAS_FILE)?.unwrap_or_default())
    }

    pub fn save_ideas(&self, ideas: &[Idea]) -> Result<(), StoreError> {
        self.write(IDEAS_FILE, &ideas)
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self.read(HISTORY_FILE)?.unwrap_or_default())
    }

    pub fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut history = self.history()?;
        history.push(entry);
        self.write(HISTORY_FILE, &history)
    }

    pub fn pending(&self) -> Result<Option<Draft>, StoreError> {
        self.read(PENDING_FILE)
    }

    pub fn save_pending(&self, draft: &Draft) -> Result<(), StoreError> {
        self.write(PENDING_FILE, draft)
    }

    pub fn prompt_overrides(&self) -> Result<PromptOverrides, StoreError> {
        Ok(self.read(PROMPTS_FILE)?.unwrap_or_default())
    }

    pub fn context_document(&self) -> Result<Option<ContextDocument>, StoreError> {
        self.read(CONTEXT_FILE)
    }

    /// Base64 of the reference face photo, or `None` when not configured.
    pub fn expert_face_b64(&self) -> Result<Option<String>, StoreError> {
        let face: Option<ExpertFace> = self.read(EXPERT_FACE_FILE)?;
        Ok(face.and_then(|f| f.image_base64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn idea(text: &str, used: bool) -> Idea {
        Idea {
            idea: text.to_string(),
            used,
        }
    }

    #[test]
    fn next_idea_returns_first_unused() {
        let ideas = vec![idea("a", true), idea("b", false), idea("c", false)];
        assert_eq!(next_idea(&ideas), Some((1, "b")));
    }

    #[test]
    fn next_idea_none_when_exhausted() {
        let ideas = vec![idea("a", true), idea("b", true)];
        assert_eq!(next_idea(&ideas), None);
    }

    #[test]
    fn next_idea_none_when_empty() {
        assert_eq!(next_idea(&[]), None);
    }

    #[test]
    fn missing_files_read_as_defaults() {
        let dir = tempdir().unwrap();
        let stores = Stores::new(dir.path());
        assert!(stores.ideas().unwrap().is_empty());
        assert!(stores.history().unwrap().is_empty());
        assert!(stores.pending().unwrap().is_none());
        assert!(stores.expert_face_b64().unwrap().is_none());
    }

    #[test]
    fn pending_draft_roundtrip_and_overwrite() {
        let dir = tempdir().unwrap();
        let stores = Stores::new(dir.path());

        let mut draft = Draft {
            status: DraftStatus::Pending,
            created_at: now_iso(),
            idea: "first".to_string(),
            idea_index: Some(0),
            post_text: "text one".to_string(),
            image_prompt: "prompt one".to_string(),
            image_base64: "AAAA".to_string(),
            text_provider: "claude".to_string(),
            image_provider: "gemini".to_string(),
            face_swap_provider: String::new(),
            published_at: None,
            message_id: None,
            platform_ids: BTreeMap::new(),
            published_by: None,
        };
        stores.save_pending(&draft).unwrap();

        // Last writer wins: a second draft replaces the first wholesale.
        draft.idea = "second".to_string();
        draft.post_text = "text two".to_string();
        stores.save_pending(&draft).unwrap();

        let loaded = stores.pending().unwrap().unwrap();
        assert_eq!(loaded.idea, "second");
        assert_eq!(loaded.post_text, "text two");
        assert_eq!(loaded.status, DraftStatus::Pending);
    }

    #[test]
    fn history_appends_in_order() {
        let dir = tempdir().unwrap();
        let stores = Stores::new(dir.path());
        for i in 0..3 {
            stores
                .append_history(HistoryEntry {
                    date: now_iso(),
                    idea: format!("idea {i}"),
                    post_text: "text".to_string(),
                    text_provider: "claude".to_string(),
                    image_provider: "gemini".to_string(),
                    message_id: i.to_string(),
                    platform_ids: BTreeMap::new(),
                })
                .unwrap();
        }
        let history = stores.history().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].message_id, "2");
    }

    #[test]
    fn expert_face_reads_image_base64() {
        let dir = tempdir().unwrap();
        let stores = Stores::new(dir.path());
        stores
            .write(EXPERT_FACE_FILE, &serde_json::json!({ "image_base64": "Zm9v" }))
            .unwrap();
        assert_eq!(stores.expert_face_b64().unwrap().as_deref(), Some("Zm9v"));
    }
}
