//! End-to-end pipeline tests with mocked providers and platforms against a
//! temporary data directory.

use std::collections::BTreeMap;
use std::path::Path;

use tempfile::tempdir;

use autoposter::config::{Config, ImageProvider, TextProvider};
use autoposter::generate::{generate_draft_with, GenerateOutcome};
use autoposter::generate_image::MockImageGenerator;
use autoposter::generate_text::MockTextGenerator;
use autoposter::platforms::{MockPlatform, Platform, PostReceipt};
use autoposter::publish::{publish_pending_with, PublishOutcome};
use autoposter::store::{
    Draft, DraftStatus, Idea, PublishedBy, Stores,
};

fn test_config(data_dir: &Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        text_provider: TextProvider::Claude,
        image_provider: ImageProvider::Gemini,
        face_swap_provider: None,
        autopublish_enabled: true,
        claude_api_key: None,
        gemini_api_key: None,
        openai_api_key: None,
        replicate_api_key: None,
        telegram: None,
        vk: None,
        max: None,
        pinterest: None,
        github: None,
    }
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([180, 120, 90]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn text_mock(reply: &str) -> MockTextGenerator {
    let reply = reply.to_string();
    let mut mock = MockTextGenerator::new();
    mock.expect_provider_name().return_const("claude");
    mock.expect_generate()
        .times(1)
        .returning(move |_, _| Ok(reply.clone()));
    mock
}

fn image_mock() -> MockImageGenerator {
    let mut mock = MockImageGenerator::new();
    mock.expect_provider_name().return_const("gemini");
    mock.expect_generate()
        .times(1)
        .returning(|_, _, _| Ok(png_bytes()));
    mock
}

fn platform_mock(name: &'static str, message_id: &str) -> MockPlatform {
    let message_id = message_id.to_string();
    let mut mock = MockPlatform::new();
    mock.expect_name().return_const(name);
    mock.expect_send_post()
        .times(1)
        .returning(move |_, _| {
            Ok(PostReceipt {
                message_id: message_id.clone(),
            })
        });
    mock
}

fn failing_platform(name: &'static str) -> MockPlatform {
    let mut mock = MockPlatform::new();
    mock.expect_name().return_const(name);
    mock.expect_send_post().times(1).returning(move |_, _| {
        Err(autoposter::error::PlatformError::Api {
            platform: name,
            detail: "boom".to_string(),
        })
    });
    mock
}

fn seed_ideas(stores: &Stores, ideas: &[&str]) {
    let ideas: Vec<Idea> = ideas
        .iter()
        .map(|text| Idea {
            idea: text.to_string(),
            used: false,
        })
        .collect();
    stores.save_ideas(&ideas).unwrap();
}

#[tokio::test]
async fn end_to_end_generate_then_publish() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["X"]);

    let text = text_mock("POST:\nHello\n\nIMAGE_PROMPT:\nA photo");
    let image = image_mock();
    let outcome = generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();
    assert!(matches!(outcome, GenerateOutcome::Drafted { .. }));

    let draft = stores.pending().unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Pending);
    assert_eq!(draft.post_text, "Hello");
    assert_eq!(draft.image_prompt, "A photo");
    assert_eq!(draft.idea, "X");
    assert_eq!(draft.idea_index, Some(0));
    assert_eq!(draft.text_provider, "claude");
    assert!(!draft.image_base64.is_empty());

    let platforms: Vec<Box<dyn Platform>> = vec![Box::new(platform_mock("telegram", "42"))];
    let outcome = publish_pending_with(&stores, &platforms, PublishedBy::Auto)
        .await
        .unwrap();
    match outcome {
        PublishOutcome::Published {
            message_id,
            platform_ids,
        } => {
            assert_eq!(message_id, "42");
            assert_eq!(platform_ids.get("telegram").map(String::as_str), Some("42"));
        }
        other => panic!("expected Published, got {other:?}"),
    }

    let ideas = stores.ideas().unwrap();
    assert!(ideas[0].used, "published idea must flip to used");

    let history = stores.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message_id, "42");
    assert_eq!(history[0].idea, "X");

    let draft = stores.pending().unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Published);
    assert_eq!(draft.message_id.as_deref(), Some("42"));
    assert_eq!(draft.published_by, Some(PublishedBy::Auto));
    assert!(draft.published_at.is_some());
}

#[tokio::test]
async fn reply_without_markers_uses_fallback_template() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["массаж лица"]);

    let text = text_mock("Просто текст без маркеров");
    let image = image_mock();
    generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();

    let draft = stores.pending().unwrap().unwrap();
    assert_eq!(draft.post_text, "Просто текст без маркеров");
    assert!(
        draft.image_prompt.contains("массаж лица"),
        "template must substitute the idea, got: {}",
        draft.image_prompt
    );
}

#[tokio::test]
async fn generating_twice_keeps_only_the_second_draft() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["first", "second"]);

    let text = text_mock("POST:\nOne\n\nIMAGE_PROMPT:\nP1");
    let image = image_mock();
    generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();

    // The first idea is still unused (nothing was published), so the second
    // run picks it again and silently replaces the pending draft.
    let text = text_mock("POST:\nTwo\n\nIMAGE_PROMPT:\nP2");
    let image = image_mock();
    generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();

    let draft = stores.pending().unwrap().unwrap();
    assert_eq!(draft.post_text, "Two");
    assert_eq!(draft.image_prompt, "P2");
}

#[tokio::test]
async fn exhausted_idea_list_generates_nothing() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let stores = Stores::new(dir.path());
    stores
        .save_ideas(&[Idea {
            idea: "done".to_string(),
            used: true,
        }])
        .unwrap();

    // Providers must not be called at all.
    let text = MockTextGenerator::new();
    let image = MockImageGenerator::new();
    let outcome = generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();
    assert!(matches!(outcome, GenerateOutcome::NoIdeaAvailable));
    assert!(stores.pending().unwrap().is_none());
}

#[tokio::test]
async fn publishing_published_draft_is_a_no_op() {
    let dir = tempdir().unwrap();
    let stores = Stores::new(dir.path());
    stores
        .save_pending(&Draft {
            status: DraftStatus::Published,
            created_at: autoposter::store::now_iso(),
            idea: "done".to_string(),
            idea_index: Some(0),
            post_text: "text".to_string(),
            image_prompt: "prompt".to_string(),
            image_base64: autoposter::media::encode_base64(b"not checked"),
            text_provider: "claude".to_string(),
            image_provider: "gemini".to_string(),
            face_swap_provider: String::new(),
            published_at: Some(autoposter::store::now_iso()),
            message_id: Some("7".to_string()),
            platform_ids: BTreeMap::new(),
            published_by: Some(PublishedBy::Manual),
        })
        .unwrap();

    // No send_post expectation: any platform call would panic the mock.
    let mut platform = MockPlatform::new();
    platform.expect_name().return_const("telegram");
    let platforms: Vec<Box<dyn Platform>> = vec![Box::new(platform)];

    let outcome = publish_pending_with(&stores, &platforms, PublishedBy::Auto)
        .await
        .unwrap();
    assert!(matches!(outcome, PublishOutcome::AlreadyPublished));

    let draft = stores.pending().unwrap().unwrap();
    assert_eq!(draft.message_id.as_deref(), Some("7"));
    assert_eq!(draft.published_by, Some(PublishedBy::Manual));
}

#[tokio::test]
async fn one_platform_failing_does_not_stop_the_others() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["X"]);

    let text = text_mock("POST:\nHello\n\nIMAGE_PROMPT:\nA photo");
    let image = image_mock();
    generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();

    let platforms: Vec<Box<dyn Platform>> = vec![
        Box::new(failing_platform("vk")),
        Box::new(platform_mock("max", "m-9")),
    ];
    let outcome = publish_pending_with(&stores, &platforms, PublishedBy::Auto)
        .await
        .unwrap();
    match outcome {
        PublishOutcome::Published {
            message_id,
            platform_ids,
        } => {
            assert_eq!(message_id, "m-9");
            assert_eq!(platform_ids.len(), 1);
            assert!(platform_ids.contains_key("max"));
        }
        other => panic!("expected Published, got {other:?}"),
    }
    assert_eq!(
        stores.pending().unwrap().unwrap().status,
        DraftStatus::Published
    );
}

#[tokio::test]
async fn zero_successful_platforms_keeps_draft_pending() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["X"]);

    let text = text_mock("POST:\nHello\n\nIMAGE_PROMPT:\nA photo");
    let image = image_mock();
    generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();

    let platforms: Vec<Box<dyn Platform>> = vec![
        Box::new(failing_platform("telegram")),
        Box::new(failing_platform("vk")),
    ];
    let result = publish_pending_with(&stores, &platforms, PublishedBy::Auto).await;
    assert!(result.is_err(), "zero successes must be a failure");

    // Draft stays pending for a retry, idea stays unused, no history entry.
    assert_eq!(
        stores.pending().unwrap().unwrap().status,
        DraftStatus::Pending
    );
    assert!(!stores.ideas().unwrap()[0].used);
    assert!(stores.history().unwrap().is_empty());
}

#[tokio::test]
async fn face_swap_runs_after_generation_when_not_inline() {
    use autoposter::config::FaceSwapProvider;
    use autoposter::face_swap::{FaceSwapper, MockFaceSwapper};

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.face_swap_provider = Some(FaceSwapProvider::Replicate);
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["X"]);
    stores
        .write(
            autoposter::store::EXPERT_FACE_FILE,
            &serde_json::json!({ "image_base64": autoposter::media::encode_base64(b"face") }),
        )
        .unwrap();

    let text = text_mock("POST:\nHello\n\nIMAGE_PROMPT:\nA photo");
    let mut image = MockImageGenerator::new();
    image.expect_provider_name().return_const("gemini");
    // Replicate cannot take the face inline, so generation gets no face.
    image
        .expect_generate()
        .times(1)
        .withf(|_, face, _| face.is_none())
        .returning(|_, _, _| Ok(png_bytes()));

    let mut swapper = MockFaceSwapper::new();
    swapper.expect_provider_name().return_const("replicate");
    swapper
        .expect_swap()
        .times(1)
        .returning(|_, _, _| Ok(png_bytes()));

    generate_draft_with(&config, &stores, &text, &image, Some(&swapper as &dyn FaceSwapper))
        .await
        .unwrap();
    assert_eq!(
        stores.pending().unwrap().unwrap().face_swap_provider,
        "replicate"
    );
}

#[tokio::test]
async fn failed_face_swap_keeps_the_generated_image() {
    use autoposter::config::FaceSwapProvider;
    use autoposter::face_swap::{FaceSwapper, MockFaceSwapper};

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.face_swap_provider = Some(FaceSwapProvider::Replicate);
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["X"]);
    stores
        .write(
            autoposter::store::EXPERT_FACE_FILE,
            &serde_json::json!({ "image_base64": autoposter::media::encode_base64(b"face") }),
        )
        .unwrap();

    let text = text_mock("POST:\nHello\n\nIMAGE_PROMPT:\nA photo");
    let image = image_mock();
    let mut swapper = MockFaceSwapper::new();
    swapper.expect_provider_name().return_const("replicate");
    swapper.expect_swap().times(1).returning(|_, _, _| {
        Err(autoposter::error::ProviderError::Api {
            provider: "replicate",
            detail: "prediction failed".to_string(),
        })
    });

    let outcome = generate_draft_with(
        &config,
        &stores,
        &text,
        &image,
        Some(&swapper as &dyn FaceSwapper),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, GenerateOutcome::Drafted { .. }));

    // The un-swapped image is kept, and the draft must not claim a swap
    // that never happened.
    let draft = stores.pending().unwrap().unwrap();
    assert!(!draft.image_base64.is_empty());
    assert_eq!(draft.face_swap_provider, "");
}

#[tokio::test]
async fn inline_capable_provider_gets_the_face_in_one_call() {
    use autoposter::config::FaceSwapProvider;

    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.face_swap_provider = Some(FaceSwapProvider::Gemini);
    let stores = Stores::new(dir.path());
    seed_ideas(&stores, &["X"]);
    let face_b64 = autoposter::media::encode_base64(b"face");
    stores
        .write(
            autoposter::store::EXPERT_FACE_FILE,
            &serde_json::json!({ "image_base64": face_b64 }),
        )
        .unwrap();

    let text = text_mock("POST:\nHello\n\nIMAGE_PROMPT:\nA photo");
    let mut image = MockImageGenerator::new();
    image.expect_provider_name().return_const("gemini");
    let expected_face = face_b64.clone();
    image
        .expect_generate()
        .times(1)
        .withf(move |_, face, _| face.as_deref() == Some(expected_face.as_str()))
        .returning(|_, _, _| Ok(png_bytes()));

    // No separate swapper configured for the inline path.
    generate_draft_with(&config, &stores, &text, &image, None)
        .await
        .unwrap();
    assert_eq!(
        stores.pending().unwrap().unwrap().face_swap_provider,
        "gemini-inline"
    );
}
