//! CLI smoke tests: argument surface and the "nothing to do" exits that
//! need no network access or credentials.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn autoposter() -> Command {
    let mut cmd = Command::cargo_bin("autoposter").unwrap();
    // Keep the test hermetic: no .env pickup, no ambient provider config.
    for key in [
        "TEXT_PROVIDER",
        "IMAGE_PROVIDER",
        "FACE_SWAP_PROVIDER",
        "AUTOPUBLISH_ENABLED",
        "CLAUDE_API_KEY",
        "GEMINI_API_KEY",
        "OPENAI_API_KEY",
        "REPLICATE_API_KEY",
        "TELEGRAM_BOT_TOKEN",
        "TELEGRAM_CHANNEL_ID",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

#[test]
fn help_lists_the_three_modes() {
    autoposter()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("generate"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("full"));
}

#[test]
fn publish_without_a_draft_exits_zero() {
    let dir = tempdir().unwrap();
    autoposter()
        .current_dir(dir.path())
        .args(["--data-dir", "."])
        .arg("publish")
        .assert()
        .success()
        .stdout(predicate::str::contains("No pending draft"));
}

#[test]
fn generate_with_no_ideas_exits_zero() {
    let dir = tempdir().unwrap();
    autoposter()
        .current_dir(dir.path())
        .args(["--data-dir", "."])
        .arg("generate")
        .assert()
        .success()
        .stdout(predicate::str::contains("No unused ideas"));
}

#[test]
fn generate_without_credentials_fails_with_a_clear_error() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("ideas.json"),
        r#"[{"idea": "топик", "used": false}]"#,
    )
    .unwrap();
    autoposter()
        .current_dir(dir.path())
        .args(["--data-dir", "."])
        .arg("generate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("CLAUDE_API_KEY"));
}

#[test]
fn unknown_provider_in_cfg_fails_fast() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("ideas.json"),
        r#"[{"idea": "топик", "used": false}]"#,
    )
    .unwrap();
    std::fs::write(dir.path().join("provider.cfg"), "TEXT_PROVIDER=mistral\n").unwrap();
    autoposter()
        .current_dir(dir.path())
        .args(["--data-dir", "."])
        .arg("generate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("mistral"));
}
