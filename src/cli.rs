use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::Config;
use crate::generate::{generate_draft, GenerateOutcome};
use crate::publish::{publish_pending, PublishOutcome};
use crate::store::{PublishedBy, Stores};

/// CLI for autoposter: generate social-media posts from an idea queue and
/// publish them to the configured platforms.
#[derive(Parser)]
#[clap(
    name = "autoposter",
    version,
    about = "Generate an LLM text+image post from the idea queue and publish it to Telegram, VK, Max and Pinterest"
)]
pub struct Cli {
    /// Directory holding ideas.json, pending_post.json and the other state files
    #[clap(long, default_value = ".")]
    pub data_dir: PathBuf,

    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a draft from the next unused idea and save it as pending
    Generate,
    /// Publish the pending draft to all configured platforms
    Publish,
    /// Generate a draft and publish it in one shot
    Full,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.data_dir)?;
    let stores = Stores::new(&cli.data_dir);

    match cli.command.unwrap_or(Commands::Full) {
        Commands::Generate => {
            run_generate(&config, &stores).await?;
        }
        Commands::Publish => {
            run_publish(&config, &stores).await?;
        }
        Commands::Full => {
            if run_generate(&config, &stores).await? {
                run_publish(&config, &stores).await?;
            }
        }
    }
    Ok(())
}

/// Returns whether a draft is available for a follow-up publish.
async fn run_generate(config: &Config, stores: &Stores) -> Result<bool> {
    match generate_draft(config, stores).await? {
        GenerateOutcome::NoIdeaAvailable => {
            println!("No unused ideas available, nothing to do.");
            Ok(false)
        }
        GenerateOutcome::Drafted {
            idea,
            post_text_chars,
        } => {
            println!("Draft generated for idea '{idea}' ({post_text_chars} chars).");
            Ok(true)
        }
    }
}

async fn run_publish(config: &Config, stores: &Stores) -> Result<()> {
    // Unattended publishes are gated: the reviewer can flip the switch off
    // in provider.cfg and drafts then wait for manual approval.
    if !config.autopublish_enabled {
        info!("Autopublish disabled, leaving the draft pending");
        println!("Autopublish is disabled; draft left pending for review.");
        return Ok(());
    }

    match publish_pending(config, stores, PublishedBy::Auto).await? {
        PublishOutcome::NoDraft => {
            println!("No pending draft to publish.");
        }
        PublishOutcome::AlreadyPublished => {
            println!("Draft already published, nothing to do.");
        }
        PublishOutcome::Published {
            message_id,
            platform_ids,
        } => {
            println!(
                "Published to {} platform(s), message_id {message_id}.",
                platform_ids.len()
            );
        }
    }
    Ok(())
}
