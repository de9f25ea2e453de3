//! autoposter: generate social-media posts from an idea queue and publish
//! them to Telegram, VK, Max and Pinterest.
//!
//! The pipeline is a one-shot CLI run: pick the next unused idea, generate
//! post text and an illustration with the configured LLM providers, stage
//! the result as a pending draft, then fan the approved draft out to every
//! configured platform. All state lives in flat JSON files under one data
//! directory, optionally mirrored through a GitHub repository so a review
//! UI and the unattended scheduler can share it.

pub mod cli;
pub mod config;
pub mod error;
pub mod face_swap;
pub mod generate;
pub mod generate_image;
pub mod generate_text;
pub mod media;
pub mod platforms;
pub mod publish;
pub mod remote;
pub mod retry;
pub mod store;
