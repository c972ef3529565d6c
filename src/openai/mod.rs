//! OpenAI client
//!
//! Chat completions (storyboards), transcription, image generation and
//! edits, and moderation, all over plain HTTPS.

mod client;
mod types;

pub use client::OpenAiClient;
pub use types::{ChatMessage, ModerationScores};
