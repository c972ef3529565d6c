//! Comic building blocks
//!
//! Prompt text, storyboard validation, moderation thresholds and panel
//! stitching. Nothing here performs I/O.

pub mod moderation;
pub mod prompt;
pub mod stitch;
pub mod storyboard;

pub use moderation::{Flagged, ModerationPolicy};
pub use stitch::{GridLayout, stitch};
pub use storyboard::{Panel, Storyboard};
