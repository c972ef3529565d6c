//! Per-category moderation thresholds
//!
//! Some violence is tolerated (dreams get dramatic and the storyboard prompt
//! reframes it); everything else is held to tight limits.

use std::collections::BTreeMap;
use std::fmt;

use crate::openai::ModerationScores;

/// Category whose score went over its threshold
#[derive(Debug, Clone, PartialEq)]
pub struct Flagged {
    pub category: String,
    pub score: f64,
    pub threshold: f64,
}

impl fmt::Display for Flagged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Content flagged for '{}' with score {:.4} (threshold: {})",
            self.category, self.score, self.threshold
        )
    }
}

/// Category → maximum accepted score
#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    thresholds: BTreeMap<&'static str, f64>,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        let thresholds = BTreeMap::from([
            ("hate", 0.1),
            ("hate/threatening", 0.05),
            ("harassment", 0.3),
            ("harassment/threatening", 0.1),
            ("self-harm", 0.05),
            ("self-harm/intent", 0.05),
            ("self-harm/instructions", 0.05),
            ("sexual", 0.2),
            ("sexual/minors", 0.01),
            ("violence", 0.4),
            ("violence/graphic", 0.15),
        ]);
        Self { thresholds }
    }
}

impl ModerationPolicy {
    /// First category (in name order) scoring strictly above its threshold.
    /// Categories without a threshold are ignored.
    pub fn evaluate(&self, scores: &ModerationScores) -> Result<(), Flagged> {
        for (category, threshold) in &self.thresholds {
            let Some(&score) = scores.get(*category) else {
                continue;
            };
            if score > *threshold {
                return Err(Flagged {
                    category: (*category).to_string(),
                    score,
                    threshold: *threshold,
                });
            }
        }
        Ok(())
    }
}
