//! Storyboard returned by the chat model

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

const UNTITLED: &str = "Untitled Dream";
const DEFAULT_CHARACTER_SHEET: &str = "Follow reference image";

/// One panel of a storyboard.
///
/// `description`/`speech` come from the story-artist prompt; the structured
/// fields come from the editor prompt. Either set may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub speech: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_guidance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_and_emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_and_lighting: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
}

/// Storyboard for one comic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storyboard {
    pub title: String,
    #[serde(default)]
    pub style: String,
    pub character_sheet: String,
    pub panels: Vec<Panel>,
}

#[derive(Debug, Deserialize)]
struct RawStoryboard {
    status: Option<String>,
    message: Option<String>,
    title: Option<String>,
    style: Option<String>,
    character_sheet: Option<String>,
    panels: Option<Vec<Panel>>,
}

impl Storyboard {
    /// Validate a model reply.
    ///
    /// # Errors
    /// - `PolicyViolation` if the model answered `status: "error"`
    /// - `Upstream` if there is no usable `panels` array
    pub fn from_value(value: serde_json::Value, max_panels: usize) -> Result<Self, AppError> {
        let raw: RawStoryboard = serde_json::from_value(value).map_err(|e| {
            AppError::Upstream(format!("Failed to generate a valid storyboard: {e}"))
        })?;

        if raw.status.as_deref() == Some("error") {
            let message = raw
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "The story could not be turned into a comic".to_string());
            return Err(AppError::PolicyViolation(message));
        }

        let mut panels = raw.panels.unwrap_or_default();
        if panels.is_empty() {
            return Err(AppError::Upstream(
                "Failed to generate a valid storyboard: no panels".to_string(),
            ));
        }
        if panels.len() > max_panels {
            tracing::warn!(
                returned = panels.len(),
                max_panels,
                "Storyboard has too many panels; truncating"
            );
            panels.truncate(max_panels);
        }

        Ok(Self {
            title: non_empty_or(raw.title, UNTITLED),
            style: raw.style.unwrap_or_default().trim().to_string(),
            character_sheet: non_empty_or(raw.character_sheet, DEFAULT_CHARACTER_SHEET),
            panels,
        })
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Models sometimes send `null` where an empty string is meant.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
