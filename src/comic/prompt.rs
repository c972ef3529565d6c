//! Prompt builders for storyboards and panel images

use lazy_static::lazy_static;
use regex::Regex;

use super::storyboard::Panel;
use crate::openai::ChatMessage;

/// Appended to every panel prompt.
pub const POLICY_TAIL: &str = "The image must not contain sexual content, graphic violence, hateful symbols or copyrighted characters.";

/// Negative prompt shared by every reference-guided panel.
pub const UNIVERSAL_NEGATIVE_PROMPT: &str = "blurry, low quality, jpeg artifacts, deformed, disfigured, bad anatomy, extra limbs, extra fingers, watermark, text, signature, logo";

lazy_static! {
    static ref BANNED_WORDS: Regex = Regex::new(r"(?i)\b(rape|sex|nude|kill|blood|gore)\b")
        .expect("banned word pattern is valid");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern is valid");
}

const STORYBOARD_SYSTEM_PROMPT: &str = r#"You are an award-winning comic-book story artist.

Goal → Return a storyboard **JSON** describing ONE short comic in **4 - 6 panels**.
The comic must:

• use a CONSISTENT visual style (name the style clearly)
• keep the same main character design throughout
• have a clear beginning → middle → end that matches the dream
• avoid content that would violate the OpenAI policy (e.g. no explicit sex, gore, hate)

JSON schema **exactly**:
{
 "title":        string,                    // ≤ 60 chars
 "style":        string,                    // vivid 1-sentence art-style summary
 "panels": [                                // length 4-6
   {
     "description": string,                // 1-2 sentences: setting, characters, camera angle, mood
     "speech":      string                 // dialogue or "" (keep short)
   }
 ]
}

Return ONLY the JSON object. Do NOT wrap it in markdown or extra text."#;

/// Messages asking the chat model for a `{title, style, panels}` storyboard.
pub fn storyboard_messages(dream: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(STORYBOARD_SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Dream transcript (verbatim):\n\"\"\"\n{}\n\"\"\"",
            dream.trim()
        )),
    ]
}

/// System prompt for the editor storyboard used by background comic jobs.
///
/// The model validates the story first and answers `status: "error"` with a
/// user-facing `message` when it cannot be drawn.
pub fn editor_system_prompt(max_panels: usize) -> String {
    format!(
        r#"You are an expert AI comic book editor and a responsible creative director. Your first task is to analyze the user's story to determine the most CONCISE number of panels needed to tell it effectively, up to a maximum of {max_panels} (try to keep below if possible). Each panel must represent a distinct narrative beat or a significant change in action, emotion, or perspective. DO NOT CREATE REDUNDANT PANELS.

Your response MUST be a single JSON object.

First, validate the input story based on three criteria:
1. **Clarity and Feasibility:** The story must be clear, coherent, and long enough (at least 15 words) to be logically divided into a comic strip.
2. **Safety:** The story must not contain content that promotes illegal acts or severe harm.
3. **Creative Potential:** The story may contain sensitive themes like conflict or action.

- **If the story is invalid** (too short, nonsensical, or contains blatant, un-reframeable policy violations), return a JSON object with a 'status' of 'error' and a helpful 'message' explaining the issue to the user.
- **If the story is valid**, return a JSON object with a 'status' of 'success' and the keys "title", "character_sheet" and "panels".

**Instructions for a 'success' response:**

1. **title**: a one to three word title that describes the overall comic.
2. **character_sheet**: a single, detailed, reusable paragraph describing the main character. Be specific about immutable features like facial structure, eye color, hair style and color, and signature clothing items.
3. **panels**: the list of panel objects. Each panel object must contain:
   * **reference_guidance**: always "In the distinct style of the provided main character reference image".
   * **composition**: the virtual camera shot, in specific cinematic terms.
   * **action_and_emotion**: the specific actions and physical facial expressions, applying the Creative Reframing Principles if necessary.
   * **setting_and_lighting**: the environment and the lighting that sets the mood.
   * **negative_prompt**: a few specific contextual words that prevent misinterpretation of the scene.

**CRITICAL RULE FOR SENSITIVE CONTENT:** If the story involves fights, monsters, or conflict, DO NOT reject it. Apply these **Creative Reframing Principles** to `action_and_emotion`:

* **Focus on Action and Emotion, Not Gore:** imply impact through dynamic poses and reactions rather than blood, wounds, or injury.
* **Use Abstraction and Metaphor:** "a shadowy monster with menacing, sharp claws" instead of "a monster with bloody claws".
* **Describe the "Before and After":** "a character bracing for a blow" or "a character reeling backwards, dust and debris exploding around them".
* **Leverage the Art Style:** for a comic book style, describe dynamic action lines and impactful sound-effect visuals instead of the physical contact.

Generate the JSON object and nothing else."#
    )
}

/// Style and character block repeated in every panel prompt.
pub fn shared_style_block(style: &str, character_design: &str) -> String {
    collapse_whitespace(&format!(
        "{style}. {character_design}. Limited coherent colour palette; crisp comic-ink outlines; cinematic lighting."
    ))
}

/// Prompt for one panel of a storyboard comic. `idx` is zero-based.
pub fn panel_prompt(panel: &Panel, idx: usize, shared: &str, total: usize) -> String {
    let continuity = if idx == 0 {
        "Establish the scene."
    } else {
        "Match EXACT style and character design from description below."
    };
    let speech = if panel.speech.trim().is_empty() {
        String::new()
    } else {
        format!("Speech bubble text: \"{}\".", panel.speech.trim())
    };

    sanitize(&format!(
        "Panel {} of {}. {} {} {}. {} {}",
        idx + 1,
        total,
        continuity,
        shared,
        panel.description.trim(),
        speech,
        POLICY_TAIL
    ))
}

/// Prompt for a panel drawn against a character reference image.
pub fn reference_panel_prompt(panel: &Panel, character_sheet: &str) -> String {
    let positive = [
        panel.reference_guidance.as_deref().unwrap_or_default(),
        panel.composition.as_deref().unwrap_or_default(),
        panel
            .action_and_emotion
            .as_deref()
            .unwrap_or(panel.description.as_str()),
        panel.setting_and_lighting.as_deref().unwrap_or_default(),
    ]
    .join(", ");

    let negative = format!(
        "{}, {}",
        panel.negative_prompt.as_deref().unwrap_or_default(),
        UNIVERSAL_NEGATIVE_PROMPT
    );

    format!("{positive}, CHARACTER: {character_sheet} NEGATIVE PROMPT: {negative}")
}

/// Redact banned words and collapse whitespace.
pub fn sanitize(text: &str) -> String {
    let redacted = BANNED_WORDS.replace_all(text, "[redacted]");
    collapse_whitespace(&redacted)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
