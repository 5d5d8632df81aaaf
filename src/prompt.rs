use std::collections::HashMap;

use include_dir::{include_dir, Dir};
use thiserror::Error;

use crate::config::Config;
use crate::models::{GenerationRequest, ImageSlot, ModelStyle, CONTEXT_MODEL_DECIDES};

static PROMPT_ASSETS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/assets/prompts");

const BRIEF_FILE: &str = "creative_brief.txt";
const SHOT_TEMPLATE_FILE: &str = "shot_template.json";
const CAPTIONS_FILE: &str = "captions.json";

const NO_NOTES: &str = "No extra notes; derive the direction from the images.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt asset {0} is missing")]
    Missing(&'static str),
    #[error("prompt asset {0} is not valid UTF-8")]
    NotText(&'static str),
    #[error("prompt asset {file} is invalid: {reason}")]
    Invalid { file: &'static str, reason: String },
}

/// Fill-ins for the creative brief.
#[derive(Debug, Clone)]
pub struct BriefInputs<'a> {
    pub model_style: ModelStyle,
    pub context: &'a str,
    pub notes: &'a str,
    pub description_language: &'a str,
    pub prompt_language: &'a str,
}

impl<'a> BriefInputs<'a> {
    pub fn for_request(request: &'a GenerationRequest, config: &'a Config) -> Self {
        Self {
            model_style: request.model_style,
            context: &request.context,
            notes: &request.notes,
            description_language: &config.description_language,
            prompt_language: &config.prompt_language,
        }
    }
}

/// Instruction text and role captions shipped with the binary.
#[derive(Debug, Clone)]
pub struct PromptAssets {
    brief: String,
    shot_template: String,
    captions: HashMap<ImageSlot, String>,
}

impl PromptAssets {
    pub fn load() -> Result<Self, PromptError> {
        let brief = asset_text(BRIEF_FILE)?;
        let shot_template = asset_text(SHOT_TEMPLATE_FILE)?;
        serde_json::from_str::<serde_json::Value>(&shot_template).map_err(|e| PromptError::Invalid {
            file: SHOT_TEMPLATE_FILE,
            reason: e.to_string(),
        })?;
        let captions: HashMap<ImageSlot, String> =
            serde_json::from_str(&asset_text(CAPTIONS_FILE)?).map_err(|e| PromptError::Invalid {
                file: CAPTIONS_FILE,
                reason: e.to_string(),
            })?;
        if let Some(slot) = ImageSlot::ALL.iter().find(|slot| !captions.contains_key(*slot)) {
            return Err(PromptError::Invalid {
                file: CAPTIONS_FILE,
                reason: format!("no caption for {}", slot.as_str()),
            });
        }
        Ok(Self { brief, shot_template, captions })
    }

    pub fn caption(&self, slot: ImageSlot) -> &str {
        self.captions.get(&slot).map(String::as_str).unwrap_or_default()
    }

    pub fn render_brief(&self, inputs: &BriefInputs<'_>) -> String {
        let context = if inputs.context.trim().is_empty() || inputs.context == CONTEXT_MODEL_DECIDES {
            format!("{CONTEXT_MODEL_DECIDES}: choose the setting that sells this product best")
        } else {
            inputs.context.trim().to_string()
        };
        let notes = match inputs.notes.trim() {
            "" => NO_NOTES,
            notes => notes,
        };

        // The shot template is an asset, so it is spliced in before the single
        // fill pass. Values inserted by that pass are never scanned again.
        let brief = self.brief.replace("{{prompt_template}}", self.shot_template.trim_end());
        fill_placeholders(&brief, |name| match name {
            "model_style" => Some(inputs.model_style.label()),
            "casting_hint" => Some(inputs.model_style.casting_hint()),
            "context" => Some(context.as_str()),
            "notes" => Some(notes),
            "description_language" => Some(inputs.description_language),
            "prompt_language" => Some(inputs.prompt_language),
            _ => None,
        })
    }
}

/// Replaces each `{{name}}` token in one left-to-right pass. Unknown tokens are kept as written.
fn fill_placeholders<'v>(template: &str, lookup: impl Fn(&str) -> Option<&'v str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => match lookup(&after[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str("{{");
                    rest = after;
                }
            },
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn asset_text(name: &'static str) -> Result<String, PromptError> {
    let file = PROMPT_ASSETS.get_file(name).ok_or(PromptError::Missing(name))?;
    file.contents_utf8()
        .map(str::to_string)
        .ok_or(PromptError::NotText(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs<'a>(style: ModelStyle, context: &'a str, notes: &'a str) -> BriefInputs<'a> {
        BriefInputs {
            model_style: style,
            context,
            notes,
            description_language: "Vietnamese",
            prompt_language: "English",
        }
    }

    #[test]
    fn bundled_assets_load() {
        let assets = PromptAssets::load().unwrap();
        for slot in ImageSlot::ALL {
            assert!(!assets.caption(slot).is_empty());
        }
        assert!(assets.caption(ImageSlot::DetailShot).contains("material"));
    }

    #[test]
    fn brief_fills_every_placeholder() {
        let assets = PromptAssets::load().unwrap();
        let text = assets.render_brief(&inputs(
            ModelStyle::Chinese,
            "Quán Cafe / Lifestyle",
            "sunset, luxurious",
        ));
        assert!(!text.contains("{{"), "unfilled placeholder in: {text}");
        assert!(text.contains("Model Trung Quốc"));
        assert!(text.contains("Quán Cafe / Lifestyle"));
        assert!(text.contains("sunset, luxurious"));
        assert!(text.contains("\"camera_technical\""));
        assert!(text.contains("\"avoid\""));
        assert!(text.contains("exactly 3"));
        assert!(text.contains("exactly 5"));
        assert!(text.contains("in Vietnamese"));
        assert!(text.contains("in English"));
    }

    #[test]
    fn sentinel_context_hands_the_setting_to_the_model() {
        let assets = PromptAssets::load().unwrap();
        let text = assets.render_brief(&inputs(ModelStyle::Korean, CONTEXT_MODEL_DECIDES, ""));
        assert!(text.contains("choose the setting"));
        assert!(text.contains(NO_NOTES));
        assert!(text.contains("Model cast for 'Model Hàn Quốc'"));
    }

    #[test]
    fn user_text_with_placeholder_syntax_is_passed_through() {
        let assets = PromptAssets::load().unwrap();
        let notes = "keep {{prompt_language}} tag, not {{notes}}";
        let context = "Studio {{description_language}} {{context}}";
        let text = assets.render_brief(&inputs(ModelStyle::Korean, context, notes));
        assert!(text.contains(notes), "notes were rewritten: {text}");
        assert!(text.contains(context), "context was rewritten: {text}");
        assert!(text.contains("in English"));
    }

    #[test]
    fn unknown_and_unclosed_tokens_are_kept() {
        let filled = fill_placeholders("a {{x}} {{y}} {{open", |name| (name == "x").then_some("1"));
        assert_eq!(filled, "a 1 {{y}} {{open");
    }
}
