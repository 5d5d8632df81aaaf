use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

pub const CONCEPTS_PER_REQUEST: usize = 3;
pub const POSES_PER_CONCEPT: usize = 5;

/// Context preset that leaves the setting up to the model.
pub const CONTEXT_MODEL_DECIDES: &str = "Tự do sáng tạo (AI quyết định)";

pub const CONTEXT_PRESETS: [&str; 9] = [
    CONTEXT_MODEL_DECIDES,
    "Studio Nền trơn (Clean Studio)",
    "Đường phố hiện đại (Urban Street)",
    "Thiên nhiên / Ngoài trời (Nature)",
    "Kiến trúc sang trọng (Luxury Architecture)",
    "Nội thất tối giản (Minimalist Indoor)",
    "Quán Cafe / Lifestyle",
    "Biển / Resort (Summer Vibe)",
    "Sân khấu / Ánh sáng nghệ thuật",
];

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelStyle {
    #[default]
    #[serde(rename = "Model Hàn Quốc")]
    Korean,
    #[serde(rename = "Model Việt Nam")]
    Vietnamese,
    #[serde(rename = "Model Trung Quốc")]
    Chinese,
    #[serde(rename = "Model Nàng thơ hiện đại")]
    ModernMuse,
}

impl ModelStyle {
    pub const ALL: [ModelStyle; 4] = [
        ModelStyle::Korean,
        ModelStyle::Vietnamese,
        ModelStyle::Chinese,
        ModelStyle::ModernMuse,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ModelStyle::Korean => "Model Hàn Quốc",
            ModelStyle::Vietnamese => "Model Việt Nam",
            ModelStyle::Chinese => "Model Trung Quốc",
            ModelStyle::ModernMuse => "Model Nàng thơ hiện đại",
        }
    }

    /// Hint for the `subject_model` block of generated image prompts.
    pub fn casting_hint(self) -> &'static str {
        match self {
            ModelStyle::Korean => "Korean; fair, dewy skin; soft, delicate features",
            ModelStyle::Vietnamese => "Vietnamese; warm, natural skin tone; graceful, gentle features",
            ModelStyle::Chinese => "Chinese; porcelain, luminous skin; refined, elegant features",
            ModelStyle::ModernMuse => {
                "Asian; natural glowing skin; poetic, romantic and modern look"
            }
        }
    }
}

/// The three upload positions of the studio form.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSlot {
    FullShot,
    DetailShot,
    ModelShot,
}

impl ImageSlot {
    pub const ALL: [ImageSlot; 3] = [ImageSlot::FullShot, ImageSlot::DetailShot, ImageSlot::ModelShot];

    pub fn is_required(self) -> bool {
        matches!(self, ImageSlot::FullShot)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageSlot::FullShot => "full-shot",
            ImageSlot::DetailShot => "detail-shot",
            ImageSlot::ModelShot => "model-shot",
        }
    }
}

/// An uploaded image held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Bytes,
    pub file_name: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub struct ImageMeta {
    pub mime_type: String,
    pub size: usize,
    pub file_name: Option<String>,
}

impl From<&ImageInput> for ImageMeta {
    fn from(img: &ImageInput) -> Self {
        Self {
            mime_type: img.mime_type.clone(),
            size: img.data.len(),
            file_name: img.file_name.clone(),
        }
    }
}

/// Everything one concept-generation call needs. The primary image is not optional.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub full_shot: ImageInput,
    pub detail_shot: Option<ImageInput>,
    pub model_shot: Option<ImageInput>,
    pub model_style: ModelStyle,
    pub context: String,
    pub notes: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SalesGoal {
    pub emotional_trigger: String,
    pub usp: String,
    pub perceived_value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SceneContext {
    pub location: String,
    pub lighting: String,
    pub color_palette: String,
    pub vibe: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pose {
    pub description: String,
    /// Serialized JSON document for the image model; never parsed here.
    pub ai_prompt: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StyleNotes {
    pub makeup_and_hair: String,
    pub garment_notes: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub concept_name: String,
    pub sales_goal: SalesGoal,
    pub context: SceneContext,
    pub poses: Vec<Pose>,
    pub style: StyleNotes,
    pub final_ai_prompt: String,
}

/// Lifecycle of one pose's preview image. Slots that were never triggered are `Idle`.
#[derive(Debug, Serialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PoseImageState {
    #[default]
    Idle,
    Loading,
    Ready { image: String },
    Failed { message: String },
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OptionsUpdate {
    #[serde(default)]
    pub model_style: Option<ModelStyle>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct SlotOption {
    pub slot: ImageSlot,
    pub required: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct StudioOptions {
    pub image_slots: Vec<SlotOption>,
    pub model_styles: Vec<ModelStyle>,
    pub contexts: Vec<&'static str>,
    pub default_model_style: ModelStyle,
    pub default_context: &'static str,
}

impl StudioOptions {
    pub fn catalog() -> Self {
        Self {
            image_slots: ImageSlot::ALL
                .iter()
                .map(|&slot| SlotOption { slot, required: slot.is_required() })
                .collect(),
            model_styles: ModelStyle::ALL.to_vec(),
            contexts: CONTEXT_PRESETS.to_vec(),
            default_model_style: ModelStyle::default(),
            default_context: CONTEXT_MODEL_DECIDES,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Clone, Default)]
pub struct SlotImages {
    #[serde(rename = "full-shot")]
    pub full_shot: Option<ImageMeta>,
    #[serde(rename = "detail-shot")]
    pub detail_shot: Option<ImageMeta>,
    #[serde(rename = "model-shot")]
    pub model_shot: Option<ImageMeta>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ConceptCardView {
    pub index: usize,
    pub concept: Concept,
    /// One entry per pose, `idle` for slots never triggered.
    pub poses: Vec<PoseImageState>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Clone)]
pub struct StudioSnapshot {
    pub id: Uuid,
    pub model_style: ModelStyle,
    pub context: String,
    pub notes: String,
    pub images: SlotImages,
    pub loading: bool,
    pub concepts: Option<Vec<ConceptCardView>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn model_style_serializes_by_display_label() {
        let value = serde_json::to_value(ModelStyle::ModernMuse).unwrap();
        assert_eq!(value, json!("Model Nàng thơ hiện đại"));
        let parsed: ModelStyle = serde_json::from_value(json!("Model Việt Nam")).unwrap();
        assert_eq!(parsed, ModelStyle::Vietnamese);
        for style in ModelStyle::ALL {
            assert_eq!(serde_json::to_value(style).unwrap(), json!(style.label()));
        }
    }

    #[test]
    fn unknown_model_style_is_rejected() {
        assert!(serde_json::from_value::<ModelStyle>(json!("Model Pháp")).is_err());
    }

    #[test]
    fn concept_uses_camel_case_wire_names() {
        let concept: Concept = serde_json::from_value(json!({
            "conceptName": "Seoul Morning",
            "salesGoal": {"emotionalTrigger": "calm", "usp": "linen", "perceivedValue": "premium"},
            "context": {"location": "cafe", "lighting": "soft", "colorPalette": "beige", "vibe": "quiet"},
            "poses": [{"description": "full body", "aiPrompt": "{\"scene\":{}}"}],
            "style": {"makeupAndHair": "natural", "garmentNotes": "steamed"},
            "finalAiPrompt": "{}"
        }))
        .unwrap();
        assert_eq!(concept.sales_goal.perceived_value, "premium");
        assert_eq!(concept.context.color_palette, "beige");
        assert_eq!(concept.poses[0].ai_prompt, "{\"scene\":{}}");
    }

    #[test]
    fn pose_state_is_tagged_by_status() {
        assert_eq!(serde_json::to_value(PoseImageState::Idle).unwrap(), json!({"status": "idle"}));
        assert_eq!(
            serde_json::to_value(PoseImageState::Failed { message: "x".into() }).unwrap(),
            json!({"status": "failed", "message": "x"})
        );
    }

    #[test]
    fn image_slot_path_names() {
        let slot: ImageSlot = serde_json::from_value(json!("detail-shot")).unwrap();
        assert_eq!(slot, ImageSlot::DetailShot);
        assert!(ImageSlot::FullShot.is_required());
        assert!(!ImageSlot::ModelShot.is_required());
    }
}
