use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{GenerationError, ImageGenerationError};
use crate::media::{inline_part, to_data_url, truncate_base64_in_json};
use crate::models::{Concept, GenerationRequest, ImageSlot, CONCEPTS_PER_REQUEST, POSES_PER_CONCEPT};
use crate::prompt::{BriefInputs, PromptAssets};

/// The two remote calls the studio depends on.
#[async_trait]
pub trait CreativeBackend: Send + Sync {
    /// Turns product images and options into exactly three validated concepts.
    async fn generate_concepts(&self, request: &GenerationRequest) -> Result<Vec<Concept>, GenerationError>;

    /// Renders one pose prompt into a `data:` image reference.
    async fn generate_image(&self, prompt: &str) -> Result<String, ImageGenerationError>;
}

pub struct GeminiClient {
    client: Client,
    config: Arc<Config>,
    assets: PromptAssets,
}

impl GeminiClient {
    pub fn new(config: Arc<Config>, assets: PromptAssets) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config, assets })
    }

    async fn perform_api_call(&self, model: &str, payload: &Value) -> Result<GeminiResponse, String> {
        let url = format!("{}/models/{}:generateContent", self.config.api_base, model);
        info!("🔗 Making request to: {}", url);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut logged = payload.clone();
            truncate_base64_in_json(&mut logged);
            tracing::debug!("📤 Request body: {}", serde_json::to_string_pretty(&logged).unwrap_or_default());
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| self.redact(&e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);
        let response_text = response.text().await.map_err(|e| self.redact(&e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", truncate_for_log(&response_text, 1000));
            return Err(format!("status={} body={}", status, truncate_for_log(&response_text, 300)));
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let logged = match serde_json::from_str::<Value>(&response_text) {
                Ok(mut value) => {
                    truncate_base64_in_json(&mut value);
                    serde_json::to_string_pretty(&value).unwrap_or_default()
                }
                Err(_) => truncate_for_log(&response_text, 1000),
            };
            tracing::debug!("📥 Raw Gemini API response: {}", logged);
        }

        serde_json::from_str(&response_text).map_err(|e| format!("parse error: {e}"))
    }

    fn redact(&self, text: &str) -> String {
        if self.config.api_key.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.config.api_key, "***")
        }
    }
}

#[async_trait]
impl CreativeBackend for GeminiClient {
    async fn generate_concepts(&self, request: &GenerationRequest) -> Result<Vec<Concept>, GenerationError> {
        let payload = build_concept_payload(request, &self.assets, &self.config);
        info!(
            "🎯 Generating concepts: style='{}' context='{}' images={}",
            request.model_style.label(),
            request.context,
            1 + request.detail_shot.is_some() as usize + request.model_shot.is_some() as usize
        );

        let response = self
            .perform_api_call(&self.config.text_model, &payload)
            .await
            .map_err(|e| {
                warn!("❌ Concept generation call failed: {}", e);
                GenerationError(e)
            })?;

        let text = extract_text(&response).ok_or_else(|| {
            warn!("⚠️ No text found in concept response");
            GenerationError("no response text generated".into())
        })?;
        let concepts = parse_concepts(&text).inspect_err(|e| warn!("❌ {}", e))?;
        info!(
            "✅ Received {} concepts: {}",
            concepts.len(),
            concepts.iter().map(|c| c.concept_name.as_str()).collect::<Vec<_>>().join(" | ")
        );
        Ok(concepts)
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, ImageGenerationError> {
        info!("🖼️ Generating pose image with prompt: {}", truncate_for_log(prompt, 100));
        let payload = build_image_payload(prompt, &self.config.image_aspect_ratio);
        let response = self
            .perform_api_call(&self.config.image_model, &payload)
            .await
            .map_err(|e| {
                warn!("❌ Image generation call failed: {}", e);
                ImageGenerationError(e)
            })?;

        match extract_first_image(&response) {
            Some(url) => {
                info!("✅ Image generated ({} chars)", url.len());
                Ok(url)
            }
            None => {
                warn!("⚠️ No image data found in API response");
                Err(ImageGenerationError("no image data in response".into()))
            }
        }
    }
}

/// JSON schema handed to Gemini as `responseSchema` for the concept call.
pub fn concept_schema() -> Value {
    let string = json!({ "type": "STRING" });
    let object = |fields: &[&str]| {
        let properties: serde_json::Map<String, Value> =
            fields.iter().map(|f| (f.to_string(), string.clone())).collect();
        json!({ "type": "OBJECT", "properties": properties, "required": fields })
    };

    json!({
        "type": "ARRAY",
        "minItems": CONCEPTS_PER_REQUEST,
        "maxItems": CONCEPTS_PER_REQUEST,
        "items": {
            "type": "OBJECT",
            "properties": {
                "conceptName": string,
                "salesGoal": object(&["emotionalTrigger", "usp", "perceivedValue"]),
                "context": object(&["location", "lighting", "colorPalette", "vibe"]),
                "poses": {
                    "type": "ARRAY",
                    "description": "List of 5 detailed poses with specific AI prompts",
                    "minItems": POSES_PER_CONCEPT,
                    "maxItems": POSES_PER_CONCEPT,
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "description": { "type": "STRING", "description": "Human-readable description of the pose" },
                            "aiPrompt": { "type": "STRING", "description": "Image generation prompt for this pose, formatted as a JSON string" }
                        },
                        "required": ["description", "aiPrompt"]
                    }
                },
                "style": object(&["makeupAndHair", "garmentNotes"]),
                "finalAiPrompt": { "type": "STRING", "description": "Overall concept image prompt, formatted as a JSON string" }
            },
            "required": ["conceptName", "salesGoal", "context", "poses", "style", "finalAiPrompt"]
        }
    })
}

/// Image parts each followed by their role caption, then the creative brief.
pub fn build_concept_payload(request: &GenerationRequest, assets: &PromptAssets, config: &Config) -> Value {
    let mut parts = Vec::new();
    let images = [
        (ImageSlot::FullShot, Some(&request.full_shot)),
        (ImageSlot::DetailShot, request.detail_shot.as_ref()),
        (ImageSlot::ModelShot, request.model_shot.as_ref()),
    ];
    for (slot, image) in images {
        if let Some(image) = image {
            parts.push(inline_part(image));
            parts.push(json!({ "text": assets.caption(slot) }));
        }
    }
    parts.push(json!({ "text": assets.render_brief(&BriefInputs::for_request(request, config)) }));

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": concept_schema(),
            "temperature": config.concept_temperature,
        }
    })
}

pub fn build_image_payload(prompt: &str, aspect_ratio: &str) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"],
            "imageConfig": { "aspectRatio": aspect_ratio }
        }
    })
}

/// Parses the concept call's JSON text and checks it has the promised shape.
pub fn parse_concepts(text: &str) -> Result<Vec<Concept>, GenerationError> {
    let body = strip_code_fence(text);
    let concepts: Vec<Concept> =
        serde_json::from_str(body).map_err(|e| GenerationError(format!("response is not a concept list: {e}")))?;
    validate_concepts(&concepts)?;
    Ok(concepts)
}

pub fn validate_concepts(concepts: &[Concept]) -> Result<(), GenerationError> {
    if concepts.len() != CONCEPTS_PER_REQUEST {
        return Err(GenerationError(format!(
            "expected {} concepts, got {}",
            CONCEPTS_PER_REQUEST,
            concepts.len()
        )));
    }
    for (i, concept) in concepts.iter().enumerate() {
        if concept.poses.len() != POSES_PER_CONCEPT {
            return Err(GenerationError(format!(
                "concept {} has {} poses, expected {}",
                i,
                concept.poses.len(),
                POSES_PER_CONCEPT
            )));
        }
        let mut fields = vec![
            ("conceptName", &concept.concept_name),
            ("salesGoal.emotionalTrigger", &concept.sales_goal.emotional_trigger),
            ("salesGoal.usp", &concept.sales_goal.usp),
            ("salesGoal.perceivedValue", &concept.sales_goal.perceived_value),
            ("context.location", &concept.context.location),
            ("context.lighting", &concept.context.lighting),
            ("context.colorPalette", &concept.context.color_palette),
            ("context.vibe", &concept.context.vibe),
            ("style.makeupAndHair", &concept.style.makeup_and_hair),
            ("style.garmentNotes", &concept.style.garment_notes),
            ("finalAiPrompt", &concept.final_ai_prompt),
        ];
        for pose in &concept.poses {
            fields.push(("poses[].description", &pose.description));
            fields.push(("poses[].aiPrompt", &pose.ai_prompt));
        }
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(GenerationError(format!("concept {i} has an empty {name}")));
        }
    }
    Ok(())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

/// All text parts of the first candidate that has any, joined in order.
fn extract_text(resp: &GeminiResponse) -> Option<String> {
    resp.candidates.iter().find_map(|c| {
        let text: String = c
            .content
            .parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!text.trim().is_empty()).then_some(text)
    })
}

fn extract_first_image(resp: &GeminiResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                if !inline_data.data.is_empty() {
                    info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                    return Some(to_data_url(&inline_data.mime_type, &inline_data.data));
                }
            }
        }
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::image_input;
    use crate::models::{ModelStyle, Pose, SalesGoal, SceneContext, StyleNotes, CONTEXT_MODEL_DECIDES};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    pub(crate) fn sample_concept(name: &str) -> Concept {
        Concept {
            concept_name: name.to_string(),
            sales_goal: SalesGoal {
                emotional_trigger: "tự tin".into(),
                usp: "lụa tơ tằm".into(),
                perceived_value: "cao cấp".into(),
            },
            context: SceneContext {
                location: "studio".into(),
                lighting: "softbox".into(),
                color_palette: "kem, nâu".into(),
                vibe: "thanh lịch".into(),
            },
            poses: (0..POSES_PER_CONCEPT)
                .map(|i| Pose {
                    description: format!("pose {i}"),
                    ai_prompt: format!("{{\"scene\":{{\"description\":\"shot {i}\"}}}}"),
                })
                .collect(),
            style: StyleNotes {
                makeup_and_hair: "tự nhiên".into(),
                garment_notes: "giữ form".into(),
            },
            final_ai_prompt: "{\"scene\":{}}".into(),
        }
    }

    pub(crate) fn sample_concepts() -> Vec<Concept> {
        ["Sớm mai", "Phố thị", "Hoàng hôn"].iter().map(|n| sample_concept(n)).collect()
    }

    fn request(with_optional: bool) -> GenerationRequest {
        let img = |mime: &str, bytes: &'static [u8]| image_input(Some(mime), Bytes::from_static(bytes), None);
        GenerationRequest {
            full_shot: img("image/jpeg", b"full"),
            detail_shot: with_optional.then(|| img("image/png", b"detail")),
            model_shot: with_optional.then(|| img("image/webp", b"model")),
            model_style: ModelStyle::Korean,
            context: CONTEXT_MODEL_DECIDES.to_string(),
            notes: String::new(),
        }
    }

    #[test]
    fn payload_with_primary_only_has_image_caption_and_brief() {
        let assets = PromptAssets::load().unwrap();
        let payload = build_concept_payload(&request(false), &assets, &Config::default());
        let parts = payload["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[0]["inlineData"]["data"], "ZnVsbA==");
        assert_eq!(parts[1]["text"], assets.caption(ImageSlot::FullShot));
        assert!(parts[2]["text"].as_str().unwrap().contains("Model Hàn Quốc"));

        let config = &payload["generationConfig"];
        assert_eq!(config["responseMimeType"], "application/json");
        assert_eq!(config["responseSchema"], concept_schema());
        let temperature = config["temperature"].as_f64().unwrap();
        assert!(temperature > 0.0 && temperature < 1.0);
    }

    #[test]
    fn payload_orders_optional_images_with_their_captions() {
        let assets = PromptAssets::load().unwrap();
        let payload = build_concept_payload(&request(true), &assets, &Config::default());
        let parts = payload["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 7);
        assert_eq!(parts[2]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[3]["text"], assets.caption(ImageSlot::DetailShot));
        assert_eq!(parts[4]["inlineData"]["mimeType"], "image/webp");
        assert_eq!(parts[5]["text"], assets.caption(ImageSlot::ModelShot));
    }

    #[test]
    fn schema_requires_every_concept_field() {
        let schema = concept_schema();
        assert_eq!(schema["type"], "ARRAY");
        assert_eq!(
            schema["items"]["required"],
            json!(["conceptName", "salesGoal", "context", "poses", "style", "finalAiPrompt"])
        );
        assert_eq!(
            schema["items"]["properties"]["context"]["required"],
            json!(["location", "lighting", "colorPalette", "vibe"])
        );
        assert_eq!(schema["items"]["properties"]["poses"]["maxItems"], 5);
    }

    #[test]
    fn image_payload_requests_portrait_aspect() {
        let payload = build_image_payload("{\"scene\":{}}", "3:4");
        assert_eq!(payload["generationConfig"]["imageConfig"]["aspectRatio"], "3:4");
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "{\"scene\":{}}");
    }

    #[test]
    fn parses_three_valid_concepts() {
        let text = serde_json::to_string(&sample_concepts()).unwrap();
        let parsed = parse_concepts(&text).unwrap();
        assert_eq!(parsed, sample_concepts());
    }

    #[test]
    fn fenced_json_is_accepted() {
        let text = format!("```json\n{}\n```", serde_json::to_string(&sample_concepts()).unwrap());
        assert_eq!(parse_concepts(&text).unwrap().len(), 3);
    }

    #[test]
    fn wrong_concept_count_is_rejected() {
        let two = serde_json::to_string(&sample_concepts()[..2]).unwrap();
        assert!(parse_concepts(&two).unwrap_err().0.contains("expected 3 concepts"));
    }

    #[test]
    fn wrong_pose_count_is_rejected() {
        let mut concepts = sample_concepts();
        concepts[1].poses.pop();
        let err = parse_concepts(&serde_json::to_string(&concepts).unwrap()).unwrap_err();
        assert!(err.0.contains("concept 1 has 4 poses"));
    }

    #[test]
    fn blank_required_field_is_rejected() {
        let mut concepts = sample_concepts();
        concepts[2].poses[3].ai_prompt = "  ".into();
        let err = parse_concepts(&serde_json::to_string(&concepts).unwrap()).unwrap_err();
        assert!(err.0.contains("poses[].aiPrompt"));
    }

    #[test]
    fn unparsable_text_is_a_generation_error() {
        assert!(parse_concepts("Sorry, I can't help with that.").is_err());
        assert!(parse_concepts("{\"conceptName\": \"x\"}").is_err());
    }

    #[test]
    fn first_inline_image_becomes_a_data_url() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "here you go"}]}},
                {"content": {"parts": [
                    {"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo"}},
                    {"inlineData": {"mimeType": "image/jpeg", "data": "/9j/"}}
                ]}}
            ]
        }))
        .unwrap();
        assert_eq!(extract_first_image(&resp).as_deref(), Some("data:image/png;base64,iVBORw0KGgo"));
    }

    #[test]
    fn response_without_image_yields_none() {
        let resp: GeminiResponse =
            serde_json::from_value(json!({"candidates": [{"content": {"parts": [{"text": "no"}]}}]})).unwrap();
        assert_eq!(extract_first_image(&resp), None);
        let empty: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(extract_first_image(&empty), None);
        assert_eq!(extract_text(&empty), None);
    }

    #[test]
    fn text_parts_are_joined() {
        let resp: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "[1,"}, {"text": "2]"}]}}]
        }))
        .unwrap();
        assert_eq!(extract_text(&resp).as_deref(), Some("[1,2]"));
    }
}
