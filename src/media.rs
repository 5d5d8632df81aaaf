use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::ImageInput;

pub const FALLBACK_MIME: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum DataUrlError {
    #[error("not a base64 data URL")]
    Malformed,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Picks the media type for an upload: the declared one if it is an image type,
/// otherwise whatever the bytes look like.
pub fn resolve_mime(declared: Option<&str>, data: &[u8]) -> String {
    if let Some(declared) = declared.map(str::trim) {
        if declared.starts_with("image/") {
            return declared.to_string();
        }
    }
    image::guess_format(data)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| FALLBACK_MIME.to_string())
}

pub fn image_input(declared: Option<&str>, data: Bytes, file_name: Option<String>) -> ImageInput {
    ImageInput {
        mime_type: resolve_mime(declared, &data),
        data,
        file_name,
    }
}

/// Gemini `inlineData` part for an uploaded image.
pub fn inline_part(image: &ImageInput) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": general_purpose::STANDARD.encode(&image.data),
        }
    })
}

pub fn to_data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}

/// Splits a `data:<mime>;base64,<payload>` reference back into media type and bytes.
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>), DataUrlError> {
    let rest = url.strip_prefix("data:").ok_or(DataUrlError::Malformed)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::Malformed)?;
    let mime = header.strip_suffix(";base64").ok_or(DataUrlError::Malformed)?;
    let bytes = general_purpose::STANDARD.decode(payload.trim())?;
    let mime = if mime.is_empty() { FALLBACK_MIME } else { mime };
    Ok((mime.to_string(), bytes))
}

/// Shortens base64 `data` fields so request/response bodies stay readable in logs.
pub fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 {
                            let head: String = s.chars().take(50).collect();
                            *val = Value::String(format!(
                                "{}...[truncated {} chars]",
                                head,
                                s.len() - head.len()
                            ));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}
