use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime settings, read once from the process environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    pub concept_temperature: f32,
    pub image_aspect_ratio: String,
    pub description_language: String,
    pub prompt_language: String,
    pub request_timeout: Duration,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            concept_temperature: 0.8,
            image_aspect_ratio: "3:4".to_string(),
            description_language: "Vietnamese".to_string(),
            prompt_language: "English".to_string(),
            request_timeout: Duration::from_secs(180),
            port: 8080,
        }
    }
}

impl Config {
    /// Loggable description of the API key; never includes any of its characters.
    pub fn api_key_summary(&self) -> String {
        match self.api_key.chars().count() {
            0 => "not set".to_string(),
            n => format!("set ({n} chars)"),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests don't touch the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, fallback: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
        };

        let concept_temperature = match lookup("CONCEPT_TEMPERATURE") {
            Some(raw) => {
                let value: f32 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    key: "CONCEPT_TEMPERATURE",
                    value: raw.clone(),
                    reason: format!("{e}"),
                })?;
                if !(value > 0.0 && value <= 2.0) {
                    return Err(ConfigError::Invalid {
                        key: "CONCEPT_TEMPERATURE",
                        value: raw,
                        reason: "must be greater than 0 and at most 2".into(),
                    });
                }
                value
            }
            None => defaults.concept_temperature,
        };

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "REQUEST_TIMEOUT_SECS",
                        value: raw,
                        reason: "expected a positive number of seconds".into(),
                    })
                }
            },
            None => defaults.request_timeout,
        };

        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                value: raw.clone(),
                reason: format!("{e}"),
            })?,
            None => defaults.port,
        };

        Ok(Self {
            api_key: lookup("GEMINI_API_KEY").unwrap_or_default().trim().to_string(),
            api_base: text("GEMINI_API_BASE", defaults.api_base)
                .trim_end_matches('/')
                .to_string(),
            text_model: text("GEMINI_TEXT_MODEL", defaults.text_model),
            image_model: text("GEMINI_IMAGE_MODEL", defaults.image_model),
            concept_temperature,
            image_aspect_ratio: text("IMAGE_ASPECT_RATIO", defaults.image_aspect_ratio),
            description_language: text("DESCRIPTION_LANGUAGE", defaults.description_language),
            prompt_language: text("PROMPT_LANGUAGE", defaults.prompt_language),
            request_timeout,
            port,
        })
    }
}
