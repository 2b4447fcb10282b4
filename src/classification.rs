//! Classification result model, reward table and model-reply parsing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::deserializers::{de_option_confidence, de_option_trimmed_string};
use crate::error::{EcoSnapError, Result};

/// Placeholder used when the model gives no reasoning
pub const DEFAULT_REASONING: &str = "Classification complete";

/// Reward tiers as (inclusive lower bound, credits), highest first
const REWARD_TIERS: [(f64, u32); 2] = [(80.0, 15), (60.0, 10)];
const BASE_REWARD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Recyclable,
    Organic,
    Hazardous,
    General,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Recyclable,
        Category::Organic,
        Category::Hazardous,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Recyclable => "recyclable",
            Category::Organic => "organic",
            Category::Hazardous => "hazardous",
            Category::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recyclable" => Ok(Category::Recyclable),
            "organic" => Ok(Category::Organic),
            "hazardous" => Ok(Category::Hazardous),
            "general" => Ok(Category::General),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub category: Category,
    pub confidence: u8,
    pub reasoning: String,
    pub credits_earned: u32,
}

/// EcoCredits granted for a classification.
///
/// Compares the raw confidence, before any display rounding: 79.6 earns 10
/// even though it is reported as 80.
pub fn credits_for_confidence(confidence: f64) -> u32 {
    REWARD_TIERS
        .iter()
        .find(|(floor, _)| confidence >= *floor)
        .map(|(_, credits)| *credits)
        .unwrap_or(BASE_REWARD)
}

/// Rounds a raw confidence to the reported integer percentage
pub fn display_confidence(confidence: f64) -> u8 {
    confidence.round().clamp(0.0, 100.0) as u8
}

/// Shape the model is asked to reply with. Every field is optional here so
/// that structural problems surface as `InvalidModelResponse` rather than a
/// parse failure.
#[derive(Debug, Deserialize)]
struct ModelVerdict {
    #[serde(default, deserialize_with = "de_option_trimmed_string")]
    category: Option<String>,
    #[serde(default, deserialize_with = "de_option_confidence")]
    confidence: Option<f64>,
    #[serde(default, deserialize_with = "de_option_trimmed_string")]
    reasoning: Option<String>,
}

/// Turn a free-text model reply into a result.
///
/// The first balanced `{...}` in the reply is taken as the verdict; prose and
/// code fences around it are ignored.
pub fn parse_model_reply(reply: &str) -> Result<ClassificationResult> {
    let candidate = extract_first_json_object(reply).ok_or_else(|| {
        EcoSnapError::MalformedModelResponse {
            details: format!("no JSON object in reply: {}", truncate_chars(reply, 200)),
        }
    })?;

    let value: serde_json::Value =
        serde_json::from_str(candidate).map_err(|e| EcoSnapError::MalformedModelResponse {
            details: format!("{}: {}", e, truncate_chars(candidate, 200)),
        })?;

    let verdict: ModelVerdict =
        serde_json::from_value(value).map_err(|e| EcoSnapError::InvalidModelResponse {
            details: e.to_string(),
        })?;

    let raw_category = verdict
        .category
        .ok_or_else(|| EcoSnapError::InvalidModelResponse {
            details: "missing category".to_string(),
        })?;
    let confidence = verdict
        .confidence
        .ok_or_else(|| EcoSnapError::InvalidModelResponse {
            details: "missing confidence".to_string(),
        })?;
    let category = raw_category
        .parse::<Category>()
        .map_err(|details| EcoSnapError::InvalidModelResponse { details })?;

    Ok(ClassificationResult {
        category,
        credits_earned: credits_for_confidence(confidence),
        confidence: display_confidence(confidence),
        reasoning: verdict
            .reasoning
            .unwrap_or_else(|| DEFAULT_REASONING.to_string()),
    })
}

/// Returns the first brace-balanced object in `text`, skipping braces inside
/// JSON strings.
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let mut depth: u32 = 0;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            // Quotes only open strings once we are inside an object
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(idx);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0
                        && let Some(s) = start.take()
                    {
                        return Some(&text[s..idx + 1]);
                    }
                }
            }
            _ => {}
        }
    }

    None
}

fn truncate_chars(input: &str, max: usize) -> String {
    let mut out = String::new();
    for (idx, ch) in input.chars().enumerate() {
        if idx >= max {
            out.push_str("...");
            break;
        }
        out.push(ch);
    }
    out
}
