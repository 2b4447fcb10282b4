//! Fixed instructions sent to the classification model.

use crate::clients::{ChatMessage, ChatRequest, ContentPart};

/// System turn: the four categories and the exact reply shape
pub const SYSTEM_PROMPT: &str = r#"You are an expert waste classification AI. Analyze images and classify waste into one of these categories:
- recyclable: plastic bottles, metal cans, glass, paper, cardboard
- organic: food waste, plant matter, biodegradable materials
- hazardous: batteries, electronics, chemicals, medical waste
- general: everything else that doesn't fit above categories

Respond ONLY with valid JSON in this exact format:
{"category": "recyclable"|"organic"|"hazardous"|"general", "confidence": 85, "reasoning": "brief explanation"}

Be precise and confident in your classification."#;

/// Text part of the user turn, sent alongside the image
pub const USER_INSTRUCTION: &str = "Classify this waste item into one of the categories: recyclable, organic, hazardous, or general. Provide confidence score (0-100) and brief reasoning.";

/// Build the single chat-completion request for one image
pub fn classification_request(model: &str, temperature: f32, image_url: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_parts(vec![
                ContentPart::text(USER_INSTRUCTION),
                ContentPart::image_url(image_url),
            ]),
        ],
        temperature,
    }
}
