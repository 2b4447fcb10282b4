//! Inbound image payloads: data-URL parsing, type and size checks.

use std::path::Path;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EcoSnapError, Result};

/// Mime type assumed for bare base64 payloads
const FALLBACK_MIME: &str = "image/jpeg";

static DATA_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([^;,]*)((?:;[^;,]*)*?);base64,(.*)$").expect("data url regex")
});

/// A validated image, ready to be referenced from a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    mime: String,
    base64: String,
    decoded_len: usize,
}

impl ImagePayload {
    /// Parse a client payload: either a `data:image/...;base64,` URL or bare base64
    pub fn parse(raw: &str, max_bytes: usize) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(EcoSnapError::invalid_input("Image data is required"));
        }

        let (mime, data) = if raw.starts_with("data:") {
            let caps = DATA_URL_RE.captures(raw).ok_or_else(|| {
                EcoSnapError::invalid_input("Image data URL must be base64 encoded")
            })?;
            let mime = caps
                .get(1)
                .map(|m| m.as_str().trim().to_ascii_lowercase())
                .unwrap_or_default();
            let data = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            (mime, data)
        } else {
            (FALLBACK_MIME.to_string(), raw)
        };

        if !mime.starts_with("image/") {
            return Err(EcoSnapError::invalid_input(
                "Please select an image file",
            ));
        }

        let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.is_empty() {
            return Err(EcoSnapError::invalid_input("Image data is required"));
        }

        // Reject oversized payloads before decoding them
        if compact.len() / 4 * 3 > max_bytes + 2 {
            return Err(too_large(max_bytes));
        }

        let decoded = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| EcoSnapError::invalid_input(format!("Image data is not valid base64: {}", e)))?;
        if decoded.is_empty() {
            return Err(EcoSnapError::invalid_input("Image data is required"));
        }
        if decoded.len() > max_bytes {
            return Err(too_large(max_bytes));
        }

        Ok(Self {
            mime,
            base64: compact,
            decoded_len: decoded.len(),
        })
    }

    /// Encode raw image bytes, guessing the mime type from the file extension
    pub fn from_file_bytes(path: &Path, bytes: &[u8], max_bytes: usize) -> Result<Self> {
        let mime = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();
        if !mime.starts_with("image/") {
            return Err(EcoSnapError::invalid_input(format!(
                "{} is not an image file",
                path.display()
            )));
        }
        if bytes.is_empty() {
            return Err(EcoSnapError::invalid_input("Image data is required"));
        }
        if bytes.len() > max_bytes {
            return Err(too_large(max_bytes));
        }
        Ok(Self {
            mime,
            base64: STANDARD.encode(bytes),
            decoded_len: bytes.len(),
        })
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn decoded_len(&self) -> usize {
        self.decoded_len
    }

    /// Normalized `data:` URL sent upstream
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64)
    }
}

fn too_large(max_bytes: usize) -> EcoSnapError {
    EcoSnapError::invalid_input(format!(
        "Please select an image under {}",
        human_size(max_bytes)
    ))
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    const KIB: usize = 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}
