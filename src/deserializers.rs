//! Forgiving deserializers for model replies.
//!
//! Models do not always respect the requested JSON types, so fields that are
//! meant to be numeric also accept numeric strings.

use serde::{Deserialize, Deserializer};

/// Deserializes an optional confidence score.
///
/// # Accepted Formats
///
/// * **Numeric**: `85`, `72.5`
/// * **String numeric**: `"85"`, `" 72.5 "`
/// * **Percent string**: `"85%"`
/// * **Null / empty string**: `None`
///
/// # Errors
///
/// Returns an error for non-finite values, unparseable strings, and any other
/// JSON type (bool, array, object).
pub fn de_option_confidence<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(v) = opt else { return Ok(None) };
    let val = match v {
        serde_json::Value::Null => return Ok(None),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("invalid numeric for confidence"))?,
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            let s = s.strip_suffix('%').unwrap_or(s).trim();
            s.parse::<f64>()
                .map_err(|_| D::Error::custom(format!("invalid confidence value: '{}'", s)))?
        }
        other => {
            return Err(D::Error::custom(format!(
                "invalid type for confidence: {}",
                other
            )));
        }
    };
    if !val.is_finite() {
        return Err(D::Error::custom("non-finite numeric for confidence"));
    }
    Ok(Some(val))
}

/// Deserializes an optional string, mapping non-string scalars to their text
/// form and blank strings to `None`.
pub fn de_option_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<serde_json::Value>::deserialize(deserializer)?;
    let s = match opt {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => s,
        Some(other @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => {
            other.to_string()
        }
        Some(_) => return Ok(None),
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Probe {
        #[serde(default, deserialize_with = "de_option_confidence")]
        confidence: Option<f64>,
        #[serde(default, deserialize_with = "de_option_trimmed_string")]
        label: Option<String>,
    }

    fn probe(json: &str) -> Result<Probe, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[test]
    fn test_confidence_formats() {
        assert_eq!(probe(r#"{"confidence": 85}"#).unwrap().confidence, Some(85.0));
        assert_eq!(probe(r#"{"confidence": 72.5}"#).unwrap().confidence, Some(72.5));
        assert_eq!(probe(r#"{"confidence": "64"}"#).unwrap().confidence, Some(64.0));
        assert_eq!(probe(r#"{"confidence": "90%"}"#).unwrap().confidence, Some(90.0));
        assert_eq!(probe(r#"{"confidence": null}"#).unwrap().confidence, None);
        assert_eq!(probe(r#"{"confidence": ""}"#).unwrap().confidence, None);
        assert_eq!(probe(r#"{}"#).unwrap().confidence, None);
    }

    #[test]
    fn test_confidence_rejects_garbage() {
        assert!(probe(r#"{"confidence": "high"}"#).is_err());
        assert!(probe(r#"{"confidence": true}"#).is_err());
        assert!(probe(r#"{"confidence": [80]}"#).is_err());
    }

    #[test]
    fn test_trimmed_string() {
        assert_eq!(
            probe(r#"{"label": "  organic "}"#).unwrap().label.as_deref(),
            Some("organic")
        );
        assert_eq!(probe(r#"{"label": "   "}"#).unwrap().label, None);
        assert_eq!(probe(r#"{"label": {"a": 1}}"#).unwrap().label, None);
    }
}
