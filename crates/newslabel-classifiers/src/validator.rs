//! Response validation
//!
//! Raw model output goes through a strict serde schema first, yielding
//! [`ParsedResponse::Parsed`] or [`ParsedResponse::Malformed`]. Parsed items
//! are then matched against the taxonomy and quality-checked. Quality issues
//! never change the success flag; only a malformed response does.

use newslabel_core::{Label, LabelScore};
use serde::Deserialize;
use std::collections::HashSet;

/// One label/confidence pair as the model wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct RawLabel {
    pub label: String,
    pub confidence: f64,
}

/// Result of the schema check
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Parsed(Vec<RawLabel>),
    Malformed(String),
}

/// Validated labels and quality warnings for one response
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    /// False only when the response could not be parsed
    pub success: bool,
    pub labels: Vec<LabelScore>,
    pub warnings: Vec<String>,
}

/// Validates model responses against the label taxonomy
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    confidence_threshold: f32,
    max_labels: usize,
}

impl ResponseValidator {
    /// Create a validator
    pub fn new(confidence_threshold: f32, max_labels: usize) -> Self {
        Self {
            confidence_threshold,
            max_labels,
        }
    }

    /// Check `raw` against the response schema.
    ///
    /// Accepts a bare JSON array, or an object wrapping the array under
    /// `output`, `result`, `labels`, `data`, `classifications`,
    /// `predictions`, or `items`. Markdown code fences are stripped first.
    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let body = strip_code_fence(raw);
        if body.is_empty() {
            return ParsedResponse::Malformed("empty response".to_string());
        }

        let items = match serde_json::from_str::<Envelope>(body) {
            Ok(Envelope::List(items)) => items,
            Ok(Envelope::Wrapped(wrapped)) => wrapped.output,
            Err(e) => return ParsedResponse::Malformed(e.to_string()),
        };

        let mut labels = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let confidence = match item.confidence {
                Confidence::Number(value) => value,
                Confidence::Text(text) => match text.trim().parse::<f64>() {
                    Ok(value) => value,
                    Err(_) => {
                        return ParsedResponse::Malformed(format!(
                            "item {} confidence '{}' is not a number",
                            i, text
                        ))
                    }
                },
            };
            if !confidence.is_finite() {
                return ParsedResponse::Malformed(format!(
                    "item {} confidence is not finite",
                    i
                ));
            }
            labels.push(RawLabel {
                label: item.label,
                confidence,
            });
        }

        ParsedResponse::Parsed(labels)
    }

    /// Parse and validate a raw response
    pub fn validate(&self, raw: &str) -> Validation {
        match self.parse(raw) {
            ParsedResponse::Parsed(items) => self.check(&items),
            ParsedResponse::Malformed(reason) => Validation {
                success: false,
                labels: Vec::new(),
                warnings: vec![format!("malformed response: {}", reason)],
            },
        }
    }

    /// Match parsed items against the taxonomy and flag quality issues
    pub fn check(&self, items: &[RawLabel]) -> Validation {
        let mut labels: Vec<LabelScore> = Vec::with_capacity(items.len());
        let mut warnings = Vec::new();
        let mut seen = HashSet::new();

        for item in items {
            let Some(label) = Label::parse(&item.label) else {
                warnings.push(format!("label outside taxonomy dropped: '{}'", item.label));
                continue;
            };

            if !seen.insert(label) {
                warnings.push(format!("duplicate label ignored: {}", label));
                continue;
            }

            let clamped = item.confidence.clamp(0.0, 1.0);
            if clamped != item.confidence {
                warnings.push(format!(
                    "confidence for {} clamped from {} to {}",
                    label, item.confidence, clamped
                ));
            }

            labels.push(LabelScore::new(label, clamped as f32));
        }

        if labels.is_empty() {
            warnings.push("no labels predicted".to_string());
        }

        for score in &labels {
            if score.confidence < self.confidence_threshold {
                warnings.push(format!(
                    "low confidence: {} ({:.2})",
                    score.label, score.confidence
                ));
            }
        }

        if labels.len() > self.max_labels {
            warnings.push(format!("too many labels predicted: {}", labels.len()));
        }

        Validation {
            success: true,
            labels,
            warnings,
        }
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.strip_prefix("json").unwrap_or(rest);
        body = body.strip_suffix("```").unwrap_or(body);
    }
    body.trim()
}

// =============================================================================
// Response schema
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    List(Vec<RawItem>),
    Wrapped(Wrapped),
}

#[derive(Debug, Deserialize)]
struct Wrapped {
    #[serde(
        alias = "result",
        alias = "labels",
        alias = "data",
        alias = "classifications",
        alias = "predictions",
        alias = "items"
    )]
    output: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(alias = "name")]
    label: String,
    confidence: Confidence,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Confidence {
    Number(f64),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn validator() -> ResponseValidator {
        ResponseValidator::new(0.7, 4)
    }

    #[test]
    fn test_bare_array() {
        let v = validator().validate(
            r#"[{"label": "Môi trường", "confidence": 0.95}, {"label": "Tài nguyên nước", "confidence": 0.9}]"#,
        );
        assert!(v.success);
        assert_eq!(
            v.labels,
            vec![
                LabelScore::new(Label::Environment, 0.95),
                LabelScore::new(Label::WaterResources, 0.9),
            ]
        );
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn test_wrapped_envelopes() {
        for key in [
            "output",
            "result",
            "labels",
            "data",
            "classifications",
            "predictions",
            "items",
        ] {
            let raw = format!(
                r#"{{"{}": [{{"label": "Đất đai", "confidence": 0.92}}]}}"#,
                key
            );
            let v = validator().validate(&raw);
            assert!(v.success, "envelope key {}", key);
            assert_eq!(v.labels, vec![LabelScore::new(Label::Land, 0.92)]);
        }
    }

    #[test]
    fn test_code_fence_and_aliases() {
        let raw = "```json\n[{\"name\": \"Viễn thám\", \"confidence\": \"0.98\"}]\n```";
        let v = validator().validate(raw);
        assert!(v.success);
        assert_eq!(v.labels, vec![LabelScore::new(Label::RemoteSensing, 0.98)]);
    }

    #[test]
    fn test_malformed_responses() {
        for raw in [
            "",
            "Tôi nghĩ bài này thuộc Môi trường",
            r#"{"answer": "Môi trường"}"#,
            r#"[{"label": "Môi trường"}]"#,
            r#"[{"label": "Môi trường", "confidence": "high"}]"#,
            r#""Môi trường""#,
        ] {
            let v = validator().validate(raw);
            assert!(!v.success, "accepted {:?}", raw);
            assert!(v.labels.is_empty());
            assert_eq!(v.warnings.len(), 1);
            assert!(v.warnings[0].starts_with("malformed response"));
        }
    }

    #[test]
    fn test_unknown_label_dropped_with_one_warning() {
        let v = validator().validate(
            r#"[{"label": "Thể thao", "confidence": 0.9}, {"label": "Môi trường", "confidence": 0.8}]"#,
        );
        assert!(v.success);
        assert_eq!(v.labels, vec![LabelScore::new(Label::Environment, 0.8)]);
        assert_eq!(
            v.warnings,
            vec!["label outside taxonomy dropped: 'Thể thao'".to_string()]
        );
    }

    #[test]
    fn test_normalized_label_returns_canonical_name() {
        let v = validator().validate(r#"[{"label": "biển-hải đảo", "confidence": 0.9}]"#);
        assert_eq!(v.labels[0].label.name(), "Biển - hải đảo");
        assert!(v.warnings.is_empty());
    }

    #[test]
    fn test_low_confidence_kept_and_flagged() {
        let v = validator().validate(r#"[{"label": "Khác", "confidence": 0.6}]"#);
        assert!(v.success);
        assert_eq!(v.labels, vec![LabelScore::new(Label::Other, 0.6)]);
        assert_eq!(v.warnings, vec!["low confidence: Khác (0.60)".to_string()]);
    }

    #[test]
    fn test_confidence_clamped() {
        let v = validator().validate(
            r#"[{"label": "Đất đai", "confidence": 1.4}, {"label": "Viễn thám", "confidence": -0.2}]"#,
        );
        assert_eq!(v.labels[0].confidence, 1.0);
        assert_eq!(v.labels[1].confidence, 0.0);
        assert_eq!(v.warnings.iter().filter(|w| w.contains("clamped")).count(), 2);
        assert!(v.warnings.iter().any(|w| w.starts_with("low confidence: Viễn thám")));
    }

    #[test]
    fn test_empty_result_is_success_with_warning() {
        let v = validator().validate("[]");
        assert!(v.success);
        assert!(v.labels.is_empty());
        assert_eq!(v.warnings, vec!["no labels predicted".to_string()]);

        let v = validator().validate(r#"[{"label": "Kinh tế", "confidence": 0.9}]"#);
        assert!(v.success);
        assert!(v.labels.is_empty());
        assert_eq!(v.warnings.len(), 2);
    }

    #[test]
    fn test_duplicates_and_too_many() {
        let raw = r#"[
            {"label": "Môi trường", "confidence": 0.9},
            {"label": "môi trường", "confidence": 0.8},
            {"label": "Đất đai", "confidence": 0.9},
            {"label": "Viễn thám", "confidence": 0.9},
            {"label": "Tài nguyên nước", "confidence": 0.9},
            {"label": "Đa dạng sinh học", "confidence": 0.9}
        ]"#;
        let v = validator().validate(raw);
        assert_eq!(v.labels.len(), 5);
        assert_eq!(v.labels[0].confidence, 0.9);
        assert!(v.warnings.contains(&"duplicate label ignored: Môi trường".to_string()));
        assert!(v.warnings.contains(&"too many labels predicted: 5".to_string()));
    }

    fn raw_item() -> impl Strategy<Value = String> {
        let names = prop_oneof![
            (0usize..12).prop_map(|i| Label::ALL[i].name().to_string()),
            "[a-zA-Zà-ỹ ]{0,12}",
        ];
        (names, -0.5f64..1.5).prop_map(|(name, conf)| {
            serde_json::json!({"label": name, "confidence": conf}).to_string()
        })
    }

    proptest! {
        #[test]
        fn prop_validation_is_idempotent(items in prop::collection::vec(raw_item(), 0..8)) {
            let raw = format!("[{}]", items.join(","));
            let validator = validator();
            prop_assert_eq!(validator.validate(&raw), validator.validate(&raw));
        }

        #[test]
        fn prop_labels_always_in_unit_range(items in prop::collection::vec(raw_item(), 0..8)) {
            let raw = format!("[{}]", items.join(","));
            let v = validator().validate(&raw);
            prop_assert!(v.success);
            for score in v.labels {
                prop_assert!((0.0..=1.0).contains(&score.confidence));
            }
        }

        #[test]
        fn prop_arbitrary_text_never_panics(raw in "\\PC{0,64}") {
            let _ = validator().validate(&raw);
        }
    }
}
