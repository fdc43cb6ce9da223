//! Core types for newslabel

use serde::{Deserialize, Serialize};

use crate::taxonomy::Label;

/// One dataset row to classify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Zero-based row index in the dataset
    pub index: usize,

    /// Article title
    pub title: String,

    /// Short description / lede
    pub description: String,

    /// Article body
    pub content: String,
}

impl Record {
    /// Create a new record
    pub fn new(
        index: usize,
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            index,
            title: title.into(),
            description: description.into(),
            content: content.into(),
        }
    }

    /// Whether every text field is blank
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty()
            && self.description.trim().is_empty()
            && self.content.trim().is_empty()
    }
}

/// A validated label with its confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: Label,
    pub confidence: f32,
}

impl LabelScore {
    pub fn new(label: Label, confidence: f32) -> Self {
        Self { label, confidence }
    }
}

/// Token counts for one completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

/// The stored result of attempting to classify one record
///
/// Built once per record and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    /// Record index
    pub index: usize,

    /// Whether a well-formed response was obtained
    pub success: bool,

    /// Validated labels, in response order
    pub labels: Vec<LabelScore>,

    /// Model that produced the final attempt
    pub model_used: String,

    /// Cost of every billed attempt for this record, in USD
    pub cost: f64,

    /// Token usage summed across billed attempts
    pub usage: TokenUsage,

    /// Number of service calls made
    pub attempts: u32,

    /// Whether the fallback model was used
    pub used_fallback: bool,

    /// Quality issues and recorded errors
    pub warnings: Vec<String>,

    /// Terminal error, for failed outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClassificationOutcome {
    /// Outcome for a record that could not be classified
    pub fn failed(index: usize, model_used: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            index,
            success: false,
            labels: Vec::new(),
            model_used: model_used.into(),
            cost: 0.0,
            usage: TokenUsage::default(),
            attempts: 0,
            used_fallback: false,
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Highest label confidence, or 0 when there are no labels
    pub fn max_confidence(&self) -> f32 {
        self.labels
            .iter()
            .map(|score| score.confidence)
            .fold(0.0, f32::max)
    }

    /// Label display names in order
    pub fn label_names(&self) -> Vec<&'static str> {
        self.labels.iter().map(|score| score.label.name()).collect()
    }

    /// Whether any warning contains `needle`
    pub fn has_warning(&self, needle: &str) -> bool {
        self.warnings.iter().any(|w| w.contains(needle))
    }
}

/// A chat message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,

    /// Optional name of the sender
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    /// Create a new chat message
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            name: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_blank() {
        assert!(Record::new(0, " ", "", "\n").is_blank());
        assert!(!Record::new(0, "Tiêu đề", "", "").is_blank());
    }

    #[test]
    fn test_failed_outcome() {
        let outcome = ClassificationOutcome::failed(7, "gpt-4o-mini", "timeout");
        assert!(!outcome.success);
        assert!(outcome.labels.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("timeout"));
        assert_eq!(outcome.max_confidence(), 0.0);
    }

    #[test]
    fn test_outcome_json_shape() {
        let mut outcome = ClassificationOutcome::failed(1, "primary", "x");
        outcome.success = true;
        outcome.error = None;
        outcome.labels = vec![
            LabelScore::new(Label::Environment, 0.9),
            LabelScore::new(Label::WaterResources, 0.6),
        ];

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["labels"][0]["label"], "Môi trường");
        assert!(json.get("error").is_none());
        assert_eq!(outcome.label_names(), vec!["Môi trường", "Tài nguyên nước"]);
        assert!((outcome.max_confidence() - 0.9).abs() < f32::EPSILON);

        let back: ClassificationOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_usage_sum_saturates() {
        let sum = TokenUsage::new(500, 100) + TokenUsage::new(20, 5);
        assert_eq!(sum, TokenUsage::new(520, 105));
        assert_eq!(
            (TokenUsage::new(u32::MAX, 1) + TokenUsage::new(1, 1)).input_tokens,
            u32::MAX
        );
    }

    #[test]
    fn test_chat_message_roles() {
        assert_eq!(ChatMessage::system("x").role, "system");
        assert_eq!(ChatMessage::user("x").role, "user");
    }
}
