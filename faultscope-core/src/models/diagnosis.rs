use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnosis as produced by the generator, before decomposition.
///
/// The generator's JSON is not schema-checked upstream, so every field is
/// accepted as an arbitrary JSON value and coerced to text on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDiagnosis {
    #[serde(default)]
    pub summary: serde_json::Value,
    #[serde(default)]
    pub evidence: serde_json::Value,
    #[serde(default)]
    pub root_cause: serde_json::Value,
    #[serde(default)]
    pub actions: serde_json::Value,
    #[serde(default)]
    pub confidence: serde_json::Value,
}

impl RawDiagnosis {
    /// Convenience constructor for string-valued diagnoses.
    pub fn from_text(
        summary: &str,
        evidence: &str,
        root_cause: &str,
        actions: &str,
        confidence: &str,
    ) -> Self {
        Self {
            summary: summary.into(),
            evidence: evidence.into(),
            root_cause: root_cause.into(),
            actions: actions.into(),
            confidence: confidence.into(),
        }
    }
}

/// Render a loosely-typed field as text.
///
/// Strings pass through, arrays become one line per element, null is empty.
pub fn coerce_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(coerce_text)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceBand::High => "High",
            ConfidenceBand::Medium => "Medium",
            ConfidenceBand::Low => "Low",
        }
    }

    /// Case-insensitive band lookup.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "high" => Some(ConfidenceBand::High),
            "medium" => Some(ConfidenceBand::Medium),
            "low" => Some(ConfidenceBand::Low),
            _ => None,
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub band: ConfidenceBand,
    /// Empty when the generator gave no explanation.
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStep {
    /// 1-based position in the decomposed list
    pub order: usize,
    pub text: String,
}

/// UI-ready diagnosis. Built only by [`crate::parser::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredResult {
    pub summary: String,
    pub evidence: String,
    pub root_cause: String,
    pub actions: Vec<ActionStep>,
    pub confidence: ConfidenceAssessment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_text_shapes() {
        assert_eq!(coerce_text(&json!(null)), "");
        assert_eq!(coerce_text(&json!("Reset breaker")), "Reset breaker");
        assert_eq!(coerce_text(&json!(["Step one", "Step two"])), "Step one\nStep two");
        assert_eq!(coerce_text(&json!(0.8)), "0.8");
    }

    #[test]
    fn test_raw_diagnosis_tolerates_missing_fields() {
        let raw: RawDiagnosis = serde_json::from_value(json!({ "summary": "Pump stalled" })).unwrap();
        assert_eq!(coerce_text(&raw.summary), "Pump stalled");
        assert!(raw.actions.is_null());
    }

    #[test]
    fn test_band_tokens_case_insensitive() {
        assert_eq!(ConfidenceBand::from_token("HIGH"), Some(ConfidenceBand::High));
        assert_eq!(ConfidenceBand::from_token("low"), Some(ConfidenceBand::Low));
        assert_eq!(ConfidenceBand::from_token("certain"), None);
    }
}
