//! Threat prediction records
//!
//! A prediction is only ever handed out fully validated: the label is one
//! of two values, confidence lies in [0, 100], and every nested key is
//! present. Anything else is a schema violation and the group is dropped.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TriageError};

/// Classification label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prediction {
    Normal,
    Abnormal,
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Abnormal => write!(f, "abnormal"),
        }
    }
}

/// Model rationale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub pattern_type: String,
    pub description: String,
    /// 0-100
    pub confidence: f64,
    pub indicators: Vec<String>,
}

/// Rate figures reported with the prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    pub requests_per_second: f64,
    /// Whole seconds
    pub time_window_seconds: u64,
}

/// Validated classification of one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreatPrediction {
    /// Group key the prediction belongs to (the source address by default)
    pub source: String,
    pub prediction: Prediction,
    pub reasoning: Reasoning,
    pub metrics: PredictionMetrics,
    /// Earliest timestamp of the group
    pub timestamp: DateTime<FixedOffset>,
}

impl ThreatPrediction {
    pub fn is_abnormal(&self) -> bool {
        self.prediction == Prediction::Abnormal
    }
}

/// Shape the model is asked to produce
#[derive(Debug, Deserialize)]
struct PredictionPayload {
    prediction: Prediction,
    reasoning: Reasoning,
    metrics: RawMetrics,
}

#[derive(Debug, Deserialize)]
struct RawMetrics {
    requests_per_second: f64,
    time_window_seconds: f64,
}

/// Validate a decoded reply and stamp it with the group's key and start time
pub fn validate_prediction(
    object: Map<String, Value>,
    source: &str,
    timestamp: DateTime<FixedOffset>,
) -> Result<ThreatPrediction> {
    let payload: PredictionPayload = serde_json::from_value(Value::Object(object))
        .map_err(|e| TriageError::SchemaValidation(e.to_string()))?;

    let confidence = payload.reasoning.confidence;
    if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
        return Err(TriageError::SchemaValidation(format!(
            "confidence {} outside [0, 100]",
            confidence
        )));
    }

    let rps = payload.metrics.requests_per_second;
    if !rps.is_finite() || rps < 0.0 {
        return Err(TriageError::SchemaValidation(format!(
            "requests_per_second {} is not a non-negative number",
            rps
        )));
    }

    let window = payload.metrics.time_window_seconds;
    if !window.is_finite() || window < 0.0 {
        return Err(TriageError::SchemaValidation(format!(
            "time_window_seconds {} is not a non-negative number",
            window
        )));
    }

    Ok(ThreatPrediction {
        source: source.to_string(),
        prediction: payload.prediction,
        reasoning: payload.reasoning,
        metrics: PredictionMetrics {
            requests_per_second: rps,
            time_window_seconds: window.round() as u64,
        },
        timestamp,
    })
}

/// Schema description embedded in the classification prompt
pub const PREDICTION_SCHEMA: &str = r#"{
  "type": "object",
  "required": ["prediction", "reasoning", "metrics"],
  "properties": {
    "prediction": {"type": "string", "enum": ["normal", "abnormal"]},
    "reasoning": {
      "type": "object",
      "required": ["pattern_type", "description", "confidence", "indicators"],
      "properties": {
        "pattern_type": {"type": "string"},
        "description": {"type": "string"},
        "confidence": {"type": "number", "minimum": 0, "maximum": 100},
        "indicators": {"type": "array", "items": {"type": "string"}}
      }
    },
    "metrics": {
      "type": "object",
      "required": ["requests_per_second", "time_window_seconds"],
      "properties": {
        "requests_per_second": {"type": "number"},
        "time_window_seconds": {"type": "integer"}
      }
    }
  }
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::record::parse_timestamp;
    use serde_json::json;

    fn stamp() -> DateTime<FixedOffset> {
        parse_timestamp("2024-12-30 14:00:00 +0000").unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn valid() -> Value {
        json!({
            "prediction": "abnormal",
            "reasoning": {
                "pattern_type": "credential stuffing",
                "description": "Repeated POST /login with 401",
                "confidence": 87,
                "indicators": ["401 burst", "python-requests UA"]
            },
            "metrics": {"requests_per_second": 2.5, "time_window_seconds": 12}
        })
    }

    #[test]
    fn test_valid_prediction() {
        let prediction = validate_prediction(object(valid()), "10.0.0.9", stamp()).unwrap();
        assert!(prediction.is_abnormal());
        assert_eq!(prediction.source, "10.0.0.9");
        assert_eq!(prediction.reasoning.confidence, 87.0);
        assert_eq!(prediction.metrics.time_window_seconds, 12);
        assert_eq!(prediction.timestamp, stamp());
    }

    #[test]
    fn test_unknown_label_rejected() {
        let mut value = valid();
        value["prediction"] = json!("suspicious");
        assert!(matches!(
            validate_prediction(object(value), "x", stamp()),
            Err(TriageError::SchemaValidation(_))
        ));

        let mut value = valid();
        value["prediction"] = json!("Normal");
        assert!(validate_prediction(object(value), "x", stamp()).is_err());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let mut value = valid();
        value["reasoning"]["confidence"] = json!(140);
        assert!(validate_prediction(object(value), "x", stamp()).is_err());

        let mut value = valid();
        value["reasoning"]["confidence"] = json!("high");
        assert!(validate_prediction(object(value), "x", stamp()).is_err());
    }

    #[test]
    fn test_missing_nested_key_rejected() {
        let mut value = valid();
        value["reasoning"].as_object_mut().unwrap().remove("indicators");
        assert!(validate_prediction(object(value), "x", stamp()).is_err());

        let mut value = valid();
        value.as_object_mut().unwrap().remove("metrics");
        assert!(validate_prediction(object(value), "x", stamp()).is_err());
    }

    #[test]
    fn test_fractional_window_rounds() {
        let mut value = valid();
        value["metrics"]["time_window_seconds"] = json!(9.6);
        let prediction = validate_prediction(object(value), "x", stamp()).unwrap();
        assert_eq!(prediction.metrics.time_window_seconds, 10);
    }

    #[test]
    fn test_schema_description_is_json() {
        let schema: Value = serde_json::from_str(PREDICTION_SCHEMA).unwrap();
        assert_eq!(schema["properties"]["prediction"]["enum"][1], "abnormal");
    }
}
