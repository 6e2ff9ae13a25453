//! HTTP JSON contract with the remote scorer.
//!
//! Self-contained apart from `JointSet` and `FrameSnapshot`, so the stub
//! scorer binary can reuse the same wire types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::camera::FrameSnapshot;
use crate::error::{PipelineError, PipelineResult};
use crate::joints::JointSet;

pub const SCORE_PATH: &str = "/coordinates";

pub const SIMILARITY_MIN: f32 = 0.0;
pub const SIMILARITY_MAX: f32 = 100.0;

/// One frame paired with the joint set that was latest when the request was built.
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub frame: FrameSnapshot,
    pub joints: Arc<JointSet>,
}

impl ScoreRequest {
    pub fn new(frame: FrameSnapshot, joints: Arc<JointSet>) -> Self {
        Self { frame, joints }
    }

    pub fn to_body(&self) -> ScoreRequestBody {
        ScoreRequestBody {
            image: self.frame.to_data_uri(),
            model_coordinates: JointSet::clone(&self.joints),
        }
    }
}

/// `POST /coordinates` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequestBody {
    /// data URI (JPEG)
    pub image: String,
    #[serde(rename = "modelCoordinates", default)]
    pub model_coordinates: JointSet,
}

/// Response body as the scorer writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreResponseBody {
    pub similarity: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_model_coordinates: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_video_coordinates: Option<Value>,
}

/// Validated response. The diagnostic fields are informational only.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResponse {
    pub similarity: f32,
    pub filtered_model_coordinates: Option<Value>,
    pub filtered_video_coordinates: Option<Value>,
}

impl ScoreResponse {
    pub fn from_slice(body: &[u8]) -> PipelineResult<Self> {
        let raw: ScoreResponseBody = serde_json::from_slice(body)
            .map_err(|e| PipelineError::Protocol(format!("malformed response: {e}")))?;
        Self::from_body(raw)
    }

    pub fn from_body(raw: ScoreResponseBody) -> PipelineResult<Self> {
        let similarity = match &raw.similarity {
            Value::Number(n) => n
                .as_f64()
                .filter(|v| v.is_finite())
                .ok_or_else(|| PipelineError::Protocol(format!("similarity {n} is not finite")))?,
            other => {
                return Err(PipelineError::Protocol(format!(
                    "similarity is not a number: {other}"
                )))
            }
        };
        Ok(Self {
            similarity: clamp_similarity(similarity as f32),
            filtered_model_coordinates: raw.filtered_model_coordinates,
            filtered_video_coordinates: raw.filtered_video_coordinates,
        })
    }
}

pub fn clamp_similarity(value: f32) -> f32 {
    value.clamp(SIMILARITY_MIN, SIMILARITY_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::time::Instant;

    fn parse(json: &str) -> PipelineResult<ScoreResponse> {
        ScoreResponse::from_slice(json.as_bytes())
    }

    #[test]
    fn test_parse_in_range() {
        let r = parse(r#"{"similarity": 82.4}"#).unwrap();
        assert!((r.similarity - 82.4).abs() < 1e-4);
        assert!(r.filtered_model_coordinates.is_none());
    }

    #[test]
    fn test_parse_clamps() {
        assert_eq!(parse(r#"{"similarity": 150}"#).unwrap().similarity, 100.0);
        assert_eq!(parse(r#"{"similarity": -5}"#).unwrap().similarity, 0.0);
    }

    #[test]
    fn test_parse_keeps_diagnostics() {
        let r = parse(
            r#"{"similarity": 95, "filtered_model_coordinates": [[0.5, 0.5, 0.5]], "filtered_video_coordinates": []}"#,
        )
        .unwrap();
        assert_eq!(r.similarity, 95.0);
        assert!(r.filtered_model_coordinates.is_some());
        assert!(r.filtered_video_coordinates.is_some());
    }

    #[test]
    fn test_non_numeric_is_protocol_error() {
        for body in [r#"{"similarity": "high"}"#, r#"{"similarity": null}"#, r#"{}"#, "not json", "[]"] {
            match parse(body) {
                Err(PipelineError::Protocol(_)) => {}
                other => panic!("{body}: expected protocol error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_request_body_shape() {
        let request = ScoreRequest::new(
            FrameSnapshot {
                width: 2,
                height: 2,
                jpeg_data: Bytes::from_static(b"jpeg"),
                captured_at: Instant::now(),
            },
            Arc::new(JointSet::new(vec![[1.0, 2.0, 3.0]])),
        );
        let json = serde_json::to_value(request.to_body()).unwrap();
        assert_eq!(json["image"], "data:image/jpeg;base64,anBlZw==");
        assert_eq!(json["modelCoordinates"], serde_json::json!([[1.0, 2.0, 3.0]]));
    }

    #[test]
    fn test_empty_joint_set_still_serialized() {
        let body = ScoreRequestBody {
            image: "data:image/jpeg;base64,".to_string(),
            model_coordinates: JointSet::default(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""modelCoordinates":[]"#));
    }
}
