//! Stub scorer: serves the `/coordinates` contract for local runs.
//!
//! It does not compare poses. It normalizes the incoming model coordinates
//! into the unit cube, keeps the first 33 joints for the diagnostic field and
//! answers with a fixed similarity from `stub_scorer.toml`.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use pose_match::config::LogConfig;
use pose_match::logging;
use pose_match::scoring::protocol::SCORE_PATH;
use pose_match::scoring::{ScoreRequestBody, ScoreResponseBody};

const CONFIG_PATH: &str = "stub_scorer.toml";

/// Number of landmarks the pose estimator reports; extra rig joints are cut off.
const LANDMARK_COUNT: usize = 33;

// ---------------------------------------------------------------------------
// Config (inline, reads stub_scorer.toml)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    #[serde(default = "default_similarity")]
    similarity: f64,
    #[serde(default)]
    log: LogConfig,
}

fn default_listen_addr() -> String { "127.0.0.1:5000".to_string() }
fn default_similarity() -> f64 { 95.0 }

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            similarity: default_similarity(),
            log: LogConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinate helpers
// ---------------------------------------------------------------------------

/// Min-max normalize each axis to [0,1]; a flat axis maps to 0.5.
fn normalize(coords: &[[f32; 3]]) -> Vec<[f32; 3]> {
    if coords.is_empty() {
        return Vec::new();
    }
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for c in coords {
        for axis in 0..3 {
            min[axis] = min[axis].min(c[axis]);
            max[axis] = max[axis].max(c[axis]);
        }
    }
    coords
        .iter()
        .map(|c| {
            let mut out = [0.5; 3];
            for axis in 0..3 {
                let span = max[axis] - min[axis];
                if span != 0.0 {
                    out[axis] = (c[axis] - min[axis]) / span;
                }
            }
            out
        })
        .collect()
}

fn filter_model(coords: Vec<[f32; 3]>) -> Vec<[f32; 3]> {
    coords.into_iter().take(LANDMARK_COUNT).collect()
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

async fn score(
    State(config): State<Arc<Config>>,
    Json(body): Json<ScoreRequestBody>,
) -> Result<Json<ScoreResponseBody>, (StatusCode, Json<Value>)> {
    if !body.image.starts_with("data:image/") {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "image must be a data URI" })),
        ));
    }

    let filtered = filter_model(normalize(body.model_coordinates.as_slice()));
    debug!(
        joints = body.model_coordinates.len(),
        image_bytes = body.image.len(),
        "score request"
    );

    Ok(Json(ScoreResponseBody {
        similarity: json!(config.similarity),
        filtered_model_coordinates: Some(json!(filtered)),
        filtered_video_coordinates: Some(json!([])),
    }))
}

fn router(config: Arc<Config>) -> Router {
    Router::new().route(SCORE_PATH, post(score)).with_state(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::fs::read_to_string(CONFIG_PATH) {
        Ok(s) => toml::from_str(&s).with_context(|| format!("failed to parse {CONFIG_PATH}"))?,
        Err(_) => Config::default(),
    };
    let log_path = logging::init(&config.log, "stub_scorer")?;
    info!("Stub Scorer ({})", env!("GIT_VERSION"));
    info!("Log: {}", log_path.display());
    info!("[config] listen={} similarity={}", config.listen_addr, config.similarity);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(Arc::new(config))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_cube() {
        let out = normalize(&[[0.0, 2.0, 1.0], [4.0, 0.0, 1.0], [2.0, 1.0, 1.0]]);
        assert_eq!(out[0], [0.0, 1.0, 0.5]);
        assert_eq!(out[1], [1.0, 0.0, 0.5]);
        assert_eq!(out[2], [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_normalize_empty() {
        assert!(normalize(&[]).is_empty());
    }

    #[test]
    fn test_filter_model_keeps_first_landmarks() {
        let coords: Vec<[f32; 3]> = (0..40).map(|i| [i as f32, 0.0, 0.0]).collect();
        let filtered = filter_model(coords);
        assert_eq!(filtered.len(), LANDMARK_COUNT);
        assert_eq!(filtered[32], [32.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_served_response_is_accepted_by_client_parser() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = Arc::new(Config {
            similarity: 150.0,
            ..Config::default()
        });
        tokio::spawn(async move {
            axum::serve(listener, router(config)).await.ok();
        });

        let body = json!({
            "image": "data:image/jpeg;base64,anBlZw==",
            "modelCoordinates": [[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]],
        });
        let response = reqwest::Client::new()
            .post(format!("http://{addr}{SCORE_PATH}"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = response.bytes().await.unwrap();
        let parsed = pose_match::scoring::ScoreResponse::from_slice(&bytes).unwrap();
        assert_eq!(parsed.similarity, 100.0);
        assert_eq!(
            parsed.filtered_model_coordinates,
            Some(json!([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]))
        );
    }
}
