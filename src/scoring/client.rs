use std::future::Future;
use std::time::Duration;

use super::protocol::{ScoreRequest, ScoreResponse, SCORE_PATH};
use crate::error::{PipelineError, PipelineResult};

/// スコアリングの呼び出し口。セッションはこれを通してのみリクエストを送る
pub trait Scorer: Clone + Send + Sync + 'static {
    fn score(&self, request: ScoreRequest) -> impl Future<Output = PipelineResult<ScoreResponse>> + Send;
}

/// HTTPスコアリングクライアント。リトライはしない
#[derive(Debug, Clone)]
pub struct ScoringClient {
    http: reqwest::Client,
    endpoint: String,
}

impl ScoringClient {
    pub fn new(base_url: &str, timeout: Duration, connect_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), SCORE_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Scorer for ScoringClient {
    fn score(&self, request: ScoreRequest) -> impl Future<Output = PipelineResult<ScoreResponse>> + Send {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        async move {
            let body = request.to_body();
            let response = http
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .map_err(network_error)?;

            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::Network(format!("scorer returned {status}")));
            }

            let bytes = response.bytes().await.map_err(network_error)?;
            ScoreResponse::from_slice(&bytes)
        }
    }
}

fn network_error(e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Network("request timed out".to_string())
    } else if e.is_decode() {
        PipelineError::Protocol(e.to_string())
    } else {
        PipelineError::Network(e.to_string())
    }
}
