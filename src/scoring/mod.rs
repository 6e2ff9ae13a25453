pub mod client;
pub mod protocol;

pub use client::{Scorer, ScoringClient};
pub use protocol::{clamp_similarity, ScoreRequest, ScoreRequestBody, ScoreResponse, ScoreResponseBody};
