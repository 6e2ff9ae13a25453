//! パイプライン内のエラー型

use thiserror::Error;

/// サンプリング〜スコアリング経路のエラー。
/// どれもセッション内で回復され、レンダーループを止めることはない。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// カメラ未初期化、またはまだフレームが届いていない
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// 接続失敗・タイムアウト・非2xxステータス
    #[error("network error: {0}")]
    Network(String),

    /// レスポンスボディが契約に合わない
    #[error("protocol error: {0}")]
    Protocol(String),

    /// スコアリングタスクがパニックした
    #[error("scoring task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn is_capture(&self) -> bool {
        matches!(self, Self::CaptureUnavailable(_))
    }
}

/// カメラ取得時のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
