use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use tokio::time::Instant;

use super::FrameStream;
use crate::error::{PipelineError, PipelineResult};

/// 1回のサンプリングで取った静止画。送信後は保持しない
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub width: u32,
    pub height: u32,
    pub jpeg_data: Bytes,
    pub captured_at: Instant,
}

impl FrameSnapshot {
    /// `data:image/jpeg;base64,...` 形式
    pub fn to_data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", STANDARD.encode(&self.jpeg_data))
    }
}

/// カメラストリームから最新フレームを取り出す
#[derive(Default)]
pub struct FrameSampler {
    stream: Option<Box<dyn FrameStream>>,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// カメラ取得完了時に呼ばれる
    pub fn attach(&mut self, stream: Box<dyn FrameStream>) {
        self.stream = Some(stream);
    }

    pub fn capture(&self) -> PipelineResult<FrameSnapshot> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PipelineError::CaptureUnavailable("camera not initialized".to_string()))?;
        let frame = stream
            .latest_frame()
            .ok_or_else(|| PipelineError::CaptureUnavailable("no frame received yet".to_string()))?;
        Ok(FrameSnapshot {
            width: frame.width,
            height: frame.height,
            jpeg_data: frame.jpeg_data,
            captured_at: Instant::now(),
        })
    }
}
