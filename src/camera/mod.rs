#[cfg(feature = "desktop")]
pub mod capture;
pub mod sampler;

#[cfg(feature = "desktop")]
pub use capture::OpenCvCamera;
pub use sampler::{FrameSampler, FrameSnapshot};

use bytes::Bytes;
use std::path::PathBuf;

use crate::error::CameraError;

/// JPEGエンコード済みのフレーム
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub jpeg_data: Bytes,
}

/// 許可されたカメラストリーム。最新フレームを何度でも取得できる
pub trait FrameStream: Send {
    /// 初回フレーム到着前は None
    fn latest_frame(&self) -> Option<Frame>;
}

/// カメラデバイス。ストリーム取得はブロッキングしてよい（別スレッドで呼ばれる）
pub trait Camera: Send + 'static {
    fn request_stream(self: Box<Self>) -> Result<Box<dyn FrameStream>, CameraError>;
}

/// 静止画JPEGをライブフレームとして返すカメラ
pub struct StillImageCamera {
    path: PathBuf,
    width: u32,
    height: u32,
}

impl StillImageCamera {
    pub fn new<P: Into<PathBuf>>(path: P, width: u32, height: u32) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }
}

impl Camera for StillImageCamera {
    fn request_stream(self: Box<Self>) -> Result<Box<dyn FrameStream>, CameraError> {
        let data = std::fs::read(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            _ => CameraError::DeviceUnavailable(format!("{}: {e}", self.path.display())),
        })?;
        Ok(Box::new(StillStream {
            frame: Frame {
                width: self.width,
                height: self.height,
                jpeg_data: Bytes::from(data),
            },
        }))
    }
}

struct StillStream {
    frame: Frame,
}

impl FrameStream for StillStream {
    fn latest_frame(&self) -> Option<Frame> {
        Some(self.frame.clone())
    }
}
