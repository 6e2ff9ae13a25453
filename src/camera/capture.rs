use bytes::Bytes;
use opencv::{
    core::{Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{Camera, Frame, FrameStream};
use crate::error::CameraError;

/// OpenCVカメラ。ストリーム取得時にデバイスを開き、別スレッドでキャプチャ+JPEG化する
pub struct OpenCvCamera {
    index: i32,
    width: u32,
    height: u32,
    jpeg_quality: i32,
}

impl OpenCvCamera {
    pub fn new(index: i32, width: u32, height: u32, jpeg_quality: i32) -> Self {
        Self {
            index,
            width,
            height,
            jpeg_quality,
        }
    }

    fn open(&self) -> opencv::Result<VideoCapture> {
        let mut capture = VideoCapture::new(self.index, VideoCaptureAPIs::CAP_ANY as i32)?;
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, self.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, self.height as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
        Ok(capture)
    }
}

impl Camera for OpenCvCamera {
    fn request_stream(self: Box<Self>) -> Result<Box<dyn FrameStream>, CameraError> {
        let mut capture = self
            .open()
            .map_err(|e| CameraError::DeviceUnavailable(format!("camera {}: {e}", self.index)))?;
        let opened = capture
            .is_opened()
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
        if !opened {
            return Err(CameraError::DeviceUnavailable(format!(
                "camera {} is not opened",
                self.index
            )));
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(self.width as f64) as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(self.height as f64) as u32;
        tracing::info!(index = self.index, width, height, "camera opened");

        let latest: Arc<Mutex<Option<Frame>>> = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));
        let frame_ref = Arc::clone(&latest);
        let running_ref = Arc::clone(&running);
        let index = self.index;
        let quality = self.jpeg_quality;

        thread::spawn(move || {
            let target_interval = Duration::from_millis(33); // ~30fps
            while running_ref.load(Ordering::Relaxed) {
                let start = Instant::now();
                let mut mat = Mat::default();
                match capture.read(&mut mat) {
                    Ok(true) if !mat.empty() => match jpeg_encode(&mat, quality) {
                        Ok(data) => {
                            let frame = Frame {
                                width,
                                height,
                                jpeg_data: Bytes::from(data),
                            };
                            if let Ok(mut lock) = frame_ref.lock() {
                                *lock = Some(frame);
                            }
                        }
                        Err(e) => tracing::warn!(index, "jpeg encode failed: {e}"),
                    },
                    Ok(_) => thread::sleep(Duration::from_millis(5)),
                    Err(e) => {
                        tracing::warn!(index, "camera read error: {e}");
                        thread::sleep(Duration::from_millis(100));
                    }
                }
                let elapsed = start.elapsed();
                if elapsed < target_interval {
                    thread::sleep(target_interval - elapsed);
                }
            }
            tracing::debug!(index, "camera thread stopped");
        });

        Ok(Box::new(ThreadedStream { latest, running }))
    }
}

struct ThreadedStream {
    latest: Arc<Mutex<Option<Frame>>>,
    running: Arc<AtomicBool>,
}

impl FrameStream for ThreadedStream {
    fn latest_frame(&self) -> Option<Frame> {
        self.latest.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Drop for ThreadedStream {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn jpeg_encode(frame: &Mat, quality: i32) -> opencv::Result<Vec<u8>> {
    let params = Vector::from_iter([imgcodecs::IMWRITE_JPEG_QUALITY, quality]);
    let mut buf: Vector<u8> = Vector::new();

    // imencode は BGR 8UC3 を期待する
    let mat = if frame.channels() == 4 {
        let mut bgr = Mat::default();
        imgproc::cvt_color_def(frame, &mut bgr, imgproc::COLOR_BGRA2BGR)?;
        bgr
    } else {
        frame.clone()
    };

    imgcodecs::imencode(".jpg", &mat, &mut buf, &params)?;
    Ok(buf.to_vec())
}
