use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::joints::JointSpace;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScorerConfig {
    /// スコアリングサーバーのベースURL
    #[serde(default = "default_scorer_url")]
    pub url: String,
    /// リクエスト全体のタイムアウト（ミリ秒）。未指定ならサンプリング間隔と同じ
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// 接続タイムアウト（ミリ秒）
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_scorer_url() -> String { "http://localhost:5000".to_string() }
fn default_connect_timeout_ms() -> u64 { 500 }

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            url: default_scorer_url(),
            timeout_ms: None,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    /// サンプリング間隔（ミリ秒）
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_interval_ms() -> u64 { 1000 }

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { interval_ms: default_interval_ms() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,
}

fn default_target_fps() -> u32 { 60 }

impl Default for RenderConfig {
    fn default() -> Self {
        Self { target_fps: default_target_fps() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnimationConfig {
    /// 再生速度係数
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// 送信する関節座標の空間
    #[serde(default)]
    pub joint_space: JointSpace,
    /// クリップJSONのパス。未指定なら内蔵のデモクリップ
    #[serde(default)]
    pub clip: Option<String>,
}

fn default_speed() -> f32 { 0.2 }

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            joint_space: JointSpace::default(),
            clip: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
    /// 静止画JPEGをカメラ代わりに使う
    #[serde(default)]
    pub still_image: Option<String>,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_jpeg_quality() -> i32 { 80 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_width(),
            height: default_height(),
            jpeg_quality: default_jpeg_quality(),
            still_image: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    /// ヘルスバー表示値の追従時定数（秒）
    #[serde(default = "default_transition_secs")]
    pub transition_secs: f32,
    /// 連続失敗がこの回数に達したら接続断とみなす
    #[serde(default = "default_lost_after")]
    pub lost_after: u32,
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
}

fn default_transition_secs() -> f32 { 0.5 }
fn default_lost_after() -> u32 { 5 }
fn default_bar_width() -> usize { 40 }

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            transition_secs: default_transition_secs(),
            lost_after: default_lost_after(),
            bar_width: default_bar_width(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_dir() -> String { "logs".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            verbose: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// 読み込めなければデフォルト設定を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("config: {e:#}, using defaults");
                Self::default()
            }
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling.interval_ms.max(1))
    }

    /// 1リクエストの上限時間。ハングしたリクエストが後続のtickを止め続けないように
    pub fn request_timeout(&self) -> Duration {
        match self.scorer.timeout_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => self.sampling_interval(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.scorer.connect_timeout_ms)
    }

    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.render.target_fps.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.scorer.url, "http://localhost:5000");
        assert_eq!(config.sampling.interval_ms, 1000);
        assert_eq!(config.render.target_fps, 60);
        assert_eq!(config.animation.speed, 0.2);
        assert_eq!(config.animation.joint_space, JointSpace::Local);
        assert_eq!(config.feedback.lost_after, 5);
    }

    #[test]
    fn test_request_timeout_defaults_to_interval() {
        let config: Config = toml::from_str("[sampling]\ninterval_ms = 750\n").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_millis(750));
    }

    #[test]
    fn test_explicit_timeout() {
        let src = r#"
            [scorer]
            url = "http://scorer:8080"
            timeout_ms = 300

            [animation]
            joint_space = "world"
        "#;
        let config: Config = toml::from_str(src).unwrap();
        assert_eq!(config.scorer.url, "http://scorer:8080");
        assert_eq!(config.request_timeout(), Duration::from_millis(300));
        assert_eq!(config.animation.joint_space, JointSpace::World);
    }

    #[test]
    fn test_frame_period() {
        let config: Config = toml::from_str("[render]\ntarget_fps = 50\n").unwrap();
        assert_eq!(config.frame_period(), Duration::from_millis(20));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.sampling.interval_ms, 1000);
    }
}
