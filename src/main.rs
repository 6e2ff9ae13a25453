use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pose_match::animation::{demo_clip, Clip, ClipPlayer};
use pose_match::camera::{Camera, StillImageCamera};
use pose_match::config::Config;
use pose_match::feedback::HealthBar;
use pose_match::logging;
use pose_match::scoring::ScoringClient;
use pose_match::sync::{Session, SessionSettings};

const CONFIG_PATH: &str = "config.toml";

fn build_camera(config: &Config) -> Result<Box<dyn Camera>> {
    let cam = &config.camera;
    if let Some(path) = &cam.still_image {
        info!("camera: still image {}", path);
        return Ok(Box::new(StillImageCamera::new(path, cam.width, cam.height)));
    }

    #[cfg(feature = "desktop")]
    {
        info!("camera: opencv index {}", cam.index);
        Ok(Box::new(pose_match::camera::OpenCvCamera::new(
            cam.index,
            cam.width,
            cam.height,
            cam.jpeg_quality,
        )))
    }

    #[cfg(not(feature = "desktop"))]
    {
        anyhow::bail!("no camera configured: set camera.still_image or build with --features desktop")
    }
}

fn load_clip(config: &Config) -> Result<Clip> {
    match &config.animation.clip {
        Some(path) => Clip::load(path),
        None => Ok(demo_clip()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let log_path = logging::init(&config.log, "pose_match")?;

    info!("Pose Match ({})", env!("GIT_VERSION"));
    info!("Log: {}", log_path.display());
    info!(
        "[config] scorer={} interval={}ms timeout={}ms fps={} speed={} joints={:?}",
        config.scorer.url,
        config.sampling.interval_ms,
        config.request_timeout().as_millis(),
        config.render.target_fps,
        config.animation.speed,
        config.animation.joint_space,
    );

    let clip = load_clip(&config).context("failed to load animation clip")?;
    let duration = clip.duration;
    let player = ClipPlayer::new(clip, config.animation.speed);
    info!("[animation] {} bones, {:.2}s loop", player.bone_count(), duration);

    let camera = build_camera(&config)?;
    let scorer = ScoringClient::new(&config.scorer.url, config.request_timeout(), config.connect_timeout())
        .context("failed to build scoring client")?;
    info!("[scorer] endpoint {}", scorer.endpoint());

    let session = Session::new(
        player,
        scorer,
        SessionSettings::from_config(&config),
        HealthBar::from_config(&config.feedback),
    );

    // Ctrl-C → stop timers and end the session
    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {e}");
            }
            info!("[input] shutdown requested");
            token.cancel();
        });
    }

    let report = session.run(camera, shutdown).await;

    info!("=== Session summary ===");
    info!("camera: {:?}", report.camera);
    info!("frames rendered: {}", report.frames_rendered);
    info!(
        "requests: sent={} applied={} failed={} dropped_ticks={} skipped_ticks={}",
        report.requests_sent,
        report.responses_applied,
        report.failures,
        report.dropped_ticks,
        report.skipped_ticks,
    );
    info!("final similarity: {:.2}%", report.feedback.similarity());

    Ok(())
}
