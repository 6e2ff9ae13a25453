//! Session driver: one cooperative task that owns both timers, the camera
//! setup, the in-flight scoring request and every pipeline component.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scheduler::{Completion, RequestTicket, SyncScheduler};
use crate::animation::AnimationSource;
use crate::camera::{Camera, FrameSampler, FrameStream};
use crate::config::Config;
use crate::error::{CameraError, PipelineError, PipelineResult};
use crate::feedback::{FeedbackState, HealthBar};
use crate::joints::{JointCache, JointExtractor, JointSpace};
use crate::scoring::{ScoreRequest, ScoreResponse, Scorer};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub frame_period: Duration,
    pub sample_period: Duration,
    pub request_timeout: Duration,
    pub joint_space: JointSpace,
    /// 0 で無効
    pub lost_after: u32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frame_period: config.frame_period(),
            sample_period: config.sampling_interval(),
            request_timeout: config.request_timeout(),
            joint_space: config.animation.joint_space,
            lost_after: config.feedback.lost_after,
        }
    }
}

/// カメラ取得の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Pending,
    Ready,
    Failed(CameraError),
}

/// セッション終了時の集計。FeedbackState はここに移り、以後更新されない
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub feedback: FeedbackState,
    pub camera: CameraStatus,
    pub frames_rendered: u64,
    pub joint_generations: u64,
    pub requests_sent: u64,
    pub responses_applied: u64,
    pub failures: u64,
    pub dropped_ticks: u64,
    pub skipped_ticks: u64,
}

/// レンダーtickとサンプリングtickのタイマー。セッションと同じ寿命
struct SessionClock {
    render: Interval,
    sampling: Interval,
    last_render: Instant,
}

impl SessionClock {
    fn start(frame_period: Duration, sample_period: Duration) -> Self {
        let mut render = interval(frame_period);
        render.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // 最初のサンプリングは1周期後
        let start = Instant::now();
        let mut sampling = interval_at(start + sample_period, sample_period);
        sampling.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            render,
            sampling,
            last_render: start,
        }
    }

    fn frame_dt(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last_render).as_secs_f32();
        self.last_render = now;
        dt
    }
}

struct InFlight {
    ticket: RequestTicket,
    handle: JoinHandle<PipelineResult<ScoreResponse>>,
}

type CameraSetup = JoinHandle<Result<Box<dyn FrameStream>, CameraError>>;

pub struct Session<A, S> {
    animation: A,
    scorer: S,
    settings: SessionSettings,
    extractor: JointExtractor,
    joints: JointCache,
    sampler: FrameSampler,
    scheduler: SyncScheduler,
    feedback: FeedbackState,
    health: HealthBar,
    camera: CameraStatus,
    frames_rendered: u64,
    responses_applied: u64,
    failures: u64,
    skipped_ticks: u64,
    lost_reported: bool,
}

impl<A, S> Session<A, S>
where
    A: AnimationSource,
    S: Scorer,
{
    pub fn new(animation: A, scorer: S, settings: SessionSettings, health: HealthBar) -> Self {
        Self {
            animation,
            scorer,
            extractor: JointExtractor::new(settings.joint_space),
            settings,
            joints: JointCache::new(),
            sampler: FrameSampler::new(),
            scheduler: SyncScheduler::new(),
            feedback: FeedbackState::new(),
            health,
            camera: CameraStatus::Pending,
            frames_rendered: 0,
            responses_applied: 0,
            failures: 0,
            skipped_ticks: 0,
            lost_reported: false,
        }
    }

    /// shutdown が発火するまで回す。送信中のリクエストは切り離され、結果は捨てられる
    pub async fn run(mut self, camera: Box<dyn Camera>, shutdown: CancellationToken) -> SessionReport {
        let mut camera_setup: Option<CameraSetup> =
            Some(tokio::task::spawn_blocking(move || camera.request_stream()));
        let mut clock = SessionClock::start(self.settings.frame_period, self.settings.sample_period);
        let mut in_flight: Option<InFlight> = None;

        info!(
            sample_ms = self.settings.sample_period.as_millis() as u64,
            timeout_ms = self.settings.request_timeout.as_millis() as u64,
            "session started"
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                result = wait_camera(&mut camera_setup) => {
                    camera_setup = None;
                    self.on_camera_setup(result);
                }

                outcome = wait_in_flight(&mut in_flight) => {
                    if let Some(done) = in_flight.take() {
                        self.on_complete(done.ticket, outcome);
                    }
                }

                now = clock.render.tick() => {
                    let dt = clock.frame_dt(now);
                    self.on_render_tick(dt);
                }

                now = clock.sampling.tick() => {
                    self.expire_overdue(now, &mut in_flight);
                    if let Some(started) = self.on_sample_tick(now) {
                        in_flight = Some(started);
                    }
                }
            }
        }

        if let Some(elapsed) = self.scheduler.in_flight_for(Instant::now()) {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                "session ended with a request in flight, result will be discarded"
            );
        }
        drop(in_flight);
        drop(camera_setup);
        info!(similarity = self.feedback.similarity(), "session stopped");

        SessionReport {
            feedback: self.feedback,
            camera: self.camera,
            frames_rendered: self.frames_rendered,
            joint_generations: self.joints.generation(),
            requests_sent: self.scheduler.requests_sent(),
            responses_applied: self.responses_applied,
            failures: self.failures,
            dropped_ticks: self.scheduler.dropped_ticks(),
            skipped_ticks: self.skipped_ticks,
        }
    }

    fn on_camera_setup(&mut self, result: Result<Box<dyn FrameStream>, CameraError>) {
        match result {
            Ok(stream) => {
                self.sampler.attach(stream);
                self.feedback.set_initializing(false);
                self.camera = CameraStatus::Ready;
                info!("camera ready, sampling enabled");
            }
            Err(e) => {
                // initializing のまま。サンプリングは始まらない
                warn!("camera unavailable: {e}");
                self.camera = CameraStatus::Failed(e);
            }
        }
    }

    fn on_render_tick(&mut self, dt: f32) {
        let pose = self.animation.advance(dt);
        self.joints.publish(self.extractor.extract(&pose));
        self.health.advance(self.feedback.similarity(), dt);
        self.frames_rendered += 1;
    }

    /// 期限切れの送信中リクエストを打ち切って失敗として完了する。
    /// 期限と同時刻の tick がそのまま次の送信に使われる
    fn expire_overdue(&mut self, now: Instant, in_flight: &mut Option<InFlight>) {
        if !self.scheduler.is_overdue(now, self.settings.request_timeout) {
            return;
        }
        if let Some(expired) = in_flight.take() {
            expired.handle.abort();
            self.on_complete(
                expired.ticket,
                Err(PipelineError::Network("request timed out".to_string())),
            );
        }
    }

    fn on_sample_tick(&mut self, now: Instant) -> Option<InFlight> {
        if self.feedback.is_initializing() {
            self.skipped_ticks += 1;
            debug!("sampling tick skipped: camera initializing");
            return None;
        }

        let Some(ticket) = self.scheduler.try_begin(now) else {
            debug!(
                dropped = self.scheduler.dropped_ticks(),
                "sampling tick dropped: request in flight"
            );
            return None;
        };

        let frame = match self.sampler.capture() {
            Ok(frame) => frame,
            Err(e) => {
                self.scheduler.abort(ticket);
                self.skipped_ticks += 1;
                debug!("sampling tick skipped: {e}");
                return None;
            }
        };

        let request = ScoreRequest::new(frame, self.joints.snapshot());
        debug!(
            seq = ticket.seq(),
            joints = request.joints.len(),
            jpeg_bytes = request.frame.jpeg_data.len(),
            "sending score request"
        );
        self.scheduler.mark_sent(&ticket);

        let scorer = self.scorer.clone();
        let timeout = self.settings.request_timeout;
        let handle = tokio::spawn(async move {
            let captured_at = request.frame.captured_at;
            let result = match tokio::time::timeout(timeout, scorer.score(request)).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::Network("request timed out".to_string())),
            };
            debug!(
                elapsed_ms = captured_at.elapsed().as_millis() as u64,
                ok = result.is_ok(),
                "score request finished"
            );
            result
        });
        Some(InFlight { ticket, handle })
    }

    fn on_complete(&mut self, ticket: RequestTicket, outcome: PipelineResult<ScoreResponse>) {
        let seq = ticket.seq();
        match self.scheduler.complete(ticket, outcome, &mut self.feedback) {
            Completion::Applied(similarity) => {
                self.responses_applied += 1;
                self.lost_reported = false;
                info!(seq, similarity, "{}", self.health.render_text(false));
            }
            Completion::Failed(e) => {
                self.failures += 1;
                warn!(seq, similarity = self.feedback.similarity(), "scoring failed: {e}");
                if self.scheduler.connection_lost(self.settings.lost_after) && !self.lost_reported {
                    self.lost_reported = true;
                    warn!(
                        failures = self.scheduler.consecutive_failures(),
                        "{}",
                        self.health.render_text(true)
                    );
                }
            }
            Completion::Stale => debug!(seq, "stale response ignored"),
        }
    }
}

async fn wait_camera(slot: &mut Option<CameraSetup>) -> Result<Box<dyn FrameStream>, CameraError> {
    match slot {
        Some(handle) => match handle.await {
            Ok(result) => result,
            Err(e) => Err(CameraError::DeviceUnavailable(format!("camera setup task failed: {e}"))),
        },
        None => std::future::pending().await,
    }
}

async fn wait_in_flight(slot: &mut Option<InFlight>) -> PipelineResult<ScoreResponse> {
    match slot {
        Some(in_flight) => match (&mut in_flight.handle).await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Task(e.to_string())),
        },
        None => std::future::pending().await,
    }
}
