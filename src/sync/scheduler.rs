use std::time::Duration;
use tokio::time::Instant;

use crate::error::PipelineError;
use crate::feedback::FeedbackState;
use crate::scoring::ScoreResponse;

/// スケジューラの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    RequestInFlight { seq: u64, started: Instant },
}

/// 送信中リクエストの引換券。複製できないので同時に2つは存在しない
#[derive(Debug, PartialEq, Eq)]
pub struct RequestTicket {
    seq: u64,
}

impl RequestTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// 完了処理の結果
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// FeedbackState に反映した値
    Applied(f32),
    /// 失敗。similarity は変更しない
    Failed(PipelineError),
    /// 現在の送信中リクエストではない
    Stale,
}

/// Idle / RequestInFlight の状態機械。送信中は高々1件
#[derive(Debug)]
pub struct SyncScheduler {
    state: SyncState,
    next_seq: u64,
    dropped_ticks: u64,
    sent: u64,
    consecutive_failures: u32,
}

impl SyncScheduler {
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
            next_seq: 0,
            dropped_ticks: 0,
            sent: 0,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SyncState::Idle
    }

    /// サンプリングtick。Idle なら RequestInFlight に遷移して券を返す。
    /// 送信中なら tick は捨てる（キューしない）
    pub fn try_begin(&mut self, now: Instant) -> Option<RequestTicket> {
        match self.state {
            SyncState::Idle => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.state = SyncState::RequestInFlight { seq, started: now };
                Some(RequestTicket { seq })
            }
            SyncState::RequestInFlight { .. } => {
                self.dropped_ticks += 1;
                None
            }
        }
    }

    /// 送信前に中断した（キャプチャ失敗など）。Idle に戻るだけ
    pub fn abort(&mut self, ticket: RequestTicket) {
        if self.owns(&ticket) {
            self.state = SyncState::Idle;
        }
    }

    /// リクエスト送信を記録
    pub fn mark_sent(&mut self, ticket: &RequestTicket) {
        if self.owns(ticket) {
            self.sent += 1;
        }
    }

    /// 完了。先に Idle に戻してから結果を反映する
    pub fn complete(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<ScoreResponse, PipelineError>,
        feedback: &mut FeedbackState,
    ) -> Completion {
        if !self.owns(&ticket) {
            return Completion::Stale;
        }
        self.state = SyncState::Idle;

        match outcome {
            Ok(response) => {
                self.consecutive_failures = 0;
                feedback.update(response.similarity);
                Completion::Applied(feedback.similarity())
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                Completion::Failed(e)
            }
        }
    }

    /// 送信開始から timeout 以上経っているか
    pub fn is_overdue(&self, now: Instant, timeout: Duration) -> bool {
        match self.state() {
            SyncState::RequestInFlight { started, .. } => now.saturating_duration_since(started) >= timeout,
            SyncState::Idle => false,
        }
    }

    /// 送信中の経過時間
    pub fn in_flight_for(&self, now: Instant) -> Option<Duration> {
        match self.state {
            SyncState::RequestInFlight { started, .. } => Some(now.saturating_duration_since(started)),
            SyncState::Idle => None,
        }
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }

    pub fn requests_sent(&self) -> u64 {
        self.sent
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// 連続失敗が threshold 以上か。0 なら常に false
    pub fn connection_lost(&self, threshold: u32) -> bool {
        threshold > 0 && self.consecutive_failures >= threshold
    }

    fn owns(&self, ticket: &RequestTicket) -> bool {
        matches!(self.state, SyncState::RequestInFlight { seq, .. } if seq == ticket.seq)
    }
}

impl Default for SyncScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(similarity: f32) -> Result<ScoreResponse, PipelineError> {
        Ok(ScoreResponse {
            similarity,
            filtered_model_coordinates: None,
            filtered_video_coordinates: None,
        })
    }

    fn timeout() -> Result<ScoreResponse, PipelineError> {
        Err(PipelineError::Network("request timed out".to_string()))
    }

    #[test]
    fn test_initial_state_idle() {
        let scheduler = SyncScheduler::new();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.in_flight_for(Instant::now()), None);
    }

    #[test]
    fn test_second_tick_dropped_while_in_flight() {
        let mut s = SyncScheduler::new();
        let now = Instant::now();
        let ticket = s.try_begin(now).unwrap();
        assert!(s.try_begin(now).is_none());
        assert!(s.try_begin(now).is_none());
        assert_eq!(s.dropped_ticks(), 2);

        let mut feedback = FeedbackState::new();
        s.complete(ticket, ok(50.0), &mut feedback);
        assert!(s.try_begin(now).is_some());
    }

    #[test]
    fn test_success_updates_feedback() {
        let mut s = SyncScheduler::new();
        let mut feedback = FeedbackState::new();
        let ticket = s.try_begin(Instant::now()).unwrap();
        assert_eq!(s.complete(ticket, ok(82.4), &mut feedback), Completion::Applied(82.4));
        assert_eq!(feedback.similarity(), 82.4);
        assert!(s.is_idle());
    }

    #[test]
    fn test_failure_keeps_last_good_value() {
        let mut s = SyncScheduler::new();
        let mut feedback = FeedbackState::new();

        let t = s.try_begin(Instant::now()).unwrap();
        s.complete(t, ok(64.0), &mut feedback);

        let t = s.try_begin(Instant::now()).unwrap();
        let result = s.complete(t, timeout(), &mut feedback);
        assert!(matches!(result, Completion::Failed(PipelineError::Network(_))));
        assert_eq!(feedback.similarity(), 64.0);
        assert!(s.is_idle());
    }

    #[test]
    fn test_stale_ticket_ignored() {
        let mut s = SyncScheduler::new();
        let mut feedback = FeedbackState::new();
        let first = s.try_begin(Instant::now()).unwrap();
        s.abort(first);
        let _second = s.try_begin(Instant::now()).unwrap();

        // 別の seq の券を偽造して渡す
        let forged = RequestTicket { seq: 0 };
        assert_eq!(s.complete(forged, ok(99.0), &mut feedback), Completion::Stale);
        assert_eq!(feedback.similarity(), 0.0);
        assert!(!s.is_idle());
    }

    #[test]
    fn test_abort_returns_to_idle_without_touching_counters() {
        let mut s = SyncScheduler::new();
        let t = s.try_begin(Instant::now()).unwrap();
        s.abort(t);
        assert!(s.is_idle());
        assert_eq!(s.requests_sent(), 0);
        assert_eq!(s.consecutive_failures(), 0);
    }

    #[test]
    fn test_connection_lost_after_threshold() {
        let mut s = SyncScheduler::new();
        let mut feedback = FeedbackState::new();
        for _ in 0..3 {
            let t = s.try_begin(Instant::now()).unwrap();
            s.complete(t, timeout(), &mut feedback);
        }
        assert!(s.connection_lost(3));
        assert!(!s.connection_lost(4));
        assert!(!s.connection_lost(0));

        let t = s.try_begin(Instant::now()).unwrap();
        s.complete(t, ok(10.0), &mut feedback);
        assert!(!s.connection_lost(3));
    }

    #[test]
    fn test_overdue_after_timeout() {
        let mut s = SyncScheduler::new();
        let start = Instant::now();
        let timeout = Duration::from_secs(1);
        assert!(!s.is_overdue(start, timeout));

        let _t = s.try_begin(start).unwrap();
        assert!(!s.is_overdue(start + Duration::from_millis(999), timeout));
        assert!(s.is_overdue(start + timeout, timeout));
        assert_eq!(s.in_flight_for(start + timeout), Some(timeout));
    }

    #[test]
    fn test_seq_increases() {
        let mut s = SyncScheduler::new();
        let mut feedback = FeedbackState::new();
        let a = s.try_begin(Instant::now()).unwrap();
        let a_seq = a.seq();
        s.mark_sent(&a);
        s.complete(a, ok(1.0), &mut feedback);
        let b = s.try_begin(Instant::now()).unwrap();
        assert!(b.seq() > a_seq);
        assert_eq!(s.requests_sent(), 1);
    }
}
