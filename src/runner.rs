//! Session actor.
//!
//! Samples from both streams may arrive on any thread. They are funnelled
//! through one mpsc channel into a single task that owns the session, so
//! filter and state-machine updates never run concurrently. Display code
//! reads snapshots from the [`StatusBoard`].

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::{DragConfig, EstimatorConfig, LapConfig};
use crate::error::{Result, SpeedtrapError};
use crate::live_status::{LiveStatus, StatusBoard};
use crate::sessions::{DragSession, LapRecord, LapSession, RunMetrics};
use crate::types::{InertialFrame, PositionFix};

/// Default command queue depth: a few seconds of 50 Hz frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    Inertial(InertialFrame),
    Position(PositionFix),
    Stop,
}

/// A session the actor can drive.
pub trait TimedSession: Send + 'static {
    type Record: Send + 'static;

    fn handle_inertial(&mut self, frame: &InertialFrame) -> Option<Self::Record>;
    fn handle_position(&mut self, fix: &PositionFix) -> Option<Self::Record>;
    fn handle_stop(&mut self) -> Option<Self::Record>;
    fn is_finished(&self) -> bool;
    fn status(&self) -> LiveStatus;
}

impl TimedSession for DragSession {
    type Record = RunMetrics;

    fn handle_inertial(&mut self, frame: &InertialFrame) -> Option<RunMetrics> {
        self.on_inertial(frame)
    }

    fn handle_position(&mut self, fix: &PositionFix) -> Option<RunMetrics> {
        self.on_position(fix)
    }

    fn handle_stop(&mut self) -> Option<RunMetrics> {
        self.stop()
    }

    fn is_finished(&self) -> bool {
        DragSession::is_finished(self)
    }

    fn status(&self) -> LiveStatus {
        DragSession::status(self)
    }
}

impl TimedSession for LapSession {
    type Record = LapRecord;

    fn handle_inertial(&mut self, frame: &InertialFrame) -> Option<LapRecord> {
        self.on_inertial(frame);
        None
    }

    fn handle_position(&mut self, fix: &PositionFix) -> Option<LapRecord> {
        self.on_position(fix);
        None
    }

    fn handle_stop(&mut self) -> Option<LapRecord> {
        self.finish()
    }

    fn is_finished(&self) -> bool {
        LapSession::is_finished(self)
    }

    fn status(&self) -> LiveStatus {
        LapSession::status(self)
    }
}

pub struct SessionHandle<R> {
    tx: mpsc::Sender<SessionCommand>,
    board: StatusBoard,
    task: JoinHandle<Option<R>>,
}

impl<R> SessionHandle<R> {
    pub async fn send_inertial(&self, frame: InertialFrame) -> Result<()> {
        self.send(SessionCommand::Inertial(frame)).await
    }

    pub async fn send_position(&self, fix: PositionFix) -> Result<()> {
        self.send(SessionCommand::Position(fix)).await
    }

    /// Non-blocking send for sensor callbacks. Returns `Ok(false)` when the
    /// queue is full and the frame was dropped.
    pub fn try_send_inertial(&self, frame: InertialFrame) -> Result<bool> {
        self.try_send(SessionCommand::Inertial(frame))
    }

    pub fn try_send_position(&self, fix: PositionFix) -> Result<bool> {
        self.try_send(SessionCommand::Position(fix))
    }

    /// Request a manual stop. A session that already finished ignores it.
    pub async fn stop(&self) {
        let _ = self.tx.send(SessionCommand::Stop).await;
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn latest(&self) -> LiveStatus {
        self.board.latest()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stop the session and wait for its record. Yields the record at most
    /// once: `None` when the session ended with nothing to record.
    pub async fn finish(self) -> Result<Option<R>> {
        let _ = self.tx.send(SessionCommand::Stop).await;
        drop(self.tx);
        self.task
            .await
            .map_err(|e| SpeedtrapError::Internal(format!("session task failed: {}", e)))
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx.send(command).await.map_err(|_| SpeedtrapError::SessionClosed)
    }

    fn try_send(&self, command: SessionCommand) -> Result<bool> {
        match self.tx.try_send(command) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                log::debug!("Session queue full, dropping sample");
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(SpeedtrapError::SessionClosed),
        }
    }
}

/// Validate and start a drag run. Must be called inside a tokio runtime.
pub fn spawn_drag(
    config: DragConfig,
    estimator: EstimatorConfig,
    capacity: usize,
) -> Result<SessionHandle<RunMetrics>> {
    let session = DragSession::new(config, estimator)?;
    Ok(spawn_session(session, capacity))
}

/// Validate and start a lap session. Must be called inside a tokio runtime.
pub fn spawn_lap(
    config: LapConfig,
    estimator: EstimatorConfig,
    capacity: usize,
) -> Result<SessionHandle<LapRecord>> {
    let session = LapSession::new(config, estimator)?;
    Ok(spawn_session(session, capacity))
}

pub fn spawn_session<S: TimedSession>(session: S, capacity: usize) -> SessionHandle<S::Record> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let board = StatusBoard::new();
    board.publish(session.status());
    let task = tokio::spawn(run_session(session, rx, board.clone()));
    SessionHandle { tx, board, task }
}

async fn run_session<S: TimedSession>(
    mut session: S,
    mut rx: mpsc::Receiver<SessionCommand>,
    board: StatusBoard,
) -> Option<S::Record> {
    while let Some(command) = rx.recv().await {
        let record = match command {
            SessionCommand::Inertial(frame) => session.handle_inertial(&frame),
            SessionCommand::Position(fix) => session.handle_position(&fix),
            SessionCommand::Stop => session.handle_stop(),
        };
        board.publish(session.status());
        if record.is_some() || session.is_finished() {
            return record;
        }
    }

    // every sender dropped without an explicit stop
    let record = session.handle_stop();
    board.publish(session.status());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Track;
    use crate::error::ConfigError;
    use crate::geodesy::offset_m;
    use crate::sessions::FinishReason;
    use crate::types::Coordinate;

    const ORIGIN: Coordinate = Coordinate { latitude: 51.5007, longitude: -0.1246 };

    fn fix_at(timestamp: f64, velocity: f64, north_m: f64) -> PositionFix {
        let c = offset_m(ORIGIN, north_m, 0.0);
        PositionFix::new(timestamp, velocity, 5.0, c.latitude, c.longitude)
    }

    #[tokio::test]
    async fn test_config_rejected_synchronously() {
        let result = spawn_drag(DragConfig::default(), EstimatorConfig::default(), 16);
        assert!(matches!(result, Err(SpeedtrapError::Config(ConfigError::MissingTarget))));
        let result = spawn_lap(LapConfig::default(), EstimatorConfig::default(), 16);
        assert!(matches!(result, Err(SpeedtrapError::Config(ConfigError::MissingTrack))));
    }

    #[tokio::test]
    async fn test_drag_through_actor() {
        let handle = spawn_drag(DragConfig::to_speed(13.4), EstimatorConfig::default(), 64).unwrap();
        assert_eq!(handle.latest().phase, "armed");

        'feed: for k in 0..=250 {
            let t = k as f64 * 0.02;
            if k % 5 == 0 {
                let ts = (k / 5) as f64 * 0.1;
                if handle.send_position(fix_at(ts, 3.0 * ts, 1.5 * ts * ts)).await.is_err() {
                    break 'feed;
                }
            }
            let frame = InertialFrame::new(t, [0.306, 0.0, 0.0], [0.0; 3]);
            if handle.send_inertial(frame).await.is_err() {
                break 'feed;
            }
        }

        let metrics = handle.finish().await.unwrap().unwrap();
        assert_eq!(metrics.finish_reason, FinishReason::TargetSpeed);
        assert!((metrics.elapsed_time - 4.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_send_after_finish_is_closed() {
        let handle = spawn_drag(DragConfig::to_speed(5.0), EstimatorConfig::default(), 4).unwrap();
        handle.send_position(fix_at(0.0, 1.0, 0.0)).await.unwrap();
        handle.send_inertial(InertialFrame::new(0.0, [0.3, 0.0, 0.0], [0.0; 3])).await.unwrap();

        let mut result = Ok(());
        for k in 1..200 {
            let frame = InertialFrame::new(k as f64 * 0.02, [0.3, 0.0, 0.0], [0.0; 3]);
            result = handle.send_inertial(frame).await;
            if result.is_err() {
                break;
            }
            if k == 10 {
                handle.send_position(fix_at(0.2, 6.0, 1.0)).await.unwrap();
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(result, Err(SpeedtrapError::SessionClosed));
        assert!(handle.is_closed());
        assert_eq!(handle.latest().phase, "finished");

        let metrics = handle.finish().await.unwrap();
        assert_eq!(metrics.map(|m| m.finish_reason), Some(FinishReason::TargetSpeed));
    }

    #[tokio::test]
    async fn test_try_send_drops_when_full() {
        let handle = spawn_drag(DragConfig::to_speed(13.4), EstimatorConfig::default(), 1).unwrap();
        let frame = InertialFrame::new(0.0, [0.0; 3], [0.0; 3]);
        assert_eq!(handle.try_send_inertial(frame), Ok(true));
        assert_eq!(handle.try_send_inertial(frame), Ok(false));
        assert_eq!(handle.finish().await, Ok(None));
    }

    #[tokio::test]
    async fn test_lap_through_actor() {
        let track = Track::new("test", ORIGIN);
        let handle = spawn_lap(LapConfig::for_track(track), EstimatorConfig::default(), 16).unwrap();
        let updates = handle.status_board().subscribe(64);

        for (t, north) in [(0.0, 1.0), (20.0, 500.0), (40.0, 2.0), (41.0, 1.0), (70.0, 3.0)] {
            handle.send_position(fix_at(t, 20.0, north)).await.unwrap();
        }
        handle.stop().await;
        let record = handle.finish().await.unwrap().unwrap();

        assert_eq!(record.lap_durations, vec![40.0, 30.0]);
        assert_eq!(record.best_lap, Some(30.0));
        let last = updates.try_iter().last().unwrap();
        assert_eq!(last.phase, "finished");
        assert_eq!(last.completed_laps, 2);
    }
}
