use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::health_monitor::FixStatus;

/// Snapshot of a running session for display code.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub phase: String,
    // Estimator
    pub speed: f64,
    pub distance: f64,
    pub stationary: bool,
    pub fix_status: FixStatus,
    // Drag runs
    pub elapsed: f64,
    pub peak_speed: f64,
    // Lap sessions
    pub completed_laps: usize,
    pub current_lap_time: f64,
    pub predicted_next_lap: f64,
}

impl LiveStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Latest-snapshot board shared between the session task and readers.
///
/// Readers either poll [`StatusBoard::latest`] or subscribe for pushed
/// snapshots. Publishing never blocks on a slow subscriber.
#[derive(Clone, Default)]
pub struct StatusBoard {
    latest: Arc<RwLock<LiveStatus>>,
    subscribers: Arc<Mutex<Vec<Sender<LiveStatus>>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, status: LiveStatus) {
        {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.retain(|tx| match tx.try_send(status.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
        }
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = status;
    }

    pub fn latest(&self) -> LiveStatus {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Receive future snapshots. Snapshots are dropped for this subscriber
    /// while its buffer of `capacity` is full.
    pub fn subscribe(&self, capacity: usize) -> Receiver<LiveStatus> {
        let (tx, rx) = channel::bounded(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn status(speed: f64) -> LiveStatus {
        LiveStatus { speed, phase: "running".to_string(), ..LiveStatus::default() }
    }

    #[test]
    fn test_latest_snapshot() {
        let board = StatusBoard::new();
        assert_eq!(board.latest(), LiveStatus::default());
        board.publish(status(4.0));
        board.publish(status(5.0));
        assert_eq!(board.latest().speed, 5.0);
    }

    #[test]
    fn test_read_from_other_thread() {
        let board = StatusBoard::new();
        let reader = board.clone();
        board.publish(status(7.5));
        let speed = thread::spawn(move || reader.latest().speed).join().unwrap();
        assert_eq!(speed, 7.5);
    }

    #[test]
    fn test_full_subscriber_does_not_block() {
        let board = StatusBoard::new();
        let rx = board.subscribe(2);
        for i in 0..10 {
            board.publish(status(i as f64));
        }
        assert_eq!(rx.try_recv().unwrap().speed, 0.0);
        assert_eq!(rx.try_recv().unwrap().speed, 1.0);
        assert!(rx.try_recv().is_err());
        assert_eq!(board.latest().speed, 9.0);
    }

    #[test]
    fn test_disconnected_subscriber_pruned() {
        let board = StatusBoard::new();
        let rx = board.subscribe(4);
        assert_eq!(board.subscriber_count(), 1);
        drop(rx);
        board.publish(status(1.0));
        assert_eq!(board.subscriber_count(), 0);
    }

    #[test]
    fn test_status_serializes() {
        let json = serde_json::to_string(&status(3.0)).unwrap();
        assert!(json.contains("\"fix_status\":\"no_fix\""));
        let back: LiveStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status(3.0));
    }
}
