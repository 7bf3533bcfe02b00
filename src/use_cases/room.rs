// A live room plus the timer tasks it owns.

use crate::domain::Room;
use crate::use_cases::types::SessionEvent;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

/// Wraps the domain room with the countdown, tick and cleanup timers that
/// belong to it. Timer tasks only send events back into the coordinator
/// channel; every state mutation stays on the coordinator task.
#[derive(Debug)]
pub struct RoomEntry {
    pub room: Room,
    countdown: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
    cleanup: Option<JoinHandle<()>>,
}

impl RoomEntry {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            countdown: None,
            ticker: None,
            cleanup: None,
        }
    }

    /// Arms the one-shot pre-match countdown. No-op while one is pending.
    pub fn schedule_countdown(&mut self, events_tx: mpsc::Sender<SessionEvent>, delay: Duration) {
        if self.countdown.is_some() {
            return;
        }
        let room_id = self.room.id.clone();
        self.countdown = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events_tx
                .send(SessionEvent::CountdownElapsed { room_id })
                .await;
        }));
    }

    /// Cancels a pending countdown; safe to call when none is armed.
    pub fn cancel_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }

    pub fn countdown_armed(&self) -> bool {
        self.countdown.is_some()
    }

    /// Starts the periodic tick timer. The first tick fires one interval
    /// after start. No-op while a ticker is running.
    pub fn start_ticker(&mut self, events_tx: mpsc::Sender<SessionEvent>, interval: Duration) {
        if self.ticker.is_some() {
            return;
        }
        let room_id = self.room.id.clone();
        self.ticker = Some(tokio::spawn(async move {
            let mut timer = time::interval(interval);
            // The first interval tick completes immediately; skip it so the
            // opening snapshot lands one interval after game start.
            timer.tick().await;
            loop {
                timer.tick().await;
                let fired = SessionEvent::TickFired {
                    room_id: room_id.clone(),
                };
                if events_tx.send(fired).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Stops the tick timer. Idempotent: transitions out of `playing` may
    /// end up here more than once.
    pub fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Arms the one-shot grace timer after which a finished room is removed
    /// from the directory.
    pub fn schedule_cleanup(&mut self, events_tx: mpsc::Sender<SessionEvent>, grace: Duration) {
        if self.cleanup.is_some() {
            return;
        }
        let room_id = self.room.id.clone();
        self.cleanup = Some(tokio::spawn(async move {
            time::sleep(grace).await;
            let _ = events_tx
                .send(SessionEvent::CleanupElapsed { room_id })
                .await;
        }));
    }
}

impl Drop for RoomEntry {
    fn drop(&mut self) {
        // Removal from the directory must not leave timer tasks behind.
        self.cancel_countdown();
        self.stop_ticker();
        if let Some(handle) = self.cleanup.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArenaState, Mode};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::Arc;
    use tokio::time::timeout;

    fn entry() -> RoomEntry {
        let mut rng = StdRng::seed_from_u64(11);
        let arena = ArenaState::new(&mut rng, 20, 20, 150);
        RoomEntry::new(Room::new(Arc::from("room-t"), Mode::Duel, arena))
    }

    #[tokio::test]
    async fn countdown_fires_exactly_once() {
        let (tx, mut rx) = mpsc::channel(8);
        // Keep a sender alive so the channel stays open; otherwise the
        // one-shot timer task dropping its sender closes the channel and
        // `recv()` returns `None` instead of blocking.
        let _keep = tx.clone();
        let mut entry = entry();
        entry.schedule_countdown(tx.clone(), Duration::from_millis(20));
        entry.schedule_countdown(tx, Duration::from_millis(20)); // ignored

        let fired = timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("countdown fires")
            .expect("channel open");
        assert!(matches!(fired, SessionEvent::CountdownElapsed { room_id } if &*room_id == "room-t"));

        // No second firing.
        assert!(
            timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
            "countdown is one-shot"
        );
    }

    #[tokio::test]
    async fn cancelled_countdown_never_fires() {
        let (tx, mut rx) = mpsc::channel(8);
        // Keep a sender alive so aborting the countdown task does not close
        // the channel (which would make `recv()` return `None`).
        let _keep = tx.clone();
        let mut entry = entry();
        entry.schedule_countdown(tx, Duration::from_millis(30));
        entry.cancel_countdown();
        assert!(!entry.countdown_armed());

        assert!(
            timeout(Duration::from_millis(120), rx.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn ticker_cadence_tracks_the_interval() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut entry = entry();
        entry.start_ticker(tx, Duration::from_millis(20));

        let window = time::sleep(Duration::from_millis(110));
        tokio::pin!(window);
        let mut ticks = 0u32;
        loop {
            tokio::select! {
                _ = &mut window => break,
                event = rx.recv() => {
                    assert!(matches!(event, Some(SessionEvent::TickFired { .. })));
                    ticks += 1;
                }
            }
        }

        // floor(110 / 20) = 5, with slack for scheduler jitter.
        assert!((3..=7).contains(&ticks), "got {ticks} ticks");
        entry.stop_ticker();
    }

    #[tokio::test]
    async fn stop_ticker_is_idempotent_and_silences_the_timer() {
        let (tx, mut rx) = mpsc::channel(64);
        // Keep a sender alive so stopping the ticker (which drops the task's
        // sender) does not close the channel and turn `recv()` into `None`.
        let _keep = tx.clone();
        let mut entry = entry();
        entry.start_ticker(tx, Duration::from_millis(15));
        timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("first tick")
            .expect("channel open");

        entry.stop_ticker();
        entry.stop_ticker(); // second stop must be a no-op
        assert!(!entry.ticker_running());

        while rx.try_recv().is_ok() {} // drain anything already queued
        assert!(
            timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
            "no ticks after stop"
        );
    }
}
