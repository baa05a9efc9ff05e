//! Live dispatch loop
//!
//! Each viewer gets its own virtual clock. The clock starts at 0 and moves
//! one frame step per tick regardless of how long sending took. Once it
//! passes the session's last offset the loop keeps the connection open and
//! repeats the finished marker every heartbeat.

use crate::session::ReplaySession;
use futures::{Sink, SinkExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Streaming,
    Finished,
}

/// Fixed-rate simulated clock
#[derive(Debug, Clone, Copy)]
pub struct VirtualClock {
    now: i64,
    step: i64,
    end: i64,
}

impl VirtualClock {
    pub fn new(step: i64, end: i64) -> Self {
        Self { now: 0, step, end }
    }

    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn state(&self) -> ClockState {
        if self.now > self.end {
            ClockState::Finished
        } else {
            ClockState::Streaming
        }
    }

    pub fn advance(&mut self) {
        self.now += self.step;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub tick: Duration,
    pub heartbeat: Duration,
}

/// Why a dispatch loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEnd {
    /// A send failed: the viewer went away
    Disconnected,
    Cancelled,
}

/// Stream `session` into `sink` until a send fails or `cancel` fires
pub async fn run<S>(
    session: Arc<ReplaySession>,
    mut sink: S,
    pacing: Pacing,
    cancel: CancellationToken,
) -> DispatchEnd
where
    S: Sink<String> + Unpin,
{
    let mut clock = VirtualClock::new(session.step_ms(), session.max_offset());
    let mut announced = false;

    loop {
        let (frame, pause) = match clock.state() {
            ClockState::Streaming => {
                let frame = session.frame_at(clock.now());
                clock.advance();
                (frame, pacing.tick)
            }
            ClockState::Finished => {
                if !announced {
                    tracing::info!("Session {} finished at {} ms", session.key(), session.max_offset());
                    announced = true;
                }
                (Some(session.finished_marker()), pacing.heartbeat)
            }
        };

        if let Some(frame) = frame {
            if sink.send(frame).await.is_err() {
                tracing::debug!("Viewer of session {} disconnected", session.key());
                return DispatchEnd::Disconnected;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return DispatchEnd::Cancelled,
            _ = tokio::time::sleep(pause) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use orr_core::table::{Column, TimelineTable, Value};

    fn session() -> Arc<ReplaySession> {
        let table = TimelineTable::new(
            vec![0, 100, 200],
            vec![
                Column::new("x", vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
                Column::new("y", vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
                Column::new("position", vec![Value::Number(1.0); 3]),
            ],
        )
        .unwrap();
        Arc::new(ReplaySession::from_tables("test", 100, vec![(7, table)]))
    }

    fn pacing() -> Pacing {
        Pacing {
            tick: Duration::from_millis(100),
            heartbeat: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_clock_transitions_after_end() {
        let mut clock = VirtualClock::new(100, 200);
        assert_eq!(clock.state(), ClockState::Streaming);
        clock.advance();
        clock.advance();
        assert_eq!((clock.now(), clock.state()), (200, ClockState::Streaming));
        clock.advance();
        assert_eq!(clock.state(), ClockState::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_then_repeats_finished_marker() {
        let (tx, mut rx) = mpsc::unbounded();
        let task = tokio::spawn(run(session(), tx, pacing(), CancellationToken::new()));

        let mut received = Vec::new();
        for _ in 0..6 {
            received.push(rx.next().await.unwrap());
        }
        assert_eq!(
            received,
            vec![
                "0|7,1,1,1",
                "100|7,2,2,1",
                "200|7,3,3,1",
                "200|FINISHED",
                "200|FINISHED",
                "200|FINISHED",
            ]
        );

        drop(rx);
        assert_eq!(task.await.unwrap(), DispatchEnd::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence() {
        let (tx, mut rx) = mpsc::unbounded();
        let started = tokio::time::Instant::now();
        let _task = tokio::spawn(run(session(), tx, pacing(), CancellationToken::new()));

        for _ in 0..4 {
            rx.next().await.unwrap();
        }
        // three frames and the first marker are 100 ms apart
        assert_eq!(started.elapsed(), Duration::from_millis(300));

        rx.next().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_loop() {
        let (tx, mut rx) = mpsc::unbounded();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(session(), tx, pacing(), cancel.clone()));

        rx.next().await.unwrap();
        cancel.cancel();
        assert_eq!(task.await.unwrap(), DispatchEnd::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_frames_are_skipped() {
        let table = TimelineTable::new(
            vec![0, 200],
            vec![
                Column::new("x", vec![Value::Number(0.0), Value::Number(4.0)]),
                Column::new("y", vec![Value::Number(0.0), Value::Number(4.0)]),
            ],
        )
        .unwrap();
        let session = Arc::new(ReplaySession::from_tables("gap", 100, vec![(3, table)]));

        let (tx, mut rx) = mpsc::unbounded();
        let _task = tokio::spawn(run(session, tx, pacing(), CancellationToken::new()));

        // 0 and 100 precede the first real fix
        assert_eq!(rx.next().await.unwrap(), "200|3,4,4,0");
        assert_eq!(rx.next().await.unwrap(), "200|FINISHED");
    }
}
