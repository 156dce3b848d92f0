//! Manually advanced clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use converge_core::Clock;
use tokio::sync::oneshot;
use tokio::time::Instant;

struct Sleeper {
    due: Duration,
    wake: oneshot::Sender<()>,
}

struct State {
    base: Instant,
    offset: Duration,
    sleepers: Vec<Sleeper>,
}

/// Clock driven entirely by [`ManualClock::advance`].
///
/// Sleeps complete only when the test advances past their deadline, so a
/// test must register the sleeper (poll until [`ManualClock::pending`] is
/// non-zero) before advancing. Most timing tests are simpler with
/// `TokioClock` under `#[tokio::test(start_paused = true)]`; this clock
/// is for tests that need explicit control over when time moves.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<State>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                base: Instant::now(),
                offset: Duration::ZERO,
                sleepers: Vec::new(),
            })),
        }
    }

    /// Advances the clock, waking every sleeper whose deadline passed.
    pub fn advance(&self, duration: Duration) {
        let due = {
            let mut state = self.state.lock().unwrap();
            state.offset += duration;
            let offset = state.offset;
            let (due, rest): (Vec<_>, Vec<_>) =
                state.sleepers.drain(..).partition(|s| s.due <= offset);
            state.sleepers = rest;
            due
        };
        tracing::trace!("advanced clock, waking {} sleeper(s)", due.len());
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().unwrap().offset
    }

    /// Number of tasks currently blocked in [`Clock::sleep`].
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().sleepers.len()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().unwrap();
        state.base + state.offset
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let receiver = {
            let mut state = self.state.lock().unwrap();
            let (wake, receiver) = oneshot::channel();
            let due = state.offset + duration;
            state.sleepers.push(Sleeper { due, wake });
            receiver
        };
        // Completes on advance(); a dropped clock also wakes us.
        let _ = receiver.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn settle(clock: &ManualClock, sleepers: usize) {
        while clock.pending() < sleepers {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_sleep_completes_on_advance() {
        let clock = ManualClock::new();
        let sleeper = {
            let clock = clock.clone();
            tokio::spawn(async move { clock.sleep(Duration::from_secs(5)).await })
        };
        settle(&clock, 1).await;

        clock.advance(Duration::from_secs(4));
        assert_eq!(clock.pending(), 1);

        clock.advance(Duration::from_secs(1));
        sleeper.await.unwrap();
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_now_tracks_offset() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now() - before, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_zero_sleep_returns_immediately() {
        let clock = ManualClock::new();
        clock.sleep(Duration::ZERO).await;
        assert_eq!(clock.pending(), 0);
    }
}
