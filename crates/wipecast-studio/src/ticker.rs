//! Tick sources pacing the frame loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};

/// One tick per output frame.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self);
}

/// Builds a ticker for a session running at the given frame rate.
///
/// Tickers are created on the task that runs the frame loop: the spawned
/// session task for live recordings, the caller's task for scripted ones.
pub type TickerFactory = Arc<dyn Fn(u32) -> Box<dyn Ticker> + Send + Sync>;

/// Real-time pacing on the tokio timer. Missed ticks are skipped, never bunched.
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }

    pub fn factory() -> TickerFactory {
        Arc::new(|fps| Box::new(IntervalTicker::new(fps)) as Box<dyn Ticker>)
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Ticks as fast as the loop can run, yielding to the runtime between frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateTicker;

impl ImmediateTicker {
    pub fn factory() -> TickerFactory {
        Arc::new(|_| Box::new(ImmediateTicker) as Box<dyn Ticker>)
    }
}

#[async_trait]
impl Ticker for ImmediateTicker {
    async fn tick(&mut self) {
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_immediate_ticker_does_not_wait() {
        let mut ticker = (ImmediateTicker::factory())(30);
        let start = std::time::Instant::now();
        for _ in 0..100 {
            ticker.tick().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_paces_frames() {
        let mut ticker = IntervalTicker::new(10);
        let start = tokio::time::Instant::now();
        // The first tick completes immediately.
        for _ in 0..4 {
            ticker.tick().await;
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(400), "{:?}", elapsed);
    }
}
