use std::time::Duration;

use tokio::time::{Instant, sleep_until};

/// Single-shot inactivity timer that can be re-armed and cancelled at will.
///
/// The watchdog only stores a deadline; waiting happens in [`expiry`] so the
/// supervisor can keep mutating the watchdog while a wait is in flight.
#[derive(Debug)]
pub struct Watchdog {
    window: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Start (or restart) the countdown from now. A window too large to
    /// represent as an instant never expires.
    pub fn arm(&mut self) {
        self.deadline = Instant::now().checked_add(self.window);
    }

    /// Idempotent; cancelling a fired or disarmed watchdog does nothing.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Resolves at `deadline`, or never when there is none.
pub async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_window() {
        let mut watchdog = Watchdog::new(Duration::from_secs(2));
        let start = Instant::now();
        watchdog.arm();
        expiry(watchdog.deadline()).await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_pushes_the_deadline_out() {
        let mut watchdog = Watchdog::new(Duration::from_secs(1));
        watchdog.arm();
        let first = watchdog.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(700)).await;
        watchdog.arm();
        let second = watchdog.deadline().unwrap();
        assert_eq!(second - first, Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_window_arms_without_overflow() {
        let mut watchdog = Watchdog::new(Duration::from_secs(u64::MAX));
        watchdog.arm();
        watchdog.arm();

        let fired = tokio::time::timeout(Duration::from_secs(3600), expiry(watchdog.deadline())).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_watchdog_never_fires() {
        let mut watchdog = Watchdog::new(Duration::from_secs(1));
        watchdog.arm();
        watchdog.cancel();
        watchdog.cancel();
        assert!(!watchdog.is_armed());

        let fired = tokio::time::timeout(Duration::from_secs(60), expiry(watchdog.deadline())).await;
        assert!(fired.is_err());
    }
}
