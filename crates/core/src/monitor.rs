use crate::classifier;
use crate::connection::ConnectionState;
use crate::error::CallFailure;
use crate::settings::ResilienceSettings;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Shortest liveness period. `interval_at` rejects a zero period.
const MIN_LIVENESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorTick {
    Liveness,
    KeepAlive,
}

/// Liveness and keep-alive timers. Both run only while a session is connected.
pub struct ConnectionMonitor {
    liveness_interval: Duration,
    staleness_threshold: Duration,
    keep_alive_interval: Option<Duration>,
    liveness: Option<Interval>,
    keep_alive: Option<Interval>,
}

impl ConnectionMonitor {
    pub fn new(settings: &ResilienceSettings) -> Self {
        Self {
            liveness_interval: settings.liveness_interval.max(MIN_LIVENESS_INTERVAL),
            staleness_threshold: settings.staleness_threshold,
            // A zero keep-alive period means no keep-alive.
            keep_alive_interval: settings.keep_alive_interval.filter(|period| !period.is_zero()),
            liveness: None,
            keep_alive: None,
        }
    }

    /// Starts both timers. A no-op if they are already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.liveness = Some(delayed_interval(self.liveness_interval));
        self.keep_alive = self.keep_alive_interval.map(delayed_interval);
    }

    pub fn stop(&mut self) {
        self.liveness = None;
        self.keep_alive = None;
    }

    pub fn is_running(&self) -> bool {
        self.liveness.is_some() || self.keep_alive.is_some()
    }

    /// Resolves on the next timer tick. Pends forever while stopped.
    pub async fn tick(&mut self) -> MonitorTick {
        tokio::select! {
            _ = tick_if_running(&mut self.liveness) => MonitorTick::Liveness,
            _ = tick_if_running(&mut self.keep_alive) => MonitorTick::KeepAlive,
        }
    }

    pub fn check(&self, state: &ConnectionState, now: Instant) -> Option<CallFailure> {
        if state.is_stale(now, self.staleness_threshold) {
            Some(classifier::staleness(state.idle_for(now)))
        } else {
            None
        }
    }
}

fn delayed_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_if_running(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn settings() -> ResilienceSettings {
        ResilienceSettings::default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_liveness_ticks_every_interval() {
        let mut monitor = ConnectionMonitor::new(&settings().with_keep_alive(None));
        monitor.start();

        let started = Instant::now();
        assert_eq!(monitor.tick().await, MonitorTick::Liveness);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
        assert_eq!(monitor.tick().await, MonitorTick::Liveness);
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_interleaves_with_liveness() {
        let mut monitor = ConnectionMonitor::new(&settings());
        monitor.start();

        let mut ticks = Vec::new();
        for _ in 0..3 {
            ticks.push(monitor.tick().await);
        }
        // 10s liveness, 20s both (either order), so keep-alive shows up among the first three.
        assert!(ticks.contains(&MonitorTick::KeepAlive));
        assert!(ticks.contains(&MonitorTick::Liveness));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_never_ticks() {
        let mut monitor = ConnectionMonitor::new(&settings());
        monitor.start();
        monitor.stop();
        assert!(!monitor.is_running());

        let tick = tokio::time::timeout(Duration::from_secs(300), monitor.tick()).await;
        assert!(tick.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_periods_do_not_panic() {
        let mut zeroed = settings().with_keep_alive(Some(Duration::ZERO));
        zeroed.liveness_interval = Duration::ZERO;
        let mut monitor = ConnectionMonitor::new(&zeroed);
        monitor.start();
        assert!(monitor.is_running());

        let started = Instant::now();
        assert_eq!(monitor.tick().await, MonitorTick::Liveness);
        assert_eq!(started.elapsed(), MIN_LIVENESS_INTERVAL);
        assert_eq!(monitor.tick().await, MonitorTick::Liveness);
        assert_eq!(started.elapsed(), MIN_LIVENESS_INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_flags_stale_connection() {
        let monitor = ConnectionMonitor::new(&settings());
        let mut state = ConnectionState::new();
        state.mark_connected();

        assert!(monitor.check(&state, Instant::now()).is_none());
        tokio::time::advance(Duration::from_secs(31)).await;
        let failure = monitor.check(&state, Instant::now()).unwrap();
        assert_eq!(failure.category, ErrorCategory::ConnectionLoss);
    }
}
