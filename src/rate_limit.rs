use clap::ValueEnum;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Key used for the single shared window
pub const GLOBAL_KEY: &str = "global";

// Trailing window of admitted request timestamps (time since unix epoch)
#[derive(Debug, Clone)]
pub struct RateWindow {
    timestamps: VecDeque<Duration>,
    max_requests: usize,
    window: Duration,
}

impl RateWindow {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    // Drop every entry that has left the trailing window.
    // A `now` behind an entry counts as zero elapsed time, so the entry stays.
    fn prune(&mut self, now: Duration) {
        let window = self.window;
        self.timestamps.retain(|&t| now.saturating_sub(t) < window);
    }

    // Prune, then append `now` if there is room. A rejection only prunes.
    pub fn try_admit(&mut self, now: Duration) -> bool {
        self.prune(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    // Number of admissions still inside the window
    pub fn current_load(&mut self, now: Duration) -> usize {
        self.prune(now);
        self.timestamps.len()
    }

    // Time until the next admission can succeed, zero if there is room now
    pub fn retry_after(&mut self, now: Duration) -> Duration {
        self.prune(now);

        if self.timestamps.len() < self.max_requests {
            return Duration::ZERO;
        }

        match self.timestamps.iter().min() {
            Some(&oldest) => self.window.saturating_sub(now.saturating_sub(oldest)),
            None => Duration::ZERO,
        }
    }
}

// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

// Which callers share a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RateLimitScope {
    // one window for the whole process
    Global,
    // one window per client ip
    Client,
}

impl RateLimitScope {
    pub fn key_for(&self, peer: Option<SocketAddr>) -> String {
        match (self, peer) {
            (RateLimitScope::Client, Some(addr)) => addr.ip().to_string(),
            _ => GLOBAL_KEY.to_string(),
        }
    }
}

// Process-wide limiter, owned by AppState.
// `entry()` holds the shard write lock across prune/count/append, so checks on one key are serialized.
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &str) -> Admission {
        self.check_at(key, unix_now())
    }

    pub fn check_at(&self, key: &str, now: Duration) -> Admission {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| RateWindow::new(self.max_requests, self.window));

        if entry.try_admit(now) {
            Admission::Admitted
        } else {
            Admission::Rejected {
                retry_after: entry.retry_after(now),
            }
        }
    }

    pub fn load(&self, key: &str) -> usize {
        self.load_at(key, unix_now())
    }

    pub fn load_at(&self, key: &str, now: Duration) -> usize {
        match self.windows.get_mut(key) {
            Some(mut window) => window.current_load(now),
            None => 0,
        }
    }

    // Forget windows with nothing left in them (per-client scope grows otherwise)
    pub fn sweep(&self, now: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.current_load(now) > 0);
        before - self.windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

pub fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}

// Periodically drop idle windows
pub async fn window_sweeper(limiter: std::sync::Arc<RateLimiter>, sweep_interval: Duration) {
    let mut interval = tokio::time::interval(sweep_interval);

    tracing::debug!(?sweep_interval, "rate limit sweeper started");

    loop {
        interval.tick().await;
        let removed = limiter.sweep(unix_now());
        if removed > 0 {
            tracing::debug!(removed, remaining = limiter.tracked_keys(), "swept idle rate windows");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn two_per_minute_scenario() {
        let mut w = RateWindow::new(2, secs(60));
        assert!(w.try_admit(secs(0)));
        assert!(w.try_admit(secs(1)));
        assert!(!w.try_admit(secs(2)));
        // t=0 has expired, t=1 is still inside
        assert!(w.try_admit(secs(61)));
        assert_eq!(w.current_load(secs(61)), 2);
    }

    #[test]
    fn first_call_always_admitted() {
        for now in [0, 1, 59, 1_700_000_000] {
            let mut w = RateWindow::new(1, secs(60));
            assert!(w.try_admit(secs(now)));
        }
    }

    #[test]
    fn simultaneous_checks_fill_exactly_to_limit() {
        let mut w = RateWindow::new(10, secs(60));
        for _ in 0..10 {
            assert!(w.try_admit(secs(100)));
        }
        assert!(!w.try_admit(secs(100)));
        assert_eq!(w.current_load(secs(100)), 10);
    }

    #[test]
    fn entries_expire_exactly_at_window_boundary() {
        let mut w = RateWindow::new(3, secs(60));
        for _ in 0..3 {
            assert!(w.try_admit(secs(10)));
        }
        assert!(!w.try_admit(secs(10)));
        assert!(w.try_admit(secs(70)));
    }

    #[test]
    fn entries_just_inside_window_still_count() {
        let mut w = RateWindow::new(3, secs(60));
        for _ in 0..3 {
            assert!(w.try_admit(secs(10)));
        }
        let almost = secs(70) - Duration::from_millis(1);
        assert!(!w.try_admit(almost));
    }

    #[test]
    fn rejection_does_not_record() {
        let mut w = RateWindow::new(1, secs(60));
        assert!(w.try_admit(secs(0)));
        assert!(!w.try_admit(secs(30)));
        // had the rejected call been appended, it would still be live at t=60
        assert!(w.try_admit(secs(60)));
    }

    #[test]
    fn load_queries_do_not_change_decisions() {
        let mut queried = RateWindow::new(2, secs(60));
        let mut plain = RateWindow::new(2, secs(60));

        for t in [0, 5, 20, 61, 64, 66, 130] {
            queried.current_load(secs(t));
            queried.current_load(secs(t));
            assert_eq!(queried.try_admit(secs(t)), plain.try_admit(secs(t)), "t={t}");
        }
    }

    #[test]
    fn never_more_than_limit_in_any_trailing_window() {
        let max = 4;
        let window = secs(10);
        let mut w = RateWindow::new(max, window);
        let mut admitted = Vec::new();

        // one call every 500ms for a minute
        for i in 0..120u64 {
            let now = Duration::from_millis(i * 500);
            if w.try_admit(now) {
                admitted.push(now);
            }
        }

        for &end in &admitted {
            let inside = admitted
                .iter()
                .filter(|&&t| t <= end && end - t < window)
                .count();
            assert!(inside <= max, "{inside} admissions in window ending {end:?}");
        }
        assert_eq!(admitted.len(), 24);
    }

    #[test]
    fn clock_going_backwards_keeps_entries() {
        let mut w = RateWindow::new(1, secs(60));
        assert!(w.try_admit(secs(100)));
        assert!(!w.try_admit(secs(50)));
    }

    #[test]
    fn retry_after_counts_down_to_oldest_expiry() {
        let mut w = RateWindow::new(2, secs(60));
        assert_eq!(w.retry_after(secs(0)), Duration::ZERO);
        w.try_admit(secs(0));
        w.try_admit(secs(15));
        assert_eq!(w.retry_after(secs(20)), secs(40));
        assert_eq!(w.retry_after(secs(60)), Duration::ZERO);
    }

    #[test]
    fn limiter_keys_are_independent() {
        let limiter = RateLimiter::new(1, secs(60));
        assert!(limiter.check_at("10.0.0.1", secs(0)).is_admitted());
        assert!(limiter.check_at("10.0.0.2", secs(0)).is_admitted());
        assert_eq!(
            limiter.check_at("10.0.0.1", secs(1)),
            Admission::Rejected { retry_after: secs(59) }
        );
        assert_eq!(limiter.load_at("10.0.0.2", secs(1)), 1);
        assert_eq!(limiter.load_at("nobody", secs(1)), 0);
    }

    #[test]
    fn sweep_removes_only_idle_windows() {
        let limiter = RateLimiter::new(5, secs(60));
        limiter.check_at("a", secs(0));
        limiter.check_at("b", secs(30));
        assert_eq!(limiter.sweep(secs(70)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.load_at("b", secs(70)), 1);
    }

    #[test]
    fn scope_picks_key() {
        let peer: SocketAddr = "192.168.1.7:51234".parse().unwrap();
        assert_eq!(RateLimitScope::Global.key_for(Some(peer)), GLOBAL_KEY);
        assert_eq!(RateLimitScope::Client.key_for(Some(peer)), "192.168.1.7");
        assert_eq!(RateLimitScope::Client.key_for(None), GLOBAL_KEY);
    }

    #[test]
    fn concurrent_checks_never_exceed_cap() {
        let limiter = std::sync::Arc::new(RateLimiter::new(10, secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check_at(GLOBAL_KEY, secs(5)).is_admitted())
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
    }
}
