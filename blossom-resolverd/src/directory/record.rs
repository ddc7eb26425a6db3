use std::time::Duration;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use url::Url;
use shared::types::ServerStatus;

/// Consecutive failures after which a server is taken out of rotation
pub const UNAVAILABLE_AFTER_FAILURES: u32 = 5;

const FAILURE_PENALTY: f64 = 0.5;
const RECOVERY_PER_DAY: f64 = 0.1;
const RECENT_SUCCESS_WINDOW: Duration = Duration::from_secs(3600);
const RECENT_SUCCESS_BOOST: f64 = 0.2;
const SECS_PER_DAY: f64 = 24.0 * 3600.0;

/// One candidate storage server and its observed health.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord {
    pub url: Url,
    pub name: Option<String>,
    pub last_success: Option<Instant>,
    pub last_failure: Option<Instant>,
    pub consecutive_failures: u32,
    pub is_available: bool,
}

impl ServerRecord {
    pub fn new(url: Url, name: Option<String>) -> Self {
        Self {
            url,
            name,
            last_success: None,
            last_failure: None,
            consecutive_failures: 0,
            is_available: true,
        }
    }

    pub fn health_score(&self) -> f64 {
        self.health_score_at(Instant::now())
    }

    /// Score in [0, 1]. Failures pull it down, time since the last failure
    /// and a success in the last hour pull it back up. Unavailable servers
    /// always score 0.
    pub fn health_score_at(&self, now: Instant) -> f64 {
        if !self.is_available {
            return 0.0;
        }

        let mut score = 1.0 / (1.0 + f64::from(self.consecutive_failures) * FAILURE_PENALTY);

        if let Some(failed_at) = self.last_failure {
            let days = now.saturating_duration_since(failed_at).as_secs_f64() / SECS_PER_DAY;
            score = (score + days * RECOVERY_PER_DAY).min(1.0);
        }

        if let Some(succeeded_at) = self.last_success {
            if now.saturating_duration_since(succeeded_at) < RECENT_SUCCESS_WINDOW {
                score = (score + RECENT_SUCCESS_BOOST).min(1.0);
            }
        }

        score
    }

    pub fn mark_failure(&mut self) {
        self.mark_failure_at(Instant::now());
    }

    pub fn mark_failure_at(&mut self, now: Instant) {
        self.last_failure = Some(now);
        self.consecutive_failures += 1;
        if self.consecutive_failures >= UNAVAILABLE_AFTER_FAILURES {
            self.is_available = false;
        }
    }

    pub fn mark_success(&mut self) {
        self.mark_success_at(Instant::now());
    }

    /// A single success re-admits the server whatever its failure streak.
    pub fn mark_success_at(&mut self, now: Instant) {
        self.last_success = Some(now);
        self.consecutive_failures = 0;
        self.is_available = true;
    }

    /// Snapshot for reporting, with monotonic timestamps mapped onto wall time.
    pub fn status(&self, now: Instant) -> ServerStatus {
        let wall_now = Utc::now();
        let to_wall = |at: Instant| -> DateTime<Utc> {
            let ago = chrono::Duration::from_std(now.saturating_duration_since(at))
                .unwrap_or_else(|_| chrono::Duration::zero());
            wall_now - ago
        };

        ServerStatus {
            url: self.url.to_string(),
            name: self.name.clone(),
            last_success: self.last_success.map(to_wall),
            last_failure: self.last_failure.map(to_wall),
            consecutive_failures: self.consecutive_failures,
            available: self.is_available,
            health_score: self.health_score_at(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server() -> ServerRecord {
        ServerRecord::new(Url::parse("https://blossom.example.com").unwrap(), None)
    }

    #[test]
    fn test_fresh_server_is_perfect() {
        let server = test_server();
        assert_eq!(server.health_score(), 1.0);
        assert!(server.is_available);
    }

    #[test]
    fn test_failures_lower_score() {
        let now = Instant::now();
        let mut server = test_server();

        server.mark_failure_at(now);
        assert!(server.health_score_at(now) < 1.0);

        server.mark_failure_at(now);
        server.mark_failure_at(now);
        assert!(server.health_score_at(now) < 0.5);
        assert!(server.is_available);
    }

    #[test]
    fn test_unavailable_after_five_failures() {
        let now = Instant::now();
        let mut server = test_server();

        for _ in 0..4 {
            server.mark_failure_at(now);
        }
        assert!(server.is_available);

        server.mark_failure_at(now);
        assert!(!server.is_available);
        assert_eq!(server.health_score_at(now), 0.0);

        // Still zero once old failures would have decayed
        let later = now + Duration::from_secs(30 * 24 * 3600);
        assert_eq!(server.health_score_at(later), 0.0);
    }

    #[test]
    fn test_success_resets_and_raises_score() {
        let now = Instant::now();
        let mut server = test_server();

        for _ in 0..5 {
            server.mark_failure_at(now);
        }
        let before = server.health_score_at(now);

        server.mark_success_at(now);
        assert_eq!(server.consecutive_failures, 0);
        assert!(server.is_available);
        assert!(server.health_score_at(now) > before);
    }

    #[test]
    fn test_success_after_partial_streak_raises_score() {
        let now = Instant::now();
        let mut server = test_server();

        server.mark_failure_at(now);
        server.mark_failure_at(now);
        let before = server.health_score_at(now);
        assert_eq!(before, 0.5);

        server.mark_success_at(now);
        assert!(server.health_score_at(now) > before);
    }

    #[test]
    fn test_old_failure_recovers_over_days() {
        let now = Instant::now();
        let mut server = test_server();

        server.mark_failure_at(now);
        let fresh = server.health_score_at(now);

        let two_days = now + Duration::from_secs(2 * 24 * 3600);
        let recovered = server.health_score_at(two_days);
        assert!(recovered > fresh);
        assert!((recovered - (fresh + 0.2)).abs() < 1e-9);

        let ten_days = now + Duration::from_secs(10 * 24 * 3600);
        assert_eq!(server.health_score_at(ten_days), 1.0);
    }

    #[test]
    fn test_recent_success_boost_expires() {
        let now = Instant::now();
        let mut server = test_server();

        server.mark_failure_at(now);
        server.mark_failure_at(now);
        server.mark_success_at(now);
        server.mark_failure_at(now);

        let boosted = server.health_score_at(now);
        let after_hour = server.health_score_at(now + Duration::from_secs(3601));
        assert!(boosted > after_hour);
    }

    #[test]
    fn test_status_reports_counters() {
        let now = Instant::now();
        let mut server = ServerRecord::new(
            Url::parse("https://blossom.example.com").unwrap(),
            Some("primary".to_string()),
        );
        server.mark_failure_at(now);

        let status = server.status(now);
        assert_eq!(status.url, "https://blossom.example.com/");
        assert_eq!(status.name.as_deref(), Some("primary"));
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_failure.is_some());
        assert!(status.last_success.is_none());
        assert!(status.available);
    }
}
