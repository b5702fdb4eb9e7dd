//! Transport limiter: paced dispatch to the remote controller
//!
//! Every outbound request, regardless of which logical operation issues it,
//! goes through a single [`TransportLimiter`] instance. The limiter enforces
//! a minimum spacing between dispatches and translates the controller's
//! internal-fault status into a domain-level meltdown error.

use crate::error::{ControlError, MELTDOWN_FALLBACK};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Body shape of a controller fault response.
#[derive(Debug, Deserialize)]
struct FaultBody {
    message: String,
}

/// Paces all outbound requests and relabels controller faults.
///
/// The last-dispatch marker is the only mutable shared state here. The mutex
/// is held across the pacing sleep, which is what serializes the wait gate:
/// a second caller cannot observe the marker until the first has claimed its
/// slot and stamped it.
pub struct TransportLimiter {
    http: reqwest::Client,
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
}

impl TransportLimiter {
    /// Create a limiter with the given spacing and per-request timeout.
    pub fn new(min_interval: Duration, request_timeout: Duration) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            min_interval,
            last_dispatch: Mutex::new(None),
        })
    }

    /// The underlying HTTP client, for building requests.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Dispatch a request after waiting for a pacing slot.
    ///
    /// # Errors
    ///
    /// - [`ControlError::Meltdown`] if the controller answers with its
    ///   internal-fault status; the message is taken from the response body's
    ///   `message` field, falling back to [`MELTDOWN_FALLBACK`].
    /// - [`ControlError::Status`] for any other non-success status.
    /// - [`ControlError::Transport`] for network errors and timeouts.
    pub async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, ControlError> {
        self.pace().await;

        let response = self.http.execute(request).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        // The body is best-effort at this point; a read failure just means we
        // report the status without it.
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            let message = fault_message(&body);
            warn!("controller fault: {}", message);
            return Err(ControlError::Meltdown(message));
        }

        Err(ControlError::Status { status, body })
    }

    /// Wait until the minimum spacing since the previous dispatch has
    /// elapsed, then claim the slot.
    async fn pace(&self) {
        let mut last = self.last_dispatch.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!("pacing outbound request by {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Extract the server-supplied fault message, or the fixed fallback.
fn fault_message(body: &str) -> String {
    serde_json::from_str::<FaultBody>(body)
        .ok()
        .map(|fault| fault.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| MELTDOWN_FALLBACK.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_message_extraction() {
        assert_eq!(
            fault_message(r#"{ "message": "coolant pump failure" }"#),
            "coolant pump failure"
        );

        // Missing, empty, or non-JSON bodies all fall back
        assert_eq!(fault_message(""), MELTDOWN_FALLBACK);
        assert_eq!(fault_message(r#"{ "message": "" }"#), MELTDOWN_FALLBACK);
        assert_eq!(fault_message("<html>oops</html>"), MELTDOWN_FALLBACK);
        assert_eq!(fault_message(r#"{ "other": "field" }"#), MELTDOWN_FALLBACK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_enforces_spacing() {
        let limiter =
            TransportLimiter::new(Duration::from_millis(166), Duration::from_millis(3000))
                .unwrap();

        let start = Instant::now();
        limiter.pace().await;
        assert_eq!(start.elapsed(), Duration::ZERO); // First slot is free

        limiter.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(166));

        limiter.pace().await;
        assert!(start.elapsed() >= Duration::from_millis(332));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pace_skips_wait_after_idle_gap() {
        let limiter =
            TransportLimiter::new(Duration::from_millis(166), Duration::from_millis(3000))
                .unwrap();

        limiter.pace().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let before = Instant::now();
        limiter.pace().await;
        assert_eq!(before.elapsed(), Duration::ZERO); // Spacing already satisfied
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_serialize() {
        use std::sync::Arc;

        let limiter = Arc::new(
            TransportLimiter::new(Duration::from_millis(166), Duration::from_millis(3000))
                .unwrap(),
        );

        let start = Instant::now();
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                limiter.pace().await;
                start.elapsed()
            }));
        }

        let mut stamps: Vec<Duration> = Vec::new();
        for task in tasks {
            stamps.push(task.await.unwrap());
        }
        stamps.sort();

        // Three callers racing for slots still end up 166ms apart.
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(166));
        }
    }
}
