//! SessionClient: thin remote operations against the reactor controller
//!
//! Three operations, one paced request each. Retry policy does not live
//! here; transient failures are the coordinator's problem.

use crate::config::ClientConfig;
use crate::error::ControlError;
use crate::limiter::TransportLimiter;
use crate::status::{Control, ControlAck, SessionAck, SessionId, StatusSnapshot};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// HTTP client for the remote controller.
///
/// All requests pass through the owned [`TransportLimiter`], so a
/// `SessionClient` shared across logical operations still dispatches at most
/// one request per spacing slot.
pub struct SessionClient {
    endpoint: String,
    limiter: TransportLimiter,
}

impl SessionClient {
    /// Build a client from a validated configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ControlError> {
        config.validate()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            limiter: TransportLimiter::new(config.min_request_interval, config.request_timeout)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Create a new reactor session.
    pub async fn create_session(&self) -> Result<SessionId, ControlError> {
        debug!("creating session at {}", self.endpoint);

        let request = self.limiter.http().post(self.url("/sessions")).build()?;
        let ack: SessionAck = self.limiter.send(request).await?.json().await?;

        debug!("session created: {}", ack.id);
        Ok(ack.id)
    }

    /// Fetch the current status snapshot for a session.
    pub async fn fetch_status(&self, session: &SessionId) -> Result<StatusSnapshot, ControlError> {
        let request = self
            .limiter
            .http()
            .get(self.url(&format!("/sessions/{}", session)))
            .build()?;

        let snapshot: StatusSnapshot = self.limiter.send(request).await?.json().await?;

        debug!(
            "status for {}: t={} failed={} \"{}\"",
            session, snapshot.meta.total_time, snapshot.meta.failed_state_time, snapshot.message
        );
        Ok(snapshot)
    }

    /// Push one control value. The body is the plain-text numeric value, as
    /// the controller expects.
    pub async fn push_control(
        &self,
        session: &SessionId,
        control: Control,
        value: f64,
    ) -> Result<ControlAck, ControlError> {
        debug!("pushing {} = {} for session {}", control, value, session);

        let request = self
            .limiter
            .http()
            .post(self.url(&format!("/sessions/{}/inputs/{}", session, control)))
            .header(CONTENT_TYPE, "text/plain")
            .body(value.to_string())
            .build()?;

        let ack: ControlAck = self.limiter.send(request).await?.json().await?;
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_strips_trailing_slash() {
        let config = ClientConfig::for_endpoint("http://localhost:8888/");
        let client = SessionClient::new(&config).unwrap();

        assert_eq!(client.url("/sessions"), "http://localhost:8888/sessions");
        assert_eq!(
            client.url(&format!(
                "/sessions/{}/inputs/{}",
                SessionId("abc".to_string()),
                Control::InTap
            )),
            "http://localhost:8888/sessions/abc/inputs/in_tap"
        );
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = ClientConfig::for_endpoint("");
        assert!(matches!(
            SessionClient::new(&config),
            Err(ControlError::InvalidConfig(_))
        ));
    }
}
