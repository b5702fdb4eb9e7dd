//! Client configuration and timing policy

use crate::error::ControlError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the reactor client and coordinator timing.
///
/// The defaults match the controller's expected pacing; most deployments only
/// need to set [`endpoint`](ClientConfig::endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the remote controller (e.g., "http://10.0.0.5:8888")
    pub endpoint: String,

    /// Per-request timeout.
    ///
    /// **Default:** 3000 ms
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,

    /// Minimum spacing between any two outbound requests, process-wide.
    ///
    /// Bounds the outbound rate to roughly six requests per second.
    ///
    /// **Default:** 166 ms
    #[serde(with = "duration_ms")]
    pub min_request_interval: Duration,

    /// Poll interval while the operator is idle.
    ///
    /// **Default:** 1000 ms
    #[serde(with = "duration_ms")]
    pub base_poll_interval: Duration,

    /// Poll interval while a control change happened recently.
    ///
    /// **Default:** 200 ms
    #[serde(with = "duration_ms")]
    pub active_poll_interval: Duration,

    /// How long after a control change the shortened poll interval applies.
    ///
    /// **Default:** 1000 ms
    #[serde(with = "duration_ms")]
    pub activity_window: Duration,

    /// Failed-state time (in controller time units) at or above which the
    /// session is considered melted down.
    ///
    /// **Default:** 120.0
    pub meltdown_threshold: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8888".to_string(),
            request_timeout: Duration::from_millis(3000),
            min_request_interval: Duration::from_millis(166),
            base_poll_interval: Duration::from_millis(1000),
            active_poll_interval: Duration::from_millis(200),
            activity_window: Duration::from_millis(1000),
            meltdown_threshold: 120.0,
        }
    }
}

impl ClientConfig {
    /// Create a config for the given controller endpoint, defaults elsewhere.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.endpoint.is_empty() {
            return Err(ControlError::InvalidConfig(
                "endpoint must not be empty".to_string(),
            ));
        }

        if self.min_request_interval.is_zero() {
            return Err(ControlError::InvalidConfig(
                "min_request_interval must be greater than zero".to_string(),
            ));
        }

        if self.active_poll_interval > self.base_poll_interval {
            return Err(ControlError::InvalidConfig(
                "active_poll_interval must not exceed base_poll_interval".to_string(),
            ));
        }

        if self.meltdown_threshold <= 0.0 {
            return Err(ControlError::InvalidConfig(
                "meltdown_threshold must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Serde helper: durations as integer milliseconds on the wire.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.min_request_interval, Duration::from_millis(166));
        assert_eq!(config.base_poll_interval, Duration::from_millis(1000));
        assert_eq!(config.active_poll_interval, Duration::from_millis(200));
        assert_eq!(config.activity_window, Duration::from_millis(1000));
        assert_eq!(config.meltdown_threshold, 120.0);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_endpoint() {
        let config = ClientConfig::for_endpoint("http://10.0.0.5:8888");

        assert_eq!(config.endpoint, "http://10.0.0.5:8888");
        assert_eq!(config.request_timeout, Duration::from_millis(3000)); // Default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = ClientConfig::default();

        config.endpoint = String::new();
        assert!(config.validate().is_err());
        config.endpoint = "http://localhost:8888".to_string(); // Reset

        config.min_request_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.min_request_interval = Duration::from_millis(166); // Reset

        config.active_poll_interval = Duration::from_millis(2000);
        assert!(config.validate().is_err());
        config.active_poll_interval = Duration::from_millis(200); // Reset

        config.meltdown_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrips_as_millis() {
        let config = ClientConfig::default();
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["min_request_interval"], 166);
        assert_eq!(json["base_poll_interval"], 1000);

        let back: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.base_poll_interval, Duration::from_millis(1000));
    }
}
