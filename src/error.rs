//! Error types for the reactor-connect crate

use crate::status::Control;
use thiserror::Error;

/// Fallback message used when the controller reports a fault without a body.
pub const MELTDOWN_FALLBACK: &str = "CORE MELTDOWN IMMINENT, EVACUATE";

#[derive(Error, Debug)]
pub enum ControlError {
    /// Network-level failure (connection refused, DNS, request timeout).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status other than the controller's fault status.
    #[error("unexpected status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// The controller answered with its internal-fault status. The message is
    /// the server-supplied one, or [`MELTDOWN_FALLBACK`] if none was given.
    #[error("{0}")]
    Meltdown(String),

    /// Client configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Control value rejected before queueing; see [`Control::range`].
    #[error("value {value} out of range for control {control}")]
    OutOfRange { control: Control, value: f64 },
}

impl ControlError {
    /// Whether this error is fatal to the session (latches meltdown) as
    /// opposed to a transient failure the next poll tick absorbs.
    pub fn is_meltdown(&self) -> bool {
        matches!(self, ControlError::Meltdown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meltdown_discriminator() {
        let err = ControlError::Meltdown(MELTDOWN_FALLBACK.to_string());
        assert!(err.is_meltdown());
        assert_eq!(err.to_string(), "CORE MELTDOWN IMMINENT, EVACUATE");

        let err = ControlError::Status {
            status: reqwest::StatusCode::NOT_FOUND,
            body: "no such session".to_string(),
        };
        assert!(!err.is_meltdown());
    }

    #[test]
    fn test_out_of_range_message() {
        let err = ControlError::OutOfRange {
            control: Control::Heater,
            value: 1.5,
        };
        assert_eq!(
            err.to_string(),
            "value 1.5 out of range for control heater"
        );
    }
}
