//! Wire and observable data model for the reactor controller
//!
//! Everything here mirrors the controller's JSON shapes. A [`StatusSnapshot`]
//! is immutable once received: a new poll replaces the previous snapshot
//! wholesale, it is never merged field-by-field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Opaque identifier for a server-side reactor simulation instance.
///
/// Exactly one session is live at a time; starting a new session discards the
/// previous id along with all pending control updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response body of `POST /sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionAck {
    pub id: SessionId,
}

/// Response body of a control push.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlAck {
    pub message: String,
}

/// One of the three operator-settable control channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Heater,
    InTap,
    OutTap,
}

impl Control {
    /// Wire name used in request paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Control::Heater => "heater",
            Control::InTap => "in_tap",
            Control::OutTap => "out_tap",
        }
    }

    /// Valid value range for this channel: heater output is a fraction,
    /// tap flow goes up to twice nominal.
    pub fn range(&self) -> RangeInclusive<f64> {
        match self {
            Control::Heater => 0.0..=1.0,
            Control::InTap | Control::OutTap => 0.0..=2.0,
        }
    }

    /// Whether `value` is inside this channel's valid range.
    pub fn accepts(&self, value: f64) -> bool {
        self.range().contains(&value) && value.is_finite()
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unsent control edit.
///
/// The coordinator holds at most ONE of these across all channels: a later
/// edit overwrites the slot regardless of which channel it targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlUpdate {
    pub control: Control,
    pub value: f64,
}

/// Simulation timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMeta {
    /// Total elapsed simulation time.
    pub total_time: f64,
    /// Time spent in a failed state; reaching the meltdown threshold is fatal.
    pub failed_state_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OuterTank {
    pub temperature: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerTank {
    pub temperature: f64,
    /// Safe operating bounds for the inner tank temperature.
    pub minimum: f64,
    pub maximum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TankReadings {
    pub outer_tank: OuterTank,
    pub inner_tank: InnerTank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaterState {
    pub energy_output: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TapState {
    pub flow: f64,
}

/// Current effective control outputs as reported by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlStates {
    pub heater: HeaterState,
    pub in_tap: TapState,
    pub out_tap: TapState,
}

/// One status poll result. Replaced, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub meta: StatusMeta,
    /// Human-readable status line from the controller.
    pub message: String,
    pub readings: TankReadings,
    pub controls: ControlStates,
}

impl StatusSnapshot {
    /// Reported output value for one control channel.
    pub fn control_output(&self, control: Control) -> f64 {
        match control {
            Control::Heater => self.controls.heater.energy_output,
            Control::InTap => self.controls.in_tap.flow,
            Control::OutTap => self.controls.out_tap.flow,
        }
    }
}

/// Observable coordinator state, published to the presentation layer.
///
/// This is the full contract an external consumer (dashboard, CLI) gets:
/// current session, latest snapshot, latest error message, the meltdown
/// latch, and whether session creation is in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorState {
    /// Current session, or `None` before the first successful start.
    pub session: Option<SessionId>,
    /// Latest successfully fetched snapshot; stale across transient errors.
    pub status: Option<StatusSnapshot>,
    /// Most recent error message, cleared by a successful fetch or restart.
    pub error: Option<String>,
    /// Monotonic within a session: once true, only a new session resets it.
    pub meltdown: bool,
    /// True only while session creation is in flight.
    pub loading: bool,
}
