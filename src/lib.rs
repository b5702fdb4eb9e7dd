//! Reactor Connect: client-side session and control connectivity for a
//! remote thermal reactor simulator
//!
//! The remote controller owns the simulation; this crate owns the client:
//! it creates a session, polls status, and forwards operator control values,
//! while keeping the controller from being overwhelmed.
//!
//! # Architecture
//!
//! - **TransportLimiter**: paces every outbound request (one shared spacing
//!   gate, 166 ms minimum) and relabels controller faults as meltdown errors
//! - **SessionClient**: the three remote operations (create session, fetch
//!   status, push control) atop the limiter
//! - **SessionCoordinator**: the state machine — one live session, adaptive
//!   polling (200 ms while the operator is adjusting, 1000 ms otherwise),
//!   last-writer-wins control coalescing, and the meltdown latch
//!
//! Rendering is not this crate's job: consumers read
//! [`CoordinatorState`](status::CoordinatorState) from the coordinator's
//! watch channel and issue the two commands on
//! [`CoordinatorHandle`](coordinator::CoordinatorHandle).
//!
//! # Example
//!
//! ```rust,no_run
//! use reactor_connect::{ClientConfig, Control, SessionClient, SessionCoordinator};
//!
//! async fn example() -> Result<(), reactor_connect::ControlError> {
//!     let config = ClientConfig::for_endpoint("http://10.0.0.5:8888");
//!     let client = SessionClient::new(&config)?;
//!     let (handle, _task) = SessionCoordinator::spawn(client, config);
//!
//!     handle.start_new_session().await;
//!     handle.request_control_change(Control::InTap, 1.2).await?;
//!
//!     let mut updates = handle.subscribe();
//!     while updates.changed().await.is_ok() {
//!         let state = updates.borrow().clone();
//!         if let Some(status) = &state.status {
//!             println!("{}", status.message);
//!         }
//!         if state.meltdown {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod status;

pub use client::SessionClient;
pub use config::ClientConfig;
pub use coordinator::{CoordinatorHandle, SessionCoordinator};
pub use error::{ControlError, MELTDOWN_FALLBACK};
pub use limiter::TransportLimiter;
pub use status::{Control, ControlUpdate, CoordinatorState, SessionId, StatusSnapshot};
