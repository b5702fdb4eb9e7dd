//! SessionCoordinator: session lifecycle, adaptive polling, and control
//! coalescing
//!
//! The coordinator is a single background task that owns all mutable state.
//! Commands arrive over an mpsc channel and observable state goes out over a
//! watch channel, so commands and poll ticks interleave only at await points
//! and no lock ever guards coordinator state.
//!
//! State machine: `Idle` -> `Starting` -> `Active` -> `Meltdown`. Meltdown is
//! terminal for the session; only starting a new session leaves it.
//!
//! # Example
//!
//! ```rust,no_run
//! use reactor_connect::{ClientConfig, Control, SessionClient, SessionCoordinator};
//!
//! # async fn example() -> Result<(), reactor_connect::ControlError> {
//! let config = ClientConfig::for_endpoint("http://10.0.0.5:8888");
//! let client = SessionClient::new(&config)?;
//! let (handle, _task) = SessionCoordinator::spawn(client, config);
//!
//! handle.start_new_session().await;
//! handle.request_control_change(Control::Heater, 0.8).await?;
//!
//! let state = handle.state();
//! if state.meltdown {
//!     eprintln!("evacuate: {:?}", state.error);
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::SessionClient;
use crate::config::ClientConfig;
use crate::error::{ControlError, MELTDOWN_FALLBACK};
use crate::status::{Control, ControlUpdate, CoordinatorState, SessionId};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 32;

/// Commands accepted by the coordinator task.
#[derive(Debug)]
enum Command {
    StartNewSession,
    SetControl(ControlUpdate),
}

/// Tagged coordinator phase. The observable [`CoordinatorState`] is derived
/// from this plus the latest snapshot/error.
#[derive(Debug, Clone, PartialEq)]
enum Phase {
    /// No session. Nothing is scheduled.
    Idle,
    /// Session creation in flight.
    Starting,
    /// Live session, poll schedule running.
    Active(SessionId),
    /// Latched failure. No polling, no control submission.
    Meltdown,
}

/// Cloneable handle to a running coordinator task.
///
/// This is the full presentation-layer contract: two commands plus the
/// observable state.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<CoordinatorState>,
}

impl CoordinatorHandle {
    /// Start a new session, discarding the current one (if any) along with
    /// pending control updates, the error message, and the meltdown latch.
    ///
    /// Commands are processed strictly in order by the coordinator task, so
    /// concurrent calls serialize; the last one wins and at most one session
    /// is ever live.
    pub async fn start_new_session(&self) {
        // A send failure means the coordinator task is gone; the watch state
        // it left behind is still observable, so this degrades silently.
        let _ = self.commands.send(Command::StartNewSession).await;
    }

    /// Queue a control change for the next poll tick.
    ///
    /// Overwrites any not-yet-sent update, regardless of channel: bursts of
    /// edits within one tick coalesce into a single push of the most recent
    /// value. No-op unless a session is active and not melted down.
    ///
    /// # Errors
    ///
    /// [`ControlError::OutOfRange`] if `value` is outside the channel's valid
    /// range (heater 0..=1, taps 0..=2).
    pub async fn request_control_change(
        &self,
        control: Control,
        value: f64,
    ) -> Result<(), ControlError> {
        if !control.accepts(value) {
            return Err(ControlError::OutOfRange { control, value });
        }

        let _ = self
            .commands
            .send(Command::SetControl(ControlUpdate { control, value }))
            .await;
        Ok(())
    }

    /// Current observable state.
    pub fn state(&self) -> CoordinatorState {
        self.state.borrow().clone()
    }

    /// Subscribe to state changes. `recv.changed().await` wakes on every
    /// published update.
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorState> {
        self.state.clone()
    }
}

/// The coordinator task state. Constructed via [`SessionCoordinator::spawn`].
pub struct SessionCoordinator {
    client: SessionClient,
    config: ClientConfig,
    phase: Phase,
    /// Single pending slot across ALL channels: a later edit to any channel
    /// overwrites an unsent edit to another. This preserves the controller
    /// client's established last-writer-wins behavior; see DESIGN.md for the
    /// usability caveat.
    pending: Option<ControlUpdate>,
    /// End of the shortened-cadence window after a control change.
    active_until: Option<Instant>,
    /// Next scheduled poll tick; `None` outside `Active`.
    next_poll: Option<Instant>,
    observable: watch::Sender<CoordinatorState>,
    commands: mpsc::Receiver<Command>,
}

impl SessionCoordinator {
    /// Spawn the coordinator task and return its handle.
    ///
    /// The task exits when every handle clone has been dropped. Dropping the
    /// returned [`JoinHandle`] detaches the task without stopping it.
    pub fn spawn(
        client: SessionClient,
        config: ClientConfig,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(CoordinatorState::default());

        let coordinator = Self {
            client,
            config,
            phase: Phase::Idle,
            pending: None,
            active_until: None,
            next_poll: None,
            observable: state_tx,
            commands: command_rx,
        };

        let task = tokio::spawn(coordinator.run());

        (
            CoordinatorHandle {
                commands: command_tx,
                state: state_rx,
            },
            task,
        )
    }

    /// Command/tick dispatch loop.
    ///
    /// The poll deadline is recomputed on every iteration from the current
    /// phase and activity window, so a session change or meltdown never
    /// leaves an orphaned timer firing against stale state.
    async fn run(mut self) {
        loop {
            let poll_armed = self.next_poll.is_some();
            let deadline = self
                .next_poll
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::StartNewSession) => self.handle_start().await,
                        Some(Command::SetControl(update)) => self.handle_control(update),
                        None => {
                            debug!("all handles dropped, coordinator exiting");
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if poll_armed => {
                    self.tick().await;
                }
            }
        }
    }

    async fn handle_start(&mut self) {
        info!("starting new session");

        // Reset everything the old session owned before the new one exists:
        // a queued update from the old session must never reach the new one.
        self.pending = None;
        self.active_until = None;
        self.next_poll = None;
        self.phase = Phase::Starting;
        self.publish(|state| {
            state.meltdown = false;
            state.error = None;
            state.loading = true;
        });

        match self.client.create_session().await {
            Ok(session) => {
                info!("session {} live", session);
                self.phase = Phase::Active(session.clone());
                self.publish(|state| {
                    state.session = Some(session.clone());
                    state.error = None;
                });

                // Immediate fetch so consumers see a snapshot right away.
                // This can already latch meltdown.
                self.fetch_status(&session).await;

                if matches!(self.phase, Phase::Active(_)) {
                    self.schedule_next_poll();
                }
            }
            Err(err) => {
                warn!("session creation failed: {}", err);
                self.phase = Phase::Idle;
                self.publish(|state| {
                    state.session = None;
                    state.error = Some("Failed to create new session".to_string());
                });
            }
        }

        self.publish(|state| state.loading = false);
    }

    fn handle_control(&mut self, update: ControlUpdate) {
        if !matches!(self.phase, Phase::Active(_)) {
            debug!(
                "ignoring control change {} = {} in phase {:?}",
                update.control, update.value, self.phase
            );
            return;
        }

        self.pending = Some(update);
        self.active_until = Some(Instant::now() + self.config.activity_window);

        // Shorten the schedule to the active cadence, never postpone it:
        // edits arriving faster than the cadence must not starve the tick.
        let deadline = Instant::now() + self.config.active_poll_interval;
        self.next_poll = Some(match self.next_poll {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    /// One poll tick: fetch status, then drain the pending slot (if any)
    /// followed by an immediate re-fetch to reflect server-side effects.
    async fn tick(&mut self) {
        let Phase::Active(session) = self.phase.clone() else {
            self.next_poll = None;
            return;
        };

        self.fetch_status(&session).await;

        if matches!(self.phase, Phase::Active(_)) {
            if let Some(update) = self.pending.take() {
                self.push_control(&session, update).await;
            }
        }

        if matches!(self.phase, Phase::Active(_)) {
            self.schedule_next_poll();
        }
    }

    /// Fetch the latest snapshot into observable state.
    ///
    /// Transient failures keep the previous snapshot (stale but visible) and
    /// only replace the error message; a server-signaled fault or a
    /// failed-state time at the threshold latches meltdown.
    async fn fetch_status(&mut self, session: &SessionId) {
        match self.client.fetch_status(session).await {
            Ok(snapshot) => {
                let failed_time = snapshot.meta.failed_state_time;
                self.publish(move |state| {
                    state.status = Some(snapshot);
                    state.error = None;
                });

                if failed_time >= self.config.meltdown_threshold {
                    self.enter_meltdown(MELTDOWN_FALLBACK.to_string());
                }
            }
            Err(err) if err.is_meltdown() => self.enter_meltdown(err.to_string()),
            Err(err) => {
                warn!("status fetch failed for {}: {}", session, err);
                self.publish(|state| {
                    state.error = Some("Failed to fetch system status".to_string());
                });
            }
        }
    }

    async fn push_control(&mut self, session: &SessionId, update: ControlUpdate) {
        match self
            .client
            .push_control(session, update.control, update.value)
            .await
        {
            Ok(ack) => {
                debug!("control {} acknowledged: {}", update.control, ack.message);
                self.fetch_status(session).await;
            }
            Err(err) if err.is_meltdown() => self.enter_meltdown(err.to_string()),
            Err(err) => {
                warn!("control push {} failed: {}", update.control, err);
                self.publish(|state| {
                    state.error = Some(format!("Failed to update {}", update.control));
                });
            }
        }
    }

    /// Latch the terminal failure state. Only a new session leaves it.
    fn enter_meltdown(&mut self, message: String) {
        error!("meltdown latched: {}", message);

        self.phase = Phase::Meltdown;
        self.pending = None;
        self.active_until = None;
        self.next_poll = None;
        self.publish(|state| {
            state.meltdown = true;
            state.error = Some(message);
        });
    }

    fn schedule_next_poll(&mut self) {
        self.next_poll = Some(Instant::now() + self.current_interval());
    }

    /// 200 ms while inside the activity window, 1000 ms otherwise.
    fn current_interval(&self) -> Duration {
        match self.active_until {
            Some(until) if Instant::now() < until => self.config.active_poll_interval,
            _ => self.config.base_poll_interval,
        }
    }

    fn publish(&self, update: impl FnOnce(&mut CoordinatorState)) {
        self.observable.send_modify(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_coordinator() -> (SessionCoordinator, watch::Receiver<CoordinatorState>) {
        let config = ClientConfig::default();
        let client = SessionClient::new(&config).unwrap();
        let (state_tx, state_rx) = watch::channel(CoordinatorState::default());
        let (_command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);

        (
            SessionCoordinator {
                client,
                config,
                phase: Phase::Idle,
                pending: None,
                active_until: None,
                next_poll: None,
                observable: state_tx,
                commands: command_rx,
            },
            state_rx,
        )
    }

    fn heater(value: f64) -> ControlUpdate {
        ControlUpdate {
            control: Control::Heater,
            value,
        }
    }

    #[tokio::test]
    async fn test_control_change_ignored_outside_active() {
        let (mut coordinator, _state) = test_coordinator();

        coordinator.handle_control(heater(0.5));
        assert!(coordinator.pending.is_none());

        coordinator.phase = Phase::Meltdown;
        coordinator.handle_control(heater(0.5));
        assert!(coordinator.pending.is_none());
    }

    #[tokio::test]
    async fn test_pending_slot_coalesces_across_channels() {
        let (mut coordinator, _state) = test_coordinator();
        coordinator.phase = Phase::Active(SessionId("s1".to_string()));

        coordinator.handle_control(heater(0.3));
        coordinator.handle_control(ControlUpdate {
            control: Control::InTap,
            value: 1.5,
        });

        // Later edit overwrote the heater edit entirely.
        assert_eq!(
            coordinator.pending,
            Some(ControlUpdate {
                control: Control::InTap,
                value: 1.5,
            })
        );
    }

    #[tokio::test]
    async fn test_control_change_shortens_cadence() {
        let (mut coordinator, _state) = test_coordinator();
        coordinator.phase = Phase::Active(SessionId("s1".to_string()));

        assert_eq!(coordinator.current_interval(), Duration::from_millis(1000));

        coordinator.handle_control(heater(0.5));
        assert_eq!(coordinator.current_interval(), Duration::from_millis(200));
        assert!(coordinator.next_poll.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_edits_do_not_postpone_the_tick() {
        let (mut coordinator, _state) = test_coordinator();
        coordinator.phase = Phase::Active(SessionId("s1".to_string()));

        coordinator.handle_control(heater(0.1));
        let scheduled = coordinator.next_poll.expect("tick scheduled");

        // Edits faster than the cadence keep the already-scheduled deadline.
        for value in [0.2, 0.3, 0.4] {
            tokio::time::sleep(Duration::from_millis(50)).await;
            coordinator.handle_control(heater(value));
            assert_eq!(coordinator.next_poll, Some(scheduled));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_reverts_after_activity_window() {
        let (mut coordinator, _state) = test_coordinator();
        coordinator.phase = Phase::Active(SessionId("s1".to_string()));
        coordinator.handle_control(heater(0.5));

        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert_eq!(coordinator.current_interval(), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_meltdown_latch_clears_schedule_and_pending() {
        let (mut coordinator, state) = test_coordinator();
        coordinator.phase = Phase::Active(SessionId("s1".to_string()));
        coordinator.handle_control(heater(0.9));

        coordinator.enter_meltdown(MELTDOWN_FALLBACK.to_string());

        assert_eq!(coordinator.phase, Phase::Meltdown);
        assert!(coordinator.pending.is_none());
        assert!(coordinator.next_poll.is_none());

        let observed = state.borrow().clone();
        assert!(observed.meltdown);
        assert_eq!(observed.error.as_deref(), Some(MELTDOWN_FALLBACK));
    }

    #[tokio::test]
    async fn test_out_of_range_rejected_at_handle() {
        let config = ClientConfig::default();
        let client = SessionClient::new(&config).unwrap();
        let (handle, task) = SessionCoordinator::spawn(client, config);

        let result = handle.request_control_change(Control::Heater, 1.5).await;
        assert!(matches!(
            result,
            Err(ControlError::OutOfRange {
                control: Control::Heater,
                ..
            })
        ));

        drop(handle);
        task.await.unwrap();
    }
}
