//! reactorctl: minimal console front-end for the reactor client
//!
//! Starts a session, follows coordinator state, and logs each snapshot until
//! meltdown or Ctrl-C. This is the stand-in for a real dashboard; everything
//! it consumes comes through the coordinator handle.

use anyhow::{bail, Context, Result};
use clap::Parser;
use reactor_connect::{
    logging::init_logging, ClientConfig, Control, CoordinatorState, SessionClient,
    SessionCoordinator,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "reactorctl", version, about = "Remote reactor session console")]
struct Args {
    /// Controller endpoint
    #[arg(long, default_value = "http://localhost:8888")]
    endpoint: String,

    /// Set the heater energy output once the session is live (0..=1)
    #[arg(long)]
    heater: Option<f64>,

    /// Set the inlet tap flow once the session is live (0..=2)
    #[arg(long)]
    in_tap: Option<f64>,

    /// Set the outlet tap flow once the session is live (0..=2)
    #[arg(long)]
    out_tap: Option<f64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let config = ClientConfig::for_endpoint(args.endpoint);
    let client = SessionClient::new(&config).context("building session client")?;
    let (handle, _task) = SessionCoordinator::spawn(client, config);

    let mut updates = handle.subscribe();
    handle.start_new_session().await;

    // Wait for the session to come up (or fail) before one-shot controls.
    loop {
        updates
            .changed()
            .await
            .context("coordinator stopped before session start")?;
        let state = updates.borrow().clone();
        if state.loading {
            continue;
        }
        match (&state.session, &state.error) {
            (Some(session), _) => {
                info!("session {} live", session);
                break;
            }
            (None, Some(err)) => bail!("session start failed: {err}"),
            (None, None) => {}
        }
    }

    for (control, value) in [
        (Control::Heater, args.heater),
        (Control::InTap, args.in_tap),
        (Control::OutTap, args.out_tap),
    ] {
        if let Some(value) = value {
            handle.request_control_change(control, value).await?;
            info!("requested {} = {}", control, value);
            // The coordinator keeps a single pending slot; wait for this
            // value to land before queueing the next flag, or a later flag
            // would overwrite it unsent.
            wait_until_applied(&mut updates, control, value).await;
        }
    }

    let mut last_error: Option<String> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                return Ok(());
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    bail!("coordinator task stopped unexpectedly");
                }
            }
        }

        let state = updates.borrow().clone();

        if let Some(status) = &state.status {
            info!(
                "t={:.0} {} | inner {:.1}C ({:.1}..{:.1}) | outer {:.1}C vol {:.1} | heater {:.2} in {:.2} out {:.2}",
                status.meta.total_time,
                status.message,
                status.readings.inner_tank.temperature,
                status.readings.inner_tank.minimum,
                status.readings.inner_tank.maximum,
                status.readings.outer_tank.temperature,
                status.readings.outer_tank.volume,
                status.controls.heater.energy_output,
                status.controls.in_tap.flow,
                status.controls.out_tap.flow,
            );
        }

        if state.meltdown {
            error!("{}", state.error.as_deref().unwrap_or("meltdown"));
            bail!("session melted down");
        }

        if state.error != last_error {
            if let Some(err) = &state.error {
                warn!("{err}");
            }
            last_error = state.error;
        }
    }
}

/// Wait until a snapshot reflects the pushed value (or give up after a
/// timeout, e.g. when the simulation settles the output elsewhere).
async fn wait_until_applied(
    updates: &mut watch::Receiver<CoordinatorState>,
    control: Control,
    value: f64,
) {
    let confirmed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if updates.changed().await.is_err() {
                return false;
            }
            let state = updates.borrow().clone();
            if state.meltdown {
                return false;
            }
            if let Some(status) = &state.status {
                if (status.control_output(control) - value).abs() < 1e-9 {
                    return true;
                }
            }
        }
    })
    .await
    .unwrap_or(false);

    if !confirmed {
        warn!("{} = {} not yet confirmed by the controller", control, value);
    }
}
