//! Cleaning mission protocol
//!
//! Drives the robot through a fixed phase sequence:
//!
//! ```text
//! Idle -> EnteringCommandMode -> TakingOff -> Cleaning -> Landing -> Completed
//!               |                   |                       |
//!               +-------------------+-----------------------+--> Failed(phase)
//! ```
//!
//! Each acknowledged phase is attempted exactly once. Any timeout, I/O error
//! or reply other than `ok` moves the machine straight to `Failed(phase)`;
//! later phases are never attempted, so a failed take-off does not issue a
//! landing command. Only one mission may be in flight at a time.

mod transport;

pub use transport::{MissionTransport, UdpTransport};

use crate::error::MissionError;
use crate::models::{MissionOutcome, MissionPhase, MissionRequest, MissionStatus};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

/// Acknowledgement expected for every command phase
pub const ACK_OK: &str = "ok";

/// Per-phase bounds on how long the controller waits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionTimeouts {
    pub command_mode: Duration,
    pub takeoff: Duration,
    pub landing: Duration,
    /// Fixed hold while the robot cleans; no acknowledgement is expected
    pub cleaning_hold: Duration,
}

impl Default for MissionTimeouts {
    fn default() -> Self {
        Self {
            command_mode: Duration::from_secs(5),
            takeoff: Duration::from_secs(10),
            landing: Duration::from_secs(10),
            cleaning_hold: Duration::from_secs(10),
        }
    }
}

impl MissionTimeouts {
    fn for_phase(&self, phase: MissionPhase) -> Duration {
        match phase {
            MissionPhase::CommandMode => self.command_mode,
            MissionPhase::Takeoff => self.takeoff,
            MissionPhase::Cleaning => self.cleaning_hold,
            MissionPhase::Landing => self.landing,
        }
    }
}

/// Mission state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "snake_case")]
pub enum MissionState {
    Idle,
    EnteringCommandMode,
    TakingOff,
    Cleaning,
    Landing,
    Completed,
    Failed(MissionPhase),
}

impl MissionState {
    /// Phase executed while in this state
    pub fn phase(&self) -> Option<MissionPhase> {
        match self {
            MissionState::EnteringCommandMode => Some(MissionPhase::CommandMode),
            MissionState::TakingOff => Some(MissionPhase::Takeoff),
            MissionState::Cleaning => Some(MissionPhase::Cleaning),
            MissionState::Landing => Some(MissionPhase::Landing),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionState::Completed | MissionState::Failed(_))
    }

    /// Transition after the current phase finished; `succeeded` is ignored
    /// outside an active phase
    pub fn next(self, succeeded: bool) -> MissionState {
        match (self, succeeded) {
            (MissionState::Idle, _) => MissionState::EnteringCommandMode,
            (MissionState::EnteringCommandMode, true) => MissionState::TakingOff,
            (MissionState::TakingOff, true) => MissionState::Cleaning,
            (MissionState::Cleaning, true) => MissionState::Landing,
            (MissionState::Landing, true) => MissionState::Completed,
            (state, false) => match state.phase() {
                Some(phase) => MissionState::Failed(phase),
                None => state,
            },
            (terminal, true) => terminal,
        }
    }

    /// Terminal status for a terminal state
    pub fn status(&self) -> Option<MissionStatus> {
        match self {
            MissionState::Completed => Some(MissionStatus::MissionSuccess),
            MissionState::Failed(phase) => Some(phase.failure_status()),
            _ => None,
        }
    }
}

/// Runs missions over an exclusively owned transport
pub struct MissionController {
    /// Held for the whole mission; `None` once the controller is shut down
    transport: Mutex<Option<Box<dyn MissionTransport>>>,
    timeouts: MissionTimeouts,
    state_tx: watch::Sender<MissionState>,
}

impl MissionController {
    pub fn new(transport: Box<dyn MissionTransport>, timeouts: MissionTimeouts) -> Self {
        let (state_tx, _) = watch::channel(MissionState::Idle);
        Self {
            transport: Mutex::new(Some(transport)),
            timeouts,
            state_tx,
        }
    }

    pub fn timeouts(&self) -> MissionTimeouts {
        self.timeouts
    }

    /// Most recent state; terminal states persist until the next mission
    pub fn state(&self) -> MissionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MissionState> {
        self.state_tx.subscribe()
    }

    /// True while a mission holds the transport
    pub fn is_busy(&self) -> bool {
        self.transport.try_lock().is_err()
    }

    /// Run one mission to a terminal state
    ///
    /// Refuses with [`MissionError::Busy`] if another mission is in flight
    /// rather than queueing behind it.
    pub async fn start_mission(
        &self,
        request: MissionRequest,
    ) -> Result<MissionOutcome, MissionError> {
        let guard = self.transport.try_lock().map_err(|_| {
            warn!(reason = %request.reason, "Mission rejected, another mission is in flight");
            MissionError::Busy
        })?;
        let transport = guard.as_deref().ok_or(MissionError::ShutDown)?;

        let started = Instant::now();
        info!(reason = %request.reason, "Starting cleaning mission");

        let mut state = MissionState::Idle.next(true);
        let mut phase_reached = MissionPhase::CommandMode;
        let mut detail = None;
        self.publish(state);

        while let Some(phase) = state.phase() {
            phase_reached = phase;
            let result = self.run_phase(transport, phase).await;
            if let Err(reason) = &result {
                warn!(phase = %phase, reason = %reason, "Mission phase failed");
                detail = Some(reason.clone());
            }
            state = state.next(result.is_ok());
            self.publish(state);
        }

        let status = state.status().unwrap_or(MissionStatus::SequenceFailure);
        let outcome = MissionOutcome {
            reason: request.reason,
            phase_reached,
            status,
            detail,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            reason = %outcome.reason,
            status = %outcome.status,
            phase = %outcome.phase_reached,
            duration_ms = outcome.duration_ms,
            "Cleaning mission finished"
        );

        Ok(outcome)
    }

    async fn run_phase(
        &self,
        transport: &dyn MissionTransport,
        phase: MissionPhase,
    ) -> Result<(), String> {
        let timeout = self.timeouts.for_phase(phase);
        let Some(command) = phase.command() else {
            info!(hold_secs = timeout.as_secs_f64(), "Robot cleaning, holding");
            tokio::time::sleep(timeout).await;
            return Ok(());
        };

        match transport.exchange(command, timeout).await {
            Ok(reply) if reply.trim() == ACK_OK => Ok(()),
            Ok(reply) => Err(format!("unexpected reply '{}' to '{}'", reply.trim(), command)),
            Err(e) => Err(e.to_string()),
        }
    }

    fn publish(&self, state: MissionState) {
        self.state_tx.send_replace(state);
    }

    /// Release the transport; waits for an in-flight mission to finish
    pub async fn shutdown(&self) {
        let released = self.transport.lock().await.take();
        if released.is_some() {
            info!("Robot command link released");
        }
    }
}
