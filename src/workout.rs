//! Workout session sequencing and ERG control.
//!
//! The [`WorkoutSequencer`] exclusively owns the [`WorkoutSession`] and
//! drives the trainer through the [`PowerTarget`] command surface only, so
//! it knows nothing about BLE. Observers read the session through a `watch`
//! channel; the one-second clock task is the only place wall-clock time
//! enters the model.

use std::{
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    connection::PowerTarget,
    types::{WorkoutSession, WorkoutStep},
};

/// Upper bound on any power command, in watts
///
/// Training plans occasionally carry garbage intensities; nothing above
/// this is ever sent to a trainer.
pub const MAX_TARGET_WATTS: u16 = 2000;

/// The power a step opens with, as a fraction of FTP
const fn initial_step_power(step: &WorkoutStep) -> f32 {
    match step {
        WorkoutStep::SteadyState { power, .. } => *power,
        WorkoutStep::IntervalsT { on_power, .. } | WorkoutStep::IntervalsP { on_power, .. } => {
            *on_power
        }
        WorkoutStep::Ramp { start_power, .. } | WorkoutStep::Pyramid { start_power, .. } => {
            *start_power
        }
        WorkoutStep::FreeRide {
            power_low,
            power_high,
            ..
        } => (*power_low + *power_high) / 2.0,
    }
}

/// Watts to issue when a step becomes active
///
/// Per step kind: `SteadyState` holds `power`, both interval kinds open in
/// their "on" phase, `Ramp` and `Pyramid` open at `start_power`, and
/// `FreeRide` targets the middle of its band. The FTP-relative fraction is
/// converted to whole watts and clamped to `0..=`[`MAX_TARGET_WATTS`].
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn target_watts(step: &WorkoutStep, ftp_watts: u16) -> u16 {
    let fraction = initial_step_power(step);
    let watts = (fraction * f32::from(ftp_watts)).round();
    watts.clamp(0.0, f32::from(MAX_TARGET_WATTS)) as u16
}

/// Sequencer for structured workout sessions
///
/// Created over any [`PowerTarget`]; in production that is the
/// [`ConnectionManager`](crate::ConnectionManager).
pub struct WorkoutSequencer {
    trainer: Arc<dyn PowerTarget>,
    session_tx: watch::Sender<Option<WorkoutSession>>,
    clock: Mutex<Option<JoinHandle<()>>>,
    ftp_watts: AtomicU16,
}

impl WorkoutSequencer {
    /// Create a sequencer driving the given trainer
    #[must_use]
    pub fn new(trainer: Arc<dyn PowerTarget>) -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            trainer,
            session_tx,
            clock: Mutex::new(None),
            ftp_watts: AtomicU16::new(0),
        }
    }

    /// Read-only observer of the current session
    ///
    /// Holds `None` between workouts. Every state change (tick, pause,
    /// skip, stop) is published here.
    #[must_use]
    pub fn session(&self) -> watch::Receiver<Option<WorkoutSession>> {
        self.session_tx.subscribe()
    }

    /// Snapshot of the current session, if one is running
    #[must_use]
    pub fn current_session(&self) -> Option<WorkoutSession> {
        self.session_tx.borrow().clone()
    }

    /// Start a workout over the given plan
    ///
    /// Creates a fresh session at step zero, immediately issues the target
    /// power for the first step, and starts the one-second clock. A running
    /// session is replaced. An empty plan is refused: no session is created
    /// and nothing is sent to the trainer.
    pub async fn start(&self, plan: Vec<WorkoutStep>, ftp_watts: u16) {
        if plan.is_empty() {
            warn!("Refusing to start a workout with an empty plan");
            return;
        }

        self.halt_clock().await;
        self.ftp_watts.store(ftp_watts, Ordering::Relaxed);

        let session = WorkoutSession::new(plan);
        let first_step = session.active_step().cloned();
        let total_steps = session.total_steps;
        self.session_tx.send_replace(Some(session));

        if let Some(step) = first_step {
            let watts = target_watts(&step, ftp_watts);
            if self.trainer.set_target_power(watts).await {
                info!(watts, total_steps, ftp_watts, "Workout started");
            } else {
                warn!(watts, "Trainer rejected the opening target power");
            }
        }

        let session_tx = self.session_tx.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // consume the immediate first tick
            loop {
                interval.tick().await;
                let mut session_gone = false;
                session_tx.send_if_modified(|session| match session {
                    Some(s) if s.is_active => {
                        if s.is_paused {
                            false
                        } else {
                            s.elapsed_time += 1;
                            true
                        }
                    }
                    _ => {
                        session_gone = true;
                        false
                    }
                });
                if session_gone {
                    break;
                }
            }
        });
        *self.clock.lock().await = Some(handle);
    }

    /// Hold the session clock
    ///
    /// Leaves `current_step` alone and issues no power command; the
    /// trainer keeps its last target until the caller decides otherwise.
    pub fn pause(&self) {
        self.session_tx.send_if_modified(|session| match session {
            Some(s) if s.is_active && !s.is_paused => {
                s.is_paused = true;
                debug!(elapsed = s.elapsed_time, "Workout paused");
                true
            }
            _ => false,
        });
    }

    /// Release a held session clock
    pub fn resume(&self) {
        self.session_tx.send_if_modified(|session| match session {
            Some(s) if s.is_active && s.is_paused => {
                s.is_paused = false;
                debug!(elapsed = s.elapsed_time, "Workout resumed");
                true
            }
            _ => false,
        });
    }

    /// End the workout and destroy the session
    ///
    /// Deliberately leaves the trainer at its last target; commanding it
    /// back to a resting resistance is the caller's decision.
    pub async fn stop(&self) {
        self.halt_clock().await;
        let had_session = self.session_tx.send_replace(None).is_some();
        if had_session {
            info!("Workout stopped");
        }
    }

    /// Advance to the next step of the plan
    ///
    /// The only step-advance operation; bounded by the end of the plan, so
    /// calling it on the final step changes nothing. Advancing recomputes
    /// and re-issues the target power for the new step.
    pub async fn skip_to_next_step(&self) {
        let mut entered_step = None;
        self.session_tx.send_if_modified(|session| {
            let Some(s) = session else { return false };
            if !s.is_active || !s.has_next_step() {
                return false;
            }
            s.current_step += 1;
            entered_step = s.active_step().cloned();
            debug!(step = s.current_step, of = s.total_steps, "Skipped to next step");
            true
        });

        if let Some(step) = entered_step {
            let watts = target_watts(&step, self.ftp_watts.load(Ordering::Relaxed));
            if !self.trainer.set_target_power(watts).await {
                warn!(watts, "Trainer rejected target power after skip");
            }
        }
    }

    async fn halt_clock(&self) {
        if let Some(handle) = self.clock.lock().await.take() {
            handle.abort();
        }
    }
}
