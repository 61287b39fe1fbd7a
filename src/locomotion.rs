//! Locomotion state machine.
//!
//! Four states gate what the force applicator and gait generator may do:
//!
//! ```text
//!            input > deadzone              grounded lost
//! Standing ───────────────────▶ Moving ───────────────────▶ Airborne
//!    ▲  ◀─────────────────────    │                            │
//!    │      input ≤ deadzone      │ grounded lost              │ grounded again
//!    │                            ▼                            │ (by input)
//!    └─────── recovered ──── Fallen ◀── balance reports fall ──┘ (from any)
//! ```
//!
//! The machine also owns the jump latch (a buffered one-shot request armed on
//! the rising edge of the jump button) and the climb flag.

use std::time::Duration;

use bevy::log::debug;
use bevy::prelude::*;

use crate::config::MovementConfig;

/// Discrete locomotion state.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LocomotionState {
    /// On the ground without movement input.
    #[default]
    Standing,
    /// On the ground with movement input.
    Moving,
    /// No foot touches the ground.
    Airborne,
    /// Balance lost; actuation is suspended until recovery.
    Fallen,
}

impl LocomotionState {
    /// States from which a jump may fire.
    pub fn allows_jump(self) -> bool {
        matches!(self, Self::Standing | Self::Moving)
    }
}

/// Per-step inputs of the state machine.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct LocomotionSignals {
    /// Fused ground flag.
    pub grounded: bool,
    /// Fallen flag from the balance controller.
    pub fallen: bool,
    /// Magnitude of the movement input.
    pub input_magnitude: f32,
    /// Jump button went from released to pressed this step.
    pub jump_edge: bool,
    /// External wall-grab signal.
    pub wall_grabbing: bool,
}

/// Pending jump press with a buffer timer.
///
/// The request expires when the timer finishes. A zero buffer keeps the
/// request alive for the step it was armed in only.
#[derive(Reflect, Debug, Clone, Default)]
pub struct JumpRequest {
    /// When finished, the request expires.
    #[reflect(ignore)]
    pub buffer_timer: Timer,
}

impl JumpRequest {
    /// Request valid for `buffer_time` seconds after the current step.
    pub fn new(buffer_time: f32) -> Self {
        Self {
            buffer_timer: Timer::from_seconds(buffer_time.max(0.0), TimerMode::Once),
        }
    }

    /// Advance the buffer timer.
    pub fn tick(&mut self, delta: Duration) {
        self.buffer_timer.tick(delta);
    }

    /// Whether the request has not expired.
    pub fn is_valid(&self) -> bool {
        !self.buffer_timer.finished()
    }
}

/// Locomotion state of one ragdoll.
///
/// # Example
///
/// ```rust
/// use msg_ragdoll_controller::prelude::*;
///
/// let config = MovementConfig::default();
/// let mut fsm = LocomotionStateMachine::default();
///
/// fsm.step(LocomotionSignals { grounded: true, input_magnitude: 1.0, ..Default::default() }, 1.0 / 60.0, &config);
/// assert_eq!(fsm.state(), LocomotionState::Moving);
///
/// fsm.step(LocomotionSignals { grounded: false, input_magnitude: 1.0, ..Default::default() }, 1.0 / 60.0, &config);
/// assert_eq!(fsm.state(), LocomotionState::Airborne);
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct LocomotionStateMachine {
    state: LocomotionState,
    previous: LocomotionState,
    time_in_state: f32,
    jump_request: Option<JumpRequest>,
    jumped_this_step: bool,
    climb_active: bool,
    forced: Option<LocomotionState>,
}

impl LocomotionStateMachine {
    /// Start in `Standing`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> LocomotionState {
        self.state
    }

    /// State before the most recent transition.
    pub fn previous(&self) -> LocomotionState {
        self.previous
    }

    /// Seconds spent in the current state.
    pub fn time_in_state(&self) -> f32 {
        self.time_in_state
    }

    /// Whether climbing is active this step.
    pub fn climb_active(&self) -> bool {
        self.climb_active
    }

    /// Whether a jump press is waiting to fire.
    pub fn has_pending_jump(&self) -> bool {
        self.jump_request.as_ref().is_some_and(JumpRequest::is_valid)
    }

    /// Whether a jump fired during the current step.
    pub fn jumped_this_step(&self) -> bool {
        self.jumped_this_step
    }

    /// Pin the state (`Some`) or return to signal-driven transitions (`None`).
    pub fn force_state(&mut self, state: Option<LocomotionState>) {
        self.forced = state;
        if let Some(state) = state {
            self.enter(state);
        }
    }

    /// The pinned state, if any.
    pub fn forced_state(&self) -> Option<LocomotionState> {
        self.forced
    }

    /// Where `current` goes given `signals`.
    pub fn next_state(
        current: LocomotionState,
        signals: &LocomotionSignals,
        deadzone: f32,
    ) -> LocomotionState {
        use LocomotionState::*;

        if signals.fallen {
            return Fallen;
        }
        let wants_to_move = signals.input_magnitude > deadzone;
        match current {
            Fallen => Standing,
            Standing | Moving | Airborne if !signals.grounded => Airborne,
            _ if wants_to_move => Moving,
            _ => Standing,
        }
    }

    /// Advance one step. Returns `(from, to)` when the state changed.
    pub fn step(
        &mut self,
        signals: LocomotionSignals,
        dt: f32,
        config: &MovementConfig,
    ) -> Option<(LocomotionState, LocomotionState)> {
        self.jumped_this_step = false;

        if let Some(request) = self.jump_request.as_mut() {
            request.tick(Duration::from_secs_f32(dt.max(0.0)));
            if !request.is_valid() {
                self.jump_request = None;
            }
        }
        if signals.jump_edge {
            self.jump_request = Some(JumpRequest::new(config.jump_buffer_time));
        }

        let from = self.state;
        let to = self
            .forced
            .unwrap_or_else(|| Self::next_state(from, &signals, config.input_deadzone));

        self.climb_active = signals.wall_grabbing && to != LocomotionState::Fallen;

        if to == from {
            self.time_in_state += dt;
            return None;
        }
        self.enter(to);
        debug!("locomotion {:?} -> {:?}", from, to);
        Some((from, to))
    }

    fn enter(&mut self, state: LocomotionState) {
        if state != self.state {
            self.previous = self.state;
            self.state = state;
            self.time_in_state = 0.0;
        }
    }

    /// Whether a jump may fire right now.
    pub fn can_jump(&self, grounded: bool) -> bool {
        grounded && self.state.allows_jump()
    }

    /// Whether ground locomotion force may be applied right now.
    pub fn allows_locomotion(&self, grounded: bool) -> bool {
        grounded && matches!(self.state, LocomotionState::Standing | LocomotionState::Moving)
    }

    /// Consume the pending jump if it may fire.
    ///
    /// Returns `true` exactly once per accepted press. A refused request stays
    /// pending until its buffer expires.
    pub fn try_consume_jump(&mut self, grounded: bool) -> bool {
        if !self.has_pending_jump() || !self.can_jump(grounded) {
            return false;
        }
        self.jump_request = None;
        self.jumped_this_step = true;
        true
    }

    /// Back to `Standing` with no pending jump. The forced state is kept.
    pub fn reset(&mut self) {
        *self = Self {
            forced: self.forced,
            state: self.forced.unwrap_or_default(),
            ..Self::default()
        };
    }
}
