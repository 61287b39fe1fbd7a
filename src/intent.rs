//! Movement intent and input sources.
//!
//! [`MovementIntent`] is the per-step snapshot the controller acts on: a
//! movement vector, the jump button level and the wall-grab flag. Game code
//! may write it directly, or attach a [`MovementInput`] holding any
//! [`MovementInputSource`] (player input, a seek-to-target steering source,
//! a network feed). The source is sampled once at the start of every physics
//! step; after that the intent is read-only for the rest of the step.

use bevy::prelude::*;

/// Map a local input vector to a horizontal world vector.
///
/// `x` strafes right, `y` walks forward. Forward is world `-Z` rotated by
/// `frame_yaw` about world up.
pub fn input_to_world(input: Vec2, frame_yaw: f32) -> Vec3 {
    Quat::from_rotation_y(frame_yaw) * Vec3::new(input.x, 0.0, -input.y)
}

/// Inverse of [`input_to_world`], ignoring the vertical component.
pub fn world_to_input(world: Vec3, frame_yaw: f32) -> Vec2 {
    let local = Quat::from_rotation_y(-frame_yaw) * world;
    Vec2::new(local.x, -local.z)
}

fn sanitize(input: Vec2) -> Vec2 {
    if input.is_finite() {
        input.clamp_length_max(1.0)
    } else {
        Vec2::ZERO
    }
}

/// Movement intent of one ragdoll.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_ragdoll_controller::prelude::*;
///
/// let mut intent = MovementIntent::new();
/// intent.set_move(Vec2::new(0.0, 2.0));
/// assert_eq!(intent.move_input(), Vec2::Y);
///
/// intent.set_move(Vec2::new(f32::NAN, 1.0));
/// assert_eq!(intent.move_input(), Vec2::ZERO);
/// ```
#[derive(Component, Reflect, Debug, Clone, Default, PartialEq)]
#[reflect(Component)]
pub struct MovementIntent {
    move_input: Vec2,
    frame_yaw: f32,
    /// Jump button level. Set it every frame; the controller detects the
    /// rising edge itself.
    pub jump_pressed: bool,
    /// Previous step's `jump_pressed`, managed by the controller.
    pub(crate) jump_pressed_prev: bool,
    /// Wall-grab signal from the grab collaborator.
    pub wall_grabbing: bool,
}

impl MovementIntent {
    /// Zero intent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the movement vector. Clamped to unit length; non-finite input
    /// becomes zero.
    pub fn set_move(&mut self, input: Vec2) {
        self.move_input = sanitize(input);
    }

    /// Movement vector.
    pub fn move_input(&self) -> Vec2 {
        self.move_input
    }

    /// Length of the movement vector, in `[0, 1]`.
    pub fn input_magnitude(&self) -> f32 {
        self.move_input.length()
    }

    /// Set the yaw of the input reference frame (camera yaw, usually).
    pub fn set_frame_yaw(&mut self, yaw: f32) {
        if yaw.is_finite() {
            self.frame_yaw = yaw;
        }
    }

    /// Yaw of the input reference frame.
    pub fn frame_yaw(&self) -> f32 {
        self.frame_yaw
    }

    /// Set the jump button level.
    pub fn set_jump_pressed(&mut self, pressed: bool) {
        self.jump_pressed = pressed;
    }

    /// Jump button level.
    pub fn is_jump_pressed(&self) -> bool {
        self.jump_pressed
    }

    /// Set the wall-grab signal.
    pub fn set_wall_grabbing(&mut self, grabbing: bool) {
        self.wall_grabbing = grabbing;
    }

    /// Wall-grab signal.
    pub fn is_wall_grabbing(&self) -> bool {
        self.wall_grabbing
    }

    /// Clear the movement vector, the jump level and the grab flag.
    pub fn clear(&mut self) {
        self.move_input = Vec2::ZERO;
        self.jump_pressed = false;
        self.wall_grabbing = false;
    }

    /// World-space input direction and magnitude, `None` for no input.
    pub fn world_direction(&self) -> Option<(Vec3, f32)> {
        let world = input_to_world(self.move_input, self.frame_yaw);
        let magnitude = world.length();
        (magnitude > 1e-4).then(|| (world / magnitude, magnitude.min(1.0)))
    }

    /// Rising edge of the jump button since the previous call.
    ///
    /// Called once per step by the controller.
    pub fn take_jump_edge(&mut self) -> bool {
        let edge = self.jump_pressed && !self.jump_pressed_prev;
        self.jump_pressed_prev = self.jump_pressed;
        edge
    }

    /// Overwrite the intent with a sampled snapshot.
    pub fn apply_sample(&mut self, sample: InputSample) {
        self.set_move(sample.move_input);
        self.set_frame_yaw(sample.frame_yaw);
        self.jump_pressed = sample.jump_pressed;
        self.wall_grabbing = sample.wall_grabbing;
    }
}

/// One sample produced by an input source.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    /// Movement vector, `x` strafe and `y` forward.
    pub move_input: Vec2,
    /// Yaw of the frame `move_input` is expressed in.
    pub frame_yaw: f32,
    /// Jump button level.
    pub jump_pressed: bool,
    /// Wall-grab signal.
    pub wall_grabbing: bool,
}

/// What a source may look at when sampled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputContext {
    /// World position of the ragdoll root.
    pub root_position: Vec3,
    /// Linear velocity of the ragdoll root.
    pub root_velocity: Vec3,
    /// Fixed step length in seconds.
    pub dt: f32,
}

/// Anything that produces movement input for a ragdoll.
///
/// The controller never knows which implementation it is talking to.
pub trait MovementInputSource: Send + Sync + 'static {
    /// Produce this step's input.
    fn sample(&mut self, context: &InputContext) -> InputSample;

    /// Push an externally produced sample (device input, network).
    ///
    /// Sources that compute their own input ignore it.
    fn feed(&mut self, _sample: InputSample) {}
}

/// Source holding the last sample fed by game input code.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectInput {
    latest: InputSample,
}

impl DirectInput {
    /// Source starting at zero input.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MovementInputSource for DirectInput {
    fn sample(&mut self, _context: &InputContext) -> InputSample {
        self.latest
    }

    fn feed(&mut self, sample: InputSample) {
        self.latest = sample;
    }
}

/// Steers the ragdoll toward a world-space target on the ground plane.
///
/// Input fades linearly inside `slow_radius` and drops to zero inside
/// `arrive_radius`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekTargetInput {
    /// Target position. `None` produces zero input.
    pub target: Option<Vec3>,
    /// Distance at which the target counts as reached.
    pub arrive_radius: f32,
    /// Distance inside which input fades out.
    pub slow_radius: f32,
}

impl Default for SeekTargetInput {
    fn default() -> Self {
        Self {
            target: None,
            arrive_radius: 0.5,
            slow_radius: 1.5,
        }
    }
}

impl SeekTargetInput {
    /// Seek `target`.
    pub fn new(target: Vec3) -> Self {
        Self {
            target: Some(target),
            ..default()
        }
    }

    /// Change or clear the target.
    pub fn set_target(&mut self, target: Option<Vec3>) {
        self.target = target;
    }
}

impl MovementInputSource for SeekTargetInput {
    fn sample(&mut self, context: &InputContext) -> InputSample {
        let Some(target) = self.target.filter(|t| t.is_finite()) else {
            return InputSample::default();
        };
        let mut offset = target - context.root_position;
        offset.y = 0.0;
        let distance = offset.length();
        if !distance.is_finite() || distance <= self.arrive_radius {
            return InputSample::default();
        }

        let strength = if self.slow_radius > self.arrive_radius {
            ((distance - self.arrive_radius) / (self.slow_radius - self.arrive_radius)).min(1.0)
        } else {
            1.0
        };
        InputSample {
            move_input: world_to_input(offset / distance, 0.0) * strength,
            ..default()
        }
    }
}

/// Injected input source of one ragdoll.
///
/// Without this component the controller reads [`MovementIntent`] as game
/// code left it, which defaults to zero input.
#[derive(Component)]
pub struct MovementInput {
    source: Box<dyn MovementInputSource>,
}

impl MovementInput {
    /// Wrap a source.
    pub fn new(source: impl MovementInputSource) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Sample the wrapped source.
    pub fn sample(&mut self, context: &InputContext) -> InputSample {
        self.source.sample(context)
    }

    /// Forward a sample to the wrapped source.
    pub fn feed(&mut self, sample: InputSample) {
        self.source.feed(sample);
    }
}
