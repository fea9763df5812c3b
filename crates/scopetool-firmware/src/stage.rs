//! The three-axis stage scheduler.
//!
//! The stage advances each axis towards its target without blocking: the
//! main loop calls [`Stage::tick`] on every iteration and at most one step
//! per axis group (Z, XY) is emitted per tick, rate-limited by the per-group
//! step interval. Manual inputs are arbitrated first, then limit switches,
//! then the motion step, in that order within a tick.

use scopetool_proto::ProtoError;
use tracing::{debug, info, instrument, trace};

use crate::hal::{Clock, Direction, ManualEvent, ManualInput, Millis, Motors, Switches};

/// Default minimum interval between steps on an axis group, in milliseconds.
pub const DEFAULT_STEP_INTERVAL: Millis = 15;

/// Step interval used by the homing sequence.
pub const HOMING_STEP_INTERVAL: Millis = 3;

/// How far ahead of the current position a held jog input sets the target.
///
/// Large enough that the axis keeps running between polls; the release
/// cancellation pulls the target back the moment the input goes idle.
pub const MANUAL_RUN_STEPS: i64 = 1000;

/// One of the three motion axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
	X,
	Y,
	Z,
}

impl Axis {
	pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

	/// The next axis in manual-selection order (X → Y → Z → X).
	pub fn next(self) -> Self {
		match self {
			Self::X => Self::Y,
			Self::Y => Self::Z,
			Self::Z => Self::X,
		}
	}

	const fn index(self) -> usize {
		match self {
			Self::X => 0,
			Self::Y => 1,
			Self::Z => 2,
		}
	}
}

/// Failures from position-checked stage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
	/// Absolute positions are meaningless before homing has established the
	/// origin and travel length.
	#[error("stage is not calibrated")]
	NotCalibrated,

	/// The requested absolute position is outside `[0, length]`.
	#[error("position {position} outside travel 0..={length}")]
	OutOfRange { position: i64, length: i64 },
}

impl From<StageError> for ProtoError {
	fn from(err: StageError) -> Self {
		match err {
			StageError::NotCalibrated => Self::NotCalibrated,
			StageError::OutOfRange { .. } => Self::PositionOutOfRange,
		}
	}
}

/// Per-axis motion state, owned and mutated exclusively by the stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisState {
	position: i64,
	target: i64,
	length: i64,
}

impl AxisState {
	pub fn position(&self) -> i64 {
		self.position
	}

	pub fn target(&self) -> i64 {
		self.target
	}

	/// Travel length in steps; only meaningful after calibration.
	pub fn length(&self) -> i64 {
		self.length
	}

	pub fn distance_to_go(&self) -> i64 {
		self.target - self.position
	}

	fn stop(&mut self) {
		self.target = self.position;
	}
}

/// Step rate limiter for one axis group.
#[derive(Debug, Clone, Copy)]
struct StepClock {
	last_step: Millis,
	interval: Millis,
}

impl StepClock {
	fn new(interval: Millis) -> Self {
		Self { last_step: 0, interval }
	}

	fn due(&self, now: Millis) -> bool {
		now.saturating_sub(self.last_step) >= self.interval
	}

	fn mark(&mut self, now: Millis) {
		self.last_step = now;
	}
}

/// The stage scheduler.
///
/// Owns all three [`AxisState`]s and the manual-override latches; everything
/// mutates through [`Stage::tick`], the move methods, and
/// [`Stage::calibrate`].
pub struct Stage<M, S, C> {
	axes: [AxisState; 3],
	z_clock: StepClock,
	xy_clock: StepClock,
	calibrated: bool,
	overridden: [bool; 3],
	motors: M,
	switches: S,
	clock: C,
	inputs: Vec<Box<dyn ManualInput>>,
}

impl<M: Motors, S: Switches, C: Clock> Stage<M, S, C> {
	pub fn new(motors: M, switches: S, clock: C) -> Self {
		Self {
			axes: [AxisState::default(); 3],
			z_clock: StepClock::new(DEFAULT_STEP_INTERVAL),
			xy_clock: StepClock::new(DEFAULT_STEP_INTERVAL),
			calibrated: false,
			overridden: [false; 3],
			motors,
			switches,
			clock,
			inputs: Vec::new(),
		}
	}

	/// Attach a manual input device, polled on every tick.
	pub fn with_input(mut self, input: impl ManualInput + 'static) -> Self {
		self.inputs.push(Box::new(input));
		self
	}

	pub fn axis(&self, axis: Axis) -> &AxisState {
		&self.axes[axis.index()]
	}

	pub fn is_calibrated(&self) -> bool {
		self.calibrated
	}

	/// Move an axis by a signed number of steps from where it currently is.
	///
	/// Allowed before calibration; relative motion needs no origin.
	pub fn move_rel(&mut self, axis: Axis, steps: i64) {
		let state = &mut self.axes[axis.index()];
		state.target = state.position + steps;
	}

	/// Move an axis to an absolute position within the calibrated travel.
	pub fn move_to(&mut self, axis: Axis, position: i64) -> Result<(), StageError> {
		if !self.calibrated {
			return Err(StageError::NotCalibrated);
		}
		let state = &mut self.axes[axis.index()];
		if position < 0 || position > state.length {
			return Err(StageError::OutOfRange { position, length: state.length });
		}
		state.target = position;
		Ok(())
	}

	/// Absolute position of an axis. Fails before calibration.
	pub fn position(&self, axis: Axis) -> Result<i64, StageError> {
		if !self.calibrated {
			return Err(StageError::NotCalibrated);
		}
		Ok(self.axes[axis.index()].position)
	}

	pub fn distance_to_go(&self, axis: Axis) -> i64 {
		self.axes[axis.index()].distance_to_go()
	}

	pub fn length(&self, axis: Axis) -> i64 {
		self.axes[axis.index()].length
	}

	/// Advance the stage by one scheduler tick.
	///
	/// Order within a tick: manual arbitration, limit enforcement, at most
	/// one Z step, at most one XY dispatch. A host command that lands
	/// between ticks and a manual input asserted on the same tick are not
	/// prioritized against each other; the manual path simply runs first.
	pub fn tick(&mut self) {
		let now = self.clock.now();
		self.poll_manual(now);
		self.enforce_limits();
		self.step_z(now);
		self.step_xy(now);
	}

	fn poll_manual(&mut self, now: Millis) {
		let mut engaged = [false; 3];
		let mut inputs = std::mem::take(&mut self.inputs);
		for input in &mut inputs {
			match input.poll(now) {
				Some(ManualEvent::Hold(axis, direction)) => {
					engaged[axis.index()] = true;
					self.overridden[axis.index()] = true;
					let state = &mut self.axes[axis.index()];
					state.target = state.position
						+ match direction {
							Direction::Forward => MANUAL_RUN_STEPS,
							Direction::Backward => -MANUAL_RUN_STEPS,
						};
				}
				Some(ManualEvent::Stop(axis)) => {
					engaged[axis.index()] = true;
					self.overridden[axis.index()] = true;
					self.axes[axis.index()].stop();
				}
				Some(ManualEvent::Nudge(axis, delta)) => {
					// behaves like a host-issued relative move: no latch,
					// so it is not cancelled on the next idle tick
					self.axes[axis.index()].target += delta;
				}
				None => {}
			}
		}
		self.inputs = inputs;

		for axis in Axis::ALL {
			if self.overridden[axis.index()] && !engaged[axis.index()] {
				// release cancellation: one-shot, so a host command issued
				// after the release is left alone
				self.overridden[axis.index()] = false;
				self.axes[axis.index()].stop();
				trace!(?axis, "manual override released, motion cancelled");
			}
		}
	}

	fn enforce_limits(&mut self) {
		let z = &mut self.axes[Axis::Z.index()];
		if z.distance_to_go() > 0 && self.switches.z_upper() {
			z.stop();
		}
		if z.distance_to_go() < 0 && self.switches.z_lower() {
			z.stop();
		}
	}

	fn step_z(&mut self, now: Millis) {
		if !self.z_clock.due(now) {
			return;
		}
		let delta = self.axes[Axis::Z.index()].distance_to_go().signum();
		if delta == 0 {
			return;
		}
		self.motors.step_z(if delta > 0 { Direction::Forward } else { Direction::Backward });
		self.axes[Axis::Z.index()].position += delta;
		self.z_clock.mark(now);
	}

	fn step_xy(&mut self, now: Millis) {
		if !self.xy_clock.due(now) {
			return;
		}
		let dx = self.axes[Axis::X.index()].distance_to_go().signum();
		let dy = self.axes[Axis::Y.index()].distance_to_go().signum();
		use Direction::{Backward, Forward};
		match (dx, dy) {
			(0, 0) => return,
			(1, 1) => self.motors.step_a(Forward),
			(1, -1) => self.motors.step_b(Forward),
			(-1, 1) => self.motors.step_b(Backward),
			(-1, -1) => self.motors.step_a(Backward),
			(0, 1) => {
				self.motors.step_a(Forward);
				self.motors.step_b(Backward);
			}
			(0, -1) => {
				self.motors.step_a(Backward);
				self.motors.step_b(Forward);
			}
			(1, 0) => {
				self.motors.step_a(Forward);
				self.motors.step_b(Forward);
			}
			(-1, 0) => {
				self.motors.step_a(Backward);
				self.motors.step_b(Backward);
			}
			_ => unreachable!("signum is in -1..=1"),
		}
		self.axes[Axis::X.index()].position += dx;
		self.axes[Axis::Y.index()].position += dy;
		self.xy_clock.mark(now);
	}

	/// Run the Z homing sequence.
	///
	/// Drives Z down to the lower limit, declares that position 0, drives up
	/// to the upper limit, and records the travel as the axis length. This
	/// blocks the caller until both limits have been found, which on the
	/// instrument means command parsing and all other motion are frozen.
	#[instrument(level = "debug", skip(self))]
	pub fn calibrate(&mut self) {
		info!("homing Z axis");
		self.axes[Axis::Z.index()].stop();

		while !self.switches.z_lower() {
			self.motors.step_z(Direction::Backward);
			self.clock.sleep_ms(HOMING_STEP_INTERVAL);
		}
		self.axes[Axis::Z.index()].position = 0;
		self.axes[Axis::Z.index()].target = 0;

		let mut travel = 0;
		while !self.switches.z_upper() {
			self.motors.step_z(Direction::Forward);
			travel += 1;
			self.clock.sleep_ms(HOMING_STEP_INTERVAL);
		}
		let z = &mut self.axes[Axis::Z.index()];
		z.position = travel;
		z.target = travel;
		z.length = travel;
		self.calibrated = true;
		debug!(travel, "homing complete");
	}
}

#[cfg(test)]
mod tests {
	use std::{
		cell::RefCell,
		collections::VecDeque,
		rc::Rc,
	};

	use super::*;

	/// Records emitted steps; Z steps also move a shared "physical"
	/// carriage so the limit switches can react to motion.
	#[derive(Debug, Default)]
	struct Recorded {
		a: Vec<Direction>,
		b: Vec<Direction>,
		z: Vec<Direction>,
		z_phys: i64,
		travel: i64,
	}

	#[derive(Clone)]
	struct TestRig(Rc<RefCell<Recorded>>);

	impl TestRig {
		fn new(travel: i64) -> Self {
			Self(Rc::new(RefCell::new(Recorded { travel, ..Default::default() })))
		}
	}

	impl Motors for TestRig {
		fn step_a(&mut self, direction: Direction) {
			self.0.borrow_mut().a.push(direction);
		}

		fn step_b(&mut self, direction: Direction) {
			self.0.borrow_mut().b.push(direction);
		}

		fn step_z(&mut self, direction: Direction) {
			let mut state = self.0.borrow_mut();
			state.z.push(direction);
			let delta = if direction == Direction::Forward { 1 } else { -1 };
			state.z_phys = (state.z_phys + delta).clamp(0, state.travel);
		}
	}

	impl Switches for TestRig {
		fn z_upper(&mut self) -> bool {
			let state = self.0.borrow();
			state.z_phys >= state.travel
		}

		fn z_lower(&mut self) -> bool {
			self.0.borrow().z_phys <= 0
		}
	}

	/// Clock that advances one millisecond per query and jumps over sleeps.
	#[derive(Debug, Default)]
	struct TickClock(Millis);

	impl Clock for TickClock {
		fn now(&mut self) -> Millis {
			self.0 += 1;
			self.0
		}

		fn sleep_ms(&mut self, millis: u64) {
			self.0 += millis;
		}
	}

	struct Script(VecDeque<Option<ManualEvent>>);

	impl ManualInput for Script {
		fn poll(&mut self, _now: Millis) -> Option<ManualEvent> {
			self.0.pop_front().flatten()
		}
	}

	fn stage(travel: i64) -> (Stage<TestRig, TestRig, TickClock>, TestRig) {
		let rig = TestRig::new(travel);
		// park the carriage mid-travel so no switch is asserted
		rig.0.borrow_mut().z_phys = travel / 2;
		(Stage::new(rig.clone(), rig.clone(), TickClock::default()), rig)
	}

	#[test]
	fn test_position_changes_by_at_most_one_step_per_tick() {
		let (mut stage, _rig) = stage(10_000);
		stage.move_rel(Axis::Z, 500);
		let mut previous = stage.axis(Axis::Z).position();
		for _ in 0..200 {
			stage.tick();
			let position = stage.axis(Axis::Z).position();
			assert!((position - previous).abs() <= 1);
			previous = position;
		}
	}

	#[test]
	fn test_step_rate_is_capped_by_the_interval() {
		let (mut stage, rig) = stage(1_000_000);
		stage.move_rel(Axis::Z, 100_000);
		// 300 ticks at 1 ms each
		for _ in 0..300 {
			stage.tick();
		}
		let steps = rig.0.borrow().z.len() as u64;
		assert!(steps <= 300 / DEFAULT_STEP_INTERVAL + 1, "{steps} steps");
		assert!(steps >= 300 / DEFAULT_STEP_INTERVAL - 1, "{steps} steps");
	}

	#[test]
	fn test_upper_limit_cancels_forward_motion() {
		let (mut stage, rig) = stage(100);
		rig.0.borrow_mut().z_phys = 100; // already at the top stop
		stage.move_rel(Axis::Z, 10);
		stage.tick();
		assert_eq!(stage.axis(Axis::Z).target(), stage.axis(Axis::Z).position());
		assert!(rig.0.borrow().z.is_empty());
	}

	#[test]
	fn test_lower_limit_still_allows_upward_motion() {
		let (mut stage, rig) = stage(100);
		rig.0.borrow_mut().z_phys = 0;
		stage.move_rel(Axis::Z, 5);
		for _ in 0..200 {
			stage.tick();
		}
		assert_eq!(stage.axis(Axis::Z).position(), 5);
		assert_eq!(rig.0.borrow().z.len(), 5);
	}

	#[test]
	fn test_corexy_dispatch_table() {
		use Direction::{Backward, Forward};
		// (dx, dy, a steps, b steps)
		let cases: [(i64, i64, &[Direction], &[Direction]); 8] = [
			(1, 1, &[Forward], &[]),
			(1, -1, &[], &[Forward]),
			(-1, 1, &[], &[Backward]),
			(-1, -1, &[Backward], &[]),
			(0, 1, &[Forward], &[Backward]),
			(0, -1, &[Backward], &[Forward]),
			(1, 0, &[Forward], &[Forward]),
			(-1, 0, &[Backward], &[Backward]),
		];
		for (dx, dy, a, b) in cases {
			let (mut stage, rig) = stage(10_000);
			stage.move_rel(Axis::X, dx);
			stage.move_rel(Axis::Y, dy);
			for _ in 0..DEFAULT_STEP_INTERVAL + 1 {
				stage.tick();
			}
			let state = rig.0.borrow();
			assert_eq!(state.a.as_slice(), a, "dx={dx} dy={dy}");
			assert_eq!(state.b.as_slice(), b, "dx={dx} dy={dy}");
			drop(state);
			// positions advance one step along each commanded axis
			assert_eq!(stage.axis(Axis::X).position().signum(), dx);
			assert_eq!(stage.axis(Axis::Y).position().signum(), dy);
		}
	}

	#[test]
	fn test_xy_moves_complete_and_return() {
		let (mut stage, _rig) = stage(10_000);
		stage.move_rel(Axis::X, 3);
		stage.move_rel(Axis::Y, -2);
		for _ in 0..200 {
			stage.tick();
		}
		assert_eq!(stage.axis(Axis::X).position(), 3);
		assert_eq!(stage.axis(Axis::Y).position(), -2);
		stage.move_rel(Axis::X, -3);
		stage.move_rel(Axis::Y, 2);
		for _ in 0..200 {
			stage.tick();
		}
		assert_eq!(stage.axis(Axis::X).position(), 0);
		assert_eq!(stage.axis(Axis::Y).position(), 0);
	}

	#[test]
	fn test_manual_release_cancels_host_motion() {
		let (mut stage, _rig) = stage(10_000);
		// host command in flight
		stage.move_rel(Axis::Z, 300);
		// held for two ticks, then released
		let script = Script(VecDeque::from([
			Some(ManualEvent::Hold(Axis::Z, Direction::Forward)),
			Some(ManualEvent::Hold(Axis::Z, Direction::Forward)),
			None,
		]));
		let mut stage = stage.with_input(script);
		stage.tick();
		assert_eq!(stage.distance_to_go(Axis::Z), MANUAL_RUN_STEPS);
		stage.tick();
		// release tick: outstanding motion is cancelled exactly once
		stage.tick();
		assert_eq!(stage.distance_to_go(Axis::Z), 0);
		// a later host command is left alone
		stage.move_rel(Axis::Z, 40);
		stage.tick();
		assert_ne!(stage.distance_to_go(Axis::Z), 0);
	}

	#[test]
	fn test_manual_stop_halts_axis() {
		let (mut stage, _rig) = stage(10_000);
		stage.move_rel(Axis::Z, 300);
		let script = Script(VecDeque::from([Some(ManualEvent::Stop(Axis::Z))]));
		let mut stage = stage.with_input(script);
		stage.tick();
		assert_eq!(stage.distance_to_go(Axis::Z), 0);
	}

	#[test]
	fn test_nudge_is_not_cancelled_on_idle() {
		let (mut stage, _rig) = stage(10_000);
		let script = Script(VecDeque::from([Some(ManualEvent::Nudge(Axis::Y, 1)), None, None]));
		let mut stage = stage.with_input(script);
		stage.tick();
		for _ in 0..50 {
			stage.tick();
		}
		assert_eq!(stage.axis(Axis::Y).position(), 1);
	}

	#[test]
	fn test_absolute_moves_require_calibration() {
		let (mut stage, _rig) = stage(200);
		assert_eq!(stage.move_to(Axis::Z, 50), Err(StageError::NotCalibrated));
		assert_eq!(stage.position(Axis::Z), Err(StageError::NotCalibrated));
		stage.calibrate();
		assert!(stage.is_calibrated());
		assert_eq!(stage.move_to(Axis::Z, 50), Ok(()));
	}

	#[test]
	fn test_calibrate_measures_travel_and_parks_at_top() {
		let (mut stage, rig) = stage(250);
		stage.calibrate();
		assert_eq!(stage.length(Axis::Z), 250);
		assert_eq!(stage.position(Axis::Z), Ok(250));
		assert_eq!(stage.distance_to_go(Axis::Z), 0);
		assert!(rig.0.borrow().z_phys >= 250);
	}

	#[test]
	fn test_move_to_range_check() {
		let (mut stage, _rig) = stage(200);
		stage.calibrate();
		assert_eq!(
			stage.move_to(Axis::Z, 201),
			Err(StageError::OutOfRange { position: 201, length: 200 })
		);
		assert_eq!(
			stage.move_to(Axis::Z, -1),
			Err(StageError::OutOfRange { position: -1, length: 200 })
		);
		assert_eq!(stage.move_to(Axis::Z, 0), Ok(()));
		assert_eq!(stage.move_to(Axis::Z, 200), Ok(()));
	}
}
