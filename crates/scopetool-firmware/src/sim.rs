//! In-memory instrument bench.
//!
//! Wires the real scheduler, lighting, and dispatcher to simulated motors,
//! switches, and clock, so protocol behaviour can be exercised without any
//! hardware: by this crate's tests, by host-side loopback tests, and when
//! poking at the instrument from a workstation.

use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

use scopetool_proto::Rgb;

use crate::{
	dispatch::Dispatcher,
	error::Result,
	hal::{Clock, Direction, Millis, Motors, PixelRing, StageLed, Switches},
	lighting::{self, Lighting, RING_PIXELS},
	stage::Stage,
};

#[derive(Debug)]
struct BenchState {
	/// Physical carriage position, in steps above the lower stop.
	z: i64,
	travel: i64,
	frames: Vec<[Rgb; RING_PIXELS]>,
	led_duty: u8,
}

/// Simulated stepper drivers. Z steps move the physical carriage, which the
/// simulated limit switches watch; A/B steps only spin.
#[derive(Clone)]
pub struct SimMotors(Rc<RefCell<BenchState>>);

impl Motors for SimMotors {
	fn step_a(&mut self, _direction: Direction) {}

	fn step_b(&mut self, _direction: Direction) {}

	fn step_z(&mut self, direction: Direction) {
		let mut state = self.0.borrow_mut();
		let delta = if direction == Direction::Forward { 1 } else { -1 };
		let travel = state.travel;
		state.z = (state.z + delta).clamp(0, travel);
	}
}

/// Simulated limit switches, asserted at the physical stops.
#[derive(Clone)]
pub struct SimSwitches(Rc<RefCell<BenchState>>);

impl Switches for SimSwitches {
	fn z_upper(&mut self) -> bool {
		let state = self.0.borrow();
		state.z >= state.travel
	}

	fn z_lower(&mut self) -> bool {
		self.0.borrow().z <= 0
	}
}

/// Simulated clock; time only advances when the bench is run or the homing
/// sequence sleeps.
#[derive(Clone)]
pub struct SimClock(Rc<Cell<Millis>>);

impl Clock for SimClock {
	fn now(&mut self) -> Millis {
		self.0.get()
	}

	fn sleep_ms(&mut self, millis: u64) {
		self.0.set(self.0.get() + millis);
	}
}

/// Simulated ring bus; records every flushed frame, already
/// brightness-scaled the way the pixel hardware scales.
#[derive(Clone)]
pub struct SimRing(Rc<RefCell<BenchState>>);

impl PixelRing for SimRing {
	fn show(&mut self, frame: &[Rgb; RING_PIXELS], brightness: u8) -> Result<()> {
		let mut out = [Rgb::default(); RING_PIXELS];
		for (slot, pixel) in out.iter_mut().zip(frame) {
			*slot = lighting::scale(*pixel, brightness);
		}
		self.0.borrow_mut().frames.push(out);
		Ok(())
	}
}

/// Simulated stage LED.
#[derive(Clone)]
pub struct SimLed(Rc<RefCell<BenchState>>);

impl StageLed for SimLed {
	fn set_duty(&mut self, value: u8) -> Result<()> {
		self.0.borrow_mut().led_duty = value;
		Ok(())
	}
}

/// A complete simulated instrument.
pub struct SimBench {
	pub stage: Stage<SimMotors, SimSwitches, SimClock>,
	pub lighting: Lighting<SimRing, SimLed>,
	pub dispatcher: Dispatcher,
	state: Rc<RefCell<BenchState>>,
	clock: Rc<Cell<Millis>>,
}

impl SimBench {
	/// Build a bench whose Z column has `travel` steps between the stops.
	/// The carriage starts parked mid-travel.
	pub fn new(travel: i64) -> Self {
		let state = Rc::new(RefCell::new(BenchState {
			z: travel / 2,
			travel,
			frames: Vec::new(),
			led_duty: 0,
		}));
		let clock = Rc::new(Cell::new(0));
		Self {
			stage: Stage::new(
				SimMotors(state.clone()),
				SimSwitches(state.clone()),
				SimClock(clock.clone()),
			),
			lighting: Lighting::new(SimRing(state.clone()), SimLed(state.clone())),
			dispatcher: Dispatcher::new(),
			state,
			clock,
		}
	}

	/// Feed one request line (newline appended) and collect the reply lines,
	/// trimmed of their endings.
	pub fn feed_line(&mut self, line: &str) -> Vec<String> {
		let mut reply = Vec::new();
		for byte in line.bytes().chain([b'\n']) {
			self.dispatcher
				.feed(byte, &mut self.stage, &mut self.lighting, &mut reply)
				.expect("writing to a Vec cannot fail");
		}
		String::from_utf8_lossy(&reply)
			.split("\r\n")
			.filter(|line| !line.is_empty())
			.map(str::to_owned)
			.collect()
	}

	/// Run the main loop for a stretch of simulated time, one tick per
	/// millisecond.
	pub fn run(&mut self, millis: u64) -> Result<()> {
		for _ in 0..millis {
			self.clock.set(self.clock.get() + 1);
			self.stage.tick();
			self.lighting.tick()?;
		}
		Ok(())
	}

	/// Physical carriage position, in steps above the lower stop.
	pub fn physical_z(&self) -> i64 {
		self.state.borrow().z
	}

	/// Number of frames flushed to the ring bus so far.
	pub fn ring_frames(&self) -> usize {
		self.state.borrow().frames.len()
	}

	/// The last frame flushed to the ring bus.
	pub fn last_frame(&self) -> Option<[Rgb; RING_PIXELS]> {
		self.state.borrow().frames.last().copied()
	}

	/// Current stage LED duty.
	pub fn led_duty(&self) -> u8 {
		self.state.borrow().led_duty
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_homing_ends_at_the_top_stop() {
		let mut bench = SimBench::new(640);
		bench.feed_line("calibrate");
		assert_eq!(bench.physical_z(), 640);
	}

	#[test]
	fn test_motion_tracks_the_physical_carriage() {
		let mut bench = SimBench::new(640);
		bench.feed_line("calibrate");
		bench.feed_line("z_move_to 100");
		bench.run(20_000).unwrap();
		assert_eq!(bench.physical_z(), 100);
	}

	#[test]
	fn test_ring_frame_content() {
		let mut bench = SimBench::new(64);
		bench.feed_line("set_ring_colour 0000ff");
		bench.run(1).unwrap();
		let frame = bench.last_frame().unwrap();
		assert!(frame.iter().all(|pixel| *pixel == Rgb::new(0, 0, 0xff)));
	}
}
