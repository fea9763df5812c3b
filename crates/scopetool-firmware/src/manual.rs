//! Manual-control input providers.
//!
//! Instruments in the field carry different operator controls: a pair of
//! Z-jog buttons, a rotary encoder with an axis-select switch, or a
//! resistive touchscreen with jog regions. Each is normalized here into the
//! common [`ManualInput`] interface so the stage never knows which device
//! produced an event.

use crate::{
	hal::{Direction, InputPin, ManualEvent, ManualInput, Millis},
	stage::Axis,
};

/// Debounce window for the encoder's axis-select switch.
pub const SELECT_DEBOUNCE: Millis = 50;

/// Two active-low Z-jog buttons.
///
/// Up alone jogs Z up until release, down alone jogs down, both together
/// halt the axis. Releasing everything lets the stage's override
/// cancellation stop any leftover motion.
#[derive(Debug)]
pub struct ButtonPair<P> {
	up: P,
	down: P,
}

impl<P: InputPin> ButtonPair<P> {
	pub fn new(up: P, down: P) -> Self {
		Self { up, down }
	}
}

impl<P: InputPin> ManualInput for ButtonPair<P> {
	fn poll(&mut self, _now: Millis) -> Option<ManualEvent> {
		let up = !self.up.is_high();
		let down = !self.down.is_high();
		match (up, down) {
			(true, true) => Some(ManualEvent::Stop(Axis::Z)),
			(true, false) => Some(ManualEvent::Hold(Axis::Z, Direction::Forward)),
			(false, true) => Some(ManualEvent::Hold(Axis::Z, Direction::Backward)),
			(false, false) => None,
		}
	}
}

/// A quadrature rotary encoder with an integrated axis-select switch.
///
/// A debounced press on the switch cycles the selected axis X → Y → Z → X;
/// each clean quadrature edge nudges the selected axis by one step.
#[derive(Debug)]
pub struct RotaryEncoder<P> {
	clk: P,
	dat: P,
	select: P,
	axis: Axis,
	last_clk: bool,
	select_down_since: Option<Millis>,
	select_fired: bool,
}

impl<P: InputPin> RotaryEncoder<P> {
	pub fn new(mut clk: P, dat: P, select: P) -> Self {
		let last_clk = clk.is_high();
		Self {
			clk,
			dat,
			select,
			axis: Axis::X,
			last_clk,
			select_down_since: None,
			select_fired: false,
		}
	}

	/// The axis manual nudges currently apply to.
	pub fn selected_axis(&self) -> Axis {
		self.axis
	}
}

impl<P: InputPin> ManualInput for RotaryEncoder<P> {
	fn poll(&mut self, now: Millis) -> Option<ManualEvent> {
		// select switch is active-low; cycle once per debounced press
		if self.select.is_high() {
			self.select_down_since = None;
			self.select_fired = false;
		} else {
			let since = *self.select_down_since.get_or_insert(now);
			if !self.select_fired && now.saturating_sub(since) >= SELECT_DEBOUNCE {
				self.axis = self.axis.next();
				self.select_fired = true;
			}
		}

		// one nudge per falling clock edge, direction from the data line
		let clk = self.clk.is_high();
		let edge = self.last_clk && !clk;
		self.last_clk = clk;
		if edge {
			let delta = if self.dat.is_high() { 1 } else { -1 };
			return Some(ManualEvent::Nudge(self.axis, delta));
		}
		None
	}
}

/// A pressure sample from a touch panel, in panel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchSample {
	pub x: i32,
	pub y: i32,
	pub pressure: i32,
}

/// One touch region mapped to a per-axis jog.
#[derive(Debug, Clone, Copy)]
pub struct TouchRegion {
	pub x0: i32,
	pub x1: i32,
	pub y0: i32,
	pub y1: i32,
	pub axis: Axis,
	pub direction: Direction,
}

impl TouchRegion {
	fn contains(&self, sample: &TouchSample) -> bool {
		(self.x0..self.x1).contains(&sample.x) && (self.y0..self.y1).contains(&sample.y)
	}
}

/// Touchscreen jog regions over any sample source.
///
/// The panel hardware is outside this crate; the sampler returns the current
/// touch point, if any, and pressing a mapped region holds the axis in that
/// region's direction for as long as the touch persists.
pub struct TouchPad<F> {
	sample: F,
	regions: Vec<TouchRegion>,
	min_pressure: i32,
}

impl<F: FnMut() -> Option<TouchSample>> TouchPad<F> {
	pub fn new(sample: F, regions: Vec<TouchRegion>, min_pressure: i32) -> Self {
		Self { sample, regions, min_pressure }
	}
}

impl<F: FnMut() -> Option<TouchSample>> ManualInput for TouchPad<F> {
	fn poll(&mut self, _now: Millis) -> Option<ManualEvent> {
		let sample = (self.sample)()?;
		if sample.pressure < self.min_pressure {
			return None;
		}
		self.regions
			.iter()
			.find(|region| region.contains(&sample))
			.map(|region| ManualEvent::Hold(region.axis, region.direction))
	}
}
