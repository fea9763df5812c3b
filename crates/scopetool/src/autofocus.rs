//! The autofocus engine.
//!
//! Two-phase search over the one-dimensional focus-score function: a coarse
//! sweep down from the top of the travel finds the neighbourhood of the
//! peak, then a bisecting fine-tune narrows in on it. Every scored capture
//! is appended to a plain-text log for offline inspection.

use std::{
	fs::File,
	io::{BufWriter, Write},
	path::Path,
};

use tracing::{debug, info, instrument, warn};

use crate::{
	capture::{Capture, CaptureError},
	client::{ClientError, SerialClient},
	focus::focus_score,
	grey::greyscale,
};

/// File name of the focus-score log, one `<index>\t<score>` line per sample.
pub const FOCUS_LOG_NAME: &str = "focusingdata.txt";

/// Number of captures in the coarse sweep.
pub const SWEEP_IMAGES: u32 = 10;

/// Extra minimum-step passes required before declaring convergence.
pub const MAX_CONFIRMATIONS: u32 = 2;

/// Default required relative improvement for a probe to beat the current
/// maximum: a probe wins when `score ≥ (2 − ratio) × max`, so 0.99 demands
/// a 1% improvement.
pub const DEFAULT_IMPROVEMENT_RATIO: f64 = 0.99;

/// Step size used by each focus-hold re-tune.
pub const HOLD_STEP: i64 = 40;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FocusError {
	#[error(transparent)]
	#[diagnostic(transparent)]
	Client(#[from] ClientError),

	#[error(transparent)]
	#[diagnostic(transparent)]
	Capture(#[from] CaptureError),

	#[error("could not write the focus log")]
	Log(#[source] std::io::Error),
}

/// Search step sizes, set by the objective fitted to the microscope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Objective {
	pub initial_step: i64,
	pub min_step: i64,
}

impl Objective {
	pub const X4: Self = Self { initial_step: 560, min_step: 5 };
	pub const X10: Self = Self { initial_step: 100, min_step: 2 };
	pub const X40: Self = Self { initial_step: 20, min_step: 1 };
	pub const X100: Self = Self { initial_step: 5, min_step: 1 };

	/// Fallback for unrecognised objective names.
	pub const UNKNOWN: Self = Self { initial_step: 560, min_step: 10 };

	pub fn from_name(name: &str) -> Self {
		match name {
			"4x" => Self::X4,
			"10x" => Self::X10,
			"40x" => Self::X40,
			"100x" => Self::X100,
			_ => {
				warn!(objective = name, "objective not recognised, using default step sizes");
				Self::UNKNOWN
			}
		}
	}
}

/// What the search needs from the instrument: Z motion and scored captures.
///
/// The live implementation is [`LiveScope`]; tests drive the search over
/// synthetic score curves instead.
pub trait Scope {
	fn move_by(&mut self, steps: i64) -> Result<(), FocusError>;
	fn move_to(&mut self, position: i64) -> Result<(), FocusError>;
	fn wait_idle(&mut self) -> Result<(), FocusError>;
	fn position(&mut self) -> Result<i64, FocusError>;
	fn length(&mut self) -> Result<i64, FocusError>;
	/// Capture a still at the current position and return its focus score.
	fn capture_score(&mut self, index: u32) -> Result<f64, FocusError>;
}

/// The real instrument: serial client, camera, and metric glued together.
pub struct LiveScope<P> {
	pub client: SerialClient<P>,
	pub capture: Capture,
	pub keep_images: bool,
}

impl<P: std::io::Read + std::io::Write> Scope for LiveScope<P> {
	fn move_by(&mut self, steps: i64) -> Result<(), FocusError> {
		Ok(self.client.z_move(steps)?)
	}

	fn move_to(&mut self, position: i64) -> Result<(), FocusError> {
		Ok(self.client.z_move_to(position)?)
	}

	fn wait_idle(&mut self) -> Result<(), FocusError> {
		Ok(self.client.wait_for_motion()?)
	}

	fn position(&mut self) -> Result<i64, FocusError> {
		Ok(self.client.z_position()?)
	}

	fn length(&mut self) -> Result<i64, FocusError> {
		Ok(self.client.z_length()?)
	}

	fn capture_score(&mut self, index: u32) -> Result<f64, FocusError> {
		let image = self.capture.take(index)?;
		let score = focus_score(&greyscale(&image));
		if !self.keep_images {
			self.capture.remove(index);
		}
		Ok(score)
	}
}

/// One scored capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusSample {
	pub index: u32,
	pub position: i64,
	pub score: f64,
}

/// The best sample seen so far. Replaced on ties, so of equally sharp
/// positions the one seen last wins.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FocusMaximum {
	pub score: f64,
	pub position: i64,
	pub index: u32,
}

/// Sweep, fine-tune, and characterization loops over a [`Scope`].
pub struct Autofocus<S> {
	scope: S,
	step: i64,
	min_step: i64,
	improvement_ratio: f64,
	max_confirmations: u32,
	sweep_images: u32,
	index: u32,
	max: FocusMaximum,
	log: Option<BufWriter<File>>,
}

impl<S: Scope> Autofocus<S> {
	pub fn new(scope: S, objective: Objective) -> Self {
		Self {
			scope,
			step: objective.initial_step,
			min_step: objective.min_step,
			improvement_ratio: DEFAULT_IMPROVEMENT_RATIO,
			max_confirmations: MAX_CONFIRMATIONS,
			sweep_images: SWEEP_IMAGES,
			index: 0,
			max: FocusMaximum::default(),
			log: None,
		}
	}

	/// Append samples to `focusingdata.txt` in this directory.
	pub fn with_log(mut self, dir: &Path) -> Result<Self, FocusError> {
		let file = File::create(dir.join(FOCUS_LOG_NAME)).map_err(FocusError::Log)?;
		self.log = Some(BufWriter::new(file));
		Ok(self)
	}

	/// Tune how much better a probe must score to win; see
	/// [`DEFAULT_IMPROVEMENT_RATIO`].
	pub fn with_improvement_ratio(mut self, ratio: f64) -> Self {
		self.improvement_ratio = ratio;
		self
	}

	pub fn scope_mut(&mut self) -> &mut S {
		&mut self.scope
	}

	pub fn step(&self) -> i64 {
		self.step
	}

	pub fn set_step(&mut self, step: i64) {
		self.step = step;
	}

	pub fn maximum(&self) -> FocusMaximum {
		self.max
	}

	/// Capture and score at the current position, log it, and fold it into
	/// the running maximum.
	fn sample(&mut self) -> Result<FocusSample, FocusError> {
		let position = self.scope.position()?;
		let score = self.scope.capture_score(self.index)?;
		let sample = FocusSample { index: self.index, position, score };
		if let Some(log) = &mut self.log {
			writeln!(log, "{}\t{}", sample.index, sample.score).map_err(FocusError::Log)?;
			log.flush().map_err(FocusError::Log)?;
		}
		if score >= self.max.score {
			self.max = FocusMaximum { score, position, index: self.index };
		}
		self.index += 1;
		Ok(sample)
	}

	/// Coarse phase: capture-and-descend from the current (typically top)
	/// position, a fixed number of times.
	#[instrument(level = "debug", skip(self))]
	pub fn sweep(&mut self) -> Result<FocusMaximum, FocusError> {
		info!(images = self.sweep_images, step = self.step, "executing sweep");
		for _ in 0..self.sweep_images {
			let sample = self.sample()?;
			debug!(index = sample.index, position = sample.position, score = sample.score, "sweep sample");
			self.scope.move_by(-self.step)?;
			self.scope.wait_idle()?;
		}
		Ok(self.max)
	}

	/// Fine phase: bisecting search around the current position.
	///
	/// Each round captures a centre sample, probes one step to the
	/// preferred side, and on failure probes the opposite side of the
	/// centre; a probe wins by scoring at least `(2 − ratio) ×` the centre.
	/// Direction changes halve the step; when neither side wins, the stage
	/// returns to the best centre and re-checks, forcing a final pass at
	/// the minimum step before declaring convergence.
	#[instrument(level = "debug", skip(self))]
	pub fn fine_tune(&mut self) -> Result<FocusSample, FocusError> {
		// explicit state for what is naturally a tail recursion
		let mut upward = true;
		let mut kept_direction = true;
		let mut confirmations = 0;

		loop {
			if !kept_direction && self.step > self.min_step {
				self.step /= 2;
			}
			if self.step <= self.min_step {
				self.step = self.min_step;
			}

			let centre = self.sample()?;
			let threshold = (2.0 - self.improvement_ratio) * centre.score;
			debug!(
				position = centre.position,
				score = centre.score,
				step = self.step,
				"fine-tune centre"
			);

			// probe the preferred side first
			self.move_and_settle(if upward { self.step } else { -self.step })?;
			let near = self.sample()?;
			if near.score >= threshold {
				kept_direction = true;
				continue;
			}

			// then the far side of the centre
			self.move_and_settle(if upward { -2 * self.step } else { 2 * self.step })?;
			let far = self.sample()?;
			if far.score >= threshold {
				upward = !upward;
				kept_direction = false;
				continue;
			}

			// neither side improved: go back to the centre
			self.scope.move_to(centre.position)?;
			self.scope.wait_idle()?;

			if self.step <= self.min_step {
				info!(position = centre.position, score = centre.score, "fine-tune converged");
				return Ok(centre);
			}
			if confirmations >= self.max_confirmations {
				// one last look at minimum step
				self.step = self.min_step;
			}
			confirmations += 1;
			upward = !upward;
			kept_direction = false;
		}
	}

	/// The complete autofocus: from the top of the travel, sweep, return to
	/// the sweep maximum, halve the step, fine-tune.
	#[instrument(level = "debug", skip(self))]
	pub fn full(&mut self) -> Result<FocusSample, FocusError> {
		let length = self.scope.length()?;
		self.scope.move_to(length)?;
		self.scope.wait_idle()?;

		self.sweep()?;
		let max = self.max;
		info!(position = max.position, index = max.index, "sweep maximum");
		self.scope.move_to(max.position)?;
		self.scope.wait_idle()?;

		self.step /= 2;
		self.fine_tune()
	}

	/// Characterization run: equally spaced samples over the whole travel,
	/// top to bottom, logged for offline analysis. Not part of closed-loop
	/// control.
	#[instrument(level = "debug", skip(self))]
	pub fn test_run(&mut self, images: u32) -> Result<(), FocusError> {
		let length = self.scope.length()?;
		let step = -(length / images as i64);
		info!(images, step, "executing test run");
		for _ in 0..images {
			self.sample()?;
			self.scope.move_by(step)?;
			self.scope.wait_idle()?;
		}
		Ok(())
	}

	fn move_and_settle(&mut self, steps: i64) -> Result<(), FocusError> {
		self.scope.move_by(steps)?;
		self.scope.wait_idle()
	}
}

#[cfg(test)]
mod tests {
	use std::fs;

	use super::*;

	/// A scope over a synthetic score curve: motion is instant and capture
	/// just evaluates the curve at the current position.
	struct CurveScope {
		position: i64,
		length: i64,
		curve: Box<dyn Fn(i64) -> f64>,
		captured_at: Vec<i64>,
	}

	impl CurveScope {
		fn new(length: i64, start: i64, curve: impl Fn(i64) -> f64 + 'static) -> Self {
			Self {
				position: start,
				length,
				curve: Box::new(curve),
				captured_at: Vec::new(),
			}
		}
	}

	impl Scope for CurveScope {
		fn move_by(&mut self, steps: i64) -> Result<(), FocusError> {
			self.position += steps;
			Ok(())
		}

		fn move_to(&mut self, position: i64) -> Result<(), FocusError> {
			self.position = position;
			Ok(())
		}

		fn wait_idle(&mut self) -> Result<(), FocusError> {
			Ok(())
		}

		fn position(&mut self) -> Result<i64, FocusError> {
			Ok(self.position)
		}

		fn length(&mut self) -> Result<i64, FocusError> {
			Ok(self.length)
		}

		fn capture_score(&mut self, _index: u32) -> Result<f64, FocusError> {
			self.captured_at.push(self.position);
			Ok((self.curve)(self.position))
		}
	}

	fn peaked(peak: i64) -> impl Fn(i64) -> f64 {
		move |z| 1e6 / (1.0 + ((z - peak) as f64).powi(2))
	}

	#[test]
	fn test_objective_table() {
		assert_eq!(Objective::from_name("4x"), Objective { initial_step: 560, min_step: 5 });
		assert_eq!(Objective::from_name("10x"), Objective { initial_step: 100, min_step: 2 });
		assert_eq!(Objective::from_name("40x"), Objective { initial_step: 20, min_step: 1 });
		assert_eq!(Objective::from_name("100x"), Objective { initial_step: 5, min_step: 1 });
		assert_eq!(Objective::from_name("63x"), Objective::UNKNOWN);
	}

	#[test]
	fn test_sweep_finds_the_coarse_maximum() {
		let scope = CurveScope::new(1000, 1000, peaked(500));
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 100, min_step: 1 });
		let max = autofocus.sweep().unwrap();
		assert_eq!(max.position, 500);
		assert_eq!(max.index, 5);
		// ten captures, descending from the top in even steps
		assert_eq!(
			autofocus.scope_mut().captured_at,
			(0..10).map(|i| 1000 - 100 * i).collect::<Vec<_>>()
		);
	}

	#[test]
	fn test_maximum_replaces_on_ties() {
		let scope = CurveScope::new(1000, 1000, |_| 7.5);
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 100, min_step: 1 });
		autofocus.sweep().unwrap();
		assert_eq!(autofocus.maximum().index, 9);
	}

	#[test]
	fn test_fine_tune_converges_to_a_nearby_peak() {
		// peak 37 steps above the start, as seen through a sharp unimodal
		// curve; initial step 100, minimum step 1
		let scope = CurveScope::new(10_000, 500, peaked(537));
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 100, min_step: 1 });
		let best = autofocus.fine_tune().unwrap();
		assert!((best.position - 537).abs() <= 1, "converged to {}", best.position);
		assert_eq!(autofocus.scope_mut().position, best.position);
		// bounded work: a handful of captures per halving plus confirmations
		let captures = autofocus.scope_mut().captured_at.len();
		assert!(captures <= 60, "{captures} captures");
	}

	#[test]
	fn test_fine_tune_converges_downward_too() {
		let scope = CurveScope::new(10_000, 700, peaked(655));
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 64, min_step: 1 });
		let best = autofocus.fine_tune().unwrap();
		assert!((best.position - 655).abs() <= 1, "converged to {}", best.position);
	}

	#[test]
	fn test_full_run_lands_on_the_peak() {
		let scope = CurveScope::new(2000, 0, peaked(1237));
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 200, min_step: 1 });
		let best = autofocus.full().unwrap();
		assert!((best.position - 1237).abs() <= 1, "converged to {}", best.position);
	}

	#[test]
	fn test_test_run_spaces_samples_evenly() {
		let scope = CurveScope::new(1000, 1000, peaked(400));
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 100, min_step: 1 });
		autofocus.test_run(4).unwrap();
		assert_eq!(autofocus.scope_mut().captured_at, vec![1000, 750, 500, 250]);
	}

	#[test]
	fn test_log_records_one_line_per_sample() {
		let dir = tempfile::tempdir().unwrap();
		let scope = CurveScope::new(1000, 1000, peaked(500));
		let mut autofocus = Autofocus::new(scope, Objective { initial_step: 100, min_step: 1 })
			.with_log(dir.path())
			.unwrap();
		autofocus.sweep().unwrap();

		let log = fs::read_to_string(dir.path().join(FOCUS_LOG_NAME)).unwrap();
		let lines: Vec<&str> = log.lines().collect();
		assert_eq!(lines.len(), 10);
		for (index, line) in lines.iter().enumerate() {
			let (i, score) = line.split_once('\t').unwrap();
			assert_eq!(i.parse::<usize>().unwrap(), index);
			score.parse::<f64>().unwrap();
		}
	}
}
