//! Host-side serial client for the instrument link.
//!
//! Translates host calls into command lines and consumes framed replies.
//! The cardinal rule is synchronization: every transaction reads lines until
//! the `OK` terminator or an `ERR: …` line, never fewer and never more, so
//! the next command always starts on a clean stream.

use std::{
	io::{ErrorKind, Read, Write},
	thread,
	time::Duration,
};

use scopetool_proto::{BAUD_RATE, Command, IDLE_LINE, OK_LINE, ProtoError, ReplyLine, Rgb};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, instrument, trace};

/// How long between idle polls while waiting for motion to finish.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Read timeout on the port. Calibration waits ride through timeouts;
/// everything else surfaces them.
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest reply line we accept before declaring the stream corrupt.
const MAX_REPLY_LINE: usize = 256;

/// Failures on the host side of the link.
///
/// Transport errors (I/O, framing) may be retried from scratch after
/// reopening the port; protocol errors are the instrument refusing the
/// command and are not retried.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
	#[error("serial port error")]
	Serial(#[from] serialport::Error),

	#[error("serial I/O error")]
	Io(#[from] std::io::Error),

	#[error("serial port closed")]
	Closed,

	#[error(transparent)]
	#[diagnostic(transparent)]
	Protocol(#[from] ProtoError),

	#[error("malformed reply line {0:?}")]
	#[diagnostic(help("host and instrument may be out of sync; reopen the port"))]
	Frame(String),

	#[error("reply terminated before the expected value line")]
	MissingValue,
}

/// Framed request/response transport over anything byte-shaped.
///
/// Generic over the port so tests can substitute an in-memory one; real use
/// goes through [`SerialClient::open`].
pub struct SerialClient<P> {
	port: P,
	poll_interval: Duration,
}

impl SerialClient<Box<dyn SerialPort>> {
	/// Open the instrument link on a serial device, 9600 8-N-1.
	#[instrument(level = "debug")]
	pub fn open(path: &str) -> Result<Self, ClientError> {
		let port = serialport::new(path, BAUD_RATE)
			.data_bits(DataBits::Eight)
			.parity(Parity::None)
			.stop_bits(StopBits::One)
			.timeout(READ_TIMEOUT)
			.open()?;
		Ok(Self::new(port))
	}
}

impl<P: Read + Write> SerialClient<P> {
	pub fn new(port: P) -> Self {
		Self { port, poll_interval: IDLE_POLL_INTERVAL }
	}

	/// Override the idle-poll sleep (tests use zero).
	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn port(&self) -> &P {
		&self.port
	}

	fn send_line(&mut self, line: &str) -> Result<(), ClientError> {
		trace!(line, "sending command");
		self.port.write_all(line.as_bytes())?;
		self.port.write_all(b"\n")?;
		self.port.flush()?;
		Ok(())
	}

	fn read_line(&mut self) -> Result<String, ClientError> {
		let mut line = Vec::new();
		let mut byte = [0u8; 1];
		loop {
			match self.port.read(&mut byte) {
				Ok(0) => return Err(ClientError::Closed),
				Ok(_) => {
					if byte[0] == b'\n' {
						break;
					}
					line.push(byte[0]);
					if line.len() > MAX_REPLY_LINE {
						return Err(ClientError::Frame(
							String::from_utf8_lossy(&line).into_owned(),
						));
					}
				}
				Err(err) if err.kind() == ErrorKind::Interrupted => continue,
				Err(err) => return Err(err.into()),
			}
		}
		let mut line = String::from_utf8(line)
			.map_err(|err| ClientError::Frame(String::from_utf8_lossy(err.as_bytes()).into_owned()))?;
		if line.ends_with('\r') {
			line.pop();
		}
		trace!(line, "received line");
		Ok(line)
	}

	/// Send a command and consume its whole reply.
	///
	/// Returns the value lines; the `OK` terminator is consumed, and an
	/// `ERR: …` line becomes a typed [`ClientError::Protocol`] failure.
	pub fn transact(&mut self, command: &Command) -> Result<Vec<String>, ClientError> {
		self.transact_line(&command.to_string())
	}

	/// [`SerialClient::transact`] for a raw, pre-formatted line.
	pub fn transact_line(&mut self, line: &str) -> Result<Vec<String>, ClientError> {
		self.send_line(line)?;
		let mut values = Vec::new();
		loop {
			let line = self.read_line()?;
			match ReplyLine::classify(&line) {
				ReplyLine::Value(value) => values.push(value.to_owned()),
				ReplyLine::Ok => return Ok(values),
				ReplyLine::Err(err) => return Err(err.into()),
			}
		}
	}

	fn transact_value(&mut self, command: &Command) -> Result<i64, ClientError> {
		let values = self.transact(command)?;
		let first = values.first().ok_or(ClientError::MissingValue)?;
		first.parse().map_err(|_| ClientError::Frame(first.clone()))
	}

	pub fn is_calibrated(&mut self) -> Result<bool, ClientError> {
		Ok(self.transact_value(&Command::IsCalibrated)? != 0)
	}

	pub fn z_length(&mut self) -> Result<i64, ClientError> {
		self.transact_value(&Command::ZGetLength)
	}

	pub fn z_position(&mut self) -> Result<i64, ClientError> {
		self.transact_value(&Command::ZGetPosition)
	}

	pub fn z_move(&mut self, steps: i64) -> Result<(), ClientError> {
		self.transact(&Command::ZMove(steps)).map(drop)
	}

	pub fn z_move_to(&mut self, position: i64) -> Result<(), ClientError> {
		self.transact(&Command::ZMoveTo(position)).map(drop)
	}

	pub fn set_ring_colour(&mut self, colour: Rgb) -> Result<(), ClientError> {
		self.transact(&Command::SetRingColour(colour)).map(drop)
	}

	pub fn set_ring_brightness(&mut self, value: u8) -> Result<(), ClientError> {
		self.transact(&Command::SetRingBrightness(value)).map(drop)
	}

	pub fn set_stage_led_brightness(&mut self, value: u8) -> Result<(), ClientError> {
		self.transact(&Command::SetStageLedBrightness(value)).map(drop)
	}

	/// Kick off calibration without reading a reply.
	///
	/// The instrument blocks through the homing sequence and only replies
	/// `OK` once it finishes; follow up with
	/// [`SerialClient::wait_for_calibration`].
	pub fn start_calibrate(&mut self) -> Result<(), ClientError> {
		self.send_line(&Command::Calibrate.to_string())
	}

	/// One idle poll: the three-line `z_get_distance_to_go` frame.
	///
	/// The frame is always (value, indicator, `OK`); the stage is idle iff
	/// the middle line is literally `0`. Kept as-is for wire compatibility.
	pub fn distance_to_go_idle(&mut self) -> Result<bool, ClientError> {
		self.send_line(&Command::ZGetDistanceToGo.to_string())?;
		let mut lines = Vec::with_capacity(3);
		for _ in 0..3 {
			let line = self.read_line()?;
			if let ReplyLine::Err(err) = ReplyLine::classify(&line) {
				return Err(err.into());
			}
			lines.push(line);
		}
		if lines[2] != OK_LINE {
			return Err(ClientError::Frame(lines[2].clone()));
		}
		Ok(lines[1] == IDLE_LINE)
	}

	/// Block until a previously started calibration replies `OK`.
	///
	/// Homing takes as long as it takes, so read timeouts are ridden out
	/// rather than surfaced.
	#[instrument(level = "debug", skip(self))]
	pub fn wait_for_calibration(&mut self) -> Result<(), ClientError> {
		loop {
			match self.read_line() {
				Ok(line) => match ReplyLine::classify(&line) {
					ReplyLine::Ok => return Ok(()),
					ReplyLine::Err(err) => return Err(err.into()),
					ReplyLine::Value(_) => continue,
				},
				Err(ClientError::Io(err)) if err.kind() == ErrorKind::TimedOut => {
					debug!("still homing");
					continue;
				}
				Err(err) => return Err(err),
			}
		}
	}

	/// Poll until the stage reports no motion pending, sleeping between
	/// polls to keep the line quiet.
	#[instrument(level = "debug", skip(self))]
	pub fn wait_for_motion(&mut self) -> Result<(), ClientError> {
		loop {
			if self.distance_to_go_idle()? {
				return Ok(());
			}
			thread::sleep(self.poll_interval);
		}
	}

	/// Block until the motion started by `command` has finished: a single
	/// terminator read for `calibrate`, the distance-poll loop otherwise.
	pub fn wait_for_idle(&mut self, command: &Command) -> Result<(), ClientError> {
		if matches!(command, Command::Calibrate) {
			self.wait_for_calibration()
		} else {
			self.wait_for_motion()
		}
	}
}
