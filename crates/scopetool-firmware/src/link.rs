//! Serial line assembly.
//!
//! Request lines arrive one byte at a time from the serial port and are
//! accumulated into a bounded buffer. Bytes beyond the bound are silently
//! discarded until the newline; the truncated line is still handed to the
//! dispatcher, which will normally reject it.

use scopetool_proto::MAX_LINE;
use tracing::trace;

/// Accumulates request bytes into complete command lines.
#[derive(Debug)]
pub struct CommandLine {
	buffer: [u8; MAX_LINE],
	cursor: usize,
	truncated: bool,
}

impl CommandLine {
	pub const fn new() -> Self {
		Self {
			buffer: [0; MAX_LINE],
			cursor: 0,
			truncated: false,
		}
	}

	/// Consume one received byte.
	///
	/// Returns the completed line (without its newline) when `byte` is the
	/// terminator; the internal cursor resets so the next byte starts a
	/// fresh line. Non-UTF-8 garbage yields an empty line, which dispatches
	/// to the unknown-command reply.
	pub fn push(&mut self, byte: u8) -> Option<&str> {
		if byte == b'\n' {
			let length = self.cursor;
			self.cursor = 0;
			self.truncated = false;
			return Some(str::from_utf8(&self.buffer[..length]).unwrap_or(""));
		}

		if self.cursor < MAX_LINE {
			self.buffer[self.cursor] = byte;
			self.cursor += 1;
		} else if !self.truncated {
			trace!(limit = MAX_LINE, "command line overflowed, discarding until newline");
			self.truncated = true;
		}
		None
	}
}

impl Default for CommandLine {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn feed(line: &mut CommandLine, bytes: &[u8]) -> Vec<String> {
		bytes
			.iter()
			.filter_map(|byte| line.push(*byte).map(str::to_owned))
			.collect()
	}

	#[test]
	fn test_line_completes_on_newline() {
		let mut line = CommandLine::new();
		assert_eq!(feed(&mut line, b"z_move 40\n"), vec!["z_move 40"]);
	}

	#[test]
	fn test_consecutive_lines_reset_the_cursor() {
		let mut line = CommandLine::new();
		let lines = feed(&mut line, b"calibrate\nis_calibrated\n");
		assert_eq!(lines, vec!["calibrate", "is_calibrated"]);
	}

	#[test]
	fn test_overflow_is_discarded_and_line_still_completes() {
		let mut line = CommandLine::new();
		let long = vec![b'x'; MAX_LINE + 25];
		let lines = feed(&mut line, &long);
		assert!(lines.is_empty());
		let lines = feed(&mut line, b"\nz_get_length\n");
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0].len(), MAX_LINE);
		assert_eq!(lines[1], "z_get_length");
	}

	#[test]
	fn test_empty_line() {
		let mut line = CommandLine::new();
		assert_eq!(feed(&mut line, b"\n"), vec![""]);
	}

	#[test]
	fn test_invalid_utf8_becomes_empty_line() {
		let mut line = CommandLine::new();
		assert_eq!(feed(&mut line, &[0xff, 0xfe, b'\n']), vec![""]);
	}
}
