//! Wire protocol for the microscope instrument link.
//!
//! The instrument speaks a line-oriented request/response protocol over a
//! 9600 baud serial connection. Requests are single `\n`-terminated lines of
//! the form `verb [argument]`; replies are one or more `\r\n`-terminated
//! lines. The final line of a successful reply is literally `OK`; error
//! replies consist of a single `ERR: …` line with no `OK` after it.
//!
//! Query commands put their value lines before the terminator. One reply
//! frame is idiosyncratic and kept for wire compatibility with existing
//! instruments: `z_get_distance_to_go` answers with exactly three lines,
//! the remaining distance, then a motion-pending indicator which is
//! literally `0` once no motion is pending, then `OK`. See
//! [`Command::ZGetDistanceToGo`].
//!
//! This crate is shared by the firmware dispatcher and the host client so
//! the two ends cannot drift: [`Command`] parses and prints the request
//! grammar, [`ReplyLine`] classifies reply lines, and [`ProtoError`] carries
//! the three in-band failure modes.

/// Baud rate of the instrument link, 8-N-1 framing.
pub const BAUD_RATE: u32 = 9600;

#[doc(inline)]
pub use colour::{InvalidColour, Rgb};

#[doc(inline)]
pub use command::{Command, MAX_LINE};

#[doc(inline)]
pub use error::ProtoError;

#[doc(inline)]
pub use reply::{IDLE_LINE, LINE_ENDING, OK_LINE, ReplyLine};

mod colour;
mod command;
mod error;
mod reply;
