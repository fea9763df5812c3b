use clap::Parser;
use miette::{IntoDiagnostic, Result};
use scopetool_proto::{Command, OK_LINE};

use super::{ConnectArgs, Context};

/// Send one raw command line to the instrument and print the reply.
///
/// The line goes out verbatim (plus the newline), so this is also handy for
/// seeing how the instrument rejects malformed input.
#[derive(Debug, Clone, Parser)]
pub struct SendArgs {
	#[command(flatten)]
	pub connect: ConnectArgs,

	/// The command line, e.g. "z_move -100"
	pub line: String,
}

pub async fn run(ctx: Context<SendArgs>) -> Result<()> {
	let mut client = ctx.args_top.connect.client()?;
	let line = ctx.args_top.line;

	// calibrate gets no reply until homing finishes, so it has its own path
	if Command::parse(&line) == Ok(Command::Calibrate) {
		client.start_calibrate().into_diagnostic()?;
		client.wait_for_idle(&Command::Calibrate).into_diagnostic()?;
		println!("{OK_LINE}");
		return Ok(());
	}

	let values = client.transact_line(&line).into_diagnostic()?;
	for value in values {
		println!("{value}");
	}
	println!("{OK_LINE}");
	Ok(())
}
