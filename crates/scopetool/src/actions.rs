use clap::Subcommand;
use miette::{IntoDiagnostic, Result, WrapErr};
use serialport::SerialPort;
use tracing::{debug, trace};

use crate::client::SerialClient;

pub use context::Context;
pub mod context;

#[macro_export]
macro_rules! subcommands {
	(
		[$argtype:ty => $ctxcode:block]
		$(
			$(#[$meta:meta])*
			$modname:ident => $enumname:ident($argname:ident)
		),+
	) => {
		$(
			$(#[$meta])*
			pub mod $modname;
		)*

		#[derive(Debug, Clone, Subcommand)]
		pub enum Action {
			$(
				$(#[$meta])*
				$enumname($modname::$argname),
			)*
		}

		pub async fn run(ctx: $argtype) -> Result<()> {
			let ctxfn = $ctxcode;
			match ctxfn(ctx)? {
				$(
					$(#[$meta])*
					(Action::$enumname(args), ctx) => $modname::run(ctx.with_top(args)).await,
				)*
			}
		}
	};
}
#[allow(unused_imports)]
pub(crate) use subcommands;

use crate::args::Args;

subcommands! {
	[Args => {|args: Args| -> Result<(Action, Context<()>)> {
		debug!(version=%env!("CARGO_PKG_VERSION"), "starting up");
		trace!(action=?args.action, "action");
		Ok((args.action, Context::new()))
	}}]

	calibrate => Calibrate(CalibrateArgs),
	edges => Edges(EdgesArgs),
	focus => Focus(FocusArgs),
	lighting => Lighting(LightingArgs),
	send => Send(SendArgs)
}

/// Options for reaching the instrument.
#[derive(Debug, Clone, clap::Args)]
pub struct ConnectArgs {
	/// Serial port device the instrument is connected to
	#[arg(long, default_value = "/dev/ttyUSB0")]
	pub port: String,
}

impl ConnectArgs {
	pub fn client(&self) -> Result<SerialClient<Box<dyn SerialPort>>> {
		SerialClient::open(&self.port)
			.into_diagnostic()
			.wrap_err_with(|| format!("serial: open {}", self.port))
	}
}
