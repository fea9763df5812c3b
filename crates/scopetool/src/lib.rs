#![deny(rust_2018_idioms)]

//! Host side of the scopetool microscope: the serial client, the autofocus
//! engine, the Canny edge detector, and the CLI that drives them. The
//! instrument on the other end of the serial line is
//! [`scopetool-firmware`](https://docs.rs/scopetool-firmware).

pub use crate::actions::run;
pub use crate::args::get_args as args;

pub(crate) mod actions;
pub(crate) mod args;

pub mod autofocus;
pub mod capture;
pub mod client;
pub mod edges;
pub mod focus;
pub mod grey;
