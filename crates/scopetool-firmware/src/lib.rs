//! Firmware core for the scopetool microscope instrument.
//!
//! The instrument is a three-axis motorized stage (CoreXY carriage plus a Z
//! focus column), an illumination ring with a stage LED, and a set of
//! manual jog inputs, all commanded over a 9600 baud serial line using the
//! protocol in [`scopetool_proto`].
//!
//! Everything is built around one cooperative, run-to-completion main loop:
//! each iteration polls the serial port for request bytes, advances the
//! [`stage`] scheduler by one tick, and flushes pending [`lighting`] state.
//! Nothing blocks except the `calibrate` homing sequence, which freezes
//! command parsing and all other motion until both limits are found.
//!
//! Hardware is reached exclusively through the [`hal`] traits: the
//! Raspberry Pi backend in [`rpi`] drives real GPIO/SPI, while [`sim`]
//! provides a complete in-memory bench for tests and development machines.

#[doc(inline)]
pub use dispatch::Dispatcher;

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use lighting::Lighting;

#[doc(inline)]
pub use stage::{Axis, Stage};

pub mod dispatch;
pub mod error;
pub mod hal;
pub mod lighting;
pub mod link;
pub mod manual;
#[cfg(all(target_os = "linux", feature = "hardware"))]
pub mod rpi;
pub mod sim;
pub mod stage;
