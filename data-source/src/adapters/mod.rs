//! Built-in data-source adapters.
//!
//! - [`EmulatorSource`]: a simulated aircraft with a rotating vehicle context,
//!   for developing gauges without a simulator running.
//! - [`CpuSource`]: host CPU usage, every subscribed key receives the same value.

mod cpu;
mod emulator;
mod flight_model;

pub use cpu::CpuSource;
pub use emulator::{EmulatorOptions, EmulatorSource};
pub use flight_model::FlightModel;
