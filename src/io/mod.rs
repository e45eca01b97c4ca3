//! Peripherals shipped with the emulator.
//!
//! Both devices are output-only: an input transfer from them yields 0.

mod display;
mod typewriter;

pub use display::Display;
pub use typewriter::Typewriter;
