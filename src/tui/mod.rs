//! TUI debugger for the microbus emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register, bus and control queue view
//! - Memory view around the program counter
//! - Tick/step/run/breakpoint controls
//! - Disassembly view and captured display output

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp, OutputLog};
