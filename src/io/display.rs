use crate::cpu::ports::{Peripheral, PortHandle};
use log::{info, warn};
use std::io::Write;

/// Numeric display: prints every value written to its port on its own line.
pub struct Display {
    port: PortHandle,
    out: Box<dyn Write>,
}

impl Display {
    /// A display printing to standard output.
    pub fn new(port: PortHandle) -> Self {
        Self::with_writer(port, std::io::stdout())
    }

    pub fn with_writer<W: Write + 'static>(port: PortHandle, out: W) -> Self {
        Self { port, out: Box::new(out) }
    }
}

impl Peripheral for Display {
    fn write(&mut self) {
        let value = self.port.get();
        info!(target: "machine", "display: {}", value);
        if let Err(e) = writeln!(self.out, "{}", value) {
            warn!(target: "machine", "display output failed: {}", e);
        }
    }

    fn drive(&mut self) -> i16 {
        0
    }

    fn disconnect(&mut self) {
        let _ = self.out.flush();
    }
}
