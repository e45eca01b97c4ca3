use crate::cpu::ports::{Peripheral, PortHandle};
use log::{debug, warn};
use std::io::Write;

/// Character output: prints each value written to its port as a character.
///
/// Values that are not valid code points print as U+FFFD.
pub struct Typewriter {
    port: PortHandle,
    out: Box<dyn Write>,
}

impl Typewriter {
    pub fn new(port: PortHandle) -> Self {
        Self::with_writer(port, std::io::stdout())
    }

    pub fn with_writer<W: Write + 'static>(port: PortHandle, out: W) -> Self {
        Self { port, out: Box::new(out) }
    }
}

impl Peripheral for Typewriter {
    fn write(&mut self) {
        let value = self.port.get();
        let ch = char::from_u32(value as u16 as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        debug!(target: "machine", "typewriter: {:?}", ch);

        let result = write!(self.out, "{}", ch).and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!(target: "machine", "typewriter output failed: {}", e);
        }
    }

    fn drive(&mut self) -> i16 {
        0
    }

    fn disconnect(&mut self) {
        let _ = self.out.flush();
    }
}
