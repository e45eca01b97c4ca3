//! Peripheral port table.
//!
//! Each attached device is identified by a port id. Ids are handed out at
//! construction: the lowest free slot, otherwise the next sequential id.
//! Every device receives a [`PortHandle`] to its own slot, through which it
//! reads the last value the machine wrote to it.

use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;

/// A device on the I/O ports.
pub trait Peripheral {
    /// The machine has written a new value into this device's port slot.
    fn write(&mut self);

    /// Current value to hand to the machine on an input transfer.
    fn drive(&mut self) -> i16;

    /// Called once when the machine halts.
    fn disconnect(&mut self) {}
}

/// Shared view of one port slot.
#[derive(Clone, Debug, Default)]
pub struct PortHandle(Rc<Cell<i16>>);

impl PortHandle {
    /// Last value written to this port.
    pub fn get(&self) -> i16 {
        self.0.get()
    }

    fn set(&self, value: i16) {
        self.0.set(value);
    }
}

struct Slot {
    port: PortHandle,
    device: Box<dyn Peripheral>,
}

/// Mapping from port id to attached device.
#[derive(Default)]
pub struct PortTable {
    slots: Vec<Option<Slot>>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device built from its port handle, returning its port id.
    pub fn attach<P, F>(&mut self, build: F) -> usize
    where
        P: Peripheral + 'static,
        F: FnOnce(PortHandle) -> P,
    {
        let id = self.next_id();
        let port = PortHandle::default();
        let slot = Slot {
            device: Box::new(build(port.clone())),
            port,
        };

        if id == self.slots.len() {
            self.slots.push(Some(slot));
        } else {
            self.slots[id] = Some(slot);
        }
        id
    }

    /// Number of attached devices.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last value written to `port`, if a device is attached there.
    pub fn value(&self, port: usize) -> Option<i16> {
        self.slots.get(port)?.as_ref().map(|s| s.port.get())
    }

    /// Record `value` in the selected slot and notify its device.
    pub fn write(&mut self, selector: i16, value: i16) -> Result<(), PortError> {
        let slot = self.slot(selector)?;
        slot.port.set(value);
        slot.device.write();
        Ok(())
    }

    /// Ask the selected device for its current value.
    pub fn drive(&mut self, selector: i16) -> Result<i16, PortError> {
        Ok(self.slot(selector)?.device.drive())
    }

    /// Disconnect every attached device.
    pub fn disconnect_all(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.device.disconnect();
        }
    }

    /// `(port id, last value)` for every attached device.
    pub fn values(&self) -> Vec<(usize, i16)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, s)| s.as_ref().map(|s| (id, s.port.get())))
            .collect()
    }

    fn next_id(&self) -> usize {
        self.slots
            .iter()
            .position(|s| s.is_none())
            .unwrap_or(self.slots.len())
    }

    fn slot(&mut self, selector: i16) -> Result<&mut Slot, PortError> {
        usize::try_from(selector)
            .ok()
            .and_then(|id| self.slots.get_mut(id))
            .and_then(|s| s.as_mut())
            .ok_or(PortError::Unregistered(selector))
    }
}

impl std::fmt::Debug for PortTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.values()).finish()
    }
}

/// Errors raised by port accesses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("no peripheral registered on port {0}")]
    Unregistered(i16),
}
