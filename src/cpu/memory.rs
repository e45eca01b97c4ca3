//! Main memory.
//!
//! A flat array of signed 16-bit cells. Addresses are in address units: one
//! unit is one cell (2 bytes), so an instruction word spans two units.
//! Out-of-range accesses fail instead of wrapping.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Bytes per memory cell.
pub const CELL_BYTES: usize = 2;

/// Default memory size in bytes, as used by the command line tools.
pub const DEFAULT_MEMORY_SIZE: usize = 256;

/// Main memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<i16>,
}

impl Memory {
    /// Create a zeroed memory of `size` bytes (rounded down to whole cells).
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![0; size / CELL_BYTES],
        }
    }

    /// Create a memory of `size` bytes holding `bytes`, zero-padded or
    /// truncated to fit.
    pub fn from_bytes(bytes: &[u8], size: usize) -> Self {
        let mut mem = Self::new(size);
        mem.load_bytes(bytes);
        mem
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.cells.len() * CELL_BYTES
    }

    /// Read the cell selected by an Address register value.
    pub fn read(&self, address: i16) -> Result<i16, MemoryError> {
        let index = self.index(address)?;
        Ok(self.cells[index])
    }

    /// Write `value` to the cell selected by an Address register value.
    pub fn write(&mut self, address: i16, value: i16) -> Result<(), MemoryError> {
        let index = self.index(address)?;
        self.cells[index] = value;
        Ok(())
    }

    /// Overwrite memory from a little-endian byte image. Bytes past the end
    /// of memory are dropped; cells past the end of the image are zeroed.
    pub fn load_bytes(&mut self, bytes: &[u8]) {
        let mut chunks = bytes.chunks(CELL_BYTES);
        for cell in &mut self.cells {
            *cell = match chunks.next() {
                Some([lo, hi]) => i16::from_le_bytes([*lo, *hi]),
                Some([lo]) => i16::from_le_bytes([*lo, 0]),
                _ => 0,
            };
        }
    }

    /// Memory contents as little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    /// Dump a range of cells (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, i16)> {
        let end = (start + count).min(self.cells.len());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }

    fn index(&self, address: i16) -> Result<usize, MemoryError> {
        usize::try_from(address)
            .ok()
            .filter(|&i| i < self.cells.len())
            .ok_or(MemoryError::AddressOutOfRange {
                address,
                cells: self.cells.len(),
            })
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|c| **c != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {address} out of range (0-{})", .cells.saturating_sub(1))]
    AddressOutOfRange { address: i16, cells: usize },
}
