//! Control sequencer.
//!
//! Each tick pops one control word from the control queue and asserts it
//! against the register bank, ALU, memory and port table. When the queue is
//! empty the fixed fetch sequence is enqueued first. Latching the opcode
//! during the fetch decodes it and appends its microprogram behind the
//! remaining fetch words, so fetch always completes before execute.

use crate::asm::image::Image;
use crate::config::MachineConfig;
use crate::cpu::alu::{Alu, AluOp};
use crate::cpu::clock::Clock;
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::microcode::{self, ControlWord, Decoded, Microprogram, Opcode, Signal, FETCH};
use crate::cpu::ports::{Peripheral, PortError, PortHandle, PortTable};
use crate::cpu::registers::{Bus, Register, RegisterBank};
use log::{debug, info, trace, warn};
use serde::{Serialize, Deserialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Machine execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineState {
    /// The clock is running.
    Running,
    /// A Halt signal was asserted.
    Halted,
    /// A fatal error stopped the machine.
    Faulted,
}

/// Where the sequencer is within an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequencerState {
    /// Between instructions; the next tick starts a fetch.
    Idle,
    /// Control words are pending.
    Executing,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// The word that was asserted.
    pub word: ControlWord,
    /// Opcode decoded during this tick, if the opcode was latched.
    pub decoded: Option<Opcode>,
    /// Bus value just before it was cleared.
    pub bus: i16,
}

/// Serializable view of the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: MachineState,
    pub sequencer: SequencerState,
    pub ticks: u64,
    pub instructions: u64,
    pub registers: RegisterBank,
    pub last_bus: i16,
    pub pending: Vec<ControlWord>,
    pub ports: Vec<(usize, i16)>,
}

/// The emulated computer.
pub struct Machine {
    /// Register bank.
    pub regs: RegisterBank,
    /// Main memory.
    pub mem: Memory,
    bus: Bus,
    alu: Alu,
    ports: PortTable,
    queue: VecDeque<ControlWord>,
    /// Sign used by the ALU for the instruction being executed.
    operation: AluOp,
    sequencer: SequencerState,
    state: MachineState,
    current: Option<Opcode>,
    last_bus: i16,
    ticks: u64,
    instructions: u64,
}

impl Machine {
    /// A running machine with `memory_size` bytes of zeroed memory.
    pub fn new(memory_size: usize) -> Self {
        Self {
            regs: RegisterBank::new(),
            mem: Memory::new(memory_size),
            bus: Bus::new(),
            alu: Alu::new(),
            ports: PortTable::new(),
            queue: VecDeque::new(),
            operation: AluOp::Add,
            sequencer: SequencerState::Idle,
            state: MachineState::Running,
            current: None,
            last_bus: 0,
            ticks: 0,
            instructions: 0,
        }
    }

    /// A machine with `image` loaded into `memory_size` bytes of memory.
    pub fn with_image(image: &Image, memory_size: usize) -> Self {
        let mut machine = Self::new(memory_size);
        machine.load_image(image);
        machine
    }

    /// Build a machine from a configuration, loading its image if one is set.
    pub fn from_config(config: &MachineConfig) -> Result<Self, crate::Error> {
        config.validate()?;
        let mut machine = Self::new(config.memory_size);
        if let Some(path) = &config.image {
            let image = crate::asm::image::load_image(path)?;
            machine.load_image(&image);
        }
        Ok(machine)
    }

    /// Copy `image` into memory, zero-padded or truncated to its size, and
    /// point the program counter at its first instruction.
    pub fn load_image(&mut self, image: &Image) {
        let bytes = image.to_bytes();
        if bytes.len() > self.mem.size() {
            warn!(target: "machine", "image of {} bytes truncated to {} bytes", bytes.len(), self.mem.size());
        }
        self.mem.load_bytes(&bytes);
        let start = image.start_address();
        self.regs.set(Register::ProgramCounter, start as i16);
        info!(target: "machine", "loaded {} words, starting at {}", image.len(), start);
    }

    /// Attach a peripheral built from its port handle. Returns its port id.
    pub fn attach<P, F>(&mut self, build: F) -> usize
    where
        P: Peripheral + 'static,
        F: FnOnce(PortHandle) -> P,
    {
        let id = self.ports.attach(build);
        debug!(target: "machine", "attached peripheral on port {}", id);
        id
    }

    /// Advance the clock by one tick.
    pub fn tick(&mut self) -> Result<Tick, MachineError> {
        if self.state != MachineState::Running {
            return Err(MachineError::NotRunning(self.state));
        }

        if self.queue.is_empty() {
            self.queue.extend(FETCH);
        }
        self.sequencer = SequencerState::Executing;

        let word = self.queue.pop_front().unwrap_or_default();
        trace!(target: "tick", "T{} {}", self.ticks, word);

        let result = self.assert_word(word);
        self.last_bus = self.bus.get();
        self.bus.clear();
        self.ticks += 1;

        if self.queue.is_empty() {
            self.sequencer = SequencerState::Idle;
        }

        match result {
            Ok(decoded) => Ok(Tick { word, decoded, bus: self.last_bus }),
            Err(e) => {
                self.fault(&e);
                Err(e)
            }
        }
    }

    /// Run until the current instruction completes. Returns the opcode
    /// decoded on the way, if any.
    pub fn step(&mut self) -> Result<Option<Opcode>, MachineError> {
        let mut decoded = None;
        loop {
            let tick = self.tick()?;
            decoded = tick.decoded.or(decoded);
            if self.sequencer == SequencerState::Idle || !self.is_running() {
                return Ok(decoded);
            }
        }
    }

    /// Run unthrottled until halt or error. Returns the number of ticks.
    pub fn run(&mut self) -> Result<u64, MachineError> {
        self.run_clocked(&Clock::unthrottled(), None)
    }

    /// Run unthrottled for at most `max_ticks` ticks.
    pub fn run_limited(&mut self, max_ticks: u64) -> Result<u64, MachineError> {
        self.run_clocked(&Clock::unthrottled(), Some(max_ticks))
    }

    /// Run on `clock` until halt, error, or `limit` ticks.
    pub fn run_clocked(&mut self, clock: &Clock, limit: Option<u64>) -> Result<u64, MachineError> {
        clock.run(limit, || {
            self.tick()?;
            Ok(self.is_running())
        })
    }

    /// Queue a microprogram directly, as if it had just been decoded.
    ///
    /// Its ALU sign replaces the current instruction's.
    pub fn enqueue(&mut self, program: &Microprogram) {
        self.queue.extend(program.words());
        self.operation = program.operation();
        if !self.queue.is_empty() {
            self.sequencer = SequencerState::Executing;
        }
    }

    /// Stop the machine from outside. Same path as an asserted Halt.
    pub fn halt(&mut self) {
        if self.state == MachineState::Running {
            self.shut_down(MachineState::Halted);
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer
    }

    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    pub fn is_halted(&self) -> bool {
        self.state == MachineState::Halted
    }

    /// Current bus value. Always 0 between ticks.
    pub fn bus(&self) -> i16 {
        self.bus.get()
    }

    /// Bus value at the end of the last tick, before it was cleared.
    pub fn last_bus(&self) -> i16 {
        self.last_bus
    }

    pub fn alu(&self) -> &Alu {
        &self.alu
    }

    /// ALU sign of the instruction being executed.
    pub fn operation(&self) -> AluOp {
        self.operation
    }

    /// Pending control words, head first.
    pub fn pending(&self) -> impl Iterator<Item = &ControlWord> {
        self.queue.iter()
    }

    pub fn ports(&self) -> &PortTable {
        &self.ports
    }

    /// Opcode of the instruction most recently decoded.
    pub fn current(&self) -> Option<Opcode> {
        self.current
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of instructions decoded.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            sequencer: self.sequencer,
            ticks: self.ticks,
            instructions: self.instructions,
            registers: self.regs.clone(),
            last_bus: self.last_bus,
            pending: self.queue.iter().copied().collect(),
            ports: self.ports.values(),
        }
    }

    /// Assert every signal of `word`: drivers, then latches, then the
    /// counter increment and halt.
    fn assert_word(&mut self, word: ControlWord) -> Result<Option<Opcode>, MachineError> {
        // Memory and port selectors are sampled before anything latches.
        let address = self.regs.get(Register::Address);

        // Register drivers go last, so a register wins a contended bus.
        for signal in word.signals().filter(|s| s.is_driver() && s.drives().is_none()) {
            match signal {
                Signal::MemoryOut => self.bus.set(self.mem.read(address)?),
                Signal::AluEnable => self.bus.set(self.alu.result(self.operation)),
                Signal::PeripheralOut => {
                    let value = self.ports.drive(self.regs.get(Register::B))?;
                    self.bus.set(value);
                }
                _ => {}
            }
        }
        for reg in word.signals().filter_map(Signal::drives) {
            self.regs.drive(reg, &mut self.bus);
        }

        let mut decoded = None;
        for signal in word.signals().filter(|s| s.is_latch()) {
            match signal {
                Signal::MemoryIn => self.mem.write(address, self.bus.get())?,
                Signal::PeripheralIn => self.ports.write(address, self.bus.get())?,
                Signal::FlagsIn => {}
                Signal::InstructionIn => {
                    self.regs.latch(Register::Instruction, &self.bus);
                    decoded = Some(self.decode(address)?);
                }
                other => {
                    if let Some(reg) = other.latches() {
                        self.regs.latch(reg, &self.bus);
                        if matches!(reg, Register::A | Register::B) {
                            self.alu.capture(self.regs.get(Register::A), self.regs.get(Register::B));
                        }
                    }
                }
            }
        }

        if word.contains(Signal::ProgramCounterIncrement) {
            self.regs.increment(Register::ProgramCounter);
        }
        if word.contains(Signal::Halt) {
            info!(target: "machine", "halted after {} ticks", self.ticks + 1);
            self.shut_down(MachineState::Halted);
        }

        Ok(decoded)
    }

    /// Expand the opcode just latched into the instruction register.
    fn decode(&mut self, address: i16) -> Result<Opcode, MachineError> {
        let id = self.regs.get(Register::Instruction);
        match microcode::decode(id) {
            Decoded::Recognized(op, program) => {
                debug!(target: "decode", "{:04}: {:?} ({} words)", address, op, program.len());
                self.queue.extend(program.words());
                self.operation = program.operation();
                self.current = Some(op);
                self.instructions += 1;
                Ok(op)
            }
            Decoded::Unrecognized(opcode) => Err(MachineError::InvalidOpcode { opcode, address }),
        }
    }

    fn fault(&mut self, error: &MachineError) {
        warn!(target: "machine", "fault at tick {}: {}", self.ticks, error);
        self.shut_down(MachineState::Faulted);
    }

    /// Stop ticking and let every peripheral disconnect.
    fn shut_down(&mut self, state: MachineState) {
        self.state = state;
        self.queue.clear();
        self.sequencer = SequencerState::Idle;
        self.ports.disconnect_all();
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.halt();
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("sequencer", &self.sequencer)
            .field("ticks", &self.ticks)
            .field("regs", &self.regs)
            .field("pending", &self.queue.len())
            .finish()
    }
}

/// Errors that stop the machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("machine not running: {0:?}")]
    NotRunning(MachineState),

    #[error("invalid opcode {opcode} at address {address}")]
    InvalidOpcode { opcode: i16, address: i16 },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("port error: {0}")]
    Port(#[from] PortError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::image::{InstructionWord, BODY_START};
    use crate::cpu::ports::tests::attach_probe;
    use proptest::prelude::*;

    const MEM: usize = 512;

    fn program(words: &[(Opcode, u16)]) -> Image {
        Image::new(words.iter().map(|&(op, arg)| InstructionWord::new(op, arg)).collect())
            .with_entry_point(BODY_START)
    }

    fn machine(words: &[(Opcode, u16)]) -> Machine {
        Machine::with_image(&program(words), MEM)
    }

    #[test]
    fn test_sum_and_output() {
        let mut m = machine(&[
            (Opcode::LoadAImmediate, 5),
            (Opcode::LoadBImmediate, 3),
            (Opcode::Sum, 0),
            (Opcode::Out, 0),
            (Opcode::Halt, 0),
        ]);
        let (port, log) = attach_probe(&mut m.ports, 0);

        m.run().unwrap();

        assert!(m.is_halted());
        assert_eq!(m.regs.get(Register::Accumulator), 8);
        assert_eq!(m.regs.get(Register::Address), port as i16);
        assert_eq!(log.borrow().writes, vec![m.regs.get(Register::IO)]);
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[test]
    fn test_sum_routed_to_output() {
        let mut m = machine(&[
            (Opcode::LoadAImmediate, 5),
            (Opcode::LoadBImmediate, 3),
            (Opcode::Sum, 0),
            (Opcode::MoveAccumulatorIo, 0),
            (Opcode::Out, 0),
            (Opcode::Halt, 0),
        ]);
        let (_, log) = attach_probe(&mut m.ports, 0);

        m.run().unwrap();

        assert_eq!(log.borrow().writes, vec![8]);
        assert_eq!(m.ports.value(0), Some(8));
    }

    #[test]
    fn test_difference() {
        let mut m = machine(&[
            (Opcode::LoadAImmediate, 5),
            (Opcode::LoadBImmediate, 3),
            (Opcode::Difference, 0),
            (Opcode::Halt, 0),
        ]);
        m.run().unwrap();
        assert_eq!(m.regs.get(Register::Accumulator), 2);
    }

    #[test]
    fn test_add_and_subtract_memory_operand() {
        let mut m = machine(&[
            (Opcode::LoadAImmediate, 10),
            (Opcode::Add, 100),
            (Opcode::StoreAccumulator, 101),
            (Opcode::Subtract, 100),
            (Opcode::Halt, 0),
        ]);
        m.mem.write(100, 7).unwrap();

        m.run().unwrap();

        assert_eq!(m.mem.read(101).unwrap(), 17);
        assert_eq!(m.regs.get(Register::Accumulator), 3);
    }

    #[test]
    fn test_store_immediate_uses_address() {
        let mut m = machine(&[
            (Opcode::LoadAddressImmediate, 120),
            (Opcode::StoreImmediate, 42),
            (Opcode::LoadA, 120),
            (Opcode::Halt, 0),
        ]);
        m.run().unwrap();
        assert_eq!(m.mem.read(120).unwrap(), 42);
        assert_eq!(m.regs.get(Register::A), 42);
    }

    #[test]
    fn test_register_moves() {
        let mut m = machine(&[
            (Opcode::LoadAImmediate, 9),
            (Opcode::MoveAB, 0),
            (Opcode::MoveBIo, 0),
            (Opcode::MoveIoAccumulator, 0),
            (Opcode::Halt, 0),
        ]);
        m.run().unwrap();
        for reg in [Register::A, Register::B, Register::IO, Register::Accumulator] {
            assert_eq!(m.regs.get(reg), 9, "{:?}", reg);
        }
    }

    #[test]
    fn test_fetch_timing() {
        let mut checked = 0;
        for op in Opcode::ALL {
            if op == Opcode::Halt {
                continue;
            }
            // Jump to the next word so the follow-up decode still happens.
            let operand = if op == Opcode::Jump { Image::address_of(1) } else { 0 };
            let mut m = machine(&[(op, operand), (Opcode::MoveAB, 0)]);
            attach_probe(&mut m.ports, 0);

            let mut decodes = Vec::new();
            while decodes.len() < 2 {
                let tick = m.tick().unwrap();
                if tick.decoded.is_some() {
                    decodes.push(m.ticks());
                }
            }

            let k = op.microprogram().len() as u64;
            assert_eq!(decodes[1] - decodes[0], 6 + k, "{:?}", op);
            checked += 1;
        }
        assert_eq!(checked, Opcode::ALL.len() - 1);
    }

    #[test]
    fn test_empty_queue_fetch_starts_same_tick() {
        let mut m = machine(&[(Opcode::Halt, 0)]);
        assert_eq!(m.sequencer_state(), SequencerState::Idle);

        let first = m.tick().unwrap();
        assert_eq!(first.word, FETCH[0]);
        assert_eq!(m.sequencer_state(), SequencerState::Executing);
        assert_eq!(m.pending().count(), 5);
    }

    #[test]
    fn test_microcode_follows_fetch() {
        let mut m = machine(&[(Opcode::Add, 100), (Opcode::Halt, 0)]);
        for _ in 0..3 {
            m.tick().unwrap();
        }
        let pending: Vec<ControlWord> = m.pending().copied().collect();
        let mut expected: Vec<ControlWord> = FETCH[3..].to_vec();
        expected.extend(Opcode::Add.microprogram().words());
        assert_eq!(pending, expected);
    }

    #[test]
    fn test_sequencer_returns_to_idle() {
        let mut m = machine(&[(Opcode::MoveAB, 0), (Opcode::Halt, 0)]);
        assert_eq!(m.step().unwrap(), Some(Opcode::MoveAB));
        assert_eq!(m.sequencer_state(), SequencerState::Idle);
        assert_eq!(m.ticks(), 7);
        assert_eq!(m.regs.get(Register::ProgramCounter), Image::address_of(1) as i16);
    }

    #[test]
    fn test_first_fetch_reads_entry_point() {
        let image = Image::new(vec![
            InstructionWord::bare(Opcode::Sum),
            InstructionWord::bare(Opcode::Halt),
        ])
        .with_entry_point(Image::address_of(1));
        let mut m = Machine::with_image(&image, MEM);

        assert_eq!(m.step().unwrap(), Some(Opcode::Halt));
        assert!(m.is_halted());
    }

    #[test]
    fn test_unset_entry_point_runs_from_body() {
        let bytes = [148, 0, 0, 0, 25, 0, 5, 0, 46, 0, 0, 0];
        let image = Image::from_bytes(&bytes).unwrap();
        let mut m = Machine::with_image(&image, MEM);

        m.run().unwrap();

        assert!(m.is_halted());
        assert_eq!(m.regs.get(Register::A), 5);
        assert_eq!(m.instructions(), 2);
    }

    #[test]
    fn test_jump_lands_on_target() {
        let mut m = machine(&[
            (Opcode::Jump, Image::address_of(2)),
            (Opcode::LoadAImmediate, 1),
            (Opcode::LoadBImmediate, 2),
            (Opcode::Halt, 0),
        ]);
        m.run().unwrap();
        assert_eq!(m.regs.get(Register::A), 0);
        assert_eq!(m.regs.get(Register::B), 2);
    }

    #[test]
    fn test_compare_bus_carries_instruction_operand() {
        let mut m = machine(&[(Opcode::Compare, 100), (Opcode::Halt, 0)]);
        m.mem.write(100, 55).unwrap();

        for _ in 0..7 {
            m.tick().unwrap();
        }
        let contended = m.tick().unwrap();
        assert_eq!(contended.word, ControlWord::of(&[Signal::MemoryOut, Signal::InstructionOut]));
        assert_eq!(contended.bus, 100);

        m.run().unwrap();
        assert_eq!(m.regs.get(Register::Accumulator), 0);
        assert_eq!(m.regs.get(Register::Flags), 0);
    }

    #[test]
    fn test_conditional_jumps_never_taken() {
        let mut m = machine(&[
            (Opcode::JumpZero, Image::address_of(3)),
            (Opcode::JumpCarry, Image::address_of(3)),
            (Opcode::LoadAImmediate, 4),
            (Opcode::Halt, 0),
        ]);
        m.run().unwrap();
        assert_eq!(m.regs.get(Register::A), 4);
        assert_eq!(m.regs.get(Register::Flags), 0);
    }

    #[test]
    fn test_address_survives_fetch() {
        let mut m = machine(&[
            (Opcode::LoadAddressImmediate, 77),
            (Opcode::MoveAB, 0),
            (Opcode::MoveAddressAccumulator, 0),
            (Opcode::Halt, 0),
        ]);
        m.run().unwrap();
        assert_eq!(m.regs.get(Register::Accumulator), 77);
    }

    #[test]
    fn test_device_selector_asymmetry() {
        let mut m = machine(&[
            (Opcode::LoadBImmediate, 0),
            (Opcode::In, 0),
            (Opcode::LoadAddressImmediate, 1),
            (Opcode::Out, 0),
            (Opcode::Halt, 0),
        ]);
        let (p, input) = attach_probe(&mut m.ports, 11);
        let (q, output) = attach_probe(&mut m.ports, 22);
        assert_ne!(p, q);

        m.run().unwrap();

        assert_eq!(m.regs.get(Register::IO), 11);
        assert_eq!(input.borrow().drives, 1);
        assert!(input.borrow().writes.is_empty());
        assert_eq!(output.borrow().drives, 0);
        assert_eq!(output.borrow().writes, vec![11]);
    }

    #[test]
    fn test_invalid_opcode_faults() {
        let image = Image::new(vec![InstructionWord { opcode: 999, operand: 0 }])
            .with_entry_point(BODY_START);
        let mut m = Machine::with_image(&image, MEM);
        let (_, log) = attach_probe(&mut m.ports, 0);

        let err = m.run().unwrap_err();

        assert_eq!(err, MachineError::InvalidOpcode { opcode: 999, address: BODY_START as i16 });
        assert_eq!(m.state(), MachineState::Faulted);
        assert_eq!(log.borrow().disconnects, 1);
        assert_eq!(m.tick(), Err(MachineError::NotRunning(MachineState::Faulted)));
    }

    #[test]
    fn test_memory_out_of_range_faults() {
        let mut m = machine(&[(Opcode::LoadA, 5000), (Opcode::Halt, 0)]);
        let err = m.run().unwrap_err();
        assert!(matches!(err, MachineError::Memory(MemoryError::AddressOutOfRange { address: 5000, .. })));
        assert_eq!(m.state(), MachineState::Faulted);
    }

    #[test]
    fn test_unregistered_port_faults() {
        let mut m = machine(&[(Opcode::LoadAddressImmediate, 3), (Opcode::Out, 0)]);
        attach_probe(&mut m.ports, 0);
        assert_eq!(m.run(), Err(MachineError::Port(PortError::Unregistered(3))));
    }

    #[test]
    fn test_halt_is_terminal() {
        let mut m = machine(&[(Opcode::Halt, 0)]);
        let (_, log) = attach_probe(&mut m.ports, 0);

        assert_eq!(m.run().unwrap(), 7);
        assert_eq!(m.tick(), Err(MachineError::NotRunning(MachineState::Halted)));

        m.halt();
        drop(m);
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[test]
    fn test_drop_disconnects_running_machine() {
        let mut m = machine(&[(Opcode::MoveAB, 0)]);
        let (_, log) = attach_probe(&mut m.ports, 0);
        m.tick().unwrap();
        drop(m);
        assert_eq!(log.borrow().disconnects, 1);
    }

    #[test]
    fn test_run_limited() {
        let mut m = machine(&[(Opcode::Jump, BODY_START)]);
        assert_eq!(m.run_limited(50).unwrap(), 50);
        assert!(m.is_running());
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut m = machine(&[(Opcode::LoadAImmediate, 3), (Opcode::Halt, 0)]);
        m.run().unwrap();
        let json = serde_json::to_string(&m.snapshot()).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, MachineState::Halted);
        assert_eq!(back.registers.get(Register::A), 3);
        assert_eq!(back.instructions, 2);
    }

    #[test]
    fn test_from_config_loads_image() {
        let path = std::env::temp_dir().join(format!("microbus-config-{}.bin", std::process::id()));
        crate::asm::image::save_image(&path, &program(&[(Opcode::LoadBImmediate, 6), (Opcode::Halt, 0)]), None).unwrap();
        let config = MachineConfig { memory_size: 64, clock_rate: 0, image: Some(path.clone()) };

        let mut m = Machine::from_config(&config).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(m.mem.size(), 64);
        m.run_clocked(&config.clock(), None).unwrap();
        assert_eq!(m.regs.get(Register::B), 6);
    }

    #[test]
    fn test_from_config_rejects_odd_memory() {
        let config = MachineConfig { memory_size: 63, ..Default::default() };
        assert!(matches!(Machine::from_config(&config), Err(crate::Error::Config(_))));
    }

    fn alu_sequence(subtract: bool) -> Microprogram {
        let mut last = ControlWord::of(&[Signal::AluEnable, Signal::AccumulatorIn]);
        if subtract {
            last = last.with(Signal::Subtract);
        }
        Microprogram::new([ControlWord::of(&[Signal::IoOut, Signal::BIn]), last, ControlWord::EMPTY])
    }

    proptest! {
        #[test]
        fn prop_alu_sign_follows_b_load(a in any::<i16>(), b in any::<i16>(), subtract in any::<bool>()) {
            let mut m = Machine::new(MEM);
            m.regs.set(Register::IO, b);
            m.regs.set(Register::A, a);
            m.enqueue(&alu_sequence(subtract));

            m.tick().unwrap();
            m.tick().unwrap();

            let expected = if subtract { a.wrapping_sub(b) } else { a.wrapping_add(b) };
            prop_assert_eq!(m.regs.get(Register::Accumulator), expected);
        }

        #[test]
        fn prop_bus_cleared_after_every_tick(values in proptest::collection::vec(any::<u16>(), 1..8)) {
            let mut words: Vec<(Opcode, u16)> = Vec::new();
            for (i, v) in values.iter().enumerate() {
                let op = [Opcode::LoadAImmediate, Opcode::LoadBImmediate, Opcode::LoadIoImmediate][i % 3];
                words.push((op, *v));
                words.push((Opcode::Sum, 0));
            }
            words.push((Opcode::Halt, 0));
            let mut m = machine(&words);

            while m.is_running() {
                m.tick().unwrap();
                prop_assert_eq!(m.bus(), 0);
            }
        }

        #[test]
        fn prop_entry_point_selects_first_word(slot in 0usize..100) {
            let mut words = vec![InstructionWord::bare(Opcode::MoveAB); 100];
            words[slot] = InstructionWord::bare(Opcode::Halt);
            let entry = Image::address_of(slot);
            let image = Image::new(words).with_entry_point(entry);
            let mut m = Machine::with_image(&image, 1024);

            m.tick().unwrap();
            let fetch = m.tick().unwrap();
            prop_assert_eq!(fetch.bus, entry as i16);
            let decode = m.tick().unwrap();
            prop_assert_eq!(decode.decoded, Some(Opcode::Halt));
            prop_assert_eq!(m.regs.get(Register::Address), entry as i16);
            let byte = entry as usize * 2;
            prop_assert_eq!(&m.mem.to_bytes()[byte..byte + 2], &[46u8, 0][..]);
        }
    }
}
