//! Control signals, control words and the microcode table.
//!
//! Every opcode expands into at most three control words. A control word is
//! a set of signals asserted together during one tick. Empty words in a table
//! entry are padding and are never enqueued.

use crate::cpu::alu::AluOp;
use crate::cpu::registers::Register;
use serde::{Serialize, Deserialize};

/// A single control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    InstructionIn,
    /// Latch the operand half of an instruction word. Unlike
    /// `InstructionIn` this does not decode.
    InstructionParamIn,
    InstructionOut,
    ProgramCounterIn,
    ProgramCounterOut,
    ProgramCounterIncrement,
    AccumulatorIn,
    AccumulatorOut,
    AddressIn,
    AddressOut,
    AddressBackupIn,
    AddressBackupOut,
    AIn,
    AOut,
    BIn,
    BOut,
    IoIn,
    IoOut,
    FlagsIn,
    FlagsOut,
    MemoryIn,
    MemoryOut,
    AluEnable,
    Subtract,
    PeripheralIn,
    PeripheralOut,
    Halt,
}

impl Signal {
    pub const ALL: [Signal; 27] = [
        Signal::InstructionIn,
        Signal::InstructionParamIn,
        Signal::InstructionOut,
        Signal::ProgramCounterIn,
        Signal::ProgramCounterOut,
        Signal::ProgramCounterIncrement,
        Signal::AccumulatorIn,
        Signal::AccumulatorOut,
        Signal::AddressIn,
        Signal::AddressOut,
        Signal::AddressBackupIn,
        Signal::AddressBackupOut,
        Signal::AIn,
        Signal::AOut,
        Signal::BIn,
        Signal::BOut,
        Signal::IoIn,
        Signal::IoOut,
        Signal::FlagsIn,
        Signal::FlagsOut,
        Signal::MemoryIn,
        Signal::MemoryOut,
        Signal::AluEnable,
        Signal::Subtract,
        Signal::PeripheralIn,
        Signal::PeripheralOut,
        Signal::Halt,
    ];

    #[inline]
    const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Register this signal drives onto the bus, if any.
    pub fn drives(self) -> Option<Register> {
        match self {
            Signal::InstructionOut => Some(Register::Instruction),
            Signal::ProgramCounterOut => Some(Register::ProgramCounter),
            Signal::AccumulatorOut => Some(Register::Accumulator),
            Signal::AddressOut => Some(Register::Address),
            Signal::AddressBackupOut => Some(Register::AddressBackup),
            Signal::AOut => Some(Register::A),
            Signal::BOut => Some(Register::B),
            Signal::IoOut => Some(Register::IO),
            Signal::FlagsOut => Some(Register::Flags),
            _ => None,
        }
    }

    /// Register this signal latches from the bus, if any.
    ///
    /// `FlagsIn` is wired to nothing: the flags are never written.
    pub fn latches(self) -> Option<Register> {
        match self {
            Signal::InstructionIn | Signal::InstructionParamIn => Some(Register::Instruction),
            Signal::ProgramCounterIn => Some(Register::ProgramCounter),
            Signal::AccumulatorIn => Some(Register::Accumulator),
            Signal::AddressIn => Some(Register::Address),
            Signal::AddressBackupIn => Some(Register::AddressBackup),
            Signal::AIn => Some(Register::A),
            Signal::BIn => Some(Register::B),
            Signal::IoIn => Some(Register::IO),
            _ => None,
        }
    }

    /// Whether the signal places a value on the bus.
    pub fn is_driver(self) -> bool {
        self.drives().is_some()
            || matches!(self, Signal::MemoryOut | Signal::AluEnable | Signal::PeripheralOut)
    }

    /// Whether the signal consumes the bus value.
    pub fn is_latch(self) -> bool {
        self.latches().is_some()
            || matches!(self, Signal::FlagsIn | Signal::MemoryIn | Signal::PeripheralIn)
    }
}

/// A set of simultaneously asserted signals.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlWord(u32);

impl ControlWord {
    /// The word with no signals.
    pub const EMPTY: ControlWord = ControlWord(0);

    /// Build a word from a list of signals.
    pub const fn of(signals: &[Signal]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < signals.len() {
            bits |= signals[i].bit();
            i += 1;
        }
        ControlWord(bits)
    }

    pub const fn with(self, signal: Signal) -> Self {
        ControlWord(self.0 | signal.bit())
    }

    pub const fn contains(self, signal: Signal) -> bool {
        self.0 & signal.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The asserted signals, in declaration order.
    pub fn signals(self) -> impl Iterator<Item = Signal> {
        Signal::ALL.into_iter().filter(move |s| self.contains(*s))
    }

    /// Whether the word latches register A or B, which samples the ALU.
    pub fn loads_alu(self) -> bool {
        self.contains(Signal::AIn) || self.contains(Signal::BIn)
    }
}

impl std::fmt::Debug for ControlWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.signals()).finish()
    }
}

impl std::fmt::Display for ControlWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.signals().map(|s| format!("{:?}", s)).collect();
        write!(f, "[{}]", names.join(" "))
    }
}

/// The fixed six-word fetch sequence.
pub const FETCH: [ControlWord; 6] = {
    use Signal::*;
    [
        ControlWord::of(&[AddressOut, AddressBackupIn]),
        ControlWord::of(&[ProgramCounterOut, AddressIn]),
        ControlWord::of(&[MemoryOut, InstructionIn, ProgramCounterIncrement]),
        ControlWord::of(&[ProgramCounterOut, AddressIn]),
        ControlWord::of(&[MemoryOut, InstructionParamIn, ProgramCounterIncrement]),
        ControlWord::of(&[AddressBackupOut, AddressIn]),
    ]
};

/// Up to three execute-phase control words for one opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Microprogram {
    words: [ControlWord; 3],
}

impl Microprogram {
    pub const fn new(words: [ControlWord; 3]) -> Self {
        Self { words }
    }

    const fn one(a: &[Signal]) -> Self {
        Self::new([ControlWord::of(a), ControlWord::EMPTY, ControlWord::EMPTY])
    }

    const fn two(a: &[Signal], b: &[Signal]) -> Self {
        Self::new([ControlWord::of(a), ControlWord::of(b), ControlWord::EMPTY])
    }

    const fn three(a: &[Signal], b: &[Signal], c: &[Signal]) -> Self {
        Self::new([ControlWord::of(a), ControlWord::of(b), ControlWord::of(c)])
    }

    /// Words that are actually enqueued.
    pub fn words(&self) -> impl Iterator<Item = ControlWord> + '_ {
        self.words.iter().copied().filter(|w| !w.is_empty())
    }

    /// Number of execute ticks this program adds after the fetch.
    pub fn len(&self) -> usize {
        self.words().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// ALU operation for this instruction.
    ///
    /// The ALU subtracts when the word enqueued right after an A or B latch
    /// carries `Subtract`; otherwise it adds. Any microprogram using the ALU
    /// must therefore put `Subtract` in the word following its B load.
    pub fn operation(&self) -> AluOp {
        let words: Vec<ControlWord> = self.words().collect();
        let subtract = words
            .windows(2)
            .any(|pair| pair[0].loads_alu() && pair[1].contains(Signal::Subtract));

        if subtract {
            AluOp::Subtract
        } else {
            AluOp::Add
        }
    }
}

/// Instruction set. Discriminants are the encoded opcode ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum Opcode {
    MoveAB,
    MoveAAccumulator,
    MoveAAddress,
    MoveAIo,
    MoveBA,
    MoveBAccumulator,
    MoveBAddress,
    MoveBIo,
    MoveAccumulatorA,
    MoveAccumulatorB,
    MoveAccumulatorAddress,
    MoveAccumulatorIo,
    MoveAddressA,
    MoveAddressB,
    MoveAddressAccumulator,
    MoveAddressIo,
    MoveIoA,
    MoveIoB,
    MoveIoAccumulator,
    MoveIoAddress,

    LoadA,
    LoadB,
    LoadAccumulator,
    LoadAddress,
    LoadIo,
    LoadAImmediate,
    LoadBImmediate,
    LoadAccumulatorImmediate,
    LoadAddressImmediate,
    LoadIoImmediate,
    StoreA,
    StoreB,
    StoreAccumulator,
    StoreAddress,
    StoreIo,
    StoreImmediate,

    Add,
    Sum,
    Subtract,
    Difference,
    Compare,

    Jump,
    JumpZero,
    JumpCarry,

    In,
    Out,
    Halt,
}

impl Opcode {
    pub const ALL: [Opcode; 47] = {
        use Opcode::*;
        [
            MoveAB, MoveAAccumulator, MoveAAddress, MoveAIo,
            MoveBA, MoveBAccumulator, MoveBAddress, MoveBIo,
            MoveAccumulatorA, MoveAccumulatorB, MoveAccumulatorAddress, MoveAccumulatorIo,
            MoveAddressA, MoveAddressB, MoveAddressAccumulator, MoveAddressIo,
            MoveIoA, MoveIoB, MoveIoAccumulator, MoveIoAddress,
            LoadA, LoadB, LoadAccumulator, LoadAddress, LoadIo,
            LoadAImmediate, LoadBImmediate, LoadAccumulatorImmediate,
            LoadAddressImmediate, LoadIoImmediate,
            StoreA, StoreB, StoreAccumulator, StoreAddress, StoreIo, StoreImmediate,
            Add, Sum, Subtract, Difference, Compare,
            Jump, JumpZero, JumpCarry,
            In, Out, Halt,
        ]
    };

    /// Encoded id.
    pub fn id(self) -> i16 {
        self as i16
    }

    pub fn from_id(id: i16) -> Option<Opcode> {
        usize::try_from(id).ok().and_then(|i| Self::ALL.get(i)).copied()
    }

    /// Register move between two of A, B, Accumulator, Address and IO.
    pub fn for_move(src: Register, dst: Register) -> Option<Opcode> {
        use Register::*;
        let op = match (src, dst) {
            (A, B) => Opcode::MoveAB,
            (A, Accumulator) => Opcode::MoveAAccumulator,
            (A, Address) => Opcode::MoveAAddress,
            (A, IO) => Opcode::MoveAIo,
            (B, A) => Opcode::MoveBA,
            (B, Accumulator) => Opcode::MoveBAccumulator,
            (B, Address) => Opcode::MoveBAddress,
            (B, IO) => Opcode::MoveBIo,
            (Accumulator, A) => Opcode::MoveAccumulatorA,
            (Accumulator, B) => Opcode::MoveAccumulatorB,
            (Accumulator, Address) => Opcode::MoveAccumulatorAddress,
            (Accumulator, IO) => Opcode::MoveAccumulatorIo,
            (Address, A) => Opcode::MoveAddressA,
            (Address, B) => Opcode::MoveAddressB,
            (Address, Accumulator) => Opcode::MoveAddressAccumulator,
            (Address, IO) => Opcode::MoveAddressIo,
            (IO, A) => Opcode::MoveIoA,
            (IO, B) => Opcode::MoveIoB,
            (IO, Accumulator) => Opcode::MoveIoAccumulator,
            (IO, Address) => Opcode::MoveIoAddress,
            _ => return None,
        };
        Some(op)
    }

    /// Direct-address load into `reg`.
    pub fn for_load(reg: Register) -> Option<Opcode> {
        Some(match reg {
            Register::A => Opcode::LoadA,
            Register::B => Opcode::LoadB,
            Register::Accumulator => Opcode::LoadAccumulator,
            Register::Address => Opcode::LoadAddress,
            Register::IO => Opcode::LoadIo,
            _ => return None,
        })
    }

    /// Immediate load into `reg`.
    pub fn for_load_immediate(reg: Register) -> Option<Opcode> {
        Some(match reg {
            Register::A => Opcode::LoadAImmediate,
            Register::B => Opcode::LoadBImmediate,
            Register::Accumulator => Opcode::LoadAccumulatorImmediate,
            Register::Address => Opcode::LoadAddressImmediate,
            Register::IO => Opcode::LoadIoImmediate,
            _ => return None,
        })
    }

    /// Direct-address store of `reg`.
    pub fn for_store(reg: Register) -> Option<Opcode> {
        Some(match reg {
            Register::A => Opcode::StoreA,
            Register::B => Opcode::StoreB,
            Register::Accumulator => Opcode::StoreAccumulator,
            Register::Address => Opcode::StoreAddress,
            Register::IO => Opcode::StoreIo,
            _ => return None,
        })
    }

    /// The microprogram for this opcode.
    pub fn microprogram(self) -> Microprogram {
        use Signal::*;

        const fn mov(src: Signal, dst: Signal) -> Microprogram {
            Microprogram::one(&[src, dst])
        }
        const fn load(dst: Signal) -> Microprogram {
            Microprogram::two(&[InstructionOut, AddressIn], &[MemoryOut, dst])
        }
        const fn load_immediate(dst: Signal) -> Microprogram {
            Microprogram::two(&[InstructionOut, MemoryIn], &[MemoryOut, dst])
        }
        const fn store(src: Signal) -> Microprogram {
            Microprogram::two(&[InstructionOut, AddressIn], &[src, MemoryIn])
        }

        match self {
            Opcode::MoveAB => mov(AOut, BIn),
            Opcode::MoveAAccumulator => mov(AOut, AccumulatorIn),
            Opcode::MoveAAddress => mov(AOut, AddressIn),
            Opcode::MoveAIo => mov(AOut, IoIn),
            Opcode::MoveBA => mov(BOut, AIn),
            Opcode::MoveBAccumulator => mov(BOut, AccumulatorIn),
            Opcode::MoveBAddress => mov(BOut, AddressIn),
            Opcode::MoveBIo => mov(BOut, IoIn),
            Opcode::MoveAccumulatorA => mov(AccumulatorOut, AIn),
            Opcode::MoveAccumulatorB => mov(AccumulatorOut, BIn),
            Opcode::MoveAccumulatorAddress => mov(AccumulatorOut, AddressIn),
            Opcode::MoveAccumulatorIo => mov(AccumulatorOut, IoIn),
            Opcode::MoveAddressA => mov(AddressOut, AIn),
            Opcode::MoveAddressB => mov(AddressOut, BIn),
            Opcode::MoveAddressAccumulator => mov(AddressOut, AccumulatorIn),
            Opcode::MoveAddressIo => mov(AddressOut, IoIn),
            Opcode::MoveIoA => mov(IoOut, AIn),
            Opcode::MoveIoB => mov(IoOut, BIn),
            Opcode::MoveIoAccumulator => mov(IoOut, AccumulatorIn),
            Opcode::MoveIoAddress => mov(IoOut, AddressIn),

            Opcode::LoadA => load(AIn),
            Opcode::LoadB => load(BIn),
            Opcode::LoadAccumulator => load(AccumulatorIn),
            Opcode::LoadAddress => load(AddressIn),
            Opcode::LoadIo => load(IoIn),
            Opcode::LoadAImmediate => load_immediate(AIn),
            Opcode::LoadBImmediate => load_immediate(BIn),
            Opcode::LoadAccumulatorImmediate => load_immediate(AccumulatorIn),
            Opcode::LoadAddressImmediate => load_immediate(AddressIn),
            Opcode::LoadIoImmediate => load_immediate(IoIn),
            Opcode::StoreA => store(AOut),
            Opcode::StoreB => store(BOut),
            Opcode::StoreAccumulator => store(AccumulatorOut),
            Opcode::StoreAddress => store(AddressOut),
            Opcode::StoreIo => store(IoOut),
            Opcode::StoreImmediate => Microprogram::one(&[InstructionOut, MemoryIn]),

            Opcode::Add => Microprogram::three(
                &[InstructionOut, AddressIn],
                &[MemoryOut, BIn],
                &[AluEnable, AccumulatorIn],
            ),
            Opcode::Sum => Microprogram::two(&[MemoryOut, BIn], &[AluEnable, AccumulatorIn]),
            Opcode::Subtract => Microprogram::three(
                &[InstructionOut, AddressIn],
                &[MemoryOut, BIn],
                &[AluEnable, AccumulatorIn, Signal::Subtract],
            ),
            Opcode::Difference => Microprogram::two(
                &[MemoryOut, BIn],
                &[AluEnable, AccumulatorIn, Signal::Subtract],
            ),
            // The instruction register wins the second word's bus. Nothing
            // latches A or B, so the ALU sign stays Add.
            Opcode::Compare => Microprogram::three(
                &[InstructionOut, AddressIn],
                &[MemoryOut, InstructionOut],
                &[AluEnable, Signal::Subtract, FlagsIn],
            ),

            Opcode::Jump => Microprogram::one(&[InstructionOut, ProgramCounterIn]),
            // Zero and Carry are never set, so these never jump.
            Opcode::JumpZero | Opcode::JumpCarry => Microprogram::default(),

            Opcode::In => Microprogram::one(&[PeripheralOut, IoIn]),
            Opcode::Out => Microprogram::one(&[IoOut, PeripheralIn]),
            Opcode::Halt => Microprogram::one(&[Signal::Halt]),
        }
    }

    /// Whether the operand field means anything for this opcode.
    pub fn takes_operand(self) -> bool {
        self.microprogram()
            .words()
            .any(|w| w.contains(Signal::InstructionOut))
    }
}

/// Result of looking up a fetched opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Recognized(Opcode, Microprogram),
    Unrecognized(i16),
}

/// Look up the microprogram for a raw opcode id.
pub fn decode(id: i16) -> Decoded {
    match Opcode::from_id(id) {
        Some(op) => Decoded::Recognized(op, op.microprogram()),
        None => Decoded::Unrecognized(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_ids_are_positions() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.id() as usize, i);
            assert_eq!(Opcode::from_id(i as i16), Some(*op));
        }
        assert_eq!(Opcode::Halt.id(), 46);
        assert_eq!(Opcode::LoadAImmediate.id(), 25);
        assert_eq!(Opcode::from_id(47), None);
        assert_eq!(Opcode::from_id(-1), None);
    }

    #[test]
    fn test_decode_unknown() {
        assert_eq!(decode(500), Decoded::Unrecognized(500));
        assert!(matches!(decode(46), Decoded::Recognized(Opcode::Halt, _)));
    }

    #[test]
    fn test_control_word_set() {
        let word = ControlWord::of(&[Signal::AOut, Signal::BIn]);
        assert!(word.contains(Signal::AOut));
        assert!(word.contains(Signal::BIn));
        assert!(!word.contains(Signal::Halt));
        assert_eq!(word.signals().collect::<Vec<_>>(), vec![Signal::AOut, Signal::BIn]);
        assert!(ControlWord::EMPTY.is_empty());
        assert_eq!(ControlWord::EMPTY.with(Signal::Halt), ControlWord::of(&[Signal::Halt]));
    }

    #[test]
    fn test_every_signal_has_one_role() {
        for s in Signal::ALL {
            assert!(!(s.is_driver() && s.is_latch()), "{:?}", s);
        }
    }

    #[test]
    fn test_program_lengths() {
        assert_eq!(Opcode::MoveAB.microprogram().len(), 1);
        assert_eq!(Opcode::LoadB.microprogram().len(), 2);
        assert_eq!(Opcode::Add.microprogram().len(), 3);
        assert_eq!(Opcode::JumpZero.microprogram().len(), 0);
        assert_eq!(Opcode::JumpCarry.microprogram().len(), 0);
        for op in Opcode::ALL {
            assert!(op.microprogram().len() <= 3);
        }
    }

    #[test]
    fn test_alu_operation() {
        assert_eq!(Opcode::Add.microprogram().operation(), AluOp::Add);
        assert_eq!(Opcode::Sum.microprogram().operation(), AluOp::Add);
        assert_eq!(Opcode::Subtract.microprogram().operation(), AluOp::Subtract);
        assert_eq!(Opcode::Difference.microprogram().operation(), AluOp::Subtract);
        assert_eq!(Opcode::MoveAB.microprogram().operation(), AluOp::Add);
    }

    #[test]
    fn test_subtract_must_follow_the_b_load() {
        use Signal::*;
        // Subtract two words after the load does not count.
        let late = Microprogram::new([
            ControlWord::of(&[MemoryOut, BIn]),
            ControlWord::of(&[AccumulatorOut]),
            ControlWord::of(&[AluEnable, AccumulatorIn, Subtract]),
        ]);
        assert_eq!(late.operation(), AluOp::Add);

        // Empty padding between them is skipped, as it is never enqueued.
        let padded = Microprogram::new([
            ControlWord::of(&[MemoryOut, BIn]),
            ControlWord::EMPTY,
            ControlWord::of(&[AluEnable, AccumulatorIn, Subtract]),
        ]);
        assert_eq!(padded.operation(), AluOp::Subtract);
    }

    #[test]
    fn test_operand_usage() {
        assert!(Opcode::Jump.takes_operand());
        assert!(Opcode::LoadAImmediate.takes_operand());
        assert!(!Opcode::Sum.takes_operand());
        assert!(!Opcode::Halt.takes_operand());
        assert!(!Opcode::JumpZero.takes_operand());
    }
}
