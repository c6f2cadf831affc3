//! Code buffer: append-only instruction storage with operand patching.
//!
//! The buffer hands out stable [`InstrHandle`]s on append so forward jumps
//! can be emitted with a placeholder target and patched once the target
//! address is known. Instruction *addresses* — jump targets, subroutine
//! entry points, [`CodeBlock::current_address`] — are 1-based: the first
//! instruction lives at address 1 and 0 serves as the don't-care operand
//! sentinel.

use std::fmt;
use std::io::{self, Read, Write};

use super::op::Opcode;

/// Maximum number of instructions a code block can hold.
pub const MAX_CODE_SIZE: usize = 10_000;

/// Don't-care value for unused operand slots.
pub const DC: i32 = 0;

/// One fixed-shape instruction: opcode plus two word operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub op: Opcode,
    pub p: i32,
    pub q: i32,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op.arity() {
            2 => write!(f, "{} {},{}", self.op, self.p, self.q),
            1 => write!(f, "{} {}", self.op, self.q),
            _ => write!(f, "{}", self.op),
        }
    }
}

/// Stable reference to an emitted instruction, used for backpatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrHandle(usize);

/// Append-only instruction buffer.
#[derive(Debug, Default)]
pub struct CodeBlock {
    code: Vec<Instruction>,
}

impl CodeBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an instruction, returning a handle for later patching.
    ///
    /// Fails when the buffer is full.
    pub fn append(&mut self, op: Opcode, p: i32, q: i32) -> Result<InstrHandle, CodeOverflow> {
        if self.code.len() >= MAX_CODE_SIZE {
            return Err(CodeOverflow);
        }
        let handle = InstrHandle(self.code.len());
        self.code.push(Instruction { op, p, q });
        Ok(handle)
    }

    /// Address the next appended instruction will occupy (1-based).
    pub fn current_address(&self) -> i32 {
        self.code.len() as i32 + 1
    }

    /// Overwrites the second operand of a previously emitted instruction.
    pub fn patch(&mut self, handle: InstrHandle, q: i32) {
        self.code[handle.0].q = q;
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The instruction at a 1-based address.
    pub fn at(&self, address: i32) -> Option<&Instruction> {
        usize::try_from(address)
            .ok()
            .and_then(|addr| addr.checked_sub(1))
            .and_then(|index| self.code.get(index))
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    /// Writes the raw image: contiguous `(op, p, q)` triples of native-order
    /// 32-bit words, no header.
    pub fn serialize<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        for ins in &self.code {
            sink.write_all(&(ins.op as i32).to_ne_bytes())?;
            sink.write_all(&ins.p.to_ne_bytes())?;
            sink.write_all(&ins.q.to_ne_bytes())?;
        }
        Ok(())
    }

    /// Reads an image produced by [`CodeBlock::serialize`].
    ///
    /// Rejects images with unknown opcodes or a length that is not a whole
    /// number of instruction records.
    pub fn load<R: Read>(source: &mut R) -> io::Result<Self> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        if bytes.len() % 12 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "image length is not a whole number of instructions",
            ));
        }
        let mut code = Vec::with_capacity(bytes.len() / 12);
        for record in bytes.chunks_exact(12) {
            let word = |i: usize| i32::from_ne_bytes(record[i..i + 4].try_into().expect("4-byte chunk"));
            let op = Opcode::try_from(word(0))
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("unknown opcode {}", word(0))))?;
            code.push(Instruction {
                op,
                p: word(4),
                q: word(8),
            });
        }
        Ok(Self { code })
    }
}

impl fmt::Display for CodeBlock {
    /// Disassembly listing, one instruction per line with its address.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, ins) in self.code.iter().enumerate() {
            writeln!(f, "{:4}: {ins}", index + 1)?;
        }
        Ok(())
    }
}

/// The code buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeOverflow;
