//! Instruction model, code generation and the reference VM.

pub mod code;
pub mod emit;
pub mod op;
pub mod vm;

pub use code::{CodeBlock, InstrHandle, Instruction};
pub use emit::CodeGen;
pub use op::Opcode;
pub use vm::{RecordedIo, StdIo, Vm, VmError, VmIo};
