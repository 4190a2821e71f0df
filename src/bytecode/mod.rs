//! # SVM bytecode
//!
//! The wire-level view of a program: instruction codes, decoded instruction
//! records, the obfuscation codec, and the assemble/disassemble shims that
//! translate between textual records and image files.

pub mod asm;
pub mod codec;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod stream_error;

pub use ir::Instruct;
pub use op::Opcode;
