use crate::bytecode::Opcode;
use serde::{Deserialize, Serialize};

/// A decoded instruction: source address, opcode, at most one immediate.
///
/// Addresses are sparse labels chosen by the program; the runtime image maps
/// them back to instruction indices for jump and call targets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instruct {
    pub addr: i64,
    pub op: Opcode,
    pub operand: i64,
}

impl Instruct {
    pub fn new(addr: i64, op: Opcode, operand: i64) -> Self {
        Self { addr, op, operand }
    }

    /// Instruction without an immediate.
    pub fn plain(addr: i64, op: Opcode) -> Self {
        Self {
            addr,
            op,
            operand: 0,
        }
    }
}
