use crate::lang::value::SlotRef;

/// A function-invocation record: local variable cells, a private operand
/// stack, and the instruction index to resume at after `RET`.
///
/// Popping a frame drops it, which releases each local and each remaining
/// operand exactly once.
#[derive(Default)]
pub struct Frame {
    pub locals: Vec<Option<SlotRef>>,
    pub operands: Vec<SlotRef>,
    pub return_ip: usize,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }
}
