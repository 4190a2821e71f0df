use crate::lang::value::Kind;

/// Error raised by the dispatch loop.
///
/// The instruction set defines no catchable errors; every one of these
/// aborts the program with a diagnostic instead of continuing with
/// nondeterministic state.
#[derive(Debug)]
pub struct VmError {
    pub message: String,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for VmError {}

impl VmError {
    pub fn new(msg: impl Into<String>) -> Self {
        VmError {
            message: msg.into(),
        }
    }
}

pub fn stack_underflow() -> VmError {
    VmError::new("operand stack underflow")
}

pub fn stack_overflow(limit: usize) -> VmError {
    VmError::new(format!("operand stack overflow (limit {})", limit))
}

pub fn call_depth_exceeded(limit: usize) -> VmError {
    VmError::new(format!("frame stack depth exceeded (limit {})", limit))
}

pub fn unmapped_address(addr: i64) -> VmError {
    VmError::new(format!("jump to unmapped address {}", addr))
}

pub fn no_active_frame(opcode: &str) -> VmError {
    VmError::new(format!("{} requires an active frame", opcode))
}

pub fn subscript_out_of_bounds(index: i64, len: usize) -> VmError {
    VmError::new(format!(
        "subscript {} out of bounds for array[{}]",
        index, len
    ))
}

pub fn variable_out_of_range(scope: &str, index: i64, len: usize) -> VmError {
    VmError::new(format!(
        "{} variable {} outside the allocated area of {}",
        scope, index, len
    ))
}

pub fn unbound_variable(scope: &str, index: i64) -> VmError {
    VmError::new(format!("{} variable {} read before any store", scope, index))
}

pub fn unset_constant(index: i64) -> VmError {
    VmError::new(format!("constant {} not installed", index))
}

pub fn kind_mismatch(what: &str, expected: Kind, got: Kind) -> VmError {
    VmError::new(format!(
        "{} expects {}, got {}",
        what,
        expected.name(),
        got.name()
    ))
}

pub fn array_expected(got: Kind) -> VmError {
    VmError::new(format!("subscript target is {}, not an array", got.name()))
}

pub fn invalid_element_kind(code: i64) -> VmError {
    VmError::new(format!("invalid array element kind {}", code))
}

pub fn negative_allocation(what: &str, n: i64) -> VmError {
    VmError::new(format!("{} with negative size {}", what, n))
}

pub fn division_by_zero() -> VmError {
    VmError::new("division by zero")
}

pub fn modulo_by_zero() -> VmError {
    VmError::new("modulo by zero")
}

pub fn unknown_operator(opcode: &str, code: i64) -> VmError {
    VmError::new(format!("{} with unknown operator {}", opcode, code))
}
