use crate::runtime::runtime_error::VmError;

/// Error raised while feeding a record stream into the machine.
///
/// Loader inconsistencies are not recoverable: the driver prints the
/// diagnostic and gives up on the program.
#[derive(Debug)]
pub enum LoadError {
    /// A token that does not parse as what the record grammar expects.
    BadRecord {
        expected: &'static str,
        token: String,
    },
    /// An opcode name that the instruction set does not define.
    UnknownOpcode { name: String },
    /// A numeric opcode outside the instruction set.
    UnknownCode { code: i64 },
    /// A record cut short by the end of the stream.
    TruncatedRecord { expected: &'static str },
    /// A `CONSTANT` record addressing a cell the pool does not have.
    ConstantOutsidePool { index: i64 },
    /// A dispatch triggered by the stream failed.
    Runtime(VmError),
    Io(std::io::Error),
}

impl LoadError {
    pub fn bad_record(expected: &'static str, token: &str) -> Self {
        LoadError::BadRecord {
            expected,
            token: token.to_string(),
        }
    }

    pub fn unknown_opcode(name: &str) -> Self {
        LoadError::UnknownOpcode {
            name: name.to_string(),
        }
    }

    pub fn unknown_code(code: i64) -> Self {
        LoadError::UnknownCode { code }
    }

    pub fn truncated(expected: &'static str) -> Self {
        LoadError::TruncatedRecord { expected }
    }

    pub fn constant_outside_pool(index: i64) -> Self {
        LoadError::ConstantOutsidePool { index }
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::BadRecord { expected, token } => {
                write!(f, "load error: expected {}, got '{}'", expected, token)
            }
            LoadError::UnknownOpcode { name } => {
                write!(f, "load error: unknown opcode name '{}'", name)
            }
            LoadError::UnknownCode { code } => {
                write!(f, "load error: unknown opcode {}", code)
            }
            LoadError::TruncatedRecord { expected } => {
                write!(f, "load error: expected {}, got end of input", expected)
            }
            LoadError::ConstantOutsidePool { index } => {
                write!(f, "load error: constant {} outside the allocated pool", index)
            }
            LoadError::Runtime(e) => write!(f, "{}", e),
            LoadError::Io(e) => write!(f, "load error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<VmError> for LoadError {
    fn from(e: VmError) -> Self {
        LoadError::Runtime(e)
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}
