/// Error raised while encoding or decoding a textual instruction stream
/// (assembly input, image records).
#[derive(Debug)]
pub enum StreamError {
    /// An opcode name that the instruction set does not define.
    UnknownOpcode { name: String },
    /// A numeric opcode outside the instruction set.
    UnknownCode { code: i64 },
    /// A token that does not parse as what the record grammar expects.
    BadToken {
        expected: &'static str,
        token: String,
    },
    /// A record cut short by the end of the stream.
    UnexpectedEnd { expected: &'static str },
    Io(std::io::Error),
}

impl StreamError {
    pub fn unknown_opcode(name: &str) -> Self {
        StreamError::UnknownOpcode {
            name: name.to_string(),
        }
    }

    pub fn unknown_code(code: i64) -> Self {
        StreamError::UnknownCode { code }
    }

    pub fn bad_token(expected: &'static str, token: &str) -> Self {
        StreamError::BadToken {
            expected,
            token: token.to_string(),
        }
    }

    pub fn unexpected_end(expected: &'static str) -> Self {
        StreamError::UnexpectedEnd { expected }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::UnknownOpcode { name } => {
                write!(f, "stream error: unknown opcode name '{}'", name)
            }
            StreamError::UnknownCode { code } => {
                write!(f, "stream error: unknown opcode {}", code)
            }
            StreamError::BadToken { expected, token } => {
                write!(f, "stream error: expected {}, got '{}'", expected, token)
            }
            StreamError::UnexpectedEnd { expected } => {
                write!(f, "stream error: expected {}, got end of input", expected)
            }
            StreamError::Io(e) => write!(f, "stream error: {}", e),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Io(e)
    }
}
