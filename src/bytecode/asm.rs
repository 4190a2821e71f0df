use crate::bytecode::codec::{transcode, MAGIC};
use crate::bytecode::stream_error::StreamError;
use crate::bytecode::Opcode;
use std::fs;
use std::path::Path;

/// Translate `addr NAME [operand]` records into the numeric record stream
/// of an image, magic included.
///
/// Operand tokens are carried over verbatim, so a `CONSTANT` record keeps
/// its kind/value/refcount fields (the value field may be fractional).
pub fn assemble_source(src: &str) -> Result<String, StreamError> {
    let mut out: Vec<String> = vec![MAGIC.to_string()];
    let mut tokens = src.split_whitespace();

    while let Some(addr) = tokens.next() {
        addr.parse::<i64>()
            .map_err(|_| StreamError::bad_token("address", addr))?;

        let name = tokens
            .next()
            .ok_or_else(|| StreamError::unexpected_end("opcode name"))?;
        let op = Opcode::from_name(name).ok_or_else(|| StreamError::unknown_opcode(name))?;

        out.push(addr.to_string());
        out.push(op.code().to_string());

        for _ in 0..op.operand_count() {
            let operand = tokens
                .next()
                .ok_or_else(|| StreamError::unexpected_end("operand"))?;
            // CONSTANT values may be fractional; every other operand is an
            // integer, and integers pass the float check too.
            operand
                .parse::<f64>()
                .map_err(|_| StreamError::bad_token("operand", operand))?;
            out.push(operand.to_string());
        }
    }

    Ok(out.join(" "))
}

/// Assemble a textual source file into an obfuscated image file.
pub fn assemble(src_path: &Path, out_path: &Path, key: &str) -> Result<(), StreamError> {
    let src = fs::read_to_string(src_path)?;
    let mut bytes = assemble_source(&src)?.into_bytes();
    transcode(&mut bytes, key.as_bytes());
    fs::write(out_path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_simple_program() {
        let src = "0 LOAD_INT 2\n1 LOAD_INT 3\n2 BINARY_OP 0\n3 PRINTK\n4 HALT\n";
        let image = assemble_source(src).unwrap();
        assert_eq!(image, "80JF34R9S 0 9 2 1 9 3 2 21 0 3 32 4 31");
    }

    #[test]
    fn test_assemble_empty_source() {
        assert_eq!(assemble_source("").unwrap(), "80JF34R9S");
    }

    #[test]
    fn test_assemble_keeps_constant_fields() {
        let src = "0 CMALLOC 1\n0 CONSTANT 1 2.5 100\n";
        let image = assemble_source(src).unwrap();
        assert_eq!(image, "80JF34R9S 0 0 1 0 2 1 2.5 100");
    }

    #[test]
    fn test_assemble_rejects_unknown_name() {
        let err = assemble_source("0 FROBNICATE").unwrap_err();
        assert!(matches!(err, StreamError::UnknownOpcode { .. }));
    }

    #[test]
    fn test_assemble_rejects_missing_operand() {
        let err = assemble_source("0 LOAD_INT").unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedEnd { .. }));
    }

    #[test]
    fn test_assemble_rejects_bad_address() {
        let err = assemble_source("start LOAD_INT 1").unwrap_err();
        assert!(matches!(err, StreamError::BadToken { .. }));
    }
}
