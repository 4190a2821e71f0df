use crate::bytecode::codec::{strip_magic, transcode};
use crate::bytecode::stream_error::StreamError;
use crate::bytecode::Opcode;
use std::fs;
use std::path::Path;

/// Render the numeric records of a decrypted image as one
/// `addr NAME [operand]` line per record.
pub fn listing(records: &str) -> Result<String, StreamError> {
    let mut out = String::new();
    let mut tokens = records.split_whitespace();

    while let Some(addr) = tokens.next() {
        addr.parse::<i64>()
            .map_err(|_| StreamError::bad_token("address", addr))?;

        let code_token = tokens
            .next()
            .ok_or_else(|| StreamError::unexpected_end("opcode"))?;
        let code = code_token
            .parse::<i64>()
            .map_err(|_| StreamError::bad_token("opcode", code_token))?;
        let op = Opcode::from_code(code).ok_or_else(|| StreamError::unknown_code(code))?;

        out.push_str(addr);
        out.push(' ');
        out.push_str(op.name());

        for _ in 0..op.operand_count() {
            let operand = tokens
                .next()
                .ok_or_else(|| StreamError::unexpected_end("operand"))?;
            out.push(' ');
            out.push_str(operand);
        }
        out.push('\n');
    }

    Ok(out)
}

/// Disassemble an image file to stdout. A magic mismatch after decryption
/// rejects the image without output.
pub fn disassemble(path: &Path, key: &str) -> Result<(), StreamError> {
    let mut bytes = fs::read(path)?;
    transcode(&mut bytes, key.as_bytes());

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return Ok(()),
    };
    let records = match strip_magic(&text) {
        Some(records) => records,
        None => return Ok(()),
    };

    print!("{}", listing(records)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::asm::assemble_source;
    use crate::bytecode::codec::strip_magic;

    #[test]
    fn test_listing_simple_program() {
        let out = listing("0 9 2 1 21 0 2 31").unwrap();
        assert_eq!(out, "0 LOAD_INT 2\n1 BINARY_OP 0\n2 HALT\n");
    }

    #[test]
    fn test_listing_rejects_unknown_code() {
        let err = listing("0 99").unwrap_err();
        assert!(matches!(err, StreamError::UnknownCode { code: 99 }));
    }

    #[test]
    fn test_listing_rejects_truncated_record() {
        let err = listing("0 9").unwrap_err();
        assert!(matches!(err, StreamError::UnexpectedEnd { .. }));
    }

    #[test]
    fn test_assemble_listing_round_trip() {
        let src = "\
100 VMALLOC 1
101 LOAD_INT 7
102 STORE_NAME_GLOBAL 0
103 LOAD_NAME_GLOBAL 0
104 PRINTK
105 HALT
";
        let image = assemble_source(src).unwrap();
        let records = strip_magic(&image).unwrap();
        assert_eq!(listing(records).unwrap(), src);
    }

    #[test]
    fn test_round_trip_keeps_constant_record() {
        let src = "0 CMALLOC 2\n0 CONSTANT 1 3.25 100\n1 CONSTANT 0 -4 100\n";
        let image = assemble_source(src).unwrap();
        let records = strip_magic(&image).unwrap();
        assert_eq!(listing(records).unwrap(), src);
    }
}
