use crate::bytecode::{Instruct, Opcode};
use crate::lang::value::Slot;
use crate::runtime::load_error::LoadError;
use crate::runtime::machine::Machine;
use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Incremental whitespace-delimited token reader.
///
/// Interactive streams must not be read up front: the machine dispatches on
/// a `-1` line and then keeps reading, so tokens are pulled line by line.
pub struct TokenReader<R> {
    src: R,
    pending: VecDeque<String>,
}

impl<R: BufRead> TokenReader<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            pending: VecDeque::new(),
        }
    }

    pub fn next_token(&mut self) -> Result<Option<String>, io::Error> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(Some(token));
            }
            let mut line = String::new();
            if self.src.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
    }
}

fn require<R: BufRead>(
    reader: &mut TokenReader<R>,
    expected: &'static str,
) -> Result<String, LoadError> {
    reader
        .next_token()?
        .ok_or_else(|| LoadError::truncated(expected))
}

fn parse_int(token: &str, expected: &'static str) -> Result<i64, LoadError> {
    token
        .parse::<i64>()
        .map_err(|_| LoadError::bad_record(expected, token))
}

/// Feed records from `reader` into `machine`.
///
/// Interactive mode reads opcode names and dispatches whenever the address
/// `-1` appears, keeping the machine's state for the records that follow.
/// Binary mode reads numeric opcodes and dispatches once at the end of the
/// stream.
///
/// `CMALLOC` and `CONSTANT` records act on the constant pool immediately
/// instead of being appended as instructions.
pub fn interpret<R: BufRead>(
    machine: &mut Machine,
    reader: &mut TokenReader<R>,
    interactive: bool,
) -> Result<(), LoadError> {
    while let Some(token) = reader.next_token()? {
        let addr = parse_int(&token, "address")?;

        if interactive && addr == -1 {
            machine.dispatch()?;
            continue;
        }

        let op = if interactive {
            let name = require(reader, "opcode name")?;
            Opcode::from_name(&name).ok_or_else(|| LoadError::unknown_opcode(&name))?
        } else {
            let token = require(reader, "opcode")?;
            let code = parse_int(&token, "opcode")?;
            Opcode::from_code(code).ok_or_else(|| LoadError::unknown_code(code))?
        };

        match op {
            Opcode::Cmalloc => {
                let token = require(reader, "pool size")?;
                let n = parse_int(&token, "pool size")?;
                let n =
                    usize::try_from(n).map_err(|_| LoadError::bad_record("pool size", &token))?;
                machine.constant_pool_alloc(n);
            }

            Opcode::Constant => {
                let kind_token = require(reader, "constant kind")?;
                let kind = parse_int(&kind_token, "constant kind")?;
                let value_token = require(reader, "constant value")?;
                // the value token is parsed in the kind's natural lexical
                // form; chars arrive as integer character codes
                let slot = match kind {
                    0 => Slot::int(parse_int(&value_token, "int constant")?),
                    1 => Slot::float(
                        value_token
                            .parse::<f64>()
                            .map_err(|_| LoadError::bad_record("float constant", &value_token))?,
                    ),
                    2 => Slot::chr(parse_int(&value_token, "char code")? as u8),
                    _ => return Err(LoadError::bad_record("constant kind", &kind_token)),
                };
                // the wire refcount is validated and discarded: the pool's
                // own handle already keeps the constant alive across loads
                let rc_token = require(reader, "constant refcount")?;
                parse_int(&rc_token, "constant refcount")?;

                let installed = usize::try_from(addr)
                    .ok()
                    .map(|index| machine.install_constant(index, slot))
                    .unwrap_or(false);
                if !installed {
                    return Err(LoadError::constant_outside_pool(addr));
                }
            }

            _ => {
                if op.has_operand() {
                    let token = require(reader, "operand")?;
                    let operand = parse_int(&token, "operand")?;
                    machine.add_instruct(Instruct::new(addr, op, operand));
                } else {
                    machine.add_instruct(Instruct::plain(addr, op));
                }
            }
        }
    }

    if !interactive {
        machine.dispatch()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::asm::assemble_source;
    use crate::bytecode::codec::{strip_magic, transcode};
    use std::cell::RefCell;
    use std::io::{Cursor, Write};
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn take(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn machine_with_buf() -> (Machine, SharedBuf) {
        let buf = SharedBuf::default();
        let mut machine = Machine::new();
        machine.set_output(Box::new(buf.clone()));
        (machine, buf)
    }

    fn feed(machine: &mut Machine, stream: &str, interactive: bool) -> Result<(), LoadError> {
        let mut reader = TokenReader::new(Cursor::new(stream.to_string()));
        interpret(machine, &mut reader, interactive)
    }

    #[test]
    fn test_token_reader_spans_lines() {
        let mut reader = TokenReader::new(Cursor::new("0 LOAD_INT\n   5\n\n1 HALT\n"));
        let mut tokens = Vec::new();
        while let Some(token) = reader.next_token().unwrap() {
            tokens.push(token);
        }
        assert_eq!(tokens, ["0", "LOAD_INT", "5", "1", "HALT"]);
    }

    #[test]
    fn test_binary_stream_dispatches_at_end() {
        let (mut machine, buf) = machine_with_buf();
        feed(&mut machine, "0 9 5 1 32 2 31", false).unwrap();
        assert_eq!(buf.take(), "5(int)\n");
    }

    #[test]
    fn test_interactive_dispatches_on_minus_one() {
        let (mut machine, buf) = machine_with_buf();
        feed(
            &mut machine,
            "0 LOAD_INT 5\n1 PRINTK\n-1\n",
            true,
        )
        .unwrap();
        assert_eq!(buf.take(), "5(int)\n");
    }

    #[test]
    fn test_interactive_state_persists_across_dispatches() {
        let (mut machine, buf) = machine_with_buf();
        feed(
            &mut machine,
            "0 VMALLOC 1\n1 LOAD_INT 3\n2 STORE_NAME_GLOBAL 0\n-1\n\
             3 LOAD_NAME_GLOBAL 0\n4 PRINTK\n-1\n",
            true,
        )
        .unwrap();
        assert_eq!(buf.take(), "3(int)\n");
    }

    #[test]
    fn test_constant_records_fill_the_pool() {
        let (mut machine, buf) = machine_with_buf();
        feed(
            &mut machine,
            "0 CMALLOC 2\n0 CONSTANT 1 2.5 100\n1 CONSTANT 2 97 100\n\
             0 LOAD_CONSTANT 0\n1 PRINTK\n2 LOAD_CONSTANT 1\n3 PRINTK\n-1\n",
            true,
        )
        .unwrap();
        assert_eq!(buf.take(), "2.5(float)\na(char)\n");
    }

    #[test]
    fn test_constant_without_pool_is_rejected() {
        let (mut machine, _) = machine_with_buf();
        let err = feed(&mut machine, "0 CONSTANT 0 7 100\n", true).unwrap_err();
        assert!(matches!(err, LoadError::ConstantOutsidePool { index: 0 }));
    }

    #[test]
    fn test_unknown_opcode_name_is_rejected() {
        let (mut machine, _) = machine_with_buf();
        let err = feed(&mut machine, "0 FROBNICATE 1\n", true).unwrap_err();
        assert!(matches!(err, LoadError::UnknownOpcode { .. }));
    }

    #[test]
    fn test_unknown_opcode_code_is_rejected() {
        let (mut machine, _) = machine_with_buf();
        let err = feed(&mut machine, "0 99", false).unwrap_err();
        assert!(matches!(err, LoadError::UnknownCode { code: 99 }));
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let (mut machine, _) = machine_with_buf();
        let err = feed(&mut machine, "0 LOAD_INT", true).unwrap_err();
        assert!(matches!(err, LoadError::TruncatedRecord { .. }));
    }

    #[test]
    fn test_runtime_failure_surfaces_through_loader() {
        let (mut machine, _) = machine_with_buf();
        let err = feed(&mut machine, "0 POP_OP\n-1\n", true).unwrap_err();
        assert!(matches!(err, LoadError::Runtime(_)));
    }

    // ============================================================
    // Assemble -> decrypt -> run, with and without a key
    // ============================================================

    fn run_assembled(src: &str, key: &str) -> String {
        let mut bytes = assemble_source(src).unwrap().into_bytes();
        transcode(&mut bytes, key.as_bytes());

        // what the driver does with an image file
        transcode(&mut bytes, key.as_bytes());
        let text = String::from_utf8(bytes).unwrap();
        let records = strip_magic(&text).unwrap().to_string();

        let (mut machine, buf) = machine_with_buf();
        feed(&mut machine, &records, false).unwrap();
        buf.take()
    }

    #[test]
    fn test_assembled_scenarios_run_identically_under_any_key() {
        let scenarios: [(&str, &str); 3] = [
            (
                "0 LOAD_INT 2\n1 LOAD_INT 3\n2 BINARY_OP 0\n3 PRINTK\n4 HALT\n",
                "5(int)\n",
            ),
            (
                "0 LOAD_INT 3\n1 LOAD_FLOAT 2\n2 BINARY_OP 2\n3 PRINTK\n4 HALT\n",
                "6(float)\n",
            ),
            (
                "0 VMALLOC 1\n1 LOAD_INT 7\n2 STORE_NAME_GLOBAL 0\n\
                 3 LOAD_NAME_GLOBAL 0\n4 PRINTK\n5 HALT\n",
                "7(int)\n",
            ),
        ];
        for (src, expected) in scenarios {
            assert_eq!(run_assembled(src, ""), expected);
            assert_eq!(run_assembled(src, "s3cr3t"), expected);
        }
    }

    #[test]
    fn test_assembled_call_scenario() {
        let src = "\
0 VMALLOC 0
1 PUSH
2 LOAD_INT 4
3 CALL 10
4 PRINTK
5 HALT
10 VMALLOC 1
11 STORE_NAME 0
12 LOAD_NAME 0
13 LOAD_NAME 0
14 BINARY_OP 2
15 RET
";
        assert_eq!(run_assembled(src, ""), "16(int)\n");
        assert_eq!(run_assembled(src, "80JF34R9S"), "16(int)\n");
    }
}
