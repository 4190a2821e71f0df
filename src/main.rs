mod bytecode;
mod lang;
mod runtime;

use std::io::{self, Cursor};
use std::path::Path;
use std::{env, fs, process};

use crate::bytecode::codec::{strip_magic, transcode};
use crate::bytecode::{asm, disasm};
use crate::runtime::loader::{interpret, TokenReader};
use crate::runtime::Machine;

enum Mode {
    Run(String),
    Interact,
    Disassemble(String),
    Assemble(String),
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let verbose = args.contains(&"-v".to_string());
    let key = flag_value(&args, "-p").unwrap_or_default();
    let output = flag_value(&args, "-o");

    let mut modes = Vec::new();
    if let Some(path) = flag_value(&args, "-r") {
        modes.push(Mode::Run(path));
    }
    if let Some(path) = flag_value(&args, "-d") {
        modes.push(Mode::Disassemble(path));
    }
    if let Some(path) = flag_value(&args, "-a") {
        modes.push(Mode::Assemble(path));
    }
    if args.contains(&"-i".to_string()) {
        modes.push(Mode::Interact);
    }

    if modes.len() != 1 {
        print_usage();
        process::exit(1);
    }

    match modes.remove(0) {
        Mode::Run(path) => run(&path, verbose, &key),
        Mode::Interact => interact(verbose),
        Mode::Disassemble(path) => {
            if let Err(e) = disasm::disassemble(Path::new(&path), &key) {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
        Mode::Assemble(src) => {
            let out = match output {
                Some(out) => out,
                None => {
                    eprintln!("Error: -a requires -o <out>");
                    print_usage();
                    process::exit(1);
                }
            };
            if let Err(e) = asm::assemble(Path::new(&src), Path::new(&out), &key) {
                eprintln!("{}", e);
                process::exit(1);
            }
        }
    }
}

/// Value of a `-x <value>` flag pair, if present.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .filter(|v| !v.starts_with('-'))
        .cloned()
}

fn print_usage() {
    println!("SVM - SLang Stack-based Virtual Machine");
    println!();
    println!("Usage:");
    println!("  svm -r <file.slb> [-v] [-p <key>]      Run a program");
    println!("  svm -d <file.slb> [-p <key>]           Disassemble a program");
    println!("  svm -i [-v]                            Interact mode (read stdin)");
    println!("  svm -a <file.txt> -o <file.slb> [-p <key>]");
    println!("                                         Assemble a source file");
}

/// Decrypt and run an image file. An image whose magic does not check out
/// after decryption is rejected without executing anything.
fn run(path: &str, verbose: bool, key: &str) {
    let mut bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", path, e);
            process::exit(1);
        }
    };
    transcode(&mut bytes, key.as_bytes());

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(_) => return,
    };
    let records = match strip_magic(&text) {
        Some(records) => records.to_string(),
        None => return,
    };

    let mut machine = Machine::new();
    if verbose {
        machine.enable_verbose();
    }
    let mut reader = TokenReader::new(Cursor::new(records));
    if let Err(e) = interpret(&mut machine, &mut reader, false) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn interact(verbose: bool) {
    let mut machine = Machine::new();
    if verbose {
        machine.enable_verbose();
    }
    let stdin = io::stdin();
    let mut reader = TokenReader::new(stdin.lock());
    if let Err(e) = interpret(&mut machine, &mut reader, true) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value_finds_pair() {
        let a = args(&["svm", "-r", "prog.slb", "-p", "key"]);
        assert_eq!(flag_value(&a, "-r"), Some("prog.slb".to_string()));
        assert_eq!(flag_value(&a, "-p"), Some("key".to_string()));
        assert_eq!(flag_value(&a, "-o"), None);
    }

    #[test]
    fn test_flag_value_rejects_flag_as_value() {
        let a = args(&["svm", "-r", "-v"]);
        assert_eq!(flag_value(&a, "-r"), None);
    }
}
