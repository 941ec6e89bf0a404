//! The rvjit-emit binary, run end to end.

use std::path::PathBuf;
use std::process::Command;

use object::{Object, ObjectSection, ObjectSymbol};
use rvjit::riscv::Simulator;

const LOAD_ADDRESS: u64 = 0x4000_0000;

fn output_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rvjit-cli-{}-{name}", std::process::id()))
}

fn emit(args: &[&str], name: &str) -> Vec<u8> {
    let path = output_path(name);
    let status = Command::new(env!("CARGO_BIN_EXE_rvjit-emit"))
        .args(args)
        .arg("--output")
        .arg(&path)
        .status()
        .expect("failed to spawn rvjit-emit");
    assert!(status.success(), "rvjit-emit exited with {status}");
    let bytes = std::fs::read(&path).unwrap();
    let _ = std::fs::remove_file(&path);
    bytes
}

/// The routine only uses pc-relative control flow, so it runs at any address.
fn run_at_fixed_address(text: &[u8], a0: i64) -> i64 {
    let mut sim = Simulator::new();
    sim.write_bytes(LOAD_ADDRESS, text);
    sim.call(LOAD_ADDRESS, &[a0 as u64]).unwrap() as i64
}

#[test]
fn elf_output_defines_a_runnable_symbol() {
    let bytes = emit(&["--value", "-3", "--symbol", "scaled_abs"], "demo.o");
    let file = object::File::parse(&*bytes).unwrap();
    assert_eq!(file.architecture(), object::Architecture::Riscv64);

    let symbol = file.symbol_by_name("scaled_abs").expect("symbol missing");
    let text = file.section_by_name(".text").unwrap().data().unwrap();
    assert_eq!(symbol.size() as usize, text.len());

    for a0 in [0i64, 1, 5, -5, 1000] {
        assert_eq!(run_at_fixed_address(text, a0), (a0 * -3 - 3).abs(), "a0 = {a0}");
    }
}

#[test]
fn raw_output_is_bare_code() {
    let bytes = emit(&["--format", "raw", "--value", "7"], "demo.bin");
    assert_eq!(bytes.len() % 4, 0);
    assert_eq!(run_at_fixed_address(&bytes, 2), 21);
    assert_eq!(run_at_fixed_address(&bytes, -4), 21);
}
