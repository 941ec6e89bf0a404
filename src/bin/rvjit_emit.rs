//! Emit a small demonstration routine and write it out.
//!
//! The routine computes `|a0 * value + value|` for the `--value` given on the
//! command line, returning the result in `a0`.

use std::fs;
use std::path::PathBuf;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use log::info;
use rvjit::riscv::{emit_elf, Gpr, Jit};
use rvjit::{CodeBuffer, JitConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// Bare instruction words
    Raw,
    /// ELF64 relocatable object
    Elf,
}

#[derive(Parser)]
#[command(name = "rvjit-emit", version, about = "Emit an RV64 demo routine")]
struct Cli {
    /// Output file
    #[arg(short, long)]
    output: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value = "elf")]
    format: Format,
    /// Name of the function symbol (ELF only)
    #[arg(long, default_value = "rvjit_demo")]
    symbol: String,
    /// Constant folded into the routine
    #[arg(long, default_value_t = 7, allow_hyphen_values = true)]
    value: i64,
    /// Log every emitted instruction word
    #[arg(long)]
    trace: bool,
}

fn emit_demo(jit: &mut Jit<'_>, value: i64) {
    jit.muli(Gpr::A0, Gpr::A0, value);
    jit.addi(Gpr::A0, Gpr::A0, value);
    let done = jit.bgei(Gpr::A0, 0);
    jit.negr(Gpr::A0, Gpr::A0);
    jit.patch_here(done);
    jit.ret();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let arena = Bump::new();
    let config = JitConfig::default().with_trace_emission(cli.trace);
    let mut jit = Jit::new(&arena, config.clone());
    jit.begin(CodeBuffer::with_config(&config)?);
    emit_demo(&mut jit, cli.value);
    let code = jit.end()?;
    info!(
        "emitted {} bytes ({} words) at {:#x}",
        code.len(),
        code.stats().words,
        code.address()
    );

    let bytes = match cli.format {
        Format::Raw => code.bytes().to_vec(),
        Format::Elf => emit_elf(&cli.symbol, code.bytes())?,
    };
    fs::write(&cli.output, bytes)?;
    Ok(())
}
