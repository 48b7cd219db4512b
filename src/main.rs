use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use uvm::loader;
use uvm::UVM;

#[derive(Parser, Debug)]
#[command(name = "uvm")]
#[command(about = "Runs a Universal Machine program image", long_about = None)]
struct Args {
  /// Path to a program image: 32-bit big-endian words, no header
  program: PathBuf,
}

fn main() {
  if let Err(error) = run() {
    // One diagnostic line; the machine's state is gone either way.
    eprintln!("uvm: {error:#}");
    std::process::exit(1);
  }
}

fn run() -> Result<()> {
  let args  = Args::parse();

  let bytes = fs::read(&args.program)
    .with_context(|| format!("cannot read {}", args.program.display()))?;
  let program = loader::decode_program(&bytes)
    .with_context(|| format!("cannot load {}", args.program.display()))?;

  let mut machine = UVM::new(program);
  machine.run()?;

  Ok(())
}
