//! Progress Escrow CLI
//!
//! Replays a CSV command journal against an in-memory ledger and prints the
//! final state of every stream.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > streams.csv
//! cargo run -- commands.csv audit.csv > streams.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug`, `info` or `warn` to control logging verbosity

use progress_escrow::{EscrowError, JournalRunner, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(EscrowError::MissingArgument);
    }

    let input_path = &args[1];
    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let mut runner = JournalRunner::new();
    runner.process_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    runner.write_output(handle)?;

    if let Some(audit_path) = args.get(2) {
        let audit_file = File::create(audit_path)?;
        runner.write_audit(BufWriter::new(audit_file))?;
    }

    Ok(())
}
