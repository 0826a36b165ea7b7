//! The `tarmac-vm` CLI: build and query Tarmac instruction-trace indexes
//! (§6 "CLI surface (per tool)").

use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod tools;

use tools::{CallinfoArgs, FlamegraphArgs, IndexArgs, VcdArgs};

#[derive(Debug, Parser)]
#[command(name = "tarmac-vm", about = "Build and query Tarmac instruction-trace indexes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build (or rebuild) an index for one or more trace files
    Index(IndexArgs),
    /// Print every occurrence of a symbol or address in the trace
    Callinfo(CallinfoArgs),
    /// Emit a collapsed-stack flame graph
    Flamegraph(FlamegraphArgs),
    /// Emit a VCD value-change dump of register state
    Vcd(VcdArgs),
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    let verbose = match &cli.command {
        Command::Index(a) => a.common.verbose,
        Command::Callinfo(a) => a.common.verbose,
        Command::Flamegraph(a) => a.common.verbose,
        Command::Vcd(a) => a.common.verbose,
    };
    tracing_subscriber::fmt()
        .with_env_filter(if verbose { "debug" } else { "warn" })
        .with_target(false)
        .init();

    let result = match &cli.command {
        Command::Index(args) => args.execute(),
        Command::Callinfo(args) => args.execute(),
        Command::Flamegraph(args) => args.execute(),
        Command::Vcd(args) => args.execute(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tarmac-vm: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
