//! Binary entry point: `env_logger` init, a `clap`-derived arg struct, and a
//! process exit code, rather than the original assembler's thin `getopt`
//! loop, which this crate replaces wholesale with `clap`.

use std::process::ExitCode;

use clap::Parser;

use mach_as::cli::Cli;
use mach_as::driver::{Driver, DriverConfig};
use mach_as::error::AssemblerError;
use mach_as::isa::ppc::PpcIsa;
use mach_as::isa::TargetIsa;

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();

    if cli.version {
        println!("as (mach-as) {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    if !cli.is_powerpc() {
        eprintln!("as: {}", AssemblerError::UnsupportedArchitecture(cli.arch.clone()));
        return ExitCode::FAILURE;
    }

    let isa = PpcIsa {
        prediction_scheme: cli.prediction_scheme(),
        force_cpusubtype_all: cli.force_cpusubtype_all,
        no_ppc601: false,
    };

    match run(&cli, &isa) {
        Ok(()) => ExitCode::SUCCESS,
        Err(AssemblerError::BadErrorsReported) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("as: {err}");
            ExitCode::FAILURE
        }
    }
}

// SIGHUP/SIGINT/SIGPIPE/SIGTERM should abort assembly
// cleanly (no partial object file) rather than leave a half-written output.
// This crate's dependency set (`unsafe_code = "deny"`, no `libc`/`ctrlc`)
// can't install a raw signal handler without `unsafe`, so this binary relies
// on Rust's default signal dispositions instead: a received signal
// terminates the process before `std::fs::write` below ever runs, which
// already satisfies "no partial object file is left behind" for every
// signal in that list except a SIGPIPE hit exactly while writing the output
// file. That one narrow gap is recorded as an open question in `DESIGN.md`.
fn run(cli: &Cli, isa: &dyn TargetIsa) -> mach_as::error::AssemblerResult<()> {
    let input_dir = cli
        .input
        .as_deref()
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_default();
    let top_file: std::rc::Rc<str> = cli
        .input
        .as_deref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<stdin>".to_string())
        .into();

    let config = DriverConfig {
        search_dirs: cli.include_dirs.clone(),
        dynamic: cli.dynamic(),
        start_in_text: !cli.no_bootstrap_text,
        subsections_via_symbols: true,
        emit_dwarf2: cli.emit_dwarf2(),
        suppress_warnings: cli.suppress_warnings,
        arch_multiple: cli.arch_multiple,
        arch_name: cli.arch.clone(),
    };

    let driver = Driver::new(isa, config, input_dir, top_file);
    let object_bytes = driver.assemble(cli.input.as_deref())?;

    std::fs::write(&cli.output, &object_bytes).map_err(|source| AssemblerError::WriteOutput {
        path: cli.output.clone(),
        source,
    })?;
    Ok(())
}
