//! Command-line front end for PAR1/PAR2 create, verify and repair.
//!
//! Exit codes follow the conventional par tool table: 0 success, 1 repair
//! needed and possible, 2 repair not possible, 3 bad arguments, 4 not
//! enough critical packet data, 5 repair failed, 6 file I/O error, 7
//! internal error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};

use parrs::fileio::DiskFileIO;
use parrs::reporters::ConsoleReporter;
use parrs::rs16::{default_num_workers, CancelToken};
use parrs::{par1, par2, ParError};

const EXIT_SUCCESS: u8 = 0;
const EXIT_REPAIR_POSSIBLE: u8 = 1;
const EXIT_REPAIR_NOT_POSSIBLE: u8 = 2;
const EXIT_INVALID_ARGUMENTS: u8 = 3;
const EXIT_INSUFFICIENT_CRITICAL_DATA: u8 = 4;
const EXIT_REPAIR_FAILED: u8 = 5;
const EXIT_FILE_IO_ERROR: u8 = 6;
const EXIT_LOGIC_ERROR: u8 = 7;

fn exit_code_for(err: &ParError) -> u8 {
    match err {
        ParError::InsufficientRecovery => EXIT_REPAIR_NOT_POSSIBLE,
        ParError::InsufficientCriticalData(_) => EXIT_INSUFFICIENT_CRITICAL_DATA,
        ParError::InvalidConfiguration(_) | ParError::DuplicateFileId { .. } => {
            EXIT_INVALID_ARGUMENTS
        }
        ParError::RepairFailed { .. } => EXIT_REPAIR_FAILED,
        ParError::Io { .. } => EXIT_FILE_IO_ERROR,
        ParError::InvalidFormat { .. }
        | ParError::ShardLengthMismatch { .. }
        | ParError::ZeroDivisor
        | ParError::Canceled => EXIT_LOGIC_ERROR,
    }
}

fn cli() -> Command {
    Command::new("par")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Create, verify and repair PAR1/PAR2 parity archives")
        .arg_required_else_help(true)
        .arg(
            Arg::new("workers")
                .short('g')
                .long("workers")
                .global(true)
                .value_name("N")
                .help("Worker count for encoding/decoding (default: CPU count)"),
        )
        .subcommand(
            Command::new("create")
                .visible_aliases(["c"])
                .about("Create a parity archive for a set of data files")
                .arg(
                    Arg::new("slice_bytes")
                        .short('s')
                        .long("slice-bytes")
                        .value_name("N")
                        .default_value("2000")
                        .help("Slice size in bytes, multiple of 4 (PAR2 only)"),
                )
                .arg(
                    Arg::new("recovery_count")
                        .short('c')
                        .long("recovery-count")
                        .value_name("N")
                        .default_value("3")
                        .help("Recovery slice count (or parity volume count, for PAR1)"),
                )
                .arg(
                    Arg::new("par_file")
                        .required(true)
                        .help("Output archive; a .par2 extension selects PAR2, anything else PAR1"),
                )
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .help("Data files to protect"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .visible_aliases(["v"])
                .about("Check whether the protected files are intact")
                .arg(Arg::new("par_file").required(true).help("Index file")),
        )
        .subcommand(
            Command::new("repair")
                .visible_aliases(["r", "f"])
                .about("Restore missing or corrupted files from recovery data")
                .arg(
                    Arg::new("checkparity")
                        .long("checkparity")
                        .action(ArgAction::SetTrue)
                        .help("Also check recovery data consistency before repairing"),
                )
                .arg(Arg::new("par_file").required(true).help("Index file")),
        )
}

fn parse_usize(matches: &ArgMatches, name: &str) -> anyhow::Result<usize> {
    let raw = matches
        .get_one::<String>(name)
        .ok_or_else(|| anyhow!("missing value for {}", name))?;
    raw.parse::<usize>()
        .with_context(|| format!("invalid value {:?} for {}", raw, name))
}

fn num_workers(matches: &ArgMatches) -> anyhow::Result<usize> {
    match matches.get_one::<String>("workers") {
        Some(raw) => {
            let n = raw
                .parse::<usize>()
                .with_context(|| format!("invalid worker count {:?}", raw))?;
            Ok(n.max(1))
        }
        None => Ok(default_num_workers()),
    }
}

fn is_par2(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "par2")
}

fn run_create(matches: &ArgMatches, workers: usize) -> Result<u8, ParError> {
    let par_file = PathBuf::from(matches.get_one::<String>("par_file").expect("required"));
    let files: Vec<PathBuf> = matches
        .get_many::<String>("files")
        .expect("required")
        .map(PathBuf::from)
        .collect();
    let slice_bytes = parse_usize(matches, "slice_bytes")
        .map_err(|e| ParError::InvalidConfiguration(e.to_string()))?;
    let recovery_count = parse_usize(matches, "recovery_count")
        .map_err(|e| ParError::InvalidConfiguration(e.to_string()))?;

    let fileio = DiskFileIO;
    let reporter = ConsoleReporter::new();
    let cancel = CancelToken::new();

    if is_par2(&par_file) {
        let mut encoder = par2::Encoder::new(
            &fileio,
            &reporter,
            files,
            slice_bytes,
            recovery_count,
            workers,
        )?;
        encoder.load_file_data()?;
        encoder.compute_recovery_data(&cancel)?;
        encoder.write(&par_file)?;
    } else {
        let mut encoder =
            par1::Encoder::new(&fileio, &reporter, files, recovery_count, workers)?;
        encoder.load_file_data()?;
        encoder.compute_parity_data(&cancel)?;
        encoder.write(&par_file)?;
    }
    Ok(EXIT_SUCCESS)
}

fn run_verify(matches: &ArgMatches, workers: usize) -> Result<u8, ParError> {
    let par_file = PathBuf::from(matches.get_one::<String>("par_file").expect("required"));
    let fileio = DiskFileIO;
    let reporter = ConsoleReporter::new();
    let cancel = CancelToken::new();

    if is_par2(&par_file) {
        let mut decoder = par2::Decoder::new(&fileio, &reporter, &par_file, workers)?;
        decoder.load_file_data()?;
        match decoder.verify() {
            Ok(false) => {
                println!("Repair not necessary.");
                Ok(EXIT_SUCCESS)
            }
            Ok(true) => {
                eprintln!("Repair necessary and possible.");
                Ok(EXIT_REPAIR_POSSIBLE)
            }
            Err(ParError::InsufficientRecovery) => {
                eprintln!("Repair necessary but not possible.");
                Ok(EXIT_REPAIR_NOT_POSSIBLE)
            }
            Err(e) => Err(e),
        }
    } else {
        let mut decoder = par1::Decoder::new(&fileio, &reporter, &par_file, workers)?;
        decoder.load_file_data()?;
        decoder.load_parity_data()?;
        if decoder.verify(&cancel)? {
            println!("Repair not necessary.");
            Ok(EXIT_SUCCESS)
        } else if decoder.repair_is_possible() {
            eprintln!("Repair necessary and possible.");
            Ok(EXIT_REPAIR_POSSIBLE)
        } else {
            eprintln!("Repair necessary but not possible.");
            Ok(EXIT_REPAIR_NOT_POSSIBLE)
        }
    }
}

fn run_repair(matches: &ArgMatches, workers: usize) -> Result<u8, ParError> {
    let par_file = PathBuf::from(matches.get_one::<String>("par_file").expect("required"));
    let check_parity = matches.get_flag("checkparity");
    let fileio = DiskFileIO;
    let reporter = ConsoleReporter::new();
    let cancel = CancelToken::new();

    let repaired = if is_par2(&par_file) {
        let mut decoder = par2::Decoder::new(&fileio, &reporter, &par_file, workers)?;
        decoder.load_file_data()?;
        decoder.repair(check_parity, &cancel)?
    } else {
        let mut decoder = par1::Decoder::new(&fileio, &reporter, &par_file, workers)?;
        decoder.load_file_data()?;
        decoder.load_parity_data()?;
        decoder.repair(check_parity, &cancel)?
    };

    if repaired.is_empty() {
        println!("Repair not necessary.");
    } else {
        println!(
            "Repaired files: {}",
            repaired
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(EXIT_SUCCESS)
}

fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            // clap handles --help/--version as "errors" with success exits.
            if e.use_stderr() {
                eprintln!("{}", e);
                return ExitCode::from(EXIT_INVALID_ARGUMENTS);
            }
            print!("{}", e);
            return ExitCode::from(EXIT_SUCCESS);
        }
    };

    let workers = match num_workers(&matches) {
        Ok(workers) => workers,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGUMENTS);
        }
    };

    let result = match matches.subcommand() {
        Some(("create", sub)) => run_create(sub, workers),
        Some(("verify", sub)) => run_verify(sub, workers),
        Some(("repair", sub)) => run_repair(sub, workers),
        _ => {
            eprintln!("Error: no command specified");
            return ExitCode::from(EXIT_INVALID_ARGUMENTS);
        }
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
