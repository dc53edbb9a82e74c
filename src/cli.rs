// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Assembler, disassembler and VM for the MASM register assembly language.

Modes:
  -c <source> <output>      assemble source to a binary image
  -i <binary> [args...]     execute a binary image
  -u <binary> [listing]     disassemble a binary image
  <file.masm> [args...]     assemble and run directly

The option flags -d, -g and -t are recognised anywhere on the line.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "masmforge",
    version = VERSION,
    about = "MASM assembly toolchain: assembler, disassembler and bytecode VM",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(
        short = 'c',
        action = ArgAction::SetTrue,
        long_help = "Assemble: the next two arguments are the source file and the output image."
    )]
    pub compile: bool,
    #[arg(
        short = 'i',
        action = ArgAction::SetTrue,
        long_help = "Interpret: the next argument is the binary image; the rest are passed to the program."
    )]
    pub interpret: bool,
    #[arg(
        short = 'u',
        action = ArgAction::SetTrue,
        long_help = "Disassemble: the next argument is the binary image, optionally followed by the listing output file."
    )]
    pub decode: bool,
    #[arg(
        short = 'd',
        long = "debug",
        action = ArgAction::SetTrue,
        long_help = "Enable verbose trace output from the assembler and the VM."
    )]
    pub debug: bool,
    #[arg(
        short = 'g',
        long = "dbg_data",
        action = ArgAction::SetTrue,
        long_help = "Include the debug label table in the emitted image."
    )]
    pub dbg_data: bool,
    #[arg(
        short = 't',
        long = "trace",
        action = ArgAction::SetTrue,
        long_help = "Print a stack trace reconstructed from the frame chain on runtime errors."
    )]
    pub trace: bool,
    #[arg(
        long = "memory",
        value_name = "BYTES",
        long_help = "Linear memory size for execution modes. Defaults to 65536; must leave room for the data area, heap and stack."
    )]
    pub memory: Option<usize>,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select CLI output format. text is default; json enables machine-readable output for -c and -u."
    )]
    pub format: OutputFormat,
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        long_help = "Mode arguments: files, then program arguments for -i and direct runs."
    )]
    pub args: Vec<String>,
}

/// What to do, with every path argument in its place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Assemble {
        source: PathBuf,
        output: PathBuf,
    },
    Run {
        binary: PathBuf,
        program_args: Vec<String>,
    },
    Disassemble {
        binary: PathBuf,
        output: Option<PathBuf>,
    },
    AssembleRun {
        source: PathBuf,
        program_args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub mode: Mode,
    pub debug: bool,
    pub trace: bool,
    pub write_debug_labels: bool,
    pub memory_size: Option<usize>,
    pub format: OutputFormat,
}

/// Check mode selection and distribute the positional arguments. The
/// option flags may appear among the positionals; they are recognised and
/// stripped here.
pub fn validate_cli(cli: &Cli) -> Result<CliConfig, String> {
    let mut debug = cli.debug;
    let mut trace = cli.trace;
    let mut write_debug_labels = cli.dbg_data;

    let mut positional: Vec<String> = Vec::new();
    for arg in &cli.args {
        match arg.as_str() {
            "-d" | "--debug" => debug = true,
            "-t" | "--trace" => trace = true,
            "-g" | "--dbg_data" => write_debug_labels = true,
            _ => positional.push(arg.clone()),
        }
    }

    let modes = cli.compile as u8 + cli.interpret as u8 + cli.decode as u8;
    if modes > 1 {
        return Err("choose exactly one of -c, -i or -u".to_string());
    }

    let mode = if cli.compile {
        let [source, output] = take_exactly::<2>(&positional, "-c <source> <output>")?;
        Mode::Assemble {
            source: PathBuf::from(source),
            output: PathBuf::from(output),
        }
    } else if cli.interpret {
        if positional.is_empty() {
            return Err("usage: -i <binary> [program-args...]".to_string());
        }
        Mode::Run {
            binary: PathBuf::from(&positional[0]),
            program_args: positional[1..].to_vec(),
        }
    } else if cli.decode {
        if positional.is_empty() || positional.len() > 2 {
            return Err("usage: -u <binary> [listing-output]".to_string());
        }
        Mode::Disassemble {
            binary: PathBuf::from(&positional[0]),
            output: positional.get(1).map(PathBuf::from),
        }
    } else {
        if positional.is_empty() {
            return Err("no mode or file specified".to_string());
        }
        let source = PathBuf::from(&positional[0]);
        let is_source = source
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("masm") || ext.eq_ignore_ascii_case("mas"))
            .unwrap_or(false);
        if !is_source {
            return Err(format!(
                "unknown mode or file: {} (expected -c, -i, -u or a .mas/.masm file)",
                positional[0]
            ));
        }
        Mode::AssembleRun {
            source,
            program_args: positional[1..].to_vec(),
        }
    };

    Ok(CliConfig {
        mode,
        debug,
        trace,
        write_debug_labels,
        memory_size: cli.memory,
        format: cli.format,
    })
}

fn take_exactly<const N: usize>(args: &[String], usage: &str) -> Result<[String; N], String> {
    <[String; N]>::try_from(args.to_vec()).map_err(|_| format!("usage: {usage}"))
}
