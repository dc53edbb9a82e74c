// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for masmForge.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use masmforge::assembler::{AssembleOptions, Assembler};
use masmforge::cli::{validate_cli, Cli, CliConfig, Mode, OutputFormat};
use masmforge::core::image::Image;
use masmforge::disasm::Disassembly;
use masmforge::vm::{Interpreter, VmError, DEFAULT_MEMORY_SIZE, HEAP_BASE, STACK_SIZE};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("run with --help for usage");
            return ExitCode::FAILURE;
        }
    };

    let status = match &config.mode {
        Mode::Assemble { source, output } => assemble(source, output, &config),
        Mode::Run {
            binary,
            program_args,
        } => run_binary(binary, program_args.clone(), &config),
        Mode::Disassemble { binary, output } => disassemble(binary, output.as_deref(), &config),
        Mode::AssembleRun {
            source,
            program_args,
        } => assemble_and_run(source, program_args.clone(), &config),
    };
    ExitCode::from(status as u8)
}

fn assemble_options(config: &CliConfig) -> AssembleOptions {
    AssembleOptions {
        debug: config.debug,
        write_debug_labels: config.write_debug_labels,
    }
}

fn assemble(source: &Path, output: &Path, config: &CliConfig) -> i32 {
    let image_bytes = match Assembler::assemble_file(source, assemble_options(config)) {
        Ok(bytes) => bytes,
        Err(diag) => {
            eprintln!("{}", diag.format_with_context());
            return 1;
        }
    };
    if let Err(err) = fs::write(output, &image_bytes) {
        eprintln!("cannot write {}: {err}", output.display());
        return 1;
    }
    match config.format {
        OutputFormat::Json => {
            let header = Image::parse(&image_bytes)
                .map(|image| image.header)
                .expect("freshly emitted image parses");
            println!(
                "{}",
                json!({
                    "source": source.display().to_string(),
                    "output": output.display().to_string(),
                    "codeSize": header.code_size,
                    "dataSize": header.data_size,
                    "dbgSize": header.dbg_size,
                    "entryPoint": header.entry_offset(),
                })
            );
        }
        OutputFormat::Text => {
            println!(
                "Compilation successful: {} -> {}",
                source.display(),
                output.display()
            );
        }
    }
    0
}

fn run_binary(binary: &Path, program_args: Vec<String>, config: &CliConfig) -> i32 {
    let bytes = match fs::read(binary) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("cannot read {}: {err}", binary.display());
            return 1;
        }
    };
    run_image(&bytes, program_args, config)
}

fn assemble_and_run(source: &Path, program_args: Vec<String>, config: &CliConfig) -> i32 {
    let image_bytes = match Assembler::assemble_file(source, assemble_options(config)) {
        Ok(bytes) => bytes,
        Err(diag) => {
            eprintln!("{}", diag.format_with_context());
            return 1;
        }
    };
    run_image(&image_bytes, program_args, config)
}

fn run_image(bytes: &[u8], program_args: Vec<String>, config: &CliConfig) -> i32 {
    let memory_size = config.memory_size.unwrap_or(DEFAULT_MEMORY_SIZE);
    if memory_size < HEAP_BASE as usize + STACK_SIZE {
        eprintln!(
            "--memory must be at least {} bytes (data area plus stack)",
            HEAP_BASE as usize + STACK_SIZE
        );
        return 1;
    }
    let image = match Image::parse(bytes) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let mut interp = Interpreter::new(memory_size, program_args, config.debug);
    if let Err(err) = interp.load(&image) {
        eprintln!("{err}");
        return 1;
    }
    match interp.run() {
        Ok(status) => status,
        Err(err) => {
            report_runtime_error(&interp, &err, config.trace);
            1
        }
    }
}

fn report_runtime_error(interp: &Interpreter, err: &VmError, trace: bool) {
    if !interp.mni_trace().is_empty() {
        eprintln!("foreign-call stack (most recent call last):");
        for name in interp.mni_trace().iter().rev() {
            eprintln!("  at {name}");
        }
    }

    match interp.fault_context() {
        Some((offset, byte)) => eprintln!(
            "runtime error at {} (opcode 0x{byte:02X}): {err}",
            interp.describe_offset(offset as i32)
        ),
        None => eprintln!("runtime error: {err}"),
    }

    if trace {
        eprintln!("\nstack trace (most recent frame first):");
        for frame in interp.stack_trace() {
            eprintln!("  {frame}");
        }
    }

    eprintln!("\nregister dump:");
    eprintln!("{}", interp.format_register_dump());
}

fn disassemble(binary: &Path, output: Option<&Path>, config: &CliConfig) -> i32 {
    let bytes = match fs::read(binary) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("cannot read {}: {err}", binary.display());
            return 1;
        }
    };
    let image = match Image::parse(&bytes) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let disassembly = match Disassembly::from_image(&image) {
        Ok(disassembly) => disassembly,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    match config.format {
        OutputFormat::Json => {
            let rendered = format!("{:#}\n", disassembly.render_json());
            match output {
                Some(path) => {
                    if let Err(err) = fs::write(path, rendered) {
                        eprintln!("cannot write {}: {err}", path.display());
                        return 1;
                    }
                }
                None => print!("{rendered}"),
            }
        }
        OutputFormat::Text => {
            // Annotated listing on the terminal; the optional output file
            // receives the re-assemblable form.
            print!("{}", disassembly.render_annotated());
            if let Some(path) = output {
                if let Err(err) = fs::write(path, disassembly.render_text()) {
                    eprintln!("cannot write {}: {err}", path.display());
                    return 1;
                }
            }
        }
    }
    0
}
