// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::include::IncludeResolver;
use crate::assembler::lexer::{clean_line, quoted_body, split_tokens, unescape};
use crate::assembler::operand::resolve_operand;
use crate::core::error::{AsmError, AsmErrorKind, Diagnostic, Severity};
use crate::core::image::{
    write_data_record, write_debug_record, BinaryHeader, ENTRY_AUTO_INIT, SUPPORTED_VERSION,
};
use crate::core::opcode::{Arity, Opcode};
use crate::core::operand::{encode_operand, operand_width, Operand, OperandType};

const ENTRY_LABEL: &str = "#main";

/// Knobs carried from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleOptions {
    /// Verbose trace output on stderr.
    pub debug: bool,
    /// Persist the label table into the image's debug region.
    pub write_debug_labels: bool,
}

/// An instruction as collected by the parse pass: opcode plus unresolved
/// operand text. MNI instructions also carry their function name.
#[derive(Debug, Clone)]
struct Instruction {
    opcode: Opcode,
    operands: Vec<String>,
    mni_name: Option<String>,
    addr: u32,
    line: u32,
    file: Option<String>,
}

#[derive(Debug, Clone)]
struct DataRecord {
    addr: u16,
    bytes: Vec<u8>,
}

pub struct Assembler {
    labels: HashMap<String, u32>,
    instructions: Vec<Instruction>,
    data: Vec<DataRecord>,
    current_address: u32,
    data_cursor: u32,
    options: AssembleOptions,
    includes: IncludeResolver,
    /// Innermost include context: (file, directory).
    context: Vec<(PathBuf, PathBuf)>,
}

impl Assembler {
    pub fn new(options: AssembleOptions) -> Self {
        Self {
            labels: HashMap::new(),
            instructions: Vec::new(),
            data: Vec::new(),
            current_address: 0,
            data_cursor: 0,
            options,
            includes: IncludeResolver::new(),
            context: Vec::new(),
        }
    }

    /// Swap in a custom include resolver (tests point the stdlib root at a
    /// scratch directory).
    pub fn with_includes(mut self, includes: IncludeResolver) -> Self {
        self.includes = includes;
        self
    }

    pub fn labels(&self) -> &HashMap<String, u32> {
        &self.labels
    }

    /// Assemble a source file and all of its includes into an image.
    pub fn assemble_file(path: &Path, options: AssembleOptions) -> Result<Vec<u8>, Diagnostic> {
        let mut assembler = Assembler::new(options);
        assembler.parse_file(path)?;
        assembler.emit()
    }

    /// Assemble in-memory source (no file context) into an image.
    pub fn assemble_str(source: &str, options: AssembleOptions) -> Result<Vec<u8>, Diagnostic> {
        let mut assembler = Assembler::new(options);
        assembler.parse_source(source)?;
        assembler.emit()
    }

    /// Parse a source file, honouring the visited set so repeated includes
    /// are silent no-ops.
    pub fn parse_file(&mut self, path: &Path) -> Result<(), Diagnostic> {
        let abs = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        if !self.includes.mark_visited(&abs) {
            if self.options.debug {
                eprintln!("[debug][assembler] skipping already included {}", abs.display());
            }
            return Ok(());
        }
        let source = fs::read_to_string(&abs).map_err(|err| {
            Diagnostic::new(
                0,
                Severity::Error,
                AsmError::new(
                    AsmErrorKind::Io,
                    &format!("Cannot open file: {err}"),
                    Some(&abs.display().to_string()),
                ),
            )
        })?;
        let dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.context.push((abs.clone(), dir));
        let result = self.parse_lines(&source, Some(&abs));
        self.context.pop();
        result
    }

    /// Parse in-memory source. Includes resolve against the working
    /// directory.
    pub fn parse_source(&mut self, source: &str) -> Result<(), Diagnostic> {
        self.parse_lines(source, None)
    }

    fn parse_lines(&mut self, source: &str, file: Option<&Path>) -> Result<(), Diagnostic> {
        let file_name = file.map(|p| p.display().to_string());
        for (idx, raw_line) in source.lines().enumerate() {
            let line_num = idx as u32 + 1;
            self.parse_line(raw_line, line_num).map_err(|diag| {
                diag.with_file(file_name.clone())
                    .with_source(Some(raw_line.to_string()))
            })?;
        }
        Ok(())
    }

    fn current_dir(&self) -> PathBuf {
        self.context
            .last()
            .map(|(_, dir)| dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    fn parse_line(&mut self, raw_line: &str, line_num: u32) -> Result<(), Diagnostic> {
        let line = match clean_line(raw_line) {
            Some(line) => line,
            None => return Ok(()),
        };
        let fail = |err: AsmError| Diagnostic::new(line_num, Severity::Error, err);

        if self.options.debug {
            eprintln!("[debug][assembler] line {line_num}: {line}");
        }

        // The include directive keeps its original case; mnemonics and
        // directives below are case-insensitive.
        if let Some(rest) = line.strip_prefix("#include") {
            let reference = quoted_body(rest).ok_or_else(|| {
                fail(AsmError::new(
                    AsmErrorKind::Syntax,
                    "Invalid #include directive: path missing or not quoted",
                    None,
                ))
            })?;
            let resolved = self
                .includes
                .resolve(reference, &self.current_dir())
                .map_err(fail)?;
            if self.options.debug {
                eprintln!(
                    "[debug][assembler] resolved include '{reference}' to {}",
                    resolved.display()
                );
            }
            return self.parse_file(&resolved).map_err(|inner| {
                // Keep the nested location; re-wrap only bare errors.
                if inner.line() == 0 {
                    fail(AsmError::new(
                        AsmErrorKind::Io,
                        inner.message(),
                        None,
                    ))
                } else {
                    inner
                }
            });
        }

        let tokens = split_tokens(line);
        let mnemonic = tokens[0].to_ascii_uppercase();

        match mnemonic.as_str() {
            "LBL" => {
                let name = tokens.get(1).ok_or_else(|| {
                    fail(AsmError::new(AsmErrorKind::Syntax, "Label name missing", None))
                })?;
                self.labels
                    .insert(format!("#{name}"), self.current_address);
                if self.options.debug {
                    eprintln!(
                        "[debug][assembler] label '{name}' at {:#x}",
                        self.current_address
                    );
                }
            }
            "DB" => self.parse_data_line(line, &tokens, line_num)?,
            "MNI" => {
                let name = tokens
                    .get(1)
                    .filter(|name| name.contains('.'))
                    .ok_or_else(|| {
                        fail(AsmError::new(
                            AsmErrorKind::Syntax,
                            "MNI requires a Module.Function name",
                            None,
                        ))
                    })?
                    .clone();
                let operands: Vec<String> = tokens[2..].to_vec();
                let size = self.mni_size(&name, &operands).map_err(fail)?;
                self.push_instruction(Opcode::Mni, operands, Some(name), size, line_num);
            }
            _ => {
                let opcode = Opcode::from_mnemonic(&mnemonic).ok_or_else(|| {
                    fail(AsmError::new(
                        AsmErrorKind::UnknownOpcode,
                        "Unknown mnemonic",
                        Some(&mnemonic),
                    ))
                })?;
                let operands: Vec<String> = tokens[1..].to_vec();
                check_arity(opcode, operands.len()).map_err(fail)?;
                let size = instruction_size(opcode, &operands).map_err(fail)?;
                self.push_instruction(opcode, operands, None, size, line_num);
            }
        }
        Ok(())
    }

    fn push_instruction(
        &mut self,
        opcode: Opcode,
        operands: Vec<String>,
        mni_name: Option<String>,
        size: u32,
        line: u32,
    ) {
        let file = self
            .context
            .last()
            .map(|(file, _)| file.display().to_string());
        self.instructions.push(Instruction {
            opcode,
            operands,
            mni_name,
            addr: self.current_address,
            line,
            file,
        });
        self.current_address += size;
    }

    fn parse_data_line(
        &mut self,
        line: &str,
        tokens: &[String],
        line_num: u32,
    ) -> Result<(), Diagnostic> {
        let fail = |err: AsmError| Diagnostic::new(line_num, Severity::Error, err);

        let addr_token = tokens.get(1).ok_or_else(|| {
            fail(AsmError::new(AsmErrorKind::Syntax, "DB requires an address", None))
        })?;
        let addr: u32 = addr_token
            .strip_prefix('$')
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| {
                fail(AsmError::new(
                    AsmErrorKind::InvalidOperand,
                    "DB address must be of the form $<n>",
                    Some(addr_token),
                ))
            })?;

        // Everything after the address token is the quoted payload.
        let addr_end = line
            .find(addr_token.as_str())
            .map(|pos| pos + addr_token.len())
            .unwrap_or(line.len());
        let body = quoted_body(&line[addr_end..]).ok_or_else(|| {
            fail(AsmError::new(
                AsmErrorKind::Syntax,
                "DB requires a quoted string",
                None,
            ))
        })?;
        let mut bytes = unescape(body);
        bytes.push(0);

        if addr > u16::MAX as u32 || bytes.len() > u16::MAX as usize {
            return Err(fail(AsmError::new(
                AsmErrorKind::OutOfRange,
                "DB record does not fit a 16-bit address/size",
                Some(addr_token),
            )));
        }

        self.data_cursor += (body.len() + 1) as u32;
        if self.options.debug {
            eprintln!(
                "[debug][assembler] data record at {addr}, {} bytes (cursor {})",
                bytes.len(),
                self.data_cursor
            );
        }
        self.data.push(DataRecord {
            addr: addr as u16,
            bytes,
        });
        Ok(())
    }

    fn mni_size(&self, name: &str, operands: &[String]) -> Result<u32, AsmError> {
        let mut size = 1 + name.len() as u32 + 1;
        for operand in operands {
            size += 1 + operand_size(operand)?;
        }
        size += 1; // NONE terminator
        Ok(size)
    }

    /// Emit the final image: header, code, data records, debug records.
    pub fn emit(&self) -> Result<Vec<u8>, Diagnostic> {
        let entry = *self.labels.get(ENTRY_LABEL).ok_or_else(|| {
            Diagnostic::new(
                0,
                Severity::Error,
                AsmError::new(
                    AsmErrorKind::MissingEntryPoint,
                    "Entry point label '#main' not found",
                    None,
                ),
            )
        })?;

        let mut code = Vec::new();
        for instr in &self.instructions {
            debug_assert_eq!(instr.addr as usize, code.len());
            self.encode_instruction(instr, &mut code).map_err(|err| {
                Diagnostic::new(instr.line, Severity::Error, err)
                    .with_file(instr.file.clone())
            })?;
        }

        let mut data = Vec::new();
        for record in &self.data {
            write_data_record(&mut data, record.addr, &record.bytes);
        }

        let mut debug = Vec::new();
        if self.options.write_debug_labels {
            let mut sorted: Vec<(&String, &u32)> = self.labels.iter().collect();
            sorted.sort_by_key(|(_, &addr)| addr);
            for (name, &addr) in sorted {
                write_debug_record(&mut debug, name, addr as i32);
            }
        }

        let header = BinaryHeader {
            version: SUPPORTED_VERSION,
            code_size: code.len() as u32,
            data_size: data.len() as u32,
            dbg_size: debug.len() as u32,
            entry_point: entry | ENTRY_AUTO_INIT,
        };

        let mut image = header.encode().to_vec();
        image.extend_from_slice(&code);
        image.extend_from_slice(&data);
        image.extend_from_slice(&debug);

        if self.options.debug {
            eprintln!(
                "[debug][assembler] emitted image: code={} data={} debug={} entry={:#x}",
                code.len(),
                data.len(),
                debug.len(),
                entry
            );
        }
        Ok(image)
    }

    fn encode_instruction(&self, instr: &Instruction, code: &mut Vec<u8>) -> Result<(), AsmError> {
        code.push(instr.opcode as u8);

        if let Some(name) = &instr.mni_name {
            code.extend_from_slice(name.as_bytes());
            code.push(0);
            for token in &instr.operands {
                let operand = resolve_operand(token, &self.labels)?;
                encode_operand(code, &operand);
            }
            encode_operand(code, &Operand::new(OperandType::None, 0));
            return Ok(());
        }

        for token in &instr.operands {
            let operand = resolve_operand(token, &self.labels)?;
            encode_operand(code, &operand);
        }
        if instr.opcode == Opcode::Enter && instr.operands.is_empty() {
            encode_operand(code, &Operand::immediate(0));
        }
        Ok(())
    }
}

/// Encoded size of one operand token, computable before labels resolve.
fn operand_size(token: &str) -> Result<u32, AsmError> {
    if token.starts_with('#') {
        return Ok(4);
    }
    static NO_LABELS: std::sync::OnceLock<HashMap<String, u32>> = std::sync::OnceLock::new();
    let labels = NO_LABELS.get_or_init(HashMap::new);
    let operand = resolve_operand(token, labels)?;
    Ok(operand_width(&operand) as u32)
}

/// Size in bytes of a regular instruction: opcode plus one type byte and
/// value per operand. ENTER with no operands encodes a one-byte zero.
fn instruction_size(opcode: Opcode, operands: &[String]) -> Result<u32, AsmError> {
    if opcode.is_pseudo() {
        return Ok(0);
    }
    if opcode == Opcode::Enter && operands.is_empty() {
        return Ok(3);
    }
    let mut size = 1;
    for operand in operands {
        size += 1 + operand_size(operand)?;
    }
    Ok(size)
}

fn check_arity(opcode: Opcode, count: usize) -> Result<(), AsmError> {
    let expected = match opcode.arity() {
        Arity::Fixed(n) => n,
        Arity::Variadic | Arity::None => return Ok(()),
    };
    if opcode == Opcode::Enter && count == 0 {
        return Ok(());
    }
    if count != expected {
        return Err(AsmError::new(
            AsmErrorKind::InvalidOperand,
            &format!(
                "{} expects {expected} operand{}, found {count}",
                opcode.mnemonic(),
                if expected == 1 { "" } else { "s" }
            ),
            None,
        ));
    }
    Ok(())
}
