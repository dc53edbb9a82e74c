// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Error types and diagnostics for the assembler.

use std::fmt;

/// Categories of assembler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmErrorKind {
    IncludeNotFound,
    UnknownOpcode,
    InvalidOperand,
    UnknownLabel,
    MissingEntryPoint,
    OutOfRange,
    Syntax,
    Io,
}

/// An assembler error with a kind and message.
#[derive(Debug, Clone)]
pub struct AsmError {
    kind: AsmErrorKind,
    message: String,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, msg: &str, param: Option<&str>) -> Self {
        Self {
            kind,
            message: format_error(msg, param),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.kind
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AsmError {}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic message with location context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    line: u32,
    column: Option<usize>,
    code: &'static str,
    severity: Severity,
    error: AsmError,
    file: Option<String>,
    source: Option<String>,
}

impl Diagnostic {
    pub fn new(line: u32, severity: Severity, error: AsmError) -> Self {
        Self {
            line,
            column: None,
            code: default_diagnostic_code(error.kind()),
            severity,
            error,
            file: None,
            source: None,
        }
    }

    pub fn with_column(mut self, column: Option<usize>) -> Self {
        self.column = column;
        self
    }

    pub fn with_file(mut self, file: Option<String>) -> Self {
        if self.file.is_none() {
            self.file = file;
        }
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        if self.source.is_none() {
            self.source = source;
        }
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn code(&self) -> &str {
        self.code
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> Option<usize> {
        self.column
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn kind(&self) -> AsmErrorKind {
        self.error.kind()
    }

    pub fn message(&self) -> &str {
        self.error.message()
    }

    pub fn format(&self) -> String {
        let sev = match self.severity {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        match &self.file {
            Some(file) => format!(
                "{file}:{}: {sev} [{}] - {}",
                self.line,
                self.code,
                self.error.message()
            ),
            None => format!("{}: {sev} [{}] - {}", self.line, self.code, self.error.message()),
        }
    }

    /// Render the diagnostic with its source line and a caret column marker.
    pub fn format_with_context(&self) -> String {
        let mut out = self.format();
        if let Some(source) = &self.source {
            out.push('\n');
            out.push_str(&format!("{:>5} | {}", self.line, source));
            if let Some(column) = self.column {
                out.push('\n');
                out.push_str(&format!("{:>5} | {}^", "", " ".repeat(column.saturating_sub(1))));
            }
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl std::error::Error for Diagnostic {}

fn default_diagnostic_code(kind: AsmErrorKind) -> &'static str {
    match kind {
        AsmErrorKind::IncludeNotFound => "masm101",
        AsmErrorKind::UnknownOpcode => "masm201",
        AsmErrorKind::InvalidOperand => "masm202",
        AsmErrorKind::UnknownLabel => "masm203",
        AsmErrorKind::MissingEntryPoint => "masm204",
        AsmErrorKind::OutOfRange => "masm205",
        AsmErrorKind::Syntax => "masm206",
        AsmErrorKind::Io => "masm501",
    }
}

/// Format an error message with an optional parameter.
pub fn format_error(msg: &str, param: Option<&str>) -> String {
    match param {
        Some(p) => format!("{msg}: {p}"),
        None => msg.to_string(),
    }
}
