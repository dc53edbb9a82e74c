// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Include resolution.
//!
//! A path containing a separator is resolved relative to the including
//! file's directory. A dotted identifier maps to a path under the standard
//! library root, dots becoming separators, with a fallback root next to the
//! executable. The extensions `.mas` and `.masm` are tried in that order at
//! every candidate. Each resolved absolute path is recorded; a second
//! include of the same file is a silent no-op, which also terminates
//! include cycles.

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::core::error::{AsmError, AsmErrorKind};

const EXTENSIONS: [&str; 2] = ["mas", "masm"];
const STDLIB_DIR: &str = "stdlib";

pub struct IncludeResolver {
    visited: HashSet<PathBuf>,
    stdlib_root: PathBuf,
}

impl IncludeResolver {
    pub fn new() -> Self {
        Self {
            visited: HashSet::new(),
            stdlib_root: PathBuf::from("./stdlib"),
        }
    }

    /// Override the standard-library root (used by tests).
    pub fn with_stdlib_root(root: impl Into<PathBuf>) -> Self {
        Self {
            visited: HashSet::new(),
            stdlib_root: root.into(),
        }
    }

    /// Record `path` as visited. Returns false when it was already seen.
    pub fn mark_visited(&mut self, path: &Path) -> bool {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.visited.insert(canonical)
    }

    /// Resolve an include reference against the directory of the including
    /// file. Fails with every attempted candidate listed.
    pub fn resolve(&self, reference: &str, current_dir: &Path) -> Result<PathBuf, AsmError> {
        let mut attempted = Vec::new();

        let is_local = reference.contains('/') || reference.contains('\\');
        let candidates: Vec<PathBuf> = if is_local {
            vec![current_dir.join(reference)]
        } else {
            let dotted: PathBuf = reference.split('.').collect();
            let mut roots = vec![self.stdlib_root.join(&dotted), current_dir.join(&dotted)];
            if let Some(exe_root) = executable_stdlib_root() {
                roots.push(exe_root.join(&dotted));
            }
            roots
        };

        for candidate in &candidates {
            for ext in EXTENSIONS {
                let with_ext = candidate.with_extension(ext);
                if with_ext.is_file() {
                    return Ok(with_ext);
                }
                attempted.push(with_ext);
            }
        }

        let tried: Vec<String> = attempted
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Err(AsmError::new(
            AsmErrorKind::IncludeNotFound,
            &format!("Include file not found: {reference} (tried {})", tried.join(", ")),
            None,
        ))
    }
}

impl Default for IncludeResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn executable_stdlib_root() -> Option<PathBuf> {
    let exe = env::current_exe().ok()?;
    Some(exe.parent()?.join(STDLIB_DIR))
}
