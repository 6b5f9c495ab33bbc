//! Call-site provenance.

use std::fmt;

use serde::Serialize;

/// Source location of an allocation or deallocation call.
///
/// Both fields come from `file!()` / `line!()` at the call site, so the file
/// name lives for the whole program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
    pub file: &'static str,
    pub line: u32,
}

impl Origin {
    #[must_use]
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Strip the directory part of a source path.
///
/// Accepts both `/` and `\` separators so paths produced on Windows hosts
/// shorten the same way.
#[must_use]
pub fn basename(path: &'static str) -> &'static str {
    match path.rfind(['/', '\\']) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}
