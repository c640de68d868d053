//! `@argfile` support for forked test JVMs.
//!
//! The launcher reads one argument per line. Arguments containing
//! whitespace, quotes or `#` are double-quoted; inside quotes `\` and `"`
//! are backslash-escaped.

use std::path::{Path, PathBuf};

use crate::{Result, TestingError};

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

pub fn join_classpath(classpath: &[PathBuf]) -> String {
    classpath
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

pub fn quote_arg(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '#'));
    if !needs_quotes {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

pub fn render(args: &[String]) -> String {
    let mut out = String::new();
    for arg in args {
        out.push_str(&quote_arg(arg));
        out.push('\n');
    }
    out
}

pub fn write(path: &Path, args: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| TestingError::io(parent, source))?;
    }
    std::fs::write(path, render(args)).map_err(|source| TestingError::io(path, source))
}
