use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix permission prefix: type flag (`-` or `d`) followed by three
/// `rwx` triplets where every position may also be `-`.
pub static UNIX_PERMISSIONS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-d][-r][-w][-x][-r][-w][-x][-r][-w][-x]$")
        .expect("Invalid regex pattern for Unix permissions")
});

/// Windows/IIS date prefix: `DD-DD-DD`
pub static WINDOWS_DATE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}-[0-9]{2}-[0-9]{2}$").expect("Invalid regex pattern for Windows dates")
});

const UNIX_PREFIX_LEN: usize = 10;
const WINDOWS_PREFIX_LEN: usize = 8;

/// Textual convention of a LIST response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListingFormat {
    /// `ls -l` style: `drwxr-xr-x 2 owner group 4096 Jan 1 10:30 name`
    Unix,
    /// IIS style: `10-21-15 03:42PM <DIR> name`
    Windows,
    Unknown,
}

impl fmt::Display for ListingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => write!(f, "unix"),
            Self::Windows => write!(f, "windows"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl ListingFormat {
    /// Classifies a listing from its lines.
    ///
    /// Lines are scanned in order and the first line matching either
    /// convention decides for the whole listing; later lines are never
    /// consulted. A line only qualifies when it is strictly longer than the
    /// prefix being tested.
    pub fn classify<S: AsRef<str>>(lines: &[S]) -> Self {
        for line in lines {
            let line = line.as_ref();
            if Self::has_prefix(line, UNIX_PREFIX_LEN, &UNIX_PERMISSIONS_PATTERN) {
                return Self::Unix;
            }
            if Self::has_prefix(line, WINDOWS_PREFIX_LEN, &WINDOWS_DATE_PATTERN) {
                return Self::Windows;
            }
        }
        Self::Unknown
    }

    fn has_prefix(line: &str, len: usize, pattern: &Regex) -> bool {
        // byte index of the char following the prefix, if the line is longer
        match line.char_indices().nth(len) {
            Some((end, _)) => pattern.is_match(&line[..end]),
            None => false,
        }
    }
}
