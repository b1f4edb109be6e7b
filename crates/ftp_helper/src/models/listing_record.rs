use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of a parsed directory listing.
///
/// Fields:
/// - `name`: leaf name of the entry, never `.` or `..`
/// - `is_directory`: whether the entry is a directory
/// - `size`: byte count; Windows-style listings report 0 for directories
/// - `updated_at`: timestamp as printed by the server, no timezone
/// - `flags`, `owner`, `group`: only filled for Unix-style listings
/// - `raw_tokens`: whitespace-split tokens of the source line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub updated_at: NaiveDateTime,
    pub flags: String,
    pub owner: String,
    pub group: String,
    pub raw_tokens: Vec<String>,
}

impl ListingRecord {
    /// Whether this record is a regular file named `name`
    pub fn is_file_named(&self, name: &str) -> bool {
        !self.is_directory && self.name == name
    }

    /// Whether this record is a directory named `name`
    pub fn is_directory_named(&self, name: &str) -> bool {
        self.is_directory && self.name == name
    }
}

impl fmt::Display for ListingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ {}, size: {}, updated: {} }}",
            self.name,
            if self.is_directory { "dir" } else { "file" },
            self.size,
            self.updated_at.format("%Y-%m-%d %H:%M:%S")
        )
    }
}
