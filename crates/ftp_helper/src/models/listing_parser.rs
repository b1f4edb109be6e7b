use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};

use super::listing_format::ListingFormat;
use super::listing_record::ListingRecord;

/// Marker printed in place of the size for Windows-style directories
pub const WINDOWS_DIRECTORY_MARKER: &str = "<DIR>";

const UNIX_TOKEN_COUNT: usize = 9;
const WINDOWS_TOKEN_COUNT: usize = 4;

const WINDOWS_DATETIME_FORMATS: &[&str] = &[
    "%m-%d-%y %I:%M%p",
    "%m-%d-%y %H:%M",
    "%m-%d-%Y %I:%M%p",
    "%m-%d-%Y %H:%M",
];

/// Splits a raw listing on `\r` and `\n`, dropping empty lines
pub fn split_lines(text: &str) -> Vec<&str> {
    text.split(&['\r', '\n'][..])
        .filter(|line| !line.is_empty())
        .collect()
}

/// Turns LIST output into listing records.
///
/// Lines that do not have the exact token count of their format, or whose
/// size or date does not parse, are skipped; one bad line never fails the
/// listing. `.` and `..` are always dropped.
#[derive(Debug, Clone, Copy)]
pub struct ListingParser {
    /// Year substituted when a Unix line prints a time instead of a year
    current_year: i32,
}

impl Default for ListingParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingParser {
    pub fn new() -> Self {
        Self {
            current_year: Local::now().year(),
        }
    }

    /// Parser with a fixed substitution year
    pub fn with_current_year(current_year: i32) -> Self {
        Self { current_year }
    }

    /// Classifies and parses a whole listing; an unknown format yields no
    /// records
    pub fn parse_listing(&self, text: &str) -> Vec<ListingRecord> {
        let lines = split_lines(text);
        let format = ListingFormat::classify(&lines);
        log::debug!("Listing of {} line(s) classified as {}", lines.len(), format);
        self.parse_lines(&lines, format)
    }

    /// Parses lines already known to be in `format`
    pub fn parse_lines<S: AsRef<str>>(&self, lines: &[S], format: ListingFormat) -> Vec<ListingRecord> {
        let parse: fn(&Self, &str) -> Option<ListingRecord> = match format {
            ListingFormat::Unix => Self::parse_unix_line,
            ListingFormat::Windows => Self::parse_windows_line,
            ListingFormat::Unknown => return Vec::new(),
        };

        lines
            .iter()
            .filter_map(|line| {
                let record = parse(self, line.as_ref());
                if record.is_none() {
                    log::trace!("Skipping listing line {:?}", line.as_ref());
                }
                record
            })
            .filter(|record| record.name != "." && record.name != "..")
            .collect()
    }

    /// `flags links owner group size month day year-or-time name`
    pub fn parse_unix_line(&self, line: &str) -> Option<ListingRecord> {
        let tokens = tokenize(line);
        if tokens.len() != UNIX_TOKEN_COUNT {
            return None;
        }

        let flags = tokens[0].clone();
        let is_directory = flags.starts_with('d');
        let size = tokens[4].parse::<u64>().ok()?;
        let updated_at = self.parse_unix_timestamp(&tokens[5], &tokens[6], &tokens[7])?;

        Some(ListingRecord {
            name: tokens[8].clone(),
            is_directory,
            size,
            updated_at,
            flags,
            owner: tokens[2].clone(),
            group: tokens[3].clone(),
            raw_tokens: tokens,
        })
    }

    /// `date time size-or-<DIR> name`
    pub fn parse_windows_line(&self, line: &str) -> Option<ListingRecord> {
        let tokens = tokenize(line);
        if tokens.len() != WINDOWS_TOKEN_COUNT {
            return None;
        }

        let updated_at = parse_windows_timestamp(&tokens[0], &tokens[1])?;
        let is_directory = tokens[2] == WINDOWS_DIRECTORY_MARKER;
        let size = if is_directory {
            0
        } else {
            tokens[2].parse::<u64>().ok()?
        };

        Some(ListingRecord {
            name: tokens[3].clone(),
            is_directory,
            size,
            updated_at,
            flags: String::new(),
            owner: String::new(),
            group: String::new(),
            raw_tokens: tokens,
        })
    }

    fn parse_unix_timestamp(&self, month: &str, day: &str, year_or_time: &str) -> Option<NaiveDateTime> {
        if year_or_time.contains(':') {
            let text = format!("{} {} {} {}", month, day, self.current_year, year_or_time);
            NaiveDateTime::parse_from_str(&text, "%b %d %Y %H:%M")
                .or_else(|_| NaiveDateTime::parse_from_str(&text, "%b %d %Y %H:%M:%S"))
                .ok()
        } else {
            let text = format!("{} {} {}", month, day, year_or_time);
            NaiveDate::parse_from_str(&text, "%b %d %Y")
                .ok()?
                .and_hms_opt(0, 0, 0)
        }
    }
}

fn tokenize(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

fn parse_windows_timestamp(date: &str, time: &str) -> Option<NaiveDateTime> {
    let text = format!("{} {}", date, time);
    WINDOWS_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&text, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_unix_directory_with_time_uses_current_year() {
        let parser = ListingParser::new();
        let record = parser
            .parse_unix_line("drwxr-xr-x 2 owner group 4096 Jan 1 10:30 mydir")
            .unwrap();

        assert!(record.is_directory);
        assert_eq!(record.name, "mydir");
        assert_eq!(record.size, 4096);
        assert_eq!(record.updated_at.year(), Local::now().year());
        assert_eq!(record.updated_at.month(), 1);
        assert_eq!(record.updated_at.hour(), 10);
        assert_eq!(record.updated_at.minute(), 30);
        assert_eq!(record.owner, "owner");
        assert_eq!(record.group, "group");
        assert_eq!(record.flags, "drwxr-xr-x");
        assert_eq!(record.raw_tokens.len(), 9);
    }

    #[test]
    fn test_parse_unix_file_with_explicit_year() {
        let parser = ListingParser::with_current_year(2030);
        let record = parser
            .parse_unix_line("  -rw-r--r--   1 ftp   ftp     1234 Mar 14  2019 report.csv  ")
            .unwrap();

        assert!(!record.is_directory);
        assert_eq!(record.size, 1234);
        assert_eq!(record.name, "report.csv");
        assert_eq!(
            record.updated_at,
            NaiveDate::from_ymd_opt(2019, 3, 14).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_windows_directory_and_file() {
        let parser = ListingParser::new();
        let dir = parser.parse_windows_line("10-21-15 03:42PM <DIR> mydir").unwrap();
        assert!(dir.is_directory);
        assert_eq!(dir.name, "mydir");
        assert_eq!(dir.size, 0);
        assert_eq!(
            dir.updated_at,
            NaiveDate::from_ymd_opt(2015, 10, 21).unwrap().and_hms_opt(15, 42, 0).unwrap()
        );

        let file = parser
            .parse_windows_line("01-15-24  09:30AM              1024 test.dbc")
            .unwrap();
        assert!(!file.is_directory);
        assert_eq!(file.size, 1024);
        assert_eq!(file.name, "test.dbc");
        assert!(file.owner.is_empty());
    }

    #[test]
    fn test_wrong_token_counts_are_skipped() {
        let parser = ListingParser::new();
        assert!(parser.parse_unix_line("drwxr-xr-x 2 owner group 4096 Jan 1 my dir").is_none());
        assert!(parser.parse_unix_line("drwxr-xr-x 2 owner 4096 Jan 1 10:30 mydir").is_none());
        assert!(parser.parse_windows_line("10-21-15 03:42PM <DIR> my dir").is_none());
    }

    #[test]
    fn test_malformed_values_are_skipped() {
        let parser = ListingParser::new();
        assert!(parser.parse_unix_line("-rw-r--r-- 1 a b big Jan 1 10:30 f").is_none());
        assert!(parser.parse_unix_line("-rw-r--r-- 1 a b 10 Foo 1 10:30 f").is_none());
        assert!(parser.parse_windows_line("99-99-99 03:42PM 10 f").is_none());
        assert!(parser.parse_windows_line("10-21-15 03:42PM ten f").is_none());
    }

    #[test]
    fn test_one_good_line_among_malformed_yields_one_record() {
        let parser = ListingParser::new();
        let text = "drwxr-xr-x 2 owner group 4096 Jan 1 10:30 mydir\r\n-rw-r--r-- 1 owner group\r\n";
        let records = parser.parse_listing(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "mydir");
    }

    #[test]
    fn test_dot_entries_are_filtered() {
        let parser = ListingParser::new();
        let unix = "drwxr-xr-x 2 o g 4096 Jan 1 10:30 .\n\
                    drwxr-xr-x 9 o g 4096 Jan 1 10:30 ..\n\
                    -rw-r--r-- 1 o g 7 Jan 1 10:30 a.txt\n";
        let records = parser.parse_listing(unix);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "a.txt");

        let windows = "10-21-15 03:42PM <DIR> .\n10-21-15 03:42PM <DIR> ..\n";
        assert!(parser.parse_listing(windows).is_empty());
    }

    #[test]
    fn test_unknown_listing_yields_nothing() {
        let parser = ListingParser::new();
        assert!(parser.parse_listing("total 0\nnothing to see here\n").is_empty());
        assert!(parser.parse_listing("").is_empty());
        let lines = ["drwxr-xr-x 2 owner group 4096 Jan 1 10:30 mydir"];
        assert!(parser.parse_lines(&lines, ListingFormat::Unknown).is_empty());
    }

    #[test]
    fn test_windows_listing_ignores_unix_total_line() {
        let parser = ListingParser::new();
        let text = "10-21-15  03:42PM       <DIR>          pub\n\
                    10-21-15  11:05AM                 512 readme.txt\n\
                    garbage\n";
        let records = parser.parse_listing(text);
        assert_eq!(records.len(), 2);
        assert!(records[0].is_directory_named("pub"));
        assert!(records[1].is_file_named("readme.txt"));
        assert_eq!(records[1].size, 512);
    }

    #[test]
    fn test_split_lines_handles_mixed_line_endings() {
        assert_eq!(split_lines("a\r\nb\n\nc\r"), vec!["a", "b", "c"]);
    }
}
