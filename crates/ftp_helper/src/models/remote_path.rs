use percent_encoding::percent_decode_str;
use url::Url;

/// Replaces Windows separators with `/`
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Non-empty path components, after separator normalization
pub fn segments(path: &str) -> Vec<String> {
    normalize_separators(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Splits a remote path into its parent directory and leaf name.
///
/// `/pub/a.txt` gives `("/pub", "a.txt")`, `/a.txt` gives `("/", "a.txt")`
/// and a bare `a.txt` gives `("", "a.txt")`, which lists the base itself.
pub fn split_parent(path: &str) -> (String, String) {
    let normalized = normalize_separators(path);
    let trimmed = normalized.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => ("/".to_string(), trimmed[1..].to_string()),
        Some(index) => (trimmed[..index].to_string(), trimmed[index + 1..].to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

/// Server-side path of `path` under the base URI.
///
/// Plain string concatenation of the decoded base path and `path`; nothing
/// in `path` is parsed or escaped, so `#`, `?` and `%` reach the server as
/// written. `ftp://host/` + `/pub` is `//pub`, so callers keep leading
/// separators consistent themselves.
pub fn join_remote(base: &Url, path: &str) -> String {
    format!("{}{}", percent_decode_str(base.path()).decode_utf8_lossy(), path)
}
