//! `.env` parsing. Values are only collected here; `load_and_apply` decides precedence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn dotenv_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = match override_dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    let path = dir.join(".env");
    path.is_file().then_some(path)
}

/// Unquotes a value. Double quotes honor `\"` and `\n`; single quotes are literal;
/// unquoted values lose a trailing ` # comment`.
fn parse_value(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        return raw[1..raw.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\n", "\n");
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    match raw.find(" #") {
        Some(i) => raw[..i].trim_end().to_string(),
        None => raw.to_string(),
    }
}

/// `KEY=VALUE` per line; blank lines, `#` lines and lines without `=` are skipped.
/// An optional leading `export ` is accepted.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), parse_value(value)))
        })
        .collect()
}

/// Reads `.env` from `override_dir` or the current directory. Missing file is an empty map.
pub fn load_env_map(override_dir: Option<&Path>) -> std::io::Result<HashMap<String, String>> {
    match dotenv_path(override_dir) {
        Some(path) => Ok(parse_dotenv(&std::fs::read_to_string(path)?)),
        None => Ok(HashMap::new()),
    }
}
