//! Flat key-value configuration in the `.properties` file format.
//!
//! Supported syntax:
//! - `key=value`, `key: value` or `key value`
//! - `#` and `!` comment lines, blank lines
//! - a trailing backslash continues the value on the next line

use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Parsed property set.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load properties from a file on disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Parse properties from a string.
    pub fn parse(content: &str) -> Self {
        let mut entries = HashMap::new();
        let mut pending = String::new();

        for raw in content.lines() {
            let line = if pending.is_empty() {
                raw.trim()
            } else {
                raw.trim_start()
            };

            let is_comment = line.starts_with('#') || line.starts_with('!');
            if pending.is_empty() && (line.is_empty() || is_comment) {
                continue;
            }

            if let Some(continued) = strip_continuation(line) {
                pending.push_str(continued);
                continue;
            }

            pending.push_str(line);
            if let Some((key, value)) = split_entry(&pending) {
                entries.insert(key, value);
            }
            pending.clear();
        }

        if !pending.is_empty() {
            if let Some((key, value)) = split_entry(&pending) {
                entries.insert(key, value);
            }
        }

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up the first key that is present, in order.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a value, falling back to `default` when the key is absent.
    ///
    /// An empty value counts as absent. A present but malformed value is an error.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key).filter(|v| !v.is_empty()) {
            Some(value) => value
                .parse()
                .map_err(|e| ConfigError::invalid(key, value, e)),
            None => Ok(default),
        }
    }

    /// Parse an optional value.
    pub fn parse_opt<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key).filter(|v| !v.is_empty()) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::invalid(key, value, e)),
            None => Ok(None),
        }
    }

    /// Fetch a required string value, trying each alias in order.
    pub fn require_any(&self, keys: &[&str]) -> Result<String, ConfigError> {
        self.get_any(keys)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingKey(keys.join(" / ")))
    }
}

/// Returns the line without its continuation backslash, if it has one.
///
/// An even run of trailing backslashes is an escaped backslash, not a continuation.
fn strip_continuation(line: &str) -> Option<&str> {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    if trailing % 2 == 1 {
        Some(&line[..line.len() - 1])
    } else {
        None
    }
}

fn split_entry(line: &str) -> Option<(String, String)> {
    let split_at = line
        .char_indices()
        .find(|(_, c)| *c == '=' || *c == ':' || c.is_whitespace())
        .map(|(i, _)| i);

    let (key, rest) = match split_at {
        Some(i) => (&line[..i], &line[i..]),
        None => (line, ""),
    };

    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    // Skip whitespace, then at most one separator, then whitespace again
    let rest = rest.trim_start();
    let rest = rest
        .strip_prefix('=')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);

    Some((key.to_string(), rest.trim().to_string()))
}
