use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::FtError;

// ── Constants ───────────────────────────────────────────────────────────────

pub const DELIMITER: char = '/';

// ── FtPath ──────────────────────────────────────────────────────────────────

/// A validated absolute path: one or more non-empty segments joined by
/// [`DELIMITER`], with no leading, trailing or doubled delimiter.
///
/// Equality and ordering are those of the canonical string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FtPath {
    text: String,
    /// Byte offset one past the end of each segment.
    bounds: Vec<usize>,
}

impl FtPath {
    /// Parse and validate a raw path string.
    pub fn parse(raw: &str) -> Result<Self, FtError> {
        if raw.is_empty() {
            return Err(FtError::BadPath("Path cannot be empty".to_string()));
        }
        if raw.starts_with(DELIMITER) {
            return Err(FtError::BadPath(format!(
                "Path cannot start with {}: {}",
                DELIMITER, raw
            )));
        }
        if raw.ends_with(DELIMITER) {
            return Err(FtError::BadPath(format!(
                "Path cannot end with {}: {}",
                DELIMITER, raw
            )));
        }

        let mut bounds = Vec::new();
        let mut start = 0;
        for (i, ch) in raw.char_indices() {
            if ch != DELIMITER {
                continue;
            }
            if i == start {
                return Err(FtError::BadPath(format!(
                    "Path contains an empty segment: {}",
                    raw
                )));
            }
            bounds.push(i);
            start = i + DELIMITER.len_utf8();
        }
        bounds.push(raw.len());

        Ok(Self {
            text: raw.to_string(),
            bounds,
        })
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.bounds.len()
    }

    /// The path made of the first `depth` segments.
    pub fn prefix(&self, depth: usize) -> Result<FtPath, FtError> {
        let text = self.prefix_str(depth).ok_or_else(|| {
            FtError::BadPath(format!(
                "Prefix depth {} is outside 1..={} for {}",
                depth,
                self.depth(),
                self.text
            ))
        })?;
        Ok(Self {
            text: text.to_string(),
            bounds: self.bounds[..depth].to_vec(),
        })
    }

    /// Borrowed form of [`FtPath::prefix`]; `None` when `depth` is out of range.
    pub fn prefix_str(&self, depth: usize) -> Option<&str> {
        if depth == 0 || depth > self.depth() {
            return None;
        }
        Some(&self.text[..self.bounds[depth - 1]])
    }

    /// Length of the longest run of equal leading segments.
    pub fn shared_prefix_depth(&self, other: &FtPath) -> usize {
        self.segments()
            .zip(other.segments())
            .take_while(|(a, b)| a == b)
            .count()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.text.split(DELIMITER)
    }

    /// Final segment.
    pub fn name(&self) -> &str {
        let start = match self.depth() {
            1 => 0,
            d => self.bounds[d - 2] + DELIMITER.len_utf8(),
        };
        &self.text[start..]
    }

    pub fn compare_str(&self, raw: &str) -> Ordering {
        self.text.as_str().cmp(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl Ord for FtPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl PartialOrd for FtPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FtPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for FtPath {
    type Err = FtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for FtPath {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
