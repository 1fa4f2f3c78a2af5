use clap::Parser;

use crate::error::FtError;
use crate::path::FtPath;

// ── Limits ──────────────────────────────────────────────────────────────────

/// Size and shape budgets for one file tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtLimits {
    pub max_node_count: usize,
    pub max_file_size: usize,
    pub max_total_size: usize,
    pub max_path_depth: usize,
    pub max_name_length: usize,
}

impl Default for FtLimits {
    fn default() -> Self {
        Self {
            max_node_count: 10_000,
            max_file_size: 10 * 1024 * 1024,   // 10 MB
            max_total_size: 100 * 1024 * 1024, // 100 MB
            max_path_depth: 64,
            max_name_length: 255,
        }
    }
}

impl FtLimits {
    /// Shape check applied to paths being inserted.
    pub fn check_path(&self, path: &FtPath) -> Result<(), FtError> {
        if path.depth() > self.max_path_depth {
            return Err(FtError::BadPath(format!(
                "Path exceeds max depth ({}): {}",
                self.max_path_depth, path
            )));
        }
        if let Some(segment) = path.segments().find(|s| s.len() > self.max_name_length) {
            return Err(FtError::BadPath(format!(
                "Path segment exceeds max name length ({}): {}",
                self.max_name_length, segment
            )));
        }
        Ok(())
    }

    /// Budget check for storing `len` more bytes on top of `stored`.
    pub fn check_bytes(&self, stored: usize, len: usize) -> Result<(), FtError> {
        if len > self.max_file_size {
            return Err(FtError::Memory(format!(
                "File size {} exceeds limit ({})",
                len, self.max_file_size
            )));
        }
        if stored.saturating_add(len) > self.max_total_size {
            return Err(FtError::Memory(format!(
                "Total stored size would exceed limit ({})",
                self.max_total_size
            )));
        }
        Ok(())
    }

    /// Budget check before creating one more node when `live` already exist.
    pub fn check_node_budget(&self, live: usize) -> Result<(), FtError> {
        if live >= self.max_node_count {
            return Err(FtError::Memory(format!(
                "Maximum node count exceeded ({})",
                self.max_node_count
            )));
        }
        Ok(())
    }
}

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ft-engine", about = "In-memory file tree server over JSON-RPC / NDJSON stdio")]
pub struct CliArgs {
    /// Maximum number of live nodes per tree
    #[arg(long, default_value = "10000", env = "FT_ENGINE_MAX_NODES")]
    pub max_node_count: usize,

    /// Maximum size of a single file, in bytes
    #[arg(long, default_value = "10485760", env = "FT_ENGINE_MAX_FILE_SIZE")]
    pub max_file_size: usize,

    /// Maximum bytes stored across all files
    #[arg(long, default_value = "104857600", env = "FT_ENGINE_MAX_TOTAL_SIZE")]
    pub max_total_size: usize,

    /// Maximum path depth accepted on insert
    #[arg(long, default_value = "64", env = "FT_ENGINE_MAX_PATH_DEPTH")]
    pub max_path_depth: usize,

    /// Maximum length of one path segment
    #[arg(long, default_value = "255", env = "FT_ENGINE_MAX_NAME_LENGTH")]
    pub max_name_length: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "FT_ENGINE_LOG_LEVEL")]
    pub log_level: String,
}

impl CliArgs {
    pub fn limits(&self) -> FtLimits {
        FtLimits {
            max_node_count: self.max_node_count,
            max_file_size: self.max_file_size,
            max_total_size: self.max_total_size,
            max_path_depth: self.max_path_depth,
            max_name_length: self.max_name_length,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
