//! Time-sharded message containers
//!
//! Each shard records only its own start time. Windows are derived by
//! ordering shards by start: a shard ends where the next one begins, and the
//! newest one runs until slightly past "now".

use std::path::{Path, PathBuf};

use chatlog_core::layout::{is_shard_file, SHARD_GLOB};
use chatlog_core::{ChatlogError, ChatlogResult};
use tracing::warn;

/// A shard and the `[start, end)` range of `create_time` it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardWindow {
    pub path: PathBuf,
    pub start: i64,
    pub end: i64,
}

impl ShardWindow {
    /// Whether this window overlaps the inclusive range `[start, end]`.
    pub fn intersects(&self, start: i64, end: i64) -> bool {
        self.start <= end && self.end > start
    }
}

/// Shard files directly under `dir`, sorted by name.
pub fn shard_paths(dir: &Path) -> ChatlogResult<Vec<PathBuf>> {
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        SHARD_GLOB
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| ChatlogError::Config(format!("bad shard pattern {pattern}: {e}")))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "unreadable shard candidate");
                None
            }
        })
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_shard_file)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Order shards by start time and close each window at the next start.
///
/// The newest window ends at `newest_end`.
pub fn assign_windows(mut starts: Vec<(PathBuf, i64)>, newest_end: i64) -> Vec<ShardWindow> {
    starts.sort_by(|(pa, a), (pb, b)| a.cmp(b).then_with(|| pa.cmp(pb)));

    let next_starts: Vec<i64> = starts.iter().skip(1).map(|(_, s)| *s).collect();
    starts
        .into_iter()
        .enumerate()
        .map(|(i, (path, start))| ShardWindow {
            path,
            start,
            end: next_starts.get(i).copied().unwrap_or(newest_end),
        })
        .collect()
}
