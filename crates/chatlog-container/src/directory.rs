//! Whole-archive decryption: message shards plus the contact directory

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use chatlog_core::layout::{is_shard_file, SHARD_GLOB};
use chatlog_core::{ChatlogError, ChatlogResult};
use tracing::{info, warn};

use crate::decryptor::Decryptor;

/// Progress callback type (files_done, files_total, file_name)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// A file the batch could not process
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: ChatlogError,
}

/// Result of a directory run
#[derive(Debug, Default)]
pub struct DirectoryReport {
    /// Containers found in the source archive
    pub total: usize,
    /// Containers decrypted or copied through
    pub succeeded: usize,
    pub failures: Vec<FileFailure>,
    /// The run stopped early because the cancel flag was raised
    pub cancelled: bool,
}

impl Decryptor {
    /// Decrypt every message shard and the contact directory into `output`.
    ///
    /// Output is flat: `<output>/message_N.db` and `<output>/contact.db`.
    pub fn decrypt_directory(&self, input: &Path, output: &Path) -> ChatlogResult<DirectoryReport> {
        self.decrypt_directory_with(input, output, None, None)
    }

    /// [`Self::decrypt_directory`] with a per-file progress callback and a
    /// cancel flag checked before each file.
    ///
    /// A failing file is recorded in the report and the batch moves on.
    pub fn decrypt_directory_with(
        &self,
        input: &Path,
        output: &Path,
        progress: Option<&ProgressFn>,
        cancel: Option<&AtomicBool>,
    ) -> ChatlogResult<DirectoryReport> {
        let targets = self.collect_targets(input)?;
        let mut report = DirectoryReport {
            total: targets.len(),
            ..Default::default()
        };

        if targets.is_empty() {
            warn!(input = %input.display(), "no containers found");
            return Ok(report);
        }

        std::fs::create_dir_all(output)?;
        let total = targets.len() as u64;

        for (done, src) in targets.into_iter().enumerate() {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                info!(done, total, "decryption cancelled");
                report.cancelled = true;
                break;
            }

            let name = src
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dest = output.join(&name);

            match self.decrypt_file(&src, &dest) {
                Ok(outcome) => {
                    info!(file = %name, ?outcome, "container done");
                    report.succeeded += 1;
                }
                Err(error) => {
                    warn!(path = %src.display(), %error, "skipping container");
                    report.failures.push(FileFailure { path: src, error });
                }
            }

            if let Some(cb) = progress {
                cb(done as u64 + 1, total, &name);
            }
        }

        Ok(report)
    }

    /// Source containers in processing order: message shards sorted by
    /// name, then the contact directory if present.
    pub(crate) fn collect_targets(&self, input: &Path) -> ChatlogResult<Vec<PathBuf>> {
        let root = self.storage_root(input);
        let message_dir = root.join(&self.layout.message_subdir);

        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&message_dir.to_string_lossy()),
            SHARD_GLOB
        );
        let entries = glob::glob(&pattern)
            .map_err(|e| ChatlogError::Config(format!("bad shard pattern {pattern}: {e}")))?;

        let mut targets = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) => {
                    let is_shard = path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(is_shard_file);
                    if is_shard && path.is_file() {
                        targets.push(path);
                    }
                }
                Err(e) => warn!(error = %e, "unreadable shard candidate"),
            }
        }
        targets.sort();

        let contact = root.join(&self.layout.contact_file);
        if contact.is_file() {
            targets.push(contact);
        } else {
            warn!(path = %contact.display(), "contact directory not found");
        }

        Ok(targets)
    }
}
