//! Single-file container decryption
//!
//! Page 0 decides what happens to a file: a plaintext header means the file
//! is copied through, a verifying tag means every page is decrypted, anything
//! else means the secret does not belong to this file.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chatlog_core::config::DecryptConfig;
use chatlog_core::{ChatlogError, ChatlogResult};
use chatlog_crypto::{
    decrypt_page, has_plaintext_header, is_zero_page, open_first_page, KdfParams, Secret,
    PAGE_SIZE,
};
use tracing::{debug, info, warn};

use crate::output::AtomicFile;

/// What happened to one successfully processed file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Input already carried the plaintext header and was copied unchanged.
    Copied { bytes: u64 },
    /// Input was decrypted page by page.
    Decrypted {
        pages: u32,
        /// Pages whose tag did not verify and were written through as-is
        degraded_pages: u32,
    },
}

/// Decrypts archive containers with one secret.
#[derive(Debug)]
pub struct Decryptor {
    secret: Secret,
    params: KdfParams,
    pub(crate) layout: DecryptConfig,
}

impl Decryptor {
    pub fn new(secret: Secret) -> Self {
        Self::with_config(secret, &DecryptConfig::default())
    }

    /// Validate a 64-hex-character secret. Fails before any file is touched.
    pub fn from_hex(secret: &str) -> ChatlogResult<Self> {
        Ok(Self::new(Secret::from_hex(secret)?))
    }

    pub fn with_config(secret: Secret, config: &DecryptConfig) -> Self {
        Self {
            secret,
            params: KdfParams::from(config),
            layout: config.clone(),
        }
    }

    /// Decrypt (or copy through) `input` into `output`.
    ///
    /// Returns [`ChatlogError::KeyInvalid`] when page 0 does not verify; in
    /// that case nothing is written. Individual pages that fail verification
    /// later in the file are written through undecrypted and counted in
    /// [`FileOutcome::Decrypted::degraded_pages`].
    pub fn decrypt_file(&self, input: &Path, output: &Path) -> ChatlogResult<FileOutcome> {
        let file = File::open(input)?;
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut first = vec![0u8; PAGE_SIZE];
        read_page(&mut reader, &mut first)?;

        if has_plaintext_header(&first) {
            drop(reader);
            let bytes = copy_through(input, output)?;
            info!(path = %input.display(), bytes, "already decrypted, copied through");
            return Ok(FileOutcome::Copied { bytes });
        }

        let keys = match open_first_page(&self.secret, &first, &self.params) {
            Ok(keys) => keys,
            Err(ChatlogError::Authentication { .. }) => {
                return Err(ChatlogError::KeyInvalid {
                    path: input.to_path_buf(),
                })
            }
            Err(e) => return Err(e),
        };

        let pages = u32::try_from(total_len.div_ceil(PAGE_SIZE as u64)).map_err(|_| {
            ChatlogError::Other(anyhow::anyhow!(
                "{}: too many pages ({total_len} bytes)",
                input.display()
            ))
        })?;
        debug!(path = %input.display(), pages, "decrypting container");

        let mut out = AtomicFile::create(output)?;
        let mut degraded_pages = 0u32;
        let mut page = first;

        for index in 0..pages {
            if index > 0 {
                read_page(&mut reader, &mut page)?;
            }

            if is_zero_page(&page) {
                out.write_all(&page)?;
                continue;
            }

            match decrypt_page(&keys, index, &page) {
                Ok(plain) => out.write_all(&plain)?,
                Err(ChatlogError::Authentication { page: failed }) => {
                    warn!(path = %input.display(), page = failed, "page failed authentication, writing it through");
                    degraded_pages += 1;
                    out.write_all(&page)?;
                }
                Err(e) => return Err(e),
            }
        }

        out.commit()?;
        Ok(FileOutcome::Decrypted {
            pages,
            degraded_pages,
        })
    }

    /// Directory holding the archive's containers.
    ///
    /// Accepts either the account data directory (with a `db_storage/`
    /// child) or the storage directory itself.
    pub fn storage_root(&self, input: &Path) -> PathBuf {
        let nested = input.join(&self.layout.storage_subdir);
        if nested.is_dir() {
            nested
        } else {
            input.to_path_buf()
        }
    }
}

/// Fill `buf` from `reader`, zero-padding a short final page.
///
/// Returns the number of bytes actually read.
fn read_page(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf[filled..].fill(0);
    Ok(filled)
}

fn copy_through(input: &Path, output: &Path) -> ChatlogResult<u64> {
    let mut src = File::open(input)?;
    let mut out = AtomicFile::create(output)?;
    let bytes = io::copy(&mut src, &mut out)?;
    out.commit()?;
    Ok(bytes)
}
