//! chatlog-container: turns encrypted archive containers into plain ones
//!
//! A [`Decryptor`] holds the archive secret and walks either one file
//! ([`Decryptor::decrypt_file`]) or a whole account directory
//! ([`Decryptor::decrypt_directory`]). Output pages keep their reserved
//! trailer, so the result is a standard database with 80 reserved bytes
//! per page.

pub mod decryptor;
pub mod directory;
mod output;

pub use decryptor::{Decryptor, FileOutcome};
pub use directory::{DirectoryReport, FileFailure, ProgressFn};
