//! chatlog-crypto: key derivation and page codec for encrypted chat containers
//!
//! A container is a sequence of fixed 4096-byte pages. Every non-empty page
//! is encrypted independently and carries its own trailer:
//!
//! ```text
//! page 0:  [16 B salt][ciphertext ................][16 B IV][64 B HMAC][pad]
//! page n:  [ciphertext ...........................][16 B IV][64 B HMAC][pad]
//!           \______________ authenticated ______________/
//! ```
//!
//! Key hierarchy (per file, the salt differs per file):
//! ```text
//! Secret (256-bit, supplied as 64 hex chars)
//!   └── Encryption Key = PBKDF2-HMAC-SHA512(secret, salt, 256000 rounds)
//!       └── MAC Key    = PBKDF2-HMAC-SHA512(enc_key, salt ^ 0x3a, 2 rounds)
//! ```
//!
//! Tag = HMAC-SHA512(mac_key, authenticated region || le_u32(page_index + 1)).

pub mod kdf;
pub mod page;

pub use kdf::{derive_keys, derive_keys_with, KdfParams, PageKeys, Secret};
pub use page::{
    decrypt_page, encrypt_page, has_plaintext_header, is_zero_page, open_first_page, verify_page,
    PLAINTEXT_HEADER,
};

/// Size of the raw secret and of each derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-file salt at the start of page 0
pub const SALT_SIZE: usize = 16;

/// Size of the AES-CBC initialisation vector stored in each page trailer
pub const IV_SIZE: usize = 16;

/// Size of an HMAC-SHA512 tag
pub const HMAC_SIZE: usize = 64;

/// AES block size; the trailer is padded to a multiple of it
pub const BLOCK_SIZE: usize = 16;

/// Fixed container page size
pub const PAGE_SIZE: usize = 4096;

/// Per-page trailer: IV + tag, rounded up to a whole cipher block
pub const RESERVE_SIZE: usize = round_up(IV_SIZE + HMAC_SIZE, BLOCK_SIZE);

const fn round_up(n: usize, multiple: usize) -> usize {
    (n + multiple - 1) / multiple * multiple
}
