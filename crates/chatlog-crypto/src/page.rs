//! Per-page authentication and AES-256-CBC decryption
//!
//! Each page is verified before it is decrypted (Encrypt-then-MAC). The
//! trailer (IV + tag) is copied into the output unchanged, so decrypted pages
//! keep the container's page geometry and the result opens as a plain
//! database with `RESERVE_SIZE` reserved bytes per page.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chatlog_core::{ChatlogError, ChatlogResult};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use tracing::debug;

use crate::kdf::{derive_keys_with, KdfParams, PageKeys, Secret};
use crate::{HMAC_SIZE, IV_SIZE, PAGE_SIZE, RESERVE_SIZE, SALT_SIZE};

type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type HmacSha512 = Hmac<Sha512>;

/// Header of an unencrypted container; replaces the salt in decrypted output.
pub const PLAINTEXT_HEADER: &[u8; SALT_SIZE] = b"SQLite format 3\0";

/// Only the printable part of the header is compared when sniffing input.
const HEADER_MAGIC_LEN: usize = 15;

/// End of the encrypted body; the trailer starts here.
const CIPHERTEXT_END: usize = PAGE_SIZE - RESERVE_SIZE;

/// Start of the stored tag. Everything before it (from the data offset) is authenticated.
const TAG_OFFSET: usize = CIPHERTEXT_END + IV_SIZE;

/// Whether a first page already carries the plaintext container header.
pub fn has_plaintext_header(page: &[u8]) -> bool {
    page.len() >= HEADER_MAGIC_LEN && page[..HEADER_MAGIC_LEN] == PLAINTEXT_HEADER[..HEADER_MAGIC_LEN]
}

/// Sparse/unallocated pages are all zeroes and are never encrypted.
pub fn is_zero_page(page: &[u8]) -> bool {
    page.iter().all(|&b| b == 0)
}

/// Derive a file's keys from the salt in page 0 and check them against page 0's tag.
///
/// A mismatch here means the secret does not open this file at all.
pub fn open_first_page(
    secret: &Secret,
    first_page: &[u8],
    params: &KdfParams,
) -> ChatlogResult<PageKeys> {
    check_page_len(first_page)?;

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&first_page[..SALT_SIZE]);

    let keys = derive_keys_with(secret, &salt, params)?;
    debug!(salt = %hex::encode(salt), "derived page keys");
    verify_page(&keys, 0, first_page)?;
    Ok(keys)
}

/// Check a page's HMAC-SHA512 tag in constant time.
pub fn verify_page(keys: &PageKeys, index: u32, page: &[u8]) -> ChatlogResult<()> {
    check_page_len(page)?;
    page_mac(keys, index, page)?
        .verify_slice(&page[TAG_OFFSET..TAG_OFFSET + HMAC_SIZE])
        .map_err(|_| ChatlogError::Authentication { page: index })
}

/// Verify and decrypt one page.
///
/// Returns a full `PAGE_SIZE` page: for page 0 the salt is replaced by
/// [`PLAINTEXT_HEADER`]; the trailer bytes are reattached untouched.
pub fn decrypt_page(keys: &PageKeys, index: u32, page: &[u8]) -> ChatlogResult<Vec<u8>> {
    verify_page(keys, index, page)?;

    let offset = data_offset(index);
    let mut body = page[offset..CIPHERTEXT_END].to_vec();
    let iv = &page[CIPHERTEXT_END..TAG_OFFSET];

    Aes256CbcDec::new_from_slices(keys.enc_key(), iv)
        .map_err(|e| ChatlogError::Other(anyhow::anyhow!("AES-CBC init: {e}")))?
        .decrypt_padded_mut::<NoPadding>(&mut body)
        .map_err(|e| ChatlogError::Other(anyhow::anyhow!("AES-CBC decrypt page {index}: {e}")))?;

    let mut out = Vec::with_capacity(PAGE_SIZE);
    if index == 0 {
        out.extend_from_slice(PLAINTEXT_HEADER);
    }
    out.extend_from_slice(&body);
    out.extend_from_slice(&page[CIPHERTEXT_END..]);
    Ok(out)
}

/// Encrypt one plaintext page with the given IV (inverse of [`decrypt_page`]).
///
/// The plaintext's first 16 bytes on page 0 and its trailer region are not
/// encrypted: they are replaced by the salt and by `IV || tag`.
pub fn encrypt_page(
    keys: &PageKeys,
    index: u32,
    plaintext: &[u8],
    iv: &[u8; IV_SIZE],
) -> ChatlogResult<Vec<u8>> {
    check_page_len(plaintext)?;

    let offset = data_offset(index);
    let mut out = vec![0u8; PAGE_SIZE];
    if index == 0 {
        out[..SALT_SIZE].copy_from_slice(keys.salt());
    }
    out[offset..CIPHERTEXT_END].copy_from_slice(&plaintext[offset..CIPHERTEXT_END]);

    Aes256CbcEnc::new_from_slices(keys.enc_key(), iv)
        .map_err(|e| ChatlogError::Other(anyhow::anyhow!("AES-CBC init: {e}")))?
        .encrypt_padded_mut::<NoPadding>(&mut out[offset..CIPHERTEXT_END], CIPHERTEXT_END - offset)
        .map_err(|e| ChatlogError::Other(anyhow::anyhow!("AES-CBC encrypt page {index}: {e}")))?;

    out[CIPHERTEXT_END..TAG_OFFSET].copy_from_slice(iv);
    let tag = page_mac(keys, index, &out)?.finalize().into_bytes();
    out[TAG_OFFSET..TAG_OFFSET + HMAC_SIZE].copy_from_slice(&tag);
    Ok(out)
}

fn data_offset(index: u32) -> usize {
    if index == 0 {
        SALT_SIZE
    } else {
        0
    }
}

/// HMAC state over `page[offset..TAG_OFFSET] || le_u32(index + 1)`, ready to finalize or verify.
fn page_mac(keys: &PageKeys, index: u32, page: &[u8]) -> ChatlogResult<HmacSha512> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(keys.mac_key())
        .map_err(|e| ChatlogError::Other(anyhow::anyhow!("HMAC-SHA512 key init failed: {e}")))?;
    mac.update(&page[data_offset(index)..TAG_OFFSET]);
    mac.update(&index.wrapping_add(1).to_le_bytes());
    Ok(mac)
}

fn check_page_len(page: &[u8]) -> ChatlogResult<()> {
    if page.len() != PAGE_SIZE {
        return Err(ChatlogError::Other(anyhow::anyhow!(
            "page must be {PAGE_SIZE} bytes, got {}",
            page.len()
        )));
    }
    Ok(())
}
