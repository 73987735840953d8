//! Key derivation: secret + per-file salt → (encryption key, MAC key)

use chatlog_core::{ChatlogError, ChatlogResult};
use hmac::Hmac;
use sha2::Sha512;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// Byte XORed into every salt byte to seed the MAC key derivation.
pub const MAC_SALT_MASK: u8 = 0x3a;

/// The 256-bit archive secret. Zeroized on drop.
#[derive(Clone)]
pub struct Secret {
    bytes: [u8; KEY_SIZE],
}

impl Secret {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse the 64-hex-character form handed over by the key-acquisition tool.
    ///
    /// Anything else is a configuration error; no file has been touched yet.
    pub fn from_hex(hex_str: &str) -> ChatlogResult<Self> {
        let hex_str = hex_str.trim();
        if hex_str.len() != KEY_SIZE * 2 {
            return Err(ChatlogError::Config(format!(
                "secret must be {} hex characters ({} bytes), got {}",
                KEY_SIZE * 2,
                KEY_SIZE,
                hex_str.len()
            )));
        }

        let mut bytes = [0u8; KEY_SIZE];
        hex::decode_to_slice(hex_str, &mut bytes)
            .map_err(|e| ChatlogError::Config(format!("secret is not valid hex: {e}")))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::str::FromStr for Secret {
    type Err = ChatlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 round counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Rounds for the encryption key (default: 256000)
    pub iterations: u32,
    /// Rounds for the MAC key (default: 2)
    pub mac_iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: 256_000,
            mac_iterations: 2,
        }
    }
}

impl From<&chatlog_core::config::DecryptConfig> for KdfParams {
    fn from(config: &chatlog_core::config::DecryptConfig) -> Self {
        Self {
            iterations: config.kdf_iterations,
            mac_iterations: config.mac_iterations,
        }
    }
}

/// Keys for one container file, plus the salt they were derived from.
///
/// Never persisted; zeroized on drop.
#[derive(Clone)]
pub struct PageKeys {
    enc_key: [u8; KEY_SIZE],
    mac_key: [u8; KEY_SIZE],
    salt: [u8; SALT_SIZE],
}

impl PageKeys {
    pub fn from_parts(
        enc_key: [u8; KEY_SIZE],
        mac_key: [u8; KEY_SIZE],
        salt: [u8; SALT_SIZE],
    ) -> Self {
        Self {
            enc_key,
            mac_key,
            salt,
        }
    }

    pub fn enc_key(&self) -> &[u8; KEY_SIZE] {
        &self.enc_key
    }

    pub fn mac_key(&self) -> &[u8; KEY_SIZE] {
        &self.mac_key
    }

    pub fn salt(&self) -> &[u8; SALT_SIZE] {
        &self.salt
    }
}

impl Drop for PageKeys {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for PageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageKeys")
            .field("enc_key", &"[REDACTED]")
            .field("mac_key", &"[REDACTED]")
            .field("salt", &hex::encode(self.salt))
            .finish()
    }
}

/// Derive the page keys for a file with the production round counts.
pub fn derive_keys(secret: &Secret, salt: &[u8; SALT_SIZE]) -> ChatlogResult<PageKeys> {
    derive_keys_with(secret, salt, &KdfParams::default())
}

/// Derive the page keys for a file.
///
/// - `encryption_key = PBKDF2-HMAC-SHA512(secret, salt, params.iterations)`
/// - `mac_key = PBKDF2-HMAC-SHA512(encryption_key, salt ^ 0x3a, params.mac_iterations)`
pub fn derive_keys_with(
    secret: &Secret,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> ChatlogResult<PageKeys> {
    let mut enc_key = [0u8; KEY_SIZE];
    pbkdf2_sha512(secret.as_bytes(), salt, params.iterations, &mut enc_key)?;

    let mut mac_key = [0u8; KEY_SIZE];
    pbkdf2_sha512(&enc_key, &mac_salt(salt), params.mac_iterations, &mut mac_key)?;

    Ok(PageKeys::from_parts(enc_key, mac_key, *salt))
}

fn mac_salt(salt: &[u8; SALT_SIZE]) -> [u8; SALT_SIZE] {
    let mut out = *salt;
    for b in out.iter_mut() {
        *b ^= MAC_SALT_MASK;
    }
    out
}

fn pbkdf2_sha512(password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) -> ChatlogResult<()> {
    if rounds == 0 {
        return Err(ChatlogError::Config("PBKDF2 round count must be non-zero".into()));
    }
    pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, rounds, out)
        .map_err(|e| ChatlogError::Other(anyhow::anyhow!("PBKDF2-HMAC-SHA512 failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fast_params() -> KdfParams {
        KdfParams {
            iterations: 64,
            mac_iterations: 2,
        }
    }

    #[test]
    fn test_known_answer_production_params() {
        let secret = Secret::from_bytes([0x11; KEY_SIZE]);
        let salt: [u8; SALT_SIZE] = std::array::from_fn(|i| i as u8);

        let keys = derive_keys(&secret, &salt).unwrap();

        assert_eq!(
            hex::encode(keys.enc_key()),
            "503c0f949b99beaee496ad789b4547f9a3ee15d3847234d8db5e20321ca588b8"
        );
        assert_eq!(
            hex::encode(keys.mac_key()),
            "5bd51618e0e7c9cbc760a84eada5c780fa45f93e585d2b95853eeaff55e544b1"
        );
        assert_eq!(keys.salt(), &salt);
    }

    #[test]
    fn test_kdf_different_salts() {
        let secret = Secret::from_bytes([7u8; KEY_SIZE]);
        let a = derive_keys_with(&secret, &[1u8; SALT_SIZE], &fast_params()).unwrap();
        let b = derive_keys_with(&secret, &[2u8; SALT_SIZE], &fast_params()).unwrap();

        assert_ne!(a.enc_key(), b.enc_key(), "different salts must produce different keys");
        assert_ne!(a.mac_key(), b.mac_key());
    }

    #[test]
    fn test_mac_key_differs_from_enc_key() {
        let secret = Secret::from_bytes([9u8; KEY_SIZE]);
        let keys = derive_keys_with(&secret, &[3u8; SALT_SIZE], &fast_params()).unwrap();
        assert_ne!(keys.enc_key(), keys.mac_key());
    }

    #[test]
    fn test_mac_salt_mask() {
        let salt = [0x00, 0x3a, 0xff, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let masked = mac_salt(&salt);
        assert_eq!(&masked[..4], &[0x3a, 0x00, 0xc5, 0x2a]);
        assert!(masked[4..].iter().all(|&b| b == MAC_SALT_MASK));
    }

    #[test]
    fn test_zero_rounds_rejected() {
        let secret = Secret::from_bytes([1u8; KEY_SIZE]);
        let params = KdfParams {
            iterations: 0,
            mac_iterations: 2,
        };
        assert!(matches!(
            derive_keys_with(&secret, &[0u8; SALT_SIZE], &params),
            Err(ChatlogError::Config(_))
        ));
    }

    #[test]
    fn test_secret_from_hex() {
        let hex_str = "00112233445566778899aabbccddeeff00112233445566778899AABBCCDDEEFF";
        let secret: Secret = hex_str.parse().unwrap();
        assert_eq!(secret.as_bytes()[1], 0x11);
        assert_eq!(secret.as_bytes()[31], 0xff);
    }

    #[test]
    fn test_secret_wrong_length() {
        let err = Secret::from_hex("abcd").unwrap_err();
        assert!(matches!(err, ChatlogError::Config(_)));
        let err = Secret::from_hex(&"a".repeat(66)).unwrap_err();
        assert!(matches!(err, ChatlogError::Config(_)));
    }

    #[test]
    fn test_secret_not_hex() {
        let err = Secret::from_hex(&"zz".repeat(32)).unwrap_err();
        assert!(matches!(err, ChatlogError::Config(_)));
    }

    #[test]
    fn test_debug_redacts() {
        let secret = Secret::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{secret:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("ab"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn derive_keys_is_deterministic(
            secret in any::<[u8; KEY_SIZE]>(),
            salt in any::<[u8; SALT_SIZE]>(),
        ) {
            let secret = Secret::from_bytes(secret);
            let a = derive_keys_with(&secret, &salt, &fast_params()).unwrap();
            let b = derive_keys_with(&secret, &salt, &fast_params()).unwrap();
            prop_assert_eq!(a.enc_key(), b.enc_key());
            prop_assert_eq!(a.mac_key(), b.mac_key());
        }
    }
}
