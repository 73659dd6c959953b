use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const BLOCK_SIZE: usize = 16;
pub const KEY_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid ciphertext length {0}: not a multiple of {} bytes", BLOCK_SIZE)]
    InvalidLength(usize),
    #[error("ciphertext is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Pad or truncate a raw key string to the fixed AES-256 key size.
///
/// Keys shorter than 32 bytes are right-padded with zero bytes, longer
/// keys are cut at 32 bytes.
pub fn derive_key(raw_key: &str) -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    let bytes = raw_key.as_bytes();
    let len = bytes.len().min(KEY_SIZE);
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// AES-256-ECB codec for job payloads, with a cache of derived ciphers
/// keyed by the raw key string.
///
/// Payloads are zero-padded to the block size before encryption and the
/// ciphertext travels base64-encoded. On decryption the trailing run of
/// padding zeros is collapsed into a single space, matching the wire
/// format peers already expect.
pub struct CipherCache {
    ciphers: Mutex<HashMap<String, Arc<Aes256>>>,
}

impl Default for CipherCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CipherCache {
    pub fn new() -> Self {
        CipherCache {
            ciphers: Mutex::new(HashMap::new()),
        }
    }

    /// Look up the cipher for `raw_key`, deriving and caching it on first
    /// use. Derivation is a pure function of the key, so a cache hit and a
    /// fresh derivation are indistinguishable.
    fn cipher_for(&self, raw_key: &str) -> Arc<Aes256> {
        let mut ciphers = self.ciphers.lock().unwrap();
        ciphers
            .entry(raw_key.to_string())
            .or_insert_with(|| {
                log::debug!("deriving cipher for key of {} bytes", raw_key.len());
                let key = derive_key(raw_key);
                Arc::new(Aes256::new(GenericArray::from_slice(&key)))
            })
            .clone()
    }

    /// Encrypt a plaintext payload into its base64 transport form.
    pub fn encrypt(&self, plaintext: &str, raw_key: &str) -> String {
        let cipher = self.cipher_for(raw_key);
        let mut data = plaintext.as_bytes().to_vec();
        // An empty payload still produces one full block of padding so the
        // transport string is never empty.
        let padded_len = match data.len() {
            0 => BLOCK_SIZE,
            n if n % BLOCK_SIZE == 0 => n,
            n => n + BLOCK_SIZE - n % BLOCK_SIZE,
        };
        data.resize(padded_len, 0);
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        general_purpose::STANDARD.encode(&data)
    }

    /// Decrypt a base64 transport string back into payload text.
    ///
    /// Whitespace in the transport string is ignored, so line-wrapped
    /// base64 from older peers decodes the same as unwrapped output.
    pub fn decrypt(&self, transport: &str, raw_key: &str) -> Result<String, CipherError> {
        let compact: String = transport
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let mut data = general_purpose::STANDARD.decode(compact.as_bytes())?;
        if data.len() % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidLength(data.len()));
        }
        let cipher = self.cipher_for(raw_key);
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        let mut text = String::from_utf8_lossy(&data).into_owned();
        let stripped = text.trim_end_matches('\0').len();
        if stripped != text.len() {
            // Collapse the padding run to one space instead of removing it
            // outright; peers depend on this artifact.
            text.truncate(stripped);
            text.push(' ');
        }
        Ok(text)
    }
}
