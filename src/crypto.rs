//! Key derivation and payload sealing using SHA-256, Argon2id and AES-256-GCM.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of every derived key, 256 bits for AES-256.
pub const KEY_LEN: usize = 32;
/// Length of the per-file Argon2 salt.
pub const SALT_LEN: usize = 16;
/// AES-GCM nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

// Upper bounds accepted from a file header.
const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 16;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid salt length")]
    InvalidSaltLength,
    #[error("Invalid nonce length")]
    InvalidNonceLength,
    #[error("Invalid key length")]
    InvalidKeyLength,
    #[error("Invalid key derivation parameters")]
    InvalidParams,
    #[error("Key derivation failed")]
    KeyDerivationFailed,
}

/// Argon2id cost parameters, stored in each database header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Check the parameters are usable and within the accepted bounds.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.memory_kib > MAX_MEMORY_KIB
            || self.iterations == 0
            || self.iterations > MAX_ITERATIONS
            || self.parallelism == 0
            || self.parallelism > MAX_PARALLELISM
        {
            return Err(CryptoError::InvalidParams);
        }
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(self) -> Result<Params, CryptoError> {
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|_| CryptoError::InvalidParams)
    }
}

/// Key material that is zeroed when dropped.
///
/// Used both for the password-derived credential kept by the
/// credential cache and for the per-file payload key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey(Vec<u8>);

impl DerivedKey {
    /// Get a reference to the key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for DerivedKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey({} bytes)", self.0.len())
    }
}

/// Handles all cryptographic operations for database files.
#[derive(Debug, Clone, Default)]
pub struct DatabaseCrypto {
    kdf: KdfParams,
}

impl DatabaseCrypto {
    /// Create a new instance with the default cost parameters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn params(&self) -> KdfParams {
        self.kdf
    }

    /// Generate a new random salt.
    pub fn generate_salt(&self) -> Vec<u8> {
        let mut salt = vec![0u8; SALT_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }

    /// Hash a password into the file-independent credential.
    ///
    /// This is the value kept across reloads: it does not depend on the
    /// salt of any particular file.
    pub fn composite_key(password: &str) -> DerivedKey {
        let digest = Sha256::digest(password.as_bytes());
        DerivedKey(digest.to_vec())
    }

    /// Turn a credential into the payload key for one file using Argon2id.
    pub fn transform_key(
        &self,
        credential: &DerivedKey,
        salt: &[u8],
    ) -> Result<DerivedKey, CryptoError> {
        if salt.len() != SALT_LEN {
            return Err(CryptoError::InvalidSaltLength);
        }

        let params = self.kdf.to_argon2()?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let mut output = vec![0u8; KEY_LEN];
        argon2
            .hash_password_into(credential.as_bytes(), salt, &mut output)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        Ok(DerivedKey(output))
    }

    /// Encrypt a payload with AES-256-GCM.
    /// Returns the tuple (nonce, ciphertext with tag).
    pub fn seal(
        &self,
        plaintext: &[u8],
        key: &DerivedKey,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let cipher = Self::cipher(key)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok((nonce.to_vec(), ciphertext))
    }

    /// Decrypt a payload sealed by [`DatabaseCrypto::seal`].
    pub fn open(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        key: &DerivedKey,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonceLength);
        }
        let cipher = Self::cipher(key)?;

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    fn cipher(key: &DerivedKey) -> Result<Aes256Gcm, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes())))
    }
}
