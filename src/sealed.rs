//! The bundled database format: a JSON envelope around an AES-256-GCM
//! sealed record stream.
//!
//! ```json
//! { "format": "passtree-sealed", "version": 1,
//!   "kdf": { "memory_kib": 65536, "iterations": 2, "parallelism": 1 },
//!   "salt": "...", "nonce": "...", "payload": "..." }
//! ```
//!
//! Binary fields are standard base64. The credential is the SHA-256 of the
//! password; the payload key is Argon2id over that credential with the
//! header's salt and cost parameters.

use crate::crypto::{CryptoError, DatabaseCrypto, DerivedKey, KdfParams, NONCE_LEN, SALT_LEN};
use crate::error::Result;
use crate::library::{DatabaseLibrary, LibraryError};
use crate::record::RecordStream;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

pub const FORMAT_NAME: &str = "passtree-sealed";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    kdf: KdfParams,
    salt: String,
    nonce: String,
    payload: String,
}

/// Reads and writes sealed database files.
///
/// The cost parameters only apply when sealing; opening always uses the
/// parameters stored in the file header.
#[derive(Debug, Clone, Default)]
pub struct SealedLibrary {
    crypto: DatabaseCrypto,
}

impl SealedLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use specific cost parameters for newly sealed files.
    pub fn with_params(kdf: KdfParams) -> Self {
        Self {
            crypto: DatabaseCrypto::with_params(kdf),
        }
    }

    /// Seal a record stream into a new file image.
    pub fn seal(
        &self,
        stream: &RecordStream,
        password: &str,
    ) -> std::result::Result<Vec<u8>, CryptoError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(stream).map_err(|_| CryptoError::EncryptionFailed)?,
        );

        let credential = DatabaseCrypto::composite_key(password);
        let salt = self.crypto.generate_salt();
        let key = self.crypto.transform_key(&credential, &salt)?;
        let (nonce, ciphertext) = self.crypto.seal(&plaintext, &key)?;

        let envelope = Envelope {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            kdf: self.crypto.params(),
            salt: STANDARD.encode(&salt),
            nonce: STANDARD.encode(&nonce),
            payload: STANDARD.encode(&ciphertext),
        };

        serde_json::to_vec_pretty(&envelope).map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Seal a record stream and write it to `path`.
    pub fn write(&self, path: &Path, stream: &RecordStream, password: &str) -> Result<()> {
        let image = self.seal(stream, password)?;
        fs::write(path, image)?;

        // Set secure permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms)?;
        }

        tracing::debug!(path = %path.display(), "sealed database written");
        Ok(())
    }

    fn parse_envelope(raw: &[u8]) -> std::result::Result<Envelope, LibraryError> {
        let envelope: Envelope =
            serde_json::from_slice(raw).map_err(|_| LibraryError::FileFormatInvalid)?;

        if envelope.format != FORMAT_NAME || envelope.version != FORMAT_VERSION {
            return Err(LibraryError::FileFormatInvalid);
        }
        envelope
            .kdf
            .validate()
            .map_err(|_| LibraryError::FileFormatInvalid)?;

        Ok(envelope)
    }
}

fn decode_field(value: &str) -> std::result::Result<Vec<u8>, LibraryError> {
    STANDARD
        .decode(value)
        .map_err(|_| LibraryError::FileFormatInvalid)
}

impl DatabaseLibrary for SealedLibrary {
    fn derive_key(&self, password: &str) -> std::result::Result<DerivedKey, LibraryError> {
        Ok(DatabaseCrypto::composite_key(password))
    }

    fn decrypt(
        &self,
        raw: &[u8],
        key: &DerivedKey,
    ) -> std::result::Result<RecordStream, LibraryError> {
        let envelope = Self::parse_envelope(raw)?;

        let salt = decode_field(&envelope.salt)?;
        let nonce = decode_field(&envelope.nonce)?;
        let ciphertext = decode_field(&envelope.payload)?;
        if salt.len() != SALT_LEN || nonce.len() != NONCE_LEN {
            return Err(LibraryError::FileFormatInvalid);
        }

        let crypto = DatabaseCrypto::with_params(envelope.kdf);
        let payload_key = crypto
            .transform_key(key, &salt)
            .map_err(|_| LibraryError::DecryptionFailed)?;

        let plaintext = crypto
            .open(&nonce, &ciphertext, &payload_key)
            .map_err(|_| LibraryError::WrongPassword)?;

        serde_json::from_slice(&plaintext).map_err(|_| LibraryError::DecryptionFailed)
    }
}
