//! Boundary with the database library that turns encrypted files into
//! flat record streams.

use crate::crypto::DerivedKey;
use crate::record::RecordStream;
use thiserror::Error;

/// Failure codes reported by a database library.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryError {
    #[error("invalid database file format")]
    FileFormatInvalid,
    #[error("wrong password")]
    WrongPassword,
    #[error("database payload could not be decrypted")]
    DecryptionFailed,
}

/// A database library able to decrypt files into record streams.
///
/// Key derivation is split from decryption so that a credential derived at
/// open time can be handed back on reload without the password.
pub trait DatabaseLibrary {
    /// Derive the reusable credential from a user password.
    fn derive_key(&self, password: &str) -> Result<DerivedKey, LibraryError>;

    /// Decrypt a whole file image with a previously derived credential.
    fn decrypt(&self, raw: &[u8], key: &DerivedKey) -> Result<RecordStream, LibraryError>;
}

impl<T: DatabaseLibrary + ?Sized> DatabaseLibrary for Box<T> {
    fn derive_key(&self, password: &str) -> Result<DerivedKey, LibraryError> {
        (**self).derive_key(password)
    }

    fn decrypt(&self, raw: &[u8], key: &DerivedKey) -> Result<RecordStream, LibraryError> {
        (**self).decrypt(raw, key)
    }
}
