//! passtree: a read-only browser for encrypted password databases.
//!
//! Databases are decrypted into a flat stream of depth-tagged group records
//! and entry records, rebuilt into a tree, and kept in one
//! [`TreeContainer`] next to every other open database. A
//! [`SessionManager`] owns that container and remembers the derived key of
//! each open file so it can be reloaded without asking again.

pub mod cli;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod library;
pub mod logging;
pub mod order;
pub mod reconstruct;
pub mod record;
pub mod sealed;
pub mod secret;
pub mod security;
pub mod session;
pub mod tree;
pub mod utils;

// Re-export commonly used types
pub use crypto::{DerivedKey, KdfParams};
pub use error::{PassTreeError, Result};
pub use library::{DatabaseLibrary, LibraryError};
pub use reconstruct::Corruption;
pub use record::{EntryRecord, GroupRecord, RecordStream};
pub use sealed::SealedLibrary;
pub use secret::SecretString;
pub use session::{ReloadReport, SessionHandle, SessionId, SessionManager};
pub use tree::{Node, NodeId, NodeKind, TreeContainer, TreePath};
