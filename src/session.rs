//! Session lifecycle for opened databases: open, reload, close.
//!
//! Every operation is all-or-nothing. Files are read, decrypted and rebuilt
//! into a validated forest before the container or the credential cache is
//! touched, so a failure leaves every existing session exactly as it was.

use crate::credential::CredentialCache;
use crate::crypto::DerivedKey;
use crate::error::{IoStage, PassTreeError, Result};
use crate::library::DatabaseLibrary;
use crate::reconstruct::{self, Corruption, Forest};
use crate::sealed::SealedLibrary;
use crate::tree::{NodeId, TreeContainer};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Identifier of an open session. Never reused by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    path: PathBuf,
    root: NodeId,
}

/// Result of a successful open.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    /// Root node of the new database tree
    pub root: NodeId,
    /// Entries left out because they reference an unknown group
    pub dropped: Vec<Corruption>,
}

/// Result of a successful reload.
#[derive(Debug, Default)]
pub struct ReloadReport {
    pub groups: usize,
    pub entries: usize,
    pub dropped: Vec<Corruption>,
}

impl ReloadReport {
    fn from_forest(forest: &Forest) -> Self {
        Self {
            groups: forest.group_count(),
            entries: forest.entry_count(),
            dropped: forest.dropped().to_vec(),
        }
    }
}

/// Owns the open databases: their trees, sessions and cached credentials.
///
/// Not thread-safe by itself; hosts calling it from several threads must
/// wrap the whole manager in their own lock.
#[derive(Debug)]
pub struct SessionManager<L = SealedLibrary> {
    library: L,
    container: TreeContainer,
    credentials: CredentialCache,
    sessions: Vec<Session>,
    next_id: u64,
}

impl Default for SessionManager<SealedLibrary> {
    fn default() -> Self {
        Self::new(SealedLibrary::new())
    }
}

impl<L: DatabaseLibrary> SessionManager<L> {
    /// Create a manager using the given database library.
    pub fn new(library: L) -> Self {
        Self {
            library,
            container: TreeContainer::new(),
            credentials: CredentialCache::new(),
            sessions: Vec::new(),
            next_id: 1,
        }
    }

    pub fn library(&self) -> &L {
        &self.library
    }

    /// Read-only view of every open database tree.
    pub fn container(&self) -> &TreeContainer {
        &self.container
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    /// Open a database file and attach its tree as a new root.
    pub fn open(&mut self, path: impl AsRef<Path>, password: &str) -> Result<SessionHandle> {
        let path = std::path::absolute(path.as_ref())
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let key = self
            .library
            .derive_key(password)
            .map_err(|reason| PassTreeError::DecryptionFailed {
                path: path.clone(),
                reason,
            })?;
        let forest = self.load(&path, &key)?;
        let dropped = forest.dropped().to_vec();

        let id = SessionId(self.next_id);
        self.next_id += 1;

        let root = self.container.insert_root(id, path.clone(), forest);
        self.credentials.store(id, key);
        self.sessions.push(Session {
            id,
            path: path.clone(),
            root,
        });

        tracing::info!(
            session = %id,
            path = %path.display(),
            dropped = dropped.len(),
            "database opened"
        );
        Ok(SessionHandle { id, root, dropped })
    }

    /// Re-read the session's file with its cached credential.
    ///
    /// The root handle is kept; everything below it is replaced. On error
    /// nothing changes.
    pub fn reload(&mut self, id: SessionId) -> Result<ReloadReport> {
        let session = self.session(id).ok_or(PassTreeError::SessionNotFound(id))?;
        let (path, root) = (session.path.clone(), session.root);
        let key = self
            .credentials
            .fetch(id)
            .ok_or(PassTreeError::CredentialMissing(id))?;

        let forest = self.load(&path, key)?;
        let report = ReloadReport::from_forest(&forest);
        self.container.replace_subtree(root, forest);

        tracing::info!(session = %id, groups = report.groups, entries = report.entries, "database reloaded");
        Ok(report)
    }

    /// Reload with a newly supplied password.
    ///
    /// The cached credential is replaced only if the reload succeeds.
    pub fn reload_with_password(&mut self, id: SessionId, password: &str) -> Result<ReloadReport> {
        let session = self.session(id).ok_or(PassTreeError::SessionNotFound(id))?;
        let (path, root) = (session.path.clone(), session.root);

        let key = self
            .library
            .derive_key(password)
            .map_err(|reason| PassTreeError::DecryptionFailed {
                path: path.clone(),
                reason,
            })?;
        let forest = self.load(&path, &key)?;
        let report = ReloadReport::from_forest(&forest);
        self.container.replace_subtree(root, forest);
        self.credentials.store(id, key);

        tracing::info!(session = %id, "database reloaded with new credential");
        Ok(report)
    }

    /// Close a session and release its tree and credential.
    ///
    /// Closing an unknown or already closed session does nothing.
    pub fn close(&mut self, id: SessionId) {
        let Some(position) = self.sessions.iter().position(|s| s.id == id) else {
            tracing::debug!(session = %id, "close on unknown session ignored");
            return;
        };

        let session = self.sessions.remove(position);
        self.container.remove_root(session.root);
        self.credentials.remove(id);
        tracing::info!(session = %id, path = %session.path.display(), "database closed");
    }

    /// Close every open session.
    pub fn close_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.iter().map(|s| s.id).collect();
        for id in ids {
            self.close(id);
        }
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.session(id).is_some()
    }

    /// Open sessions in open order.
    pub fn sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.sessions.iter().map(|s| s.id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn file_path(&self, id: SessionId) -> Option<&Path> {
        self.session(id).map(|s| s.path.as_path())
    }

    pub fn root_of(&self, id: SessionId) -> Option<NodeId> {
        self.session(id).map(|s| s.root)
    }

    /// The session owning any node of its tree.
    pub fn session_for_node(&self, node: NodeId) -> Option<SessionId> {
        let root = self.container.owning_root(node)?;
        self.container.get(root)?.as_root().map(|r| r.session)
    }

    fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    fn load(&self, path: &Path, key: &DerivedKey) -> Result<Forest> {
        let raw = read_database(path)?;
        let stream = self.library.decrypt(&raw, key).map_err(|reason| {
            tracing::warn!(path = %path.display(), %reason, "database could not be decrypted");
            PassTreeError::DecryptionFailed {
                path: path.to_path_buf(),
                reason,
            }
        })?;
        Ok(reconstruct::build(stream)?)
    }
}

/// Read a whole database file into memory.
fn read_database(path: &Path) -> Result<Vec<u8>> {
    let unreadable = |stage, source| PassTreeError::FileUnreadable {
        path: path.to_path_buf(),
        stage,
        source,
    };

    let mut file = File::open(path).map_err(|e| unreadable(IoStage::Open, e))?;
    let len = file
        .metadata()
        .map_err(|e| unreadable(IoStage::Stat, e))?
        .len();

    let mut raw = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
    file.read_to_end(&mut raw)
        .map_err(|e| unreadable(IoStage::Read, e))?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::LibraryError;
    use crate::record::{EntryRecord, GroupRecord, RecordStream};
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    /// Plain JSON "database": the password is stored next to the records.
    struct StubLibrary;

    #[derive(Serialize, Deserialize)]
    struct StubFile {
        password: String,
        stream: RecordStream,
    }

    impl DatabaseLibrary for StubLibrary {
        fn derive_key(&self, password: &str) -> std::result::Result<DerivedKey, LibraryError> {
            Ok(DerivedKey::from(password.as_bytes().to_vec()))
        }

        fn decrypt(
            &self,
            raw: &[u8],
            key: &DerivedKey,
        ) -> std::result::Result<RecordStream, LibraryError> {
            let file: StubFile =
                serde_json::from_slice(raw).map_err(|_| LibraryError::FileFormatInvalid)?;
            if file.password.as_bytes() != key.as_bytes() {
                return Err(LibraryError::WrongPassword);
            }
            Ok(file.stream)
        }
    }

    fn write_stub(path: &Path, password: &str, stream: RecordStream) {
        let file = StubFile {
            password: password.to_string(),
            stream,
        };
        std::fs::write(path, serde_json::to_vec(&file).unwrap()).unwrap();
    }

    fn example() -> RecordStream {
        RecordStream::new(
            vec![
                GroupRecord::new(1, 0, "Internet"),
                GroupRecord::new(2, 1, "Banking"),
                GroupRecord::new(3, 0, "Email"),
            ],
            vec![
                EntryRecord::new(2, "Bank A").with_password("pw-a"),
                EntryRecord::new(99, "Orphan"),
            ],
        )
    }

    fn setup() -> (TempDir, PathBuf, SessionManager<StubLibrary>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("personal.ptdb");
        write_stub(&path, "pw", example());
        (dir, path, SessionManager::new(StubLibrary))
    }

    fn snapshot(manager: &SessionManager<StubLibrary>) -> Vec<(String, NodeId, String)> {
        let container = manager.container();
        container
            .walk_all()
            .map(|(path, id)| {
                (
                    path.to_string(),
                    id,
                    container.get(id).unwrap().display_name().to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_open_builds_tree_and_caches_credential() {
        let (_dir, path, mut manager) = setup();
        let handle = manager.open(&path, "pw").unwrap();

        assert!(manager.is_open(handle.id));
        assert_eq!(manager.container().roots(), &[handle.root]);
        assert!(manager.credentials().contains(handle.id));
        assert_eq!(manager.file_path(handle.id), Some(path.as_path()));
        assert_eq!(
            handle.dropped,
            vec![Corruption::OrphanEntry {
                title: "Orphan".to_string(),
                group_id: 99
            }]
        );

        let names: Vec<String> = snapshot(&manager).into_iter().map(|(_, _, n)| n).collect();
        assert_eq!(names, ["personal.ptdb", "Email", "Internet", "Banking", "Bank A"]);
    }

    #[test]
    fn test_open_missing_file() {
        let (dir, _path, mut manager) = setup();
        let err = manager.open(dir.path().join("missing.ptdb"), "pw").unwrap_err();

        assert!(matches!(
            err,
            PassTreeError::FileUnreadable {
                stage: IoStage::Open,
                ..
            }
        ));
        assert!(manager.is_empty());
        assert!(manager.credentials().is_empty());
    }

    #[test]
    fn test_open_wrong_password() {
        let (_dir, path, mut manager) = setup();
        let err = manager.open(&path, "nope").unwrap_err();

        assert!(matches!(
            err,
            PassTreeError::DecryptionFailed {
                reason: LibraryError::WrongPassword,
                ..
            }
        ));
        assert!(err.is_decryption_failure());
        assert!(manager.container().is_empty());
    }

    #[test]
    fn test_open_depth_gap_fails_outright() {
        let (dir, _path, mut manager) = setup();
        let broken = dir.path().join("broken.ptdb");
        write_stub(
            &broken,
            "pw",
            RecordStream::new(
                vec![GroupRecord::new(1, 0, "a"), GroupRecord::new(2, 3, "b")],
                vec![],
            ),
        );

        let err = manager.open(&broken, "pw").unwrap_err();
        assert!(matches!(
            err,
            PassTreeError::StructuralCorruption(Corruption::DepthGap { group_id: 2, .. })
        ));
        assert_eq!(manager.container().node_count(), 0);
    }

    #[test]
    fn test_reload_picks_up_changes_with_cached_credential() {
        let (_dir, path, mut manager) = setup();
        let handle = manager.open(&path, "pw").unwrap();
        let key_before = manager.credentials().fetch(handle.id).unwrap().as_bytes().to_vec();

        // Group 2 and its entry are gone.
        write_stub(
            &path,
            "pw",
            RecordStream::new(
                vec![GroupRecord::new(1, 0, "Internet"), GroupRecord::new(3, 0, "Email")],
                vec![],
            ),
        );
        let report = manager.reload(handle.id).unwrap();

        assert_eq!(report.groups, 2);
        assert_eq!(report.entries, 0);
        assert_eq!(manager.root_of(handle.id), Some(handle.root));
        let names: Vec<String> = snapshot(&manager).into_iter().map(|(_, _, n)| n).collect();
        assert_eq!(names, ["personal.ptdb", "Email", "Internet"]);
        assert_eq!(
            manager.credentials().fetch(handle.id).unwrap().as_bytes(),
            key_before.as_slice()
        );
    }

    #[test]
    fn test_failed_reload_keeps_tree_identical() {
        let (_dir, path, mut manager) = setup();
        let handle = manager.open(&path, "pw").unwrap();
        let before = snapshot(&manager);

        // Password changed on disk: cached credential no longer fits.
        write_stub(&path, "changed", example());
        assert!(manager.reload(handle.id).unwrap_err().is_decryption_failure());
        assert_eq!(snapshot(&manager), before);

        // Corrupted structure.
        write_stub(
            &path,
            "pw",
            RecordStream::new(vec![GroupRecord::new(1, 2, "deep")], vec![]),
        );
        assert!(matches!(
            manager.reload(handle.id).unwrap_err(),
            PassTreeError::StructuralCorruption(_)
        ));
        assert_eq!(snapshot(&manager), before);

        // File removed.
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            manager.reload(handle.id).unwrap_err(),
            PassTreeError::FileUnreadable { .. }
        ));
        assert_eq!(snapshot(&manager), before);
        assert!(manager.credentials().contains(handle.id));
    }

    #[test]
    fn test_reload_with_password_replaces_credential() {
        let (_dir, path, mut manager) = setup();
        let handle = manager.open(&path, "pw").unwrap();

        write_stub(&path, "changed", example());
        assert!(manager.reload_with_password(handle.id, "wrong").is_err());
        assert_eq!(manager.credentials().fetch(handle.id).unwrap().as_bytes(), b"pw");

        manager.reload_with_password(handle.id, "changed").unwrap();
        assert_eq!(
            manager.credentials().fetch(handle.id).unwrap().as_bytes(),
            b"changed"
        );
        assert!(manager.reload(handle.id).is_ok());
    }

    #[test]
    fn test_reload_unknown_session() {
        let (_dir, _path, mut manager) = setup();
        let err = manager.reload(SessionId::new(42)).unwrap_err();
        assert!(matches!(err, PassTreeError::SessionNotFound(id) if id.get() == 42));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (_dir, path, mut manager) = setup();
        let first = manager.open(&path, "pw").unwrap();
        let second = manager.open(&path, "pw").unwrap();

        manager.close(first.id);
        let after_once = snapshot(&manager);
        manager.close(first.id);
        assert_eq!(snapshot(&manager), after_once);

        assert!(!manager.is_open(first.id));
        assert!(!manager.credentials().contains(first.id));
        assert!(manager.container().get(first.root).is_none());
        assert_eq!(manager.sessions().collect::<Vec<_>>(), vec![second.id]);

        // Closed sessions cannot be reloaded.
        assert!(matches!(
            manager.reload(first.id).unwrap_err(),
            PassTreeError::SessionNotFound(_)
        ));
    }

    #[test]
    fn test_session_ids_are_not_reused() {
        let (_dir, path, mut manager) = setup();
        let first = manager.open(&path, "pw").unwrap();
        manager.close(first.id);
        let second = manager.open(&path, "pw").unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_session_for_node_and_close_all() {
        let (dir, path, mut manager) = setup();
        let other = dir.path().join("work.ptdb");
        write_stub(&other, "pw2", example());

        let a = manager.open(&path, "pw").unwrap();
        let b = manager.open(&other, "pw2").unwrap();
        let container = manager.container();
        let bank = container
            .resolve(b.root, &["Internet", "Banking", "Bank A"])
            .unwrap();
        assert_eq!(manager.session_for_node(bank), Some(b.id));
        assert_eq!(manager.session_for_node(a.root), Some(a.id));

        manager.close_all();
        assert!(manager.is_empty());
        assert!(manager.credentials().is_empty());
        assert_eq!(manager.container().node_count(), 0);
    }
}
