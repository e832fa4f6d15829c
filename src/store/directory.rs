//! Named subspaces.
//!
//! The directory layer maps a path of names to a short, allocated key
//! prefix so tenants get compact, disjoint keyspaces. Metadata lives under
//! the node subspace (`0xFE`):
//!
//! ```text
//! node ++ ("path",  seg, ...) → allocated prefix
//! node ++ ("layer", seg, ...) → layer tag
//! node ++ ("counter",)        → last allocated id (tuple int)
//! ```
//!
//! Path segments are packed as byte strings, so two names differing in any
//! byte get distinct directories. Allocated prefixes are tuple-encoded
//! integers in the content subspace, so they never collide with each other
//! or with the node subspace.

use super::tuple::{self, Element};
use super::{Database, StoreError, StoreResult, Subspace, Transaction};
use tracing::debug;

/// Prefix under which directory metadata is kept.
pub const NODE_PREFIX: u8 = 0xFE;

/// Commit attempts before a metadata conflict is surfaced.
const MAX_ATTEMPTS: usize = 5;

/// An opened directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySubspace {
    path: Vec<Vec<u8>>,
    layer: Vec<u8>,
    subspace: Subspace,
}

impl DirectorySubspace {
    /// Path the directory was opened at.
    pub fn path(&self) -> &[Vec<u8>] {
        &self.path
    }

    /// Layer tag recorded at creation.
    pub fn layer(&self) -> &[u8] {
        &self.layer
    }

    /// Key space allocated to the directory.
    pub fn subspace(&self) -> &Subspace {
        &self.subspace
    }

    /// Human readable path, `/`-joined.
    pub fn display_path(&self) -> String {
        display(&self.path)
    }
}

/// Directory layer over a [`Database`].
#[derive(Debug, Clone)]
pub struct DirectoryLayer {
    node: Subspace,
    content: Subspace,
}

impl Default for DirectoryLayer {
    fn default() -> Self {
        Self {
            node: Subspace::from_bytes(vec![NODE_PREFIX]),
            content: Subspace::default(),
        }
    }
}

impl DirectoryLayer {
    /// Directory layer rooted at the default node and content subspaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the directory at `path`, creating it if missing.
    ///
    /// A non-empty `layer` must match the tag recorded at creation; an
    /// empty `layer` opens any directory.
    pub async fn create_or_open<S: AsRef<[u8]>>(
        &self,
        db: &dyn Database,
        path: &[S],
        layer: &[u8],
    ) -> StoreResult<DirectorySubspace> {
        validate_path(path)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut txn = db.create_transaction()?;
            match self.create_or_open_in(txn.as_mut(), path, layer).await {
                Ok(dir) => return Ok(dir),
                Err(StoreError::NotCommitted) if attempt < MAX_ATTEMPTS => {
                    debug!(path = %self::display(path), attempt, "directory metadata conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Whether a directory exists at `path`.
    pub async fn exists<S: AsRef<[u8]>>(&self, db: &dyn Database, path: &[S]) -> StoreResult<bool> {
        validate_path(path)?;
        let mut txn = db.create_transaction()?;
        let key = self.path_key(path);
        Ok(txn.get(&key).await?.is_some())
    }

    async fn create_or_open_in<S: AsRef<[u8]>>(
        &self,
        txn: &mut dyn Transaction,
        path: &[S],
        layer: &[u8],
    ) -> StoreResult<DirectorySubspace> {
        let path_key = self.path_key(path);
        let layer_key = self.node.pack(&tagged("layer", path));

        if let Some(prefix) = txn.get(&path_key).await? {
            let stored = txn.get(&layer_key).await?.unwrap_or_default();
            if !layer.is_empty() && &stored[..] != layer {
                return Err(StoreError::IncompatibleLayer {
                    expected: String::from_utf8_lossy(layer).into_owned(),
                    found: String::from_utf8_lossy(&stored).into_owned(),
                });
            }
            txn.commit().await?;
            return Ok(self.opened(path, stored.to_vec(), prefix.to_vec()));
        }

        let counter_key = self.node.pack(&[Element::from("counter")]);
        let last = match txn.get(&counter_key).await? {
            Some(raw) => tuple::unpack(&raw)?
                .first()
                .and_then(Element::as_int)
                .ok_or_else(|| StoreError::InvalidDirectory {
                    reason: "corrupt prefix counter".to_string(),
                })?,
            None => 0,
        };
        let id = last + 1;
        let prefix = self.content.pack(&[Element::Int(id)]);

        txn.set(&counter_key, &tuple::pack(&[Element::Int(id)]));
        txn.set(&path_key, &prefix);
        txn.set(&layer_key, layer);
        txn.commit().await?;

        debug!(path = %self::display(path), id, "created directory");
        Ok(self.opened(path, layer.to_vec(), prefix))
    }

    fn path_key<S: AsRef<[u8]>>(&self, path: &[S]) -> Vec<u8> {
        self.node.pack(&tagged("path", path))
    }

    fn opened<S: AsRef<[u8]>>(
        &self,
        path: &[S],
        layer: Vec<u8>,
        prefix: Vec<u8>,
    ) -> DirectorySubspace {
        DirectorySubspace {
            path: path.iter().map(|seg| seg.as_ref().to_vec()).collect(),
            layer,
            subspace: Subspace::from_bytes(prefix),
        }
    }
}

fn tagged<S: AsRef<[u8]>>(tag: &str, path: &[S]) -> Vec<Element> {
    let mut elements = Vec::with_capacity(path.len() + 1);
    elements.push(Element::from(tag));
    elements.extend(path.iter().map(|seg| Element::from(seg.as_ref())));
    elements
}

fn display<S: AsRef<[u8]>>(path: &[S]) -> String {
    path.iter()
        .map(|seg| String::from_utf8_lossy(seg.as_ref()).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn validate_path<S: AsRef<[u8]>>(path: &[S]) -> StoreResult<()> {
    if path.is_empty() {
        return Err(StoreError::InvalidDirectory {
            reason: "path is empty".to_string(),
        });
    }
    if path.iter().any(|seg| seg.as_ref().is_empty()) {
        return Err(StoreError::InvalidDirectory {
            reason: "path contains an empty segment".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDatabase;

    #[tokio::test]
    async fn test_create_then_open_returns_same_prefix() {
        let db = MemoryDatabase::new();
        let layer = DirectoryLayer::new();

        let created = layer.create_or_open(&db, &["tenantA"], b"gateway").await.unwrap();
        let opened = layer.create_or_open(&db, &["tenantA"], b"gateway").await.unwrap();

        assert_eq!(created, opened);
        assert_eq!(created.layer(), b"gateway");
        assert_eq!(created.display_path(), "tenantA");
        assert!(layer.exists(&db, &["tenantA"]).await.unwrap());
        assert!(!layer.exists(&db, &["tenantB"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_directories_are_disjoint() {
        let db = MemoryDatabase::new();
        let layer = DirectoryLayer::new();

        let a = layer.create_or_open(&db, &["tenantA"], b"").await.unwrap();
        let b = layer.create_or_open(&db, &["tenantB"], b"").await.unwrap();

        assert_ne!(a.subspace(), b.subspace());
        assert!(!a.subspace().contains(b.subspace().bytes()));
        assert!(!b.subspace().contains(a.subspace().bytes()));
        assert!(!a.subspace().contains(&[NODE_PREFIX]));
    }

    #[tokio::test]
    async fn test_layer_mismatch_is_rejected() {
        let db = MemoryDatabase::new();
        let layer = DirectoryLayer::new();
        layer.create_or_open(&db, &["t"], b"gateway").await.unwrap();

        let err = layer.create_or_open(&db, &["t"], b"other").await.unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleLayer { .. }));

        // An empty layer opens whatever is there.
        let opened = layer.create_or_open(&db, &["t"], b"").await.unwrap();
        assert_eq!(opened.layer(), b"gateway");
    }

    #[tokio::test]
    async fn test_invalid_paths() {
        let db = MemoryDatabase::new();
        let layer = DirectoryLayer::new();

        assert!(matches!(
            layer.create_or_open::<&str>(&db, &[], b"").await,
            Err(StoreError::InvalidDirectory { .. })
        ));
        assert!(matches!(
            layer.create_or_open(&db, &["a", ""], b"").await,
            Err(StoreError::InvalidDirectory { .. })
        ));
    }

    #[tokio::test]
    async fn test_nested_paths_are_independent() {
        let db = MemoryDatabase::new();
        let layer = DirectoryLayer::new();

        let parent = layer.create_or_open(&db, &["a"], b"").await.unwrap();
        let child = layer.create_or_open(&db, &["a", "b"], b"").await.unwrap();
        assert_eq!(child.path(), &[b"a".to_vec(), b"b".to_vec()]);
        assert_ne!(parent.subspace(), child.subspace());
    }

    #[tokio::test]
    async fn test_non_utf8_segments_are_distinct() {
        let db = MemoryDatabase::new();
        let layer = DirectoryLayer::new();

        let a = layer.create_or_open(&db, &[&b"t\xff"[..]], b"").await.unwrap();
        let b = layer.create_or_open(&db, &[&b"t\xfe"[..]], b"").await.unwrap();

        assert_ne!(a.subspace(), b.subspace());
        assert_eq!(a.path(), &[b"t\xff".to_vec()]);
        assert!(!layer.exists(&db, &["t\u{FFFD}"]).await.unwrap());
    }
}
