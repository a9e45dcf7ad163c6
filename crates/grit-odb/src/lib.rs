//! Unified object database.
//!
//! Reads consult loose storage first, then every pack ordered by descending
//! mtime; writes always land loose. Parsed objects are kept in a bounded
//! LRU cache keyed by OID, which the commit walker leans on heavily.

pub mod recv;

use std::cell::RefCell;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use grit_hash::ObjectId;
use grit_loose::LooseStore;
use grit_object::{Commit, Object, ObjectType, Tree};
use grit_pack::pack::PackFile;
use lru::LruCache;

#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("object {oid} is a {actual}, expected {expected}")]
    TypeMismatch {
        oid: ObjectId,
        actual: ObjectType,
        expected: ObjectType,
    },

    #[error(transparent)]
    Loose(#[from] grit_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] grit_pack::PackError),

    #[error(transparent)]
    Object(#[from] grit_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// `(type, size)` without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub ty: ObjectType,
    pub size: u64,
}

/// `(type, payload)` as stored.
#[derive(Debug, Clone)]
pub struct RawObject {
    pub ty: ObjectType,
    pub data: Vec<u8>,
}

const CACHE_SIZE: usize = 4096;

pub struct Database {
    objects_dir: PathBuf,
    loose: LooseStore,
    packs: RefCell<Vec<PackFile>>,
    cache: RefCell<LruCache<ObjectId, Object>>,
}

impl Database {
    pub fn new(objects_dir: impl AsRef<Path>) -> Self {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let db = Self {
            loose: LooseStore::new(&objects_dir),
            packs: RefCell::new(Vec::new()),
            cache: RefCell::new(LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap())),
            objects_dir,
        };
        db.reload_packs();
        db
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    /// Set the zlib level used for loose writes (`core.compression`).
    pub fn set_compression(&mut self, level: u32) {
        self.loose.set_compression(level);
    }

    /// Re-scan the pack directory, newest packs first.
    pub fn reload_packs(&self) {
        let mut packs = Vec::new();
        if let Ok(entries) = fs::read_dir(self.pack_dir()) {
            let mut paths: Vec<(std::time::SystemTime, PathBuf)> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "pack"))
                .filter_map(|p| {
                    let mtime = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
                    Some((mtime, p))
                })
                .collect();
            paths.sort_by(|a, b| b.0.cmp(&a.0));

            for (_, path) in paths {
                if let Ok(pack) = PackFile::open(&path) {
                    packs.push(pack);
                }
            }
        }
        *self.packs.borrow_mut() = packs;
    }

    pub fn has(&self, oid: &ObjectId) -> bool {
        if self.loose.contains(oid) {
            return true;
        }
        self.packs.borrow().iter().any(|pack| pack.has(oid))
    }

    /// Cheap `(type, size)` lookup across backends.
    pub fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        if let Some((ty, size)) = self.loose.load_info(oid)? {
            return Ok(Some(ObjectInfo {
                ty,
                size: size as u64,
            }));
        }
        for pack in self.packs.borrow().iter() {
            if let Some((ty, size)) = pack.load_info(oid)? {
                return Ok(Some(ObjectInfo { ty, size }));
            }
        }
        Ok(None)
    }

    /// Full payload lookup across backends, reconstructing deltas.
    pub fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        if let Some((ty, data)) = self.loose.load_raw(oid)? {
            return Ok(Some(RawObject { ty, data }));
        }
        for pack in self.packs.borrow().iter() {
            if let Some((ty, data)) = pack.load_raw(oid)? {
                return Ok(Some(RawObject { ty, data }));
            }
        }
        Ok(None)
    }

    /// Load and parse, through the object cache.
    pub fn load(&self, oid: &ObjectId) -> Result<Object, OdbError> {
        if let Some(object) = self.cache.borrow_mut().get(oid) {
            return Ok(object.clone());
        }

        let raw = self.load_raw(oid)?.ok_or(OdbError::NotFound(*oid))?;
        let object = Object::parse(raw.ty, &raw.data)?;
        self.cache.borrow_mut().put(*oid, object.clone());
        Ok(object)
    }

    pub fn load_commit(&self, oid: &ObjectId) -> Result<Commit, OdbError> {
        match self.load(oid)? {
            Object::Commit(commit) => Ok(commit),
            other => Err(OdbError::TypeMismatch {
                oid: *oid,
                actual: other.object_type(),
                expected: ObjectType::Commit,
            }),
        }
    }

    pub fn load_tree(&self, oid: &ObjectId) -> Result<Tree, OdbError> {
        match self.load(oid)? {
            Object::Tree(tree) => Ok(tree),
            other => Err(OdbError::TypeMismatch {
                oid: *oid,
                actual: other.object_type(),
                expected: ObjectType::Tree,
            }),
        }
    }

    /// Store an object; a duplicate store is a no-op.
    pub fn store(&self, object: &Object) -> Result<ObjectId, OdbError> {
        self.store_raw(object.object_type(), &object.serialize_content())
    }

    pub fn store_raw(&self, ty: ObjectType, payload: &[u8]) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(ty, payload)?)
    }

    /// All known OIDs matching a hex prefix, collapsed across backends.
    pub fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        let mut out: Vec<ObjectId> = self.loose.prefix_match(prefix)?;
        for pack in self.packs.borrow().iter() {
            out.extend(pack.prefix_match(prefix));
        }
        out.sort();
        out.dedup();
        Ok(out)
    }

    pub fn short_oid(&self, oid: &ObjectId) -> String {
        oid.short()
    }
}

impl grit_pack::ObjectSource for Database {
    fn info(&self, oid: &ObjectId) -> Result<(ObjectType, u64), grit_pack::PackError> {
        match self.load_info(oid) {
            Ok(Some(info)) => Ok((info.ty, info.size)),
            Ok(None) => Err(grit_pack::PackError::ObjectMissing(*oid)),
            Err(e) => Err(grit_pack::PackError::Io(std::io::Error::other(
                e.to_string(),
            ))),
        }
    }

    fn payload(&self, oid: &ObjectId) -> Result<Vec<u8>, grit_pack::PackError> {
        match self.load_raw(oid) {
            Ok(Some(raw)) => Ok(raw.data),
            Ok(None) => Err(grit_pack::PackError::ObjectMissing(*oid)),
            Err(e) => Err(grit_pack::PackError::Io(std::io::Error::other(
                e.to_string(),
            ))),
        }
    }
}
