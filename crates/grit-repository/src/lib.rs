//! The repository aggregate.
//!
//! A [`Repository`] owns the object database, the index, the refs, the
//! working tree, and the configuration; operations receive it explicitly
//! rather than through any process-wide state.

pub mod init;
pub mod inspector;
pub mod migration;
pub mod pending;
pub mod refspec;
pub mod remotes;
pub mod status;
pub mod workspace;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString};
use grit_config::ConfigStack;
use grit_diff::tree::{tree_diff, PathFilter, TreeDiffChanges};
use grit_hash::ObjectId;
use grit_index::Index;
use grit_object::{Object, TreeEntry};
use grit_odb::Database;
use grit_ref::Refs;
use grit_utils::path as repo_path;

pub use inspector::{ChangeType, Inspector};
pub use migration::{Migration, MigrationError};
pub use pending::{PendingCommit, PendingType};
pub use remotes::Remotes;
pub use status::Status;
pub use workspace::{Workspace, WorkspaceError};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Odb(#[from] grit_odb::OdbError),

    #[error(transparent)]
    Index(#[from] grit_index::IndexError),

    #[error(transparent)]
    Ref(#[from] grit_ref::RefError),

    #[error(transparent)]
    Config(#[from] grit_config::ConfigError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("{0}")]
    PendingCommit(String),

    #[error("{0}")]
    InvalidRemote(String),

    #[error(transparent)]
    Util(#[from] grit_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Repository {
    git_path: PathBuf,
    pub database: Database,
    pub index: Index,
    pub refs: Refs,
    pub workspace: Workspace,
    pub config: ConfigStack,
}

impl Repository {
    /// Open the repository whose `.git` directory is `git_path`.
    pub fn new(git_path: impl AsRef<Path>) -> Self {
        let git_path = git_path.as_ref().to_path_buf();
        let workspace_root = git_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut database = Database::new(git_path.join("objects"));
        let config = ConfigStack::new(&git_path);
        if let Some(level) = config
            .get_int(&["pack", "compression"])
            .or_else(|| config.get_int(&["core", "compression"]))
        {
            if (0..=9).contains(&level) {
                database.set_compression(level as u32);
            }
        }

        Self {
            database,
            index: Index::new(git_path.join("index")),
            refs: Refs::new(&git_path),
            workspace: Workspace::new(workspace_root),
            config,
            git_path,
        }
    }

    pub fn git_path(&self) -> &Path {
        &self.git_path
    }

    pub fn pending_commit(&self) -> PendingCommit {
        PendingCommit::new(&self.git_path)
    }

    pub fn remotes(&self) -> Remotes<'_> {
        Remotes::new(&self.config)
    }

    pub fn status(&mut self, commit_oid: Option<ObjectId>) -> Result<Status, RepoError> {
        Status::gather(self, commit_oid)
    }

    pub fn migration(&mut self, diff: TreeDiffChanges) -> Migration<'_> {
        Migration::new(self, diff)
    }

    /// Diff two commits or trees, `None` meaning the empty tree.
    pub fn tree_diff(
        &self,
        a: Option<ObjectId>,
        b: Option<ObjectId>,
        filter: &PathFilter,
    ) -> Result<TreeDiffChanges, RepoError> {
        Ok(tree_diff(&self.database, a, b, filter)?)
    }

    /// Snapshot the index as tree objects, bottom-up. Returns the root
    /// tree's OID.
    pub fn write_index_tree(&mut self) -> Result<ObjectId, RepoError> {
        let mut builder = grit_object::tree::TreeBuilder::new();
        for entry in self.index.entries() {
            builder.insert(entry.path.as_ref(), entry.as_tree_entry());
        }

        let database = &self.database;
        builder.write(&mut |tree| database.store(&Object::Tree(tree.clone())))
            .map_err(RepoError::from)
    }

    /// The tree entry a commit holds at `path`, or its root tree for `None`.
    pub fn load_tree_entry(
        &self,
        oid: Option<ObjectId>,
        path: Option<&BStr>,
    ) -> Result<Option<TreeEntry>, RepoError> {
        let Some(oid) = oid else { return Ok(None) };
        let commit = self.database.load_commit(&oid)?;
        let mut entry = Some(TreeEntry::tree(commit.tree));

        let Some(path) = path else { return Ok(entry) };
        for name in repo_path::components(path) {
            let Some(current) = entry else { break };
            if !current.is_tree() {
                entry = None;
                break;
            }
            let tree = self.database.load_tree(&current.oid)?;
            entry = tree.entries.get(&BString::from(name)).copied();
        }
        Ok(entry)
    }

    /// Flatten a commit's tree into `path → entry` for every blob.
    pub fn load_tree_list(
        &self,
        oid: Option<ObjectId>,
    ) -> Result<HashMap<BString, TreeEntry>, RepoError> {
        let mut list = HashMap::new();
        if let Some(entry) = self.load_tree_entry(oid, None)? {
            self.build_tree_list(&mut list, entry, BStr::new(b""))?;
        }
        Ok(list)
    }

    fn build_tree_list(
        &self,
        list: &mut HashMap<BString, TreeEntry>,
        entry: TreeEntry,
        prefix: &BStr,
    ) -> Result<(), RepoError> {
        if !entry.is_tree() {
            list.insert(BString::from(prefix), entry);
            return Ok(());
        }

        let tree = self.database.load_tree(&entry.oid)?;
        for (name, item) in &tree.entries {
            let path = repo_path::join(prefix, name.as_ref());
            self.build_tree_list(list, *item, path.as_ref())?;
        }
        Ok(())
    }

    /// Make workspace and index match `tree(oid)` exactly, dropping local
    /// changes to every path that differs.
    pub fn hard_reset(&mut self, oid: ObjectId) -> Result<(), RepoError> {
        let status = self.status(Some(oid))?;
        let changed: Vec<BString> = status.changed.iter().cloned().collect();

        for path in changed {
            self.index.remove(path.as_ref());
            self.workspace.remove(path.as_ref())?;

            let Some(entry) = status.head_tree.get(&path) else {
                continue;
            };

            let blob = self.database.load(&entry.oid)?;
            let Object::Blob(blob) = blob else { continue };
            self.workspace
                .write_file(path.as_ref(), &blob.data, Some(entry.mode.raw()), true)?;

            if let Some(meta) = self.workspace.stat_file(path.as_ref()) {
                self.index.add(path.as_ref(), entry.oid, &meta);
            }
        }
        Ok(())
    }
}
