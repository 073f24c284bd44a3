//! The container: a hierarchical store of groups and datasets backed by a
//! Zarr V3 directory.
//!
//! A [`Container`] is bound to a path and an [`AccessPolicy`]. It is opened
//! in one [`AccessMode`] at a time; mutating calls fail unless the mode is
//! writable. Dataset and group names are cached on open, kept current by
//! every create and delete, and cleared on close.

mod attributes;
mod datasets;
pub(crate) mod zarr_io;

pub use datasets::{Addressing, DatasetOptions};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::attrs::{self, Attributes};
use crate::config::StoreConfig;
use crate::dategrid::DateSpan;
use crate::error::{Result, StoreError};
use crate::grid::GridLattice;
use crate::path::ObjectPath;
use crate::transform::{Transform, TransformKey, TransformRegistry};
use crate::types::{AccessMode, AccessPolicy, BoundsMode, NodeKind};
use zarr_io::{Store, ROOT};

/// A gridded dataset container.
pub struct Container {
    pub(crate) path: PathBuf,
    pub(crate) policy: AccessPolicy,
    pub(crate) config: StoreConfig,
    pub(crate) mode: Option<AccessMode>,
    pub(crate) store: Option<Store>,
    pub(crate) dataset_names: Vec<String>,
    pub(crate) group_names: Vec<String>,
    pub(crate) dirty: bool,
    pub(crate) transforms: TransformRegistry,
    pub(crate) lattice: Option<GridLattice>,
    pub(crate) span: Option<DateSpan>,
    pub(crate) bounds: BoundsMode,
}

impl Container {
    /// A closed container bound to `path`.
    pub fn new(path: impl Into<PathBuf>, policy: AccessPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            config: StoreConfig::default(),
            mode: None,
            store: None,
            dataset_names: Vec::new(),
            group_names: Vec::new(),
            dirty: false,
            transforms: TransformRegistry::default(),
            lattice: None,
            span: None,
            bounds: BoundsMode::default(),
        }
    }

    /// A closed container with an explicit configuration.
    pub fn with_config(
        path: impl Into<PathBuf>,
        policy: AccessPolicy,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut container = Self::new(path, policy);
        container.config = config;
        Ok(container)
    }

    /// Open an existing container read-only.
    pub fn open_read(path: impl Into<PathBuf>) -> Result<Self> {
        let mut container = Self::new(path, AccessPolicy::ReadOnly);
        container.open(AccessMode::Read)?;
        Ok(container)
    }

    /// Open an existing container for reading and writing.
    pub fn open_append(path: impl Into<PathBuf>) -> Result<Self> {
        let mut container = Self::new(path, AccessPolicy::Manage);
        container.open(AccessMode::Append)?;
        Ok(container)
    }

    /// Create a new container. It is left open in `Append` mode.
    pub fn create(path: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        let mut container = Self::with_config(path, AccessPolicy::Build, config)?;
        container.open(AccessMode::Create)?;
        Ok(container)
    }

    /// Acquire the backing directory.
    ///
    /// An already-open container is closed first. `Create` fails if anything
    /// exists at the path; on success the container continues in `Append`.
    pub fn open(&mut self, mode: AccessMode) -> Result<()> {
        if !self.policy.allows(mode) {
            return Err(StoreError::file_access(
                &self.path,
                format!("access mode '{}' is not allowed for this container", mode),
            ));
        }

        if self.is_open() {
            self.close()?;
        }

        if mode == AccessMode::Create {
            self.create_root()?;
        }

        if !self.path.join("zarr.json").is_file() {
            return Err(StoreError::file_access(&self.path, "not a grid container"));
        }

        let store = zarr_io::open_store(&self.path)?;
        let root = zarr_io::open_group(&store, ROOT)
            .map_err(|e| StoreError::file_access(&self.path, e))?;
        let (datasets, groups) = scan_hierarchy(&self.path)?;

        let effective = match mode {
            AccessMode::Create => AccessMode::Append,
            other => other,
        };

        self.store = Some(store);
        self.mode = Some(effective);
        self.dataset_names = datasets;
        self.group_names = groups;
        self.dirty = false;

        let loaded = DateSpan::from_attributes(root.attributes())
            .and_then(|span| Ok((span, self.load_lattice()?)));
        match loaded {
            Ok((span, lattice)) => {
                self.span = span;
                self.lattice = lattice;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to open container");
                self.discard_session();
                return Err(e);
            }
        }

        info!(
            path = %self.path.display(),
            mode = %effective,
            datasets = self.dataset_names.len(),
            groups = self.group_names.len(),
            "Opened container"
        );
        Ok(())
    }

    fn create_root(&self) -> Result<()> {
        if self.path.exists() {
            return Err(StoreError::file_access(&self.path, "path already exists"));
        }
        fs::create_dir_all(&self.path).map_err(|e| StoreError::file_access(&self.path, e))?;

        let store = zarr_io::open_store(&self.path)?;
        let mut attrs = Attributes::new();
        attrs::stamp_new(&mut attrs);
        zarr_io::create_group(&store, ROOT, attrs)?;

        info!(path = %self.path.display(), "Created container");
        Ok(())
    }

    /// Release the backing directory. Closing a closed container is a no-op.
    ///
    /// The lattice and date span stay loaded; name caches are cleared.
    pub fn close(&mut self) -> Result<()> {
        let Some(store) = self.store.take() else {
            debug!(path = %self.path.display(), "Container already closed");
            return Ok(());
        };

        let writable = self.mode.map(|m| m.is_writable()).unwrap_or(false);
        let result = if self.dirty && writable {
            stamp_root_updated(&store)
        } else {
            Ok(())
        };

        self.mode = None;
        self.dataset_names.clear();
        self.group_names.clear();
        self.dirty = false;

        info!(path = %self.path.display(), "Closed container");
        result
    }

    fn discard_session(&mut self) {
        self.store = None;
        self.mode = None;
        self.dataset_names.clear();
        self.group_names.clear();
        self.dirty = false;
        self.span = None;
        self.lattice = None;
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Current mode, or `None` when closed.
    pub fn mode(&self) -> Option<AccessMode> {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> Result<Store> {
        self.store
            .clone()
            .ok_or_else(|| StoreError::NotOpen(self.path.clone()))
    }

    pub(crate) fn writable_store(&self, operation: &str) -> Result<Store> {
        let store = self.store()?;
        match self.mode {
            Some(mode) if mode.is_writable() => Ok(store),
            _ => Err(StoreError::read_only(&self.path, operation)),
        }
    }

    /// Dotted paths of every dataset, sorted.
    pub fn dataset_names(&self) -> &[String] {
        &self.dataset_names
    }

    /// Dotted paths of every group below the root, sorted.
    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    /// Every node with its kind, sorted by path.
    pub fn hierarchy(&self) -> Vec<(String, NodeKind)> {
        let mut nodes: Vec<(String, NodeKind)> = self
            .group_names
            .iter()
            .map(|g| (g.clone(), NodeKind::Group))
            .chain(
                self.dataset_names
                    .iter()
                    .map(|d| (d.clone(), NodeKind::Dataset)),
            )
            .collect();
        nodes.sort();
        nodes
    }

    pub fn has_dataset(&self, path: &str) -> bool {
        ObjectPath::parse(path)
            .map(|p| self.is_dataset(&p))
            .unwrap_or(false)
    }

    pub fn has_group(&self, path: &str) -> bool {
        ObjectPath::parse(path)
            .map(|p| self.is_group(&p))
            .unwrap_or(false)
    }

    pub(crate) fn is_dataset(&self, path: &ObjectPath) -> bool {
        self.dataset_names.binary_search(&path.dotted()).is_ok()
    }

    pub(crate) fn is_group(&self, path: &ObjectPath) -> bool {
        self.group_names.binary_search(&path.dotted()).is_ok()
    }

    /// Parse `path` and check that it names a dataset.
    pub(crate) fn require_dataset(&self, path: &str) -> Result<ObjectPath> {
        self.store()?;
        let object = ObjectPath::parse(path)?;
        if !self.is_dataset(&object) {
            return Err(StoreError::UnknownPath(object.dotted()));
        }
        Ok(object)
    }

    pub(crate) fn require_group(&self, path: &str) -> Result<ObjectPath> {
        self.store()?;
        let object = ObjectPath::parse(path)?;
        if !self.is_group(&object) {
            return Err(StoreError::UnknownPath(object.dotted()));
        }
        Ok(object)
    }

    pub(crate) fn require_vacant(&self, path: &ObjectPath) -> Result<()> {
        if self.is_dataset(path) || self.is_group(path) {
            return Err(StoreError::AlreadyExists(path.dotted()));
        }
        Ok(())
    }

    /// Create any missing groups above `path`.
    pub(crate) fn ensure_parents(&mut self, store: &Store, path: &ObjectPath) -> Result<()> {
        for ancestor in path.ancestors() {
            if self.is_group(&ancestor) {
                continue;
            }
            if self.is_dataset(&ancestor) {
                return Err(StoreError::AlreadyExists(ancestor.dotted()));
            }
            let mut attrs = Attributes::new();
            attrs::stamp_new(&mut attrs);
            zarr_io::create_group(store, &ancestor.slash(), attrs)?;
            insert_sorted(&mut self.group_names, ancestor.dotted());
            debug!(group = %ancestor, "Created parent group");
        }
        Ok(())
    }

    pub(crate) fn register(&mut self, path: &ObjectPath, kind: NodeKind) {
        let names = match kind {
            NodeKind::Group => &mut self.group_names,
            NodeKind::Dataset => &mut self.dataset_names,
        };
        insert_sorted(names, path.dotted());
        self.dirty = true;
    }

    /// Drop `path` and everything below it from the caches.
    pub(crate) fn forget(&mut self, path: &ObjectPath) {
        let keep = |name: &String| {
            ObjectPath::parse(name)
                .map(|p| p != *path && !p.is_below(path))
                .unwrap_or(true)
        };
        self.dataset_names.retain(keep);
        self.group_names.retain(keep);
        self.dirty = true;
    }

    /// Create a group, along with any missing parents.
    pub fn create_group(&mut self, path: &str, attributes: Attributes) -> Result<()> {
        let store = self.writable_store("create group")?;
        let group = ObjectPath::parse(path)?;
        self.require_vacant(&group)?;
        self.ensure_parents(&store, &group)?;

        let mut attrs = attributes;
        attrs::stamp_new(&mut attrs);
        zarr_io::create_group(&store, &group.slash(), attrs)?;
        self.register(&group, NodeKind::Group);

        info!(group = %group, "Created group");
        Ok(())
    }

    /// Delete a group and everything inside it.
    pub fn delete_group(&mut self, path: &str) -> Result<()> {
        let store = self.writable_store("delete group")?;
        let group = self.require_group(path)?;
        zarr_io::erase_node(&store, &group.prefix())?;
        self.forget(&group);

        info!(group = %group, "Deleted group");
        Ok(())
    }

    /// Registered pack/unpack transforms.
    pub fn transforms(&self) -> &TransformRegistry {
        &self.transforms
    }

    pub fn transforms_mut(&mut self) -> &mut TransformRegistry {
        &mut self.transforms
    }

    pub fn register_packer(&mut self, key: TransformKey, transform: Transform) {
        self.transforms.register_packer(key, transform);
    }

    pub fn register_unpacker(&mut self, key: TransformKey, transform: Transform) {
        self.transforms.register_unpacker(key, transform);
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .field("datasets", &self.dataset_names.len())
            .field("groups", &self.group_names.len())
            .field("lattice", &self.lattice.as_ref().map(|l| l.lons().dim()))
            .field("span", &self.span)
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "Failed to close container");
        }
    }
}

fn insert_sorted(names: &mut Vec<String>, name: String) {
    if let Err(pos) = names.binary_search(&name) {
        names.insert(pos, name);
    }
}

fn stamp_root_updated(store: &Store) -> Result<()> {
    let mut root = zarr_io::open_group(store, ROOT)?;
    root.attributes_mut()
        .insert(attrs::UPDATED.to_string(), json!(attrs::timestamp_now()));
    root.store_metadata()
        .map_err(|e| StoreError::zarr("write group metadata", ROOT, e))
}

/// Kind of the node whose metadata document is `meta`, if it is one.
fn node_kind(meta: &Path) -> Result<Option<NodeKind>> {
    if !meta.is_file() {
        return Ok(None);
    }
    let doc: Value = serde_json::from_str(&fs::read_to_string(meta)?)?;
    Ok(match doc.get("node_type").and_then(Value::as_str) {
        Some("array") => Some(NodeKind::Dataset),
        Some("group") => Some(NodeKind::Group),
        _ => None,
    })
}

/// Whether `entry` is a directory inside an array node (chunk storage).
fn is_inside_array(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .path()
            .parent()
            .map(|p| matches!(node_kind(&p.join("zarr.json")), Ok(Some(NodeKind::Dataset))))
            .unwrap_or(false)
}

/// Walk the container directory and list (datasets, groups) as sorted dotted paths.
fn scan_hierarchy(root: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let mut datasets = Vec::new();
    let mut groups = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_inside_array(e));

    for entry in walker {
        let entry = entry.map_err(|e| StoreError::Storage(e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let Some(kind) = node_kind(&entry.path().join("zarr.json"))? else {
            continue;
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(".");

        match kind {
            NodeKind::Dataset => datasets.push(name),
            NodeKind::Group => groups.push(name),
        }
    }

    datasets.sort();
    groups.sort();
    debug!(
        root = %root.display(),
        datasets = datasets.len(),
        groups = groups.len(),
        "Scanned hierarchy"
    );
    Ok((datasets, groups))
}
