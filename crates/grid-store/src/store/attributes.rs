//! Attribute access at file, group, dataset and object scope.

use serde_json::{json, Value};
use tracing::debug;

use super::zarr_io::{self, ROOT};
use super::Container;
use crate::attrs::{self, Attributes};
use crate::error::{Result, StoreError};
use crate::path::ObjectPath;

/// A node whose attributes are addressed.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Root,
    Group(ObjectPath),
    Dataset(ObjectPath),
}

impl Node {
    fn slash(&self) -> String {
        match self {
            Self::Root => ROOT.to_string(),
            Self::Group(p) | Self::Dataset(p) => p.slash(),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Root => ROOT.to_string(),
            Self::Group(p) | Self::Dataset(p) => p.dotted(),
        }
    }
}

impl Container {
    pub(crate) fn read_attributes(&self, node: &Node) -> Result<Attributes> {
        let store = self.store()?;
        let slash = node.slash();
        let attrs = match node {
            Node::Dataset(_) => zarr_io::open_array(&store, &slash)?.attributes().clone(),
            Node::Root | Node::Group(_) => zarr_io::open_group(&store, &slash)?.attributes().clone(),
        };
        Ok(attrs)
    }

    /// Apply `edit` to a node's attributes and persist them.
    pub(crate) fn modify_attributes<F>(&mut self, node: &Node, operation: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Attributes) -> Result<()>,
    {
        let store = self.writable_store(operation)?;
        let slash = node.slash();
        match node {
            Node::Dataset(_) => {
                let mut array = zarr_io::open_array(&store, &slash)?;
                edit(array.attributes_mut())?;
                array
                    .store_metadata()
                    .map_err(|e| StoreError::zarr("write array metadata", &slash, e))?;
            }
            Node::Root | Node::Group(_) => {
                let mut group = zarr_io::open_group(&store, &slash)?;
                edit(group.attributes_mut())?;
                group
                    .store_metadata()
                    .map_err(|e| StoreError::zarr("write group metadata", &slash, e))?;
            }
        }
        self.dirty = true;
        debug!(node = %node.label(), operation, "Updated attributes");
        Ok(())
    }

    fn group_node(&self, path: &str) -> Result<Node> {
        Ok(Node::Group(self.require_group(path)?))
    }

    fn dataset_node(&self, path: &str) -> Result<Node> {
        Ok(Node::Dataset(self.require_dataset(path)?))
    }

    /// Resolve a path to whichever kind of node lives there.
    fn object_node(&self, path: &str) -> Result<Node> {
        self.store()?;
        let object = ObjectPath::parse(path)?;
        if self.is_dataset(&object) {
            Ok(Node::Dataset(object))
        } else if self.is_group(&object) {
            Ok(Node::Group(object))
        } else {
            Err(StoreError::UnknownPath(object.dotted()))
        }
    }

    fn attribute_of(&self, node: &Node, name: &str) -> Result<Value> {
        self.read_attributes(node)?
            .remove(name)
            .ok_or_else(|| StoreError::unknown_attribute(node.label(), name))
    }

    fn set_attributes_of(&mut self, node: &Node, values: Attributes) -> Result<()> {
        let stamp = matches!(node, Node::Dataset(_)) && !values.contains_key(attrs::UPDATED);
        self.modify_attributes(node, "set attributes", |current| {
            current.extend(values);
            if stamp {
                current.insert(attrs::UPDATED.to_string(), json!(attrs::timestamp_now()));
            }
            Ok(())
        })
    }

    fn delete_attribute_of(&mut self, node: &Node, name: &str) -> Result<()> {
        let label = node.label();
        self.modify_attributes(node, "delete attribute", |current| {
            current
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| StoreError::unknown_attribute(label, name))
        })
    }

    // File (root group) scope.

    pub fn file_attributes(&self) -> Result<Attributes> {
        self.read_attributes(&Node::Root)
    }

    pub fn file_attribute(&self, name: &str) -> Result<Value> {
        self.attribute_of(&Node::Root, name)
    }

    /// The attribute, or `default` when it is absent.
    pub fn file_attribute_or(&self, name: &str, default: Value) -> Result<Value> {
        Ok(self.file_attributes()?.remove(name).unwrap_or(default))
    }

    pub fn set_file_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        let mut values = Attributes::new();
        values.insert(name.to_string(), value);
        self.set_attributes_of(&Node::Root, values)
    }

    pub fn set_file_attributes(&mut self, values: Attributes) -> Result<()> {
        self.set_attributes_of(&Node::Root, values)
    }

    pub fn delete_file_attribute(&mut self, name: &str) -> Result<()> {
        self.delete_attribute_of(&Node::Root, name)
    }

    // Group scope.

    pub fn group_attributes(&self, path: &str) -> Result<Attributes> {
        self.read_attributes(&self.group_node(path)?)
    }

    pub fn group_attribute(&self, path: &str, name: &str) -> Result<Value> {
        self.attribute_of(&self.group_node(path)?, name)
    }

    pub fn group_attribute_or(&self, path: &str, name: &str, default: Value) -> Result<Value> {
        Ok(self.group_attributes(path)?.remove(name).unwrap_or(default))
    }

    pub fn set_group_attributes(&mut self, path: &str, values: Attributes) -> Result<()> {
        let node = self.group_node(path)?;
        self.set_attributes_of(&node, values)
    }

    pub fn delete_group_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        let node = self.group_node(path)?;
        self.delete_attribute_of(&node, name)
    }

    // Dataset scope. Writes stamp `updated` unless the caller supplies it.

    pub fn dataset_attributes(&self, path: &str) -> Result<Attributes> {
        self.read_attributes(&self.dataset_node(path)?)
    }

    pub fn dataset_attribute(&self, path: &str, name: &str) -> Result<Value> {
        self.attribute_of(&self.dataset_node(path)?, name)
    }

    pub fn dataset_attribute_or(&self, path: &str, name: &str, default: Value) -> Result<Value> {
        Ok(self.dataset_attributes(path)?.remove(name).unwrap_or(default))
    }

    pub fn set_dataset_attribute(&mut self, path: &str, name: &str, value: Value) -> Result<()> {
        let mut values = Attributes::new();
        values.insert(name.to_string(), value);
        self.set_dataset_attributes(path, values)
    }

    pub fn set_dataset_attributes(&mut self, path: &str, values: Attributes) -> Result<()> {
        let node = self.dataset_node(path)?;
        self.set_attributes_of(&node, values)
    }

    pub fn delete_dataset_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        let node = self.dataset_node(path)?;
        self.delete_attribute_of(&node, name)
    }

    /// `units` of a dataset, if declared.
    pub fn dataset_units(&self, path: &str) -> Result<Option<String>> {
        Ok(self
            .dataset_attributes(path)?
            .get(attrs::UNITS)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// `missing` sentinel of a dataset, if declared.
    pub fn dataset_missing(&self, path: &str) -> Result<Option<f64>> {
        Ok(self
            .dataset_attributes(path)?
            .get(attrs::MISSING)
            .and_then(attrs::value_f64))
    }

    // Object scope: a group or a dataset, whichever exists at the path.

    pub fn object_attributes(&self, path: &str) -> Result<Attributes> {
        self.read_attributes(&self.object_node(path)?)
    }

    pub fn object_attribute(&self, path: &str, name: &str) -> Result<Value> {
        self.attribute_of(&self.object_node(path)?, name)
    }

    pub fn set_object_attributes(&mut self, path: &str, values: Attributes) -> Result<()> {
        let node = self.object_node(path)?;
        self.set_attributes_of(&node, values)
    }

    pub fn delete_object_attribute(&mut self, path: &str, name: &str) -> Result<()> {
        let node = self.object_node(path)?;
        self.delete_attribute_of(&node, name)
    }
}
