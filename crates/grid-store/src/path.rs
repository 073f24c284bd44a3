//! Object paths.
//!
//! Callers name objects with dotted paths (`"surface.tmax"`); the Zarr
//! backend addresses nodes with slash paths (`"/surface/tmax"`). Both forms
//! are accepted on input.

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectPath {
    parts: Vec<String>,
}

impl ObjectPath {
    /// Parse a dotted or slash path. The root (an empty path) is rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(StoreError::UnknownPath(path.to_string()));
        }

        let parts: Vec<String> = trimmed
            .split(|c| c == '.' || c == '/')
            .map(str::to_string)
            .collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(StoreError::UnknownPath(path.to_string()));
        }
        Ok(Self { parts })
    }

    pub fn dotted(&self) -> String {
        self.parts.join(".")
    }

    /// Absolute node path, as the Zarr backend expects it.
    pub fn slash(&self) -> String {
        format!("/{}", self.parts.join("/"))
    }

    /// Store key prefix covering the node and everything below it.
    pub fn prefix(&self) -> String {
        format!("{}/", self.parts.join("/"))
    }

    /// The last path component.
    pub fn name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// Enclosing group, or `None` for top-level objects.
    pub fn parent(&self) -> Option<Self> {
        if self.parts.len() < 2 {
            return None;
        }
        Some(Self {
            parts: self.parts[..self.parts.len() - 1].to_vec(),
        })
    }

    /// Enclosing groups from the top down, excluding the root.
    pub fn ancestors(&self) -> Vec<Self> {
        (1..self.parts.len())
            .map(|n| Self {
                parts: self.parts[..n].to_vec(),
            })
            .collect()
    }

    /// An object named `name` in the same group as this one.
    pub fn sibling(&self, name: &str) -> Result<Self> {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => Self::parse(name),
        }
    }

    pub fn join(&self, child: &str) -> Result<Self> {
        let child = Self::parse(child)?;
        let mut parts = self.parts.clone();
        parts.extend(child.parts);
        Ok(Self { parts })
    }

    /// Whether `self` lies strictly below `other`.
    pub fn is_below(&self, other: &ObjectPath) -> bool {
        self.parts.len() > other.parts.len() && self.parts.starts_with(&other.parts)
    }
}

impl std::fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dotted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_both_forms() {
        let dotted = ObjectPath::parse("surface.tmax").unwrap();
        let slashed = ObjectPath::parse("/surface/tmax").unwrap();
        assert_eq!(dotted, slashed);
        assert_eq!(dotted.slash(), "/surface/tmax");
        assert_eq!(dotted.prefix(), "surface/tmax/");
        assert_eq!(dotted.name(), "tmax");
    }

    #[test]
    fn test_parse_rejects_empty_components() {
        assert!(ObjectPath::parse("").is_err());
        assert!(ObjectPath::parse("/").is_err());
        assert!(ObjectPath::parse("a..b").is_err());
    }

    #[test]
    fn test_family() {
        let path = ObjectPath::parse("a.b.c").unwrap();
        assert_eq!(path.parent().unwrap().dotted(), "a.b");
        assert_eq!(
            path.ancestors().iter().map(|p| p.dotted()).collect::<Vec<_>>(),
            vec!["a", "a.b"]
        );
        assert_eq!(path.sibling("lon").unwrap().dotted(), "a.b.lon");
        assert_eq!(ObjectPath::parse("tmax").unwrap().sibling("lon").unwrap().dotted(), "lon");
        assert!(path.is_below(&ObjectPath::parse("a").unwrap()));
        assert!(!path.is_below(&path));
    }
}
