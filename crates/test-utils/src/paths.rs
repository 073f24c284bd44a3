//! Temporary locations for test containers.
//!
//! Containers refuse to be created over an existing path, so helpers here
//! hand out a path inside a fresh temporary directory that does not exist
//! yet. Keep the returned `TempDir` alive for as long as the container is
//! used; dropping it removes everything.

use std::path::PathBuf;

use tempfile::TempDir;

/// Creates a temporary directory for test output.
pub fn temp_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates a temporary directory with a specific prefix.
pub fn temp_test_dir_with_prefix(prefix: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .expect("Failed to create temporary test directory")
}

/// A not-yet-existing container path `<tempdir>/<name>.zarr`.
pub fn temp_container_path(name: &str) -> (TempDir, PathBuf) {
    let dir = temp_test_dir_with_prefix("grid_store_");
    let path = dir.path().join(format!("{}.zarr", name));
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_test_dir() {
        let dir = temp_test_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_temp_test_dir_with_prefix() {
        let dir = temp_test_dir_with_prefix("lattice_test_");
        assert!(dir.path().to_string_lossy().contains("lattice_test_"));
    }

    #[test]
    fn test_container_path_is_vacant() {
        let (dir, path) = temp_container_path("tmax");
        assert!(!path.exists());
        assert!(path.starts_with(dir.path()));
        assert!(path.to_string_lossy().ends_with("tmax.zarr"));
    }
}
