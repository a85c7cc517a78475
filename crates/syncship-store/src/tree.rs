//! Deterministic packing of a source tree, used to fingerprint build inputs.
//!
//! The archive depends only on relative paths, file contents, symlink targets,
//! and whether a file is executable. Timestamps, ownership, and the umask of
//! the checkout are normalized away, so two checkouts of the same commit in
//! different directories hash identically.

use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directory names left out of the packed tree.
#[derive(Debug, Clone)]
pub struct TreeFilter {
    excluded: Vec<String>,
}

impl Default for TreeFilter {
    fn default() -> Self {
        Self {
            excluded: vec!["target".to_owned(), ".git".to_owned()],
        }
    }
}

impl TreeFilter {
    pub fn excluding(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            excluded: names.into_iter().map(Into::into).collect(),
        }
    }

    fn skips(&self, name: &str) -> bool {
        self.excluded.iter().any(|e| e == name)
    }
}

/// Pack `root` into an uncompressed tar with sorted entries.
pub fn pack_tree(root: &Path, filter: &TreeFilter) -> Result<Vec<u8>, StoreError> {
    if !root.is_dir() {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("source tree not found: {}", root.display()),
        )));
    }

    let mut entries = Vec::new();
    collect_entries(root, root, filter, &mut entries)?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ar = tar::Builder::new(Vec::new());
    ar.follow_symlinks(false);

    for (rel_path, full_path) in &entries {
        let meta = full_path.symlink_metadata()?;
        let ft = meta.file_type();
        if ft.is_file() {
            let data = fs::read(full_path)?;
            let mode = if is_executable(&meta) { 0o755 } else { 0o644 };
            let mut header = header(tar::EntryType::Regular, mode, data.len() as u64);
            ar.append_data(&mut header, rel_path, data.as_slice())?;
        } else if ft.is_dir() {
            let mut header = header(tar::EntryType::Directory, 0o755, 0);
            ar.append_data(&mut header, format!("{rel_path}/"), &[] as &[u8])?;
        } else if ft.is_symlink() {
            let target = fs::read_link(full_path)?;
            let mut header = header(tar::EntryType::Symlink, 0o777, 0);
            ar.append_link(&mut header, rel_path, &target)?;
        } else {
            warn!("skipping unsupported file type in source tree: {rel_path}");
        }
    }

    Ok(ar.into_inner()?)
}

/// Blake3 digest of [`pack_tree`] output.
pub fn hash_tree(root: &Path, filter: &TreeFilter) -> Result<String, StoreError> {
    let packed = pack_tree(root, filter)?;
    Ok(blake3::hash(&packed).to_hex().to_string())
}

fn collect_entries(
    root: &Path,
    current: &Path,
    filter: &TreeFilter,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), StoreError> {
    for entry in fs::read_dir(current)? {
        let entry = entry?;
        let name = entry.file_name();
        let full = entry.path();
        let meta = full.symlink_metadata()?;

        if meta.is_dir() && filter.skips(&name.to_string_lossy()) {
            continue;
        }

        let rel = full
            .strip_prefix(root)
            .map_err(|e| StoreError::Io(std::io::Error::other(format!("path strip: {e}"))))?
            .to_string_lossy()
            .replace('\\', "/");

        if meta.is_dir() {
            out.push((rel, full.clone()));
            collect_entries(root, &full, filter, out)?;
        } else {
            out.push((rel, full));
        }
    }
    Ok(())
}

fn header(entry_type: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header.set_size(size);
    header.set_cksum();
    header
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(dir: &Path) {
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("Cargo.toml"), "[package]\nname = \"sync\"\n").unwrap();
        fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();
    }

    #[test]
    fn identical_trees_in_different_locations_hash_equal() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fixture(a.path());
        fixture(b.path());
        let filter = TreeFilter::default();
        assert_eq!(
            hash_tree(a.path(), &filter).unwrap(),
            hash_tree(b.path(), &filter).unwrap()
        );
    }

    #[test]
    fn content_change_changes_hash() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let filter = TreeFilter::default();
        let before = hash_tree(dir.path(), &filter).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() { loop {} }\n").unwrap();
        assert_ne!(before, hash_tree(dir.path(), &filter).unwrap());
    }

    #[test]
    fn build_output_and_vcs_metadata_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let filter = TreeFilter::default();
        let before = hash_tree(dir.path(), &filter).unwrap();

        fs::create_dir_all(dir.path().join("target/release")).unwrap();
        fs::write(dir.path().join("target/release/sync"), b"binary").unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();

        assert_eq!(before, hash_tree(dir.path(), &filter).unwrap());
    }

    #[test]
    fn custom_filter_excludes_named_directories() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/notes.md"), "notes").unwrap();

        let without_docs = hash_tree(dir.path(), &TreeFilter::excluding(["docs"])).unwrap();
        fs::write(dir.path().join("docs/notes.md"), "changed").unwrap();
        assert_eq!(
            without_docs,
            hash_tree(dir.path(), &TreeFilter::excluding(["docs"])).unwrap()
        );
    }

    #[test]
    fn entries_are_sorted_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path());
        let packed = pack_tree(dir.path(), &TreeFilter::default()).unwrap();

        let mut archive = tar::Archive::new(packed.as_slice());
        let mut paths = Vec::new();
        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            assert_eq!(entry.header().mtime().unwrap(), 0);
            assert_eq!(entry.header().uid().unwrap(), 0);
            paths.push(entry.path().unwrap().to_string_lossy().to_string());
        }
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert!(paths.iter().any(|p| p == "src/main.rs"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(pack_tree(&dir.path().join("absent"), &TreeFilter::default()).is_err());
    }
}
