use crate::layout::StoreLayout;
use crate::{write_atomic, StoreError};
use std::fs;
use std::path::Path;
use syncship_schema::ObjectHash;

/// Content-addressable object store backed by blake3 hashing.
///
/// Compiled executables live here, named by the blake3 hash of their bytes.
/// Reads recompute the hash so a corrupted object is never handed out.
pub struct ObjectStore {
    layout: StoreLayout,
}

impl ObjectStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    /// Store `data` and return its hash. Existing objects are left untouched.
    pub fn put(&self, data: &[u8]) -> Result<ObjectHash, StoreError> {
        let hash = blake3::hash(data).to_hex().to_string();
        let dest = self.layout.objects_dir().join(&hash);
        if !dest.exists() {
            write_atomic(&self.layout.objects_dir(), &dest, data)?;
            tracing::debug!("stored object {} ({} bytes)", &hash[..12], data.len());
        }
        Ok(ObjectHash::new(hash))
    }

    pub fn get(&self, hash: &ObjectHash) -> Result<Vec<u8>, StoreError> {
        let path = self.layout.objects_dir().join(hash.as_str());
        if !path.exists() {
            return Err(StoreError::ObjectNotFound(hash.to_string()));
        }
        let data = fs::read(&path)?;
        let actual = blake3::hash(&data).to_hex().to_string();
        if actual != hash.as_str() {
            return Err(StoreError::IntegrityFailure {
                hash: hash.to_string(),
                expected: hash.to_string(),
                actual,
            });
        }
        Ok(data)
    }

    pub fn exists(&self, hash: &ObjectHash) -> bool {
        self.layout.objects_dir().join(hash.as_str()).exists()
    }

    /// Copy a verified object to `dest` as a read-only executable (0555).
    ///
    /// An existing file at `dest` whose content already matches is kept.
    pub fn materialize(&self, hash: &ObjectHash, dest: &Path) -> Result<(), StoreError> {
        if dest.is_file() {
            let current = fs::read(dest)?;
            if blake3::hash(&current).to_hex().as_str() == hash.as_str() {
                return Ok(());
            }
            make_writable(dest)?;
        }

        let data = self.get(hash)?;
        let parent = dest
            .parent()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("install path has no parent")))?;
        fs::create_dir_all(parent)?;
        write_atomic(parent, dest, &data)?;
        set_mode(dest, 0o555)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ObjectHash>, StoreError> {
        let dir = self.layout.objects_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut hashes = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    hashes.push(ObjectHash::new(name));
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, _mode: u32) -> Result<(), StoreError> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(true);
    fs::set_permissions(path, perms)?;
    Ok(())
}

fn make_writable(path: &Path) -> Result<(), StoreError> {
    set_mode(path, 0o755)
}
