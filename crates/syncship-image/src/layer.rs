use crate::oci::{sha256_digest, Descriptor, MEDIA_TYPE_LAYER};
use crate::ImageError;
use serde::Serialize;
use std::collections::BTreeSet;

/// A file placed in a layer at `path` (relative, no leading `/`).
#[derive(Debug, Clone)]
pub struct LayerFile<'a> {
    pub path: &'a str,
    pub mode: u32,
    pub data: &'a [u8],
}

/// One uncompressed tar layer. For uncompressed layers the diff id equals the
/// blob digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageLayer {
    pub name: String,
    pub media_type: String,
    pub digest: String,
    pub diff_id: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ImageLayer {
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::of(&self.media_type, &self.data)
    }
}

fn header(entry_type: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    header.set_entry_type(entry_type);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(mode);
    header.set_size(size);
    header.set_cksum();
    header
}

/// Build a layer from `files`. Parent directories are added implicitly, and
/// all entries are written in path order with zeroed timestamps and root
/// ownership.
pub fn build_layer(name: &str, files: &[LayerFile<'_>]) -> Result<ImageLayer, ImageError> {
    let mut dirs = BTreeSet::new();
    for f in files {
        if f.path.is_empty() || f.path.starts_with('/') || f.path.split('/').any(|s| s == "..") {
            return Err(ImageError::InvalidLayerPath(f.path.to_owned()));
        }
        let mut prefix = String::new();
        let parts: Vec<&str> = f.path.split('/').collect();
        for part in &parts[..parts.len() - 1] {
            prefix.push_str(part);
            prefix.push('/');
            dirs.insert(prefix.clone());
        }
    }

    let mut entries: Vec<(String, Option<&LayerFile<'_>>)> =
        dirs.into_iter().map(|d| (d, None)).collect();
    entries.extend(files.iter().map(|f| (f.path.to_owned(), Some(f))));
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ar = tar::Builder::new(Vec::new());
    for (path, file) in &entries {
        match file {
            None => {
                let mut h = header(tar::EntryType::Directory, 0o755, 0);
                ar.append_data(&mut h, path, &[] as &[u8])?;
            }
            Some(f) => {
                let mut h = header(tar::EntryType::Regular, f.mode, f.data.len() as u64);
                ar.append_data(&mut h, path, f.data)?;
            }
        }
    }
    let data = ar.into_inner()?;
    let digest = sha256_digest(&data);

    Ok(ImageLayer {
        name: name.to_owned(),
        media_type: MEDIA_TYPE_LAYER.to_owned(),
        diff_id: digest.clone(),
        digest,
        data,
    })
}
