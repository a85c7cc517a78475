use crate::assemble::ContainerImage;
use crate::index::build_index;
use crate::oci::{Descriptor, ImageIndex, ANNOTATION_REF_NAME, MEDIA_TYPE_INDEX};
use crate::ImageError;
use std::fs;
use std::path::Path;

const OCI_LAYOUT: &str = r#"{"imageLayoutVersion":"1.0.0"}"#;

fn write_blob(blobs_dir: &Path, digest: &str, data: &[u8]) -> Result<(), ImageError> {
    let hex = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| ImageError::InvalidDigest(digest.to_owned()))?;
    let path = blobs_dir.join(hex);
    if !path.exists() {
        fs::write(path, data)?;
    }
    Ok(())
}

/// Export `images` as an OCI image layout rooted at `dir`.
///
/// The top-level `index.json` points at a nested multi-arch index whose
/// `org.opencontainers.image.ref.name` annotation is the image tag.
pub fn write_oci_layout(images: &[ContainerImage], dir: &Path) -> Result<String, ImageError> {
    let first = images.first().ok_or(ImageError::NoImages)?;
    let blobs_dir = dir.join("blobs").join("sha256");
    fs::create_dir_all(&blobs_dir)?;

    for image in images {
        for (digest, data) in image.blobs() {
            write_blob(&blobs_dir, digest, data)?;
        }
        write_blob(&blobs_dir, &image.manifest_digest, &image.manifest_blob)?;
    }

    let (index_blob, index_digest) = build_index(images)?;
    write_blob(&blobs_dir, &index_digest, &index_blob)?;

    let mut nested = Descriptor::of(MEDIA_TYPE_INDEX, &index_blob);
    nested
        .annotations
        .insert(ANNOTATION_REF_NAME.to_owned(), first.tag.clone());
    let top = ImageIndex {
        schema_version: 2,
        media_type: MEDIA_TYPE_INDEX.to_owned(),
        manifests: vec![nested],
    };
    fs::write(dir.join("index.json"), serde_json::to_vec_pretty(&top)?)?;
    fs::write(dir.join("oci-layout"), OCI_LAYOUT)?;

    tracing::info!(
        "wrote OCI layout for {} image(s) to {}",
        images.len(),
        dir.display()
    );
    Ok(index_digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{assemble, ImageSpec};
    use std::path::PathBuf;
    use syncship_schema::{Architecture, Artifact, ArtifactId, ObjectHash};

    fn image() -> ContainerImage {
        let binary = b"bin";
        let artifact = Artifact {
            id: ArtifactId::new("a".repeat(64)),
            name: "sync-server".to_owned(),
            version: "1.2.3".to_owned(),
            executable: "sync-server".to_owned(),
            target: Architecture::Amd64,
            content_hash: ObjectHash::new(blake3::hash(binary).to_hex().to_string()),
            size: 3,
            source_hash: String::new(),
            lock_hash: String::new(),
            toolchain: "mock".to_owned(),
            install_path: PathBuf::from("/x"),
        };
        let spec = ImageSpec {
            name: "sync-server".to_owned(),
            tag: "1.2.3".to_owned(),
            exposed_ports: vec!["80/tcp".parse().unwrap()],
            max_layers: 5,
        };
        assemble(&artifact, binary, Architecture::Amd64, &spec, b"ca").unwrap()
    }

    #[test]
    fn layout_contains_every_blob() {
        let dir = tempfile::tempdir().unwrap();
        let img = image();
        let index_digest = write_oci_layout(std::slice::from_ref(&img), dir.path()).unwrap();

        assert!(dir.path().join("oci-layout").is_file());
        let blobs = dir.path().join("blobs/sha256");
        for (digest, data) in img.blobs() {
            let stored = fs::read(blobs.join(digest.trim_start_matches("sha256:"))).unwrap();
            assert_eq!(stored, data);
        }
        assert!(blobs
            .join(img.manifest_digest.trim_start_matches("sha256:"))
            .is_file());
        assert!(blobs
            .join(index_digest.trim_start_matches("sha256:"))
            .is_file());

        let top: ImageIndex =
            serde_json::from_slice(&fs::read(dir.path().join("index.json")).unwrap()).unwrap();
        assert_eq!(top.manifests[0].digest, index_digest);
        assert_eq!(top.manifests[0].annotations[ANNOTATION_REF_NAME], "1.2.3");
    }

    #[test]
    fn empty_image_set_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            write_oci_layout(&[], dir.path()),
            Err(ImageError::NoImages)
        ));
    }
}
