use crate::assemble::ContainerImage;
use crate::oci::{sha256_digest, ImageIndex, MEDIA_TYPE_INDEX};
use crate::ImageError;

/// Serialized image index over `images`, with its digest.
///
/// Manifests are listed in architecture order so the index digest does not
/// depend on the order assembly finished in.
pub fn build_index(images: &[ContainerImage]) -> Result<(Vec<u8>, String), ImageError> {
    let mut sorted: Vec<&ContainerImage> = images.iter().collect();
    sorted.sort_by_key(|img| img.architecture);

    let index = ImageIndex {
        schema_version: 2,
        media_type: MEDIA_TYPE_INDEX.to_owned(),
        manifests: sorted.iter().map(|img| img.manifest_descriptor()).collect(),
    };
    let blob = serde_json::to_vec(&index)?;
    let digest = sha256_digest(&blob);
    Ok((blob, digest))
}
