use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use gemini_image_rs::ReferenceImage;
use image_batch_runner::{ReferenceAssetSet, MAX_REFERENCES_PER_KIND};

async fn load_kind(kind: &str, paths: &[PathBuf]) -> Result<Vec<ReferenceImage>> {
    if paths.len() > MAX_REFERENCES_PER_KIND {
        bail!(
            "at most {} {} reference images are allowed, got {}",
            MAX_REFERENCES_PER_KIND,
            kind,
            paths.len()
        );
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(load_image(path).await.with_context(|| {
            format!("Failed to read {} reference {}", kind, path.display())
        })?);
    }
    Ok(images)
}

async fn load_image(path: &Path) -> std::io::Result<ReferenceImage> {
    let bytes = tokio::fs::read(path).await?;
    let mime = ReferenceImage::mime_for_path(path);
    tracing::info!(path = %path.display(), mime, bytes = bytes.len(), "Loaded reference image");
    Ok(ReferenceImage::new(mime, bytes))
}

/// Read style and persona reference images. `None` when neither is given.
pub async fn load_references(style: &[PathBuf], persona: &[PathBuf]) -> Result<Option<ReferenceAssetSet>> {
    let set = ReferenceAssetSet::new(
        load_kind("style", style).await?,
        load_kind("persona", persona).await?,
    );
    Ok((!set.is_empty()).then_some(set))
}
