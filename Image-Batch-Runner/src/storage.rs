use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::types::GenerationPrompt;

/// Where generated artifacts end up.
///
/// Implementations must be safe to call concurrently for different indices
/// of the same item.
pub trait ArtifactStore: Send + Sync + 'static {
    fn save_image(
        &self,
        item_id: &str,
        index: u32,
        bytes: &[u8],
        label: &str,
    ) -> impl Future<Output = io::Result<PathBuf>> + Send;

    fn save_report(
        &self,
        item_id: &str,
        markdown: &str,
    ) -> impl Future<Output = io::Result<PathBuf>> + Send;

    fn save_prompts(
        &self,
        item_id: &str,
        prompts: &[GenerationPrompt],
    ) -> impl Future<Output = io::Result<PathBuf>> + Send;

    /// Append one line to the run-wide index.
    fn append_index(&self, line: &str) -> impl Future<Output = io::Result<()>> + Send;
}

/// Filesystem store.
///
/// ```text
/// <root>/SUMMARY.md
/// <root>/<item_id>/<item_id>_content.md
/// <root>/<item_id>/<item_id>_prompts.json
/// <root>/<item_id>/images/slide_01_<label>.png
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn item_dir(&self, item_id: &str) -> PathBuf {
        self.root.join(sanitize_component(item_id))
    }

    pub fn image_path(&self, item_id: &str, index: u32, label: &str) -> PathBuf {
        self.item_dir(item_id)
            .join("images")
            .join(image_file_name(index, label))
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join("SUMMARY.md")
    }
}

/// `slide_{NN}_{label}.png` with a filesystem-safe label.
pub fn image_file_name(index: u32, label: &str) -> String {
    let label = sanitize_component(label);
    if label.is_empty() {
        format!("slide_{:02}.png", index)
    } else {
        format!("slide_{:02}_{}.png", index, label)
    }
}

/// Replace spaces, separators and other characters that are unsafe in file
/// names with `_`.
pub fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

async fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

impl ArtifactStore for LocalStore {
    async fn save_image(
        &self,
        item_id: &str,
        index: u32,
        bytes: &[u8],
        label: &str,
    ) -> io::Result<PathBuf> {
        let path = self.image_path(item_id, index, label);
        write_file(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Saved image");
        Ok(path)
    }

    async fn save_report(&self, item_id: &str, markdown: &str) -> io::Result<PathBuf> {
        let dir = self.item_dir(item_id);
        let path = dir.join(format!("{}_content.md", sanitize_component(item_id)));
        write_file(&path, markdown.as_bytes()).await?;
        Ok(path)
    }

    async fn save_prompts(&self, item_id: &str, prompts: &[GenerationPrompt]) -> io::Result<PathBuf> {
        let dir = self.item_dir(item_id);
        let path = dir.join(format!("{}_prompts.json", sanitize_component(item_id)));
        let json = serde_json::to_vec_pretty(prompts).map_err(io::Error::other)?;
        write_file(&path, &json).await?;
        Ok(path)
    }

    async fn append_index(&self, line: &str) -> io::Result<()> {
        let path = self.index_path();
        tokio::fs::create_dir_all(&self.root).await?;
        let is_new = !tokio::fs::try_exists(&path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if is_new {
            file.write_all(b"# Generated Posts\n\n").await?;
        }
        file.write_all(line.trim_end().as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name(1, "SELF LOVE"), "slide_01_SELF_LOVE.png");
        assert_eq!(image_file_name(10, "yes/no"), "slide_10_yes_no.png");
        assert_eq!(image_file_name(3, ""), "slide_03.png");
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component(" a:b*c "), "a_b_c");
        assert_eq!(sanitize_component("../etc"), "_etc");
    }

    #[tokio::test]
    async fn test_save_image_layout() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let path = store
            .save_image("post_1_20250101_120000", 2, b"img", "NEW START")
            .await
            .unwrap();
        assert_eq!(
            path,
            dir.path()
                .join("post_1_20250101_120000")
                .join("images")
                .join("slide_02_NEW_START.png")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"img");
    }

    #[tokio::test]
    async fn test_save_report_and_prompts() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let report = store.save_report("post_9", "# Title\n").await.unwrap();
        assert!(report.ends_with("post_9/post_9_content.md"));
        assert_eq!(std::fs::read_to_string(&report).unwrap(), "# Title\n");

        let prompts = vec![GenerationPrompt::new(1, "A", "Create a")];
        let path = store.save_prompts("post_9", &prompts).await.unwrap();
        let parsed: Vec<GenerationPrompt> =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed, prompts);
    }

    #[tokio::test]
    async fn test_append_index() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.append_index("- post_1").await.unwrap();
        store.append_index("- post_2\n").await.unwrap();
        let content = std::fs::read_to_string(store.index_path()).unwrap();
        assert_eq!(content, "# Generated Posts\n\n- post_1\n- post_2\n");
    }
}
