use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use wipecast_core::ContainerFormat;

const DEFAULT_STEM: &str = "comparison";

/// Resolve `-o` into a clip path whose extension matches `format`.
///
/// A directory, or a path without an extension, gets `comparison.<ext>` inside
/// it; a file path keeps its stem and has its extension replaced.
pub fn clip_path(output: &Path, format: ContainerFormat) -> PathBuf {
    with_extension_or_default(output, DEFAULT_STEM, format.extension())
}

pub fn with_extension_or_default(output: &Path, stem: &str, ext: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        return output.join(format!("{}.{}", stem, ext));
    }
    let path = output.with_extension(ext);
    if path != output {
        tracing::warn!(
            "{} does not match the encoded format, writing {}",
            output.display(),
            path.display()
        );
    }
    path
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_path_directory() {
        let dir = std::env::temp_dir();
        assert_eq!(
            clip_path(&dir, ContainerFormat::Webm),
            dir.join("comparison.webm")
        );
        assert_eq!(
            clip_path(Path::new("out/clips"), ContainerFormat::Gif),
            PathBuf::from("out/clips/comparison.gif")
        );
    }

    #[test]
    fn test_clip_path_replaces_extension() {
        assert_eq!(
            clip_path(Path::new("kitchen.webm"), ContainerFormat::Mp4),
            PathBuf::from("kitchen.mp4")
        );
        assert_eq!(
            clip_path(Path::new("kitchen.mp4"), ContainerFormat::Mp4),
            PathBuf::from("kitchen.mp4")
        );
        assert_eq!(
            clip_path(Path::new("renders/a.gif"), ContainerFormat::Apng),
            PathBuf::from("renders/a.png")
        );
    }
}
