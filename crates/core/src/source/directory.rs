//! Directory-backed item source.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::error::SourceError;
use super::traits::ItemSource;
use super::types::{BatchItem, ItemDescriptor};

/// Source listing every regular file below a root directory.
///
/// Identifiers are paths relative to the root joined with `/`, sorted
/// lexicographically so repeated scans yield the same processing order.
/// Symbolic links are not followed. Names that are not valid UTF-8 are
/// converted lossily; the item is still read from its real path.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    descriptors: Vec<ItemDescriptor>,
    paths: Vec<PathBuf>,
}

impl DirectorySource {
    /// Lists the directory tree under `root`.
    pub async fn scan(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref().to_path_buf();

        let metadata = match fs::metadata(&root).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::RootNotFound { path: root });
            }
            Err(e) => {
                return Err(SourceError::Listing {
                    path: root,
                    source: e,
                })
            }
        };
        if !metadata.is_dir() {
            return Err(SourceError::NotADirectory { path: root });
        }

        let mut found: Vec<(ItemDescriptor, PathBuf)> = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| SourceError::Listing {
                    path: dir.clone(),
                    source: e,
                })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                SourceError::Listing {
                    path: dir.clone(),
                    source: e,
                }
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await.map_err(|e| SourceError::Listing {
                    path: path.clone(),
                    source: e,
                })?;

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    let size = entry
                        .metadata()
                        .await
                        .map_err(|e| SourceError::Listing {
                            path: path.clone(),
                            source: e,
                        })?
                        .len();
                    let identifier = relative_identifier(&root, &path)?;
                    found.push((ItemDescriptor::new(identifier, size), path));
                }
            }
        }

        found.sort_by(|(a, _), (b, _)| a.identifier.cmp(&b.identifier));
        let (descriptors, paths): (Vec<ItemDescriptor>, Vec<PathBuf>) = found
            .into_iter()
            .enumerate()
            .map(|(index, (descriptor, path))| (descriptor.with_index(index), path))
            .unzip();
        debug!(
            root = %root.display(),
            items = descriptors.len(),
            "Scanned batch directory"
        );

        Ok(Self {
            root,
            descriptors,
            paths,
        })
    }

    /// The scanned root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn relative_identifier(root: &Path, path: &Path) -> Result<String, SourceError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| SourceError::InvalidPath {
            path: path.to_path_buf(),
        })?;

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let lossy = part.to_string_lossy();
            if matches!(lossy, std::borrow::Cow::Owned(_)) {
                warn!(path = %path.display(), "Item name is not valid UTF-8, using lossy identifier");
            }
            parts.push(lossy);
        }
    }
    Ok(parts.join("/"))
}

#[async_trait]
impl ItemSource for DirectorySource {
    fn descriptors(&self) -> &[ItemDescriptor] {
        &self.descriptors
    }

    async fn load(&self, descriptor: &ItemDescriptor) -> Result<BatchItem, SourceError> {
        let path = self
            .descriptors
            .get(descriptor.index)
            .filter(|d| d.identifier == descriptor.identifier)
            .and_then(|_| self.paths.get(descriptor.index))
            .ok_or_else(|| SourceError::UnknownItem {
                identifier: descriptor.identifier.clone(),
            })?;

        let content = fs::read(path).await.map_err(|e| SourceError::Read {
            identifier: descriptor.identifier.clone(),
            source: e,
        })?;

        Ok(BatchItem::new(descriptor.identifier.clone(), content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &[u8]) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_scan_preserves_hierarchy_in_sorted_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "study/series2/img1.dcm", b"22");
        write(dir.path(), "study/series1/img1.dcm", b"1");
        write(dir.path(), "top.txt", b"333");

        let source = DirectorySource::scan(dir.path()).await.unwrap();
        let ids: Vec<&str> = source
            .descriptors()
            .iter()
            .map(|d| d.identifier.as_str())
            .collect();

        assert_eq!(
            ids,
            vec![
                "study/series1/img1.dcm",
                "study/series2/img1.dcm",
                "top.txt"
            ]
        );
        assert_eq!(source.total_bytes(), 6);
    }

    #[tokio::test]
    async fn test_empty_directories_yield_no_items() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();

        let source = DirectorySource::scan(dir.path()).await.unwrap();
        assert_eq!(source.total_count(), 0);
    }

    #[tokio::test]
    async fn test_load_reads_single_item() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b.bin", b"payload");

        let source = DirectorySource::scan(dir.path()).await.unwrap();
        let item = source.load(&source.descriptors()[0]).await.unwrap();
        assert_eq!(item.identifier, "a/b.bin");
        assert_eq!(item.content, b"payload");
        assert_eq!(item.size, 7);
    }

    #[tokio::test]
    async fn test_load_vanished_file_is_item_level_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "gone.bin", b"x");

        let source = DirectorySource::scan(dir.path()).await.unwrap();
        std::fs::remove_file(dir.path().join("gone.bin")).unwrap();

        let err = source.load(&source.descriptors()[0]).await.unwrap_err();
        assert!(err.is_item_level());
        assert!(err.to_string().contains("gone.bin"));
    }

    #[tokio::test]
    async fn test_descriptors_carry_their_position() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.bin", b"B");
        write(dir.path(), "a.bin", b"A");

        let source = DirectorySource::scan(dir.path()).await.unwrap();
        let indices: Vec<usize> = source.descriptors().iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 1]);

        let second = source.load(&source.descriptors()[1]).await.unwrap();
        assert_eq!(second.identifier, "b.bin");
        assert_eq!(second.content, b"B");

        let foreign = ItemDescriptor::new("a.bin", 1).with_index(1);
        assert!(matches!(
            source.load(&foreign).await,
            Err(SourceError::UnknownItem { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_name_does_not_block_scan() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "good.txt", b"ok");
        let odd = dir.path().join(OsStr::from_bytes(b"bad\xff.bin"));
        if std::fs::write(&odd, b"odd").is_err() {
            // Some filesystems refuse non-UTF-8 names outright.
            return;
        }

        let source = DirectorySource::scan(dir.path()).await.unwrap();
        assert_eq!(source.total_count(), 2);

        let odd_item = source
            .descriptors()
            .iter()
            .find(|d| d.identifier.starts_with("bad"))
            .unwrap();
        assert_eq!(odd_item.identifier, "bad\u{FFFD}.bin");
        let item = source.load(odd_item).await.unwrap();
        assert_eq!(item.content, b"odd");
    }

    #[tokio::test]
    async fn test_missing_root() {
        let result = DirectorySource::scan("/nonexistent/streambatch/root").await;
        assert!(matches!(result, Err(SourceError::RootNotFound { .. })));
    }

    #[tokio::test]
    async fn test_root_must_be_directory() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "file.txt", b"x");

        let result = DirectorySource::scan(dir.path().join("file.txt")).await;
        assert!(matches!(result, Err(SourceError::NotADirectory { .. })));
    }
}
