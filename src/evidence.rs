use anyhow::{Context, Result};
use image::RgbaImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which series an evidence crop backs; decides the file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceKind {
    Supply,
    Selection,
    Queue,
}

impl EvidenceKind {
    fn prefix(self) -> &'static str {
        match self {
            EvidenceKind::Supply => "supply",
            EvidenceKind::Selection => "sel",
            EvidenceKind::Queue => "q",
        }
    }
}

/// Directory of audit crops with deterministic names (`supply_000001.png`).
pub struct EvidenceStore {
    dir: PathBuf,
}

impl EvidenceStore {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create evidence directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: EvidenceKind, index: u32) -> PathBuf {
        self.dir.join(format!("{}_{:06}.png", kind.prefix(), index))
    }

    /// Write the crop and return the path as recorded in the output document.
    pub fn save(&self, kind: EvidenceKind, index: u32, crop: &RgbaImage) -> Result<String> {
        let path = self.path_for(kind, index);
        crop.save(&path)
            .with_context(|| format!("Failed to write evidence {}", path.display()))?;
        debug!("Evidence saved: {}", path.display());
        Ok(path.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::create(dir.path().join("evidence")).unwrap();
        assert!(store
            .path_for(EvidenceKind::Supply, 1)
            .ends_with("supply_000001.png"));
        assert!(store.path_for(EvidenceKind::Selection, 12).ends_with("sel_000012.png"));
        assert!(store.path_for(EvidenceKind::Queue, 3).ends_with("q_000003.png"));
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = EvidenceStore::create(dir.path().join("nested").join("evidence")).unwrap();
        let path = store
            .save(EvidenceKind::Queue, 2, &RgbaImage::new(6, 4))
            .unwrap();
        assert!(path.ends_with("q_000002.png"));
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (6, 4));
    }
}
