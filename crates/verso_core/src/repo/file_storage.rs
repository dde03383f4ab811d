//! File-backed storage: one `<id>.automerge` file per document.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::storage::{ArtifactStorage, StorageResult};
use crate::artifact::DocumentId;
use crate::error::VersoError;

const EXTENSION: &str = "automerge";

/// Stores each document as `<dir>/<id>.automerge`.
///
/// Saves go through a temporary file and a rename, so a crash mid-write
/// leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `dir`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| VersoError::FileWrite {
            path: dir.clone(),
            source: e,
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the document files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `id`.
    pub fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, EXTENSION))
    }
}

impl ArtifactStorage for FileStorage {
    fn load(&self, id: &DocumentId) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VersoError::FileRead { path, source: e }),
        }
    }

    fn save(&self, id: &DocumentId, bytes: &[u8]) -> StorageResult<()> {
        let path = self.path_for(id);
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        fs::write(&tmp, bytes).map_err(|e| VersoError::FileWrite {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &path).map_err(|e| VersoError::FileWrite { path, source: e })
    }

    fn delete(&self, id: &DocumentId) -> StorageResult<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VersoError::FileWrite { path, source: e }),
        }
    }

    fn list(&self) -> StorageResult<Vec<DocumentId>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| VersoError::FileRead {
            path: self.dir.clone(),
            source: e,
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match DocumentId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(_) => log::warn!("[FileStorage] Skipping unrecognised file {:?}", path),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &DocumentId) -> StorageResult<bool> {
        Ok(self.path_for(id).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path().join("docs")).unwrap();
        let id = DocumentId::generate();

        assert_eq!(storage.load(&id).unwrap(), None);
        storage.save(&id, b"first").unwrap();
        storage.save(&id, b"second").unwrap();
        assert_eq!(storage.load(&id).unwrap(), Some(b"second".to_vec()));
        assert!(storage.path_for(&id).is_file());
        assert!(storage.exists(&id).unwrap());

        storage.delete(&id).unwrap();
        storage.delete(&id).unwrap();
        assert_eq!(storage.load(&id).unwrap(), None);
    }

    #[test]
    fn test_list_ignores_other_files() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let a = DocumentId::parse("aaa").unwrap();
        let b = DocumentId::parse("bbb").unwrap();
        storage.save(&b, b"x").unwrap();
        storage.save(&a, b"x").unwrap();
        fs::write(temp.path().join("notes.txt"), "hi").unwrap();
        fs::write(temp.path().join("bad name.automerge"), "hi").unwrap();

        assert_eq!(storage.list().unwrap(), vec![a, b]);
    }
}
