//! Filesystem artifact store.
//!
//! Layout: `<root>/<name>` holds the content and `<root>/<name>.meta.json`
//! its [`ArtifactMeta`]. Writes go to `<root>/.tmp` first and are renamed
//! into place, content before sidecar, so a listed artifact always has its
//! content on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::{compute_sha256, validate_name, ArtifactMeta, ArtifactStore, ArtifactStoreError, META_SUFFIX};

/// Temp directory name under the store root
const TEMP_DIR: &str = ".tmp";

#[derive(Debug)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ArtifactStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the content file for `name`.
    pub fn content_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, META_SUFFIX))
    }

    fn temp_path(&self, label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        self.root
            .join(TEMP_DIR)
            .join(format!(".tmp.{}.{}.{}", std::process::id(), nanos, label))
    }

    fn write_atomic(&self, dest: &Path, bytes: &[u8], label: &str) -> io::Result<()> {
        let temp = self.temp_path(label);
        fs::write(&temp, bytes)?;
        if let Err(e) = fs::rename(&temp, dest) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        Ok(())
    }

    fn read_meta(&self, path: &Path) -> Result<ArtifactMeta, ArtifactStoreError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

fn remove_if_present(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(&self, meta: &ArtifactMeta, content: &[u8]) -> Result<(), ArtifactStoreError> {
        validate_name(&meta.name)?;

        let dest = self.content_path(&meta.name);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(self.root.join(TEMP_DIR))?;

        self.write_atomic(&dest, content, "content")?;
        let json = serde_json::to_vec_pretty(meta)?;
        if let Err(e) = self.write_atomic(&self.meta_path(&meta.name), &json, "meta") {
            let _ = fs::remove_file(&dest);
            return Err(e.into());
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, ArtifactStoreError> {
        validate_name(name)?;
        let content = match fs::read(self.content_path(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let meta_path = self.meta_path(name);
        if meta_path.exists() {
            let meta = self.read_meta(&meta_path)?;
            let actual = compute_sha256(&content);
            if actual != meta.sha256 {
                return Err(ArtifactStoreError::IntegrityMismatch {
                    name: name.to_string(),
                    expected: meta.sha256,
                    actual,
                });
            }
        }
        Ok(Some(content))
    }

    fn contains(&self, name: &str) -> Result<bool, ArtifactStoreError> {
        validate_name(name)?;
        Ok(self.content_path(name).exists() || self.meta_path(name).exists())
    }

    fn remove(&self, name: &str) -> Result<bool, ArtifactStoreError> {
        validate_name(name)?;
        // Sidecar first: once it is gone the artifact no longer lists.
        let had_meta = remove_if_present(&self.meta_path(name))?;
        let had_content = remove_if_present(&self.content_path(name))?;
        Ok(had_meta || had_content)
    }

    fn list(&self) -> Result<Vec<ArtifactMeta>, ArtifactStoreError> {
        let mut metas = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| e.file_name() != TEMP_DIR);

        for entry in walker {
            let entry = entry.map_err(|e| {
                ArtifactStoreError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_sidecar = entry
                .file_name()
                .to_str()
                .map(|n| n.ends_with(META_SUFFIX))
                .unwrap_or(false);
            if is_sidecar {
                metas.push(self.read_meta(entry.path())?);
            }
        }

        metas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(metas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn meta(name: &str, kind: ArtifactKind, content: &[u8]) -> ArtifactMeta {
        let now = Utc::now();
        ArtifactMeta::new(name.to_string(), kind, now, now + Duration::seconds(120), content)
    }

    #[test]
    fn test_put_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        let m = meta("logs/x.log", ArtifactKind::Log, b"[INFO] crash");

        store.put(&m, b"[INFO] crash").unwrap();
        assert!(dir.path().join("logs/x.log").exists());
        assert!(dir.path().join("logs/x.log.meta.json").exists());
        assert!(store.contains("logs/x.log").unwrap());
        assert_eq!(store.get("logs/x.log").unwrap(), Some(b"[INFO] crash".to_vec()));

        assert!(store.remove("logs/x.log").unwrap());
        assert!(!store.remove("logs/x.log").unwrap());
        assert_eq!(store.get("logs/x.log").unwrap(), None);
        assert!(!store.contains("logs/x.log").unwrap());
    }

    #[test]
    fn test_list_reads_sidecars_and_skips_temp() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        store
            .put(&meta("logs/a.log", ArtifactKind::Log, b"a"), b"a")
            .unwrap();
        store
            .put(&meta("flags/a.txt", ArtifactKind::Flag, b"CTF{a}"), b"CTF{a}")
            .unwrap();
        fs::write(dir.path().join(".tmp/stray.meta.json"), "not json").unwrap();

        let listed = store.list().unwrap();
        let names: Vec<_> = listed.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["flags/a.txt", "logs/a.log"]);
        assert_eq!(listed[0].kind, ArtifactKind::Flag);
    }

    #[test]
    fn test_tampered_content_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        store
            .put(&meta("flags/a.txt", ArtifactKind::Flag, b"CTF{a}"), b"CTF{a}")
            .unwrap();
        fs::write(dir.path().join("flags/a.txt"), "CTF{b}").unwrap();

        assert!(matches!(
            store.get("flags/a.txt"),
            Err(ArtifactStoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path().join("root")).unwrap();
        assert!(matches!(
            store.get("../outside"),
            Err(ArtifactStoreError::InvalidName { .. })
        ));
        assert!(matches!(
            store.remove("/etc/hosts"),
            Err(ArtifactStoreError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_external_deletion_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        store
            .put(&meta("logs/b.log", ArtifactKind::Log, b"b"), b"b")
            .unwrap();
        fs::remove_file(dir.path().join("logs/b.log")).unwrap();

        assert_eq!(store.get("logs/b.log").unwrap(), None);
        // The sidecar is still cleaned up.
        assert!(store.remove("logs/b.log").unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
